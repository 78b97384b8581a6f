//! Session management.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use trickd_core::ActorContext;
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, waiting for HELLO.
    Connected,
    /// Handshake complete.
    Ready,
    /// BYE received; the connection closes after the response.
    Closing,
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    /// Negotiated protocol version.
    protocol_version: u16,

    /// Client name from HELLO.
    client_name: Option<String>,

    /// Identity bound by AUTH.
    actor: Option<String>,

    request_count: AtomicU64,

    created_at: Instant,

    last_activity: Mutex<Instant>,

    /// Active subscriptions: subscription_id -> game_id.
    subscriptions: Mutex<HashMap<String, String>>,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::Connected,
            protocol_version: 0,
            client_name: None,
            actor: None,
            request_count: AtomicU64::new(0),
            created_at: Instant::now(),
            last_activity: Mutex::new(Instant::now()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Completes the handshake.
    pub fn complete_handshake(&mut self, protocol_version: u16, client_name: Option<String>) {
        self.protocol_version = protocol_version;
        self.client_name = client_name;
        self.state = SessionState::Ready;
    }

    /// Binds the session to an identity.
    pub fn authenticate(&mut self, uid: String) {
        self.actor = Some(uid);
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor.is_some()
    }

    /// Identity and network origin for engine calls.
    pub fn actor_context(&self) -> ActorContext {
        ActorContext {
            uid: self.actor.clone(),
            origin: Some(self.remote_addr.ip().to_string()),
        }
    }

    /// Records a request.
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Marks the connection active without counting a request.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Adds a subscription to a game.
    pub fn add_subscription(&self, subscription_id: String, game_id: String) {
        self.subscriptions.lock().insert(subscription_id, game_id);
    }

    /// Removes a subscription, returning the game it watched.
    pub fn remove_subscription(&self, subscription_id: &str) -> Option<String> {
        self.subscriptions.lock().remove(subscription_id)
    }

    /// Returns subscription IDs.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().keys().cloned().collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}
