//! Live game updates for watch subscriptions.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use trickd_core::{Commit, Game, GameEvent, Versioned};

/// A committed change, as delivered to watchers.
#[derive(Debug, Clone)]
pub struct GameUpdate {
    pub record: Arc<Versioned<Game>>,
    pub event: GameEvent,
}

impl GameUpdate {
    pub fn game_id(&self) -> &str {
        &self.record.value.id
    }
}

impl From<&Commit> for GameUpdate {
    fn from(commit: &Commit) -> Self {
        Self {
            record: Arc::new(commit.record.clone()),
            event: commit.event,
        }
    }
}

/// Fans committed changes out to per-game channels.
pub struct UpdateBroadcaster {
    /// Per-game broadcast channels.
    channels: DashMap<String, broadcast::Sender<GameUpdate>>,

    /// subscription_id -> game_id.
    subscriptions: DashMap<String, String>,

    channel_capacity: usize,
}

impl UpdateBroadcaster {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Subscribes to one game's updates.
    ///
    /// Returns (subscription_id, receiver).
    pub fn subscribe(&self, game_id: &str) -> (String, broadcast::Receiver<GameUpdate>) {
        let subscription_id = format!("sub-{}", uuid::Uuid::new_v4());

        let receiver = self
            .channels
            .entry(game_id.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();

        self.subscriptions
            .insert(subscription_id.clone(), game_id.to_string());

        (subscription_id, receiver)
    }

    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    /// Returns whether a subscription is still registered.
    pub fn is_subscribed(&self, subscription_id: &str) -> bool {
        self.subscriptions.contains_key(subscription_id)
    }

    /// Delivers a committed change to the game's watchers.
    ///
    /// Returns the number of receivers reached.
    pub fn notify(&self, commit: &Commit) -> usize {
        let game_id = commit.record.value.id.as_str();
        let delivered = match self.channels.get(game_id) {
            Some(sender) => sender.send(GameUpdate::from(commit)).unwrap_or(0),
            None => return 0,
        };

        if delivered == 0 {
            // Nobody is listening any more.
            self.channels
                .remove_if(game_id, |_, sender| sender.receiver_count() == 0);
        }
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of games with an open channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for UpdateBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trickd_core::{JoinCode, PlayerName};

    fn commit(id: &str, version: u64, event: GameEvent) -> Commit {
        Commit {
            record: Versioned {
                version,
                value: Game::create(
                    id,
                    JoinCode::parse("ABC234").unwrap(),
                    "uid-alice",
                    PlayerName::parse("Alice").unwrap(),
                    Utc::now(),
                ),
            },
            event,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_their_game_only() {
        let broadcaster = UpdateBroadcaster::new(16);
        let (sub1, mut rx1) = broadcaster.subscribe("g1");
        let (_sub2, mut rx2) = broadcaster.subscribe("g2");
        assert!(sub1.starts_with("sub-"));
        assert_eq!(broadcaster.subscription_count(), 2);

        assert_eq!(broadcaster.notify(&commit("g1", 2, GameEvent::PlayerJoined)), 1);

        let update = rx1.recv().await.unwrap();
        assert_eq!(update.game_id(), "g1");
        assert_eq!(update.record.version, 2);
        assert_eq!(update.event, GameEvent::PlayerJoined);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unwatched_channels_are_dropped() {
        let broadcaster = UpdateBroadcaster::new(16);
        assert_eq!(broadcaster.notify(&commit("g1", 1, GameEvent::GameCreated)), 0);

        let (sub, rx) = broadcaster.subscribe("g1");
        assert_eq!(broadcaster.channel_count(), 1);
        assert!(broadcaster.unsubscribe(&sub));
        assert!(!broadcaster.is_subscribed(&sub));
        assert!(!broadcaster.unsubscribe(&sub));
        drop(rx);

        assert_eq!(broadcaster.notify(&commit("g1", 2, GameEvent::PlayerJoined)), 0);
        assert_eq!(broadcaster.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let broadcaster = UpdateBroadcaster::new(2);
        let (_sub, mut rx) = broadcaster.subscribe("g1");
        for v in 1..=4 {
            broadcaster.notify(&commit("g1", v, GameEvent::SetSubmitted));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().record.version, 3);
    }
}
