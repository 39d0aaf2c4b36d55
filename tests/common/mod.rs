//! Integration test common infrastructure.
//!
//! Builds lobbies over a manual clock, sequential ids, a store that can be
//! told to fail, and a scripted responder.

pub mod fakes;

#[allow(unused_imports)]
pub use fakes::{FlakyStore, ScriptedResponder, SlowResponder};

use chrono::Duration;
use parleyd::clock::ManualClock;
use parleyd::ids::SequentialIds;
use parleyd::session::NamePool;
use parleyd::{Lobby, LobbySettings};
use std::sync::Arc;

pub const FALLBACK: &str = "(no reply)";

/// Default test policy: `[A, B, C]` rotation, 60s solo wait, unshuffled names.
pub fn test_settings() -> LobbySettings {
    LobbySettings {
        names: NamePool::new(
            ["Player A", "Player B", "Player C", "Player D", "Player E"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            false,
        ),
        solo_wait: Duration::seconds(60),
        responder_timeout: std::time::Duration::from_millis(200),
        fallback_message: FALLBACK.to_string(),
        ..LobbySettings::default()
    }
}

/// A lobby plus handles on every collaborator it was built with.
pub struct TestLobby {
    pub lobby: Lobby,
    pub clock: Arc<ManualClock>,
    pub store: Arc<FlakyStore>,
    pub responder: Arc<ScriptedResponder>,
}

#[allow(dead_code)]
impl TestLobby {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: LobbySettings) -> Self {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(FlakyStore::new());
        let responder = Arc::new(ScriptedResponder::new());
        let lobby = Lobby::builder(settings)
            .clock(clock.clone())
            .store(store.clone())
            .responder(responder.clone())
            .ids(Arc::new(SequentialIds::new()))
            .build()
            .expect("test settings are valid");
        Self {
            lobby,
            clock,
            store,
            responder,
        }
    }

    /// A second lobby over the same store and clock, restored from the store.
    pub async fn reopen(&self) -> Lobby {
        Lobby::builder(test_settings())
            .clock(self.clock.clone())
            .store(self.store.clone())
            .responder(self.responder.clone())
            .ids(Arc::new(SequentialIds::new()))
            .open()
            .await
            .expect("restore succeeds")
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }

    /// Admit each handle in order.
    pub async fn admit_all(&self, handles: &[&str]) {
        for handle in handles {
            self.lobby.admit(handle).await.expect("admit");
        }
    }

    /// Ranks of the waiting set, in snapshot order.
    pub async fn ranks(&self) -> Vec<usize> {
        self.lobby.queue().await.iter().map(|p| p.rank).collect()
    }
}
