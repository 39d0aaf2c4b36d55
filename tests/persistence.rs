//! Integration tests for write-through persistence, commit rollback and restore.

mod common;

use common::{TestLobby, test_settings};
use parleyd::clock::ManualClock;
use parleyd::ids::SequentialIds;
use parleyd::match_index::MatchRecord;
use parleyd::queue::Tag;
use parleyd::session::{SlotKind, TurnSession};
use parleyd::store::{RedbStore, StateStore, StoreFamily, StoreKey, load_json, save_json};
use parleyd::{Lobby, LobbyError, WithdrawOutcome};
use std::sync::Arc;

#[tokio::test]
async fn test_failed_admission_write_leaves_queue_untouched() {
    let t = TestLobby::new();
    t.store.fail_saves(Some(StoreFamily::Queue), 1);

    let err = t.lobby.admit("a").await.unwrap_err();
    assert!(matches!(err, LobbyError::Persistence(_)));
    assert!(err.is_transient());
    assert!(t.lobby.queue().await.is_empty());
    assert_eq!(t.lobby.stats().await.total_admitted, 0);

    // The retry gets the ordinal the failed attempt would have had.
    let admitted = t.lobby.admit("a").await.unwrap();
    assert_eq!(admitted.participant.ordinal, 1);
    assert_eq!(admitted.participant.tag, Tag::from("A"));
}

#[tokio::test]
async fn test_failed_withdrawal_write_keeps_participant_waiting() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    t.store.fail_saves(Some(StoreFamily::Queue), 1);

    assert!(t.lobby.withdraw("a").await.unwrap_err().is_transient());
    assert_eq!(t.ranks().await, [1, 2]);
    assert_eq!(t.lobby.withdraw("a").await.unwrap(), WithdrawOutcome::Removed);
}

#[tokio::test]
async fn test_failed_message_write_leaves_session_untouched() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    let session = t.lobby.run_matching().await.unwrap().matches[0].session_id.clone();

    t.store.fail_saves(Some(StoreFamily::Sessions), 1);
    assert!(t.lobby.post_message(&session, 0, "hi").await.is_err());
    assert!(t.lobby.session_state(&session).await.unwrap().messages.is_empty());

    t.store.fail_saves(Some(StoreFamily::Sessions), 1);
    assert!(t.lobby.advance(&session).await.is_err());
    assert_eq!(t.lobby.session_state(&session).await.unwrap().current_slot, 0);

    let message = t.lobby.post_message(&session, 0, "hi").await.unwrap();
    assert_eq!(message.id, 1);
}

#[tokio::test]
async fn test_failed_reply_advance_can_be_retried() {
    let t = TestLobby::new();
    t.admit_all(&["solo"]).await;
    t.advance_secs(60);
    let session = t.lobby.run_matching().await.unwrap().matches[0].session_id.clone();
    t.lobby.post_message(&session, 0, "hello").await.unwrap();

    t.store.fail_saves(Some(StoreFamily::Sessions), 1);
    assert!(t.lobby.advance(&session).await.is_err());
    assert_eq!(t.lobby.session_state(&session).await.unwrap().current_slot, 0);

    let current = t.lobby.advance(&session).await.unwrap();
    assert_eq!(current.kind, SlotKind::Automated);
    assert!(t.responder.prompts().is_empty());

    let outcome = t.lobby.play_automated_turns(&session).await.unwrap();
    assert_eq!(outcome.automated.len(), 1);
    assert_eq!(outcome.current.index, 0);
}

#[tokio::test]
async fn test_session_write_retries_under_fresh_id() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    t.store.fail_saves(Some(StoreFamily::Sessions), 1);

    let report = t.lobby.run_matching().await.unwrap();
    assert_eq!(report.sessions_created(), 1);
    assert_eq!(report.matches[0].session_id, "room_AAAAAB");

    for handle in ["a", "b"] {
        let record = t.lobby.match_result(handle).unwrap();
        assert_eq!(record.session_id, "room_AAAAAB");
        let stored: MatchRecord =
            load_json(t.store.as_ref(), &StoreKey::MatchIndex(handle.to_string()))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(stored, record);
    }
    assert!(t.lobby.session_state("room_AAAAAB").await.is_ok());
    assert!(
        t.store
            .load(&StoreKey::Session("room_AAAAAA".into()))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_exhausted_session_attempts_roll_back_the_match() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    t.store.fail_saves(Some(StoreFamily::Sessions), 2);

    let err = t.lobby.run_matching().await.unwrap_err();
    assert!(err.is_transient());

    assert_eq!(t.ranks().await, [1, 2]);
    assert!(t.lobby.match_result("a").is_none());
    assert!(t.lobby.match_result("b").is_none());
    let stats = t.lobby.stats().await;
    assert_eq!((stats.active_sessions, stats.match_index_size), (0, 0));
    assert!(t.store.list(StoreFamily::MatchIndex).await.unwrap().is_empty());
    assert!(t.store.list(StoreFamily::Sessions).await.unwrap().is_empty());

    // Nothing was lost; the next pass succeeds.
    let report = t.lobby.run_matching().await.unwrap();
    assert_eq!(report.sessions_created(), 1);
    assert_eq!(report.waiting, 0);
}

#[tokio::test]
async fn test_failed_queue_write_during_commit_rolls_back() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    t.store.fail_saves(Some(StoreFamily::Queue), 1);

    assert!(t.lobby.run_matching().await.is_err());

    assert_eq!(t.lobby.queue().await.len(), 2);
    assert!(t.lobby.match_result("a").is_none());
    assert_eq!(t.lobby.stats().await.active_sessions, 0);
    assert!(t.store.list(StoreFamily::Sessions).await.unwrap().is_empty());
    assert!(t.store.list(StoreFamily::MatchIndex).await.unwrap().is_empty());
    assert_eq!(t.lobby.withdraw("a").await.unwrap(), WithdrawOutcome::Removed);
}

#[tokio::test]
async fn test_earlier_matches_survive_a_later_failed_commit() {
    let t = TestLobby::new();
    // Pair (a, b) commits first, then solo c.
    t.admit_all(&["a", "b", "c"]).await;
    // Let the pair's session through, fail both attempts for the solo one.
    t.store.fail_saves_after(Some(StoreFamily::Sessions), 1, 2);

    assert!(t.lobby.run_matching().await.is_err());

    assert!(t.lobby.match_result("a").is_some());
    assert!(t.lobby.match_result("b").is_some());
    assert!(t.lobby.match_result("c").is_none());
    let waiting = t.lobby.queue().await;
    assert_eq!(waiting.len(), 1);
    assert_eq!((waiting[0].handle.as_str(), waiting[0].rank), ("c", 1));
    assert_eq!(t.lobby.stats().await.active_sessions, 1);

    let report = t.lobby.run_matching().await.unwrap();
    assert_eq!(report.sessions_created(), 1);
    assert_eq!(report.matches[0].placements[0].handle, "c");
}

#[tokio::test]
async fn test_unpersisted_reply_is_resumed() {
    let t = TestLobby::new();
    t.admit_all(&["solo"]).await;
    t.advance_secs(60);
    let session = t.lobby.run_matching().await.unwrap().matches[0].session_id.clone();

    // The human turn is written, the automated reply is not.
    t.store.fail_saves_after(Some(StoreFamily::Sessions), 1, 1);
    assert!(t.lobby.send_message(&session, 0, "hello").await.is_err());

    let view = t.lobby.session_state(&session).await.unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.current_slot, 1);

    let outcome = t.lobby.play_automated_turns(&session).await.unwrap();
    assert_eq!(outcome.automated.len(), 1);
    assert_eq!(outcome.current.index, 0);
    assert_eq!(t.lobby.session_state(&session).await.unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_failed_release_keeps_record() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    t.lobby.run_matching().await.unwrap();

    t.store.fail_removes(Some(StoreFamily::MatchIndex), 1);
    assert!(t.lobby.release_match("a").await.is_err());
    assert!(t.lobby.match_result("a").is_some());
    assert!(t.lobby.release_match("a").await.unwrap());
}

#[tokio::test]
async fn test_restart_restores_queue_sessions_and_matches() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b", "c", "d"]).await;
    let report = t.lobby.run_matching().await.unwrap();
    let solo = report.matches[1].session_id.clone();
    t.lobby.send_message(&solo, 0, "hello").await.unwrap();

    let restored = t.reopen().await;

    let queue = restored.queue().await;
    assert_eq!(queue, t.lobby.queue().await);
    assert_eq!((queue[0].handle.as_str(), queue[0].ordinal), ("d", 4));

    for handle in ["a", "b", "c"] {
        assert_eq!(restored.match_result(handle), t.lobby.match_result(handle));
    }
    assert_eq!(
        restored.session_state(&solo).await.unwrap(),
        t.lobby.session_state(&solo).await.unwrap()
    );

    let stats = restored.stats().await;
    assert_eq!(stats.total_admitted, 4);
    assert_eq!(stats.active_sessions, 2);
    assert_eq!(stats.match_index_size, 3);

    // Ordinals continue where they left off.
    let next = restored.admit("e").await.unwrap().participant;
    assert_eq!((next.ordinal, next.tag.as_str()), (5, "B"));
}

#[tokio::test]
async fn test_restore_discards_records_of_waiting_participants() {
    let t = TestLobby::new();
    t.admit_all(&["a"]).await;
    let waiting = t.lobby.queue().await.remove(0);

    let orphan = MatchRecord {
        original_handle: "a".into(),
        participant_id: waiting.id.clone(),
        session_id: "room_never_written".into(),
        slot_index: 0,
        tag: waiting.tag.clone(),
        matched_at: waiting.arrival_time,
    };
    let settled = MatchRecord {
        original_handle: "old".into(),
        participant_id: "user_old".into(),
        session_id: "room_old".into(),
        ..orphan.clone()
    };
    for record in [&orphan, &settled] {
        save_json(
            t.store.as_ref(),
            &StoreKey::MatchIndex(record.original_handle.clone()),
            record,
        )
        .await
        .unwrap();
    }

    let restored = t.reopen().await;
    assert!(restored.match_result("a").is_none());
    assert_eq!(restored.match_result("old"), Some(settled));
    assert!(
        t.store
            .load(&StoreKey::MatchIndex("a".into()))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(restored.queue_status("a").await.unwrap().unwrap().queue_len, 1);
}

#[tokio::test]
async fn test_restore_skips_unusable_sessions() {
    let t = TestLobby::new();
    t.admit_all(&["a", "b"]).await;
    let good = t.lobby.run_matching().await.unwrap().matches[0].session_id.clone();

    let raw = t
        .store
        .load(&StoreKey::Session(good.clone()))
        .await
        .unwrap()
        .unwrap();
    let template: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    let broken = [
        ("room_no_slots", "slots", serde_json::json!([])),
        ("room_bad_current", "current", serde_json::json!(7)),
    ];
    for (id, field, value) in broken {
        let mut record = template.clone();
        record["id"] = serde_json::json!(id);
        record[field] = value;
        t.store
            .save(&StoreKey::Session(id.into()), serde_json::to_vec(&record).unwrap())
            .await
            .unwrap();
    }

    // Larger than the configured max_slots of 5.
    let kinds = [SlotKind::Human; 6];
    let names = (0..6).map(|i| format!("Guest {i}")).collect();
    let oversized = TurnSession::new(
        "room_oversized",
        &kinds,
        names,
        chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
    )
    .unwrap();
    save_json(
        t.store.as_ref(),
        &StoreKey::Session("room_oversized".into()),
        &oversized,
    )
    .await
    .unwrap();

    let restored = t.reopen().await;
    for id in ["room_no_slots", "room_bad_current", "room_oversized"] {
        assert!(matches!(
            restored.advance(id).await,
            Err(LobbyError::SessionNotFound(_))
        ));
    }
    assert_eq!(restored.stats().await.active_sessions, 1);
    assert!(restored.post_message(&good, 0, "still here").await.is_ok());
}

#[tokio::test]
async fn test_redb_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("parleyd.redb");
    let clock = Arc::new(ManualClock::at_epoch());

    let (pair, record) = {
        let lobby = Lobby::builder(test_settings())
            .store(Arc::new(RedbStore::open(&path).unwrap()))
            .clock(clock.clone())
            .ids(Arc::new(SequentialIds::new()))
            .build()
            .unwrap();
        for handle in ["a", "b", "c", "d"] {
            lobby.admit(handle).await.unwrap();
        }
        let report = lobby.run_matching().await.unwrap();
        let pair = report.matches[0].session_id.clone();
        lobby.post_message(&pair, 0, "persisted").await.unwrap();
        (pair, lobby.match_result("b").unwrap())
    };

    let lobby = Lobby::builder(test_settings())
        .store(Arc::new(RedbStore::open(&path).unwrap()))
        .clock(clock)
        .open()
        .await
        .unwrap();

    assert_eq!(lobby.match_result("b"), Some(record));
    let view = lobby.session_state(&pair).await.unwrap();
    assert_eq!(view.messages[0].content, "persisted");
    let waiting = lobby.queue().await;
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].handle, "d");
}
