//! Concurrent access to one lobby from many tasks.

mod common;

use common::test_settings;
use parleyd::clock::ManualClock;
use parleyd::ids::SequentialIds;
use parleyd::matcher::MatchKind;
use parleyd::session::SlotKind;
use parleyd::{Lobby, LobbyError, SessionError, WithdrawOutcome};
use std::collections::HashSet;
use std::sync::Arc;

fn shared_lobby() -> Arc<Lobby> {
    Arc::new(
        Lobby::builder(test_settings())
            .clock(Arc::new(ManualClock::at_epoch()))
            .ids(Arc::new(SequentialIds::new()))
            .build()
            .unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admissions_get_distinct_ordinals() {
    let lobby = shared_lobby();

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let lobby = Arc::clone(&lobby);
            tokio::spawn(async move { lobby.admit(&format!("h{i}")).await.unwrap() })
        })
        .collect();
    let mut ordinals = HashSet::new();
    for task in tasks {
        let admission = task.await.unwrap();
        assert!(admission.fresh);
        assert!(ordinals.insert(admission.participant.ordinal));
    }
    assert_eq!(ordinals, (1..=64).collect::<HashSet<u64>>());

    let queue = lobby.queue().await;
    assert_eq!(queue.len(), 64);
    for (idx, p) in queue.iter().enumerate() {
        assert_eq!(p.rank, idx + 1);
        assert_eq!(p.tag, lobby.settings().rotation.tag_for(p.ordinal).clone());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_concurrent_admissions_collapse() {
    let lobby = shared_lobby();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let lobby = Arc::clone(&lobby);
            tokio::spawn(async move { lobby.admit("same").await.unwrap() })
        })
        .collect();
    let mut fresh = 0;
    let mut ids = HashSet::new();
    for task in tasks {
        let admission = task.await.unwrap();
        fresh += usize::from(admission.fresh);
        ids.insert(admission.participant.id);
    }
    assert_eq!(fresh, 1);
    assert_eq!(ids.len(), 1);
    assert_eq!(lobby.stats().await.total_admitted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_withdrawals_racing_a_pass_see_one_consistent_outcome() {
    let lobby = shared_lobby();
    let handles: Vec<String> = (0..30).map(|i| format!("h{i}")).collect();
    for handle in &handles {
        lobby.admit(handle).await.unwrap();
    }

    let pass = {
        let lobby = Arc::clone(&lobby);
        tokio::spawn(async move { lobby.run_matching().await.unwrap() })
    };
    let withdrawals: Vec<_> = handles
        .iter()
        .map(|handle| {
            let lobby = Arc::clone(&lobby);
            let handle = handle.clone();
            tokio::spawn(async move {
                let outcome = lobby.withdraw(&handle).await.unwrap();
                (handle, outcome)
            })
        })
        .collect();

    pass.await.unwrap();
    for task in withdrawals {
        let (handle, outcome) = task.await.unwrap();
        match outcome {
            WithdrawOutcome::Removed => assert!(lobby.match_result(&handle).is_none()),
            WithdrawOutcome::AlreadyMatched => assert!(lobby.match_result(&handle).is_some()),
            WithdrawOutcome::NotWaiting => panic!("{handle} was neither waiting nor matched"),
        }
    }

    // Only participants the pass left waiting can remain; all of them were withdrawn.
    assert!(lobby.queue().await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_in_one_session_are_serialized() {
    let lobby = shared_lobby();
    lobby.admit("a").await.unwrap();
    lobby.admit("b").await.unwrap();
    lobby.admit("c").await.unwrap();
    let report = lobby.run_matching().await.unwrap();
    let session_of = |kind: MatchKind| {
        report
            .matches
            .iter()
            .find(|m| m.kind == kind)
            .map(|m| m.session_id.clone())
            .unwrap()
    };
    let (pair, solo) = (session_of(MatchKind::Pair), session_of(MatchKind::Solo));

    // Two humans racing for slot 0 of a pair: exactly one gets the turn.
    let racers: Vec<_> = (0..2)
        .map(|i| {
            let lobby = Arc::clone(&lobby);
            let pair = pair.clone();
            tokio::spawn(async move { lobby.send_message(&pair, 0, &format!("m{i}")).await })
        })
        .collect();
    let mut won = 0;
    for task in racers {
        match task.await.unwrap() {
            Ok(_) => won += 1,
            Err(LobbyError::Session(SessionError::TurnViolation { slot: 0, current: 1 })) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);

    // In a solo session each send completes its automated reply before the next runs.
    let sends: Vec<_> = (0..4)
        .map(|i| {
            let lobby = Arc::clone(&lobby);
            let solo = solo.clone();
            tokio::spawn(async move { lobby.send_message(&solo, 0, &format!("s{i}")).await })
        })
        .collect();
    for task in sends {
        task.await.unwrap().unwrap();
    }
    let view = lobby.session_state(&solo).await.unwrap();
    assert_eq!(view.messages.len(), 8);
    for (idx, message) in view.messages.iter().enumerate() {
        assert_eq!(message.id, idx as u64 + 1);
        let expected = if idx % 2 == 0 {
            SlotKind::Human
        } else {
            SlotKind::Automated
        };
        assert_eq!(message.kind, expected);
    }
}
