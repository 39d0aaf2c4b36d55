//! Admission queue.
//!
//! Holds waiting participants in arrival order, assigns each a rotating class
//! tag, and keeps 1-based ranks contiguous across every change.
//!
//! The queue is a plain value. Callers that need write-through persistence
//! clone it, mutate the clone, persist it, and publish the clone only once
//! the write succeeded.

mod tags;

pub use tags::{RotationError, Tag, TagClass, TagRotation};

use crate::ids::IdSource;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A participant waiting to be matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingParticipant {
    /// Participant id, generated at admission.
    pub id: String,
    /// Caller-supplied session handle (opaque).
    pub handle: String,
    pub arrival_time: DateTime<Utc>,
    /// Global arrival ordinal (1-based, counts every admission ever made).
    pub ordinal: u64,
    /// 1-based position among currently waiting participants.
    pub rank: usize,
    pub tag: Tag,
    pub eligible_for_solo: bool,
}

impl WaitingParticipant {
    /// Instant at which this participant becomes solo-eligible.
    pub fn solo_eligible_at(&self, threshold: Duration) -> DateTime<Utc> {
        self.arrival_time + threshold
    }
}

/// Result of an admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub participant: WaitingParticipant,
    /// False when the handle was already waiting and the existing entry was returned.
    pub fresh: bool,
}

/// Persisted form of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    pub participants: Vec<WaitingParticipant>,
    pub total_admitted: u64,
}

/// Waiting set plus the policy needed to tag and age its members.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    state: QueueState,
    rotation: TagRotation,
    solo_wait: Duration,
}

impl AdmissionQueue {
    pub fn new(rotation: TagRotation, solo_wait: Duration) -> Self {
        Self::from_state(QueueState::default(), rotation, solo_wait)
    }

    /// Rebuild a queue from persisted state, re-deriving ranks.
    pub fn from_state(state: QueueState, rotation: TagRotation, solo_wait: Duration) -> Self {
        let mut queue = Self {
            state,
            rotation,
            solo_wait,
        };
        queue.recompute_ranks();
        queue
    }

    pub fn state(&self) -> &QueueState {
        &self.state
    }

    pub fn rotation(&self) -> &TagRotation {
        &self.rotation
    }

    pub fn solo_wait(&self) -> Duration {
        self.solo_wait
    }

    /// Admit `handle`, or return its existing entry unchanged if it is already waiting.
    pub fn admit(&mut self, handle: &str, ids: &dyn IdSource, now: DateTime<Utc>) -> Admission {
        if let Some(existing) = self.get(handle) {
            return Admission {
                participant: existing.clone(),
                fresh: false,
            };
        }

        self.state.total_admitted += 1;
        let ordinal = self.state.total_admitted;
        let participant = WaitingParticipant {
            id: ids.participant_id(),
            handle: handle.to_string(),
            arrival_time: now,
            ordinal,
            rank: 0,
            tag: self.rotation.tag_for(ordinal).clone(),
            eligible_for_solo: false,
        };
        self.state.participants.push(participant);
        self.recompute_ranks();
        self.refresh_eligibility(now);

        let participant = self
            .state
            .participants
            .iter()
            .find(|p| p.ordinal == ordinal)
            .cloned()
            .unwrap_or_else(|| unreachable!("participant {ordinal} was just inserted"));
        Admission {
            participant,
            fresh: true,
        }
    }

    /// Remove `handle` if it is waiting. Returns whether anything was removed.
    pub fn withdraw(&mut self, handle: &str) -> bool {
        let before = self.state.participants.len();
        self.state.participants.retain(|p| p.handle != handle);
        let removed = self.state.participants.len() != before;
        if removed {
            self.recompute_ranks();
        }
        removed
    }

    /// Remove every participant whose id is in `ids`. Returns how many were removed.
    pub fn remove_matched(&mut self, ids: &[String]) -> usize {
        let before = self.state.participants.len();
        self.state.participants.retain(|p| !ids.contains(&p.id));
        let removed = before - self.state.participants.len();
        if removed > 0 {
            self.recompute_ranks();
        }
        removed
    }

    /// Mark every participant that has waited at least the solo threshold.
    pub fn refresh_eligibility(&mut self, now: DateTime<Utc>) {
        let threshold = self.solo_wait;
        for p in &mut self.state.participants {
            if !p.eligible_for_solo && now - p.arrival_time >= threshold {
                p.eligible_for_solo = true;
            }
        }
    }

    pub fn get(&self, handle: &str) -> Option<&WaitingParticipant> {
        self.state.participants.iter().find(|p| p.handle == handle)
    }

    /// Waiting participants ordered by rank.
    pub fn snapshot(&self) -> Vec<WaitingParticipant> {
        self.state.participants.clone()
    }

    pub fn size(&self) -> usize {
        self.state.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.participants.is_empty()
    }

    pub fn total_admitted(&self) -> u64 {
        self.state.total_admitted
    }

    /// Sort by arrival (ties by admission order) and renumber 1..N.
    fn recompute_ranks(&mut self) {
        self.state
            .participants
            .sort_by(|a, b| a.arrival_time.cmp(&b.arrival_time).then(a.ordinal.cmp(&b.ordinal)));
        for (idx, p) in self.state.participants.iter_mut().enumerate() {
            p.rank = idx + 1;
        }
    }
}
