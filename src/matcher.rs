//! Pairing policy.
//!
//! A single pass over the waiting set in rank order:
//!
//! 1. A solo-tag participant is matched with an automated counterpart.
//! 2. A pairable participant takes the nearest later unmatched participant of
//!    the complementary class.
//! 3. With no partner ahead, a participant past its solo-wait threshold is
//!    matched with an automated counterpart.
//! 4. Anyone else keeps waiting.
//!
//! Each participant is matched at most once per pass. Planning is pure: it
//! reads a snapshot and returns the matches; applying them (sessions, match
//! index, queue removal) is the lobby's job.

use crate::queue::{TagClass, TagRotation, WaitingParticipant};
use crate::session::SlotKind;
use serde::Serialize;

/// Why a participant was matched with an automated counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoloReason {
    /// Carries the solo-only tag.
    SoloTag,
    /// Waited past the solo threshold without a partner.
    WaitThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Pair,
    Solo,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Pair => "pair",
            MatchKind::Solo => "solo",
        }
    }
}

/// One match produced by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedMatch {
    /// Two humans. `left` (class L) takes slot 0, `right` (class R) slot 1.
    Pair {
        left: WaitingParticipant,
        right: WaitingParticipant,
    },
    /// One human in slot 0 with an automated participant in slot 1.
    Solo {
        participant: WaitingParticipant,
        reason: SoloReason,
    },
}

impl PlannedMatch {
    pub fn kind(&self) -> MatchKind {
        match self {
            PlannedMatch::Pair { .. } => MatchKind::Pair,
            PlannedMatch::Solo { .. } => MatchKind::Solo,
        }
    }

    /// Human participants with the slot each one occupies.
    pub fn placements(&self) -> Vec<(&WaitingParticipant, usize)> {
        match self {
            PlannedMatch::Pair { left, right } => vec![(left, 0), (right, 1)],
            PlannedMatch::Solo { participant, .. } => vec![(participant, 0)],
        }
    }

    /// Slot layout of the session this match creates.
    pub fn slot_kinds(&self) -> Vec<SlotKind> {
        match self {
            PlannedMatch::Pair { .. } => vec![SlotKind::Human, SlotKind::Human],
            PlannedMatch::Solo { .. } => vec![SlotKind::Human, SlotKind::Automated],
        }
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.placements()
            .into_iter()
            .map(|(p, _)| p.id.clone())
            .collect()
    }
}

/// Outcome of planning one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchPlan {
    pub matches: Vec<PlannedMatch>,
    /// Participants left waiting, in rank order.
    pub waiting: Vec<WaitingParticipant>,
}

impl MatchPlan {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Ids of every participant placed by this plan.
    pub fn matched_ids(&self) -> Vec<String> {
        self.matches
            .iter()
            .flat_map(PlannedMatch::participant_ids)
            .collect()
    }
}

/// Plan matches for `snapshot`.
///
/// Eligibility flags must already reflect the current time. A tag unknown to
/// `rotation` (e.g. persisted under an older configuration) never pairs but
/// still falls back to a solo match once eligible.
pub fn plan_matches(snapshot: &[WaitingParticipant], rotation: &TagRotation) -> MatchPlan {
    let mut ordered: Vec<&WaitingParticipant> = snapshot.iter().collect();
    ordered.sort_by_key(|p| p.rank);

    let classes: Vec<Option<TagClass>> = ordered.iter().map(|p| rotation.classify(&p.tag)).collect();
    let mut matched = vec![false; ordered.len()];
    let mut plan = MatchPlan::default();

    for i in 0..ordered.len() {
        if matched[i] {
            continue;
        }
        let current = ordered[i];

        if classes[i] == Some(TagClass::Solo) {
            matched[i] = true;
            plan.matches.push(PlannedMatch::Solo {
                participant: current.clone(),
                reason: SoloReason::SoloTag,
            });
            continue;
        }

        let partner = classes[i].and_then(TagClass::complement).and_then(|wanted| {
            (i + 1..ordered.len()).find(|&j| !matched[j] && classes[j] == Some(wanted))
        });

        if let Some(j) = partner {
            matched[i] = true;
            matched[j] = true;
            let (left, right) = if classes[i] == Some(TagClass::Left) {
                (current, ordered[j])
            } else {
                (ordered[j], current)
            };
            plan.matches.push(PlannedMatch::Pair {
                left: left.clone(),
                right: right.clone(),
            });
        } else if current.eligible_for_solo {
            matched[i] = true;
            plan.matches.push(PlannedMatch::Solo {
                participant: current.clone(),
                reason: SoloReason::WaitThreshold,
            });
        }
    }

    plan.waiting = ordered
        .iter()
        .zip(&matched)
        .filter(|(_, m)| !**m)
        .map(|(p, _)| (*p).clone())
        .collect();
    plan
}
