//! The lobby: application-scoped owner of all matchmaking state.
//!
//! One [`Lobby`] holds the admission queue, the session registry and the
//! match index, and exposes one method per request-layer operation. State is
//! injected (store, responder, clock, id source) rather than reached through
//! globals.
//!
//! # Locking
//!
//! - The admission queue sits behind one async mutex. Admission, withdrawal,
//!   matching passes and match-index maintenance all take it, so a
//!   participant selected by a pass can no longer be withdrawn.
//! - Each session has its own async mutex (see [`SessionRegistry`]); turns
//!   in one session are serialized, distinct sessions run concurrently.
//!   Retiring a session takes the same mutex, and a turn that acquires it
//!   after the session left the registry fails with `SessionNotFound`.
//!
//! # Write-through
//!
//! Every mutation clones the affected state, mutates the clone, persists it
//! and only then publishes it. A failed write leaves memory as it was.

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, validate as validate_config};
use crate::error::{LobbyError, LobbyResult};
use crate::ids::{IdSource, UuidIds};
use crate::match_index::{MatchIndex, MatchRecord};
use crate::matcher::{MatchKind, PlannedMatch, SoloReason, plan_matches};
use crate::metrics;
use crate::queue::{Admission, AdmissionQueue, QueueState, Tag, TagRotation, WaitingParticipant};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::responder::{CannedResponder, Responder, ResponderError};
use crate::session::{Message, NamePool, SessionView, Slot, SlotKind, TurnSession};
use crate::store::{MemoryStore, StateStore, StoreFamily, StoreKey, load_json, save_json};
use crate::telemetry::{OperationTimer, spans};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{Instrument, debug, info, warn};

/// Largest session the matcher creates (a pair, or one human plus one automated slot).
const MATCH_SESSION_SLOTS: usize = 2;

// ============================================================================
// Settings
// ============================================================================

/// Policy knobs for a [`Lobby`].
#[derive(Debug, Clone)]
pub struct LobbySettings {
    pub rotation: TagRotation,
    pub solo_wait: Duration,
    pub names: NamePool,
    /// Largest session the lobby hosts; restored sessions above it are skipped.
    pub max_slots: usize,
    /// Run a matching pass inline after every fresh admission.
    pub match_on_admit: bool,
    /// Attempts at persisting a new session, each under a fresh id.
    pub session_create_attempts: u32,
    pub responder_timeout: std::time::Duration,
    pub fallback_message: String,
    /// Match-index entries older than this are dropped by [`Lobby::sweep_matches`].
    pub match_ttl: Duration,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            rotation: TagRotation::default(),
            solo_wait: Duration::seconds(60),
            names: NamePool::default(),
            max_slots: 5,
            match_on_admit: false,
            session_create_attempts: 2,
            responder_timeout: std::time::Duration::from_secs(10),
            fallback_message: "Sorry, I couldn't come up with a reply.".to_string(),
            match_ttl: Duration::hours(24),
        }
    }
}

impl LobbySettings {
    /// Derive settings from a validated configuration.
    pub fn from_config(config: &Config) -> LobbyResult<Self> {
        if let Err(errors) = validate_config(config) {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LobbyError::InvalidConfiguration(joined));
        }
        let rotation = config
            .matching
            .rotation()
            .map_err(|e| LobbyError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            rotation,
            solo_wait: config.matching.solo_wait(),
            names: config.session.names(),
            max_slots: config.session.max_slots,
            match_on_admit: config.matching.match_on_admit,
            session_create_attempts: config.matching.session_create_attempts,
            responder_timeout: config.responder.timeout(),
            fallback_message: config.responder.fallback_message.clone(),
            match_ttl: config.retention.match_ttl(),
        })
    }

    fn check(&self) -> LobbyResult<()> {
        if self.max_slots < MATCH_SESSION_SLOTS {
            return Err(LobbyError::InvalidConfiguration(format!(
                "max_slots is {}, matched sessions need {MATCH_SESSION_SLOTS}",
                self.max_slots
            )));
        }
        if self.names.len() < self.max_slots {
            return Err(LobbyError::InvalidConfiguration(format!(
                "name pool has {} names, max_slots is {}",
                self.names.len(),
                self.max_slots
            )));
        }
        if self.session_create_attempts == 0 {
            return Err(LobbyError::InvalidConfiguration(
                "session_create_attempts must be at least 1".into(),
            ));
        }
        if self.responder_timeout.is_zero() {
            return Err(LobbyError::InvalidConfiguration(
                "responder timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Operation results
// ============================================================================

/// Outcome of [`Lobby::withdraw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawOutcome {
    /// The handle was waiting and has been removed.
    Removed,
    /// The handle was neither waiting nor matched.
    NotWaiting,
    /// A matching pass already placed the handle; look it up with
    /// [`Lobby::match_result`].
    AlreadyMatched,
}

impl WithdrawOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawOutcome::Removed => "removed",
            WithdrawOutcome::NotWaiting => "not_waiting",
            WithdrawOutcome::AlreadyMatched => "already_matched",
        }
    }
}

/// A waiting participant as seen by a polling client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// Eligibility reflects the time of the poll.
    pub participant: WaitingParticipant,
    pub queue_len: usize,
    /// Seconds until the participant may be matched solo; 0 once eligible.
    pub seconds_until_solo: u64,
}

/// One human placed by a matching pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub handle: String,
    pub participant_id: String,
    pub tag: Tag,
    pub slot: usize,
}

/// A match committed by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedMatch {
    pub session_id: String,
    pub kind: MatchKind,
    pub placements: Vec<Placement>,
    /// Set for solo matches.
    pub solo_reason: Option<SoloReason>,
}

/// Result of [`Lobby::run_matching`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub matches: Vec<CommittedMatch>,
    /// Participants still waiting after the pass.
    pub waiting: usize,
}

impl MatchReport {
    pub fn sessions_created(&self) -> usize {
        self.matches.len()
    }
}

/// Result of a turn-advancing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Messages posted by automated slots after the advance, in order.
    pub automated: Vec<Message>,
    /// Slot whose turn it is now.
    pub current: Slot,
}

/// Result of [`Lobby::send_message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub message: Message,
    pub automated: Vec<Message>,
    pub session: SessionView,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LobbyStats {
    pub waiting: usize,
    pub active_sessions: usize,
    pub match_index_size: usize,
    pub total_admitted: u64,
}

// ============================================================================
// Builder
// ============================================================================

/// Wires collaborators into a [`Lobby`]. Unset collaborators default to an
/// in-memory store, the canned responder, the system clock and UUID ids.
pub struct LobbyBuilder {
    settings: LobbySettings,
    store: Arc<dyn StateStore>,
    responder: Arc<dyn Responder>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

impl LobbyBuilder {
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn responder(mut self, responder: Arc<dyn Responder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Build an empty lobby without reading the store.
    pub fn build(self) -> LobbyResult<Lobby> {
        self.settings.check()?;
        let queue = AdmissionQueue::new(self.settings.rotation.clone(), self.settings.solo_wait);
        Ok(Lobby {
            queue: Mutex::new(queue),
            sessions: SessionRegistry::new(),
            matches: MatchIndex::new(),
            settings: self.settings,
            store: self.store,
            responder: self.responder,
            clock: self.clock,
            ids: self.ids,
        })
    }

    /// Build a lobby and restore queue, sessions and match index from the store.
    pub async fn open(self) -> LobbyResult<Lobby> {
        let lobby = self.build()?;
        lobby.restore().await?;
        Ok(lobby)
    }
}

// ============================================================================
// Lobby
// ============================================================================

pub struct Lobby {
    settings: LobbySettings,
    queue: Mutex<AdmissionQueue>,
    sessions: SessionRegistry,
    matches: MatchIndex,
    store: Arc<dyn StateStore>,
    responder: Arc<dyn Responder>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
}

/// Store writes made while committing one match, undone if the commit fails.
#[derive(Default)]
struct CommitLog {
    /// Handle and the record it displaced, if any.
    records: Vec<(String, Option<MatchRecord>)>,
    sessions: Vec<String>,
}

fn record_error<T>(operation: &'static str, result: LobbyResult<T>) -> LobbyResult<T> {
    if let Err(e) = &result {
        metrics::record_operation_error(operation, e.error_code());
        debug!(operation, error = %e, "lobby operation failed");
    }
    result
}

impl Lobby {
    pub fn builder(settings: LobbySettings) -> LobbyBuilder {
        LobbyBuilder {
            settings,
            store: Arc::new(MemoryStore::new()),
            responder: Arc::new(CannedResponder::new()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIds),
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    async fn restore(&self) -> LobbyResult<()> {
        let mut queue = self.queue.lock().await;
        let state: QueueState = load_json(self.store.as_ref(), &StoreKey::Queue)
            .await?
            .unwrap_or_default();
        *queue = AdmissionQueue::from_state(
            state,
            self.settings.rotation.clone(),
            self.settings.solo_wait,
        );

        let mut rejected = 0usize;
        for key in self.store.list(StoreFamily::Sessions).await? {
            let Some(session) = load_json::<TurnSession>(self.store.as_ref(), &key).await? else {
                continue;
            };
            if let Err(e) = self.check_restored(&session) {
                warn!(key = %key, error = %e, "Skipping unusable stored session");
                rejected += 1;
                continue;
            }
            self.sessions.put(session);
        }

        let waiting_ids: Vec<String> = queue.snapshot().into_iter().map(|p| p.id).collect();
        let mut orphaned = 0usize;
        for key in self.store.list(StoreFamily::MatchIndex).await? {
            let Some(record) = load_json::<MatchRecord>(self.store.as_ref(), &key).await? else {
                continue;
            };
            // Written by a commit that never reached the queue write.
            if waiting_ids.contains(&record.participant_id) {
                self.store.remove(&key).await?;
                orphaned += 1;
                continue;
            }
            self.matches.put(record);
        }

        metrics::set_waiting(queue.size());
        metrics::set_active_sessions(self.sessions.len());
        info!(
            waiting = queue.size(),
            sessions = self.sessions.len(),
            matches = self.matches.len(),
            orphaned,
            rejected,
            "Lobby state restored"
        );
        Ok(())
    }

    fn check_restored(&self, session: &TurnSession) -> LobbyResult<()> {
        session.validate()?;
        if session.slot_count() > self.settings.max_slots {
            return Err(LobbyError::InvalidConfiguration(format!(
                "session has {} slots, max_slots is {}",
                session.slot_count(),
                self.settings.max_slots
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Admission queue
    // ------------------------------------------------------------------------

    /// Admit `handle` to the waiting set. Re-admitting a waiting handle
    /// returns its existing entry unchanged.
    pub async fn admit(&self, handle: &str) -> LobbyResult<Admission> {
        let _timer = OperationTimer::new("admit");
        let admission = record_error("admit", self.admit_inner(handle).await)?;

        if admission.fresh
            && self.settings.match_on_admit
            && let Err(e) = self.run_matching().await
        {
            warn!(handle = %handle, error = %e, "Inline matching pass failed");
        }
        Ok(admission)
    }

    async fn admit_inner(&self, handle: &str) -> LobbyResult<Admission> {
        if handle.trim().is_empty() {
            return Err(LobbyError::EmptyHandle);
        }
        let now = self.clock.now();
        let mut queue = self.queue.lock().await;

        let mut next = queue.clone();
        next.refresh_eligibility(now);
        let admission = next.admit(handle, self.ids.as_ref(), now);
        if !admission.fresh {
            return Ok(admission);
        }

        save_json(self.store.as_ref(), &StoreKey::Queue, next.state()).await?;
        *queue = next;

        metrics::record_admission();
        metrics::set_waiting(queue.size());
        let p = &admission.participant;
        info!(
            handle = %p.handle,
            participant = %p.id,
            ordinal = p.ordinal,
            rank = p.rank,
            tag = %p.tag,
            "Participant admitted"
        );
        Ok(admission)
    }

    /// Remove `handle` from the waiting set.
    pub async fn withdraw(&self, handle: &str) -> LobbyResult<WithdrawOutcome> {
        let _timer = OperationTimer::new("withdraw");
        record_error("withdraw", self.withdraw_inner(handle).await)
    }

    async fn withdraw_inner(&self, handle: &str) -> LobbyResult<WithdrawOutcome> {
        if handle.trim().is_empty() {
            return Err(LobbyError::EmptyHandle);
        }
        let mut queue = self.queue.lock().await;

        let outcome = if queue.get(handle).is_some() {
            let mut next = queue.clone();
            next.withdraw(handle);
            save_json(self.store.as_ref(), &StoreKey::Queue, next.state()).await?;
            *queue = next;
            metrics::set_waiting(queue.size());
            WithdrawOutcome::Removed
        } else if self.matches.contains(handle) {
            WithdrawOutcome::AlreadyMatched
        } else {
            WithdrawOutcome::NotWaiting
        };

        metrics::record_withdrawal(outcome.as_str());
        info!(handle = %handle, outcome = outcome.as_str(), "Withdrawal processed");
        Ok(outcome)
    }

    /// Poll the queue position of `handle`. `None` if it is not waiting.
    pub async fn queue_status(&self, handle: &str) -> LobbyResult<Option<QueueStatus>> {
        let _timer = OperationTimer::new("queue_status");
        if handle.trim().is_empty() {
            return record_error("queue_status", Err(LobbyError::EmptyHandle));
        }
        let now = self.clock.now();
        let queue = self.queue.lock().await;
        let Some(waiting) = queue.get(handle) else {
            return Ok(None);
        };

        let mut participant = waiting.clone();
        let eligible_at = participant.solo_eligible_at(queue.solo_wait());
        participant.eligible_for_solo |= now >= eligible_at;
        let remaining_ms = u64::try_from((eligible_at - now).num_milliseconds()).unwrap_or(0);

        Ok(Some(QueueStatus {
            participant,
            queue_len: queue.size(),
            seconds_until_solo: remaining_ms.div_ceil(1000),
        }))
    }

    /// The whole waiting set in rank order, eligibility as of now.
    pub async fn queue(&self) -> Vec<WaitingParticipant> {
        let now = self.clock.now();
        let mut view = self.queue.lock().await.clone();
        view.refresh_eligibility(now);
        view.snapshot()
    }

    /// Poll where `handle` was placed. Reading never removes the entry.
    pub fn match_result(&self, handle: &str) -> Option<MatchRecord> {
        self.matches.get(handle)
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Run one matching pass over the current waiting set.
    ///
    /// Matches commit one at a time. If a commit fails, matches committed
    /// earlier in the pass stay committed, the failing one is rolled back
    /// and its participants keep waiting.
    pub async fn run_matching(&self) -> LobbyResult<MatchReport> {
        let _timer = OperationTimer::new("run_matching");
        record_error("run_matching", self.run_matching_inner().await)
    }

    async fn run_matching_inner(&self) -> LobbyResult<MatchReport> {
        let now = self.clock.now();
        let mut queue = self.queue.lock().await;
        let span = spans::matching_pass(queue.size());

        async {
            let mut refreshed = queue.clone();
            refreshed.refresh_eligibility(now);
            if refreshed.state() != queue.state() {
                save_json(self.store.as_ref(), &StoreKey::Queue, refreshed.state()).await?;
                *queue = refreshed;
            }

            let plan = plan_matches(&queue.snapshot(), queue.rotation());
            let mut report = MatchReport::default();
            for planned in &plan.matches {
                let committed = self.commit_match(&mut queue, planned, now).await?;
                report.matches.push(committed);
            }
            report.waiting = queue.size();

            if !report.matches.is_empty() {
                info!(
                    matches = report.matches.len(),
                    waiting = report.waiting,
                    "Matching pass committed"
                );
            }
            Ok::<_, LobbyError>(report)
        }
        .instrument(span)
        .await
    }

    async fn commit_match(
        &self,
        queue: &mut AdmissionQueue,
        planned: &PlannedMatch,
        now: DateTime<Utc>,
    ) -> LobbyResult<CommittedMatch> {
        let mut log = CommitLog::default();
        match self.try_commit_match(queue, planned, now, &mut log).await {
            Ok(committed) => Ok(committed),
            Err(e) => {
                warn!(
                    kind = planned.kind().as_str(),
                    error = %e,
                    "Match commit failed, rolling back"
                );
                self.roll_back(log).await;
                Err(e)
            }
        }
    }

    async fn try_commit_match(
        &self,
        queue: &mut AdmissionQueue,
        planned: &PlannedMatch,
        now: DateTime<Utc>,
        log: &mut CommitLog,
    ) -> LobbyResult<CommittedMatch> {
        let kinds = planned.slot_kinds();
        let names = self.settings.names.draw(kinds.len())?;
        let mut session_id = self.ids.session_id();
        let mut session = TurnSession::new(session_id.clone(), &kinds, names.clone(), now)?;
        session.start();

        // Match records go first so callers can discover the placement while
        // the session itself is still being written.
        let placements: Vec<Placement> = planned
            .placements()
            .into_iter()
            .map(|(p, slot)| Placement {
                handle: p.handle.clone(),
                participant_id: p.id.clone(),
                tag: p.tag.clone(),
                slot,
            })
            .collect();
        for placement in &placements {
            let record = MatchRecord {
                original_handle: placement.handle.clone(),
                participant_id: placement.participant_id.clone(),
                session_id: session_id.clone(),
                slot_index: placement.slot,
                tag: placement.tag.clone(),
                matched_at: now,
            };
            save_json(
                self.store.as_ref(),
                &StoreKey::MatchIndex(placement.handle.clone()),
                &record,
            )
            .await?;
            let displaced = self.matches.put(record);
            log.records.push((placement.handle.clone(), displaced));
        }

        let mut attempt = 1;
        loop {
            match save_json(self.store.as_ref(), &StoreKey::Session(session_id.clone()), &session)
                .await
            {
                Ok(()) => break,
                Err(e) if attempt < self.settings.session_create_attempts => {
                    let retry_id = self.ids.session_id();
                    warn!(
                        session = %session_id,
                        retry = %retry_id,
                        attempt,
                        error = %e,
                        "Session write failed, retrying under a new id"
                    );
                    attempt += 1;
                    session_id = retry_id;
                    session = TurnSession::new(session_id.clone(), &kinds, names.clone(), now)?;
                    session.start();
                    for placement in &placements {
                        if let Some(record) =
                            self.matches.rebind_session(&placement.handle, &session_id)
                        {
                            save_json(
                                self.store.as_ref(),
                                &StoreKey::MatchIndex(placement.handle.clone()),
                                &record,
                            )
                            .await?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        log.sessions.push(session_id.clone());

        let mut next = queue.clone();
        next.remove_matched(&planned.participant_ids());
        save_json(self.store.as_ref(), &StoreKey::Queue, next.state()).await?;

        // Committed.
        *queue = next;
        self.sessions.put(session);

        let kind = planned.kind();
        let solo_reason = match planned {
            PlannedMatch::Solo { reason, .. } => Some(*reason),
            PlannedMatch::Pair { .. } => None,
        };
        metrics::record_match(kind.as_str());
        metrics::set_waiting(queue.size());
        metrics::set_active_sessions(self.sessions.len());
        for placement in &placements {
            info!(
                session = %session_id,
                kind = kind.as_str(),
                handle = %placement.handle,
                tag = %placement.tag,
                slot = placement.slot,
                "Participant matched"
            );
        }

        Ok(CommittedMatch {
            session_id,
            kind,
            placements,
            solo_reason,
        })
    }

    /// Best-effort undo of a failed commit.
    async fn roll_back(&self, log: CommitLog) {
        for session_id in log.sessions {
            if let Err(e) = self.store.remove(&StoreKey::Session(session_id.clone())).await {
                warn!(session = %session_id, error = %e, "Rollback could not remove session");
            }
        }
        for (handle, displaced) in log.records.into_iter().rev() {
            let key = StoreKey::MatchIndex(handle.clone());
            let undo = match &displaced {
                Some(previous) => save_json(self.store.as_ref(), &key, previous).await,
                None => self.store.remove(&key).await.map(|_| ()),
            };
            if let Err(e) = undo {
                warn!(handle = %handle, error = %e, "Rollback could not restore match record");
            }
            match displaced {
                Some(previous) => {
                    self.matches.put(previous);
                }
                None => {
                    self.matches.delete(&handle);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Append a message from `slot`. Does not advance the turn.
    pub async fn post_message(
        &self,
        session_id: &str,
        slot: usize,
        content: &str,
    ) -> LobbyResult<Message> {
        let _timer = OperationTimer::new("post_message");
        record_error(
            "post_message",
            self.post_message_inner(session_id, slot, content).await,
        )
    }

    async fn post_message_inner(
        &self,
        session_id: &str,
        slot: usize,
        content: &str,
    ) -> LobbyResult<Message> {
        let mut session = self.lock_session(session_id).await?;

        let mut next = session.clone();
        let message = next.post_message(slot, content, self.clock.now())?;
        self.persist_session(&next).await?;
        *session = next;

        metrics::record_message(message.kind.as_str());
        debug!(session = %session_id, slot, id = message.id, "Message posted");
        Ok(message)
    }

    /// Rotate to the next slot and return it. Automated turns are not played;
    /// follow up with [`Lobby::play_automated_turns`].
    pub async fn advance(&self, session_id: &str) -> LobbyResult<Slot> {
        let _timer = OperationTimer::new("advance");
        record_error("advance", self.advance_inner(session_id).await)
    }

    async fn advance_inner(&self, session_id: &str) -> LobbyResult<Slot> {
        let mut session = self.lock_session(session_id).await?;

        let mut next = session.clone();
        let current = next.advance()?.clone();
        self.persist_session(&next).await?;
        *session = next;

        debug!(
            session = %session_id,
            slot = current.index,
            kind = current.kind.as_str(),
            "Turn advanced"
        );
        Ok(current)
    }

    /// Play automated turns while the current slot is automated.
    ///
    /// [`Lobby::send_message`] does this itself; callers driving turns with
    /// [`Lobby::post_message`] and [`Lobby::advance`] call it after rotating,
    /// and it also resumes a reply that failed to persist.
    pub async fn play_automated_turns(&self, session_id: &str) -> LobbyResult<TurnOutcome> {
        let _timer = OperationTimer::new("play_automated_turns");
        record_error(
            "play_automated_turns",
            self.play_automated_turns_inner(session_id).await,
        )
    }

    async fn play_automated_turns_inner(&self, session_id: &str) -> LobbyResult<TurnOutcome> {
        let mut session = self.lock_session(session_id).await?;
        let automated = self
            .play_automated(&mut session)
            .instrument(spans::session(session_id))
            .await?;
        Ok(TurnOutcome {
            automated,
            current: session.current_slot().clone(),
        })
    }

    /// Post from `slot`, advance, and play the automated turns that follow.
    pub async fn send_message(
        &self,
        session_id: &str,
        slot: usize,
        content: &str,
    ) -> LobbyResult<SendOutcome> {
        let _timer = OperationTimer::new("send_message");
        record_error(
            "send_message",
            self.send_message_inner(session_id, slot, content).await,
        )
    }

    async fn send_message_inner(
        &self,
        session_id: &str,
        slot: usize,
        content: &str,
    ) -> LobbyResult<SendOutcome> {
        let mut session = self.lock_session(session_id).await?;

        let mut next = session.clone();
        let message = next.post_message(slot, content, self.clock.now())?;
        next.advance()?;
        self.persist_session(&next).await?;
        *session = next;
        metrics::record_message(message.kind.as_str());

        let automated = self
            .play_automated(&mut session)
            .instrument(spans::session(session_id))
            .await?;
        Ok(SendOutcome {
            message,
            automated,
            session: session.view(),
        })
    }

    /// Read-only view of a session.
    pub async fn session_state(&self, session_id: &str) -> LobbyResult<SessionView> {
        let _timer = OperationTimer::new("session_state");
        let result = self
            .lock_session(session_id)
            .await
            .map(|session| session.view());
        record_error("session_state", result)
    }

    /// Remove a session from the registry and the store.
    ///
    /// The core never retires sessions on its own; this is the hook for an
    /// external retention policy. A turn already in progress finishes first.
    pub async fn retire_session(&self, session_id: &str) -> LobbyResult<bool> {
        let _timer = OperationTimer::new("retire_session");
        record_error("retire_session", self.retire_session_inner(session_id).await)
    }

    async fn retire_session_inner(&self, session_id: &str) -> LobbyResult<bool> {
        let key = StoreKey::Session(session_id.to_string());
        let Some(handle) = self.sessions.get(session_id) else {
            self.store.remove(&key).await?;
            return Ok(false);
        };
        let _session = handle.lock().await;

        self.store.remove(&key).await?;
        let existed = self.sessions.delete(session_id).is_some();
        metrics::set_active_sessions(self.sessions.len());
        if existed {
            info!(session = %session_id, "Session retired");
        }
        Ok(existed)
    }

    /// Lock a registered session. Fails if it was retired while waiting.
    async fn lock_session(
        &self,
        session_id: &str,
    ) -> LobbyResult<OwnedMutexGuard<TurnSession>> {
        let handle: SessionHandle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| LobbyError::SessionNotFound(session_id.to_string()))?;
        let session = Arc::clone(&handle).lock_owned().await;
        if !self.sessions.holds(session_id, &handle) {
            return Err(LobbyError::SessionNotFound(session_id.to_string()));
        }
        Ok(session)
    }

    async fn persist_session(&self, session: &TurnSession) -> LobbyResult<()> {
        save_json(
            self.store.as_ref(),
            &StoreKey::Session(session.id().to_string()),
            session,
        )
        .await?;
        Ok(())
    }

    /// Automated-turn protocol: while the current slot is automated, render
    /// its prompt, ask the responder (falling back on any failure), post the
    /// reply and advance. Bounded by the slot count.
    async fn play_automated(&self, session: &mut TurnSession) -> LobbyResult<Vec<Message>> {
        let mut posted = Vec::new();
        for _ in 0..session.slot_count() {
            if !session.is_started() {
                break;
            }
            let speaker = session.current_slot().clone();
            if speaker.kind != SlotKind::Automated {
                break;
            }

            let prompt = session.prompt_for(speaker.index)?;
            let content = self
                .complete_or_fallback(&prompt)
                .instrument(spans::automated_turn(
                    session.id(),
                    speaker.index,
                    &speaker.display_name,
                ))
                .await;

            let mut next = session.clone();
            let message = next.post_message(speaker.index, content, self.clock.now())?;
            next.advance()?;
            self.persist_session(&next).await?;
            *session = next;

            metrics::record_message(message.kind.as_str());
            posted.push(message);
        }
        Ok(posted)
    }

    async fn complete_or_fallback(&self, prompt: &str) -> String {
        let started = Instant::now();
        let result =
            tokio::time::timeout(self.settings.responder_timeout, self.responder.complete(prompt))
                .await
                .unwrap_or(Err(ResponderError::Timeout))
                .and_then(|text| {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        Err(ResponderError::EmptyCompletion)
                    } else {
                        Ok(trimmed.to_string())
                    }
                });
        metrics::record_automated_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(text) => text,
            Err(e) => {
                metrics::record_fallback(e.error_code());
                warn!(reason = e.error_code(), error = %e, "Automated reply failed, posting fallback");
                self.settings.fallback_message.clone()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Match index maintenance
    // ------------------------------------------------------------------------

    /// Delete the match-index entry for `handle`. Returns whether one existed.
    pub async fn release_match(&self, handle: &str) -> LobbyResult<bool> {
        let _timer = OperationTimer::new("release_match");
        let _queue = self.queue.lock().await;
        let result = self
            .store
            .remove(&StoreKey::MatchIndex(handle.to_string()))
            .await
            .map_err(LobbyError::from);
        record_error("release_match", result)?;
        Ok(self.matches.delete(handle).is_some())
    }

    /// Evict match-index entries older than the configured TTL.
    pub async fn sweep_matches(&self) -> LobbyResult<usize> {
        let _timer = OperationTimer::new("sweep_matches");
        record_error("sweep_matches", self.sweep_matches_inner().await)
    }

    async fn sweep_matches_inner(&self) -> LobbyResult<usize> {
        let _queue = self.queue.lock().await;
        let cutoff = self.clock.now() - self.settings.match_ttl;

        for record in self.matches.older_than(cutoff) {
            self.store
                .remove(&StoreKey::MatchIndex(record.original_handle))
                .await?;
        }
        let evicted = self.matches.evict_older_than(cutoff).len();
        if evicted > 0 {
            info!(evicted, remaining = self.matches.len(), "Match index swept");
        }
        Ok(evicted)
    }

    pub async fn stats(&self) -> LobbyStats {
        let queue = self.queue.lock().await;
        LobbyStats {
            waiting: queue.size(),
            active_sessions: self.sessions.len(),
            match_index_size: self.matches.len(),
            total_admitted: queue.total_admitted(),
        }
    }
}
