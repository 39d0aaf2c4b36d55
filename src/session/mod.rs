//! Turn-rotating conversation sessions.
//!
//! A [`TurnSession`] is created fully populated when a match commits: its
//! slot roster never changes afterwards. Once started, exactly one slot is the
//! current speaker; posting and advancing are separate steps so a caller can
//! inspect a message before rotating.
//!
//! ```text
//! Created ──start()──► Started ──post_message()/advance()──► Started ...
//! ```

mod names;
mod prompt;

pub use names::NamePool;

use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who occupies a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Human,
    Automated,
}

impl SlotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotKind::Human => "human",
            SlotKind::Automated => "automated",
        }
    }
}

/// A seat in the session's fixed speaking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub index: usize,
    pub kind: SlotKind,
    pub display_name: String,
}

/// One entry of the append-only message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 1-based append order within the session.
    pub id: u64,
    pub slot: usize,
    pub display_name: String,
    pub kind: SlotKind,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Turn state machine for one matched group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSession {
    id: String,
    slots: Vec<Slot>,
    messages: Vec<Message>,
    current: usize,
    started: bool,
    created_at: DateTime<Utc>,
}

impl TurnSession {
    /// Create an unstarted session with one slot per entry of `kinds`.
    ///
    /// `names` supplies the display names in slot order and must be unique
    /// and exactly as long as `kinds`.
    pub fn new(
        id: impl Into<String>,
        kinds: &[SlotKind],
        names: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if kinds.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "a session needs at least one slot".into(),
            ));
        }
        if names.len() != kinds.len() {
            return Err(SessionError::InvalidConfiguration(format!(
                "{} display names for {} slots",
                names.len(),
                kinds.len()
            )));
        }
        for (idx, name) in names.iter().enumerate() {
            if names[..idx].contains(name) {
                return Err(SessionError::InvalidConfiguration(format!(
                    "display name '{name}' used twice"
                )));
            }
        }

        let slots = kinds
            .iter()
            .zip(names)
            .enumerate()
            .map(|(index, (&kind, display_name))| Slot {
                index,
                kind,
                display_name,
            })
            .collect();

        Ok(Self {
            id: id.into(),
            slots,
            messages: Vec::new(),
            current: 0,
            started: false,
            created_at,
        })
    }

    /// Check a session read back from storage: a well-formed roster, a
    /// current speaker inside it and a message log in append order.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.slots.is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "a session needs at least one slot".into(),
            ));
        }
        for (position, slot) in self.slots.iter().enumerate() {
            if slot.index != position {
                return Err(SessionError::InvalidConfiguration(format!(
                    "slot {position} carries index {}",
                    slot.index
                )));
            }
            if self.slots[..position]
                .iter()
                .any(|s| s.display_name == slot.display_name)
            {
                return Err(SessionError::InvalidConfiguration(format!(
                    "display name '{}' used twice",
                    slot.display_name
                )));
            }
        }
        if self.current >= self.slots.len() {
            return Err(SessionError::InvalidConfiguration(format!(
                "current speaker {} outside {} slots",
                self.current,
                self.slots.len()
            )));
        }
        for (position, message) in self.messages.iter().enumerate() {
            if message.id != position as u64 + 1 || message.slot >= self.slots.len() {
                return Err(SessionError::InvalidConfiguration(format!(
                    "message {} out of order or from unknown slot {}",
                    message.id, message.slot
                )));
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Begin the conversation with slot 0. No-op if already started.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.current = 0;
        }
    }

    /// Whether `slot` may post right now.
    pub fn is_turn(&self, slot: usize) -> bool {
        self.started && self.current == slot
    }

    /// The slot whose turn it is.
    pub fn current_slot(&self) -> &Slot {
        &self.slots[self.current]
    }

    /// Append a message from `slot`. Does not advance the turn.
    pub fn post_message(
        &mut self,
        slot: usize,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Message, SessionError> {
        let Some(speaker) = self.slots.get(slot) else {
            return Err(SessionError::UnknownSlot(slot));
        };
        if !self.is_turn(slot) {
            return Err(SessionError::TurnViolation {
                slot,
                current: self.current,
            });
        }

        let message = Message {
            id: self.messages.len() as u64 + 1,
            slot,
            display_name: speaker.display_name.clone(),
            kind: speaker.kind,
            content: content.into(),
            sent_at: now,
        };
        self.messages.push(message.clone());
        Ok(message)
    }

    /// Rotate to the next slot, wrapping after the last one.
    pub fn advance(&mut self) -> Result<&Slot, SessionError> {
        if !self.started {
            return Err(SessionError::NotStarted);
        }
        self.current = (self.current + 1) % self.slots.len();
        Ok(&self.slots[self.current])
    }

    /// Read-only view for polling clients.
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id.clone(),
            started: self.started,
            current_slot: self.current,
            slots: self
                .slots
                .iter()
                .map(|s| SlotView {
                    slot: s.clone(),
                    is_current: self.is_turn(s.index),
                })
                .collect(),
            messages: self.messages.clone(),
            created_at: self.created_at,
        }
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub started: bool,
    pub current_slot: usize,
    pub slots: Vec<SlotView>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub is_current: bool,
}
