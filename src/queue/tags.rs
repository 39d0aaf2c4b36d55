//! Class tags and the rotation that assigns them.
//!
//! A participant's tag is a pure function of its global arrival ordinal:
//! `rotation[(ordinal - 1) mod len]`. One tag is designated solo-only (always
//! matched against an automated counterpart); two others form the pairable
//! classes L and R, which only pair with each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A class tag, e.g. `"A"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Role a tag plays in the pairing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Never pairs with a human; always matched with an automated slot.
    Solo,
    /// Pairable class L. Takes slot 0 in a pair.
    Left,
    /// Pairable class R. Takes slot 1 in a pair.
    Right,
}

impl TagClass {
    /// The class a pairable tag must meet to form a pair.
    pub fn complement(self) -> Option<TagClass> {
        match self {
            TagClass::Left => Some(TagClass::Right),
            TagClass::Right => Some(TagClass::Left),
            TagClass::Solo => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationError {
    #[error("tag rotation is empty")]
    Empty,
    #[error("{role} tag '{tag}' does not occur in the rotation")]
    NotInRotation { role: &'static str, tag: String },
    #[error("solo and pair tags must be distinct, '{0}' is used twice")]
    Duplicate(String),
    #[error("rotation member '{0}' is neither the solo tag nor a pair tag")]
    Unclassified(String),
}

/// The configured tag rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRotation {
    members: Vec<Tag>,
    solo: Tag,
    left: Tag,
    right: Tag,
}

impl TagRotation {
    /// Build a rotation, checking that every member has a role.
    pub fn new(
        members: Vec<Tag>,
        solo: Tag,
        left: Tag,
        right: Tag,
    ) -> Result<Self, RotationError> {
        if members.is_empty() {
            return Err(RotationError::Empty);
        }
        if left == right || left == solo {
            return Err(RotationError::Duplicate(left.0));
        }
        if right == solo {
            return Err(RotationError::Duplicate(right.0));
        }
        for (role, tag) in [("solo", &solo), ("left pair", &left), ("right pair", &right)] {
            if !members.contains(tag) {
                return Err(RotationError::NotInRotation {
                    role,
                    tag: tag.0.clone(),
                });
            }
        }
        if let Some(stray) = members
            .iter()
            .find(|t| **t != solo && **t != left && **t != right)
        {
            return Err(RotationError::Unclassified(stray.0.clone()));
        }

        Ok(Self {
            members,
            solo,
            left,
            right,
        })
    }

    /// Tag for the participant with the given 1-based global arrival ordinal.
    pub fn tag_for(&self, ordinal: u64) -> &Tag {
        let idx = ordinal.saturating_sub(1) % self.members.len() as u64;
        &self.members[idx as usize]
    }

    /// Role of `tag` in this rotation, if it belongs to it.
    pub fn classify(&self, tag: &Tag) -> Option<TagClass> {
        if *tag == self.solo {
            Some(TagClass::Solo)
        } else if *tag == self.left {
            Some(TagClass::Left)
        } else if *tag == self.right {
            Some(TagClass::Right)
        } else {
            None
        }
    }

    pub fn solo_tag(&self) -> &Tag {
        &self.solo
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for TagRotation {
    /// `[A, B, C]` with `C` solo-only and `A`/`B` pairing.
    fn default() -> Self {
        Self {
            members: vec!["A".into(), "B".into(), "C".into()],
            solo: "C".into(),
            left: "A".into(),
            right: "B".into(),
        }
    }
}
