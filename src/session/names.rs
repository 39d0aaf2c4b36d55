//! Display-name pool for session slots.

use crate::error::SessionError;
use rand::seq::SliceRandom;

/// Fixed pool of display names, e.g. `Player A` .. `Player E`.
///
/// A session of `n` slots gets the first `n` names of the pool, shuffled
/// unless shuffling is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePool {
    names: Vec<String>,
    shuffle: bool,
}

impl NamePool {
    pub fn new(names: Vec<String>, shuffle: bool) -> Self {
        Self { names, shuffle }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Draw display names for a session with `count` slots.
    pub fn draw(&self, count: usize) -> Result<Vec<String>, SessionError> {
        if count > self.names.len() {
            return Err(SessionError::InvalidConfiguration(format!(
                "{count} slots requested but the name pool only has {} names",
                self.names.len()
            )));
        }
        let mut drawn = self.names[..count].to_vec();
        if self.shuffle {
            drawn.shuffle(&mut rand::thread_rng());
        }
        Ok(drawn)
    }
}

impl Default for NamePool {
    fn default() -> Self {
        Self::new(
            ["Player A", "Player B", "Player C", "Player D", "Player E"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            true,
        )
    }
}
