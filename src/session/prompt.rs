//! Prompt rendering for automated turns.

use super::TurnSession;
use crate::error::SessionError;
use std::fmt::Write;

impl TurnSession {
    /// Render the completion prompt for the participant in `slot`.
    ///
    /// The full log is rendered one `displayName: content` line per message,
    /// framed by instructions naming the display name being spoken as.
    pub fn prompt_for(&self, slot: usize) -> Result<String, SessionError> {
        let speaker = self.slot(slot).ok_or(SessionError::UnknownSlot(slot))?;
        let name = &speaker.display_name;

        let mut prompt = format!(
            "You are {name}. Read the conversation below and continue it with your next line.\n\n"
        );
        for message in self.messages() {
            let _ = writeln!(prompt, "{}: {}", message.display_name, message.content);
        }
        let _ = write!(prompt, "\nYou are {name}. Reply to the conversation above now.");
        Ok(prompt)
    }
}
