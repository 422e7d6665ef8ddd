//! Append-only conversation transcript

use crate::session::{Role, Turn};

/// Ordered record of turns
///
/// Turns are never edited or removed. Sequence numbers start at 1 and grow
/// by exactly one per append.
#[derive(Debug, Default, Clone)]
pub struct TranscriptLog {
    turns: Vec<Turn>,
}

impl TranscriptLog {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a turn and return a copy of it
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Turn {
        let turn = Turn {
            role,
            text: text.into(),
            sequence: self.next_sequence(),
        };
        self.turns.push(turn.clone());
        turn
    }

    /// Sequence number the next append will receive
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.turns.last().map_or(1, |t| t.sequence + 1)
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_are_gapless() {
        let mut log = TranscriptLog::new();
        assert_eq!(log.next_sequence(), 1);

        log.append(Role::User, "hello");
        log.append(Role::Assistant, "hi");
        log.append(Role::User, "turn it off");

        let sequences: Vec<u64> = log.turns().iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(log.next_sequence(), 4);
    }

    #[test]
    fn test_append_returns_recorded_turn() {
        let mut log = TranscriptLog::new();
        let turn = log.append(Role::Assistant, "Turning it on");

        assert_eq!(log.last(), Some(&turn));
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(log.len(), 1);
        assert!(!log.is_empty());
    }
}
