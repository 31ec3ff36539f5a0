use crate::error::GemError;
use crate::types::{Role, Turn};

/// Ordered turn history of one session.
///
/// Turns strictly alternate starting with [`Role::User`]. The store lives in memory
/// for the lifetime of the process and is never persisted.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role the next appended turn must carry.
    pub fn expected_role(&self) -> Role {
        match self.turns.last() {
            Some(Turn {
                role: Role::User, ..
            }) => Role::Model,
            _ => Role::User,
        }
    }

    /// Appends a turn after checking the alternation invariant.
    ///
    /// # Errors
    ///
    /// Returns [`GemError::State`] when `turn` does not carry [`Self::expected_role`].
    pub fn append(&mut self, turn: Turn) -> Result<(), GemError> {
        let expected = self.expected_role();
        if turn.role != expected {
            return Err(GemError::state(format!(
                "expected a {} turn after {} turns, got {}",
                expected.as_str(),
                self.turns.len(),
                turn.role.as_str()
            )));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Appends a completed user/model exchange, or nothing at all.
    pub fn append_exchange(&mut self, user: Turn, model: Turn) -> Result<(), GemError> {
        if self.expected_role() != Role::User || user.role != Role::User || model.role != Role::Model
        {
            return Err(GemError::state(format!(
                "cannot append {}/{} exchange after {} turns",
                user.role.as_str(),
                model.role.as_str(),
                self.turns.len()
            )));
        }
        self.turns.push(user);
        self.turns.push(model);
        Ok(())
    }

    /// Drops every turn. Calling it on an empty store is a no-op.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Copies the current history in chronological order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
