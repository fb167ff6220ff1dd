//! Contract errors raised while recording a decision task.
//!
//! These are programming-contract violations of the task builder. They are
//! returned instead of silently corrupting the task, and the task is left
//! unchanged when one is returned.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// a round was opened, closed or appended to in the wrong state
    #[error("invalid round state: {0}")]
    InvalidRoundState(&'static str),
    /// the clause id is already live in the open round
    #[error("clause id {clause_id} is already live in the current round")]
    ClauseIdCollision { clause_id: usize },
    /// a value address was bound to a clause that is not live
    #[error("clause id {clause_id} is not live in the current round")]
    UnknownClause { clause_id: usize },
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
