//! # sportfed-engine
//!
//! The tournament bracket engine: generation of single elimination brackets
//! from a roster of eligible competition entrants, round-by-round winner
//! progression and completion detection, backed by a durable [`BracketStore`].
//!
//! The engine has no network protocol of its own; the host application calls
//! [`BracketEngine`] in-process. The [`MySqlStore`] backend is the production
//! path, [`MemoryStore`] serves embedded callers and the test-suite.
//!
//! [`BracketStore`]: store::BracketStore
//! [`MySqlStore`]: store::MySqlStore
//! [`MemoryStore`]: store::MemoryStore
pub mod config;
pub mod engine;
pub mod logger;
pub mod store;

pub use config::Config;
pub use engine::BracketEngine;

use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};

use thiserror::Error;

/// An `Result<T>` using [`enum@Error`] as an error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Store(#[from] sqlx::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("insufficient participants: expected at least 2, found {found}")]
    InsufficientParticipants { found: usize },
    #[error("a bracket for category {category} already exists")]
    BracketAlreadyExists { category: CategoryId },
    #[error("no bracket with id {id}")]
    BracketNotFound { id: BracketId },
    #[error("no match with id {id}")]
    MatchNotFound { id: MatchId },
    #[error("match {id} is still awaiting participants from earlier rounds")]
    MatchNotReady { id: MatchId },
    #[error("the result of match {id} is already recorded; reset the bracket to change it")]
    MatchAlreadyCompleted { id: MatchId },
    #[error("participant {participant} plays in neither slot of match {id}")]
    WinnerNotInMatch {
        id: MatchId,
        participant: ParticipantId,
    },
    #[error("the match row was modified concurrently")]
    ConcurrentModification,
}

impl From<sportfed_core::Error> for Error {
    fn from(err: sportfed_core::Error) -> Self {
        match err {
            sportfed_core::Error::InsufficientParticipants { found } => {
                Self::InsufficientParticipants { found }
            }
        }
    }
}
