mod memory;
mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

use crate::Error;

use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};
use sportfed_core::{BracketKind, BracketStatus, MatchStatus, Slot, SlotIndex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::collections::HashMap;

/// One elimination tree for one competition category.
///
/// `entrants` is the seed order the bracket was generated from. Together with
/// `size` it fully determines the round 1 pairing; both are immutable once
/// the bracket exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub id: BracketId,
    pub category: CategoryId,
    pub kind: BracketKind,
    pub size: u64,
    pub status: BracketStatus,
    pub entrants: Vec<ParticipantId>,
    pub generated_at: DateTime<Utc>,
}

impl Bracket {
    /// Returns the number of rounds played in the bracket.
    #[inline]
    pub fn rounds(&self) -> u64 {
        sportfed_core::round_count(self.size)
    }
}

/// One node of the elimination tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub bracket: BracketId,
    /// 1-based round number; round 1 is the first round.
    pub round: u64,
    /// 1-based match number, unique within the round.
    pub number: u64,
    pub slots: [Slot<ParticipantId>; 2],
    pub status: MatchStatus,
    pub winner: Option<ParticipantId>,
    pub score_a: Option<f64>,
    pub score_b: Option<f64>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// Returns a reference to the slot at `index`.
    #[inline]
    pub fn slot(&self, index: SlotIndex) -> &Slot<ParticipantId> {
        &self.slots[index.index()]
    }

    /// Returns the slot occupied by `participant`, or `None` if the
    /// participant plays in neither slot.
    pub fn position_of(&self, participant: ParticipantId) -> Option<SlotIndex> {
        for index in [SlotIndex::A, SlotIndex::B] {
            if self.slot(index).participant() == Some(&participant) {
                return Some(index);
            }
        }

        None
    }
}

/// Durable storage for bracket and match rows.
///
/// Every method is a single atomic operation on the store. The engine layers
/// per-match mutual exclusion on top; implementations only have to guarantee
/// that individual calls do not interleave and that the
/// `(bracket, round, number)` coordinates stay unique.
#[async_trait]
pub trait BracketStore: Send + Sync {
    /// Inserts `bracket` and returns the id assigned to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BracketAlreadyExists`] if a bracket for the same
    /// category is already stored.
    async fn insert_bracket(&self, bracket: &Bracket) -> Result<BracketId, Error>;

    /// Returns the bracket with the given `id`, or `None` if no such bracket
    /// exists.
    async fn bracket(&self, id: BracketId) -> Result<Option<Bracket>, Error>;

    /// Returns the bracket owned by `category`, or `None`.
    async fn bracket_by_category(&self, category: CategoryId) -> Result<Option<Bracket>, Error>;

    async fn update_bracket_status(&self, id: BracketId, status: BracketStatus)
        -> Result<(), Error>;

    /// Inserts `record` and returns the id assigned to it.
    async fn insert_match(&self, record: &MatchRecord) -> Result<MatchId, Error>;

    /// Returns the match with the given `id`, or `None`.
    async fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, Error>;

    /// Returns the match at `(bracket, round, number)`, or `None` if the
    /// node has not been materialized.
    async fn match_at(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<Option<MatchRecord>, Error>;

    /// Returns the match at `(bracket, round, number)`, creating an empty
    /// [`MatchStatus::AwaitingParticipants`] row if none exists yet. Rounds
    /// past the first are materialized lazily through this method.
    async fn fetch_or_create_match(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<MatchRecord, Error>;

    /// Writes `record` over the stored row with the same id. Slots, status,
    /// winner, scores and the completion timestamp are written together; a
    /// partial update is never observable.
    async fn update_match(&self, record: &MatchRecord) -> Result<(), Error>;

    /// Returns all matches of `bracket` ordered by `(round, number)`.
    async fn matches(&self, bracket: BracketId) -> Result<Vec<MatchRecord>, Error>;

    /// Deletes every match of `bracket` in a round greater than `round`.
    /// Supports resets, which regenerate the lazily created rounds.
    async fn delete_matches_after_round(&self, bracket: BracketId, round: u64)
        -> Result<(), Error>;

    /// Deletes all matches of the bracket, then the bracket itself.
    async fn delete_bracket(&self, id: BracketId) -> Result<(), Error>;

    /// Returns display names for `ids`, joined from the registration
    /// subsystem. Ids without a registration row are absent from the map.
    async fn participant_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, Error>;
}
