use crate::store::{Bracket, BracketStore, MatchRecord};
use crate::Error;

use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};
use sportfed_core::{BracketStatus, MatchStatus, Slot};

use async_trait::async_trait;
use parking_lot::Mutex;

use std::collections::HashMap;

/// An in-memory [`BracketStore`].
///
/// Backs the engine test-suite and embedded callers that don't carry a
/// database. Every trait method takes the table lock once, so individual
/// calls are atomic; the engine's per-match locks provide the
/// read-modify-write serialization on top, exactly as with the MySQL
/// backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    brackets: HashMap<BracketId, Bracket>,
    matches: HashMap<MatchId, MatchRecord>,
    names: HashMap<ParticipantId, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a display name for `id`, standing in for the registration
    /// subsystem's data.
    pub fn insert_participant_name(&self, id: ParticipantId, name: impl Into<String>) {
        self.inner.lock().names.insert(id, name.into());
    }
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl BracketStore for MemoryStore {
    async fn insert_bracket(&self, bracket: &Bracket) -> Result<BracketId, Error> {
        let mut inner = self.inner.lock();

        if inner
            .brackets
            .values()
            .any(|b| b.category == bracket.category)
        {
            return Err(Error::BracketAlreadyExists {
                category: bracket.category,
            });
        }

        let id = BracketId(inner.next_id());
        inner.brackets.insert(id, Bracket { id, ..bracket.clone() });

        Ok(id)
    }

    async fn bracket(&self, id: BracketId) -> Result<Option<Bracket>, Error> {
        Ok(self.inner.lock().brackets.get(&id).cloned())
    }

    async fn bracket_by_category(&self, category: CategoryId) -> Result<Option<Bracket>, Error> {
        Ok(self
            .inner
            .lock()
            .brackets
            .values()
            .find(|b| b.category == category)
            .cloned())
    }

    async fn update_bracket_status(
        &self,
        id: BracketId,
        status: BracketStatus,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        match inner.brackets.get_mut(&id) {
            Some(bracket) => {
                bracket.status = status;
                Ok(())
            }
            None => Err(Error::BracketNotFound { id }),
        }
    }

    async fn insert_match(&self, record: &MatchRecord) -> Result<MatchId, Error> {
        let mut inner = self.inner.lock();

        if inner
            .matches
            .values()
            .any(|m| m.bracket == record.bracket && m.round == record.round && m.number == record.number)
        {
            return Err(Error::ConcurrentModification);
        }

        let id = MatchId(inner.next_id());
        inner.matches.insert(id, MatchRecord { id, ..record.clone() });

        Ok(id)
    }

    async fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, Error> {
        Ok(self.inner.lock().matches.get(&id).cloned())
    }

    async fn match_at(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<Option<MatchRecord>, Error> {
        Ok(self
            .inner
            .lock()
            .matches
            .values()
            .find(|m| m.bracket == bracket && m.round == round && m.number == number)
            .cloned())
    }

    async fn fetch_or_create_match(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<MatchRecord, Error> {
        let mut inner = self.inner.lock();

        if let Some(record) = inner
            .matches
            .values()
            .find(|m| m.bracket == bracket && m.round == round && m.number == number)
        {
            return Ok(record.clone());
        }

        let id = MatchId(inner.next_id());
        let record = MatchRecord {
            id,
            bracket,
            round,
            number,
            slots: [Slot::Empty, Slot::Empty],
            status: MatchStatus::AwaitingParticipants,
            winner: None,
            score_a: None,
            score_b: None,
            ended_at: None,
        };

        inner.matches.insert(id, record.clone());

        Ok(record)
    }

    async fn update_match(&self, record: &MatchRecord) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        match inner.matches.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(Error::MatchNotFound { id: record.id }),
        }
    }

    async fn matches(&self, bracket: BracketId) -> Result<Vec<MatchRecord>, Error> {
        let inner = self.inner.lock();

        let mut matches: Vec<MatchRecord> = inner
            .matches
            .values()
            .filter(|m| m.bracket == bracket)
            .cloned()
            .collect();

        matches.sort_by_key(|m| (m.round, m.number));

        Ok(matches)
    }

    async fn delete_matches_after_round(
        &self,
        bracket: BracketId,
        round: u64,
    ) -> Result<(), Error> {
        self.inner
            .lock()
            .matches
            .retain(|_, m| m.bracket != bracket || m.round <= round);

        Ok(())
    }

    async fn delete_bracket(&self, id: BracketId) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        inner.matches.retain(|_, m| m.bracket != id);
        inner.brackets.remove(&id);

        Ok(())
    }

    async fn participant_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, Error> {
        let inner = self.inner.lock();

        Ok(ids
            .iter()
            .filter_map(|id| inner.names.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}
