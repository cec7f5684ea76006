use crate::store::{Bracket, BracketStore, MatchRecord};
use crate::Error;

use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};
use sportfed_core::{
    bracket_size, seed_round_one, winner_destination, BracketKind, BracketStatus, MatchStatus, Slot,
};

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use std::collections::HashMap;
use std::sync::Arc;

/// The bracket engine.
///
/// Wraps a [`BracketStore`] and implements generation, winner progression,
/// completion detection and the administrative reset/delete operations on
/// top of it. Every operation is a short request/response unit of work; the
/// engine keeps no bracket state between calls.
///
/// Mutual exclusion is per match node: any read-modify-write of a single
/// match row runs under an async mutex keyed by the `(bracket, round,
/// number)` coordinates of that row, including the lazy creation of a
/// destination match. Mutations of different matches proceed in parallel,
/// there is no bracket-wide lock.
#[derive(Debug)]
pub struct BracketEngine<S> {
    store: S,
    locks: MatchLocks,
}

impl<S> BracketEngine<S>
where
    S: BracketStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: MatchLocks::default(),
        }
    }

    /// Returns a reference to the underlying store.
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Generates the bracket for `category` from an ordered roster of
    /// eligible participants.
    ///
    /// The roster order is the seed order; the engine does not re-sort.
    /// Structural byes resolve immediately and their winners advance before
    /// the call returns, so sparse rosters already have their early
    /// follow-up rows materialized. Returns the bracket and all matches that
    /// exist after generation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BracketAlreadyExists`] if the category already has a
    /// bracket and [`Error::InsufficientParticipants`] for a roster of fewer
    /// than 2 entrants.
    pub async fn generate(
        &self,
        category: CategoryId,
        participants: &[ParticipantId],
    ) -> Result<(Bracket, Vec<MatchRecord>), Error> {
        if self.store.bracket_by_category(category).await?.is_some() {
            return Err(Error::BracketAlreadyExists { category });
        }

        let size = bracket_size(participants.len())?;

        let bracket = Bracket {
            id: BracketId(0),
            category,
            kind: BracketKind::SingleElimination,
            size,
            status: BracketStatus::Pending,
            entrants: participants.to_vec(),
            generated_at: Utc::now(),
        };

        let id = self.store.insert_bracket(&bracket).await?;
        let bracket = Bracket { id, ..bracket };

        log::info!(
            "Generated bracket {} for category {}: {} participants, size {}",
            id,
            category,
            participants.len(),
            size
        );

        let mut byes = Vec::new();

        for seeded in seed_round_one(participants, size) {
            let mut record = MatchRecord {
                id: MatchId(0),
                bracket: id,
                round: 1,
                number: seeded.number,
                slots: seeded.slots,
                status: MatchStatus::Scheduled,
                winner: None,
                score_a: None,
                score_b: None,
                ended_at: None,
            };

            // A structural bye resolves at generation time: the populated
            // slot wins without playing.
            if let Some(bye) = record.slots.iter().position(|slot| slot.is_bye()) {
                let winner = *record.slots[1 - bye]
                    .participant()
                    .expect("seeding never produces a match of two byes");

                record.status = MatchStatus::Completed;
                record.winner = Some(winner);
                record.ended_at = Some(Utc::now());
            }

            record.id = self.store.insert_match(&record).await?;

            if record.status == MatchStatus::Completed {
                byes.push(record);
            }
        }

        if !byes.is_empty() {
            self.store
                .update_bracket_status(id, BracketStatus::InProgress)
                .await?;
        }

        for record in &byes {
            self.advance_winner(&bracket, record).await?;
        }

        let bracket = self
            .store
            .bracket(id)
            .await?
            .ok_or(Error::BracketNotFound { id })?;
        let matches = self.store.matches(id).await?;

        Ok((bracket, matches))
    }

    /// Records the result of a match and advances the winner into the next
    /// round.
    ///
    /// Re-submitting a decided match is rejected with
    /// [`Error::MatchAlreadyCompleted`] rather than silently accepted; a
    /// correction goes through [`reset`] instead. A
    /// [`Error::ConcurrentModification`] conflict from the store is retried
    /// once before surfacing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MatchNotFound`] for an unknown id,
    /// [`Error::MatchNotReady`] while a slot still waits for a feeding
    /// round and [`Error::WinnerNotInMatch`] if `winner` plays in neither
    /// slot.
    ///
    /// [`reset`]: Self::reset
    pub async fn record_result(
        &self,
        id: MatchId,
        winner: ParticipantId,
        score_a: Option<f64>,
        score_b: Option<f64>,
    ) -> Result<MatchRecord, Error> {
        let (bracket, record) = match self.complete_match(id, winner, score_a, score_b).await {
            Err(Error::ConcurrentModification) => {
                log::debug!("Retrying result of match {} after a conflict", id);

                self.complete_match(id, winner, score_a, score_b).await?
            }
            res => res?,
        };

        if bracket.status == BracketStatus::Pending {
            self.store
                .update_bracket_status(bracket.id, BracketStatus::InProgress)
                .await?;
        }

        // Advancing is an idempotent slot write; a conflicted attempt is
        // simply replayed. It must never be skipped silently.
        if let Err(Error::ConcurrentModification) = self.advance_winner(&bracket, &record).await {
            log::debug!("Retrying advancement out of match {} after a conflict", id);

            self.advance_winner(&bracket, &record).await?;
        }

        self.detect_completion(&bracket).await?;

        Ok(record)
    }

    /// Validates and writes the result itself: scores, winner, status and
    /// completion timestamp in one write under the match row lock.
    async fn complete_match(
        &self,
        id: MatchId,
        winner: ParticipantId,
        score_a: Option<f64>,
        score_b: Option<f64>,
    ) -> Result<(Bracket, MatchRecord), Error> {
        // The coordinates are needed before the row lock can be taken.
        let probe = self
            .store
            .match_by_id(id)
            .await?
            .ok_or(Error::MatchNotFound { id })?;

        let bracket = self
            .store
            .bracket(probe.bracket)
            .await?
            .ok_or(Error::BracketNotFound { id: probe.bracket })?;

        let lock = self.locks.get(probe.bracket, probe.round, probe.number);
        let _guard = lock.lock().await;

        // Re-read under the lock; the row may have changed in between.
        let mut record = self
            .store
            .match_by_id(id)
            .await?
            .ok_or(Error::MatchNotFound { id })?;

        match record.status {
            MatchStatus::Completed => return Err(Error::MatchAlreadyCompleted { id }),
            // At least one slot is still empty; its occupant arrives with a
            // result from the feeding round.
            MatchStatus::AwaitingParticipants => return Err(Error::MatchNotReady { id }),
            MatchStatus::Scheduled => {}
        }

        if record.position_of(winner).is_none() {
            return Err(Error::WinnerNotInMatch {
                id,
                participant: winner,
            });
        }

        record.winner = Some(winner);
        record.score_a = score_a;
        record.score_b = score_b;
        record.status = MatchStatus::Completed;
        record.ended_at = Some(Utc::now());

        self.store.update_match(&record).await?;

        log::debug!(
            "Recorded winner {} for match {} (round {}, match {})",
            winner,
            id,
            record.round,
            record.number
        );

        Ok((bracket, record))
    }

    /// Writes the winner of `record` into its destination slot in the next
    /// round, lazily creating the destination row.
    ///
    /// If the destination's opposing slot is a structural bye the
    /// destination resolves immediately and the advancement recurses, so a
    /// winner falls through consecutive bye rounds in one call.
    fn advance_winner<'a>(
        &'a self,
        bracket: &'a Bracket,
        record: &'a MatchRecord,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let winner = record
                .winner
                .expect("advance_winner called on a match without a winner");

            let dest = match winner_destination(record.round, record.number, bracket.rounds()) {
                Some(dest) => dest,
                // The final match; nothing left to advance into.
                None => return Ok(()),
            };

            let resolved = {
                let lock = self.locks.get(bracket.id, dest.round, dest.number);
                let _guard = lock.lock().await;

                let mut target = self
                    .store
                    .fetch_or_create_match(bracket.id, dest.round, dest.number)
                    .await?;

                if target.status == MatchStatus::Completed {
                    // A decided destination only ever sees the replay of a
                    // cascade write that already committed; any other
                    // arrival would overwrite a recorded result.
                    if *target.slot(dest.slot) != Slot::Participant(winner) {
                        return Err(Error::MatchAlreadyCompleted { id: target.id });
                    }

                    (target.winner == Some(winner)).then_some(target)
                } else {
                    target.slots[dest.slot.index()] = Slot::Participant(winner);

                    target.status = match target.slot(dest.slot.other()) {
                        Slot::Participant(_) => MatchStatus::Scheduled,
                        Slot::Empty => MatchStatus::AwaitingParticipants,
                        // The opponent never arrives; the winner falls
                        // through.
                        Slot::Bye => {
                            target.winner = Some(winner);
                            target.ended_at = Some(Utc::now());
                            MatchStatus::Completed
                        }
                    };

                    self.store.update_match(&target).await?;

                    log::debug!(
                        "Advanced {} into round {}, match {}, slot {:?} of bracket {}",
                        winner,
                        dest.round,
                        dest.number,
                        dest.slot,
                        bracket.id
                    );

                    (target.status == MatchStatus::Completed).then_some(target)
                }
            };

            match resolved {
                Some(target) => self.advance_winner(bracket, &target).await,
                None => Ok(()),
            }
        })
    }

    /// Marks the bracket completed once the unique final-round match has a
    /// recorded winner. Runs after every recorded result; redundant runs are
    /// harmless.
    async fn detect_completion(&self, bracket: &Bracket) -> Result<(), Error> {
        let r#final = match self.store.match_at(bracket.id, bracket.rounds(), 1).await? {
            Some(r#final) => r#final,
            // The final has not been materialized yet.
            None => return Ok(()),
        };

        if r#final.status == MatchStatus::Completed && bracket.status != BracketStatus::Completed {
            log::info!("Bracket {} completed", bracket.id);

            self.store
                .update_bracket_status(bracket.id, BracketStatus::Completed)
                .await?;
        }

        Ok(())
    }

    /// Returns a read-only projection of the bracket: the bracket row, all
    /// materialized matches ordered by `(round, number)` and the entrant
    /// display summaries joined from the registration store.
    pub async fn get_bracket(&self, id: BracketId) -> Result<BracketView, Error> {
        let bracket = self
            .store
            .bracket(id)
            .await?
            .ok_or(Error::BracketNotFound { id })?;

        let matches = self.store.matches(id).await?;
        let names = self.store.participant_names(&bracket.entrants).await?;

        let entrants = bracket
            .entrants
            .iter()
            .enumerate()
            .map(|(index, participant)| EntrantSummary {
                id: *participant,
                seed: index as u64 + 1,
                name: names.get(participant).cloned(),
            })
            .collect();

        Ok(BracketView {
            bracket,
            matches,
            entrants,
        })
    }

    /// Clears every recorded result of the bracket while preserving the
    /// seeded round 1 slots.
    ///
    /// Lazily created later rounds are deleted and the structural byes
    /// replayed, so the bracket returns to the exact state it had right
    /// after generation, except that its status is
    /// [`BracketStatus::Pending`].
    pub async fn reset(&self, id: BracketId) -> Result<(), Error> {
        let bracket = self
            .store
            .bracket(id)
            .await?
            .ok_or(Error::BracketNotFound { id })?;

        self.store.delete_matches_after_round(id, 1).await?;

        let mut byes = Vec::new();

        for mut record in self.store.matches(id).await? {
            if record.slots.iter().any(|slot| slot.is_bye()) {
                // Structural byes are a property of the seeding; they
                // re-resolve instead of being cleared.
                let winner = *record
                    .slots
                    .iter()
                    .find_map(|slot| slot.participant())
                    .expect("seeding never produces a match of two byes");

                record.status = MatchStatus::Completed;
                record.winner = Some(winner);
                record.ended_at = Some(Utc::now());
            } else {
                record.status = MatchStatus::Scheduled;
                record.winner = None;
                record.ended_at = None;
            }

            record.score_a = None;
            record.score_b = None;

            self.store.update_match(&record).await?;

            if record.status == MatchStatus::Completed {
                byes.push(record);
            }
        }

        for record in &byes {
            self.advance_winner(&bracket, record).await?;
        }

        self.store
            .update_bracket_status(id, BracketStatus::Pending)
            .await?;

        log::info!("Reset bracket {}", id);

        Ok(())
    }

    /// Deletes all matches of the bracket, then the bracket itself.
    ///
    /// Whether the owning category is allowed to lose its bracket is the
    /// caller's competition workflow to enforce.
    pub async fn delete(&self, id: BracketId) -> Result<(), Error> {
        if self.store.bracket(id).await?.is_none() {
            return Err(Error::BracketNotFound { id });
        }

        self.store.delete_bracket(id).await?;
        self.locks.remove_bracket(id);

        log::info!("Deleted bracket {}", id);

        Ok(())
    }
}

/// The projection returned by [`BracketEngine::get_bracket`].
#[derive(Clone, Debug, Serialize)]
pub struct BracketView {
    pub bracket: Bracket,
    pub matches: Vec<MatchRecord>,
    pub entrants: Vec<EntrantSummary>,
}

/// Display data for one seeded entrant.
#[derive(Clone, Debug, Serialize)]
pub struct EntrantSummary {
    pub id: ParticipantId,
    /// The 1-based seed position within the bracket.
    pub seed: u64,
    /// The display name from the registration subsystem, if registered.
    pub name: Option<String>,
}

/// Async mutexes keyed by the `(bracket, round, number)` coordinates of a
/// match node. Entries live until their bracket is deleted; a completed
/// bracket keeps its entries since a reset can revive it.
#[derive(Debug, Default)]
struct MatchLocks {
    inner: Mutex<HashMap<(BracketId, u64, u64), Arc<AsyncMutex<()>>>>,
}

impl MatchLocks {
    fn get(&self, bracket: BracketId, round: u64, number: u64) -> Arc<AsyncMutex<()>> {
        self.inner
            .lock()
            .entry((bracket, round, number))
            .or_default()
            .clone()
    }

    fn remove_bracket(&self, bracket: BracketId) {
        self.inner.lock().retain(|(id, _, _), _| *id != bracket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine() -> BracketEngine<MemoryStore> {
        BracketEngine::new(MemoryStore::new())
    }

    fn p(id: u64) -> ParticipantId {
        ParticipantId(id)
    }

    fn roster(ids: &[u64]) -> Vec<ParticipantId> {
        ids.iter().copied().map(ParticipantId).collect()
    }

    #[tokio::test]
    async fn test_generate_rejects_insufficient_participants() {
        let engine = engine();

        for n in [0u64, 1] {
            let err = engine
                .generate(CategoryId(1), &roster(&(0..n).collect::<Vec<u64>>()))
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                Error::InsufficientParticipants { found } if found == n as usize
            ));
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_duplicate_category() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(7), &roster(&[1, 2, 3]))
            .await
            .unwrap();

        let err = engine
            .generate(CategoryId(7), &roster(&[4, 5]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BracketAlreadyExists { category } if category == CategoryId(7)
        ));

        // No rows were added by the rejected call.
        assert_eq!(
            engine.store().matches(bracket.id).await.unwrap().len(),
            matches.len()
        );
    }

    #[tokio::test]
    async fn test_generate_three_in_four() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3]))
            .await
            .unwrap();

        assert_eq!(bracket.size, 4);
        assert_eq!(bracket.rounds(), 2);
        assert_eq!(bracket.entrants, roster(&[1, 2, 3]));
        // A bye resolved during generation.
        assert_eq!(bracket.status, BracketStatus::InProgress);

        assert_eq!(matches.len(), 3);

        // Match 1: seed 1 against a bye, already decided.
        assert_eq!(matches[0].slots, [Slot::Participant(p(1)), Slot::Bye]);
        assert_eq!(matches[0].status, MatchStatus::Completed);
        assert_eq!(matches[0].winner, Some(p(1)));
        assert!(matches[0].ended_at.is_some());

        // Match 2: seeds 2 and 3, a real contest.
        assert_eq!(
            matches[1].slots,
            [Slot::Participant(p(2)), Slot::Participant(p(3))]
        );
        assert_eq!(matches[1].status, MatchStatus::Scheduled);
        assert_eq!(matches[1].winner, None);

        // The bye winner already advanced into the final.
        assert_eq!((matches[2].round, matches[2].number), (2, 1));
        assert_eq!(matches[2].slots, [Slot::Participant(p(1)), Slot::Empty]);
        assert_eq!(matches[2].status, MatchStatus::AwaitingParticipants);
    }

    #[tokio::test]
    async fn test_generate_full_bracket_has_no_byes() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4]))
            .await
            .unwrap();

        assert_eq!(bracket.size, 4);
        assert_eq!(bracket.status, BracketStatus::Pending);

        assert_eq!(matches.len(), 2);
        assert_eq!(
            matches[0].slots,
            [Slot::Participant(p(1)), Slot::Participant(p(4))]
        );
        assert_eq!(
            matches[1].slots,
            [Slot::Participant(p(2)), Slot::Participant(p(3))]
        );
        assert!(matches.iter().all(|m| m.status == MatchStatus::Scheduled));
    }

    #[tokio::test]
    async fn test_record_result_advances_winner() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4]))
            .await
            .unwrap();

        let record = engine
            .record_result(matches[0].id, p(1), Some(10.0), Some(4.0))
            .await
            .unwrap();

        assert_eq!(record.status, MatchStatus::Completed);
        assert_eq!(record.winner, Some(p(1)));
        assert_eq!(record.score_a, Some(10.0));
        assert_eq!(record.score_b, Some(4.0));
        assert!(record.ended_at.is_some());

        // First result moves the bracket out of Pending.
        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::InProgress);

        // The winner sits in slot A of the lazily created final.
        let r#final = &view.matches[2];
        assert_eq!((r#final.round, r#final.number), (2, 1));
        assert_eq!(r#final.slots, [Slot::Participant(p(1)), Slot::Empty]);
        assert_eq!(r#final.status, MatchStatus::AwaitingParticipants);

        // The sibling result fills slot B and schedules the final.
        engine
            .record_result(matches[1].id, p(3), None, None)
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        let r#final = &view.matches[2];
        assert_eq!(
            r#final.slots,
            [Slot::Participant(p(1)), Slot::Participant(p(3))]
        );
        assert_eq!(r#final.status, MatchStatus::Scheduled);
        // Semifinal results alone never complete the bracket.
        assert_eq!(view.bracket.status, BracketStatus::InProgress);
    }

    #[tokio::test]
    async fn test_destination_slots_size_eight() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4, 5, 6, 7, 8]))
            .await
            .unwrap();

        assert_eq!(matches.len(), 4);

        // Winners of round 1 matches 1..4 land in round 2 matches 1..2,
        // odd match numbers in slot A, even ones in slot B.
        for r#match in &matches {
            let winner = *r#match.slots[0].participant().unwrap();
            engine
                .record_result(r#match.id, winner, None, None)
                .await
                .unwrap();
        }

        let view = engine.get_bracket(bracket.id).await.unwrap();
        let round_two: Vec<_> = view.matches.iter().filter(|m| m.round == 2).collect();

        assert_eq!(round_two.len(), 2);
        assert_eq!(
            round_two[0].slots,
            [Slot::Participant(p(1)), Slot::Participant(p(2))]
        );
        assert_eq!(
            round_two[1].slots,
            [Slot::Participant(p(3)), Slot::Participant(p(4))]
        );
        assert!(round_two
            .iter()
            .all(|m| m.status == MatchStatus::Scheduled));

        // Play the bracket to its end; slot A wins everything.
        for round in [2, 3] {
            let view = engine.get_bracket(bracket.id).await.unwrap();

            for r#match in view.matches.iter().filter(|m| m.round == round) {
                let winner = *r#match.slots[0].participant().unwrap();
                engine
                    .record_result(r#match.id, winner, None, None)
                    .await
                    .unwrap();
            }
        }

        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::Completed);

        let r#final = view.matches.last().unwrap();
        assert_eq!((r#final.round, r#final.number), (3, 1));
        assert_eq!(r#final.winner, Some(p(1)));
    }

    #[tokio::test]
    async fn test_final_result_completes_bracket() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2]))
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(bracket.rounds(), 1);

        engine
            .record_result(matches[0].id, p(2), Some(1.0), Some(2.0))
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::Completed);
        assert_eq!(view.matches[0].winner, Some(p(2)));
    }

    #[tokio::test]
    async fn test_record_result_rejects_resubmission() {
        let engine = engine();

        let (_, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4]))
            .await
            .unwrap();

        engine
            .record_result(matches[0].id, p(1), Some(3.0), Some(1.0))
            .await
            .unwrap();

        let before = engine
            .store()
            .match_by_id(matches[0].id)
            .await
            .unwrap()
            .unwrap();

        let err = engine
            .record_result(matches[0].id, p(4), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MatchAlreadyCompleted { id } if id == matches[0].id
        ));

        // The rejected call left the row untouched.
        let after = engine
            .store()
            .match_by_id(matches[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_record_result_rejects_unknown_winner() {
        let engine = engine();

        let (_, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4]))
            .await
            .unwrap();

        let err = engine
            .record_result(matches[0].id, p(99), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WinnerNotInMatch { participant, .. } if participant == p(99)
        ));

        let after = engine
            .store()
            .match_by_id(matches[0].id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, MatchStatus::Scheduled);
        assert_eq!(after.winner, None);
    }

    #[tokio::test]
    async fn test_record_result_rejects_half_filled_match() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3, 4]))
            .await
            .unwrap();

        engine
            .record_result(matches[0].id, p(1), None, None)
            .await
            .unwrap();

        // The final exists now but still waits for the second semifinal.
        let view = engine.get_bracket(bracket.id).await.unwrap();
        let r#final = view.matches.iter().find(|m| m.round == 2).unwrap().clone();
        assert_eq!(r#final.status, MatchStatus::AwaitingParticipants);

        let err = engine
            .record_result(r#final.id, p(1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MatchNotReady { id } if id == r#final.id));

        // The rejected call changed nothing.
        let view = engine.get_bracket(bracket.id).await.unwrap();
        let after = view.matches.iter().find(|m| m.round == 2).unwrap();
        assert_eq!(after.slots, [Slot::Participant(p(1)), Slot::Empty]);
        assert_eq!(after.status, MatchStatus::AwaitingParticipants);
        assert_eq!(after.winner, None);
        assert_eq!(view.bracket.status, BracketStatus::InProgress);

        // The sibling result still lands in slot B and the final plays out
        // normally afterwards.
        engine
            .record_result(matches[1].id, p(3), None, None)
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        let r#final = view.matches.iter().find(|m| m.round == 2).unwrap().clone();
        assert_eq!(
            r#final.slots,
            [Slot::Participant(p(1)), Slot::Participant(p(3))]
        );
        assert_eq!(r#final.status, MatchStatus::Scheduled);

        engine
            .record_result(r#final.id, p(3), None, None)
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::Completed);
    }

    #[tokio::test]
    async fn test_record_result_unknown_match() {
        let engine = engine();

        engine
            .generate(CategoryId(1), &roster(&[1, 2]))
            .await
            .unwrap();

        let err = engine
            .record_result(MatchId(999), p(1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MatchNotFound { id } if id == MatchId(999)));
    }

    #[tokio::test]
    async fn test_reset_restores_generated_state() {
        let engine = engine();

        let (bracket, _) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3]))
            .await
            .unwrap();

        // Play the bracket to completion.
        let view = engine.get_bracket(bracket.id).await.unwrap();
        engine
            .record_result(view.matches[1].id, p(3), Some(5.0), Some(7.0))
            .await
            .unwrap();
        let view = engine.get_bracket(bracket.id).await.unwrap();
        engine
            .record_result(view.matches[2].id, p(1), None, None)
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::Completed);

        engine.reset(bracket.id).await.unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();
        assert_eq!(view.bracket.status, BracketStatus::Pending);
        assert_eq!(view.matches.len(), 3);

        // The bye re-resolved; its winner stands in the final again.
        assert_eq!(view.matches[0].slots, [Slot::Participant(p(1)), Slot::Bye]);
        assert_eq!(view.matches[0].status, MatchStatus::Completed);
        assert_eq!(view.matches[0].winner, Some(p(1)));

        // The real match is back to its seeded, undecided state.
        assert_eq!(
            view.matches[1].slots,
            [Slot::Participant(p(2)), Slot::Participant(p(3))]
        );
        assert_eq!(view.matches[1].status, MatchStatus::Scheduled);
        assert_eq!(view.matches[1].winner, None);
        assert_eq!(view.matches[1].score_a, None);
        assert_eq!(view.matches[1].score_b, None);
        assert_eq!(view.matches[1].ended_at, None);

        assert_eq!(view.matches[2].slots, [Slot::Participant(p(1)), Slot::Empty]);
        assert_eq!(view.matches[2].status, MatchStatus::AwaitingParticipants);
    }

    #[tokio::test]
    async fn test_delete() {
        let engine = engine();

        let (bracket, _) = engine
            .generate(CategoryId(1), &roster(&[1, 2]))
            .await
            .unwrap();

        engine.delete(bracket.id).await.unwrap();

        let err = engine.get_bracket(bracket.id).await.unwrap_err();
        assert!(matches!(err, Error::BracketNotFound { .. }));

        let err = engine.delete(bracket.id).await.unwrap_err();
        assert!(matches!(err, Error::BracketNotFound { .. }));

        // The category is free for a new bracket again.
        engine
            .generate(CategoryId(1), &roster(&[1, 2]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_drops_match_locks() {
        let engine = engine();

        let (bracket, matches) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3]))
            .await
            .unwrap();

        engine
            .record_result(matches[1].id, p(2), None, None)
            .await
            .unwrap();

        assert!(engine
            .locks
            .inner
            .lock()
            .keys()
            .any(|(id, _, _)| *id == bracket.id));

        engine.delete(bracket.id).await.unwrap();

        assert!(engine
            .locks
            .inner
            .lock()
            .keys()
            .all(|(id, _, _)| *id != bracket.id));
    }

    #[tokio::test]
    async fn test_get_bracket_entrant_summaries() {
        let store = MemoryStore::new();
        store.insert_participant_name(p(1), "Aliyev");
        store.insert_participant_name(p(2), "Berger");

        let engine = BracketEngine::new(store);

        let (bracket, _) = engine
            .generate(CategoryId(1), &roster(&[1, 2, 3]))
            .await
            .unwrap();

        let view = engine.get_bracket(bracket.id).await.unwrap();

        assert_eq!(view.entrants.len(), 3);
        assert_eq!(view.entrants[0].seed, 1);
        assert_eq!(view.entrants[0].name.as_deref(), Some("Aliyev"));
        assert_eq!(view.entrants[1].name.as_deref(), Some("Berger"));
        // Participant 3 has no registration row.
        assert_eq!(view.entrants[2].name, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sibling_results() {
        let engine = Arc::new(engine());

        // Two independent round 1 matches feed the same round 2 match. Both
        // results must land in their own slot, never overwriting the other.
        for run in 0..50u64 {
            let (bracket, matches) = engine
                .generate(CategoryId(run), &roster(&[1, 2, 3, 4]))
                .await
                .unwrap();

            let first = {
                let engine = engine.clone();
                let id = matches[0].id;
                tokio::spawn(async move { engine.record_result(id, p(1), None, None).await })
            };
            let second = {
                let engine = engine.clone();
                let id = matches[1].id;
                tokio::spawn(async move { engine.record_result(id, p(3), None, None).await })
            };

            first.await.unwrap().unwrap();
            second.await.unwrap().unwrap();

            let view = engine.get_bracket(bracket.id).await.unwrap();
            let r#final = view
                .matches
                .iter()
                .find(|m| m.round == 2 && m.number == 1)
                .unwrap();

            assert_eq!(
                r#final.slots,
                [Slot::Participant(p(1)), Slot::Participant(p(3))]
            );
            assert_eq!(r#final.status, MatchStatus::Scheduled);
        }
    }
}
