use crate::store::{Bracket, BracketStore, MatchRecord};
use crate::Error;

use sportfed_core::id::{BracketId, CategoryId, MatchId, ParticipantId};
use sportfed_core::{BracketKind, BracketStatus, MatchStatus, Slot};

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlDatabaseError, MySqlPool, MySqlRow};
use sqlx::Row;

use std::collections::HashMap;

const ER_DUP_ENTRY: u16 = 1062;
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

macro_rules! get_one {
    ($query:expr) => {
        match $query {
            Ok(v) => v,
            Err(sqlx::Error::RowNotFound) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
    };
}

/// The MySQL-backed [`BracketStore`].
#[derive(Clone, Debug)]
pub struct MySqlStore {
    pub pool: MySqlPool,
    pub table_prefix: String,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool, table_prefix: String) -> Self {
        Self { pool, table_prefix }
    }

    /// Creates the tables used by the engine if they don't exist yet.
    ///
    /// The `registrations` projection is owned by the registration subsystem
    /// and only read here; it is included for development setups.
    pub async fn create_tables(&self) -> Result<(), Error> {
        for table in table_statements(&self.table_prefix) {
            sqlx::query(&table).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn decode_bracket(&self, id: BracketId, row: &MySqlRow) -> Result<Bracket, Error> {
        let entrants: Vec<u8> = row.try_get("entrants")?;
        let entrants: Vec<ParticipantId> = serde_json::from_slice(&entrants)?;

        Ok(Bracket {
            id,
            category: CategoryId(row.try_get("category_id")?),
            kind: BracketKind::from_u8(row.try_get("kind")?).unwrap(),
            size: row.try_get("size")?,
            status: BracketStatus::from_u8(row.try_get("status")?).unwrap(),
            entrants,
            generated_at: row.try_get("generated_at")?,
        })
    }
}

#[async_trait]
impl BracketStore for MySqlStore {
    async fn match_at(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<Option<MatchRecord>, Error> {
        let row = get_one!(
            sqlx::query(&format!(
                "SELECT id, bracket_id, round_number, match_number, slot_a_participant_id, \
                slot_b_participant_id, status, winner_participant_id, score_a, score_b, ended_at \
                FROM {}matches WHERE bracket_id = ? AND round_number = ? AND match_number = ?",
                self.table_prefix
            ))
            .bind(bracket.0)
            .bind(round)
            .bind(number)
            .fetch_one(&self.pool)
            .await
        );

        Ok(Some(decode_match(&row)?))
    }

    async fn insert_bracket(&self, bracket: &Bracket) -> Result<BracketId, Error> {
        let res = sqlx::query(&format!(
            "INSERT INTO {}brackets (category_id, kind, size, status, entrants, generated_at) \
            VALUES (?, ?, ?, ?, ?, ?)",
            self.table_prefix
        ))
        .bind(bracket.category.0)
        .bind(bracket.kind.to_u8())
        .bind(bracket.size)
        .bind(bracket.status.to_u8())
        .bind(serde_json::to_vec(&bracket.entrants)?)
        .bind(bracket.generated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if error_number(&err) == Some(ER_DUP_ENTRY) {
                Error::BracketAlreadyExists {
                    category: bracket.category,
                }
            } else {
                err.into()
            }
        })?;

        Ok(BracketId(res.last_insert_id()))
    }

    async fn bracket(&self, id: BracketId) -> Result<Option<Bracket>, Error> {
        let row = get_one!(
            sqlx::query(&format!(
                "SELECT category_id, kind, size, status, entrants, generated_at \
                FROM {}brackets WHERE id = ?",
                self.table_prefix
            ))
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
        );

        Ok(Some(self.decode_bracket(id, &row)?))
    }

    async fn bracket_by_category(&self, category: CategoryId) -> Result<Option<Bracket>, Error> {
        let row = get_one!(
            sqlx::query(&format!(
                "SELECT id, category_id, kind, size, status, entrants, generated_at \
                FROM {}brackets WHERE category_id = ?",
                self.table_prefix
            ))
            .bind(category.0)
            .fetch_one(&self.pool)
            .await
        );

        let id = BracketId(row.try_get("id")?);

        Ok(Some(self.decode_bracket(id, &row)?))
    }

    async fn update_bracket_status(
        &self,
        id: BracketId,
        status: BracketStatus,
    ) -> Result<(), Error> {
        sqlx::query(&format!(
            "UPDATE {}brackets SET status = ? WHERE id = ?",
            self.table_prefix
        ))
        .bind(status.to_u8())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(map_conflict)?;

        Ok(())
    }

    async fn insert_match(&self, record: &MatchRecord) -> Result<MatchId, Error> {
        let res = sqlx::query(&format!(
            "INSERT INTO {}matches (bracket_id, round_number, match_number, \
            slot_a_participant_id, slot_b_participant_id, status, winner_participant_id, \
            score_a, score_b, ended_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table_prefix
        ))
        .bind(record.bracket.0)
        .bind(record.round)
        .bind(record.number)
        .bind(encode_slot(&record.slots[0]))
        .bind(encode_slot(&record.slots[1]))
        .bind(record.status.to_u8())
        .bind(record.winner.map(|p| p.0))
        .bind(record.score_a)
        .bind(record.score_b)
        .bind(record.ended_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            // A concurrent writer created the same (bracket, round, number)
            // node first.
            if error_number(&err) == Some(ER_DUP_ENTRY) {
                Error::ConcurrentModification
            } else {
                map_conflict(err)
            }
        })?;

        Ok(MatchId(res.last_insert_id()))
    }

    async fn match_by_id(&self, id: MatchId) -> Result<Option<MatchRecord>, Error> {
        let row = get_one!(
            sqlx::query(&format!(
                "SELECT id, bracket_id, round_number, match_number, slot_a_participant_id, \
                slot_b_participant_id, status, winner_participant_id, score_a, score_b, ended_at \
                FROM {}matches WHERE id = ?",
                self.table_prefix
            ))
            .bind(id.0)
            .fetch_one(&self.pool)
            .await
        );

        Ok(Some(decode_match(&row)?))
    }

    async fn fetch_or_create_match(
        &self,
        bracket: BracketId,
        round: u64,
        number: u64,
    ) -> Result<MatchRecord, Error> {
        if let Some(record) = self.match_at(bracket, round, number).await? {
            return Ok(record);
        }

        let record = MatchRecord {
            id: MatchId(0),
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

        match self.insert_match(&record).await {
            Ok(id) => Ok(MatchRecord { id, ..record }),
            // Lost the insert race; the row exists now.
            Err(Error::ConcurrentModification) => self
                .match_at(bracket, round, number)
                .await?
                .ok_or(Error::ConcurrentModification),
            Err(err) => Err(err),
        }
    }

    async fn update_match(&self, record: &MatchRecord) -> Result<(), Error> {
        sqlx::query(&format!(
            "UPDATE {}matches SET slot_a_participant_id = ?, slot_b_participant_id = ?, \
            status = ?, winner_participant_id = ?, score_a = ?, score_b = ?, ended_at = ? \
            WHERE id = ?",
            self.table_prefix
        ))
        .bind(encode_slot(&record.slots[0]))
        .bind(encode_slot(&record.slots[1]))
        .bind(record.status.to_u8())
        .bind(record.winner.map(|p| p.0))
        .bind(record.score_a)
        .bind(record.score_b)
        .bind(record.ended_at)
        .bind(record.id.0)
        .execute(&self.pool)
        .await
        .map_err(map_conflict)?;

        Ok(())
    }

    async fn matches(&self, bracket: BracketId) -> Result<Vec<MatchRecord>, Error> {
        let sql = format!(
            "SELECT id, bracket_id, round_number, match_number, slot_a_participant_id, \
            slot_b_participant_id, status, winner_participant_id, score_a, score_b, ended_at \
            FROM {}matches WHERE bracket_id = ? \
            ORDER BY round_number ASC, match_number ASC",
            self.table_prefix
        );

        let mut rows = sqlx::query(&sql).bind(bracket.0).fetch(&self.pool);

        let mut matches = Vec::new();
        while let Some(row) = rows.try_next().await? {
            matches.push(decode_match(&row)?);
        }

        Ok(matches)
    }

    async fn delete_matches_after_round(
        &self,
        bracket: BracketId,
        round: u64,
    ) -> Result<(), Error> {
        sqlx::query(&format!(
            "DELETE FROM {}matches WHERE bracket_id = ? AND round_number > ?",
            self.table_prefix
        ))
        .bind(bracket.0)
        .bind(round)
        .execute(&self.pool)
        .await
        .map_err(map_conflict)?;

        Ok(())
    }

    async fn delete_bracket(&self, id: BracketId) -> Result<(), Error> {
        sqlx::query(&format!(
            "DELETE FROM {}matches WHERE bracket_id = ?",
            self.table_prefix
        ))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "DELETE FROM {}brackets WHERE id = ?",
            self.table_prefix
        ))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn participant_names(
        &self,
        ids: &[ParticipantId],
    ) -> Result<HashMap<ParticipantId, String>, Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT participant_id, name FROM {}registrations WHERE participant_id IN ({})",
            self.table_prefix, placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id.0);
        }

        let mut rows = query.fetch(&self.pool);

        let mut names = HashMap::new();
        while let Some(row) = rows.try_next().await? {
            let id: u64 = row.try_get("participant_id")?;
            let name: String = row.try_get("name")?;

            names.insert(ParticipantId(id), name);
        }

        Ok(names)
    }
}

/// The `started_at` column is part of the persisted layout but never
/// written; scheduling actual play times is the host application's concern.
fn table_statements(prefix: &str) -> [String; 3] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {}brackets (\
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY, \
            category_id BIGINT UNSIGNED NOT NULL UNIQUE, \
            kind TINYINT UNSIGNED NOT NULL, \
            size BIGINT UNSIGNED NOT NULL, \
            status TINYINT UNSIGNED NOT NULL, \
            entrants BLOB NOT NULL, \
            generated_at DATETIME NOT NULL)",
            prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}matches (\
            id BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY, \
            bracket_id BIGINT UNSIGNED NOT NULL, \
            round_number BIGINT UNSIGNED NOT NULL, \
            match_number BIGINT UNSIGNED NOT NULL, \
            slot_a_participant_id BIGINT UNSIGNED, \
            slot_b_participant_id BIGINT UNSIGNED, \
            status TINYINT UNSIGNED NOT NULL, \
            winner_participant_id BIGINT UNSIGNED, \
            score_a DOUBLE, \
            score_b DOUBLE, \
            started_at DATETIME, \
            ended_at DATETIME, \
            UNIQUE KEY node (bracket_id, round_number, match_number))",
            prefix
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}registrations (\
            participant_id BIGINT UNSIGNED PRIMARY KEY, \
            name TEXT NOT NULL)",
            prefix
        ),
    ]
}

fn decode_match(row: &MySqlRow) -> Result<MatchRecord, Error> {
    let round: u64 = row.try_get("round_number")?;

    let slot_a: Option<u64> = row.try_get("slot_a_participant_id")?;
    let slot_b: Option<u64> = row.try_get("slot_b_participant_id")?;

    let winner: Option<u64> = row.try_get("winner_participant_id")?;

    Ok(MatchRecord {
        id: MatchId(row.try_get("id")?),
        bracket: BracketId(row.try_get("bracket_id")?),
        round,
        number: row.try_get("match_number")?,
        slots: [decode_slot(slot_a, round), decode_slot(slot_b, round)],
        status: MatchStatus::from_u8(row.try_get("status")?).unwrap(),
        winner: winner.map(ParticipantId),
        score_a: row.try_get("score_a")?,
        score_b: row.try_get("score_b")?,
        ended_at: row.try_get("ended_at")?,
    })
}

/// Decodes a nullable participant column into a [`Slot`].
///
/// Structural byes only exist in round 1 by construction: every slot of a
/// later round has a feeding match below it. A NULL participant therefore
/// means a bye in round 1 and a not-yet-known participant everywhere else.
fn decode_slot(id: Option<u64>, round: u64) -> Slot<ParticipantId> {
    match id {
        Some(id) => Slot::Participant(ParticipantId(id)),
        None if round == 1 => Slot::Bye,
        None => Slot::Empty,
    }
}

fn encode_slot(slot: &Slot<ParticipantId>) -> Option<u64> {
    slot.participant().map(|p| p.0)
}

fn error_number(err: &sqlx::Error) -> Option<u16> {
    let err = err.as_database_error()?;

    err.try_downcast_ref::<MySqlDatabaseError>()
        .map(|err| err.number())
}

/// Maps row-lock conflicts to [`Error::ConcurrentModification`], which the
/// engine retries once before surfacing.
fn map_conflict(err: sqlx::Error) -> Error {
    match error_number(&err) {
        Some(ER_LOCK_WAIT_TIMEOUT) | Some(ER_LOCK_DEADLOCK) => Error::ConcurrentModification,
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::table_statements;

    #[test]
    fn test_table_statements() {
        let [brackets, matches, registrations] = table_statements("sf_");

        assert!(brackets.starts_with("CREATE TABLE IF NOT EXISTS sf_brackets"));
        assert!(registrations.starts_with("CREATE TABLE IF NOT EXISTS sf_registrations"));

        assert!(matches.starts_with("CREATE TABLE IF NOT EXISTS sf_matches"));
        assert!(matches.contains("started_at DATETIME"));
        assert!(matches.contains("UNIQUE KEY node (bracket_id, round_number, match_number)"));
    }
}
