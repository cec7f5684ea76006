//! # sportfed-core
//!
//! This crate contains the rules and vocabulary types for building single
//! elimination brackets for competition categories.
//!
//! Important items:
//! - [`bracket_size`]/[`round_count`]: sizing of the elimination tree.
//! - [`seed_round_one`]: the fold-seeding pairing rule producing the first
//! round of matches, including structural byes.
//! - [`winner_destination`]: the rule mapping a decided match to the slot of
//! the following round that receives its winner.
//! - [`Slot`]: one of the two participant positions of a match.
//! - [`MatchStatus`], [`BracketStatus`], [`BracketKind`]: the state machine
//! vocabulary shared with the storage layer.
//!
//! ## Feature Flags
//!
//! `serde`: Adds `Serialize` and `Deserialize` impls to all types.
//!
pub mod id;

mod progress;
mod seed;

pub use progress::{winner_destination, Destination, SlotIndex};
pub use seed::{seed_round_one, SeededMatch};

use std::result;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An `Result<T>` using [`enum@Error`] as an error type.
pub type Result<T> = result::Result<T, Error>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("insufficient participants: expected at least 2, found {found}")]
    InsufficientParticipants { found: usize },
}

/// Returns the size of the bracket required to hold `entrants` participants.
///
/// The size is the smallest power of two that is greater than or equal to
/// `entrants`.
///
/// # Errors
///
/// Returns [`Error::InsufficientParticipants`] if `entrants` is smaller than
/// 2. A bracket with fewer than two participants has no matches to play.
pub fn bracket_size(entrants: usize) -> Result<u64> {
    if entrants < 2 {
        return Err(Error::InsufficientParticipants { found: entrants });
    }

    Ok(entrants.next_power_of_two() as u64)
}

/// Returns the number of rounds played in a bracket of `size`.
///
/// `size` must be a power of two as returned by [`bracket_size`]. The count
/// is the exact integer base-2 logarithm; no floating point is involved.
pub fn round_count(size: u64) -> u64 {
    debug_assert!(size.is_power_of_two(), "bracket size must be a power of two");

    size.trailing_zeros() as u64
}

/// A spot for a participant in a match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Slot<T> {
    /// The participant for this spot is not yet known. A match from the
    /// previous round still has to produce it.
    Empty,
    /// The spot is structurally vacant. The opposing participant advances
    /// without playing.
    Bye,
    Participant(T),
}

impl<T> Slot<T> {
    /// Returns `true` if the `Slot` is [`Empty`].
    ///
    /// [`Empty`]: Self::Empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if the `Slot` is [`Bye`].
    ///
    /// [`Bye`]: Self::Bye
    #[inline]
    pub fn is_bye(&self) -> bool {
        matches!(self, Self::Bye)
    }

    /// Returns `true` if the `Slot` is [`Participant`].
    ///
    /// [`Participant`]: Self::Participant
    #[inline]
    pub fn is_participant(&self) -> bool {
        matches!(self, Self::Participant(_))
    }

    /// Returns the participant occupying the `Slot`, or `None` if the slot is
    /// empty or a bye.
    #[inline]
    pub fn participant(&self) -> Option<&T> {
        match self {
            Self::Participant(participant) => Some(participant),
            _ => None,
        }
    }

    /// Converts an `&Slot<T>` into a `Slot<&T>`.
    pub fn as_ref(&self) -> Slot<&T> {
        match *self {
            Self::Participant(ref participant) => Slot::Participant(participant),
            Self::Empty => Slot::Empty,
            Self::Bye => Slot::Bye,
        }
    }

    /// Maps a `Slot<T>` to a `Slot<U>` by applying `f` on it.
    pub fn map<U, F>(self, f: F) -> Slot<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Participant(participant) => Slot::Participant(f(participant)),
            Self::Empty => Slot::Empty,
            Self::Bye => Slot::Bye,
        }
    }
}

impl<T> From<Option<T>> for Slot<T> {
    /// Creates a `Slot` from an [`Option`]. A `Some(T)` value translates into
    /// a `Participant(T)` value, a `None` value translates into `Empty`.
    #[inline]
    fn from(participant: Option<T>) -> Self {
        match participant {
            Some(participant) => Self::Participant(participant),
            None => Self::Empty,
        }
    }
}

/// The state of a single match within a bracket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchStatus {
    /// At least one slot is still waiting for a winner from the previous
    /// round.
    AwaitingParticipants,
    /// Both slots are occupied by participants and the match can be played.
    Scheduled,
    /// A winner has been recorded, or the match resolved as a bye.
    Completed,
}

impl MatchStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::AwaitingParticipants),
            1 => Some(Self::Scheduled),
            2 => Some(Self::Completed),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::AwaitingParticipants => 0,
            Self::Scheduled => 1,
            Self::Completed => 2,
        }
    }
}

/// The state of a whole bracket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BracketStatus {
    /// No result has been recorded yet.
    Pending,
    /// At least one match has resolved.
    InProgress,
    /// The final match has a recorded winner.
    Completed,
}

impl BracketStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::InProgress),
            2 => Some(Self::Completed),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }
}

/// The kind of elimination system a bracket runs.
///
/// Only single elimination exists today. The variant is kept explicit so the
/// stored `type` column has a typed decoding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BracketKind {
    #[default]
    SingleElimination,
}

impl BracketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SingleElimination),
            _ => None,
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::SingleElimination => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_size() {
        assert_eq!(
            bracket_size(0).unwrap_err(),
            Error::InsufficientParticipants { found: 0 }
        );
        assert_eq!(
            bracket_size(1).unwrap_err(),
            Error::InsufficientParticipants { found: 1 }
        );

        assert_eq!(bracket_size(2).unwrap(), 2);
        assert_eq!(bracket_size(3).unwrap(), 4);
        assert_eq!(bracket_size(4).unwrap(), 4);
        assert_eq!(bracket_size(5).unwrap(), 8);
        assert_eq!(bracket_size(8).unwrap(), 8);
        assert_eq!(bracket_size(9).unwrap(), 16);
        assert_eq!(bracket_size(17).unwrap(), 32);
    }

    #[test]
    fn test_round_count() {
        assert_eq!(round_count(2), 1);
        assert_eq!(round_count(4), 2);
        assert_eq!(round_count(8), 3);
        assert_eq!(round_count(16), 4);
        assert_eq!(round_count(32), 5);
    }

    #[test]
    fn test_slot() {
        let slot: Slot<u64> = Slot::from(Some(3));
        assert!(slot.is_participant());
        assert_eq!(slot.participant(), Some(&3));

        let slot: Slot<u64> = Slot::from(None);
        assert!(slot.is_empty());
        assert_eq!(slot.participant(), None);

        let slot: Slot<u64> = Slot::Bye;
        assert!(slot.is_bye());
        assert_eq!(slot.map(|v| v + 1), Slot::Bye);
    }

    #[test]
    fn test_status_codes() {
        for status in [
            MatchStatus::AwaitingParticipants,
            MatchStatus::Scheduled,
            MatchStatus::Completed,
        ] {
            assert_eq!(MatchStatus::from_u8(status.to_u8()), Some(status));
        }
        assert_eq!(MatchStatus::from_u8(3), None);

        for status in [
            BracketStatus::Pending,
            BracketStatus::InProgress,
            BracketStatus::Completed,
        ] {
            assert_eq!(BracketStatus::from_u8(status.to_u8()), Some(status));
        }
        assert_eq!(BracketStatus::from_u8(3), None);
    }
}
