/// One of the two participant positions of a match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SlotIndex {
    A,
    B,
}

impl SlotIndex {
    /// Returns the array index behind the slot.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Returns the other slot of the match.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Returns the slot that the winner of match `number` occupies in the
    /// following round: slot A for odd match numbers, slot B for even ones.
    #[inline]
    pub fn from_match_number(number: u64) -> Self {
        if number % 2 == 1 {
            Self::A
        } else {
            Self::B
        }
    }
}

/// The coordinates receiving the winner of a decided match.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    /// The 1-based round number of the receiving match.
    pub round: u64,
    /// The 1-based match number of the receiving match within its round.
    pub number: u64,
    pub slot: SlotIndex,
}

/// Returns the [`Destination`] for the winner of the match at `round` and
/// `number` in a bracket playing `rounds` rounds.
///
/// Returns `None` for the final round: its winner has nowhere left to
/// advance. Otherwise the winner moves to round `round + 1`, match
/// `ceil(number / 2)`, in the slot given by the parity of `number`.
pub fn winner_destination(round: u64, number: u64, rounds: u64) -> Option<Destination> {
    debug_assert!(round >= 1 && number >= 1);

    if round >= rounds {
        return None;
    }

    Some(Destination {
        round: round + 1,
        // ceil(number / 2) in integers.
        number: (number + 1) / 2,
        slot: SlotIndex::from_match_number(number),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_round_has_no_destination() {
        assert_eq!(winner_destination(1, 1, 1), None);
        assert_eq!(winner_destination(3, 1, 3), None);
    }

    #[test]
    fn test_destinations_size_eight() {
        // Round 1 of a size 8 bracket has matches 1..4 feeding round 2
        // matches 1..2.
        assert_eq!(
            winner_destination(1, 1, 3),
            Some(Destination {
                round: 2,
                number: 1,
                slot: SlotIndex::A,
            })
        );
        assert_eq!(
            winner_destination(1, 2, 3),
            Some(Destination {
                round: 2,
                number: 1,
                slot: SlotIndex::B,
            })
        );
        assert_eq!(
            winner_destination(1, 3, 3),
            Some(Destination {
                round: 2,
                number: 2,
                slot: SlotIndex::A,
            })
        );
        assert_eq!(
            winner_destination(1, 4, 3),
            Some(Destination {
                round: 2,
                number: 2,
                slot: SlotIndex::B,
            })
        );

        // Round 2 feeds the final.
        assert_eq!(
            winner_destination(2, 1, 3),
            Some(Destination {
                round: 3,
                number: 1,
                slot: SlotIndex::A,
            })
        );
        assert_eq!(
            winner_destination(2, 2, 3),
            Some(Destination {
                round: 3,
                number: 1,
                slot: SlotIndex::B,
            })
        );
    }

    #[test]
    fn test_slot_index() {
        assert_eq!(SlotIndex::from_match_number(1), SlotIndex::A);
        assert_eq!(SlotIndex::from_match_number(2), SlotIndex::B);
        assert_eq!(SlotIndex::A.other(), SlotIndex::B);
        assert_eq!(SlotIndex::B.index(), 1);
    }
}
