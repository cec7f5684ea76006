use crate::Slot;

/// A first-round match produced by the seeding rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeededMatch<P> {
    /// The 1-based match number, unique within the round.
    pub number: u64,
    pub slots: [Slot<P>; 2],
}

/// Pairs `participants` into the first round of a bracket of `size` using
/// fold seeding.
///
/// Match *i* (0-based) receives the participant at roster position *i* in
/// slot A and the participant at position `size - 1 - i` in slot B. This
/// places seed 1 against the last roster position, seed 2 against the second
/// to last and so on, separating top seeds maximally in early rounds. Roster
/// positions beyond the roster length are structural byes.
///
/// `size` must be the value returned by [`bracket_size`] for the roster.
/// Because the size is minimal for the roster, slot A is always occupied and
/// at most one slot per match is a bye.
///
/// [`bracket_size`]: crate::bracket_size
pub fn seed_round_one<P>(participants: &[P], size: u64) -> Vec<SeededMatch<P>>
where
    P: Clone,
{
    debug_assert!(size.is_power_of_two(), "bracket size must be a power of two");
    debug_assert!(participants.len() as u64 <= size);

    log::debug!(
        "Seeding round 1 of a size {} bracket with {} participants",
        size,
        participants.len()
    );

    let mut matches = Vec::with_capacity(size as usize / 2);

    for index in 0..size / 2 {
        let slot_a = match participants.get(index as usize) {
            Some(participant) => Slot::Participant(participant.clone()),
            None => Slot::Bye,
        };

        let slot_b = match participants.get((size - 1 - index) as usize) {
            Some(participant) => Slot::Participant(participant.clone()),
            None => Slot::Bye,
        };

        matches.push(SeededMatch {
            number: index + 1,
            slots: [slot_a, slot_b],
        });
    }

    matches
}
