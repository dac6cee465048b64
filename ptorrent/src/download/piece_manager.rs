use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::peer::peer_message::Bitfield;

/// Possible states of a piece.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PieceState {
    Missing,
    Requested(String),
    Completed,
}

/// Posible `PieceManager` errors.
#[derive(Debug)]
pub enum PieceManagerError {
    PoisonedPieceTableLock,
    InvalidPieceIndex(u32),
}

/// Thread-safe piece availability and selection state for one download.
///
/// This is the only mutable datum shared across peer connections; every
/// operation takes the single internal lock for a short critical section.
/// Selection is rarest-first: the `Missing` piece held by the fewest peers
/// wins, with ties broken first against pieces whose holders misbehaved
/// (hash mismatches) and then by lowest index.
#[derive(Debug)]
pub struct PieceManager {
    table: Mutex<PieceTable>,
}

#[derive(Debug)]
struct PieceTable {
    states: Vec<PieceState>,
    holders: Vec<HashSet<String>>,
    demoted: HashSet<String>,
}

impl PieceManager {
    /// Creates a new `PieceManager` with every piece `Missing` and no known
    /// holders.
    pub fn new(total_pieces: u32) -> Self {
        Self {
            table: Mutex::new(PieceTable {
                states: vec![PieceState::Missing; total_pieces as usize],
                holders: vec![HashSet::new(); total_pieces as usize],
                demoted: HashSet::new(),
            }),
        }
    }

    /// Returns the rarest `Missing` piece with at least one known holder, or
    /// `None`. No side effect.
    pub fn next_to_request(&self) -> Result<Option<u32>, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table.select(|_| true))
    }

    /// Like `next_to_request`, restricted to the pieces advertised in
    /// `bitfield`. No side effect.
    pub fn next_to_request_for(
        &self,
        bitfield: &Bitfield,
    ) -> Result<Option<u32>, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table.select(|index| bitfield.has_piece(index)))
    }

    /// Returns whether `bitfield` advertises any piece we have not completed.
    pub fn needs_any(&self, bitfield: &Bitfield) -> Result<bool, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table
            .states
            .iter()
            .enumerate()
            .any(|(i, state)| *state != PieceState::Completed && bitfield.has_piece(i as u32)))
    }

    /// `Missing -> Requested(peer)`. Returns `false` without effect if the
    /// piece is already requested or completed.
    pub fn mark_requested(&self, index: u32, peer: &str) -> Result<bool, PieceManagerError> {
        let mut table = self.lock_table()?;
        let state = table.state_mut(index)?;
        if *state != PieceState::Missing {
            return Ok(false);
        }
        *state = PieceState::Requested(peer.to_string());
        Ok(true)
    }

    /// `Requested -> Missing`. Used when a send fails, a delivery times out
    /// or a piece hash does not match. No-op in any other state.
    pub fn mark_not_requested(&self, index: u32) -> Result<(), PieceManagerError> {
        let mut table = self.lock_table()?;
        let state = table.state_mut(index)?;
        if matches!(state, PieceState::Requested(_)) {
            *state = PieceState::Missing;
        }
        Ok(())
    }

    /// Any state -> `Completed`.
    pub fn mark_completed(&self, index: u32) -> Result<(), PieceManagerError> {
        let mut table = self.lock_table()?;
        *table.state_mut(index)? = PieceState::Completed;
        Ok(())
    }

    /// Registers `peer` as a holder of each piece in `indices`. Re-announced
    /// pieces do not double-count availability.
    pub fn record_peer_pieces(
        &self,
        peer: &str,
        indices: &[u32],
    ) -> Result<(), PieceManagerError> {
        let mut table = self.lock_table()?;
        for index in indices {
            if (*index as usize) < table.holders.len() {
                table.holders[*index as usize].insert(peer.to_string());
            }
        }
        Ok(())
    }

    /// Removes `peer` from every holder set and releases every piece it had
    /// in flight. Called when a connection ends.
    pub fn forget_peer(&self, peer: &str) -> Result<(), PieceManagerError> {
        let mut table = self.lock_table()?;
        for holders in table.holders.iter_mut() {
            holders.remove(peer);
        }
        for state in table.states.iter_mut() {
            if matches!(state, PieceState::Requested(holder) if holder == peer) {
                *state = PieceState::Missing;
            }
        }
        Ok(())
    }

    /// Penalizes `peer` in the selection tie-break after a hash mismatch.
    pub fn demote_peer(&self, peer: &str) -> Result<(), PieceManagerError> {
        let mut table = self.lock_table()?;
        table.demoted.insert(peer.to_string());
        Ok(())
    }

    /// Returns true if every piece is `Completed`.
    pub fn is_complete(&self) -> Result<bool, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table
            .states
            .iter()
            .all(|state| *state == PieceState::Completed))
    }

    /// Returns the indices of the pieces not yet completed.
    pub fn missing(&self) -> Result<Vec<u32>, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table
            .states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state != PieceState::Completed)
            .map(|(index, _)| index as u32)
            .collect())
    }

    /// Returns the number of completed pieces.
    pub fn completed_count(&self) -> Result<u32, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table
            .states
            .iter()
            .filter(|state| **state == PieceState::Completed)
            .count() as u32)
    }

    /// Returns how many known peers hold piece `index`.
    pub fn availability(&self, index: u32) -> Result<usize, PieceManagerError> {
        let table = self.lock_table()?;
        table
            .holders
            .get(index as usize)
            .map(|holders| holders.len())
            .ok_or(PieceManagerError::InvalidPieceIndex(index))
    }

    /// Returns true if some piece is still wanted but no known peer holds it.
    pub fn is_stalled(&self) -> Result<bool, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table
            .states
            .iter()
            .enumerate()
            .any(|(i, state)| *state == PieceState::Missing && table.holders[i].is_empty()))
    }

    pub fn total_pieces(&self) -> Result<u32, PieceManagerError> {
        let table = self.lock_table()?;
        Ok(table.states.len() as u32)
    }

    fn lock_table(&self) -> Result<MutexGuard<PieceTable>, PieceManagerError> {
        self.table
            .lock()
            .map_err(|_| PieceManagerError::PoisonedPieceTableLock)
    }
}

impl PieceTable {
    /// Rarest-first selection over `Missing` pieces with availability >= 1
    /// that satisfy `eligible`. Score is (availability, demoted holders,
    /// index); iteration order makes the lowest index win ties.
    fn select<F>(&self, eligible: F) -> Option<u32>
    where
        F: Fn(u32) -> bool,
    {
        self.states
            .iter()
            .enumerate()
            .filter(|(i, state)| {
                **state == PieceState::Missing
                    && !self.holders[*i].is_empty()
                    && eligible(*i as u32)
            })
            .min_by_key(|(i, _)| {
                let holders = &self.holders[*i];
                let demoted_holders = holders.intersection(&self.demoted).count();
                (holders.len(), demoted_holders, *i)
            })
            .map(|(i, _)| i as u32)
    }

    fn state_mut(&mut self, index: u32) -> Result<&mut PieceState, PieceManagerError> {
        self.states
            .get_mut(index as usize)
            .ok_or(PieceManagerError::InvalidPieceIndex(index))
    }
}
