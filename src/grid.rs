//! Toroidal occupancy grid with O(1) free-cell draws.

use crate::world::OrganismId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Relative offsets of the Moore neighborhood, `dx` outer, `dy` inner
const MOORE_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Marks a cell that has no slot in the free list
const NOT_FREE: usize = usize::MAX;

/// A cell of the biotope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: u32,
    pub y: u32,
}

impl Location {
    #[inline]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Occupancy errors.
///
/// `OccupiedLocation` and `VacantLocation` mean the engine lost track of the
/// grid and are never expected in a correct run. `EmptyGrid` is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BiotopeError {
    #[error("location {0} is already occupied")]
    OccupiedLocation(Location),
    #[error("location {0} is not occupied")]
    VacantLocation(Location),
    #[error("location {0} is outside the biotope")]
    OutOfBounds(Location),
    #[error("no free location left in the biotope")]
    EmptyGrid,
    #[error("cannot place the dead organism at {0}")]
    DeadOrganism(Location),
}

/// The occupancy grid.
///
/// Occupied cells map to an [`OrganismId`]; free cells are kept in a dense
/// list with a back-index per cell so that drawing, claiming and releasing a
/// free cell are all O(1).
#[derive(Clone, Debug)]
pub struct Biotope {
    width: u32,
    height: u32,
    /// Occupant per cell, indexed x-major
    cells: Vec<Option<OrganismId>>,
    free: Vec<Location>,
    /// Position of each cell in `free`, or `NOT_FREE`
    free_slot: Vec<usize>,
    occupied: usize,
}

impl Biotope {
    /// Create an empty biotope where every cell is free
    pub fn new(width: u32, height: u32) -> Self {
        let capacity = width as usize * height as usize;
        let mut free = Vec::with_capacity(capacity);
        let mut free_slot = Vec::with_capacity(capacity);

        for x in 0..width {
            for y in 0..height {
                free_slot.push(free.len());
                free.push(Location::new(x, y));
            }
        }

        Self {
            width,
            height,
            cells: vec![None; capacity],
            free,
            free_slot,
            occupied: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of cells
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn occupied_count(&self) -> usize {
        self.occupied
    }

    #[inline]
    fn index(&self, loc: Location) -> Result<usize, BiotopeError> {
        if loc.x < self.width && loc.y < self.height {
            Ok(loc.x as usize * self.height as usize + loc.y as usize)
        } else {
            Err(BiotopeError::OutOfBounds(loc))
        }
    }

    #[inline]
    fn location_of(&self, idx: usize) -> Location {
        let h = self.height as usize;
        Location::new((idx / h) as u32, (idx % h) as u32)
    }

    /// Apply an offset with toroidal wrap-around
    #[inline]
    pub fn wrap(&self, loc: Location, dx: i64, dy: i64) -> Location {
        let w = self.width as i64;
        let h = self.height as i64;
        Location::new(
            (loc.x as i64 + dx).rem_euclid(w) as u32,
            (loc.y as i64 + dy).rem_euclid(h) as u32,
        )
    }

    /// Occupant of a cell, if any
    #[inline]
    pub fn occupant(&self, loc: Location) -> Option<OrganismId> {
        self.index(loc).ok().and_then(|idx| self.cells[idx])
    }

    /// True if the cell is free
    #[inline]
    pub fn is_free(&self, loc: Location) -> bool {
        self.index(loc)
            .map(|idx| self.cells[idx].is_none())
            .unwrap_or(false)
    }

    /// Put an organism on a free cell
    pub fn place(&mut self, loc: Location, id: OrganismId) -> Result<(), BiotopeError> {
        let idx = self.index(loc)?;
        if self.cells[idx].is_some() {
            return Err(BiotopeError::OccupiedLocation(loc));
        }
        self.claim_free(idx);
        self.cells[idx] = Some(id);
        self.occupied += 1;
        debug_assert_eq!(self.free.len() + self.occupied, self.capacity());
        Ok(())
    }

    /// Remove the occupant of a cell and return it
    pub fn vacate(&mut self, loc: Location) -> Result<OrganismId, BiotopeError> {
        let idx = self.index(loc)?;
        let id = self.cells[idx]
            .take()
            .ok_or(BiotopeError::VacantLocation(loc))?;
        self.release_free(idx);
        self.occupied -= 1;
        debug_assert_eq!(self.free.len() + self.occupied, self.capacity());
        Ok(id)
    }

    /// Move an organism between cells.
    ///
    /// Both cells are checked before anything changes, so a failed relocation
    /// leaves the grid untouched.
    pub fn relocate(
        &mut self,
        from: Location,
        to: Location,
        id: OrganismId,
    ) -> Result<(), BiotopeError> {
        let from_idx = self.index(from)?;
        let to_idx = self.index(to)?;
        if self.cells[from_idx] != Some(id) {
            return Err(BiotopeError::VacantLocation(from));
        }
        if self.cells[to_idx].is_some() {
            return Err(BiotopeError::OccupiedLocation(to));
        }

        self.cells[from_idx] = None;
        self.release_free(from_idx);
        self.claim_free(to_idx);
        self.cells[to_idx] = Some(id);
        debug_assert_eq!(self.free.len() + self.occupied, self.capacity());
        Ok(())
    }

    /// Uniformly draw one of the free cells
    pub fn random_free_location<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Location, BiotopeError> {
        if self.free.is_empty() {
            return Err(BiotopeError::EmptyGrid);
        }
        Ok(self.free[rng.gen_range(0..self.free.len())])
    }

    /// Free Moore neighbors of `center`, shuffled
    pub fn neighbors_free<R: Rng + ?Sized>(&self, center: Location, rng: &mut R) -> Vec<Location> {
        let mut result: Vec<Location> = MOORE_OFFSETS
            .iter()
            .map(|&(dx, dy)| self.wrap(center, dx, dy))
            .filter(|&loc| self.is_free(loc))
            .collect();
        result.shuffle(rng);
        result
    }

    /// Occupants of the Moore neighbors of `center`, shuffled
    pub fn neighbors_occupied<R: Rng + ?Sized>(
        &self,
        center: Location,
        rng: &mut R,
    ) -> Vec<OrganismId> {
        let mut result: Vec<OrganismId> = MOORE_OFFSETS
            .iter()
            .filter_map(|&(dx, dy)| self.occupant(self.wrap(center, dx, dy)))
            .collect();
        result.shuffle(rng);
        result
    }

    /// Occupied cells in location order (x-major)
    pub fn occupants(&self) -> impl Iterator<Item = (Location, OrganismId)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(idx, cell)| cell.map(|id| (self.location_of(idx), id)))
    }

    /// Full consistency check of the occupancy map against the free list
    pub fn is_consistent(&self) -> bool {
        if self.free.len() + self.occupied != self.capacity() {
            return false;
        }
        let mut occupied = 0;
        for (idx, cell) in self.cells.iter().enumerate() {
            let slot = self.free_slot[idx];
            match cell {
                Some(_) => {
                    occupied += 1;
                    if slot != NOT_FREE {
                        return false;
                    }
                }
                None => {
                    if slot == NOT_FREE || self.free.get(slot) != Some(&self.location_of(idx)) {
                        return false;
                    }
                }
            }
        }
        occupied == self.occupied
    }

    fn claim_free(&mut self, idx: usize) {
        let slot = self.free_slot[idx];
        debug_assert_ne!(slot, NOT_FREE);
        self.free.swap_remove(slot);
        if let Some(&moved) = self.free.get(slot) {
            // The former last entry now sits in the vacated slot
            let moved_idx = moved.x as usize * self.height as usize + moved.y as usize;
            self.free_slot[moved_idx] = slot;
        }
        self.free_slot[idx] = NOT_FREE;
    }

    fn release_free(&mut self, idx: usize) {
        debug_assert_eq!(self.free_slot[idx], NOT_FREE);
        self.free_slot[idx] = self.free.len();
        self.free.push(self.location_of(idx));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<OrganismId> {
        let mut arena: SlotMap<OrganismId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    #[test]
    fn test_place_and_vacate() {
        let id = ids(1)[0];
        let mut biotope = Biotope::new(10, 10);
        let loc = Location::new(3, 4);

        biotope.place(loc, id).unwrap();
        assert_eq!(biotope.occupant(loc), Some(id));
        assert_eq!(biotope.free_count(), 99);
        assert!(biotope.is_consistent());

        assert_eq!(biotope.vacate(loc).unwrap(), id);
        assert_eq!(biotope.occupant(loc), None);
        assert_eq!(biotope.free_count(), 100);
        assert!(biotope.is_consistent());
    }

    #[test]
    fn test_place_on_occupied_fails() {
        let ids = ids(2);
        let mut biotope = Biotope::new(5, 5);
        let loc = Location::new(1, 1);

        biotope.place(loc, ids[0]).unwrap();
        assert_eq!(
            biotope.place(loc, ids[1]),
            Err(BiotopeError::OccupiedLocation(loc))
        );
        assert_eq!(biotope.occupant(loc), Some(ids[0]));
        assert!(biotope.is_consistent());
    }

    #[test]
    fn test_vacate_empty_fails() {
        let mut biotope = Biotope::new(5, 5);
        let loc = Location::new(2, 2);
        assert_eq!(biotope.vacate(loc), Err(BiotopeError::VacantLocation(loc)));
    }

    #[test]
    fn test_relocate() {
        let ids = ids(2);
        let mut biotope = Biotope::new(5, 5);
        let a = Location::new(0, 0);
        let b = Location::new(0, 1);
        let c = Location::new(4, 4);

        biotope.place(a, ids[0]).unwrap();
        biotope.place(b, ids[1]).unwrap();

        assert_eq!(
            biotope.relocate(a, b, ids[0]),
            Err(BiotopeError::OccupiedLocation(b))
        );
        biotope.relocate(a, c, ids[0]).unwrap();

        assert!(biotope.is_free(a));
        assert_eq!(biotope.occupant(c), Some(ids[0]));
        assert_eq!(biotope.occupied_count(), 2);
        assert!(biotope.is_consistent());
    }

    #[test]
    fn test_wrap_around() {
        let biotope = Biotope::new(10, 8);
        let corner = Location::new(0, 0);

        assert_eq!(biotope.wrap(corner, -1, -1), Location::new(9, 7));
        assert_eq!(biotope.wrap(Location::new(9, 7), 1, 1), corner);
    }

    #[test]
    fn test_neighbors_wrap_at_corner() {
        let ids = ids(1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut biotope = Biotope::new(10, 10);
        biotope.place(Location::new(9, 9), ids[0]).unwrap();

        let occupied = biotope.neighbors_occupied(Location::new(0, 0), &mut rng);
        assert_eq!(occupied, vec![ids[0]]);

        let free = biotope.neighbors_free(Location::new(0, 0), &mut rng);
        assert_eq!(free.len(), 7);
        assert!(!free.contains(&Location::new(9, 9)));
        assert!(!free.contains(&Location::new(0, 0)));
    }

    #[test]
    fn test_random_free_location_exhausts() {
        let n = 9;
        let ids = ids(n);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut biotope = Biotope::new(3, 3);

        for &id in &ids {
            let loc = biotope.random_free_location(&mut rng).unwrap();
            biotope.place(loc, id).unwrap();
            assert!(biotope.is_consistent());
        }

        assert_eq!(
            biotope.random_free_location(&mut rng),
            Err(BiotopeError::EmptyGrid)
        );
        assert_eq!(biotope.occupied_count(), n);
    }

    #[test]
    fn test_occupants_in_location_order() {
        let ids = ids(3);
        let mut biotope = Biotope::new(4, 4);
        biotope.place(Location::new(2, 0), ids[0]).unwrap();
        biotope.place(Location::new(0, 3), ids[1]).unwrap();
        biotope.place(Location::new(0, 1), ids[2]).unwrap();

        let locs: Vec<Location> = biotope.occupants().map(|(loc, _)| loc).collect();
        assert_eq!(
            locs,
            vec![Location::new(0, 1), Location::new(0, 3), Location::new(2, 0)]
        );
    }

    #[test]
    fn test_churn_keeps_invariants() {
        let ids = ids(40);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut biotope = Biotope::new(7, 6);
        let mut placed = Vec::new();

        for (i, &id) in ids.iter().enumerate() {
            let loc = biotope.random_free_location(&mut rng).unwrap();
            biotope.place(loc, id).unwrap();
            placed.push(loc);
            if i % 3 == 0 {
                let victim = placed.swap_remove(rng.gen_range(0..placed.len()));
                biotope.vacate(victim).unwrap();
            }
            assert!(biotope.is_consistent());
            assert_eq!(
                biotope.free_count() + biotope.occupied_count(),
                biotope.capacity()
            );
        }
    }
}
