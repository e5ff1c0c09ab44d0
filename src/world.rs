//! Ecosystem engine - arena, random source and the tick loop.

use crate::checkpoint::{Snapshot, SnapshotError};
use crate::config::Config;
use crate::grid::{Biotope, BiotopeError, Location};
use crate::organism::Organism;
use crate::species::{Species, SpeciesTable};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generation-checked handle of an organism in the arena
    pub struct OrganismId;
}

/// The simulation engine.
///
/// Owns every organism, the occupancy grid and the random source. All
/// randomness in a run flows through `rng`, so an engine rebuilt from a
/// snapshot replays the same future as the engine it was taken from.
pub struct Ecosystem {
    pub(crate) config: Config,
    pub(crate) species_table: SpeciesTable,
    pub(crate) biotope: Biotope,
    pub(crate) organisms: SlotMap<OrganismId, Organism>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) time: u64,
    /// Died during the current tick; reclaimed when the next tick starts
    pub(crate) dead: Vec<OrganismId>,
    /// Born during the current tick
    pub(crate) births: Vec<OrganismId>,
}

impl Ecosystem {
    /// Create a freshly populated ecosystem.
    ///
    /// Goes through the same path as restoring a snapshot, with the organism
    /// section absent.
    pub fn new_with_seed(config: Config, seed: u64) -> Result<Self, SnapshotError> {
        Self::from_snapshot(Snapshot::fresh(config, ChaCha8Rng::seed_from_u64(seed)))
    }

    /// Empty engine: no organisms, every cell free
    pub(crate) fn empty(config: Config, rng: ChaCha8Rng, time: u64) -> Self {
        let biotope = Biotope::new(config.biotope.width, config.biotope.height);
        let species_table = SpeciesTable::from_config(&config);
        Self {
            config,
            species_table,
            biotope,
            organisms: SlotMap::with_key(),
            rng,
            time,
            dead: Vec::new(),
            births: Vec::new(),
        }
    }

    /// Place the configured initial population at random free cells.
    ///
    /// Species are populated in catalogue order. When the grid fills up the
    /// remaining organisms are skipped.
    pub(crate) fn populate(&mut self) {
        let reserve = self.config.initial_energy_reserve;

        for species in Species::ALL {
            let count = self.species_table.get(species).initial_count;
            for placed in 0..count {
                let location = match self.biotope.random_free_location(&mut self.rng) {
                    Ok(location) => location,
                    Err(e) => {
                        log::warn!(
                            "{}: placed {}/{} organisms of species {}",
                            e,
                            placed,
                            count,
                            species
                        );
                        break;
                    }
                };
                let death_age = self.species_table.lifespan(species).sample(&mut self.rng);
                let organism = Organism::new(location, species, reserve, death_age);
                let id = self.organisms.insert(organism);
                if let Err(e) = self.biotope.place(location, id) {
                    // A freshly drawn free cell cannot be occupied
                    log::error!("population placement failed: {}", e);
                    self.organisms.remove(id);
                }
            }
        }

        log::debug!(
            "populated biotope {}x{} with {} organisms",
            self.biotope.width(),
            self.biotope.height(),
            self.organisms.len()
        );
    }

    /// Add an organism at its own location.
    ///
    /// Used for restoring snapshots and for setting up scenarios. Does not
    /// count as a birth.
    pub fn insert_organism(&mut self, organism: Organism) -> Result<OrganismId, BiotopeError> {
        let location = organism.location;
        if !organism.alive {
            return Err(BiotopeError::DeadOrganism(location));
        }
        if !self.biotope.is_free(location) {
            return Err(match self.biotope.occupant(location) {
                Some(_) => BiotopeError::OccupiedLocation(location),
                None => BiotopeError::OutOfBounds(location),
            });
        }
        let id = self.organisms.insert(organism);
        self.biotope.place(location, id)?;
        Ok(id)
    }

    /// Add a newborn and record it as a birth of this tick
    pub(crate) fn spawn(&mut self, organism: Organism) -> Result<OrganismId, BiotopeError> {
        let id = self.insert_organism(organism)?;
        self.births.push(id);
        Ok(id)
    }

    /// Advance the ecosystem by one tick.
    ///
    /// 1. Reclaim organisms that died during the previous tick
    /// 2. Freeze the list of occupants in location order
    /// 3. Let each of them act, skipping those killed earlier in this tick
    /// 4. Advance the clock
    ///
    /// Organisms born during the tick are not in the frozen list and first
    /// act on the next tick.
    pub fn evolve(&mut self) -> Result<(), BiotopeError> {
        self.reclaim_dead();
        self.births.clear();

        let acting: Vec<OrganismId> = self.biotope.occupants().map(|(_, id)| id).collect();
        for id in acting {
            if self.is_alive(id) {
                self.act(id)?;
            }
        }

        self.time += 1;
        debug_assert!(self.biotope.is_consistent());
        Ok(())
    }

    /// Run the simulation for a number of ticks
    pub fn run(&mut self, ticks: u64) -> Result<(), BiotopeError> {
        for _ in 0..ticks {
            self.evolve()?;
        }
        Ok(())
    }

    fn reclaim_dead(&mut self) {
        for id in self.dead.drain(..) {
            self.organisms.remove(id);
        }
    }

    /// Current tick
    #[inline]
    pub fn time(&self) -> u64 {
        self.time
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn species_table(&self) -> &SpeciesTable {
        &self.species_table
    }

    #[inline]
    pub fn biotope(&self) -> &Biotope {
        &self.biotope
    }

    /// Random source state, for snapshots
    #[inline]
    pub fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    /// Look up an organism, dead or alive, that has not been reclaimed yet
    #[inline]
    pub fn organism(&self, id: OrganismId) -> Option<&Organism> {
        self.organisms.get(id)
    }

    #[inline]
    pub fn is_alive(&self, id: OrganismId) -> bool {
        self.organisms.get(id).map_or(false, |o| o.alive)
    }

    /// Organism occupying a cell
    pub fn organism_at(&self, location: Location) -> Option<&Organism> {
        self.biotope
            .occupant(location)
            .and_then(|id| self.organisms.get(id))
    }

    /// Living organisms in location order
    pub fn living(&self) -> impl Iterator<Item = (OrganismId, &Organism)> + '_ {
        self.biotope
            .occupants()
            .filter_map(move |(_, id)| self.organisms.get(id).map(|o| (id, o)))
    }

    /// Organisms that died during the last tick, in order of death
    pub fn dead_this_tick(&self) -> impl Iterator<Item = (OrganismId, &Organism)> + '_ {
        self.dead
            .iter()
            .filter_map(move |&id| self.organisms.get(id).map(|o| (id, o)))
    }

    /// Organisms born during the last tick
    #[inline]
    pub fn births(&self) -> &[OrganismId] {
        &self.births
    }

    /// Number of living organisms
    #[inline]
    pub fn population(&self) -> usize {
        self.biotope.occupied_count()
    }

    /// Check if population is extinct
    pub fn is_extinct(&self) -> bool {
        self.population() == 0
    }

    /// Verify that the grid and the arena agree on every living organism
    pub fn check_invariants(&self) -> bool {
        if !self.biotope.is_consistent() {
            return false;
        }
        let mut living = 0;
        for (id, org) in &self.organisms {
            if org.alive {
                living += 1;
                if self.biotope.occupant(org.location) != Some(id) {
                    return false;
                }
            }
        }
        living == self.biotope.occupied_count()
            && self
                .biotope
                .occupants()
                .all(|(loc, id)| self.organisms.get(id).map_or(false, |o| o.alive && o.location == loc))
    }
}
