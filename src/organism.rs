//! Organism structure and behavior.
//!
//! An organism acts once per tick, in this order:
//!
//! 1. photosynthesis
//! 2. move to a random free neighboring cell
//! 3. hunt every edible neighbor
//! 4. procreate into a random free neighboring cell
//! 5. age
//!
//! Any energy expenditure that leaves the reserve at or below zero kills the
//! organism by starvation and ends its turn.

use crate::grid::{BiotopeError, Location};
use crate::species::Species;
use crate::world::{Ecosystem, OrganismId};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cause of death tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseOfDeath {
    Starvation,
    Hunted,
    Age,
}

/// An organism in the simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organism {
    pub location: Location,
    pub previous_location: Location,
    pub species: Species,
    pub age: u32,
    /// Drawn once at birth; the organism dies when `age` exceeds it
    pub death_age: u32,
    pub energy_reserve: f64,
    /// Reserve the organism was born with
    pub initial_energy_reserve: f64,
    /// Energy-independent organisms pay no costs and gain nothing from photosynthesis
    pub is_energy_dependent: bool,
    pub alive: bool,
    pub cause_of_death: Option<CauseOfDeath>,
}

impl Organism {
    /// Create a newborn organism
    pub fn new(location: Location, species: Species, energy_reserve: f64, death_age: u32) -> Self {
        Self {
            location,
            previous_location: location,
            species,
            age: 0,
            death_age,
            energy_reserve,
            initial_energy_reserve: energy_reserve,
            is_energy_dependent: true,
            alive: true,
            cause_of_death: None,
        }
    }

    /// Check if organism is alive
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// True if the reserve exceeds an action's minimum
    #[inline]
    pub fn has_energy_above(&self, minimum: f64) -> bool {
        self.energy_reserve > minimum
    }
}

/// Per-organism behavior. Lives on [`Ecosystem`] because every step reads or
/// writes the grid, the arena and the random source.
impl Ecosystem {
    /// Run one tick of behavior for a living organism.
    ///
    /// Only grid invariant violations are returned as errors; an organism
    /// that cannot move or procreate simply skips that step.
    pub fn act(&mut self, id: OrganismId) -> Result<(), BiotopeError> {
        if !self.is_alive(id) {
            return Ok(());
        }

        self.do_photosynthesis(id);

        self.do_move(id)?;
        if !self.is_alive(id) {
            return Ok(());
        }

        self.do_hunt(id)?;
        if !self.is_alive(id) {
            return Ok(());
        }

        self.do_procreate(id)?;
        if !self.is_alive(id) {
            return Ok(());
        }

        self.do_age(id)
    }

    fn do_photosynthesis(&mut self, id: OrganismId) {
        let Some(org) = self.organisms.get(id) else {
            return;
        };
        if !org.is_energy_dependent {
            return;
        }
        let gain = self.species_table.get(org.species).photosynthesis_yield;
        if let Some(org) = self.organisms.get_mut(id) {
            org.energy_reserve += gain;
        }
    }

    fn do_move(&mut self, id: OrganismId) -> Result<(), BiotopeError> {
        let Some(org) = self.organisms.get(id) else {
            return Ok(());
        };
        if !self.species_table.moves(org.species) {
            return Ok(());
        }
        let (location, dependent) = (org.location, org.is_energy_dependent);

        if dependent && org.has_energy_above(self.config.minimum_energy.move_) {
            let cost = self.config.energy_costs.capability_of_moving;
            if !self.spend_energy(id, cost)? {
                return Ok(());
            }
        }

        let free = self.biotope.neighbors_free(location, &mut self.rng);
        let Some(&target) = free.first() else {
            return Ok(());
        };
        if dependent && !self.spend_energy(id, self.config.energy_costs.moving)? {
            return Ok(());
        }

        self.biotope.relocate(location, target, id)?;
        if let Some(org) = self.organisms.get_mut(id) {
            org.previous_location = location;
            org.location = target;
        }
        Ok(())
    }

    fn do_hunt(&mut self, id: OrganismId) -> Result<(), BiotopeError> {
        let Some(org) = self.organisms.get(id) else {
            return Ok(());
        };
        if org.species.is_plant() {
            return Ok(());
        }
        let (location, species) = (org.location, org.species);

        if org.is_energy_dependent && org.has_energy_above(self.config.minimum_energy.hunt) {
            let cost = self.config.energy_costs.capability_of_hunting;
            if !self.spend_energy(id, cost)? {
                return Ok(());
            }
        }

        // Every edible neighbor is consumed, not just the first one
        for prey_id in self.biotope.neighbors_occupied(location, &mut self.rng) {
            let Some(prey) = self.organisms.get(prey_id) else {
                continue;
            };
            if !prey.alive || !self.species_table.can_eat(species, prey.species) {
                continue;
            }
            let meal = prey.energy_reserve;
            if let Some(hunter) = self.organisms.get_mut(id) {
                hunter.energy_reserve += meal;
            }
            self.do_die(prey_id, CauseOfDeath::Hunted)?;
        }
        Ok(())
    }

    fn do_procreate(&mut self, id: OrganismId) -> Result<(), BiotopeError> {
        let Some(org) = self.organisms.get(id) else {
            return Ok(());
        };
        let (location, species, dependent) = (org.location, org.species, org.is_energy_dependent);

        if dependent && org.has_energy_above(self.config.minimum_energy.procreate) {
            let cost = self.config.energy_costs.capability_of_procreating;
            if !self.spend_energy(id, cost)? {
                return Ok(());
            }
        }

        let probability = self.species_table.get(species).procreation_probability;
        if self.rng.gen::<f64>() >= probability {
            return Ok(());
        }

        let free = self.biotope.neighbors_free(location, &mut self.rng);
        let Some(&birthplace) = free.first() else {
            return Ok(());
        };

        // Split the reserve first; the procreation cost comes out of the parent's half
        let Some(parent) = self.organisms.get_mut(id) else {
            return Ok(());
        };
        let endowment = parent.energy_reserve / 2.0;
        parent.energy_reserve -= endowment;

        let death_age = self.species_table.lifespan(species).sample(&mut self.rng);
        self.spawn(Organism::new(birthplace, species, endowment, death_age))?;

        if dependent {
            self.spend_energy(id, self.config.energy_costs.procreating)?;
        }
        Ok(())
    }

    fn do_age(&mut self, id: OrganismId) -> Result<(), BiotopeError> {
        let Some(org) = self.organisms.get_mut(id) else {
            return Ok(());
        };
        org.age += 1;
        if org.age > org.death_age {
            self.do_die(id, CauseOfDeath::Age)?;
        }
        Ok(())
    }

    /// Charge energy; returns `false` if the organism starved
    fn spend_energy(&mut self, id: OrganismId, amount: f64) -> Result<bool, BiotopeError> {
        let Some(org) = self.organisms.get_mut(id) else {
            return Ok(false);
        };
        org.energy_reserve -= amount;
        if org.energy_reserve <= 0.0 {
            self.do_die(id, CauseOfDeath::Starvation)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Mark an organism dead, free its cell and queue it for reclamation.
    ///
    /// The organism stays in the arena until the next tick starts.
    pub(crate) fn do_die(&mut self, id: OrganismId, cause: CauseOfDeath) -> Result<(), BiotopeError> {
        let Some(org) = self.organisms.get_mut(id) else {
            return Ok(());
        };
        if !org.alive {
            return Ok(());
        }
        org.alive = false;
        org.cause_of_death = Some(cause);
        let location = org.location;

        self.biotope.vacate(location)?;
        self.dead.push(id);
        Ok(())
    }
}
