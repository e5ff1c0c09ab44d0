//! Population census for a tick.

use crate::organism::CauseOfDeath;
use crate::species::Species;
use crate::world::Ecosystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Head count of the ecosystem after a tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Census {
    /// Simulation time
    pub time: u64,
    /// Living organisms per species
    pub population: BTreeMap<Species, usize>,
    /// Free cells in the biotope
    pub free_locations: usize,
    /// Births during the last tick
    pub births: usize,
    /// Deaths during the last tick, by cause
    pub deaths: BTreeMap<CauseOfDeath, usize>,
}

impl Census {
    /// Count the current state of an ecosystem
    pub fn of(eco: &Ecosystem) -> Self {
        let mut population: BTreeMap<Species, usize> =
            Species::ALL.iter().map(|&s| (s, 0)).collect();
        for (_, org) in eco.living() {
            *population.entry(org.species).or_insert(0) += 1;
        }

        let mut deaths = BTreeMap::new();
        for cause in eco.dead_this_tick().filter_map(|(_, org)| org.cause_of_death) {
            *deaths.entry(cause).or_insert(0) += 1;
        }

        Self {
            time: eco.time(),
            population,
            free_locations: eco.biotope().free_count(),
            births: eco.births().len(),
            deaths,
        }
    }

    /// Total living organisms
    pub fn total(&self) -> usize {
        self.population.values().sum()
    }

    /// Total deaths during the last tick
    pub fn total_deaths(&self) -> usize {
        self.deaths.values().sum()
    }

    /// Deaths from one cause during the last tick
    pub fn deaths_by(&self, cause: CauseOfDeath) -> usize {
        self.deaths.get(&cause).copied().unwrap_or(0)
    }

    /// Living organisms of one species
    pub fn count(&self, species: Species) -> usize {
        self.population.get(&species).copied().unwrap_or(0)
    }
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={} pop={} [", self.time, self.total())?;
        for (i, (species, count)) in self.population.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", species, count)?;
        }
        write!(
            f,
            "] free={} births={} deaths={}",
            self.free_locations,
            self.births,
            self.total_deaths()
        )
    }
}
