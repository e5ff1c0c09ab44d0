//! Species catalogue and the food web.

use crate::config::{Config, LifespanDistribution, SpeciesConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of species living in the biotope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Species {
    #[serde(rename = "P")]
    Plant,
    #[serde(rename = "H1")]
    Herbivore1,
    #[serde(rename = "H2")]
    Herbivore2,
    #[serde(rename = "C1")]
    Carnivore1,
    #[serde(rename = "C2")]
    Carnivore2,
    #[serde(rename = "C3")]
    Carnivore3,
}

impl Species {
    /// Number of species
    pub const COUNT: usize = 6;

    /// All species, in population-initialization order
    pub const ALL: [Species; Species::COUNT] = [
        Species::Plant,
        Species::Herbivore1,
        Species::Herbivore2,
        Species::Carnivore1,
        Species::Carnivore2,
        Species::Carnivore3,
    ];

    /// Dense index used by per-species lookup tables
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Species::Plant => 0,
            Species::Herbivore1 => 1,
            Species::Herbivore2 => 2,
            Species::Carnivore1 => 3,
            Species::Carnivore2 => 4,
            Species::Carnivore3 => 5,
        }
    }

    /// Plants photosynthesize and never move or hunt
    #[inline]
    pub fn is_plant(self) -> bool {
        self == Species::Plant
    }

    /// Short code used in snapshots and logs
    pub fn code(self) -> &'static str {
        match self {
            Species::Plant => "P",
            Species::Herbivore1 => "H1",
            Species::Herbivore2 => "H2",
            Species::Carnivore1 => "C1",
            Species::Carnivore2 => "C2",
            Species::Carnivore3 => "C3",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-species constants resolved from [`Config`] into dense arrays.
///
/// The food web is an adjacency matrix keyed by `(predator, prey)` so that a
/// hunt check is a single array lookup.
#[derive(Debug, Clone)]
pub struct SpeciesTable {
    rows: [SpeciesConfig; Species::COUNT],
    food_web: [[bool; Species::COUNT]; Species::COUNT],
}

impl SpeciesTable {
    /// Resolve the table from a configuration.
    ///
    /// Species missing from the configuration fall back to an inert row
    /// (never procreates, never eats); `Config::validate` rejects such
    /// configurations before an engine is built.
    pub fn from_config(config: &Config) -> Self {
        let rows = Species::ALL.map(|species| {
            config
                .species
                .get(&species)
                .cloned()
                .unwrap_or_else(SpeciesConfig::inert)
        });

        let mut food_web = [[false; Species::COUNT]; Species::COUNT];
        for species in Species::ALL {
            for prey in &rows[species.index()].prey {
                food_web[species.index()][prey.index()] = true;
            }
        }

        Self { rows, food_web }
    }

    /// Constants for one species
    #[inline]
    pub fn get(&self, species: Species) -> &SpeciesConfig {
        &self.rows[species.index()]
    }

    /// True if `predator` may consume `prey`
    #[inline]
    pub fn can_eat(&self, predator: Species, prey: Species) -> bool {
        self.food_web[predator.index()][prey.index()]
    }

    /// True if the species moves around the biotope
    #[inline]
    pub fn moves(&self, species: Species) -> bool {
        !species.is_plant() && self.get(species).mobile
    }

    /// Lifespan distribution of a species
    #[inline]
    pub fn lifespan(&self, species: Species) -> LifespanDistribution {
        self.get(species).lifespan
    }
}
