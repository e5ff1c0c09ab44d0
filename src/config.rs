//! Configuration system for the ecosystem.
//!
//! The configuration doubles as the `constants` block of every snapshot, so a
//! saved experiment always carries the tunables it was run with. YAML files
//! are supported for hand-edited experiment setups.

use crate::species::Species;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub biotope: BiotopeConfig,
    pub species: BTreeMap<Species, SpeciesConfig>,
    pub energy_costs: EnergyCosts,
    pub minimum_energy: MinimumEnergy,
    /// Energy reserve of every organism created by fresh population
    pub initial_energy_reserve: f64,
    #[serde(default)]
    pub experiment: ExperimentConfig,
}

/// Grid dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiotopeConfig {
    pub width: u32,
    pub height: u32,
}

/// Per-species constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesConfig {
    /// Organisms created by fresh population
    pub initial_count: usize,
    /// Energy gained per tick by photosynthesis
    pub photosynthesis_yield: f64,
    /// Chance per tick of attempting to procreate
    pub procreation_probability: f64,
    /// Distribution of the age at which an organism dies
    pub lifespan: LifespanDistribution,
    /// Whether the species moves (plants never do)
    #[serde(default = "default_true")]
    pub mobile: bool,
    /// Species this one may consume
    #[serde(default)]
    pub prey: Vec<Species>,
}

fn default_true() -> bool {
    true
}

impl SpeciesConfig {
    /// Row that never procreates, eats, or moves
    pub fn inert() -> Self {
        Self {
            initial_count: 0,
            photosynthesis_yield: 0.0,
            procreation_probability: 0.0,
            lifespan: LifespanDistribution::UniformInt { min: 0, max: 0 },
            mobile: false,
            prey: Vec::new(),
        }
    }
}

/// Distribution a death age is drawn from at birth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum LifespanDistribution {
    /// Uniform integer in `min..=max`
    UniformInt { min: u32, max: u32 },
}

impl LifespanDistribution {
    /// Draw a death age
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match *self {
            LifespanDistribution::UniformInt { min, max } => rng.gen_range(min..=max),
        }
    }
}

/// Energy charged for actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyCosts {
    /// Paid each tick by organisms able to move
    pub capability_of_moving: f64,
    /// Paid for each actual move
    pub moving: f64,
    /// Paid each tick by organisms able to hunt
    pub capability_of_hunting: f64,
    /// Paid each tick by organisms able to procreate
    pub capability_of_procreating: f64,
    /// Paid by the parent after a birth
    pub procreating: f64,
}

/// Reserve an organism must exceed before a capability cost is charged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumEnergy {
    #[serde(rename = "move")]
    pub move_: f64,
    pub hunt: f64,
    pub procreate: f64,
}

/// Experiment storage tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Ticks between automatic saves
    pub backup_period: u64,
    /// Ticks per snapshot sub-directory
    pub bucket_size: u64,
    /// zstd compression level
    pub compression_level: i32,
}

impl Default for Config {
    fn default() -> Self {
        let mut species = BTreeMap::new();

        species.insert(
            Species::Plant,
            SpeciesConfig {
                initial_count: 300,
                photosynthesis_yield: 10.0,
                procreation_probability: 0.15,
                lifespan: LifespanDistribution::UniformInt { min: 0, max: 30 },
                mobile: false,
                prey: Vec::new(),
            },
        );
        for herbivore in [Species::Herbivore1, Species::Herbivore2] {
            species.insert(
                herbivore,
                SpeciesConfig {
                    initial_count: 30,
                    photosynthesis_yield: 0.0,
                    procreation_probability: 0.07,
                    lifespan: LifespanDistribution::UniformInt { min: 0, max: 50 },
                    mobile: true,
                    prey: vec![Species::Plant],
                },
            );
        }
        for carnivore in [Species::Carnivore1, Species::Carnivore2, Species::Carnivore3] {
            species.insert(
                carnivore,
                SpeciesConfig {
                    initial_count: 30,
                    photosynthesis_yield: 0.0,
                    procreation_probability: 0.05,
                    lifespan: LifespanDistribution::UniformInt { min: 0, max: 100 },
                    // C3 is an ambush predator
                    mobile: carnivore != Species::Carnivore3,
                    prey: vec![Species::Herbivore1, Species::Herbivore2],
                },
            );
        }

        Self {
            biotope: BiotopeConfig::default(),
            species,
            energy_costs: EnergyCosts::default(),
            minimum_energy: MinimumEnergy::default(),
            initial_energy_reserve: 30000.0,
            experiment: ExperimentConfig::default(),
        }
    }
}

impl Default for BiotopeConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
        }
    }
}

impl Default for EnergyCosts {
    fn default() -> Self {
        Self {
            capability_of_moving: 0.0,
            moving: 4.0,
            capability_of_hunting: 0.0,
            capability_of_procreating: 0.002,
            procreating: 5.0,
        }
    }
}

impl Default for MinimumEnergy {
    fn default() -> Self {
        Self {
            move_: 100.0,
            hunt: 100.0,
            procreate: 100.0,
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            backup_period: 50,
            bucket_size: 1000,
            compression_level: 3,
        }
    }
}

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Number of cells in the grid
    pub fn grid_cells(&self) -> usize {
        self.biotope.width as usize * self.biotope.height as usize
    }

    /// Total organisms created by fresh population
    pub fn initial_population(&self) -> usize {
        self.species.values().map(|s| s.initial_count).sum()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        // Smaller grids wrap a cell's neighbors onto each other
        if self.biotope.width < 3 || self.biotope.height < 3 {
            return invalid(format!(
                "biotope must be at least 3x3, got {}x{}",
                self.biotope.width, self.biotope.height
            ));
        }
        for species in Species::ALL {
            let Some(row) = self.species.get(&species) else {
                return invalid(format!("species {} missing from species table", species));
            };
            if !(0.0..=1.0).contains(&row.procreation_probability) {
                return invalid(format!(
                    "procreation_probability of {} must be in [0, 1]",
                    species
                ));
            }
            let LifespanDistribution::UniformInt { min, max } = row.lifespan;
            if min > max {
                return invalid(format!("lifespan of {} has min {} > max {}", species, min, max));
            }
            if species.is_plant() && !row.prey.is_empty() {
                return invalid("plants cannot have prey".to_string());
            }
        }
        if !self.initial_energy_reserve.is_finite() || self.initial_energy_reserve <= 0.0 {
            return invalid("initial_energy_reserve must be > 0".to_string());
        }
        if self.experiment.backup_period == 0 {
            return invalid("backup_period must be > 0".to_string());
        }
        if self.experiment.bucket_size == 0 {
            return invalid("bucket_size must be > 0".to_string());
        }
        if self.initial_population() > self.grid_cells() {
            log::warn!(
                "initial population {} exceeds {} grid cells; surplus organisms will not be placed",
                self.initial_population(),
                self.grid_cells()
            );
        }
        Ok(())
    }
}
