//! Snapshot documents: encoding, decoding and compression of engine state.
//!
//! A snapshot is a self-describing JSON document:
//!
//! ```text
//! constants:      the full Config
//! state:          { tick_count, rng_state }
//! organisms:      parallel columns, one entry per living organism
//! dead_organisms: same columns plus cause_of_death, for this tick only
//! ```
//!
//! On disk the JSON text is zstd-compressed.

use crate::config::{Config, ConfigError};
use crate::grid::{BiotopeError, Location};
use crate::organism::{CauseOfDeath, Organism};
use crate::species::Species;
use crate::world::Ecosystem;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete, self-describing capture of an ecosystem at one tick
#[derive(Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Version for compatibility checking
    pub version: u32,
    pub constants: Config,
    pub state: SnapshotState,
    /// Absent means "populate from `constants`"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisms: Option<OrganismColumns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_organisms: Option<DeadOrganismColumns>,
}

/// Mutable engine state besides the organisms
#[derive(Clone, Serialize, Deserialize)]
pub struct SnapshotState {
    pub tick_count: u64,
    /// Full generator state: seed, stream and position
    pub rng_state: ChaCha8Rng,
}

/// Organism fields as parallel arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganismColumns {
    pub locations: Vec<Location>,
    pub species: Vec<Species>,
    pub age: Vec<u32>,
    pub death_age: Vec<u32>,
    pub energy_reserve: Vec<f64>,
    pub initial_energy_reserve: Vec<f64>,
    pub is_energy_dependent: Vec<bool>,
}

/// Columns of the organisms that died during the captured tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeadOrganismColumns {
    #[serde(flatten)]
    pub columns: OrganismColumns,
    pub cause_of_death: Vec<CauseOfDeath>,
}

impl OrganismColumns {
    fn push(&mut self, org: &Organism) {
        self.locations.push(org.location);
        self.species.push(org.species);
        self.age.push(org.age);
        self.death_age.push(org.death_age);
        self.energy_reserve.push(org.energy_reserve);
        self.initial_energy_reserve.push(org.initial_energy_reserve);
        self.is_energy_dependent.push(org.is_energy_dependent);
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Check that every column has the same length
    fn check_shape(&self) -> Result<usize, SnapshotError> {
        let n = self.locations.len();
        let lengths = [
            ("species", self.species.len()),
            ("age", self.age.len()),
            ("death_age", self.death_age.len()),
            ("energy_reserve", self.energy_reserve.len()),
            ("initial_energy_reserve", self.initial_energy_reserve.len()),
            ("is_energy_dependent", self.is_energy_dependent.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(SnapshotError::Shape(format!(
                    "column {} has {} rows, expected {}",
                    name, len, n
                )));
            }
        }
        Ok(n)
    }

    /// Rebuild the organism of one row
    fn row(&self, i: usize) -> Organism {
        let mut org = Organism::new(
            self.locations[i],
            self.species[i],
            self.energy_reserve[i],
            self.death_age[i],
        );
        org.age = self.age[i];
        org.initial_energy_reserve = self.initial_energy_reserve[i];
        org.is_energy_dependent = self.is_energy_dependent[i];
        org
    }
}

/// Errors that make a snapshot unusable
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot compression error: {0}")]
    Compression(#[from] std::io::Error),
    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("malformed organism columns: {0}")]
    Shape(String),
    #[error("invalid constants: {0}")]
    Config(#[from] ConfigError),
    #[error("inconsistent occupancy: {0}")]
    Occupancy(#[from] BiotopeError),
}

impl Snapshot {
    /// Current snapshot version
    pub const VERSION: u32 = 1;

    /// Document for a run that has not started yet
    pub fn fresh(constants: Config, rng: ChaCha8Rng) -> Self {
        Self {
            version: Self::VERSION,
            constants,
            state: SnapshotState {
                tick_count: 0,
                rng_state: rng,
            },
            organisms: None,
            dead_organisms: None,
        }
    }

    /// Capture the engine. Living organisms are listed in acting order.
    pub fn encode(eco: &Ecosystem) -> Self {
        let mut organisms = OrganismColumns::default();
        for (_, org) in eco.living() {
            organisms.push(org);
        }

        let mut dead = DeadOrganismColumns::default();
        for (_, org) in eco.dead_this_tick() {
            dead.columns.push(org);
            dead.cause_of_death
                .push(org.cause_of_death.unwrap_or(CauseOfDeath::Starvation));
        }

        Self {
            version: Self::VERSION,
            constants: eco.config().clone(),
            state: SnapshotState {
                tick_count: eco.time(),
                rng_state: eco.rng().clone(),
            },
            organisms: Some(organisms),
            dead_organisms: Some(dead),
        }
    }

    /// Rebuild an engine.
    ///
    /// The occupancy map is derived by placing every organism again, so a
    /// document with two organisms on one cell is rejected. Without an
    /// organism section the engine is populated from the constants.
    pub fn decode(self) -> Result<Ecosystem, SnapshotError> {
        if self.version != Self::VERSION {
            return Err(SnapshotError::VersionMismatch {
                expected: Self::VERSION,
                found: self.version,
            });
        }
        self.constants.validate()?;

        let mut eco = Ecosystem::empty(self.constants, self.state.rng_state, self.state.tick_count);
        match self.organisms {
            Some(columns) => {
                let n = columns.check_shape()?;
                for i in 0..n {
                    eco.insert_organism(columns.row(i))?;
                }
            }
            None => eco.populate(),
        }

        // Off the grid, pending reclamation at the next tick
        if let Some(dead) = self.dead_organisms {
            let n = dead.columns.check_shape()?;
            if dead.cause_of_death.len() != n {
                return Err(SnapshotError::Shape(format!(
                    "column cause_of_death has {} rows, expected {}",
                    dead.cause_of_death.len(),
                    n
                )));
            }
            for (i, &cause) in dead.cause_of_death.iter().enumerate() {
                let mut org = dead.columns.row(i);
                org.alive = false;
                org.cause_of_death = Some(cause);
                let id = eco.organisms.insert(org);
                eco.dead.push(id);
            }
        }
        Ok(eco)
    }

    /// Number of living organisms in the document
    pub fn population(&self) -> usize {
        self.organisms.as_ref().map_or(0, OrganismColumns::len)
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON text
    pub fn from_json(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize and compress
    pub fn to_compressed(&self, level: i32) -> Result<Vec<u8>, SnapshotError> {
        let json = self.to_json()?;
        Ok(zstd::encode_all(&json[..], level)?)
    }

    /// Decompress and parse
    pub fn from_compressed(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let json = zstd::decode_all(bytes)?;
        Self::from_json(&json)
    }
}

impl Ecosystem {
    /// Restore an engine from a snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        snapshot.decode()
    }

    /// Create snapshot of current state
    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot::encode(self)
    }
}
