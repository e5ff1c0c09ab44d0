//! # BIOTOPE
//!
//! Grid ecosystem simulator with time-travel snapshots.
//!
//! ## Features
//!
//! - **Food web**: plants, two herbivores and three carnivores on a toroidal grid
//! - **Reproducible**: a seeded generator owned and saved by the ecosystem
//! - **Time travel**: every saved tick can be reloaded and replayed exactly
//! - **Configurable**: YAML configuration files
//! - **Compact**: JSON snapshots compressed with zstd
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use biotope::{Config, Ecosystem};
//!
//! let mut eco = Ecosystem::new_with_seed(Config::default(), 42).unwrap();
//!
//! eco.run(100).unwrap();
//!
//! println!("Population: {}", eco.population());
//! ```
//!
//! ## Experiments
//!
//! ```rust,no_run
//! use biotope::{Config, ExperimentStore};
//!
//! let store = ExperimentStore::create("experiments/demo", Config::default(), 42).unwrap();
//! for _ in 0..200 {
//!     store.evolve().unwrap();
//! }
//!
//! // Back to the start
//! store.load(0).unwrap();
//! println!("Saved ticks: {:?}", store.list_available_ticks().unwrap());
//! println!("Size: {}", store.size_on_disk().unwrap());
//! ```
//!
//! ## Snapshots
//!
//! ```rust
//! use biotope::{Config, Ecosystem, Snapshot};
//!
//! let mut config = Config::default();
//! config.biotope.width = 20;
//! config.biotope.height = 20;
//!
//! let eco = Ecosystem::new_with_seed(config, 7).unwrap();
//! let bytes = eco.create_snapshot().to_compressed(3).unwrap();
//! let restored = Snapshot::from_compressed(&bytes).unwrap().decode().unwrap();
//! assert_eq!(restored.population(), eco.population());
//! ```

pub mod checkpoint;
pub mod config;
pub mod experiment;
pub mod grid;
pub mod organism;
pub mod species;
pub mod stats;
pub mod world;

// Re-export main types
pub use checkpoint::Snapshot;
pub use config::Config;
pub use experiment::ExperimentStore;
pub use organism::Organism;
pub use species::Species;
pub use world::{Ecosystem, OrganismId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
