//! Integration tests for BIOTOPE

use biotope::config::LifespanDistribution;
use biotope::experiment::StoreError;
use biotope::grid::Location;
use biotope::organism::CauseOfDeath;
use biotope::{Config, Ecosystem, ExperimentStore, Organism, Snapshot, Species};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Empty 10x10 grid, no stochastic births, long lives
fn quiet_config() -> Config {
    let mut config = Config::default();
    config.biotope.width = 10;
    config.biotope.height = 10;
    for row in config.species.values_mut() {
        row.initial_count = 0;
        row.procreation_probability = 0.0;
        row.lifespan = LifespanDistribution::UniformInt { min: 1000, max: 1000 };
    }
    config
}

fn experiment_config() -> Config {
    let mut config = Config::default();
    config.biotope.width = 24;
    config.biotope.height = 24;
    for (species, row) in config.species.iter_mut() {
        row.initial_count = if *species == Species::Plant { 60 } else { 6 };
    }
    config.initial_energy_reserve = 300.0;
    config.experiment.backup_period = 50;
    config.experiment.bucket_size = 100;
    config
}

type Occupancy = Vec<(Location, Species, u32, u32, u64)>;

fn occupancy(eco: &Ecosystem) -> Occupancy {
    eco.living()
        .map(|(_, o)| (o.location, o.species, o.age, o.death_age, o.energy_reserve.to_bits()))
        .collect()
}

#[test]
fn test_carnivore_eats_adjacent_herbivore() {
    init_logging();
    let mut config = quiet_config();
    // Keep the hunter next to its prey
    config.species.get_mut(&Species::Carnivore1).unwrap().mobile = false;

    let mut eco = Ecosystem::new_with_seed(config.clone(), 11).unwrap();
    let hunter = eco
        .insert_organism(Organism::new(Location::new(5, 5), Species::Carnivore1, 1000.0, 1000))
        .unwrap();
    let prey = eco
        .insert_organism(Organism::new(Location::new(5, 6), Species::Herbivore1, 500.0, 1000))
        .unwrap();

    eco.evolve().unwrap();

    assert!(eco.organism_at(Location::new(5, 6)).is_none());
    assert!(!eco.is_alive(prey));
    let dead: Vec<_> = eco.dead_this_tick().collect();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].1.cause_of_death, Some(CauseOfDeath::Hunted));

    let expected = 1000.0 + 500.0 - config.energy_costs.capability_of_procreating;
    let energy = eco.organism(hunter).unwrap().energy_reserve;
    assert!((energy - expected).abs() < 1e-9, "energy {} != {}", energy, expected);

    let snapshot = eco.create_snapshot();
    let dead_columns = snapshot.dead_organisms.unwrap();
    assert_eq!(dead_columns.cause_of_death, vec![CauseOfDeath::Hunted]);
    assert_eq!(dead_columns.columns.locations, vec![Location::new(5, 6)]);
}

#[test]
fn test_starved_organism_leaves_the_grid() {
    let mut eco = Ecosystem::new_with_seed(quiet_config(), 12).unwrap();
    let id = eco
        .insert_organism(Organism::new(Location::new(2, 2), Species::Herbivore1, 3.0, 1000))
        .unwrap();

    eco.evolve().unwrap();
    assert!(!eco.is_alive(id));
    assert_eq!(eco.organism(id).unwrap().cause_of_death, Some(CauseOfDeath::Starvation));
    assert_eq!(eco.population(), 0);

    eco.evolve().unwrap();
    assert!(eco.organism(id).is_none());
    assert_eq!(eco.dead_this_tick().count(), 0);
    assert!(eco.create_snapshot().organisms.map_or(true, |c| c.is_empty()));
}

#[test]
fn test_walled_plant_keeps_growing() {
    let mut config = quiet_config();
    config.biotope.width = 3;
    config.biotope.height = 3;
    let mut eco = Ecosystem::new_with_seed(config, 13).unwrap();

    let mut plant = None;
    for x in 0..3 {
        for y in 0..3 {
            let id = eco
                .insert_organism(Organism::new(Location::new(x, y), Species::Plant, 10.0, 1000))
                .unwrap();
            if (x, y) == (1, 1) {
                plant = Some(id);
            }
        }
    }
    let plant = plant.unwrap();

    let mut last = eco.organism(plant).unwrap().energy_reserve;
    for _ in 0..20 {
        eco.evolve().unwrap();
        let org = eco.organism(plant).unwrap();
        assert_eq!(org.location, Location::new(1, 1));
        assert!(org.energy_reserve > last);
        last = org.energy_reserve;
    }
}

#[test]
fn test_invariants_hold_over_long_run() {
    init_logging();
    let mut eco = Ecosystem::new_with_seed(experiment_config(), 14).unwrap();
    let capacity = eco.biotope().capacity();

    for _ in 0..300 {
        eco.evolve().unwrap();
        assert!(eco.check_invariants());
        assert_eq!(eco.biotope().occupied_count() + eco.biotope().free_count(), capacity);
        for (id, org) in eco.living() {
            assert_eq!(eco.biotope().occupant(org.location), Some(id));
        }
    }
}

#[test]
fn test_time_travel_replays_exactly() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = ExperimentStore::create(dir.path(), experiment_config(), 15).unwrap();

    let start = occupancy(&store.lock().unwrap());
    for _ in 0..50 {
        store.evolve().unwrap();
    }
    let tick_50 = occupancy(&store.lock().unwrap());
    let saved_50 = std::fs::read(store.snapshot_path(50)).unwrap();

    store.load(0).unwrap();
    assert_eq!(store.current_tick().unwrap(), 0);
    assert_eq!(occupancy(&store.lock().unwrap()), start);

    for _ in 0..50 {
        store.evolve().unwrap();
    }
    assert_eq!(occupancy(&store.lock().unwrap()), tick_50);
    // The replayed autosave overwrote tick 50 with the same bytes
    assert_eq!(std::fs::read(store.snapshot_path(50)).unwrap(), saved_50);
}

#[test]
fn test_list_available_ticks_sorted() {
    let dir = tempdir().unwrap();
    let mut config = experiment_config();
    config.experiment.backup_period = 1000;
    let store = ExperimentStore::create(dir.path(), config, 16).unwrap();

    for _ in 0..100 {
        store.evolve().unwrap();
    }
    store.save().unwrap();
    store.load(0).unwrap();
    for _ in 0..50 {
        store.evolve().unwrap();
    }
    store.save().unwrap();

    assert_eq!(store.list_available_ticks().unwrap(), vec![0, 50, 100]);
    assert!(dir.path().join("100_to_199").is_dir());
    assert!(store.size_on_disk().unwrap().ends_with('B'));
}

#[test]
fn test_save_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = ExperimentStore::create(dir.path(), experiment_config(), 17).unwrap();
    for _ in 0..7 {
        store.evolve().unwrap();
    }

    let path = store.save().unwrap();
    let first = std::fs::read(&path).unwrap();
    let again = store.save().unwrap();
    assert_eq!(path, again);
    assert_eq!(std::fs::read(&again).unwrap(), first);

    let decoded = Snapshot::from_compressed(&first).unwrap();
    assert_eq!(decoded.state.tick_count, 7);
}

#[test]
fn test_read_only_view_of_the_past() {
    let dir = tempdir().unwrap();
    let live = ExperimentStore::create(dir.path(), experiment_config(), 18).unwrap();
    let start = occupancy(&live.lock().unwrap());
    for _ in 0..60 {
        live.evolve().unwrap();
    }

    let past = ExperimentStore::open_read_only(dir.path(), 0).unwrap();
    assert_eq!(occupancy(&past.lock().unwrap()), start);
    assert!(matches!(past.save(), Err(StoreError::ReadOnly)));

    past.load(50).unwrap();
    assert_eq!(past.current_tick().unwrap(), 50);
    assert_eq!(live.current_tick().unwrap(), 60);
}

#[test]
fn test_missing_and_corrupt_snapshots() {
    let dir = tempdir().unwrap();
    let store = ExperimentStore::create(dir.path(), experiment_config(), 19).unwrap();

    assert!(matches!(
        store.load(42),
        Err(StoreError::MissingSnapshot { tick: 42 })
    ));

    let path = store.snapshot_path(7);
    std::fs::write(&path, b"definitely not zstd").unwrap();
    assert!(matches!(store.load(7), Err(StoreError::CorruptSnapshot { .. })));

    // The live engine is untouched
    assert_eq!(store.current_tick().unwrap(), 0);
    assert_eq!(store.latest_tick().unwrap(), Some(7));
}

#[test]
fn test_reader_never_blocks_the_simulation() {
    let dir = tempdir().unwrap();
    let store = ExperimentStore::create(dir.path(), experiment_config(), 20).unwrap();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut frames = 0u64;
            while !done.load(Ordering::Acquire) {
                if let Some(eco) = store.try_lock() {
                    assert!(eco.check_invariants());
                    frames += 1;
                    store.unlock(eco);
                }
                std::thread::yield_now();
            }
            frames
        });

        for _ in 0..100 {
            store.evolve().unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();
    });

    assert_eq!(store.current_tick().unwrap(), 100);
    assert_eq!(store.list_available_ticks().unwrap(), vec![0, 50, 100]);
}

#[test]
fn test_config_file_drives_experiment() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("biotope.yaml");
    experiment_config().save(&config_path).unwrap();

    let config = Config::from_file(&config_path).unwrap();
    assert_eq!(config, experiment_config());

    let store = ExperimentStore::open_or_create(dir.path().join("exp"), config, 21).unwrap();
    assert_eq!(store.config().biotope.width, 24);
    assert_eq!(store.backup_period(), 50);
}
