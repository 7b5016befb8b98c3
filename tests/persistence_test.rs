//! Persistence tests: checkpoint, restore and atomic replacement

use paperstrike::services::{PortfolioStore, TradingEngine};
use paperstrike::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

fn create_test_store(name: &str) -> PortfolioStore {
    let dir = PathBuf::from(format!(".test_store_it_{}", name));
    if dir.exists() {
        let _ = fs::remove_dir_all(&dir);
    }
    PortfolioStore::open(dir).unwrap()
}

fn cleanup_test_store(store: &PortfolioStore) {
    let _ = fs::remove_dir_all(store.dir());
}

fn busy_engine() -> TradingEngine {
    let mut engine = TradingEngine::new(InstrumentProfile::nifty(), 100_000.0, 0.02).unwrap();

    let a = engine
        .open(
            &Signal::new("CALL", "orb", 25254.30, 50.0).with_notes("15m breakout"),
            |_| Some(77.70),
        )
        .unwrap();
    engine.evaluate(&a.id, 65.0).unwrap();

    let b = engine
        .open(&Signal::new("PUT", "orb", 25198.15, 61.3), |_| None)
        .unwrap();
    engine.evaluate(&b.id, 150.0).unwrap();

    engine
        .open(&Signal::new("CE", "vwap", 25310.00, 47.9), |_| Some(88.15))
        .unwrap();
    engine
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_persist_restore_is_bit_equal() {
    let store = create_test_store("round_trip");
    let mut engine = busy_engine();

    assert_eq!(engine.persist(&store).unwrap(), 2);
    assert!(!engine.has_unsaved_changes());

    let restored =
        TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store).unwrap();

    assert_eq!(restored.strategies(), engine.strategies());
    for strategy in engine.strategies() {
        let original = engine.portfolio(&strategy).unwrap();
        let loaded = restored.portfolio(&strategy).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(
            loaded.available_capital().to_bits(),
            original.available_capital().to_bits()
        );
        for (x, y) in loaded.open_trades().zip(original.open_trades()) {
            assert_eq!(x.entry_premium.to_bits(), y.entry_premium.to_bits());
            assert_eq!(x.entry_time, y.entry_time);
        }
    }
    cleanup_test_store(&store);
}

#[test]
fn test_restored_engine_continues_ids() {
    let store = create_test_store("continue_ids");
    let mut engine = busy_engine();
    engine.persist(&store).unwrap();

    let mut restored =
        TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store).unwrap();
    let trade = restored
        .open(&Signal::new("CALL", "orb", 25254.30, 50.0), |_| Some(30.0))
        .unwrap();
    assert_eq!(trade.id, "ORB-0003");
    cleanup_test_store(&store);
}

#[test]
fn test_persist_only_writes_changed_strategies() {
    let store = create_test_store("dirty");
    let mut engine = busy_engine();
    engine.persist(&store).unwrap();
    assert_eq!(engine.persist(&store).unwrap(), 0);

    let vwap_open = engine.portfolio("vwap").unwrap().open_trades().next().unwrap().id.clone();
    engine.close_manual(&vwap_open).unwrap();
    assert_eq!(engine.persist(&store).unwrap(), 1);

    let saved = store.load("vwap").unwrap().unwrap();
    assert_eq!(saved.open_count(), 0);
    cleanup_test_store(&store);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[test]
fn test_failed_persist_keeps_memory_authoritative() {
    let store = create_test_store("failure");
    let mut engine = busy_engine();
    let snapshot_before = engine.snapshot(&HashMap::new());

    fs::remove_dir_all(store.dir()).unwrap();
    assert!(matches!(engine.persist(&store), Err(EngineError::Persistence(_))));
    assert!(engine.has_unsaved_changes());

    let snapshot_after = engine.snapshot(&HashMap::new());
    assert_eq!(snapshot_after.totals, snapshot_before.totals);

    // Retry succeeds once the directory is back
    fs::create_dir_all(store.dir()).unwrap();
    assert_eq!(engine.persist(&store).unwrap(), 2);
    cleanup_test_store(&store);
}

#[test]
fn test_previous_checkpoint_survives_torn_write() {
    let store = create_test_store("torn");
    let mut engine = busy_engine();
    engine.persist(&store).unwrap();
    let good = store.load("orb").unwrap().unwrap();

    // A crash between write and rename leaves only a temp file behind
    fs::write(store.dir().join("orb.json.tmp"), "{\"strategy\":\"orb\",").unwrap();

    let restored =
        TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store).unwrap();
    assert_eq!(restored.portfolio("orb").unwrap(), &good);
    cleanup_test_store(&store);
}

#[test]
fn test_persisted_layout() {
    let store = create_test_store("layout");
    let mut engine = busy_engine();
    engine.persist(&store).unwrap();

    let raw = fs::read_to_string(store.dir().join("orb.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(value["initialCapital"], 100_000.0);
    assert_eq!(value["idPrefix"], "ORB");
    assert!(value["availableCapital"].is_number());
    assert_eq!(value["closedTrades"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["openTrades"].as_object().map(|m| m.len()), Some(1));

    let closed = &value["closedTrades"][0];
    assert_eq!(closed["status"], "STOP_LOSS_HIT");
    assert_eq!(closed["kind"], "CALL");
    assert_eq!(closed["notes"], "15m breakout");
    let exit_time = closed["exitTime"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(exit_time).is_ok());
    cleanup_test_store(&store);
}

// =============================================================================
// Strategy Naming
// =============================================================================

#[test]
fn test_similar_strategy_names_survive_restore() {
    let store = create_test_store("similar_names");
    let mut engine = TradingEngine::new(InstrumentProfile::nifty(), 100_000.0, 0.02).unwrap();
    let spaced = engine
        .open(&Signal::new("CALL", "mean rev", 25254.30, 50.0), |_| Some(77.70))
        .unwrap();
    let underscored = engine
        .open(&Signal::new("PUT", "mean_rev", 25254.30, 50.0), |_| Some(80.0))
        .unwrap();
    assert_ne!(spaced.id, underscored.id);
    assert_eq!(engine.persist(&store).unwrap(), 2);

    let restored =
        TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store).unwrap();
    assert_eq!(restored.strategies(), vec!["mean rev", "mean_rev"]);
    assert_eq!(restored.find_trade(&spaced.id).unwrap().strategy, "mean rev");
    assert_eq!(restored.find_trade(&underscored.id).unwrap().strategy, "mean_rev");
    cleanup_test_store(&store);
}

#[test]
fn test_restored_prefixes_stay_distinct() {
    let store = create_test_store("prefixes");
    let mut engine = TradingEngine::new(InstrumentProfile::nifty(), 100_000.0, 0.02).unwrap();
    engine
        .open(&Signal::new("CALL", "Opening Range A", 25254.30, 50.0), |_| Some(77.70))
        .unwrap();
    engine
        .open(&Signal::new("CALL", "Opening Range B", 25254.30, 50.0), |_| Some(77.70))
        .unwrap();
    engine.persist(&store).unwrap();

    let mut restored =
        TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store).unwrap();
    let next = restored
        .open(&Signal::new("PUT", "Opening Range B", 25254.30, 50.0), |_| Some(60.0))
        .unwrap();
    assert_eq!(next.id, "OPENINGR2-0002");
    cleanup_test_store(&store);
}

#[test]
fn test_restore_rejects_shared_id_prefix() {
    let store = create_test_store("shared_prefix");
    store.save(&Portfolio::new("orb", 100_000.0).unwrap()).unwrap();
    store.save(&Portfolio::new("o.r.b", 100_000.0).unwrap()).unwrap();

    let result = TradingEngine::restore(InstrumentProfile::nifty(), 100_000.0, 0.02, &store);
    assert!(matches!(result, Err(EngineError::Persistence(_))));
    cleanup_test_store(&store);
}
