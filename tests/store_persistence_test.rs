// Integration tests for the durable application store: atomic saves,
// validated loads, corruption quarantine, and restart round-trips.

use botvault::store::{AuxKind, DataStore, LoadOutcome, Profile, StoreError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;

const DATA_FILE: &str = "data.json";

fn sample_profile(name: &str, level: u32) -> Profile {
    Profile {
        name: name.to_string(),
        bio: format!("{} was here", name),
        level,
        xp: level as u64 * 100,
        coins: 50,
        inventory: vec!["rod".to_string()],
        registered_at: 1700000000000,
    }
}

fn dir_names(path: &Path) -> Vec<String> {
    std::fs::read_dir(path)
        .unwrap()
        .filter_map(|entry| entry.unwrap().file_name().into_string().ok())
        .collect()
}

#[tokio::test]
async fn test_save_then_load_round_trips_three_profiles() {
    let dir = tempdir().unwrap();

    let store = DataStore::new(dir.path());
    store.set_profile("1001", sample_profile("ana", 2));
    store.set_profile("1002", sample_profile("ben", 5));
    store.set_profile("1003", sample_profile("cal", 9));
    store.set_aux(AuxKind::Bank, "1001", json!({"balance": 900}));
    store.push_lottery(json!({"ticket": 7}));
    store.save_all(DATA_FILE).await.unwrap();

    // Simulated restart: a fresh store over the same directory.
    let reborn = DataStore::new(dir.path());
    let outcome = reborn.load_all(DATA_FILE).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            profiles: 3,
            skipped: 0
        }
    );

    assert_eq!(reborn.profile("1001"), Some(sample_profile("ana", 2)));
    assert_eq!(reborn.profile("1002"), Some(sample_profile("ben", 5)));
    assert_eq!(reborn.profile("1003"), Some(sample_profile("cal", 9)));
    assert_eq!(
        reborn.aux(AuxKind::Bank, "1001"),
        Some(json!({"balance": 900}))
    );
    assert_eq!(reborn.lottery(), vec![json!({"ticket": 7})]);
}

#[tokio::test]
async fn test_save_writes_meta_block() {
    let dir = tempdir().unwrap();
    let store = DataStore::new(dir.path());
    store.set_profile("1001", sample_profile("ana", 2));

    let report = store.save_all(DATA_FILE).await.unwrap();
    assert_eq!(report.profile_count, 1);
    assert_eq!(report.invalid_profile_count, 0);

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(DATA_FILE)).unwrap())
            .unwrap();
    assert_eq!(written["_meta"]["version"], 1);
    assert_eq!(written["_meta"]["profileCount"], 1);
    assert_eq!(written["_meta"]["invalidProfileCount"], 0);
    // savedAt must be a parsable ISO-8601 stamp.
    let saved_at = written["_meta"]["savedAt"].as_str().unwrap();
    chrono::DateTime::parse_from_rfc3339(saved_at).unwrap();
}

#[tokio::test]
async fn test_second_save_keeps_bak_of_previous_snapshot() {
    let dir = tempdir().unwrap();
    let store = DataStore::new(dir.path());

    store.set_profile("1001", sample_profile("ana", 2));
    store.save_all(DATA_FILE).await.unwrap();

    store.set_profile("1002", sample_profile("ben", 5));
    store.save_all(DATA_FILE).await.unwrap();

    let bak: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("data.json.bak")).unwrap())
            .unwrap();
    let current: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(DATA_FILE)).unwrap())
            .unwrap();

    // The .bak is the state before the latest flush.
    assert_eq!(bak["_meta"]["profileCount"], 1);
    assert_eq!(current["_meta"]["profileCount"], 2);
}

#[tokio::test]
async fn test_save_sweeps_stray_temp_files() {
    let dir = tempdir().unwrap();
    let store = DataStore::new(dir.path());
    store.set_profile("1001", sample_profile("ana", 2));

    // A temp file left behind by an interrupted earlier run.
    let stray = dir.path().join(format!(".{}.orphaned.tmp", DATA_FILE));
    std::fs::write(&stray, "half-written").unwrap();

    store.save_all(DATA_FILE).await.unwrap();

    let names = dir_names(dir.path());
    assert!(names.iter().any(|n| n == DATA_FILE));
    assert!(
        !names.iter().any(|n| n.ends_with(".tmp")),
        "no temp files may survive a successful save: {:?}",
        names
    );
}

#[tokio::test]
async fn test_save_fails_fast_when_directory_is_blocked() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "in the way").unwrap();

    let store = DataStore::new(blocker.join("nested"));
    store.set_profile("1001", sample_profile("ana", 2));

    let result = store.save_all(DATA_FILE).await;
    assert!(matches!(
        result,
        Err(StoreError::DirectoryUnavailable { .. })
    ));
}

#[tokio::test]
async fn test_missing_file_is_not_an_error() {
    let dir = tempdir().unwrap();
    let store = DataStore::new(dir.path());

    let outcome = store.load_all(DATA_FILE).await.unwrap();
    assert_eq!(outcome, LoadOutcome::Missing);
    assert_eq!(store.profile_count(), 0);
}

#[tokio::test]
async fn test_corrupted_file_is_quarantined_and_state_kept() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join(DATA_FILE), "{ this is not json").unwrap();

    let store = DataStore::new(dir.path());
    store.set_profile("1001", sample_profile("ana", 2));

    let result = store.load_all(DATA_FILE).await;
    let Err(StoreError::Corrupted { quarantine, .. }) = result else {
        panic!("expected a corruption error, got {:?}", result);
    };

    // The unparsable content is preserved for inspection.
    assert!(quarantine.exists());
    assert_eq!(
        std::fs::read_to_string(&quarantine).unwrap(),
        "{ this is not json"
    );
    assert!(quarantine
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains(".corrupted."));

    // Live state was never touched.
    assert_eq!(store.profile("1001"), Some(sample_profile("ana", 2)));
}

#[tokio::test]
async fn test_bad_root_shape_rolls_back_live_state() {
    let dir = tempdir().unwrap();
    // Valid JSON, but not an object: repopulation fails after the clear.
    std::fs::write(dir.path().join(DATA_FILE), "[1, 2, 3]").unwrap();

    let store = DataStore::new(dir.path());
    store.set_profile("1001", sample_profile("ana", 2));
    store.set_aux(AuxKind::Pets, "1001", json!({"pet": "cat"}));

    let result = store.load_all(DATA_FILE).await;
    assert!(matches!(result, Err(StoreError::ValidationFailed(_))));

    // The snapshot taken before the clear was restored.
    assert_eq!(store.profile("1001"), Some(sample_profile("ana", 2)));
    assert_eq!(store.aux(AuxKind::Pets, "1001"), Some(json!({"pet": "cat"})));
}

#[tokio::test]
async fn test_invalid_records_are_skipped_and_counted() {
    let dir = tempdir().unwrap();
    let file = json!({
        "profiles": {
            "77001@c.us": {"name": "mia", "level": 3},
            "broken-number": 42,
            "broken-string": "not a record",
        },
    });
    std::fs::write(
        dir.path().join(DATA_FILE),
        serde_json::to_string(&file).unwrap(),
    )
    .unwrap();

    let store = DataStore::new(dir.path());
    let outcome = store.load_all(DATA_FILE).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            profiles: 1,
            skipped: 2
        }
    );

    // Both the legacy key and the canonical key resolve.
    assert!(store.profile("77001@c.us").is_some());
    assert!(store.profile("77001@s.whatsapp.net").is_some());

    // The skip count is carried into the next save's meta block.
    store.save_all(DATA_FILE).await.unwrap();
    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(DATA_FILE)).unwrap())
            .unwrap();
    assert_eq!(written["_meta"]["invalidProfileCount"], 2);
}

#[tokio::test]
async fn test_malformed_fields_get_defaults_on_load() {
    let dir = tempdir().unwrap();
    let file = json!({
        "profiles": {
            "1001": {"name": 42, "level": "high", "coins": 77},
        },
    });
    std::fs::write(
        dir.path().join(DATA_FILE),
        serde_json::to_string(&file).unwrap(),
    )
    .unwrap();

    let store = DataStore::new(dir.path());
    store.load_all(DATA_FILE).await.unwrap();

    let profile = store.profile("1001").unwrap();
    assert_eq!(profile.name, "");
    assert_eq!(profile.level, 1);
    assert_eq!(profile.coins, 77);
}

#[tokio::test]
async fn test_reload_replaces_previous_state() {
    let dir = tempdir().unwrap();
    let store = DataStore::new(dir.path());

    store.set_profile("old", sample_profile("old", 1));
    store.save_all(DATA_FILE).await.unwrap();

    store.set_profile("transient", sample_profile("transient", 1));
    assert_eq!(store.profile_count(), 2);

    // Reloading the saved snapshot drops the unsaved record.
    store.load_all(DATA_FILE).await.unwrap();
    assert_eq!(store.profile_count(), 1);
    assert!(store.profile("old").is_some());
    assert!(store.profile("transient").is_none());
}
