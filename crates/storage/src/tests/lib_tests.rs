use super::*;
use shared::domain::{Gender, Horse, HorseId, HorseNumber, UserProfile};

fn sample_record(timestamp: i64) -> CachedSnapshotRecord {
    CachedSnapshotRecord {
        user_data: UserProfile {
            username: Some("Anna".into()),
            gender: Gender::Female,
            chibik_name: "Bob".into(),
        },
        horses: vec![Horse {
            id: HorseId(1),
            number: Some(HorseNumber::Number(3)),
            name: "Star".into(),
            photo: None,
            feed_level: 40,
            water_level: 60,
            flower_level: 10,
            last_updated: None,
        }],
        timestamp,
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn missing_entry_loads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let loaded = storage
        .load_snapshot_record("horseCareState")
        .await
        .expect("load");
    assert!(loaded.is_none());
}

#[tokio::test]
async fn saved_record_is_overwritten_not_merged() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot_record("horseCareState", &sample_record(1_000))
        .await
        .expect("first save");

    let mut replacement = sample_record(2_000);
    replacement.horses.clear();
    storage
        .save_snapshot_record("horseCareState", &replacement)
        .await
        .expect("second save");

    let loaded = storage
        .load_snapshot_record("horseCareState")
        .await
        .expect("load")
        .expect("entry");
    assert_eq!(loaded, replacement);
}

#[tokio::test]
async fn clear_reports_whether_entry_existed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_snapshot_record("horseCareState", &sample_record(1_000))
        .await
        .expect("save");
    assert!(storage
        .clear_snapshot_record("horseCareState")
        .await
        .expect("clear"));
    assert!(!storage
        .clear_snapshot_record("horseCareState")
        .await
        .expect("clear again"));
}

#[tokio::test]
async fn corrupt_entry_surfaces_an_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query(
        "INSERT INTO snapshot_cache (cache_key, payload_json, saved_at_ms) VALUES (?, ?, ?)",
    )
    .bind("horseCareState")
    .bind("{\"userData\":")
    .bind(1_i64)
    .execute(storage.pool())
    .await
    .expect("raw insert");

    let err = storage
        .load_snapshot_record("horseCareState")
        .await
        .expect_err("corrupt row must fail");
    assert!(err.to_string().contains("corrupt"), "unexpected error: {err}");
}

#[test]
fn in_memory_urls_have_no_file_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert!(sqlite_path("sqlite://file:cache?mode=memory").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/cache.db?mode=rwc"),
        Some(PathBuf::from("./data/cache.db"))
    );
}
