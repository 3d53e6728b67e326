use super::*;

fn tutor(id: i64, name: &str) -> Tutor {
    Tutor {
        id: TutorId(id),
        name: name.to_string(),
        subject: "Math".to_string(),
        cost: 50.0,
        avatar: None,
        bio: None,
        whatsapp: Some("5511999990000".to_string()),
        schedule: Vec::new(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("temp root");
    let db_path = temp_root.path().join("nested").join("tutors.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn missing_entry_reads_as_none() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let value = storage.read_entry(FAVORITES_KEY).await.expect("read");
    assert_eq!(value, None);
}

#[tokio::test]
async fn stores_and_overwrites_entries() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    storage.write_entry("greeting", "hello").await.expect("write");
    assert_eq!(
        storage.read_entry("greeting").await.expect("read"),
        Some("hello".to_string())
    );

    storage.write_entry("greeting", "olá").await.expect("overwrite");
    assert_eq!(
        storage.read_entry("greeting").await.expect("read"),
        Some("olá".to_string())
    );

    let updated_at = storage
        .entry_updated_at("greeting")
        .await
        .expect("updated_at")
        .expect("entry exists");
    assert!(updated_at <= Utc::now());
}

#[tokio::test]
async fn remove_entry_reports_whether_key_existed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.write_entry("greeting", "hello").await.expect("write");

    assert!(storage.remove_entry("greeting").await.expect("remove"));
    assert!(!storage.remove_entry("greeting").await.expect("remove again"));
    assert_eq!(storage.read_entry("greeting").await.expect("read"), None);
}

#[tokio::test]
async fn replace_favorites_round_trips_full_records() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let favorites = vec![tutor(1, "Ana"), tutor(5, "Bruno")];

    storage.replace_favorites(&favorites).await.expect("replace");

    let listed = storage.list_favorites().await.expect("list");
    assert_eq!(listed, favorites);

    let raw = storage
        .load_favorites_json()
        .await
        .expect("raw")
        .expect("entry exists");
    assert!(raw.starts_with('['), "favorites entry is a JSON array: {raw}");
}

#[tokio::test]
async fn add_favorite_is_idempotent_per_tutor() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    assert!(storage.add_favorite(&tutor(1, "Ana")).await.expect("first add"));
    assert!(!storage.add_favorite(&tutor(1, "Ana")).await.expect("second add"));

    let listed = storage.list_favorites().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, TutorId(1));
}

#[tokio::test]
async fn remove_favorite_deletes_only_the_matching_record() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .replace_favorites(&[tutor(1, "Ana"), tutor(5, "Bruno")])
        .await
        .expect("seed");

    assert!(storage.remove_favorite(TutorId(1)).await.expect("remove"));
    assert!(!storage.remove_favorite(TutorId(1)).await.expect("remove again"));
    assert!(!storage.remove_favorite(TutorId(99)).await.expect("remove unknown"));

    let listed = storage.list_favorites().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, TutorId(5));
}

#[tokio::test]
async fn list_favorites_rejects_malformed_entry() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .write_entry(FAVORITES_KEY, "{not-json")
        .await
        .expect("write");

    let err = storage.list_favorites().await.expect_err("must fail");
    assert!(
        err.to_string().contains("malformed favorites entry"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn list_favorites_is_empty_when_entry_is_absent() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let listed = storage.list_favorites().await.expect("list");
    assert!(listed.is_empty());
}
