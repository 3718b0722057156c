use maplayer_core::{load_config, LayerError, Session, Side, SqliteRecordStore};
use std::fs;
use std::time::Duration;

#[test]
fn configured_session_opens_store_and_copies_layer() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("maps.sqlite3");
    let config_path = dir.path().join("maplayer.toml");
    fs::write(
        &config_path,
        format!(
            "[store]\npath = {:?}\nbusy_timeout_ms = 500\n\n[profile]\npreset = \"basic\"\n",
            db_path.display().to_string()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.store.busy_timeout(), Duration::from_millis(500));
    let store_path = config.store.path.clone().unwrap();

    {
        let store = SqliteRecordStore::new(maplayer_core::db::open_db(&store_path).unwrap());
        let north = store.create_collection("North").unwrap();
        store.create_collection("South").unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO layers (map_id, name, attributes)
                 VALUES (?1, 'Roads', '{\"type\":\"xyz\"}');",
                [north.0],
            )
            .unwrap();
    }

    let mut session = Session::new(config.schema_profile().unwrap());
    session
        .connect_sqlite(&store_path, config.store.busy_timeout())
        .unwrap();
    let maps: Vec<_> = session
        .collections()
        .unwrap()
        .iter()
        .map(|collection| collection.id)
        .collect();
    session.select_collection(Side::Left, maps[0]).unwrap();
    session.select_collection(Side::Right, maps[1]).unwrap();
    session.select_record(Side::Left, 0).unwrap();
    let transferred = session.transfer(Side::Left, Side::Right).unwrap();

    let reopened_store = SqliteRecordStore::new(maplayer_core::db::open_db(&store_path).unwrap());
    let mut reopened = Session::new(config.schema_profile().unwrap());
    reopened.connect(reopened_store).unwrap();
    let copy = reopened.catalog().unwrap().get(transferred.new_id).cloned();
    assert_eq!(copy, Some(transferred.record));
}

#[test]
fn connect_to_unopenable_path_reports_store_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let missing_parent = dir.path().join("missing").join("maps.sqlite3");

    let mut session: Session<SqliteRecordStore> = Session::new(Default::default());
    let err = session
        .connect_sqlite(&missing_parent, Duration::from_millis(100))
        .unwrap_err();

    assert!(matches!(err, LayerError::StoreUnavailable(_)), "got {err}");
    assert!(!session.is_connected());
}

#[test]
fn catalog_operations_require_connection() {
    let mut session: Session<SqliteRecordStore> = Session::new(Default::default());
    let err = session
        .select_collection(Side::Left, maplayer_core::CollectionId(1))
        .unwrap_err();
    assert!(matches!(err, LayerError::NotConnected), "got {err}");
    assert!(matches!(session.view(Side::Left), Err(LayerError::NotConnected)));
}

#[test]
fn locked_database_fails_connect_after_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("maps.sqlite3");
    let holder = maplayer_core::db::open_db(&path).unwrap();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let mut session: Session<SqliteRecordStore> = Session::new(Default::default());
    let err = session
        .connect_sqlite(&path, Duration::from_millis(50))
        .unwrap_err();

    match err {
        LayerError::StoreUnavailable(store_err) => assert!(store_err.is_timeout(), "{store_err}"),
        other => panic!("unexpected error: {other}"),
    }
    holder.execute_batch("ROLLBACK;").unwrap();
}
