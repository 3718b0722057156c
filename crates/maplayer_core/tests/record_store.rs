use maplayer_core::db::open_db_in_memory;
use maplayer_core::{
    CollectionId, KeyProjection, RecordDraft, RecordStore, SqliteRecordStore, StoreError,
    StoreTransaction,
};
use serde_json::json;

fn store() -> SqliteRecordStore {
    SqliteRecordStore::new(open_db_in_memory().unwrap())
}

fn layer_count(store: &SqliteRecordStore, map: CollectionId) -> i64 {
    store
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM layers WHERE map_id = ?1;",
            [map.0],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn collections_are_listed_by_name() {
    let store = store();
    let south = store.create_collection("South").unwrap();
    let north = store.create_collection("North").unwrap();

    let collections = store.query_collections().unwrap();
    let listed: Vec<_> = collections
        .iter()
        .map(|collection| (collection.id, collection.display_name.as_str()))
        .collect();
    assert_eq!(listed, vec![(north, "North"), (south, "South")]);
}

#[test]
fn created_record_round_trips_with_attribute_order() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let draft = RecordDraft::new(north, "Roads")
        .with_attribute("url", "http://tiles/{z}/{x}/{y}")
        .with_attribute("type", "xyz")
        .with_attribute("opacity", 0.5);

    let created = store
        .create_record(draft, &KeyProjection::default())
        .unwrap();
    let records = store.query_records().unwrap();

    assert_eq!(records, vec![created.clone()]);
    let fields: Vec<_> = records[0].attributes.keys().map(String::as_str).collect();
    assert_eq!(fields, vec!["url", "type", "opacity"]);
    assert_eq!(records[0].attributes["opacity"], json!(0.5));
}

#[test]
fn exists_by_key_is_scoped_to_one_map() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let south = store.create_collection("South").unwrap();
    let projection = KeyProjection::default();
    let draft = RecordDraft::new(north, "Roads").with_attribute("type", "xyz");
    let key = projection.key_of_draft(&draft);
    store.create_record(draft, &projection).unwrap();

    assert!(store.exists_by_key(north, &key).unwrap());
    assert!(!store.exists_by_key(south, &key).unwrap());

    let other_type = projection
        .key_of_draft(&RecordDraft::new(north, "Roads").with_attribute("type", "wms"));
    assert!(!store.exists_by_key(north, &other_type).unwrap());
}

#[test]
fn insert_with_taken_key_reports_unique_violation() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let projection = KeyProjection::default();
    let draft = RecordDraft::new(north, "Roads").with_attribute("type", "xyz");
    store.create_record(draft.clone(), &projection).unwrap();

    let err = store.create_record(draft, &projection).unwrap_err();
    match err {
        StoreError::UniqueViolation { collection_id, key } => {
            assert_eq!(collection_id, north);
            assert_eq!(key, r#"["Roads","xyz"]"#);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(layer_count(&store, north), 1);
}

#[test]
fn rollback_and_drop_discard_inserted_rows() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let projection = KeyProjection::default();

    let first = RecordDraft::new(north, "Roads");
    let mut tx = store.begin().unwrap();
    tx.insert_record(&first, &projection.key_of_draft(&first))
        .unwrap();
    tx.rollback().unwrap();

    let second = RecordDraft::new(north, "Rivers");
    {
        let mut tx = store.begin().unwrap();
        tx.insert_record(&second, &projection.key_of_draft(&second))
            .unwrap();
    }

    assert_eq!(layer_count(&store, north), 0);
}

#[test]
fn committed_ids_increase_monotonically() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let projection = KeyProjection::default();

    let first = store
        .create_record(RecordDraft::new(north, "Roads"), &projection)
        .unwrap();
    let second = store
        .create_record(RecordDraft::new(north, "Rivers"), &projection)
        .unwrap();

    assert!(second.id > first.id);
}

#[test]
fn non_object_attributes_are_rejected_as_invalid_data() {
    let store = store();
    let north = store.create_collection("North").unwrap();
    store
        .connection()
        .execute(
            "INSERT INTO layers (map_id, name, attributes) VALUES (?1, 'Broken', '[1, 2]');",
            [north.0],
        )
        .unwrap();

    let err = store.query_records().unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)), "got {err}");
}

#[test]
fn exists_by_key_sees_rows_written_by_other_programs() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    store
        .connection()
        .execute_batch(
            r#"INSERT INTO layers (map_id, name, attributes) VALUES (1, 'Roads', '{"type":"xyz"}');
               INSERT INTO layers (map_id, name) VALUES (1, 'Rivers');"#,
        )
        .unwrap();
    let projection = KeyProjection::default();
    store.enforce_key(&projection).unwrap();

    let roads =
        projection.key_of_draft(&RecordDraft::new(north, "Roads").with_attribute("type", "xyz"));
    assert!(store.exists_by_key(north, &roads).unwrap());
    let rivers = projection.key_of_draft(&RecordDraft::new(north, "Rivers"));
    assert!(store.exists_by_key(north, &rivers).unwrap());
    let rivers_typed =
        projection.key_of_draft(&RecordDraft::new(north, "Rivers").with_attribute("type", "wms"));
    assert!(!store.exists_by_key(north, &rivers_typed).unwrap());
}

#[test]
fn key_index_covers_rows_written_by_other_programs() {
    let mut store = store();
    store.create_collection("North").unwrap();
    store.create_collection("South").unwrap();
    store.enforce_key(&KeyProjection::default()).unwrap();

    let conn = store.connection();
    conn.execute_batch(
        r#"INSERT INTO layers (map_id, name, attributes) VALUES (1, 'Roads', '{"type":"xyz"}');
           INSERT INTO layers (map_id, name, attributes) VALUES (1, 'Rivers', '{"type":"xyz"}');
           INSERT INTO layers (map_id, name, attributes) VALUES (2, 'Roads', '{"type":"xyz"}');"#,
    )
    .unwrap();

    let err = conn
        .execute(
            r#"INSERT INTO layers (map_id, name, attributes) VALUES (1, 'Roads', '{"opacity":1,"type":"xyz"}');"#,
            [],
        )
        .unwrap_err();
    assert_eq!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    );
}

#[test]
fn enforce_key_rebuilds_the_index_when_key_fields_change() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let name_type = KeyProjection::default();
    store
        .create_record(
            RecordDraft::new(north, "Roads")
                .with_attribute("type", "xyz")
                .with_attribute("url", "http://a"),
            &name_type,
        )
        .unwrap();
    assert_eq!(store.enforced_key_fields().unwrap(), Some(name_type.clone()));

    let with_url = KeyProjection::new(["name", "type", "url"]);
    store.enforce_key(&with_url).unwrap();
    assert_eq!(store.enforced_key_fields().unwrap(), Some(with_url.clone()));

    let same = with_url.key_of_draft(
        &RecordDraft::new(north, "Roads")
            .with_attribute("type", "xyz")
            .with_attribute("url", "http://a"),
    );
    assert!(store.exists_by_key(north, &same).unwrap());

    let other_url = RecordDraft::new(north, "Roads")
        .with_attribute("type", "xyz")
        .with_attribute("url", "http://b");
    store.create_record(other_url, &with_url).unwrap();
    assert_eq!(layer_count(&store, north), 2);
}

#[test]
fn enforce_key_refuses_a_key_that_stored_layers_already_repeat() {
    let mut store = store();
    let north = store.create_collection("North").unwrap();
    let name_type = KeyProjection::default();
    for kind in ["xyz", "wms"] {
        store
            .create_record(
                RecordDraft::new(north, "Roads").with_attribute("type", kind),
                &name_type,
            )
            .unwrap();
    }

    let err = store.enforce_key(&KeyProjection::new(["name"])).unwrap_err();
    match err {
        StoreError::KeyConflict { fields } => assert_eq!(fields, r#"["name"]"#),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.enforced_key_fields().unwrap(), Some(name_type.clone()));

    let repeat = RecordDraft::new(north, "Roads").with_attribute("type", "xyz");
    let err = store.create_record(repeat, &name_type).unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }), "got {err}");
}
