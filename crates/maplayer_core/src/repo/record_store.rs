//! Record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load all maps and all layers as one consistent snapshot.
//! - Answer key-scoped existence checks against persisted state.
//! - Insert layers inside caller-controlled transactions.
//!
//! # Invariants
//! - Keys are computed from each row's own `name` and `attributes`, so rows
//!   written by any other program take part in checks and in the unique index.
//! - Once [`RecordStore::enforce_key`] ran, the key is unique per map at the
//!   storage level; a colliding insert fails with `StoreError::UniqueViolation`.
//! - A failed `commit` leaves nothing persisted.
//! - Every statement is logged at debug level with its parameters.

use crate::db::DbError;
use crate::model::collection::{Collection, CollectionId};
use crate::model::key::{KeyProjection, UniquenessKey, NAME_FIELD};
use crate::model::record::{Record, RecordDraft, RecordId};
use log::{debug, info, log_enabled, Level};
use rusqlite::types::Value as SqlValue;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

const COLLECTIONS_SELECT_SQL: &str = "SELECT id, name FROM maps ORDER BY name ASC, id ASC;";

const RECORDS_SELECT_SQL: &str = "SELECT
    id,
    map_id,
    name,
    attributes
FROM layers
ORDER BY name ASC, id ASC;";

const INSERT_RECORD_SQL: &str = "INSERT INTO layers (map_id, name, attributes)
VALUES (?1, ?2, ?3)
RETURNING id;";

const INSERT_COLLECTION_SQL: &str = "INSERT INTO maps (name) VALUES (?1) RETURNING id;";

const KEY_FIELDS_SELECT_SQL: &str = "SELECT value FROM store_meta WHERE key = 'key_fields';";

const KEY_FIELDS_UPSERT_SQL: &str = "INSERT INTO store_meta (key, value)
VALUES ('key_fields', ?1)
ON CONFLICT (key) DO UPDATE SET value = excluded.value;";

const KEY_INDEX_EXISTS_SQL: &str = "SELECT EXISTS(
    SELECT 1
    FROM sqlite_master
    WHERE type = 'index' AND name = ?1
);";

/// Unique index over `(map_id, <key expressions>)`.
const KEY_INDEX_NAME: &str = "idx_layers_map_key";

pub type StoreResult<T> = Result<T, StoreError>;

/// Error reported by record store implementations.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite transport, locking or migration failure.
    Db(DbError),
    /// Storage-level uniqueness backstop rejected an insert.
    UniqueViolation {
        collection_id: CollectionId,
        key: String,
    },
    /// Existing layers already repeat the requested key inside one map.
    KeyConflict { fields: String },
    /// Persisted data does not satisfy model invariants.
    InvalidData(String),
    /// Failure reported by a non-SQLite store implementation.
    Backend(String),
}

impl StoreError {
    /// Whether a lock wait exceeded the configured busy timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UniqueViolation { collection_id, key } => write!(
                f,
                "layer with key {key} already exists in map {collection_id}"
            ),
            Self::KeyConflict { fields } => write!(
                f,
                "stored layers repeat key {fields} within a map; remove the duplicates first"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted layer data: {message}"),
            Self::Backend(message) => write!(f, "store backend error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::UniqueViolation { .. }
            | Self::KeyConflict { .. }
            | Self::InvalidData(_)
            | Self::Backend(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store interface consumed by the catalog, duplicate guard and transfer engine.
pub trait RecordStore {
    /// Transaction handle returned by [`RecordStore::begin`].
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Returns every map ordered by name.
    fn query_collections(&self) -> StoreResult<Vec<Collection>>;
    /// Returns every layer in the store. Filtering by map happens in the catalog.
    fn query_records(&self) -> StoreResult<Vec<Record>>;
    /// Returns maps and layers as seen at one point in time.
    fn query_snapshot(&self) -> StoreResult<(Vec<Collection>, Vec<Record>)> {
        Ok((self.query_collections()?, self.query_records()?))
    }
    /// Returns whether a layer with `key` already exists in `collection_id`.
    fn exists_by_key(&self, collection_id: CollectionId, key: &UniquenessKey)
        -> StoreResult<bool>;
    /// Makes the store reject a second layer with the same `projection` key
    /// inside one map, whoever writes it.
    fn enforce_key(&mut self, projection: &KeyProjection) -> StoreResult<()>;
    /// Opens a write transaction.
    fn begin(&mut self) -> StoreResult<Self::Transaction<'_>>;
}

/// Caller-controlled write transaction.
pub trait StoreTransaction {
    /// Inserts `draft` and returns the store-assigned id.
    ///
    /// `key` is the draft's projected key, reported back on a unique violation.
    fn insert_record(&mut self, draft: &RecordDraft, key: &UniquenessKey) -> StoreResult<RecordId>;
    /// Commits. On error nothing from this transaction is persisted.
    fn commit(self) -> StoreResult<()>;
    /// Discards every write made through this transaction.
    fn rollback(self) -> StoreResult<()>;
}

/// SQLite-backed record store owning its connection.
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Borrows the underlying connection for administrative reads.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Key fields the unique index was last built for, if any.
    pub fn enforced_key_fields(&self) -> StoreResult<Option<KeyProjection>> {
        let recorded: Option<String> = self
            .conn
            .query_row(KEY_FIELDS_SELECT_SQL, [], |row| row.get(0))
            .optional()?;
        recorded
            .map(|text| {
                serde_json::from_str(&text).map_err(|err| {
                    StoreError::InvalidData(format!("store_meta.key_fields `{text}`: {err}"))
                })
            })
            .transpose()
    }

    /// Creates a map. Bootstrap helper; not used by the transfer path.
    pub fn create_collection(&self, name: &str) -> StoreResult<CollectionId> {
        log_statement("create_collection", INSERT_COLLECTION_SQL, &format!("[{name:?}]"));
        let id = self
            .conn
            .query_row(INSERT_COLLECTION_SQL, [name], |row| row.get::<_, i64>(0))?;
        Ok(CollectionId(id))
    }

    /// Creates a layer in its own transaction under `projection`'s key.
    /// Bootstrap helper.
    pub fn create_record(
        &mut self,
        draft: RecordDraft,
        projection: &KeyProjection,
    ) -> StoreResult<Record> {
        self.enforce_key(projection)?;
        let key = projection.key_of_draft(&draft);
        let mut tx = self.begin()?;
        let id = match tx.insert_record(&draft, &key) {
            Ok(id) => id,
            Err(err) => {
                tx.rollback()?;
                return Err(err);
            }
        };
        tx.commit()?;
        Ok(Record::from_draft(id, draft))
    }

    /// Runs `read` inside one deferred transaction so every statement sees
    /// the same committed state.
    fn read_snapshot<T>(
        &self,
        read: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = read(&*tx)?;
        tx.commit()?;
        Ok(value)
    }
}

impl RecordStore for SqliteRecordStore {
    type Transaction<'a> = SqliteStoreTransaction<'a>;

    fn query_collections(&self) -> StoreResult<Vec<Collection>> {
        read_collections(&self.conn)
    }

    fn query_records(&self) -> StoreResult<Vec<Record>> {
        read_records(&self.conn)
    }

    fn query_snapshot(&self) -> StoreResult<(Vec<Collection>, Vec<Record>)> {
        self.read_snapshot(|conn| Ok((read_collections(conn)?, read_records(conn)?)))
    }

    fn exists_by_key(
        &self,
        collection_id: CollectionId,
        key: &UniquenessKey,
    ) -> StoreResult<bool> {
        let mut sql = String::from("SELECT EXISTS(SELECT 1 FROM layers WHERE map_id = ?1");
        let mut values = vec![SqlValue::Integer(collection_id.0)];
        for (field, value) in key.parts() {
            let position = values.len() + 1;
            if field == NAME_FIELD {
                sql.push_str(&format!(" AND name = ?{position}"));
                let name = value
                    .as_str()
                    .map_or_else(|| value.to_string(), str::to_string);
                values.push(SqlValue::Text(name));
            } else {
                let expression = key_expression(field)?;
                sql.push_str(&format!(" AND {expression} = json(?{position})"));
                values.push(SqlValue::Text(value.to_string()));
            }
        }
        sql.push_str(");");

        log_statement("exists_by_key", &sql, &format!("{values:?}"));
        let exists: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(exists == 1)
    }

    fn enforce_key(&mut self, projection: &KeyProjection) -> StoreResult<()> {
        let wanted = Value::from(projection.fields().to_vec()).to_string();
        let columns = projection
            .fields()
            .iter()
            .map(|field| key_expression(field))
            .collect::<StoreResult<Vec<_>>>()?
            .join(", ");

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let recorded: Option<String> = tx
            .query_row(KEY_FIELDS_SELECT_SQL, [], |row| row.get(0))
            .optional()?;
        let index_present: i64 =
            tx.query_row(KEY_INDEX_EXISTS_SQL, [KEY_INDEX_NAME], |row| row.get(0))?;
        if index_present == 1 && recorded.as_deref() == Some(wanted.as_str()) {
            return Ok(());
        }

        let rebuild = format!(
            "DROP INDEX IF EXISTS {KEY_INDEX_NAME};
CREATE UNIQUE INDEX {KEY_INDEX_NAME} ON layers (map_id, {columns});"
        );
        log_statement("enforce_key", &rebuild, "[]");
        if let Err(err) = tx.execute_batch(&rebuild) {
            if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                return Err(StoreError::KeyConflict { fields: wanted });
            }
            return Err(err.into());
        }
        log_statement("enforce_key", KEY_FIELDS_UPSERT_SQL, &format!("[{wanted:?}]"));
        tx.execute(KEY_FIELDS_UPSERT_SQL, [wanted.as_str()])?;
        tx.commit()?;

        info!(
            "event=key_index_rebuilt module=repo status=ok previous={} current={wanted}",
            recorded.as_deref().unwrap_or("none")
        );
        Ok(())
    }

    fn begin(&mut self) -> StoreResult<SqliteStoreTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteStoreTransaction { tx })
    }
}

/// `BEGIN IMMEDIATE` transaction over a [`SqliteRecordStore`].
///
/// Dropping it without `commit` rolls back.
pub struct SqliteStoreTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTransaction for SqliteStoreTransaction<'_> {
    fn insert_record(&mut self, draft: &RecordDraft, key: &UniquenessKey) -> StoreResult<RecordId> {
        let attributes = Value::Object(draft.attributes.clone()).to_string();
        log_statement(
            "insert_record",
            INSERT_RECORD_SQL,
            &format!(
                "[{}, {:?}, {attributes}]",
                draft.collection_id, draft.name
            ),
        );

        let inserted = self.tx.query_row(
            INSERT_RECORD_SQL,
            params![draft.collection_id.0, draft.name.as_str(), attributes],
            |row| row.get::<_, i64>(0),
        );

        match inserted {
            Ok(id) => Ok(RecordId(id)),
            Err(err) if is_unique_violation(&err) => Err(StoreError::UniqueViolation {
                collection_id: draft.collection_id,
                key: key.encode(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> StoreResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn read_collections(conn: &Connection) -> StoreResult<Vec<Collection>> {
    log_statement("query_collections", COLLECTIONS_SELECT_SQL, "[]");
    let mut stmt = conn.prepare(COLLECTIONS_SELECT_SQL)?;
    let mut rows = stmt.query([])?;
    let mut collections = Vec::new();
    while let Some(row) = rows.next()? {
        collections.push(Collection::new(
            CollectionId(row.get("id")?),
            row.get::<_, String>("name")?,
        ));
    }
    Ok(collections)
}

fn read_records(conn: &Connection) -> StoreResult<Vec<Record>> {
    log_statement("query_records", RECORDS_SELECT_SQL, "[]");
    let mut stmt = conn.prepare(RECORDS_SELECT_SQL)?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(row)?);
    }
    Ok(records)
}

/// SQL expression yielding one key field of a `layers` row.
///
/// Attributes render as JSON text; a missing attribute reads as `null`, the
/// same as an explicit JSON null.
fn key_expression(field: &str) -> StoreResult<String> {
    if field == NAME_FIELD {
        return Ok("name".to_string());
    }
    if field.is_empty() || field.contains('"') {
        return Err(StoreError::InvalidData(format!(
            "key field `{field}` cannot be addressed as a JSON path"
        )));
    }
    Ok(format!(
        "ifnull(attributes -> '$.\"{}\"', 'null')",
        field.replace('\'', "''")
    ))
}

fn parse_record_row(row: &Row<'_>) -> StoreResult<Record> {
    let id: i64 = row.get("id")?;
    let attributes_text: String = row.get("attributes")?;
    let attributes = match serde_json::from_str::<Value>(&attributes_text) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(StoreError::InvalidData(format!(
                "layers.attributes of layer {id} is not a JSON object"
            )));
        }
    };

    Ok(Record {
        id: RecordId(id),
        collection_id: CollectionId(row.get("map_id")?),
        name: row.get("name")?,
        attributes,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn log_statement(op: &str, sql: &str, params: &str) {
    if !log_enabled!(Level::Debug) {
        return;
    }
    debug!(
        "event=store_query module=repo op={op} sql={:?} params={params}",
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    );
}
