//! Schema migrations for the map/layer store.
//!
//! Each step is a SQL file applied once, in version order, inside a single
//! transaction together with every other pending step. The applied version is
//! kept in `PRAGMA user_version`; a database stamped with a version this
//! binary does not know is refused rather than opened read-write.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction};

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "maps_layers",
        sql: include_str!("0001_maps_layers.sql"),
    },
    Step {
        version: 2,
        name: "store_meta",
        sql: include_str!("0002_store_meta.sql"),
    },
];

/// Highest schema version this binary can open.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// A failing step aborts the whole batch, so the database stays at the
/// version it had before the call.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Step> = STEPS.iter().filter(|step| step.version > found).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        run_step(&tx, step)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={found} to_version={latest} steps={}",
        pending.len()
    );
    Ok(())
}

fn run_step(tx: &Transaction<'_>, step: &Step) -> DbResult<()> {
    tx.execute_batch(step.sql)
        .and_then(|()| tx.pragma_update(None, "user_version", step.version))
        .map_err(|source| DbError::Migration {
            version: step.version,
            name: step.name,
            source,
        })
}
