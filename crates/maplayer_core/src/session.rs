//! Process-scoped session: store connection, catalog mirror and selections.
//!
//! # Responsibility
//! - Own the connect/disconnect lifecycle of one record store.
//! - Hold the two per-side selection trackers.
//! - Expose the operations UI collaborators drive.
//!
//! # Invariants
//! - A failed `connect` leaves every piece of prior state untouched.
//! - A successful `connect` replaces the catalog and clears both sides.
//! - Without a connection, every catalog-dependent call reports
//!   `NotConnected`.

use crate::catalog::{Catalog, CollectionView};
use crate::config::profile::SchemaProfile;
use crate::db::open_db_with_timeout;
use crate::error::{LayerError, LayerResult};
use crate::model::collection::{Collection, CollectionId};
use crate::model::record::{Record, RecordId};
use crate::repo::record_store::{RecordStore, SqliteRecordStore, StoreError};
use crate::selection::{SelectionTracker, Side};
use crate::service::transfer_service::{TransferEngine, TransferResult};
use log::{error, info};
use std::path::Path;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Connected<S> {
    session_id: Uuid,
    store: S,
    catalog: Catalog,
}

pub struct Session<S: RecordStore> {
    profile: SchemaProfile,
    connected: Option<Connected<S>>,
    left: SelectionTracker,
    right: SelectionTracker,
}

/// Disjoint mutable borrows of a connected session, used by the engine.
pub(crate) struct SessionParts<'a, S> {
    pub session_id: Uuid,
    pub profile: &'a SchemaProfile,
    pub store: &'a mut S,
    pub catalog: &'a mut Catalog,
    pub left: &'a mut SelectionTracker,
    pub right: &'a mut SelectionTracker,
}

impl<S> SessionParts<'_, S> {
    pub fn tracker(&self, side: Side) -> &SelectionTracker {
        match side {
            Side::Left => &*self.left,
            Side::Right => &*self.right,
        }
    }
}

impl<S: RecordStore> Session<S> {
    pub fn new(profile: SchemaProfile) -> Self {
        Self {
            profile,
            connected: None,
            left: SelectionTracker::new(Side::Left),
            right: SelectionTracker::new(Side::Right),
        }
    }

    pub fn profile(&self) -> &SchemaProfile {
        &self.profile
    }

    /// Has `store` enforce the profile's key, loads the catalog from it and
    /// makes it the live connection.
    ///
    /// Returns the new session id. On failure `store` is dropped and the
    /// session keeps whatever state it had before.
    pub fn connect(&mut self, mut store: S) -> LayerResult<Uuid> {
        let started_at = Instant::now();
        info!("event=session_connect module=session status=start");

        if let Err(err) = store.enforce_key(&self.profile.key_fields) {
            let err = LayerError::StoreUnavailable(err);
            error!(
                "event=session_connect module=session status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            return Err(err);
        }

        let catalog = match Catalog::load(&store, &self.profile) {
            Ok(catalog) => catalog,
            Err(err) => {
                error!(
                    "event=session_connect module=session status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                return Err(err);
            }
        };

        let session_id = Uuid::new_v4();
        info!(
            "event=session_connect module=session status=ok session_id={session_id} duration_ms={} maps={} layers={}",
            started_at.elapsed().as_millis(),
            catalog.collections().len(),
            catalog.record_count()
        );
        self.connected = Some(Connected {
            session_id,
            store,
            catalog,
        });
        self.left.reset();
        self.right.reset();
        Ok(session_id)
    }

    /// Drops the connection, the catalog and both selections.
    ///
    /// Returns the store so callers can reuse or close it explicitly.
    pub fn disconnect(&mut self) -> Option<S> {
        self.left.reset();
        self.right.reset();
        let connected = self.connected.take()?;
        info!(
            "event=session_disconnect module=session status=ok session_id={}",
            connected.session_id
        );
        Some(connected.store)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.connected.as_ref().map(|connected| connected.session_id)
    }

    pub fn catalog(&self) -> LayerResult<&Catalog> {
        self.connected
            .as_ref()
            .map(|connected| &connected.catalog)
            .ok_or(LayerError::NotConnected)
    }

    pub fn store(&self) -> LayerResult<&S> {
        self.connected
            .as_ref()
            .map(|connected| &connected.store)
            .ok_or(LayerError::NotConnected)
    }

    pub fn collections(&self) -> LayerResult<&[Collection]> {
        Ok(self.catalog()?.collections())
    }

    pub fn tracker(&self, side: Side) -> &SelectionTracker {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn select_collection(&mut self, side: Side, id: CollectionId) -> LayerResult<()> {
        let catalog = &self
            .connected
            .as_ref()
            .ok_or(LayerError::NotConnected)?
            .catalog;
        let tracker = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        tracker.select_collection(catalog, id)
    }

    pub fn select_record(&mut self, side: Side, visible_index: usize) -> LayerResult<RecordId> {
        let catalog = &self
            .connected
            .as_ref()
            .ok_or(LayerError::NotConnected)?
            .catalog;
        let tracker = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        tracker.select_record(catalog, visible_index)
    }

    /// Currently selected layer on `side`, re-resolved against the catalog.
    pub fn selected(&self, side: Side) -> Option<&Record> {
        let catalog = self.catalog().ok()?;
        self.tracker(side).selected(catalog)
    }

    /// Visible view of the map active on `side`.
    pub fn view(&self, side: Side) -> LayerResult<Option<CollectionView>> {
        let catalog = self.catalog()?;
        Ok(self
            .tracker(side)
            .active_collection()
            .and_then(|id| catalog.view(id, &self.profile)))
    }

    pub fn view_of(&self, id: CollectionId) -> LayerResult<CollectionView> {
        self.catalog()?
            .view(id, &self.profile)
            .ok_or(LayerError::UnknownCollection(id))
    }

    /// Catalog mutation counter; `0` while disconnected.
    pub fn revision(&self) -> u64 {
        self.catalog().map_or(0, Catalog::revision)
    }

    /// Copies the layer selected on `from` into the map active on `to`.
    ///
    /// Drive a [`TransferEngine`] directly to read the phase a transfer
    /// stopped in.
    pub fn transfer(&mut self, from: Side, to: Side) -> TransferResult {
        TransferEngine::new(self).transfer(from, to)
    }

    pub(crate) fn parts_mut(&mut self) -> Option<SessionParts<'_, S>> {
        let connected = self.connected.as_mut()?;
        Some(SessionParts {
            session_id: connected.session_id,
            profile: &self.profile,
            store: &mut connected.store,
            catalog: &mut connected.catalog,
            left: &mut self.left,
            right: &mut self.right,
        })
    }
}

impl Session<SqliteRecordStore> {
    /// Opens (and migrates) the SQLite database at `path`, then connects.
    ///
    /// `busy_timeout` bounds lock waits during the catalog load; expiry is
    /// reported as `StoreUnavailable`.
    pub fn connect_sqlite(
        &mut self,
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> LayerResult<Uuid> {
        let conn = open_db_with_timeout(path, busy_timeout)
            .map_err(|err| LayerError::StoreUnavailable(StoreError::Db(err)))?;
        self.connect(SqliteRecordStore::new(conn))
    }
}
