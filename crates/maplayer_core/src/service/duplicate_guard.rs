//! Store-backed duplicate check for layer copies.
//!
//! # Responsibility
//! - Ask the record store whether a key already exists in a target map.
//!
//! # Invariants
//! - Always queries the store, never the catalog, so writes made outside this
//!   session are seen.
//! - Results are never cached across calls.
//! - A failed check is reported as `StoreUnavailable`, never as "absent".
//!
//! The check and the later insert are not atomic. The store's unique index
//! over the map and the key fields decides races; this guard only rejects the common
//! case early with a friendly error.

use crate::error::{LayerError, LayerResult};
use crate::model::collection::CollectionId;
use crate::model::key::UniquenessKey;
use crate::repo::record_store::RecordStore;
use log::{debug, error};

pub struct DuplicateGuard<'s, S: RecordStore> {
    store: &'s S,
}

impl<'s, S: RecordStore> DuplicateGuard<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Returns whether `key` is already taken in `target`.
    pub fn exists(&self, target: CollectionId, key: &UniquenessKey) -> LayerResult<bool> {
        match self.store.exists_by_key(target, key) {
            Ok(exists) => {
                debug!(
                    "event=duplicate_check module=duplicate_guard status=ok map_id={target} key={:?} exists={exists}",
                    key.encode()
                );
                Ok(exists)
            }
            Err(err) => {
                error!(
                    "event=duplicate_check module=duplicate_guard status=error map_id={target} error_code=store_unavailable error={err}"
                );
                Err(LayerError::StoreUnavailable(err))
            }
        }
    }
}
