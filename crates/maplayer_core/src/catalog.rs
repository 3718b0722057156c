//! In-memory mirror of all maps and layers for one store session.
//!
//! # Responsibility
//! - Load a full snapshot of maps and layers from the record store.
//! - Answer per-map ordered views used for rendering and selection.
//! - Accept appends of layers that were persisted by a committed transfer.
//!
//! # Invariants
//! - Every mirrored layer references a loaded map.
//! - Per-map views are ordered by `(name, id)`.
//! - Layers are only appended; existing entries are never reordered in
//!   storage, renumbered or removed, so stored `RecordId`s stay resolvable.
//! - `revision` increases on every mutation; per-map revisions increase only
//!   for the map that changed.

use crate::config::profile::SchemaProfile;
use crate::error::{LayerError, LayerResult};
use crate::model::collection::{Collection, CollectionId};
use crate::model::record::{Record, RecordId};
use crate::repo::record_store::{RecordStore, StoreError};
use log::{error, info};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: Vec<Collection>,
    collection_index: HashMap<CollectionId, usize>,
    records: Vec<Record>,
    record_index: HashMap<RecordId, usize>,
    /// Per-map positions into `records`, sorted by `(name, id)`.
    views: HashMap<CollectionId, Vec<usize>>,
    revisions: HashMap<CollectionId, u64>,
    revision: u64,
}

/// Render-ready snapshot of one map's visible layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionView {
    pub collection_id: CollectionId,
    pub display_name: String,
    /// Per-map revision the snapshot was taken at.
    pub revision: u64,
    pub items: Vec<ViewItem>,
}

impl CollectionView {
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewItem {
    pub index: usize,
    pub record_id: RecordId,
    pub label: String,
}

impl Catalog {
    /// Loads every map and layer from `store`.
    ///
    /// Layers rejected by the profile's load filter are not mirrored. On any
    /// failure no catalog is produced; callers keep their previous state.
    pub fn load<S: RecordStore>(store: &S, profile: &SchemaProfile) -> LayerResult<Self> {
        let started_at = Instant::now();
        info!("event=catalog_load module=catalog status=start");

        let result = store.query_snapshot().and_then(|(collections, records)| {
            let total = records.len();
            let visible: Vec<Record> = records
                .into_iter()
                .filter(|record| profile.accepts(record))
                .collect();
            let filtered_out = total - visible.len();
            Self::from_snapshot(collections, visible).map(|catalog| (catalog, filtered_out))
        });

        match result {
            Ok((catalog, filtered_out)) => {
                info!(
                    "event=catalog_load module=catalog status=ok duration_ms={} maps={} layers={} filtered_out={}",
                    started_at.elapsed().as_millis(),
                    catalog.collections.len(),
                    catalog.records.len(),
                    filtered_out
                );
                Ok(catalog)
            }
            Err(err) => {
                error!(
                    "event=catalog_load module=catalog status=error duration_ms={} error_code=store_unavailable timed_out={} error={}",
                    started_at.elapsed().as_millis(),
                    err.is_timeout(),
                    err
                );
                Err(LayerError::StoreUnavailable(err))
            }
        }
    }

    /// Builds a catalog from already-fetched rows.
    pub fn from_snapshot(
        collections: Vec<Collection>,
        records: Vec<Record>,
    ) -> Result<Self, StoreError> {
        let mut catalog = Self::default();
        for collection in collections {
            if catalog.collection_index.contains_key(&collection.id) {
                return Err(StoreError::InvalidData(format!(
                    "map id {} loaded twice",
                    collection.id
                )));
            }
            catalog
                .collection_index
                .insert(collection.id, catalog.collections.len());
            catalog.views.insert(collection.id, Vec::new());
            catalog.revisions.insert(collection.id, 0);
            catalog.collections.push(collection);
        }

        for record in records {
            if !catalog.collection_index.contains_key(&record.collection_id) {
                return Err(StoreError::InvalidData(format!(
                    "layer {} references unknown map {}",
                    record.id, record.collection_id
                )));
            }
            if catalog.record_index.contains_key(&record.id) {
                return Err(StoreError::InvalidData(format!(
                    "layer id {} loaded twice",
                    record.id
                )));
            }
            let position = catalog.records.len();
            catalog.record_index.insert(record.id, position);
            if let Some(view) = catalog.views.get_mut(&record.collection_id) {
                view.push(position);
            }
            catalog.records.push(record);
        }

        let records = &catalog.records;
        for view in catalog.views.values_mut() {
            view.sort_by(|left, right| display_order(&records[*left], &records[*right]));
        }

        Ok(catalog)
    }

    pub fn collections(&self) -> &[Collection] {
        &self.collections
    }

    pub fn collection(&self, id: CollectionId) -> Option<&Collection> {
        self.collection_index
            .get(&id)
            .map(|position| &self.collections[*position])
    }

    pub fn contains_collection(&self, id: CollectionId) -> bool {
        self.collection_index.contains_key(&id)
    }

    /// Layers of one map in display order. Empty for unknown maps.
    pub fn records_of(&self, id: CollectionId) -> Vec<&Record> {
        self.views
            .get(&id)
            .map(|view| view.iter().map(|position| &self.records[*position]).collect())
            .unwrap_or_default()
    }

    /// Number of visible layers in one map.
    pub fn len_of(&self, id: CollectionId) -> usize {
        self.views.get(&id).map_or(0, Vec::len)
    }

    /// Resolves a visible position in one map's current view.
    pub fn record_at(&self, id: CollectionId, index: usize) -> Option<&Record> {
        let position = self.views.get(&id)?.get(index)?;
        Some(&self.records[*position])
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.record_index
            .get(&id)
            .map(|position| &self.records[*position])
    }

    /// Total mirrored layers across all maps.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Global mutation counter; UI collaborators poll it to re-render.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn collection_revision(&self, id: CollectionId) -> Option<u64> {
        self.revisions.get(&id).copied()
    }

    /// Mirrors a layer that the store has already committed.
    pub fn append(&mut self, record: Record) -> LayerResult<()> {
        if !self.contains_collection(record.collection_id) {
            return Err(LayerError::UnknownCollection(record.collection_id));
        }
        if self.record_index.contains_key(&record.id) {
            return Err(LayerError::InconsistentState(format!(
                "layer id {} is already mirrored",
                record.id
            )));
        }

        let collection_id = record.collection_id;
        let position = self.records.len();
        self.records.push(record);
        self.record_index.insert(self.records[position].id, position);

        let records = &self.records;
        if let Some(view) = self.views.get_mut(&collection_id) {
            let slot = view.partition_point(|existing| {
                display_order(&records[*existing], &records[position]) == Ordering::Less
            });
            view.insert(slot, position);
        }
        if let Some(revision) = self.revisions.get_mut(&collection_id) {
            *revision += 1;
        }
        self.revision += 1;
        Ok(())
    }

    /// Render-ready view of one map, labelled per the schema profile.
    pub fn view(&self, id: CollectionId, profile: &SchemaProfile) -> Option<CollectionView> {
        let collection = self.collection(id)?;
        let items = self
            .records_of(id)
            .into_iter()
            .enumerate()
            .map(|(index, record)| ViewItem {
                index,
                record_id: record.id,
                label: profile.label(record),
            })
            .collect();
        Some(CollectionView {
            collection_id: id,
            display_name: collection.display_name.clone(),
            revision: self.collection_revision(id).unwrap_or(0),
            items,
        })
    }
}

fn display_order(left: &Record, right: &Record) -> Ordering {
    left.name
        .cmp(&right.name)
        .then_with(|| left.id.cmp(&right.id))
}
