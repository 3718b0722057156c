//! Per-side selection of a map and one of its visible layers.
//!
//! # Responsibility
//! - Track the active map of one side (left/right).
//! - Resolve a visible index to a stable layer id at selection time.
//!
//! # Invariants
//! - A bare visible position is never stored; only the resolved `RecordId`.
//! - Switching maps always clears the layer selection.
//! - A rejected index leaves the previous selection untouched.

use crate::catalog::Catalog;
use crate::error::{LayerError, LayerResult};
use crate::model::collection::CollectionId;
use crate::model::record::{Record, RecordId};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the two panels an operator works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTracker {
    side: Side,
    active_collection: Option<CollectionId>,
    selected_record: Option<RecordId>,
}

impl SelectionTracker {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            active_collection: None,
            selected_record: None,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn active_collection(&self) -> Option<CollectionId> {
        self.active_collection
    }

    pub fn selected_record_id(&self) -> Option<RecordId> {
        self.selected_record
    }

    /// Makes `id` the active map and clears the layer selection.
    pub fn select_collection(&mut self, catalog: &Catalog, id: CollectionId) -> LayerResult<()> {
        if !catalog.contains_collection(id) {
            return Err(LayerError::UnknownCollection(id));
        }
        self.active_collection = Some(id);
        self.selected_record = None;
        debug!(
            "event=map_selected module=selection side={} map_id={id}",
            self.side
        );
        Ok(())
    }

    /// Selects the layer at `visible_index` of the active map's current view.
    ///
    /// Returns the resolved stable id. Out-of-range indices (including any
    /// index while no map is active) report `InvalidIndex` and change nothing.
    pub fn select_record(&mut self, catalog: &Catalog, visible_index: usize) -> LayerResult<RecordId> {
        let resolved = self
            .active_collection
            .and_then(|id| catalog.record_at(id, visible_index));

        let Some(record) = resolved else {
            let len = self
                .active_collection
                .map_or(0, |id| catalog.len_of(id));
            debug!(
                "event=layer_selected module=selection status=rejected side={} index={visible_index} len={len}",
                self.side
            );
            return Err(LayerError::InvalidIndex {
                index: visible_index,
                len,
            });
        };

        self.selected_record = Some(record.id);
        debug!(
            "event=layer_selected module=selection status=ok side={} index={visible_index} layer_id={}",
            self.side, record.id
        );
        Ok(record.id)
    }

    /// Re-resolves the stored id against the catalog.
    ///
    /// Returns `None` when nothing is selected, or when the id no longer
    /// resolves to a layer of the active map.
    pub fn selected<'c>(&self, catalog: &'c Catalog) -> Option<&'c Record> {
        let active = self.active_collection?;
        let record = catalog.get(self.selected_record?)?;
        (record.collection_id == active).then_some(record)
    }

    pub fn clear_selection(&mut self) {
        self.selected_record = None;
    }

    /// Forgets both the active map and the layer selection.
    pub fn reset(&mut self) {
        self.active_collection = None;
        self.selected_record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{SelectionTracker, Side};
    use crate::catalog::Catalog;
    use crate::error::LayerError;
    use crate::model::collection::{Collection, CollectionId};
    use crate::model::record::{Record, RecordDraft, RecordId};

    fn layer(id: i64, map: i64, name: &str) -> Record {
        Record::from_draft(RecordId(id), RecordDraft::new(CollectionId(map), name))
    }

    fn catalog() -> Catalog {
        Catalog::from_snapshot(
            vec![
                Collection::new(CollectionId(1), "North"),
                Collection::new(CollectionId(2), "South"),
            ],
            vec![layer(10, 1, "Roads"), layer(11, 1, "Rivers"), layer(20, 2, "Parks")],
        )
        .unwrap()
    }

    #[test]
    fn select_record_stores_stable_id() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();

        assert_eq!(tracker.select_record(&catalog, 0).unwrap(), RecordId(11));
        assert_eq!(tracker.selected(&catalog).map(|r| r.name.as_str()), Some("Rivers"));
    }

    #[test]
    fn selection_survives_growth_of_the_same_view() {
        let mut catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();
        tracker.select_record(&catalog, 1).unwrap();

        catalog.append(layer(30, 1, "Airports")).unwrap();

        assert_eq!(catalog.record_at(CollectionId(1), 1).map(|r| r.id), Some(RecordId(11)));
        assert_eq!(tracker.selected(&catalog).map(|r| r.id), Some(RecordId(10)));
    }

    #[test]
    fn switching_map_clears_selection() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Right);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();
        tracker.select_record(&catalog, 0).unwrap();

        tracker.select_collection(&catalog, CollectionId(2)).unwrap();
        assert_eq!(tracker.selected_record_id(), None);

        tracker.select_record(&catalog, 0).unwrap();
        tracker.select_collection(&catalog, CollectionId(2)).unwrap();
        assert_eq!(tracker.selected_record_id(), None);
    }

    #[test]
    fn invalid_index_keeps_previous_selection() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();
        tracker.select_record(&catalog, 1).unwrap();

        let err = tracker.select_record(&catalog, 2).unwrap_err();
        assert!(matches!(err, LayerError::InvalidIndex { index: 2, len: 2 }));
        assert_eq!(tracker.selected_record_id(), Some(RecordId(10)));
    }

    #[test]
    fn index_without_active_map_is_invalid() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        let err = tracker.select_record(&catalog, 0).unwrap_err();
        assert!(matches!(err, LayerError::InvalidIndex { index: 0, len: 0 }));
    }

    #[test]
    fn unknown_map_is_rejected_without_state_change() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();
        tracker.select_record(&catalog, 0).unwrap();

        let err = tracker.select_collection(&catalog, CollectionId(9)).unwrap_err();
        assert!(matches!(err, LayerError::UnknownCollection(CollectionId(9))));
        assert_eq!(tracker.active_collection(), Some(CollectionId(1)));
        assert_eq!(tracker.selected_record_id(), Some(RecordId(11)));
    }

    #[test]
    fn selected_is_none_for_ids_missing_from_catalog() {
        let catalog = catalog();
        let mut tracker = SelectionTracker::new(Side::Left);
        tracker.select_collection(&catalog, CollectionId(1)).unwrap();
        tracker.select_record(&catalog, 0).unwrap();

        let reloaded = Catalog::from_snapshot(
            vec![Collection::new(CollectionId(1), "North")],
            vec![layer(10, 1, "Roads")],
        )
        .unwrap();
        assert!(tracker.selected(&reloaded).is_none());
    }
}
