//! Operator-facing error taxonomy.
//!
//! Every variant is recoverable by the operator and is returned as a value;
//! nothing here aborts the process.

use crate::model::collection::CollectionId;
use crate::repo::record_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LayerResult<T> = Result<T, LayerError>;

#[derive(Debug)]
pub enum LayerError {
    /// No live store connection in the session.
    NotConnected,
    /// Store could not be reached or read (load or duplicate check).
    StoreUnavailable(StoreError),
    /// One or both sides have no active map.
    CollectionsNotChosen,
    /// Source side has no resolvable layer selection.
    NoSelection,
    /// Visible index outside `[0, len)`.
    InvalidIndex { index: usize, len: usize },
    /// A layer with the same uniqueness key already exists in the target map.
    DuplicateLayer {
        collection_id: CollectionId,
        name: String,
    },
    /// Insert or commit failed; the transaction was rolled back.
    TransferFailed(StoreError),
    /// Map id is not present in the loaded catalog.
    UnknownCollection(CollectionId),
    /// Persisted state and in-memory mirror can no longer be reconciled.
    InconsistentState(String),
}

impl LayerError {
    /// Stable short code used in log events and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::CollectionsNotChosen => "collections_not_chosen",
            Self::NoSelection => "no_selection",
            Self::InvalidIndex { .. } => "invalid_index",
            Self::DuplicateLayer { .. } => "duplicate_layer",
            Self::TransferFailed(_) => "transfer_failed",
            Self::UnknownCollection(_) => "unknown_collection",
            Self::InconsistentState(_) => "inconsistent_state",
        }
    }
}

impl Display for LayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected to the layer store"),
            Self::StoreUnavailable(err) => write!(f, "layer store unavailable: {err}"),
            Self::CollectionsNotChosen => write!(f, "choose a map on both sides"),
            Self::NoSelection => write!(f, "choose a layer to copy"),
            Self::InvalidIndex { index, len } => {
                write!(f, "layer index {index} is out of range for {len} visible layers")
            }
            Self::DuplicateLayer {
                collection_id,
                name,
            } => write!(f, "layer `{name}` already exists in map {collection_id}"),
            Self::TransferFailed(err) => write!(f, "layer copy failed: {err}"),
            Self::UnknownCollection(id) => write!(f, "map not found: {id}"),
            Self::InconsistentState(details) => write!(f, "inconsistent layer state: {details}"),
        }
    }
}

impl Error for LayerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) | Self::TransferFailed(err) => Some(err),
            _ => None,
        }
    }
}
