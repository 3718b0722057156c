//! Core of the map layer copier.
//!
//! Owns the catalog mirror of maps and layers, per-side selection state and
//! the duplicate-safe transfer of one layer into another map. UI code only
//! drives a [`Session`] and renders what it returns.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod selection;
pub mod service;
pub mod session;

pub use catalog::{Catalog, CollectionView, ViewItem};
pub use config::profile::{DerivedField, LoadFilter, ProfileError, SchemaProfile};
pub use config::{load_config, ConfigError, CoreConfig, LoggingConfig, StoreConfig};
pub use error::{LayerError, LayerResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::collection::{Collection, CollectionId};
pub use model::key::{KeyProjection, UniquenessKey};
pub use model::record::{Attributes, Record, RecordDraft, RecordId};
pub use repo::record_store::{
    RecordStore, SqliteRecordStore, SqliteStoreTransaction, StoreError, StoreResult,
    StoreTransaction,
};
pub use selection::{SelectionTracker, Side};
pub use service::duplicate_guard::DuplicateGuard;
pub use service::transfer_service::{TransferEngine, TransferPhase, TransferResult, Transferred};
pub use session::Session;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
