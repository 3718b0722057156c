//! Record store contract and persistence implementation.
//!
//! # Responsibility
//! - Define the narrow store interface the catalog and transfer engine use.
//! - Isolate SQLite query details from catalog/selection/transfer logic.
//!
//! # Invariants
//! - Writes happen only inside an explicit transaction the caller commits or
//!   rolls back.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod record_store;
