//! Domain model for maps (collections) and their layers (records).
//!
//! # Responsibility
//! - Define the typed core shared by the catalog, selection and transfer code.
//! - Keep schema-variant fields in an open, ordered attribute payload.
//!
//! # Invariants
//! - Every layer is identified by a store-assigned `RecordId` that is never
//!   reused or mutated.
//! - Every layer belongs to exactly one map.

pub mod collection;
pub mod key;
pub mod record;
