//! Layer copy use-cases.
//!
//! # Responsibility
//! - Orchestrate store, catalog and selection state into one transfer.
//! - Keep copy rules (defaults, derived fields) out of the store layer.

pub mod duplicate_guard;
pub mod transfer_service;
pub mod transform;
