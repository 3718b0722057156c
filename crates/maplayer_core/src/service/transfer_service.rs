//! Layer transfer engine: copy one layer into another map.
//!
//! # Responsibility
//! - Validate preconditions in a fixed order, each with its own reason.
//! - Check for duplicates, persist the copy transactionally, then mirror it.
//!
//! # Invariants
//! - Precondition failures happen before any store call.
//! - Any insert/commit error rolls back and leaves the catalog untouched.
//! - The catalog is mutated only after the store committed, and only with
//!   copies the load filter accepts.
//! - One invocation moves exactly one layer; nothing survives between calls.
//!
//! Transfers take `&mut Session`, so a session runs at most one at a time.
//! Concurrent writers in other sessions are stopped by the store's unique
//! index, reported as `TransferFailed(UniqueViolation)`.

use crate::error::{LayerError, LayerResult};
use crate::model::collection::CollectionId;
use crate::model::key::UniquenessKey;
use crate::model::record::{Record, RecordDraft, RecordId};
use crate::repo::record_store::{RecordStore, StoreResult, StoreTransaction};
use crate::selection::{SelectionTracker, Side};
use crate::service::duplicate_guard::DuplicateGuard;
use crate::service::transform::derive_copy;
use crate::session::Session;
use log::{error, info, warn};
use std::time::Instant;
use uuid::Uuid;

pub type TransferResult = LayerResult<Transferred>;

/// Successful transfer report.
#[derive(Debug, Clone, PartialEq)]
pub struct Transferred {
    /// Id assigned by the store to the copy.
    pub new_id: RecordId,
    pub source_id: RecordId,
    /// The copy as stored.
    pub record: Record,
}

/// Per-invocation engine phases, reported in `layer_transfer` log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Validating,
    CheckingDuplicate,
    Persisting,
    Committed,
    RolledBack,
}

impl TransferPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::CheckingDuplicate => "checking_duplicate",
            Self::Persisting => "persisting",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

pub struct TransferEngine<'s, S: RecordStore> {
    session: &'s mut Session<S>,
    phase: TransferPhase,
}

impl<'s, S: RecordStore> TransferEngine<'s, S> {
    pub fn new(session: &'s mut Session<S>) -> Self {
        Self {
            session,
            phase: TransferPhase::Idle,
        }
    }

    /// Phase reached by the last `transfer` call before it returned.
    pub fn last_phase(&self) -> TransferPhase {
        self.phase
    }

    /// Copies the layer selected on `from` into the map active on `to`.
    pub fn transfer(&mut self, from: Side, to: Side) -> TransferResult {
        let started_at = Instant::now();
        self.phase = TransferPhase::Validating;

        let Some(parts) = self.session.parts_mut() else {
            error!(
                "event=layer_transfer module=transfer status=rejected phase={} from={from} to={to} error_code=not_connected",
                self.phase.as_str()
            );
            return Err(LayerError::NotConnected);
        };
        let session_id = parts.session_id;

        let source_map = parts.tracker(from).active_collection();
        let target_map = parts.tracker(to).active_collection();
        let (Some(source_map), Some(target_map)) = (source_map, target_map) else {
            return Err(reject(session_id, from, to, LayerError::CollectionsNotChosen));
        };

        let Some(source) = parts.tracker(from).selected(parts.catalog).cloned() else {
            return Err(reject(session_id, from, to, LayerError::NoSelection));
        };
        if !parts.catalog.contains_collection(target_map) {
            return Err(reject(
                session_id,
                from,
                to,
                LayerError::UnknownCollection(target_map),
            ));
        }

        let key = parts.profile.key_fields.key_of(&source);

        self.phase = TransferPhase::CheckingDuplicate;
        let exists = DuplicateGuard::new(&*parts.store).exists(target_map, &key)?;
        if exists {
            warn!(
                "event=layer_transfer module=transfer status=rejected phase={} session_id={session_id} source_map={source_map} target_map={target_map} layer_id={} error_code=duplicate_layer",
                self.phase.as_str(),
                source.id
            );
            return Err(LayerError::DuplicateLayer {
                collection_id: target_map,
                name: source.name.clone(),
            });
        }

        self.phase = TransferPhase::Persisting;
        let draft = derive_copy(parts.profile, &source, target_map);
        let new_id = match persist(&mut *parts.store, &draft, &key) {
            Ok(new_id) => new_id,
            Err(err) => {
                self.phase = TransferPhase::RolledBack;
                error!(
                    "event=layer_transfer module=transfer status=error phase={} session_id={session_id} source_map={source_map} target_map={target_map} layer_id={} duration_ms={} error_code=transfer_failed error={}",
                    self.phase.as_str(),
                    source.id,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(LayerError::TransferFailed(err));
            }
        };
        self.phase = TransferPhase::Committed;

        let record = Record::from_draft(new_id, draft);
        if !parts.profile.accepts(&record) {
            warn!(
                "event=layer_transfer module=transfer status=hidden phase={} session_id={session_id} target_map={target_map} new_id={new_id}",
                self.phase.as_str()
            );
        } else if let Err(err) = parts.catalog.append(record.clone()) {
            error!(
                "event=layer_transfer module=transfer status=error phase={} session_id={session_id} target_map={target_map} new_id={new_id} error_code={} error={}",
                self.phase.as_str(),
                err.code(),
                err
            );
            return Err(LayerError::InconsistentState(format!(
                "layer {new_id} was committed but could not be mirrored: {err}"
            )));
        } else {
            clear_stale_selections(&mut *parts.left, &mut *parts.right, target_map);
        }

        info!(
            "event=layer_transfer module=transfer status=ok phase={} session_id={session_id} source_map={source_map} target_map={target_map} layer_id={} new_id={new_id} duration_ms={}",
            self.phase.as_str(),
            source.id,
            started_at.elapsed().as_millis()
        );
        Ok(Transferred {
            new_id,
            source_id: source.id,
            record,
        })
    }
}

fn reject(session_id: Uuid, from: Side, to: Side, err: LayerError) -> LayerError {
    warn!(
        "event=layer_transfer module=transfer status=rejected phase={} session_id={session_id} from={from} to={to} error_code={}",
        TransferPhase::Validating.as_str(),
        err.code()
    );
    err
}

/// Inserts inside one transaction; rolls back on insert failure.
fn persist<S: RecordStore>(
    store: &mut S,
    draft: &RecordDraft,
    key: &UniquenessKey,
) -> StoreResult<RecordId> {
    let mut tx = store.begin()?;
    match tx.insert_record(draft, key) {
        Ok(new_id) => {
            tx.commit()?;
            Ok(new_id)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(
                    "event=layer_transfer module=transfer status=error error_code=rollback_failed error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}

/// The target map's view changed, so selections made against it are void.
fn clear_stale_selections(
    left: &mut SelectionTracker,
    right: &mut SelectionTracker,
    target_map: CollectionId,
) {
    for tracker in [left, right] {
        if tracker.active_collection() == Some(target_map) {
            tracker.clear_selection();
        }
    }
}
