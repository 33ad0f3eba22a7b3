//! Optimistic Mutation Engine
//!
//! Drives one move: validate, mutate the live tree optimistically, persist,
//! then commit or roll back to the pre-drag snapshot.
//!
//! The engine owns the live tree and is the only thing that replaces it. The
//! replacement is always a whole `Catalog`, so observers see either the
//! pre-move tree or the fully mutated one.

use log::{debug, info, warn};

use crate::commands::{PositionClient, PositionUpdate};
use crate::error::{DomainError, DomainResult};
use crate::models::{DragEnd, NodeId};
use crate::notice::{MoveListener, Notice};
use crate::resolver::{resolve, MoveTarget};
use crate::tree::{wire_index, Catalog, CatalogIndex};
use crate::validator::{validate_drop, MoveRejection};

/// Phases of a single move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePhase {
    Idle,
    Validating,
    Mutated,
    Persisting,
    Committed,
    RolledBack,
}

/// Result of feeding a drag-end event through the engine
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// Nothing to do (no drop target, or dropped on itself)
    Ignored,
    /// Another move is still persisting
    Busy,
    /// Refused before any mutation
    Rejected(MoveRejection),
    /// Store confirmed the move
    Committed(PositionUpdate),
    /// Store refused the move; the snapshot was restored
    RolledBack {
        update: PositionUpdate,
        error: DomainError,
    },
}

/// An optimistic move waiting for the store
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub target: MoveTarget,
    pub update: PositionUpdate,
}

struct InFlight {
    snapshot: Catalog,
    update: PositionUpdate,
}

pub struct MoveEngine {
    catalog: Catalog,
    phase: MovePhase,
    in_flight: Option<InFlight>,
}

impl MoveEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            phase: MovePhase::Idle,
            in_flight: None,
        }
    }

    /// The live tree
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    /// Whether a move is waiting for the store
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending_update(&self) -> Option<&PositionUpdate> {
        self.in_flight.as_ref().map(|f| &f.update)
    }

    /// Replace the live tree with a fresh server payload.
    ///
    /// If a move is persisting, the refreshed tree also becomes its rollback
    /// target.
    pub fn replace_catalog(&mut self, catalog: Catalog) {
        if let Some(flight) = self.in_flight.as_mut() {
            debug!("[MOVE] Catalog refreshed while {} is persisting", flight.update.item_id);
            flight.snapshot = catalog.clone();
        }
        self.catalog = catalog;
    }

    fn transition(&mut self, phase: MovePhase) {
        debug!("[MOVE] {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Validate, resolve and apply a drop optimistically.
    ///
    /// On success the live tree already shows the move (phase `Mutated`);
    /// publish it, call `mark_persisting`, send the returned update to the
    /// store and hand the answer to `settle`.
    pub fn begin_move(&mut self, event: &DragEnd) -> Result<PendingMove, MoveOutcome> {
        if let Some(flight) = &self.in_flight {
            debug!("[MOVE] Ignoring drag of {}: {} still persisting", event.active_id, flight.update.item_id);
            return Err(MoveOutcome::Busy);
        }
        let Some(over) = event.over_id.as_ref() else {
            return Err(MoveOutcome::Ignored);
        };
        if *over == event.active_id {
            return Err(MoveOutcome::Ignored);
        }

        self.transition(MovePhase::Validating);
        let planned = self.plan(event, over);
        let (next, pending) = match planned {
            Ok(planned) => planned,
            Err(rejection) => {
                warn!("[MOVE] Rejected {} over {}: {}", event.active_id, over, rejection);
                self.transition(MovePhase::Idle);
                return Err(MoveOutcome::Rejected(rejection));
            }
        };

        let snapshot = std::mem::replace(&mut self.catalog, next);
        self.in_flight = Some(InFlight {
            snapshot,
            update: pending.update.clone(),
        });
        self.transition(MovePhase::Mutated);
        Ok(pending)
    }

    /// The optimistic tree has been published and the update is on its way
    /// to the store. No-op unless a move is in `Mutated`.
    pub fn mark_persisting(&mut self) {
        if self.phase == MovePhase::Mutated && self.in_flight.is_some() {
            self.transition(MovePhase::Persisting);
        }
    }

    fn plan(&self, event: &DragEnd, over: &NodeId) -> Result<(Catalog, PendingMove), MoveRejection> {
        let active = &event.active_id;
        let index = CatalogIndex::build(&self.catalog);

        let dragged = index
            .get(active)
            .ok_or_else(|| MoveRejection::Unresolved(format!("unknown item {}", active)))?;
        let over_level = if over.is_root() {
            None
        } else {
            Some(
                index
                    .get(over)
                    .ok_or_else(|| MoveRejection::Unresolved(format!("unknown drop target {}", over)))?
                    .level,
            )
        };
        validate_drop(dragged.level, over_level)?;

        let target = resolve(&index, active, over)
            .ok_or_else(|| MoveRejection::Unresolved(format!("no parent for {} over {}", active, over)))?;

        let unresolved = |e: DomainError| MoveRejection::Unresolved(e.message().to_string());
        let (without, subtree) = self.catalog.remove_subtree(active).map_err(unresolved)?;
        let next = without
            .insert_at(&target.parent, target.index, subtree)
            .map_err(unresolved)?;

        let new_index = next
            .locate(active)
            .ok_or_else(|| MoveRejection::Unresolved(format!("{} lost during move", active)))?
            .index;
        let new_index = wire_index(new_index)
            .ok_or_else(|| MoveRejection::Unresolved(format!("index {} out of range", new_index)))?;
        debug_assert!(next.check_invariants().is_ok());

        let update = PositionUpdate {
            item_id: active.clone(),
            item_type: dragged.level,
            new_parent_id: target.parent.clone(),
            new_index,
        };
        Ok((next, PendingMove { target, update }))
    }

    /// Finish the in-flight move with the store's answer
    pub fn settle(&mut self, result: DomainResult<()>) -> MoveOutcome {
        let Some(flight) = self.in_flight.take() else {
            return MoveOutcome::Ignored;
        };

        let outcome = match result {
            Ok(()) => {
                self.transition(MovePhase::Committed);
                info!(
                    "[MOVE] Saved {} {} under {} at {}",
                    flight.update.item_type, flight.update.item_id, flight.update.new_parent_id, flight.update.new_index
                );
                MoveOutcome::Committed(flight.update)
            }
            Err(error) => {
                self.transition(MovePhase::RolledBack);
                warn!("[MOVE] Save of {} failed, reverting: {}", flight.update.item_id, error);
                self.catalog = flight.snapshot;
                MoveOutcome::RolledBack {
                    update: flight.update,
                    error,
                }
            }
        };

        self.transition(MovePhase::Idle);
        outcome
    }

    /// Full cycle for one drag-end event
    pub async fn handle_drag_end(
        &mut self,
        event: &DragEnd,
        client: &dyn PositionClient,
        listener: &dyn MoveListener,
    ) -> MoveOutcome {
        let pending = match self.begin_move(event) {
            Ok(pending) => pending,
            Err(outcome) => {
                if let MoveOutcome::Rejected(rejection) = &outcome {
                    listener.notify(&Notice::Rejected(rejection.clone()));
                }
                return outcome;
            }
        };
        listener.catalog_changed(&self.catalog);
        self.mark_persisting();

        let result = client.update_position(&pending.update).await;
        let outcome = self.settle(result);

        if let MoveOutcome::RolledBack { error, .. } = &outcome {
            listener.catalog_changed(&self.catalog);
            listener.notify(&Notice::save_failed(error));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::MockClient;
    use crate::models::{Level, ParentRef};
    use crate::tree::tests::{ids, sample_catalog};
    use crate::validator::DropZone;
    use proptest::prelude::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingListener {
        trees: RefCell<Vec<Catalog>>,
        notices: RefCell<Vec<Notice>>,
    }

    impl MoveListener for RecordingListener {
        fn catalog_changed(&self, catalog: &Catalog) {
            self.trees.borrow_mut().push(catalog.clone());
        }

        fn notify(&self, notice: &Notice) {
            self.notices.borrow_mut().push(notice.clone());
        }
    }

    fn update(id: &str, level: Level, parent: ParentRef, index: i32) -> PositionUpdate {
        PositionUpdate {
            item_id: NodeId::from(id),
            item_type: level,
            new_parent_id: parent,
            new_index: index,
        }
    }

    fn node(id: &str) -> ParentRef {
        ParentRef::Node(NodeId::from(id))
    }

    #[tokio::test]
    async fn test_reorder_within_category() {
        let mut engine = MoveEngine::new(sample_catalog());
        let client = MockClient::default();
        let listener = RecordingListener::default();

        let outcome = engine
            .handle_drag_end(&DragEnd::over("c", "a"), &client, &listener)
            .await;

        assert_eq!(ids(engine.catalog(), "X"), vec!["c", "a", "b"]);
        assert_eq!(outcome, MoveOutcome::Committed(update("c", Level::Service, node("X"), 0)));
        assert_eq!(listener.trees.borrow().len(), 1);
        assert!(listener.notices.borrow().is_empty());
        assert_eq!(engine.phase(), MovePhase::Idle);
    }

    #[tokio::test]
    async fn test_forward_reorder_lands_after_target() {
        let mut engine = MoveEngine::new(sample_catalog());
        let client = MockClient::default();

        engine
            .handle_drag_end(&DragEnd::over("a", "b"), &client, &crate::notice::NoopListener)
            .await;

        // raw index 1 into [b, c]
        assert_eq!(ids(engine.catalog(), "X"), vec!["b", "a", "c"]);
        assert_eq!(client.calls()[0].new_index, 1);
    }

    #[tokio::test]
    async fn test_move_service_to_empty_category() {
        let mut engine = MoveEngine::new(sample_catalog());
        let client = MockClient::default();
        let listener = RecordingListener::default();

        engine
            .handle_drag_end(&DragEnd::over("a", "Y"), &client, &listener)
            .await;

        assert_eq!(ids(engine.catalog(), "X"), vec!["b", "c"]);
        assert_eq!(ids(engine.catalog(), "Y"), vec!["a"]);
        assert_eq!(client.calls(), vec![update("a", Level::Service, node("Y"), 0)]);
    }

    #[tokio::test]
    async fn test_illegal_move_is_rejected() {
        let catalog = sample_catalog();
        let mut engine = MoveEngine::new(catalog.clone());
        let client = MockClient::default();
        let listener = RecordingListener::default();

        let outcome = engine
            .handle_drag_end(&DragEnd::over("S1", "t"), &client, &listener)
            .await;

        let rejection = MoveRejection::IllegalMove {
            dragged: Level::Section,
            zone: DropZone::Container(Level::Category),
        };
        assert_eq!(outcome, MoveOutcome::Rejected(rejection.clone()));
        assert_eq!(engine.catalog(), &catalog);
        assert!(client.calls().is_empty());
        assert!(listener.trees.borrow().is_empty());
        assert_eq!(*listener.notices.borrow(), vec![Notice::Rejected(rejection)]);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let catalog = sample_catalog();
        let mut engine = MoveEngine::new(catalog.clone());
        let client = MockClient::failing(DomainError::Internal("server down".to_string()));
        let listener = RecordingListener::default();

        let outcome = engine
            .handle_drag_end(&DragEnd::over("Y", "S2"), &client, &listener)
            .await;

        // optimistic tree was published first
        let trees = listener.trees.borrow();
        assert_eq!(trees.len(), 2);
        assert_eq!(ids(&trees[0], "S2"), vec!["Z", "Y"]);
        assert_eq!(trees[1], catalog);

        assert!(matches!(outcome, MoveOutcome::RolledBack { .. }));
        assert_eq!(engine.catalog(), &catalog);
        assert_eq!(ids(engine.catalog(), "S1"), vec!["X", "Y"]);
        assert_eq!(
            *listener.notices.borrow(),
            vec![Notice::SaveFailed { message: Some("server down".to_string()) }]
        );
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn test_drop_on_container_versus_sibling() {
        let mut engine = MoveEngine::new(sample_catalog());
        let client = MockClient::default();

        engine
            .handle_drag_end(&DragEnd::over("a", "Y"), &client, &crate::notice::NoopListener)
            .await;
        assert_eq!(ids(engine.catalog(), "Y"), vec!["a"]);

        engine
            .handle_drag_end(&DragEnd::over("b", "a"), &client, &crate::notice::NoopListener)
            .await;
        assert_eq!(ids(engine.catalog(), "Y"), vec!["b", "a"]);
        assert_eq!(client.calls()[1], update("b", Level::Service, node("Y"), 0));
    }

    #[tokio::test]
    async fn test_section_dropped_on_background_appends() {
        let mut engine = MoveEngine::new(sample_catalog());
        let client = MockClient::default();

        engine
            .handle_drag_end(&DragEnd::over("S1", "root"), &client, &crate::notice::NoopListener)
            .await;

        assert_eq!(ids(engine.catalog(), "root"), vec!["S2", "S1"]);
        assert_eq!(client.calls(), vec![update("S1", Level::Section, ParentRef::Root, 1)]);
    }

    #[test]
    fn test_no_target_and_self_drop_are_ignored() {
        let catalog = sample_catalog();
        let mut engine = MoveEngine::new(catalog.clone());

        assert_eq!(engine.begin_move(&DragEnd::new("a", None)), Err(MoveOutcome::Ignored));
        assert_eq!(engine.begin_move(&DragEnd::over("a", "a")), Err(MoveOutcome::Ignored));
        assert_eq!(engine.catalog(), &catalog);
    }

    #[test]
    fn test_dangling_ids_are_unresolved() {
        let mut engine = MoveEngine::new(sample_catalog());
        let result = engine.begin_move(&DragEnd::over("ghost", "a"));
        assert!(matches!(result, Err(MoveOutcome::Rejected(MoveRejection::Unresolved(_)))));
        assert_eq!(engine.phase(), MovePhase::Idle);
    }

    #[test]
    fn test_second_move_while_persisting_is_busy() {
        let mut engine = MoveEngine::new(sample_catalog());
        let pending = engine.begin_move(&DragEnd::over("a", "Y")).unwrap();
        engine.mark_persisting();
        assert_eq!(engine.phase(), MovePhase::Persisting);
        assert_eq!(engine.pending_update(), Some(&pending.update));

        let optimistic = engine.catalog().clone();
        assert_eq!(engine.begin_move(&DragEnd::over("b", "Y")), Err(MoveOutcome::Busy));
        assert_eq!(engine.catalog(), &optimistic);

        assert_eq!(engine.settle(Ok(())), MoveOutcome::Committed(pending.update));
        assert!(engine.begin_move(&DragEnd::over("b", "Y")).is_ok());
    }

    #[test]
    fn test_phases_of_a_manual_cycle() {
        let mut engine = MoveEngine::new(sample_catalog());
        engine.mark_persisting();
        assert_eq!(engine.phase(), MovePhase::Idle);

        engine.begin_move(&DragEnd::over("a", "Y")).unwrap();
        assert_eq!(engine.phase(), MovePhase::Mutated);
        assert!(engine.is_busy());
        assert_eq!(ids(engine.catalog(), "Y"), vec!["a"]);

        // busy already in Mutated, before anything was sent
        assert_eq!(engine.begin_move(&DragEnd::over("b", "Y")), Err(MoveOutcome::Busy));

        engine.mark_persisting();
        assert_eq!(engine.phase(), MovePhase::Persisting);

        engine.settle(Err(DomainError::Internal("down".to_string())));
        assert_eq!(engine.phase(), MovePhase::Idle);
        assert_eq!(engine.catalog(), &sample_catalog());
    }

    #[test]
    fn test_refresh_during_flight_becomes_rollback_target() {
        let mut engine = MoveEngine::new(sample_catalog());
        engine.begin_move(&DragEnd::over("a", "Y")).unwrap();

        let refreshed = Catalog::from_json(r#"[{"id":"S9","nombre":"Nueva"}]"#).unwrap();
        engine.replace_catalog(refreshed.clone());
        engine.settle(Err(DomainError::Conflict("stale".to_string())));

        assert_eq!(engine.catalog(), &refreshed);
    }

    #[test]
    fn test_settle_without_flight_is_ignored() {
        let mut engine = MoveEngine::new(sample_catalog());
        assert_eq!(engine.settle(Ok(())), MoveOutcome::Ignored);
    }

    const ALL_IDS: [&str; 10] = ["S1", "S2", "X", "Y", "Z", "a", "b", "c", "t", "root"];

    fn any_id() -> impl Strategy<Value = &'static str> {
        prop::sample::select(ALL_IDS.to_vec())
    }

    proptest! {
        #[test]
        fn moves_preserve_partition(drags in prop::collection::vec((any_id(), any_id()), 1..20)) {
            let catalog = sample_catalog();
            let mut engine = MoveEngine::new(catalog.clone());
            for (active, over) in drags {
                if engine.begin_move(&DragEnd::over(active, over)).is_ok() {
                    engine.settle(Ok(()));
                }
                prop_assert!(engine.catalog().check_invariants().is_ok());
                prop_assert_eq!(engine.catalog().len(), catalog.len());
            }
        }

        #[test]
        fn failed_saves_restore_the_snapshot(drags in prop::collection::vec((any_id(), any_id()), 1..20)) {
            let mut engine = MoveEngine::new(sample_catalog());
            for (active, over) in drags {
                let before = engine.catalog().clone();
                match engine.begin_move(&DragEnd::over(active, over)) {
                    Ok(_) => {
                        engine.settle(Err(DomainError::Internal("nope".to_string())));
                    }
                    Err(MoveOutcome::Rejected(_)) | Err(MoveOutcome::Ignored) => {}
                    Err(other) => prop_assert!(false, "unexpected outcome {:?}", other),
                }
                prop_assert_eq!(engine.catalog(), &before);
            }
        }
    }
}
