//! Batch operation engine.
//!
//! A batch is a caller-submitted list of per-ONU actions processed under one
//! state machine: pending -> in_progress -> {completed |
//! completed_with_errors}. Claiming a pending batch happens atomically under
//! the write lock, so a second `process` call observes `in_progress` (or a
//! terminal status) and gets a conflict instead of re-executing anything.
//! Sub-operations run strictly in submission order; one failure marks that
//! sub-operation `failed` and moves on, never aborting the batch.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{OltError, Result};
use crate::models::{
    batch_status, op_type, sub_status, BatchFilter, BatchOperation, OnuConfig, OperationRequest,
    SubOperation,
};
use crate::olt::OltService;

pub struct BatchService {
    olt: Arc<OltService>,
    batches: RwLock<HashMap<String, BatchOperation>>,
}

impl BatchService {
    pub fn new(olt: Arc<OltService>) -> Self {
        Self {
            olt,
            batches: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and store a new batch. Every entry needs a known type and a
    /// non-empty serial; any violation rejects the whole request and stores
    /// nothing.
    pub async fn create(&self, operations: Vec<OperationRequest>) -> Result<BatchOperation> {
        if operations.is_empty() {
            return Err(OltError::validation("at least one operation is required"));
        }
        for op in &operations {
            if !op_type::ALL.contains(&op.op_type.as_str()) {
                return Err(OltError::validation(format!(
                    "invalid operation type: {}",
                    op.op_type
                )));
            }
            if op.serial.trim().is_empty() {
                return Err(OltError::validation("serial is required for every operation"));
            }
        }

        let batch = BatchOperation {
            id: Uuid::new_v4().to_string(),
            status: batch_status::PENDING.to_string(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            operations: operations
                .into_iter()
                .map(|op| SubOperation {
                    op_type: op.op_type,
                    serial: op.serial,
                    config: op.config,
                    status: sub_status::PENDING.to_string(),
                    error: None,
                    started_at: None,
                    completed_at: None,
                })
                .collect(),
        };

        tracing::info!(
            "batch {} created with {} operation(s)",
            batch.id,
            batch.operations.len()
        );
        self.batches.write().await.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    /// Process a pending batch. At-most-once: a batch that is not `pending`
    /// yields a conflict and no work.
    pub async fn process(&self, batch_id: &str) -> Result<BatchOperation> {
        let total = {
            let mut batches = self.batches.write().await;
            let batch = batches
                .get_mut(batch_id)
                .ok_or_else(|| OltError::not_found("batch operation"))?;

            if batch.status != batch_status::PENDING {
                return Err(OltError::conflict(
                    "batch operation was already processed or is in progress",
                ));
            }
            batch.status = batch_status::IN_PROGRESS.to_string();
            batch.started_at = Some(Utc::now());
            batch.operations.len()
        };

        tracing::info!("processing batch {} ({} operation(s))", batch_id, total);

        for index in 0..total {
            let (kind, serial, config) = {
                let mut batches = self.batches.write().await;
                let op = &mut batches
                    .get_mut(batch_id)
                    .ok_or_else(|| OltError::not_found("batch operation"))?
                    .operations[index];
                op.status = sub_status::IN_PROGRESS.to_string();
                op.started_at = Some(Utc::now());
                (op.op_type.clone(), op.serial.clone(), op.config.clone())
            };

            let result = self.dispatch(&kind, &serial, config.as_ref()).await;

            let mut batches = self.batches.write().await;
            let op = &mut batches
                .get_mut(batch_id)
                .ok_or_else(|| OltError::not_found("batch operation"))?
                .operations[index];
            match result {
                Ok(()) => {
                    op.status = sub_status::COMPLETED.to_string();
                }
                Err(e) => {
                    tracing::warn!("batch {} op {} ({} {}) failed: {}", batch_id, index, kind, serial, e);
                    op.status = sub_status::FAILED.to_string();
                    op.error = Some(e.to_string());
                }
            }
            op.completed_at = Some(Utc::now());
        }

        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(batch_id)
            .ok_or_else(|| OltError::not_found("batch operation"))?;
        batch.status = derive_terminal_status(batch).to_string();
        batch.completed_at = Some(Utc::now());
        tracing::info!("batch {} finished with status {}", batch_id, batch.status);
        Ok(batch.clone())
    }

    pub async fn get(&self, batch_id: &str) -> Result<BatchOperation> {
        self.batches
            .read()
            .await
            .get(batch_id)
            .cloned()
            .ok_or_else(|| OltError::not_found("batch operation"))
    }

    /// List batches matching the filter; an empty filter matches everything.
    pub async fn list(&self, filter: &BatchFilter) -> Vec<BatchOperation> {
        let batches = self.batches.read().await;
        let mut matched: Vec<BatchOperation> = batches
            .values()
            .filter(|b| {
                filter.status.as_ref().map_or(true, |s| &b.status == s)
                    && filter.created_after.map_or(true, |d| b.created_at >= d)
                    && filter.created_before.map_or(true, |d| b.created_at <= d)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    /// Remove a batch. In-progress batches cannot be removed: there is
    /// nothing safe to cancel mid-flight.
    pub async fn remove(&self, batch_id: &str) -> Result<()> {
        let mut batches = self.batches.write().await;
        let batch = batches
            .get(batch_id)
            .ok_or_else(|| OltError::not_found("batch operation"))?;

        if batch.status == batch_status::IN_PROGRESS {
            return Err(OltError::conflict("cannot remove a batch operation in progress"));
        }

        batches.remove(batch_id);
        tracing::info!("batch {} removed", batch_id);
        Ok(())
    }

    async fn dispatch(&self, kind: &str, serial: &str, config: Option<&OnuConfig>) -> Result<()> {
        match kind {
            op_type::START => self.olt.start_onu(serial).await,
            op_type::STOP => self.olt.stop_onu(serial).await,
            op_type::REBOOT => self.olt.reboot_onu(serial).await,
            op_type::CONFIGURE => {
                let config = config.cloned().unwrap_or_default();
                self.olt.configure_onu(serial, &config).await
            }
            other => Err(OltError::validation(format!("unsupported operation type: {other}"))),
        }
    }
}

/// Terminal status is a pure function of the sub-operations: all completed
/// means `completed`; everything terminal with at least one failure means
/// `completed_with_errors`; anything left unfinished means the engine
/// aborted mid-iteration, which is `failed`.
fn derive_terminal_status(batch: &BatchOperation) -> &'static str {
    let all_completed = batch
        .operations
        .iter()
        .all(|op| op.status == sub_status::COMPLETED);
    if all_completed {
        return batch_status::COMPLETED;
    }

    let all_terminal = batch
        .operations
        .iter()
        .all(|op| op.status == sub_status::COMPLETED || op.status == sub_status::FAILED);
    if all_terminal {
        batch_status::COMPLETED_WITH_ERRORS
    } else {
        batch_status::FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryService;
    use crate::models::{event_type, HistoryFilter};
    use crate::session::SessionManager;
    use crate::transport::sim::SimChannel;
    use std::time::Duration;

    fn service() -> (BatchService, Arc<HistoryService>) {
        let session = Arc::new(SessionManager::new(
            Box::new(SimChannel::seeded(3)),
            Duration::from_secs(30),
        ));
        let history = Arc::new(HistoryService::new());
        let olt = Arc::new(OltService::new(session, history.clone()));
        (BatchService::new(olt), history)
    }

    fn op(kind: &str, serial: &str) -> OperationRequest {
        OperationRequest {
            op_type: kind.to_string(),
            serial: serial.to_string(),
            config: None,
        }
    }

    #[tokio::test]
    async fn test_create_pending_preserving_order() {
        let (batches, _) = service();
        let batch = batches
            .create(vec![op("start", "A"), op("reboot", "B"), op("stop", "C")])
            .await
            .unwrap();

        assert_eq!(batch.status, batch_status::PENDING);
        assert_eq!(batch.operations.len(), 3);
        assert!(batch.operations.iter().all(|o| o.status == sub_status::PENDING));
        let serials: Vec<&str> = batch.operations.iter().map(|o| o.serial.as_str()).collect();
        assert_eq!(serials, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (batches, _) = service();

        let err = batches.create(vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = batches.create(vec![op("invalid", "X")]).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = batches.create(vec![op("start", "")]).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        // Nothing was stored
        assert!(batches.list(&BatchFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_completes_with_errors() {
        let (batches, history) = service();
        // The simulated device rejects UNKNOWN* serials
        let batch = batches
            .create(vec![op("start", "HWTC11112222"), op("stop", "UNKNOWN9")])
            .await
            .unwrap();

        let done = batches.process(&batch.id).await.unwrap();
        assert_eq!(done.status, batch_status::COMPLETED_WITH_ERRORS);
        assert_eq!(done.operations[0].status, sub_status::COMPLETED);
        assert_eq!(done.operations[1].status, sub_status::FAILED);
        assert!(done.operations[1].error.as_deref().unwrap().contains("command failed"));
        assert!(done.operations[1].completed_at.is_some());

        // One history event per serial
        let a = history.query("HWTC11112222", &HistoryFilter::default()).await;
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].event_type, event_type::START);

        let b = history.query("UNKNOWN9", &HistoryFilter::default()).await;
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].event_type, event_type::ERROR);
    }

    #[tokio::test]
    async fn test_all_success_completes() {
        let (batches, _) = service();
        let batch = batches
            .create(vec![op("start", "HWTC11112222"), op("stop", "HWTC33334444")])
            .await
            .unwrap();

        let done = batches.process(&batch.id).await.unwrap();
        assert_eq!(done.status, batch_status::COMPLETED);
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_process_is_at_most_once() {
        let (batches, _) = service();
        let batch = batches
            .create(vec![op("start", "HWTC11112222"), op("stop", "UNKNOWN9")])
            .await
            .unwrap();

        let first = batches.process(&batch.id).await.unwrap();
        let err = batches.process(&batch.id).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");

        // Second call changed nothing
        let after = batches.get(&batch.id).await.unwrap();
        assert_eq!(after.status, first.status);
        for (a, b) in after.operations.iter().zip(first.operations.iter()) {
            assert_eq!(a.status, b.status);
            assert_eq!(a.completed_at, b.completed_at);
        }
    }

    #[tokio::test]
    async fn test_process_unknown_batch() {
        let (batches, _) = service();
        let err = batches.process("no-such-id").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_remove_semantics() {
        let (batches, _) = service();

        let err = batches.remove("no-such-id").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let batch = batches.create(vec![op("start", "HWTC11112222")]).await.unwrap();
        batches.process(&batch.id).await.unwrap();

        batches.remove(&batch.id).await.unwrap();
        let err = batches.get(&batch.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_remove_rejects_in_progress() {
        let (batches, _) = service();
        let batch = batches.create(vec![op("start", "HWTC11112222")]).await.unwrap();

        // Force the claimed state without running the loop
        batches
            .batches
            .write()
            .await
            .get_mut(&batch.id)
            .unwrap()
            .status = batch_status::IN_PROGRESS.to_string();

        let err = batches.remove(&batch.id).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (batches, _) = service();
        let b1 = batches.create(vec![op("start", "HWTC11112222")]).await.unwrap();
        batches.create(vec![op("stop", "HWTC33334444")]).await.unwrap();
        batches.process(&b1.id).await.unwrap();

        assert_eq!(batches.list(&BatchFilter::default()).await.len(), 2);

        let pending = batches
            .list(&BatchFilter { status: Some(batch_status::PENDING.into()), ..Default::default() })
            .await;
        assert_eq!(pending.len(), 1);

        let none = batches
            .list(&BatchFilter {
                created_before: Some(Utc::now() - chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_configure_dispatch_carries_payload() {
        let (batches, history) = service();
        let batch = batches
            .create(vec![OperationRequest {
                op_type: op_type::CONFIGURE.to_string(),
                serial: "HWTC11112222".to_string(),
                config: Some(OnuConfig { native_vlan: Some(200), ..Default::default() }),
            }])
            .await
            .unwrap();

        let done = batches.process(&batch.id).await.unwrap();
        assert_eq!(done.status, batch_status::COMPLETED);

        let events = history.query("HWTC11112222", &HistoryFilter::default()).await;
        assert_eq!(events[0].event_type, event_type::CONFIGURE);
        assert_eq!(events[0].config.as_ref().unwrap().native_vlan, Some(200));
    }

    #[test]
    fn test_terminal_status_derivation() {
        let mut batch = BatchOperation {
            id: "b".into(),
            status: batch_status::IN_PROGRESS.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            operations: vec![
                SubOperation {
                    op_type: op_type::START.into(),
                    serial: "A".into(),
                    config: None,
                    status: sub_status::COMPLETED.into(),
                    error: None,
                    started_at: None,
                    completed_at: None,
                },
                SubOperation {
                    op_type: op_type::STOP.into(),
                    serial: "B".into(),
                    config: None,
                    status: sub_status::COMPLETED.into(),
                    error: None,
                    started_at: None,
                    completed_at: None,
                },
            ],
        };
        assert_eq!(derive_terminal_status(&batch), batch_status::COMPLETED);

        batch.operations[1].status = sub_status::FAILED.into();
        assert_eq!(derive_terminal_status(&batch), batch_status::COMPLETED_WITH_ERRORS);

        // An unfinished sub-operation means the engine aborted mid-run
        batch.operations[1].status = sub_status::IN_PROGRESS.into();
        assert_eq!(derive_terminal_status(&batch), batch_status::FAILED);
    }
}
