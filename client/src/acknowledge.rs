//! Commit/rollback broadcasting.
//!
//! [`AcknowledgeService`] is the [`AcknowledgeHook`] the transaction manager
//! drives. `prepare` writes the bootstrap call-log row describing the inbound
//! request; `acknowledge` finalizes that row with the decision and re-invokes
//! every pending outbound call with `?s=<decision>` through its registered
//! target.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use storefront_kit_core::acknowledge::{AcknowledgeHook, AcknowledgeRecord, Decision};
use storefront_kit_core::call_log::{CallLog, CallStatus};
use storefront_kit_core::error::CallError;
use storefront_kit_core::scope::RequestScope;
use storefront_kit_core::store::{AcknowledgeStore, CallLogStore};

/// Broadcasts transaction decisions to the calls registered in a scope.
pub struct AcknowledgeService {
    call_logs: Arc<dyn CallLogStore>,
    acknowledgments: Arc<dyn AcknowledgeStore>,
}

impl AcknowledgeService {
    /// Create a service over the audit stores.
    #[must_use]
    pub fn new(call_logs: Arc<dyn CallLogStore>, acknowledgments: Arc<dyn AcknowledgeStore>) -> Self {
        Self {
            call_logs,
            acknowledgments,
        }
    }

    /// Original payload type name recorded when the call registered, taken
    /// from its `on_progress` row.
    async fn holder_name_for(&self, request_id: i64) -> String {
        match self.acknowledgments.find_by_request(request_id).await {
            Ok(records) => records
                .first()
                .map(|r| r.reserved_holder_name.clone())
                .unwrap_or_default(),
            Err(err) => {
                tracing::warn!(request_id, error = %err, "failed to load acknowledge history");
                String::new()
            }
        }
    }
}

impl AcknowledgeHook for AcknowledgeService {
    fn prepare<'a>(
        &'a self,
        scope: &'a RequestScope,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
        Box::pin(async move {
            // No inbound request means nothing to bootstrap; outbound call
            // logs simply carry a zero reference id.
            let Some(inbound) = scope.inbound() else {
                tracing::debug!("no inbound request on scope, skipping bootstrap call log");
                return Ok(());
            };

            let row = self
                .call_logs
                .insert(CallLog {
                    id: 0,
                    client_id: scope.actor().id(),
                    client_type: scope.actor().kind().to_string(),
                    transaction_id: 0,
                    method: inbound.method,
                    url: inbound.path.clone(),
                    header: inbound.header.clone(),
                    request: inbound.body.clone(),
                    status: CallStatus::Called,
                    http_status_code: 200,
                    reference_id: 0,
                })
                .await?;

            scope.set_reference_id(row.id);
            Ok(())
        })
    }

    fn acknowledge<'a>(
        &'a self,
        scope: &'a RequestScope,
        decision: Decision,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>> {
        Box::pin(async move {
            // Mark the decision before broadcasting so calls completing
            // concurrently stop registering for this round.
            scope.set_decision(decision);
            let pending = scope.take_pending();

            if let Some(reference_id) = scope.reference_id() {
                let mut bootstrap = self.call_logs.find_by_id(reference_id).await?;
                bootstrap.status = decision.into();
                bootstrap.reference_id = reference_id;
                self.call_logs.update(bootstrap).await?;
            }

            for call in pending {
                // First broadcast failure aborts the round; earlier
                // deliveries stand.
                call.target.acknowledge(&call.log, decision).await?;

                let record = AcknowledgeRecord {
                    id: 0,
                    request_id: call.log.id,
                    commit_status: decision.into(),
                    reserved_holder: call.log.request.clone(),
                    reserved_holder_name: self.holder_name_for(call.log.id).await,
                    message: message.to_string(),
                };
                if let Err(err) = self.acknowledgments.insert(record).await {
                    tracing::warn!(
                        request_id = call.log.id,
                        error = %err,
                        "failed to record final acknowledge row"
                    );
                }
            }

            Ok(())
        })
    }
}
