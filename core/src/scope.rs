//! Explicit per-logical-transaction state.
//!
//! The original design threaded identity, pending acknowledgments and the
//! commit decision through an ambient context bag. Here that state is an
//! explicit [`RequestScope`] value owned by one `run_in_transaction`
//! invocation and passed by reference down the call chain. Mutation happens
//! through a mutex so the scope can be shared between the manager and the
//! work closure without `&mut` gymnastics; the mutex is never held across an
//! await point.

use crate::acknowledge::Decision;
use crate::call_log::{CallLog, Method};
use crate::error::CallError;
use crate::payload::Metadata;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

/// The identity an outbound call is attributed to.
///
/// Resolution precedence at the HTTP edge is user, then customer, then
/// client, else system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// A logged-in back-office user.
    User(i64),
    /// A storefront customer.
    Customer(i64),
    /// Another service calling with client credentials.
    Client(i64),
    /// No ambient identity (background jobs, bootstrap).
    System,
}

impl Actor {
    /// Numeric id persisted on audit rows; zero for [`Actor::System`].
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::User(id) | Self::Customer(id) | Self::Client(id) => id,
            Self::System => 0,
        }
    }

    /// Kind string persisted on audit rows.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::User(_) => "User",
            Self::Customer(_) => "Customer",
            Self::Client(_) => "Client",
            Self::System => "System",
        }
    }
}

/// Metadata of the inbound request that opened the logical transaction,
/// captured so the bootstrap call-log row can describe it.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// HTTP method of the inbound request.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Rendered request headers.
    pub header: String,
    /// Request body view.
    pub body: Metadata,
}

/// A dependent endpoint that must be told the transaction's final decision.
///
/// Implemented by the outbound HTTP client: re-invokes the original URL with
/// `?s=<decision>` appended, same method and body, ignoring the response
/// body.
pub trait AcknowledgeTarget: Send + Sync {
    /// Deliver `decision` for the call recorded in `log`.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] when the compensating call fails.
    fn acknowledge<'a>(
        &'a self,
        log: &'a CallLog,
        decision: Decision,
    ) -> Pin<Box<dyn Future<Output = Result<(), CallError>> + Send + 'a>>;
}

/// An outbound call awaiting the transaction's decision.
#[derive(Clone)]
pub struct PendingCall {
    /// The client instance that made the call, used to re-invoke it.
    pub target: Arc<dyn AcknowledgeTarget>,
    /// The call's audit record as of completion.
    pub log: CallLog,
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    reference_id: Option<i64>,
    decision: Option<Decision>,
    pending: Vec<PendingCall>,
}

/// Per-logical-transaction state shared by the transaction manager, the
/// outbound client and the acknowledge broadcaster.
///
/// One scope per `run_in_transaction` invocation; scopes are never shared
/// across concurrent logical transactions.
#[derive(Debug)]
pub struct RequestScope {
    actor: Actor,
    inbound: Option<InboundRequest>,
    state: Mutex<ScopeState>,
}

impl RequestScope {
    /// Create a scope for `actor` with no inbound request metadata.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            inbound: None,
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// Create a scope carrying the inbound request that opened the logical
    /// transaction.
    #[must_use]
    pub fn with_inbound(actor: Actor, inbound: InboundRequest) -> Self {
        Self {
            actor,
            inbound: Some(inbound),
            state: Mutex::new(ScopeState::default()),
        }
    }

    /// The identity outbound calls are attributed to.
    #[must_use]
    pub const fn actor(&self) -> Actor {
        self.actor
    }

    /// Inbound request metadata, when captured.
    #[must_use]
    pub const fn inbound(&self) -> Option<&InboundRequest> {
        self.inbound.as_ref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Id of the bootstrap call-log row, once `prepare` has run.
    #[must_use]
    pub fn reference_id(&self) -> Option<i64> {
        self.lock().reference_id
    }

    /// Record the bootstrap row id.
    pub fn set_reference_id(&self, id: i64) {
        self.lock().reference_id = Some(id);
    }

    /// The final decision, once made. Calls completed after this point no
    /// longer register for acknowledgment.
    #[must_use]
    pub fn decision(&self) -> Option<Decision> {
        self.lock().decision
    }

    /// Record the final decision.
    pub fn set_decision(&self, decision: Decision) {
        self.lock().decision = Some(decision);
    }

    /// Register a completed call for acknowledgment.
    pub fn register_pending(&self, target: Arc<dyn AcknowledgeTarget>, log: CallLog) {
        self.lock().pending.push(PendingCall { target, log });
    }

    /// Number of calls currently awaiting acknowledgment.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Drain the pending-call list for broadcast, preserving registration
    /// order.
    #[must_use]
    pub fn take_pending(&self) -> Vec<PendingCall> {
        std::mem::take(&mut self.lock().pending)
    }
}
