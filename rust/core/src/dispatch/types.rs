use crate::errors::DispatchError;
use crate::routing::HttpMethod;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    RouteMatched,
    ScopeCreated,
    InstanceResolved,
    Invoked,
    Completed,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared cancellation signal for one in-flight request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Request scope lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEvent {
    Created { request_id: u64 },
    Released { request_id: u64, instances: usize },
}

pub type ScopeListener = Arc<dyn Fn(ScopeEvent) + Send + Sync>;

/// State machine of one request as it moves through the dispatcher.
#[derive(Debug)]
pub(crate) struct Exchange {
    request_id: u64,
    method: HttpMethod,
    path: String,
    state: DispatchState,
    trace: Vec<DispatchState>,
}

impl Exchange {
    pub(crate) fn new(request_id: u64, method: HttpMethod, path: &str) -> Self {
        log::trace!("request {} received: {} {}", request_id, method, path);
        Self {
            request_id,
            method,
            path: path.to_string(),
            state: DispatchState::Received,
            trace: vec![DispatchState::Received],
        }
    }

    pub(crate) fn request_id(&self) -> u64 {
        self.request_id
    }

    pub(crate) fn advance(&mut self, next: DispatchState) {
        if self.state.is_terminal() {
            return;
        }
        log::trace!("request {}: {} -> {}", self.request_id, self.state, next);
        self.state = next;
        self.trace.push(next);
    }

    /// Aborts with `Cancelled` once the flag is raised.
    pub(crate) fn checkpoint(&self, cancel: &CancelFlag) -> Result<(), DispatchError> {
        if cancel.is_cancelled() {
            return Err(DispatchError::Cancelled {
                request_id: self.request_id,
            });
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, err: &DispatchError) {
        let status = err.status_code();
        if status >= 500 {
            log::error!(
                "request {} {} {} failed in {} [{}]: {}",
                self.request_id,
                self.method,
                self.path,
                self.state,
                err.code(),
                err
            );
        } else {
            log::debug!(
                "request {} {} {} answered {}: {}",
                self.request_id,
                self.method,
                self.path,
                status,
                err
            );
        }
        self.advance(DispatchState::Failed);
    }

    pub(crate) fn into_trace(self) -> Vec<DispatchState> {
        self.trace
    }
}
