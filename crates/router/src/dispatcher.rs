//! Dispatcher — one bounded, cancellable call into a handler.
//!
//! Holds no business logic. The call runs on its own task so a panicking
//! handler becomes a `HandlerError` instead of tearing down the turn.

use std::sync::Arc;
use std::time::Duration;
use switchyard_core::error::HandlerError;
use switchyard_core::{
    Checkpoint, Envelope, Error, Handler, HandlerContext, HandlerOutcome, ResumeSignal, Result,
};
use tracing::{debug, warn};

/// Whether a handler is entered fresh or re-entered from a checkpoint.
#[derive(Debug, Clone)]
pub enum Entry {
    Invoke,
    Resume {
        checkpoint: Box<Checkpoint>,
        signal: ResumeSignal,
    },
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run the handler to an outcome.
    ///
    /// Fails with `HandlerError::Timeout` past the deadline, and with
    /// `Error::Cancelled` if the caller's stream closes first. Either way
    /// the handler task is aborted.
    pub async fn dispatch(
        &self,
        handler: Arc<dyn Handler>,
        envelope: Envelope,
        ctx: HandlerContext,
        entry: Entry,
        deadline: Option<Duration>,
    ) -> Result<HandlerOutcome> {
        let name = handler.name().to_string();
        let timeout = deadline.unwrap_or(self.default_timeout);
        let sink = ctx.sink.clone();

        debug!(handler = %name, timeout_ms = timeout.as_millis() as u64, "Dispatching");
        let mut task = tokio::spawn(async move {
            match entry {
                Entry::Invoke => handler.invoke(&envelope, &ctx).await,
                Entry::Resume { checkpoint, signal } => {
                    handler.resume(&envelope, &checkpoint, signal, &ctx).await
                }
            }
        });

        tokio::select! {
            biased;
            _ = sink.closed() => {
                task.abort();
                warn!(handler = %name, "Caller went away, cancelling handler");
                Err(Error::Cancelled)
            }
            joined = tokio::time::timeout(timeout, &mut task) => match joined {
                Ok(Ok(outcome)) => outcome.map_err(Error::Handler),
                Ok(Err(join_error)) => {
                    let reason = if join_error.is_panic() {
                        "handler panicked".to_string()
                    } else {
                        join_error.to_string()
                    };
                    Err(Error::Handler(HandlerError::ExecutionFailed {
                        handler: name,
                        reason,
                    }))
                }
                Err(_) => {
                    task.abort();
                    Err(Error::Handler(HandlerError::Timeout {
                        handler: name,
                        timeout_ms: timeout.as_millis() as u64,
                    }))
                }
            }
        }
    }
}
