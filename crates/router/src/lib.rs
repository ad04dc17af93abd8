//! Orchestration tier for switchyard.
//!
//! A turn flows through the [`ContextAssembler`], the routing rules in
//! [`Router`], the [`PermissionGate`] and the [`Dispatcher`], and ends with
//! the conversation persisted and a terminal chunk streamed. Turns for one
//! conversation are serialized by [`TurnLocks`]; turns for different
//! conversations run concurrently.

pub mod assembler;
pub mod dispatcher;
pub mod gate;
pub mod router;
pub mod serialize;

pub use assembler::{AssemblyReport, ContextAssembler, DropInfo, DropReason};
pub use dispatcher::Dispatcher;
pub use gate::{PermissionGate, Resolution};
pub use router::{DependencyStatus, HealthReport, MetadataPatch, Router, TurnOutcome};
pub use serialize::TurnLocks;

#[cfg(test)]
pub(crate) mod test_support;
