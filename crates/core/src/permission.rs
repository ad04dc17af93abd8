//! Capabilities, grants, and operations awaiting human approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A named permission gating a sensitive handler action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    NetworkFetch,
    Crawl,
    FileWrite,
    ExternalApi,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::NetworkFetch => "network-fetch",
            Capability::Crawl => "crawl",
            Capability::FileWrite => "file-write",
            Capability::ExternalApi => "external-api",
        }
    }

    /// Short phrase used in approval prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            Capability::NetworkFetch => "access the web",
            Capability::Crawl => "crawl web pages",
            Capability::FileWrite => "write files",
            Capability::ExternalApi => "call an external API",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network-fetch" => Ok(Capability::NetworkFetch),
            "crawl" => Ok(Capability::Crawl),
            "file-write" => Ok(Capability::FileWrite),
            "external-api" => Ok(Capability::ExternalApi),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// Capabilities granted for the remainder of a conversation.
///
/// A set, so granting the same capability twice never produces a second entry.
/// There is no revoke operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionGrants(BTreeSet<Capability>);

impl PermissionGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a capability. Returns `true` if it was not already granted.
    pub fn grant(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Required capabilities not yet granted, in declaration order.
    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required
            .iter()
            .copied()
            .filter(|c| !self.0.contains(c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

impl FromIterator<Capability> for PermissionGrants {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lifecycle of a [`PendingOperation`]. `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Approved,
    Denied,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

/// An operation awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,

    /// What the handler wants to do (e.g. "web_search", "file_write")
    pub kind: String,

    /// Human-readable description shown in the approval UI
    pub summary: String,

    pub capability_required: Capability,

    pub status: OperationStatus,

    /// Handler that will be resumed on resolution
    pub handler: String,

    /// Checkpoint the handler resumes from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    /// Set when the suspended handler was re-entered after the decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    pub fn new(
        kind: impl Into<String>,
        summary: impl Into<String>,
        capability_required: Capability,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            summary: summary.into(),
            capability_required,
            status: OperationStatus::Pending,
            handler: handler.into(),
            checkpoint_id: None,
            created_at: Utc::now(),
            resolved_at: None,
            resumed_at: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }
}
