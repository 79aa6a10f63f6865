//! In-memory audit trail of secure variable access.
//!
//! The log keeps the most recent events only. Every event is also emitted on
//! the `audit` tracing target, which is where durable audit output belongs.

use chrono::{DateTime, Utc};
use promptmgr_core::identity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::info;

/// Events kept before the oldest are dropped.
pub const DEFAULT_AUDIT_CAPACITY: usize = 100;

/// Variable name recorded for operations over the whole store.
pub const ALL_VARIABLES: &str = "ALL";

/// What was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Add,
    Get,
    Update,
    Delete,
    List,
    Export,
    Rotate,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Export => "export",
            Self::Rotate => "rotate",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited operation. Never carries secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub variable_name: String,
    pub success: bool,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, variable_name: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            variable_name: variable_name.into(),
            success,
            user: identity::username(),
            details: None,
        }
    }

    /// Stamp the event with `timestamp` instead of the wall clock.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Bounded ring buffer of [`AuditEvent`]s.
#[derive(Debug, Clone)]
pub struct AuditLog {
    events: VecDeque<AuditEvent>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, dropping the oldest one when full.
    pub fn record(&mut self, event: AuditEvent) {
        info!(
            target: "audit",
            action = %event.action,
            variable = %event.variable_name,
            success = event.success,
            user = %event.user,
            details = event.details.as_deref().unwrap_or(""),
            "secure variable access"
        );

        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// The last `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
