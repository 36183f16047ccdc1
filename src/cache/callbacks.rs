//! Cache Event Callbacks
//!
//! Handlers observe cache activity without being able to break it: a handler
//! that returns an error is logged at warn, one that panics is caught and
//! logged at error. Neither reaches the caller of the cache operation.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::engine::ConnectionState;

/// Observable cache events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvent {
    /// Value found in L1 or L2
    GetHit,
    /// Value absent
    GetMiss,
    /// Value written to L2
    SetSuccess,
    /// Write rejected or failed
    SetFailure,
    /// Key removed
    DeleteSuccess,
    /// Pattern invalidation completed
    Invalidate,
    /// Connection state transition
    StateChange,
}

impl std::fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheEvent::GetHit => "get_hit",
            CacheEvent::GetMiss => "get_miss",
            CacheEvent::SetSuccess => "set_success",
            CacheEvent::SetFailure => "set_failure",
            CacheEvent::DeleteSuccess => "delete_success",
            CacheEvent::Invalidate => "invalidate",
            CacheEvent::StateChange => "state_change",
        };
        write!(f, "{}", name)
    }
}

/// Payload handed to every handler
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Event type
    pub event: CacheEvent,
    /// Key or pattern involved, if any
    pub key: Option<String>,
    /// Tier that served a hit ("l1" / "l2")
    pub tier: Option<&'static str>,
    /// Keys removed by an invalidation
    pub affected: Option<u64>,
    /// New connection state for `StateChange`
    pub state: Option<ConnectionState>,
}

impl EventContext {
    /// Context for a key-scoped event
    pub fn for_key(event: CacheEvent, key: &str) -> Self {
        Self {
            event,
            key: Some(key.to_string()),
            tier: None,
            affected: None,
            state: None,
        }
    }

    /// Set the serving tier
    pub fn with_tier(mut self, tier: &'static str) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Set the affected key count
    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = Some(affected);
        self
    }

    /// Context for a state transition
    pub fn state_change(state: ConnectionState) -> Self {
        Self {
            event: CacheEvent::StateChange,
            key: None,
            tier: None,
            affected: None,
            state: Some(state),
        }
    }
}

/// Handle returned by [`CallbackRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(Uuid);

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event handler
pub type Handler = Arc<dyn Fn(&EventContext) -> anyhow::Result<()> + Send + Sync>;

/// Registry of handlers per event
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<CacheEvent, Vec<(CallbackId, Handler)>>>,
}

impl CallbackRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event
    pub fn register<F>(&self, event: CacheEvent, handler: F) -> CallbackId
    where
        F: Fn(&EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = CallbackId(Uuid::new_v4());
        self.handlers
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if the id is unknown
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut handlers = self.handlers.write();
        let mut found = false;
        for list in handlers.values_mut() {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            found |= list.len() != before;
        }
        found
    }

    /// Number of handlers for an event
    pub fn count(&self, event: CacheEvent) -> usize {
        self.handlers.read().get(&event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `ctx.event`
    pub fn emit(&self, ctx: &EventContext) {
        // Clone out so handlers may (un)register without deadlocking
        let handlers: Vec<(CallbackId, Handler)> = match self.handlers.read().get(&ctx.event) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(event = %ctx.event, callback = %id, error = %e, "Cache callback failed");
                }
                Err(_) => {
                    tracing::error!(event = %ctx.event, callback = %id, "Cache callback panicked");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
