//! Identity lifecycle events.
//!
//! Every mutating session call is bracketed by an [`EventPhase::Pre`] and an
//! [`EventPhase::Post`] event. Listeners are registered on the session when
//! it is built and select the [`EventCategory`] values they handle.
//!
//! A listener failing a `Pre` event aborts the operation before the store is
//! touched. Failures on `Post` events are logged and ignored, because the
//! store has already applied the change.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idm_core::Result;
use idm_model::RelationshipKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event categories a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    /// User and group lifecycle, attribute and credential updates.
    IdentityType,
    /// Memberships and roles.
    Relationship,
    /// Role type lifecycle.
    RoleType,
}

/// Whether an event precedes or follows the store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    /// Before the store is called.
    Pre,
    /// After the store call succeeded.
    Post,
}

/// What happened to the subject of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    /// The subject was created.
    Created,
    /// The subject was removed.
    Removed,
    /// Attributes, credentials or properties of the subject changed.
    Updated,
}

/// Category-specific event content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// A user or group.
    IdentityType {
        /// What happened.
        action: EventAction,
        /// Identity object type name.
        identity_type: String,
        /// User id or group key.
        name: String,
    },
    /// A membership or role edge.
    Relationship {
        /// What happened.
        action: EventAction,
        /// Relationship kind.
        kind: RelationshipKind,
        /// Parent side (group key).
        from: String,
        /// Child side (group key or user id).
        to: String,
        /// Role type name for role edges.
        name: Option<String>,
    },
    /// A role type.
    RoleType {
        /// What happened.
        action: EventAction,
        /// Role type name.
        name: String,
    },
}

impl EventPayload {
    /// Creates an identity payload.
    #[must_use]
    pub fn identity(
        action: EventAction,
        identity_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::IdentityType {
            action,
            identity_type: identity_type.into(),
            name: name.into(),
        }
    }

    /// Creates a relationship payload.
    #[must_use]
    pub fn relationship(
        action: EventAction,
        kind: RelationshipKind,
        from: impl Into<String>,
        to: impl Into<String>,
        name: Option<&str>,
    ) -> Self {
        Self::Relationship {
            action,
            kind,
            from: from.into(),
            to: to.into(),
            name: name.map(String::from),
        }
    }

    /// Creates a role type payload.
    #[must_use]
    pub fn role_type(action: EventAction, name: impl Into<String>) -> Self {
        Self::RoleType {
            action,
            name: name.into(),
        }
    }

    /// Returns the category of this payload.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::IdentityType { .. } => EventCategory::IdentityType,
            Self::Relationship { .. } => EventCategory::Relationship,
            Self::RoleType { .. } => EventCategory::RoleType,
        }
    }

    /// Returns the action of this payload.
    #[must_use]
    pub const fn action(&self) -> EventAction {
        match self {
            Self::IdentityType { action, .. }
            | Self::Relationship { action, .. }
            | Self::RoleType { action, .. } => *action,
        }
    }
}

/// An identity event as delivered to listeners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
    /// Session that raised the event.
    pub session_id: Uuid,
    /// Pre or post.
    pub phase: EventPhase,
    /// What the event is about.
    pub payload: EventPayload,
}

impl IdentityEvent {
    /// Creates an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(session_id: Uuid, phase: EventPhase, payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            session_id,
            phase,
            payload,
        }
    }

    /// Returns the event category.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        self.payload.category()
    }
}

// ============================================================================
// Listener Trait
// ============================================================================

/// Receives identity events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Whether this listener wants events of a category.
    fn handles(&self, _category: EventCategory) -> bool {
        true
    }

    /// Handles an event.
    ///
    /// ## Errors
    ///
    /// An error on a `Pre` event aborts the operation.
    async fn on_event(&self, event: &IdentityEvent) -> Result<()>;
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Delivers events to the listeners registered on a session.
#[derive(Clone)]
pub struct EventDispatcher {
    session_id: Uuid,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("session_id", &self.session_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher without listeners.
    #[must_use]
    pub const fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener.
    pub fn register(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Raises the `Pre` event of an operation.
    ///
    /// ## Errors
    ///
    /// Returns the first listener error; later listeners are not called.
    pub async fn pre(&self, payload: &EventPayload) -> Result<()> {
        let event = IdentityEvent::new(self.session_id, EventPhase::Pre, payload.clone());
        for listener in self.interested(event.category()) {
            listener.on_event(&event).await?;
        }
        Ok(())
    }

    /// Raises the `Post` event of an operation.
    pub async fn post(&self, payload: &EventPayload) {
        let event = IdentityEvent::new(self.session_id, EventPhase::Post, payload.clone());
        for listener in self.interested(event.category()) {
            if let Err(e) = listener.on_event(&event).await {
                tracing::warn!(
                    event_id = %event.id,
                    category = ?event.category(),
                    error = %e,
                    "Event listener failed after the operation completed"
                );
            }
        }
    }

    fn interested(&self, category: EventCategory) -> impl Iterator<Item = &Arc<dyn EventListener>> {
        self.listeners.iter().filter(move |l| l.handles(category))
    }
}

// ============================================================================
// In-Memory Listener (for testing)
// ============================================================================

/// Listener that records events, optionally for a subset of categories.
#[derive(Debug, Default)]
pub struct InMemoryEventListener {
    categories: Option<Vec<EventCategory>>,
    events: RwLock<Vec<IdentityEvent>>,
}

impl InMemoryEventListener {
    /// Creates a listener recording every category.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a listener recording only the given categories.
    #[must_use]
    pub fn only(categories: &[EventCategory]) -> Self {
        Self {
            categories: Some(categories.to_vec()),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<IdentityEvent> {
        self.events.read().clone()
    }

    /// Clears the recorded events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventListener for InMemoryEventListener {
    fn handles(&self, category: EventCategory) -> bool {
        self.categories
            .as_ref()
            .map_or(true, |categories| categories.contains(&category))
    }

    async fn on_event(&self, event: &IdentityEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Tracing Listener
// ============================================================================

/// Listener that writes every event to the tracing framework at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl TracingEventListener {
    /// Creates a new tracing listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventListener for TracingEventListener {
    async fn on_event(&self, event: &IdentityEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            session_id = %event.session_id,
            phase = ?event.phase,
            category = ?event.category(),
            action = ?event.payload.action(),
            payload = ?event.payload,
            "identity_event"
        );
        Ok(())
    }
}
