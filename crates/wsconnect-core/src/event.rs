//! Normalized event model.
//!
//! Feeds turn raw Workspace activity records into [`NormalizedEvent`]s. An
//! event is either a resource change (something in the directory changed and
//! should be re-synced) or a usage event (a user authorized an application).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The directory resource types that events can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// A Workspace user account.
    User,
    /// A Workspace group.
    Group,
    /// An administrative role.
    Role,
    /// A third-party application authorized through OAuth.
    App,
}

impl ResourceType {
    /// Returns the stable identifier used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
            Self::App => "app",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a resource by type and durable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: ResourceType,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ResourceRef {
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// The user that performed a usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    /// Durable user id (the activity's profile id).
    pub id: String,
    /// Primary email at the time of the activity.
    pub email: String,
}

/// What a [`NormalizedEvent`] describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A directory resource changed.
    ResourceChange {
        resource_type: ResourceType,
        resource_id: String,
    },
    /// An application was authorized by a user.
    Usage {
        target_resource: ResourceRef,
        actor_resource: ActorRef,
    },
}

/// A feed output event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Provider-assigned unique qualifier of the source activity.
    pub id: String,
    /// When the source activity happened.
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl NormalizedEvent {
    /// Creates a resource change event.
    pub fn resource_change(
        id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        resource_type: ResourceType,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            occurred_at,
            kind: EventKind::ResourceChange {
                resource_type,
                resource_id: resource_id.into(),
            },
        }
    }

    /// Creates a usage event.
    pub fn usage(
        id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        target_resource: ResourceRef,
        actor_resource: ActorRef,
    ) -> Self {
        Self {
            id: id.into(),
            occurred_at,
            kind: EventKind::Usage {
                target_resource,
                actor_resource,
            },
        }
    }

    /// Returns true for resource change events.
    pub fn is_resource_change(&self) -> bool {
        matches!(self.kind, EventKind::ResourceChange { .. })
    }

    /// Returns the changed resource, if this is a resource change event.
    pub fn changed_resource(&self) -> Option<(ResourceType, &str)> {
        match &self.kind {
            EventKind::ResourceChange {
                resource_type,
                resource_id,
            } => Some((*resource_type, resource_id.as_str())),
            EventKind::Usage { .. } => None,
        }
    }
}
