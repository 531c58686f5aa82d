//! Domain types for workplace notifications.
//!
//! Wire-facing structs use camelCase field names to match the REST and push
//! payloads. Role strings are canonicalized in exactly one place,
//! [`Role::canonicalize`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Server-assigned identifier of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Urgency attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Urgent => write!(f, "urgent"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Role of a user inside the workplace.
///
/// Serialized with the canonical wire names (`Staff`, `HR`, `Admin`);
/// deserialization accepts every spelling [`Role::canonicalize`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Staff,
    Hr,
    Admin,
}

impl Role {
    /// Map any role spelling used by the application onto the closed enum.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn canonicalize(raw: &str) -> Option<Role> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "staff" | "employee" => Some(Role::Staff),
            "hr" | "human resource" | "human resources" | "human resource manager"
            | "hr manager" => Some(Role::Hr),
            "admin" | "administrator" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Canonical name, also used as the push-channel room key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "Staff",
            Role::Hr => "HR",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::canonicalize(s)
            .ok_or_else(|| format!("unknown role '{s}'; expected: staff, hr, admin"))
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Server-side time window applied when fetching notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Today,
    #[serde(rename = "last3days")]
    Last3Days,
    #[serde(rename = "last7days")]
    Last7Days,
}

impl Filter {
    /// Value sent as the `filter` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Today => "today",
            Filter::Last3Days => "last3days",
            Filter::Last7Days => "last7days",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "today" => Ok(Filter::Today),
            "last3days" => Ok(Filter::Last3Days),
            "last7days" => Ok(Filter::Last7Days),
            other => Err(format!(
                "unknown filter '{other}'; expected: all, today, last3days, last7days"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A single notification as delivered by REST and the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    /// Present only for personal notifications; broadcasts omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<BTreeSet<UserId>>,
}

impl Notification {
    /// True iff `user` is an explicit recipient.
    pub fn is_personal_to(&self, user: &UserId) -> bool {
        self.recipients
            .as_ref()
            .map(|set| set.contains(user))
            .unwrap_or(false)
    }
}

/// Signed-in user, as persisted by the auth flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
    pub access_token: String,
    #[serde(default = "Utc::now")]
    pub signed_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<UserId>, role: Role, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            access_token: access_token.into(),
            signed_in_at: Utc::now(),
        }
    }

    /// The bearer token, or `None` when it is blank.
    pub fn token(&self) -> Option<&str> {
        let token = self.access_token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// Pure delete guard: only personal notifications may be deleted.
pub fn can_delete(notification: &Notification, session: &Session) -> bool {
    notification.is_personal_to(&session.user_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
