//! Row types shared by the store, the authorization gate and the allocator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_GROUP_OWNER: &str = "group_owner";
pub const ROLE_PLAYER: &str = "player";

/// Role names known to the seeded catalog.
pub const KNOWN_ROLES: [&str; 3] = [ROLE_ADMIN, ROLE_GROUP_OWNER, ROLE_PLAYER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "on-going")]
    Ongoing,
    #[serde(rename = "completed")]
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Ongoing => "on-going",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "on-going" => Ok(SessionStatus::Ongoing),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("invalid session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    /// Denormalized primary role. `user_roles` is authoritative; this is refreshed
    /// whenever memberships change and is only ever used as a fast-path reject.
    pub primary_role: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub description: String,
    pub status: SessionStatus,
    pub max_members: i64,
    #[serde(default)]
    pub date_time: Option<DateTime<Utc>>,
    pub created_by: String,
}

impl SessionRecord {
    /// Attendance may only change while the session is open.
    pub fn can_attend(&self) -> bool { self.status == SessionStatus::Open }
}

/// One reservation. At most one row exists per `(session_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    pub session_id: String,
    pub user_id: String,
    pub slot: i64,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub remark: String,
}

/// Session row together with its approved occupancy at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionRecord,
    pub occupied: i64,
    pub attendees: Vec<AttendeeRecord>,
}
