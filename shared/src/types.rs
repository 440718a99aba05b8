//! Common value types used across the backend

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Composite identity of a member: the member id plus the branch where the
/// member originally registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberIdentity {
    pub member_id: i64,
    pub registration_branch_id: i64,
}

impl MemberIdentity {
    pub fn new(member_id: i64, registration_branch_id: i64) -> Self {
        Self {
            member_id,
            registration_branch_id,
        }
    }
}

/// JWT subjects encode the identity as `"<member_id>-<branch_id>"`
impl fmt::Display for MemberIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.member_id, self.registration_branch_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("subject claim is not valid")]
pub struct InvalidSubject;

impl FromStr for MemberIdentity {
    type Err = InvalidSubject;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(member), Some(branch), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(InvalidSubject);
        };

        let member_id = member.parse().map_err(|_| InvalidSubject)?;
        let registration_branch_id = branch.parse().map_err(|_| InvalidSubject)?;

        Ok(Self::new(member_id, registration_branch_id))
    }
}

/// Offset pagination with a fixed page size.
///
/// Immutable: [`SimplePagination::next`] returns a new cursor advanced by one
/// page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimplePagination {
    size: u32,
    offset: u64,
}

impl SimplePagination {
    pub fn new(size: u32) -> Self {
        Self { size, offset: 0 }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            size: self.size,
            offset: self.offset + u64::from(self.size),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Success envelope used by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: Option<T>) -> Self {
        let message = message.into();
        Self {
            success: true,
            message: (!message.is_empty()).then_some(message),
            data,
        }
    }
}
