//! Driving port for the invite lifecycle.
//!
//! Inbound adapters (the operator CLI, tests, any future transport) call
//! [`PairingCommand`] with an explicit [`CallerContext`] and a raw code string.
//! Codes that fail format validation are reported as `InvalidCode`, the same
//! as codes that simply do not exist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{AccountId, CallerContext, Connection, Error, PairingCode, PairingToken, Role};

/// A freshly issued invite and the ways to share it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvite {
    pub token: PairingToken,
    /// Deep link of the form `<link_base>/<code>`.
    pub link: String,
    /// Payload to encode in a QR code; the bare code.
    pub qr_code_data: String,
}

/// Read-only view of what redeeming a code would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePreview {
    pub code: PairingCode,
    pub issuer_id: AccountId,
    pub issuer_role: Role,
    /// The role the redeemer takes in the resulting connection.
    pub redeemer_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Whether the caller may issue invites, and for which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteEligibility {
    pub can_invite: bool,
    pub invited_role: Role,
    pub message: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingCommand: Send + Sync {
    /// Create a `Pending` invite targeting the caller's complementary role.
    ///
    /// # Errors
    ///
    /// `CodeSpaceExhausted` when every generated code collided,
    /// `ServiceUnavailable` when the store is unreachable, and `Unknown` when
    /// a create timed out with an indeterminate outcome.
    async fn issue_invite(&self, caller: &CallerContext) -> Result<IssuedInvite, Error>;

    /// Consume a pending invite and materialise the connection.
    ///
    /// # Errors
    ///
    /// Checked in order: `InvalidCode`, `AlreadyUsed`, `Expired`,
    /// `RoleConflict`. Persistent write contention ends in `Conflict`.
    async fn redeem(&self, code: &str, caller: &CallerContext) -> Result<Connection, Error>;

    /// Cancel a pending invite on behalf of its issuer.
    ///
    /// Cancelling an already cancelled invite succeeds without writing.
    async fn cancel_invite(&self, code: &str, caller: &CallerContext) -> Result<(), Error>;

    /// Run the redemption checks without writing anything.
    async fn preview_invite(&self, code: &str, caller: &CallerContext)
    -> Result<InvitePreview, Error>;

    /// Report which role the caller's invites will target.
    fn invite_eligibility(&self, caller: &CallerContext) -> InviteEligibility;
}
