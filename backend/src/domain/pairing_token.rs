//! Pairing token aggregate and its lifecycle transitions.
//!
//! A token is created `Pending` by `IssueInvite` and mutated exactly once,
//! either to `Used` by redemption or to `Cancelled` by its issuer. Transition
//! methods return a fresh value and leave the receiver untouched; persisting
//! the result is the coordinator's job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, CallerContext, Error, PairingCode, Role};

/// Lifecycle status of a pairing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Pending,
    Used,
    Cancelled,
}

impl TokenStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
        }
    }

    /// `Used` and `Cancelled` never transition again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Cancelled)
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised token status `{0}`")]
pub struct TokenStatusParseError(String);

impl FromStr for TokenStatus {
    type Err = TokenStatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "used" => Ok(Self::Used),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TokenStatusParseError(other.to_owned())),
        }
    }
}

/// Errors raised when restoring a token from persisted fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingTokenValidationError {
    #[error("redeemer role {redeemer} does not complement issuer role {issuer}")]
    RolesNotComplementary { issuer: Role, redeemer: Role },
    #[error("used tokens must record the redeemer and redemption time")]
    IncompleteRedemption,
    #[error("only used tokens may record a redeemer")]
    UnexpectedRedemption,
    #[error("cancelled tokens must record the cancellation time")]
    IncompleteCancellation,
    #[error("only cancelled tokens may record a cancellation time")]
    UnexpectedCancellation,
}

/// Why a redemption attempt was refused before any write.
///
/// Ordered the way the checks run: status, then expiry, then role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionRejection {
    AlreadyUsed,
    Expired,
    RoleConflict,
}

impl From<RedemptionRejection> for Error {
    fn from(value: RedemptionRejection) -> Self {
        match value {
            RedemptionRejection::AlreadyUsed => {
                Error::already_used("This invite code has already been used")
            }
            RedemptionRejection::Expired => Error::expired("This invite code has expired"),
            RedemptionRejection::RoleConflict => {
                Error::role_conflict("Cannot connect users of the same type")
            }
        }
    }
}

/// Outcome of [`PairingToken::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The token moved from `Pending` to `Cancelled`; persist it.
    Cancelled(PairingToken),
    /// The token was already cancelled; nothing to write.
    AlreadyCancelled,
}

/// Persisted fields used to rebuild a [`PairingToken`].
#[derive(Debug, Clone)]
pub struct PairingTokenDraft {
    pub code: PairingCode,
    pub issuer_id: AccountId,
    pub issuer_role: Role,
    pub redeemer_role: Role,
    pub status: TokenStatus,
    pub redeemed_by: Option<AccountId>,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub revision: u32,
}

/// A single-use invite.
///
/// ## Invariants
/// - `redeemer_role == issuer_role.complement()`.
/// - `redeemed_by` and `redeemed_at` are set exactly when `status == Used`.
/// - `cancelled_at` is set exactly when `status == Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingToken {
    code: PairingCode,
    issuer_id: AccountId,
    issuer_role: Role,
    redeemer_role: Role,
    status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    redeemed_by: Option<AccountId>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redeemed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancelled_at: Option<DateTime<Utc>>,
    revision: u32,
}

impl PairingToken {
    /// A fresh `Pending` token targeting the issuer's complementary role.
    pub fn issue(
        code: PairingCode,
        issuer: &CallerContext,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            code,
            issuer_id: issuer.account_id().clone(),
            issuer_role: issuer.role(),
            redeemer_role: issuer.role().complement(),
            status: TokenStatus::Pending,
            redeemed_by: None,
            created_at,
            redeemed_at: None,
            expires_at,
            cancelled_at: None,
            revision: 0,
        }
    }

    /// Rebuild a token from storage, rejecting rows that break the invariants.
    pub fn restore(draft: PairingTokenDraft) -> Result<Self, PairingTokenValidationError> {
        let PairingTokenDraft {
            code,
            issuer_id,
            issuer_role,
            redeemer_role,
            status,
            redeemed_by,
            created_at,
            redeemed_at,
            expires_at,
            cancelled_at,
            revision,
        } = draft;

        if redeemer_role != issuer_role.complement() {
            return Err(PairingTokenValidationError::RolesNotComplementary {
                issuer: issuer_role,
                redeemer: redeemer_role,
            });
        }

        let redeemed = redeemed_by.is_some() || redeemed_at.is_some();
        match status {
            TokenStatus::Used if redeemed_by.is_none() || redeemed_at.is_none() => {
                return Err(PairingTokenValidationError::IncompleteRedemption);
            }
            TokenStatus::Pending | TokenStatus::Cancelled if redeemed => {
                return Err(PairingTokenValidationError::UnexpectedRedemption);
            }
            _ => {}
        }
        match (status, cancelled_at) {
            (TokenStatus::Cancelled, None) => {
                return Err(PairingTokenValidationError::IncompleteCancellation);
            }
            (TokenStatus::Pending | TokenStatus::Used, Some(_)) => {
                return Err(PairingTokenValidationError::UnexpectedCancellation);
            }
            _ => {}
        }

        Ok(Self {
            code,
            issuer_id,
            issuer_role,
            redeemer_role,
            status,
            redeemed_by,
            created_at,
            redeemed_at,
            expires_at,
            cancelled_at,
            revision,
        })
    }

    /// Return a copy carrying the given store revision.
    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn code(&self) -> &PairingCode {
        &self.code
    }

    pub fn issuer_id(&self) -> &AccountId {
        &self.issuer_id
    }

    pub fn issuer_role(&self) -> Role {
        self.issuer_role
    }

    pub fn redeemer_role(&self) -> Role {
        self.redeemer_role
    }

    pub fn status(&self) -> TokenStatus {
        self.status
    }

    pub fn redeemed_by(&self) -> Option<&AccountId> {
        self.redeemed_by.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn redeemed_at(&self) -> Option<DateTime<Utc>> {
        self.redeemed_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Store revision observed when this value was read.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// True once `now` reaches the expiry instant. Tokens without an expiry
    /// never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Run the redemption checks for a caller holding `role`.
    pub fn check_redeemable(
        &self,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(), RedemptionRejection> {
        if self.status.is_terminal() {
            return Err(RedemptionRejection::AlreadyUsed);
        }
        if self.is_expired(now) {
            return Err(RedemptionRejection::Expired);
        }
        if role != self.redeemer_role {
            return Err(RedemptionRejection::RoleConflict);
        }
        Ok(())
    }

    /// The `Used` form of this token, redeemed by `redeemer` at `now`.
    pub fn redeem(
        &self,
        redeemer: &CallerContext,
        now: DateTime<Utc>,
    ) -> Result<Self, RedemptionRejection> {
        self.check_redeemable(redeemer.role(), now)?;
        Ok(Self {
            status: TokenStatus::Used,
            redeemed_by: Some(redeemer.account_id().clone()),
            redeemed_at: Some(now),
            ..self.clone()
        })
    }

    /// Cancel on behalf of `requester`.
    ///
    /// Only the issuer may cancel, and a used token stays used.
    pub fn cancel(&self, requester: &AccountId, now: DateTime<Utc>) -> Result<CancelOutcome, Error> {
        if &self.issuer_id != requester {
            return Err(Error::permission_denied(
                "You can only delete your own invites",
            ));
        }
        match self.status {
            TokenStatus::Used => Err(Error::already_used("Cannot delete a used invite")),
            TokenStatus::Cancelled => Ok(CancelOutcome::AlreadyCancelled),
            TokenStatus::Pending => Ok(CancelOutcome::Cancelled(Self {
                status: TokenStatus::Cancelled,
                cancelled_at: Some(now),
                ..self.clone()
            })),
        }
    }
}
