//! Account identity primitives supplied by the external identity capability.
//!
//! Accounts are not owned by this crate. The identity provider authenticates a
//! caller and hands back a stable account id plus the account's role; every
//! coordinator call receives that pair explicitly as a [`CallerContext`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Error;
use super::ports::IdentityProvider;

/// Validation errors returned by [`AccountId::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountValidationError {
    #[error("account id must not be empty")]
    EmptyId,
    #[error("account id must not contain surrounding whitespace")]
    UntrimmedId,
}

/// Stable account identifier issued by the identity provider.
///
/// The provider's ids are opaque strings, so the only checks applied here are
/// that the value is non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Validate and construct an [`AccountId`].
    pub fn new(id: impl Into<String>) -> Result<Self, AccountValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AccountValidationError::EmptyId);
        }
        if id.trim() != id {
            return Err(AccountValidationError::UntrimmedId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// One of the two complementary account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    RoleA,
    RoleB,
}

impl Role {
    /// The unique opposite role.
    pub const fn complement(self) -> Self {
        match self {
            Self::RoleA => Self::RoleB,
            Self::RoleB => Self::RoleA,
        }
    }

    /// Stable storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoleA => "role_a",
            Self::RoleB => "role_b",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised role tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised role `{0}`; expected role_a or role_b")]
pub struct RoleParseError(String);

impl FromStr for Role {
    type Err = RoleParseError;

    /// Accepts the storage form (`role_a`) and the short tags (`a`, `A`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "role_a" | "a" => Ok(Self::RoleA),
            "role_b" | "b" => Ok(Self::RoleB),
            _ => Err(RoleParseError(value.to_owned())),
        }
    }
}

/// Authenticated caller passed into every coordinator and directory call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    account_id: AccountId,
    role: Role,
}

impl CallerContext {
    pub fn new(account_id: AccountId, role: Role) -> Self {
        Self { account_id, role }
    }

    /// Build the context from the identity capability.
    ///
    /// Fails with `Unauthenticated` when nobody is signed in or the account has
    /// no role on record, and with `ServiceUnavailable` when the provider
    /// cannot be reached.
    pub async fn resolve(identity: &dyn IdentityProvider) -> Result<Self, Error> {
        let account_id = identity
            .current_account_id()
            .await
            .map_err(|err| {
                tracing::debug!(kind = err.kind(), error = %err, "identity provider lookup failed");
                Error::service_unavailable("identity service is unavailable")
            })?
            .ok_or_else(|| Error::unauthenticated("You must be logged in"))?;

        let role = identity
            .account_role(&account_id)
            .await
            .map_err(|err| {
                tracing::debug!(error = %err, account_id = %account_id, "role lookup failed");
                Error::service_unavailable("identity service is unavailable")
            })?
            .ok_or_else(|| Error::unauthenticated("Your account has no role assigned"))?;

        Ok(Self::new(account_id, role))
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
