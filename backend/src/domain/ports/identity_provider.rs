//! Driven port for the external identity capability.
//!
//! Credential verification lives outside this crate. The provider only reports
//! who is signed in and which role that account holds.

use async_trait::async_trait;

use crate::domain::{AccountId, Role};

use super::define_port_error;

define_port_error! {
    /// Errors raised by identity provider adapters.
    pub enum IdentityProviderError {
        /// The provider could not answer.
        Unavailable { message: String } =>
            "identity provider unavailable: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The authenticated account, or `None` when nobody is signed in.
    async fn current_account_id(&self) -> Result<Option<AccountId>, IdentityProviderError>;

    /// The role on record for `account`, if any.
    async fn account_role(&self, account: &AccountId)
    -> Result<Option<Role>, IdentityProviderError>;
}

/// Provider with a fixed answer, for operator tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    current: Option<(AccountId, Role)>,
}

impl StaticIdentityProvider {
    pub fn signed_in(account: AccountId, role: Role) -> Self {
        Self {
            current: Some((account, role)),
        }
    }

    pub fn signed_out() -> Self {
        Self { current: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_account_id(&self) -> Result<Option<AccountId>, IdentityProviderError> {
        Ok(self.current.as_ref().map(|(account, _)| account.clone()))
    }

    async fn account_role(
        &self,
        account: &AccountId,
    ) -> Result<Option<Role>, IdentityProviderError> {
        Ok(self
            .current
            .as_ref()
            .filter(|(current, _)| current == account)
            .map(|(_, role)| *role))
    }
}
