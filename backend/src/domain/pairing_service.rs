//! Pairing coordinator: issues, redeems, cancels, and previews invites.
//!
//! The coordinator owns the protocol rules. Atomicity comes from the store:
//! every mutation is a revision-guarded commit, and a commit that loses a race
//! is retried from a fresh read so the loser observes the winner's outcome.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::pairing_service_support::{
    StoreAccess, invalid_code, map_store_error, parse_code, within_deadline,
};
use crate::domain::ports::{
    InviteEligibility, InvitePreview, IssuedInvite, PairingCommand, PairingStore,
    PairingStoreError,
};
use crate::domain::{
    CallerContext, CancelOutcome, CodeGenerator, Connection, ConnectionDraft, Error,
    PairingCode, PairingPolicy, PairingToken, RandomCodeGenerator,
};

/// Domain service implementing [`PairingCommand`].
#[derive(Clone)]
pub struct PairingCoordinator<S> {
    store: Arc<S>,
    generator: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    policy: PairingPolicy,
}

impl<S> PairingCoordinator<S> {
    /// Create a coordinator drawing codes from [`RandomCodeGenerator`].
    ///
    /// # Examples
    /// ```
    /// # use std::sync::Arc;
    /// # use mockable::DefaultClock;
    /// # use pairing::domain::{PairingCoordinator, PairingPolicy};
    /// # use pairing::outbound::memory::InMemoryPairingStore;
    /// let coordinator = PairingCoordinator::new(
    ///     Arc::new(InMemoryPairingStore::default()),
    ///     Arc::new(DefaultClock),
    ///     PairingPolicy::default(),
    /// );
    /// assert_eq!(coordinator.policy().issue_max_attempts(), 10);
    /// ```
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: PairingPolicy) -> Self {
        Self {
            store,
            generator: Arc::new(RandomCodeGenerator),
            clock,
            policy,
        }
    }

    /// Replace the code generator.
    pub fn with_code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn policy(&self) -> &PairingPolicy {
        &self.policy
    }
}

impl<S> PairingCoordinator<S>
where
    S: PairingStore,
{
    async fn read_token(&self, code: &PairingCode) -> Result<PairingToken, Error> {
        within_deadline(
            self.policy.store_timeout(),
            StoreAccess::Read,
            "find_token",
            self.store.find_token(code),
        )
        .await?
        .map_err(map_store_error)?
        .ok_or_else(invalid_code)
    }

    /// Decide whether a failed commit should be retried from a fresh read.
    fn retry_after(&self, error: &PairingStoreError, attempt: u32) -> bool {
        let PairingStoreError::RevisionMismatch { code, expected } = error else {
            return false;
        };
        let retries = self.policy.redeem_conflict_retries();
        if attempt < retries {
            debug!(%code, expected, attempt, "invite changed underneath commit; re-reading");
            true
        } else {
            warn!(%code, expected, retries, "invite commit conflict retries exhausted");
            false
        }
    }
}

#[async_trait]
impl<S> PairingCommand for PairingCoordinator<S>
where
    S: PairingStore,
{
    async fn issue_invite(&self, caller: &CallerContext) -> Result<IssuedInvite, Error> {
        let created_at = self.clock.utc();
        let expires_at = match self.policy.token_ttl() {
            Some(ttl) => Some(created_at.checked_add_signed(ttl).ok_or_else(|| {
                warn!(%created_at, ?ttl, "invite expiry is out of range");
                Error::internal("Could not compute the invite expiry")
            })?),
            None => None,
        };
        let max_attempts = self.policy.issue_max_attempts();

        for attempt in 1..=max_attempts {
            let token =
                PairingToken::issue(self.generator.generate(), caller, created_at, expires_at);
            let created = within_deadline(
                self.policy.store_timeout(),
                StoreAccess::Write,
                "create_token_if_absent",
                self.store.create_token_if_absent(&token),
            )
            .await?
            .map_err(map_store_error)?;

            if created {
                info!(
                    code = %token.code(),
                    issuer = %caller.account_id(),
                    redeemer_role = %token.redeemer_role(),
                    attempt,
                    "invite issued"
                );
                let link = self.policy.link_for(token.code());
                let qr_code_data = token.code().to_string();
                return Ok(IssuedInvite {
                    token,
                    link,
                    qr_code_data,
                });
            }
            warn!(code = %token.code(), attempt, "invite code collided; drawing another");
        }

        warn!(
            issuer = %caller.account_id(),
            attempts = max_attempts,
            "could not find a free invite code"
        );
        Err(
            Error::code_space_exhausted("Could not generate a unique invite code")
                .with_details(json!({ "attempts": max_attempts })),
        )
    }

    async fn redeem(&self, code: &str, caller: &CallerContext) -> Result<Connection, Error> {
        let code = parse_code(code)?;
        let mut attempt = 0;
        loop {
            let token = self.read_token(&code).await?;
            let now = self.clock.utc();
            let redeemed = token.redeem(caller, now).map_err(|rejection| {
                debug!(%code, redeemer = %caller.account_id(), ?rejection, "redemption refused");
                Error::from(rejection)
            })?;
            let draft = ConnectionDraft::pair(&token, caller, now);

            let committed = within_deadline(
                self.policy.store_timeout(),
                StoreAccess::Write,
                "commit_redemption",
                self.store.commit_redemption(&redeemed, &draft),
            )
            .await?;
            match committed {
                Ok(connection) => {
                    info!(
                        %code,
                        issuer = %token.issuer_id(),
                        redeemer = %caller.account_id(),
                        connection_id = %connection.id,
                        "invite redeemed"
                    );
                    return Ok(connection);
                }
                Err(err) if self.retry_after(&err, attempt) => attempt += 1,
                Err(err) => return Err(map_store_error(err)),
            }
        }
    }

    async fn cancel_invite(&self, code: &str, caller: &CallerContext) -> Result<(), Error> {
        let code = parse_code(code)?;
        let mut attempt = 0;
        loop {
            let token = self.read_token(&code).await?;
            let cancelled = match token.cancel(caller.account_id(), self.clock.utc())? {
                CancelOutcome::AlreadyCancelled => {
                    debug!(%code, "invite already cancelled");
                    return Ok(());
                }
                CancelOutcome::Cancelled(cancelled) => cancelled,
            };

            let committed = within_deadline(
                self.policy.store_timeout(),
                StoreAccess::Write,
                "commit_token_update",
                self.store.commit_token_update(&cancelled),
            )
            .await?;
            match committed {
                Ok(_) => {
                    info!(%code, issuer = %caller.account_id(), "invite cancelled");
                    return Ok(());
                }
                Err(err) if self.retry_after(&err, attempt) => attempt += 1,
                Err(err) => return Err(map_store_error(err)),
            }
        }
    }

    async fn preview_invite(
        &self,
        code: &str,
        caller: &CallerContext,
    ) -> Result<InvitePreview, Error> {
        let code = parse_code(code)?;
        let token = self.read_token(&code).await?;
        token.check_redeemable(caller.role(), self.clock.utc())?;
        Ok(InvitePreview {
            code,
            issuer_id: token.issuer_id().clone(),
            issuer_role: token.issuer_role(),
            redeemer_role: token.redeemer_role(),
            expires_at: token.expires_at(),
        })
    }

    fn invite_eligibility(&self, caller: &CallerContext) -> InviteEligibility {
        let invited_role = caller.role().complement();
        InviteEligibility {
            can_invite: true,
            invited_role,
            message: format!("You can invite a {invited_role} account"),
        }
    }
}

#[cfg(test)]
#[path = "pairing_service_tests.rs"]
mod tests;
