//! Connections between a RoleA account and a RoleB account.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, CallerContext, PairingToken, Role};

/// Store-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Removed,
}

impl ConnectionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised connection status `{0}`")]
pub struct ConnectionStatusParseError(String);

impl FromStr for ConnectionStatus {
    type Err = ConnectionStatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "removed" => Ok(Self::Removed),
            other => Err(ConnectionStatusParseError(other.to_owned())),
        }
    }
}

/// A connection awaiting its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDraft {
    pub account_a_id: AccountId,
    pub account_b_id: AccountId,
    pub created_by: AccountId,
    pub created_at: DateTime<Utc>,
}

impl ConnectionDraft {
    /// Pair the token's issuer with the redeemer.
    ///
    /// Slots follow roles, not who issued: the RoleA account always lands in
    /// `account_a_id`. `created_by` records the issuer.
    pub fn pair(token: &PairingToken, redeemer: &CallerContext, now: DateTime<Utc>) -> Self {
        let issuer = token.issuer_id().clone();
        let redeemer_id = redeemer.account_id().clone();
        let (account_a_id, account_b_id) = match token.issuer_role() {
            Role::RoleA => (issuer.clone(), redeemer_id),
            Role::RoleB => (redeemer_id, issuer.clone()),
        };
        Self {
            account_a_id,
            account_b_id,
            created_by: issuer,
            created_at: now,
        }
    }
}

/// Durable link between one RoleA and one RoleB account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub account_a_id: AccountId,
    pub account_b_id: AccountId,
    pub created_by: AccountId,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Materialise a freshly committed draft as an `Active` connection.
    pub fn from_draft(id: ConnectionId, draft: ConnectionDraft) -> Self {
        Self {
            id,
            account_a_id: draft.account_a_id,
            account_b_id: draft.account_b_id,
            created_by: draft.created_by,
            status: ConnectionStatus::Active,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        }
    }

    pub fn involves(&self, account: &AccountId) -> bool {
        &self.account_a_id == account || &self.account_b_id == account
    }

    /// The other party, if `account` is one of the two.
    pub fn counterpart(&self, account: &AccountId) -> Option<&AccountId> {
        if &self.account_a_id == account {
            Some(&self.account_b_id)
        } else if &self.account_b_id == account {
            Some(&self.account_a_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairingCode;
    use rstest::rstest;

    fn account(id: &str) -> AccountId {
        AccountId::new(id).expect("valid account id")
    }

    #[rstest]
    fn connection_id_exposes_its_uuid() {
        let raw = Uuid::new_v4();
        let id = ConnectionId::new(raw);
        assert_eq!(id.as_uuid(), &raw);
        assert_eq!(id.to_string(), raw.to_string());
    }

    #[rstest]
    #[case(Role::RoleA, "issuer", "redeemer")]
    #[case(Role::RoleB, "redeemer", "issuer")]
    fn slots_follow_roles(#[case] issuer_role: Role, #[case] a: &str, #[case] b: &str) {
        let now = Utc::now();
        let issuer = CallerContext::new(account("issuer"), issuer_role);
        let redeemer = CallerContext::new(account("redeemer"), issuer_role.complement());
        let token = PairingToken::issue(
            PairingCode::new("ABCD1234").expect("valid code"),
            &issuer,
            now,
            None,
        );

        let draft = ConnectionDraft::pair(&token, &redeemer, now);

        assert_eq!(draft.account_a_id, account(a));
        assert_eq!(draft.account_b_id, account(b));
        assert_eq!(draft.created_by, account("issuer"));
    }

    #[rstest]
    fn counterpart_resolves_either_side() {
        let now = Utc::now();
        let connection = Connection::from_draft(
            ConnectionId::random(),
            ConnectionDraft {
                account_a_id: account("p1"),
                account_b_id: account("c1"),
                created_by: account("p1"),
                created_at: now,
            },
        );

        assert_eq!(connection.status, ConnectionStatus::Active);
        assert_eq!(connection.updated_at, now);
        assert_eq!(connection.counterpart(&account("p1")), Some(&account("c1")));
        assert_eq!(connection.counterpart(&account("c1")), Some(&account("p1")));
        assert!(connection.counterpart(&account("x9")).is_none());
        assert!(!connection.involves(&account("x9")));
    }
}
