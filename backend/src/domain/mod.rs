//! Domain primitives, services, and ports for invite-based account pairing.
//!
//! Public surface:
//! - Error / ErrorCode: stable failure payload returned by every operation.
//! - AccountId, Role, CallerContext: identity inputs supplied by the caller.
//! - PairingCode, PairingToken, Connection: the persisted aggregates.
//! - PairingCoordinator: issue, redeem, cancel, and preview invites.
//! - ConnectionDirectory: read-side listings and counters.

pub mod account;
pub mod connection;
pub mod connection_directory;
pub mod error;
pub mod pairing_code;
pub mod pairing_policy;
pub mod pairing_service;
mod pairing_service_support;
pub mod pairing_token;
pub mod ports;

pub use self::account::{AccountId, AccountValidationError, CallerContext, Role, RoleParseError};
pub use self::connection::{
    Connection, ConnectionDraft, ConnectionId, ConnectionStatus, ConnectionStatusParseError,
};
pub use self::connection_directory::ConnectionDirectory;
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::pairing_code::{
    CodeGenerator, PAIRING_CODE_ALPHABET, PAIRING_CODE_LENGTH, PairingCode,
    PairingCodeValidationError, RandomCodeGenerator,
};
pub use self::pairing_policy::{PairingPolicy, PairingPolicyError};
pub use self::pairing_service::PairingCoordinator;
pub use self::pairing_token::{
    CancelOutcome, PairingToken, PairingTokenDraft, PairingTokenValidationError,
    RedemptionRejection, TokenStatus, TokenStatusParseError,
};
