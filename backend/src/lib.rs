//! Invite-based account pairing.
//!
//! Accounts of two complementary roles pair up through single-use invite
//! codes. [`domain`] holds the protocol, [`outbound`] the store adapters,
//! [`config`] the layered settings, and [`telemetry`] the tracing setup.

pub mod config;
pub mod domain;
pub mod outbound;
pub mod telemetry;
