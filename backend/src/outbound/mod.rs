//! Outbound adapters implementing the driven ports.
//!
//! - **memory**: process-local `PairingStore`, used by tests and single-node
//!   tooling.
//! - **persistence**: PostgreSQL-backed `PairingStore` using Diesel.
//!
//! Adapters translate between domain types and storage representations and
//! hold no protocol rules.

pub mod memory;
pub mod persistence;
