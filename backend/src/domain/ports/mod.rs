//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driving ports ([`PairingCommand`], [`PairingQuery`]) are implemented by the
//! domain services. Driven ports ([`PairingStore`], [`IdentityProvider`]) are
//! implemented by adapters under `crate::outbound` or supplied by the host.

mod macros;
pub(crate) use macros::define_port_error;

mod identity_provider;
mod pairing_command;
mod pairing_query;
mod pairing_store;

#[cfg(test)]
pub use identity_provider::MockIdentityProvider;
pub use identity_provider::{IdentityProvider, IdentityProviderError, StaticIdentityProvider};
#[cfg(test)]
pub use pairing_command::MockPairingCommand;
pub use pairing_command::{InviteEligibility, InvitePreview, IssuedInvite, PairingCommand};
#[cfg(test)]
pub use pairing_query::MockPairingQuery;
pub use pairing_query::{InviteStats, PairingQuery};
#[cfg(test)]
pub use pairing_store::MockPairingStore;
pub use pairing_store::{PairingStore, PairingStoreError};
