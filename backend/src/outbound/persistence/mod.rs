//! PostgreSQL persistence for the pairing store.
//!
//! Diesel row structs (`models.rs`) and table definitions (`schema.rs`) stay
//! private to this module; only the store, its pool, and the migration runner
//! are exported.
//!
//! # Example
//!
//! ```ignore
//! use pairing::outbound::persistence::{DbPool, DieselPairingStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/pairing")).await?;
//! let store = DieselPairingStore::new(pool);
//! ```

mod diesel_pairing_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_pairing_store::DieselPairingStore;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
