//! Operator CLI driving the pairing protocol against PostgreSQL.
//!
//! # Examples
//! ```sh
//! pairing-admin --database-url postgres://localhost/pairing migrate
//! pairing-admin --account p1 --role role_a issue
//! pairing-admin --account c1 --role role_b redeem X7K2M9QT
//! pairing-admin --account p1 --role role_a stats
//! ```
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::ffi::OsString;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use pairing::config::PairingSettings;
use pairing::domain::ports::{PairingCommand, PairingQuery, StaticIdentityProvider};
use pairing::domain::{AccountId, CallerContext, ConnectionDirectory, PairingCoordinator, Role};
use pairing::outbound::persistence::{
    DbPool, DieselPairingStore, PoolConfig, run_pending_migrations,
};
use pairing::telemetry;
use serde::Serialize;
use serde_json::json;
use tokio::runtime::Builder;

/// `pairing-admin` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pairing-admin",
    about = "Issue, redeem, and inspect account pairing invites",
    version
)]
struct CliArgs {
    /// Account to act as.
    #[arg(long, global = true, value_name = "id")]
    account: Option<String>,
    /// Role of the acting account.
    #[arg(long, global = true, value_name = "role_a|role_b")]
    role: Option<Role>,
    /// Database connection URL. Falls back to `PAIRING_DATABASE_URL`, then
    /// `DATABASE_URL`.
    #[arg(long = "database-url", global = true, value_name = "url")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Issue a new invite for the acting account.
    Issue,
    /// Redeem an invite code.
    Redeem { code: String },
    /// Cancel one of the acting account's pending invites.
    Cancel { code: String },
    /// Check an invite code without redeeming it.
    Preview { code: String },
    /// List the acting account's invites, newest first.
    Invites,
    /// Show invite counters for the acting account.
    Stats,
    /// List the acting account's connections.
    Connections,
    /// Show which role the acting account can invite.
    Eligibility,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    telemetry::init_tracing();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(async_main(CliArgs::parse()))
}

async fn async_main(args: CliArgs) -> Result<()> {
    let settings = PairingSettings::load_from_iter([OsString::from("pairing-admin")])
        .map_err(|err| eyre!("load pairing settings: {err}"))?;

    if matches!(args.command, Command::Migrate) {
        let database_url = resolve_database_url(
            args.database_url.as_deref(),
            settings.database_url(),
            env::var("DATABASE_URL").ok(),
        )?;
        let applied = run_pending_migrations(&database_url).await?;
        println!("applied {} migration(s)", applied.len());
        for version in applied {
            println!("{version}");
        }
        return Ok(());
    }

    let caller = resolve_caller(args.account, args.role).await?;
    let policy = settings.to_policy()?;
    let database_url = resolve_database_url(
        args.database_url.as_deref(),
        settings.database_url(),
        env::var("DATABASE_URL").ok(),
    )?;
    let pool_config =
        PoolConfig::new(&database_url).with_connection_timeout(policy.store_timeout());
    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("create database pool")?;
    let store = Arc::new(DieselPairingStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let coordinator = PairingCoordinator::new(Arc::clone(&store), clock, policy.clone());
    let directory = ConnectionDirectory::new(store, &policy);
    let me = caller.account_id();

    match args.command {
        Command::Issue => print_json(&coordinator.issue_invite(&caller).await?),
        Command::Redeem { code } => print_json(&coordinator.redeem(&code, &caller).await?),
        Command::Cancel { code } => {
            coordinator.cancel_invite(&code, &caller).await?;
            print_json(&json!({ "cancelled": code }))
        }
        Command::Preview { code } => print_json(&coordinator.preview_invite(&code, &caller).await?),
        Command::Invites => print_json(&directory.list_my_invites(me).await?),
        Command::Stats => print_json(&directory.invite_stats(me).await?),
        Command::Connections => print_json(&directory.list_connections(me).await?),
        Command::Eligibility => print_json(&coordinator.invite_eligibility(&caller)),
        Command::Migrate => Ok(()),
    }
}

async fn resolve_caller(account: Option<String>, role: Option<Role>) -> Result<CallerContext> {
    let identity = match (account, role) {
        (Some(account), Some(role)) => {
            let account = AccountId::new(account).wrap_err("invalid --account")?;
            StaticIdentityProvider::signed_in(account, role)
        }
        _ => StaticIdentityProvider::signed_out(),
    };
    CallerContext::resolve(&identity)
        .await
        .wrap_err("pass both --account and --role")
}

fn resolve_database_url(
    explicit: Option<&str>,
    configured: Option<&str>,
    from_env: Option<String>,
) -> Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(eyre!("--database-url must not be empty when provided"));
        }
        return Ok(value.to_owned());
    }
    if let Some(value) = configured {
        return Ok(value.to_owned());
    }
    from_env
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            eyre!("database URL missing: set --database-url, PAIRING_DATABASE_URL, or DATABASE_URL")
        })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).wrap_err("render output")?;
    println!("{rendered}");
    Ok(())
}
