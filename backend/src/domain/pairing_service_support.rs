//! Internal helpers shared by the pairing coordinator and directory.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::domain::ports::PairingStoreError;
use crate::domain::{Error, PairingCode};

/// Whether a store call reads or writes; decides how a timeout is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreAccess {
    Read,
    Write,
}

impl StoreAccess {
    fn timeout_error(self, operation: &'static str) -> Error {
        match self {
            // Nothing was written, so the caller can retry freely.
            Self::Read => Error::service_unavailable("The invite service is not responding")
                .with_details(json!({ "operation": operation })),
            // The write may have landed; callers must re-read before retrying.
            Self::Write => Error::unknown(
                "The invite service did not confirm the change; check its status before retrying",
            )
            .with_details(json!({ "operation": operation })),
        }
    }
}

/// Await a store call under `deadline`.
///
/// The outer `Result` carries the timeout; the inner one is the adapter's
/// answer, left unmapped so callers can react to revision mismatches.
pub(crate) async fn within_deadline<T, F>(
    deadline: Duration,
    access: StoreAccess,
    operation: &'static str,
    call: F,
) -> Result<Result<T, PairingStoreError>, Error>
where
    F: Future<Output = Result<T, PairingStoreError>>,
{
    tokio::time::timeout(deadline, call).await.map_err(|_| {
        debug!(operation, ?access, ?deadline, "pairing store call timed out");
        access.timeout_error(operation)
    })
}

pub(crate) fn map_store_error(error: PairingStoreError) -> Error {
    debug!(kind = error.kind(), error = %error, "pairing store call failed");
    match error {
        PairingStoreError::Connection { .. } => {
            Error::service_unavailable("The invite service is temporarily unavailable")
        }
        PairingStoreError::Query { .. } => Error::internal("The invite service failed unexpectedly"),
        PairingStoreError::RevisionMismatch { code, expected } => {
            Error::conflict("This invite was changed by another request; please try again")
                .with_details(json!({ "code": code, "expectedRevision": expected }))
        }
    }
}

pub(crate) fn invalid_code() -> Error {
    Error::invalid_code("Invalid invite code")
}

/// Parse a caller-supplied code. Malformed input is indistinguishable from an
/// unknown code.
pub(crate) fn parse_code(raw: &str) -> Result<PairingCode, Error> {
    PairingCode::new(raw).map_err(|err| {
        debug!(error = %err, "rejecting malformed invite code");
        invalid_code()
    })
}
