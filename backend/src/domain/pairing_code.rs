//! Pairing codes and the generator that draws them.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of symbols in every pairing code.
pub const PAIRING_CODE_LENGTH: usize = 8;

/// Symbols a pairing code may contain: uppercase ASCII letters and digits.
pub const PAIRING_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Validation errors returned by [`PairingCode::new`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingCodeValidationError {
    #[error("pairing code must not be empty")]
    Empty,
    #[error("pairing code must be {expected} characters, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("pairing code contains `{character}`; only A-Z and 0-9 are allowed")]
    InvalidCharacter { character: char },
}

/// Single-use invite code; the primary key of a pairing token.
///
/// Codes are case-sensitive as stored, so `abcd1234` is rejected rather than
/// upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairingCode(String);

impl PairingCode {
    /// Validate and construct a [`PairingCode`].
    pub fn new(raw: impl Into<String>) -> Result<Self, PairingCodeValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PairingCodeValidationError::Empty);
        }
        if let Some(character) = raw
            .chars()
            .find(|c| !c.is_ascii() || !PAIRING_CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(PairingCodeValidationError::InvalidCharacter { character });
        }
        if raw.len() != PAIRING_CODE_LENGTH {
            return Err(PairingCodeValidationError::WrongLength {
                expected: PAIRING_CODE_LENGTH,
                actual: raw.len(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for PairingCode {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PairingCode> for String {
    fn from(value: PairingCode) -> Self {
        value.0
    }
}

impl TryFrom<String> for PairingCode {
    type Error = PairingCodeValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Source of candidate pairing codes.
///
/// Generators are not responsible for uniqueness; the coordinator guards that
/// with the store's create-if-absent primitive.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> PairingCode;
}

/// Draws codes uniformly from [`PAIRING_CODE_ALPHABET`] using the thread-local
/// RNG (36^8, roughly 2.8e12 combinations).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> PairingCode {
        let mut rng = rand::thread_rng();
        let code = (0..PAIRING_CODE_LENGTH)
            .map(|_| {
                let index = rng.gen_range(0..PAIRING_CODE_ALPHABET.len());
                char::from(PAIRING_CODE_ALPHABET[index])
            })
            .collect::<String>();
        PairingCode(code)
    }
}
