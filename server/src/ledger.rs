//! Verification ledger: pending signups keyed by email.
//!
//! `absent → pending → verified → absent`. Entries live only as long as
//! the process. A fresh signup for the same email overwrites the old code.
//! Codes do not expire.

use dashmap::DashMap;
use rand::Rng;

use crate::error::Rejection;

pub const CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSignup {
    code: String,
    verified: bool,
}

#[derive(Default)]
pub struct VerificationLedger {
    pending: DashMap<String, PendingSignup>,
}

impl VerificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly issued `code` for `email`, replacing any earlier one.
    pub fn issue(&self, email: &str, code: &str) {
        self.pending.insert(
            email.to_owned(),
            PendingSignup {
                code: code.to_owned(),
                verified: false,
            },
        );
    }

    /// Mark `email` verified if `code` matches.
    pub fn verify(&self, email: &str, code: &str) -> Result<(), Rejection> {
        let mut entry = self
            .pending
            .get_mut(email)
            .ok_or(Rejection::NoPendingSignup)?;
        if entry.code != code {
            return Err(Rejection::CodeMismatch);
        }
        entry.verified = true;
        Ok(())
    }

    pub fn is_verified(&self, email: &str) -> bool {
        self.pending
            .get(email)
            .map(|entry| entry.verified)
            .unwrap_or(false)
    }

    /// Remove the entry once the account exists.
    pub fn consume(&self, email: &str) -> bool {
        self.pending.remove(email).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A random numeric code of [`CODE_LEN`] digits.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
