//! One-time tokens (account activation).
//!
//! Only the SHA-256 hash of a token is persisted; the plaintext exists in memory
//! long enough to be handed to the notifier.

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::validator::Validator;

pub const SCOPE_ACTIVATION: &str = "activation";

/// Lifetime of an activation token.
pub const ACTIVATION_TTL_DAYS: i64 = 3;

const TOKEN_BYTES: usize = 16;

/// Length of the hex-encoded plaintext.
pub const PLAINTEXT_LEN: usize = TOKEN_BYTES * 2;

/// Token
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: String,
}

/// Generates a random token for `user_id` valid for `ttl`.
pub fn generate_token(user_id: i64, ttl: Duration, scope: &str) -> Token {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);

    Token {
        hash: hash_plaintext(&plaintext),
        plaintext,
        user_id,
        expiry: Utc::now() + ttl,
        scope: scope.to_string(),
    }
}

pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == PLAINTEXT_LEN,
        "token",
        "must be 32 bytes long",
    );
    v.check(
        plaintext.chars().all(|c| c.is_ascii_hexdigit()),
        "token",
        "must be a hexadecimal string",
    );
}
