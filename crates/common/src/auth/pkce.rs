//! PKCE (Proof Key for Code Exchange, RFC 7636) primitives
//!
//! The verifier stays on this machine until the token exchange; only its
//! SHA-256 challenge travels in the authorization URL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Raw entropy for verifiers and state tokens.
const RANDOM_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a code verifier: 32 random bytes, URL-safe base64 without
/// padding (43 characters).
#[must_use]
pub fn generate_code_verifier() -> String {
    random_token()
}

/// `BASE64URL(SHA256(ASCII(verifier)))`
#[must_use]
pub fn code_challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate an anti-CSRF state token.
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// Compare a callback state against the one sent with the authorization
/// request without short-circuiting on the first differing byte.
#[must_use]
pub fn states_match(expected: &str, received: &str) -> bool {
    let (a, b) = (expected.as_bytes(), received.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verifier, challenge and state for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Kept secret until the token exchange.
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl PkcePair {
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = code_challenge_for(&code_verifier);
        Self { code_verifier, code_challenge, state: generate_state() }
    }

    /// Always `S256`; the plain method is never offered.
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}
