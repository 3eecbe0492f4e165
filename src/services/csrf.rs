use base64::{engine::general_purpose, Engine as _};
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The size of the CSRF token in bytes.
const CSRF_TOKEN_SIZE: usize = 32;

/// The header a state-changing request must carry the token in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Generates a new random CSRF token, URL-safe base64 encoded.
pub fn generate_csrf_token() -> String {
    let mut token = [0u8; CSRF_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);
    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// The portal's current CSRF token. Rotated whenever the session changes
/// hands, so a token read before sign-in or sign-out stops working.
#[derive(Clone)]
pub struct CsrfToken {
    current: Arc<RwLock<String>>,
}

impl CsrfToken {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(generate_csrf_token())),
        }
    }

    pub fn current(&self) -> String {
        self.current.read().clone()
    }

    /// Replaces the token and returns the new one.
    pub fn rotate(&self) -> String {
        let token = generate_csrf_token();
        *self.current.write() = token.clone();
        tracing::debug!("🔐 CSRF token rotated");
        token
    }

    /// Compares in constant time.
    pub fn verify(&self, candidate: &str) -> bool {
        let current = self.current.read();
        current.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}
