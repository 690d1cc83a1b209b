use crate::error::{AppError, AppResult};

const COST: u32 = 10;

/// bcrypt hash of an account password, as stored in `users.password_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(plaintext: &str) -> AppResult<Self> {
        bcrypt::hash(plaintext, COST)
            .map(Self)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
    }

    pub fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// A malformed stored hash counts as a mismatch.
    pub fn verify(&self, plaintext: &str) -> bool {
        bcrypt::verify(plaintext, &self.0).unwrap_or(false)
    }
}

/// Hashes on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(plaintext: String) -> AppResult<PasswordHash> {
    tokio::task::spawn_blocking(move || PasswordHash::new(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))?
}

pub async fn verify_password(hash: PasswordHash, plaintext: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || hash.verify(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))
}
