//! Password hashing and verification using keyed Argon2id

use crate::config::PasswordHashConfig;
use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version,
};
use std::sync::Arc;

const OUTPUT_LEN: usize = 32;

/// Hashes `"{id}+{email}+{password}"` with a server-side secret.
///
/// Binding the member id and email into the input means a stored hash cannot
/// be replayed onto another account.
pub struct PasswordService {
    secret: Vec<u8>,
    params: Params,
}

impl PasswordService {
    pub fn new(secret: &str, config: &PasswordHashConfig) -> AppResult<Self> {
        if secret.is_empty() {
            return Err(AppError::Config("PASSWORD_SECRET is empty".into()));
        }
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(OUTPUT_LEN),
        )
        .map_err(|e| AppError::Config(format!("argon2 params: {e}")))?;

        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            params,
        })
    }

    fn argon2(&self) -> AppResult<Argon2<'_>> {
        Argon2::new_with_secret(
            &self.secret,
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|e| AppError::Internal(format!("argon2 init: {e}")))
    }

    /// Hash with a random salt. Returns a PHC string.
    pub fn hash(&self, id: &str, email: &str, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(rand::thread_rng());
        self.hash_with_salt(id, email, password, &salt)
    }

    pub fn hash_with_salt(
        &self,
        id: &str,
        email: &str,
        password: &str,
        salt: &SaltString,
    ) -> AppResult<String> {
        let material = material(id, email, password);
        let hash = self
            .argon2()?
            .hash_password(material.as_bytes(), salt)
            .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` for a wrong password, `Err` for an unreadable stored hash.
    pub fn verify(&self, id: &str, email: &str, password: &str, stored: &str) -> AppResult<bool> {
        let parsed = PasswordHash::new(stored)
            .map_err(|_| AppError::Internal("invalid password hash format".into()))?;
        let material = material(id, email, password);

        match self.argon2()?.verify_password(material.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!("failed to verify password: {e}"))),
        }
    }
}

/// Runs hashing off the async workers.
pub async fn hash_blocking(
    service: Arc<PasswordService>,
    id: String,
    email: String,
    password: String,
) -> AppResult<String> {
    tokio::task::spawn_blocking(move || service.hash(&id, &email, &password))
        .await
        .map_err(|e| AppError::Internal(format!("hash task: {e}")))?
}

pub async fn verify_blocking(
    service: Arc<PasswordService>,
    id: String,
    email: String,
    password: String,
    stored: String,
) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || service.verify(&id, &email, &password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("verify task: {e}")))?
}

fn material(id: &str, email: &str, password: &str) -> String {
    format!("{}+{}+{}", id, email, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        let cheap = PasswordHashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        PasswordService::new("pepper-for-tests", &cheap).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let passwords = service();
        let hash = passwords.hash("01HZX", "ann@example.com", "abc12!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(passwords.verify("01HZX", "ann@example.com", "abc12!", &hash).unwrap());
    }

    #[test]
    fn test_any_changed_input_fails() {
        let passwords = service();
        let hash = passwords.hash("01HZX", "ann@example.com", "abc12!").unwrap();
        assert!(!passwords.verify("01HZY", "ann@example.com", "abc12!", &hash).unwrap());
        assert!(!passwords.verify("01HZX", "bob@example.com", "abc12!", &hash).unwrap());
        assert!(!passwords.verify("01HZX", "ann@example.com", "abc12?", &hash).unwrap());
    }

    #[test]
    fn test_explicit_salt_is_deterministic() {
        let passwords = service();
        let salt = SaltString::encode_b64(b"0123456789abcdef").unwrap();
        let a = passwords.hash_with_salt("id", "e@example.com", "abc12!", &salt).unwrap();
        let b = passwords.hash_with_salt("id", "e@example.com", "abc12!", &salt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_secret_is_part_of_the_hash() {
        let passwords = service();
        let other = PasswordService::new(
            "different-pepper",
            &PasswordHashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        )
        .unwrap();
        let hash = passwords.hash("id", "e@example.com", "abc12!").unwrap();
        assert!(!other.verify("id", "e@example.com", "abc12!", &hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(service().verify("id", "e", "p", "not-a-phc-string").is_err());
    }
}
