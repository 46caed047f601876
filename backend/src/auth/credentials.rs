use sha2::{Digest, Sha256};

use super::models::{CredentialCheck, Identity, PresentedCredentials};
use crate::db::RepositoryError;
use crate::db::models::User;
use crate::db::user_repository::UserRepository;

const SALT_LEN: usize = 16;

/// Produces `<salt-hex>$<sha256(salt || password)-hex>`.
pub fn hash_secret(password: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!("{}${}", hex::encode(salt), digest(&salt, password))
}

pub fn verify_secret(stored: &str, password: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    constant_time_eq(digest(&salt, password).as_bytes(), expected.as_bytes())
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Validates username/password pairs against the user store.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: UserRepository,
}

impl CredentialVerifier {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Unknown usernames and wrong passwords both yield `None`.
    pub async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, RepositoryError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            log::debug!("No user named '{}'", username);
            return Ok(None);
        };
        if !verify_secret(&user.credential_secret, password) {
            log::debug!("Password mismatch for user '{}'", username);
            return Ok(None);
        }
        Ok(Some(Identity {
            user_id: user.id,
            username: user.username,
        }))
    }

    pub async fn check(
        &self,
        presented: PresentedCredentials,
    ) -> Result<CredentialCheck, RepositoryError> {
        match presented {
            PresentedCredentials::Missing => Ok(CredentialCheck::Absent),
            PresentedCredentials::Malformed => Ok(CredentialCheck::Invalid),
            PresentedCredentials::Basic { username, password } => {
                Ok(match self.verify(&username, &password).await? {
                    Some(identity) => CredentialCheck::Valid(identity),
                    None => CredentialCheck::Invalid,
                })
            }
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, RepositoryError> {
        self.users.create_user(username, &hash_secret(password)).await
    }

    /// Creates the bootstrap account unless a user with that name already exists.
    pub async fn ensure_seed_user(&self, username: &str, password: &str) -> Result<(), RepositoryError> {
        if self.users.find_by_username(username).await?.is_some() {
            log::info!("Seed user '{}' already present", username);
            return Ok(());
        }
        match self.register(username, password).await {
            Ok(_) | Err(RepositoryError::DuplicateUser(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_secret_verifies() {
        let stored = hash_secret("pass");
        assert!(verify_secret(&stored, "pass"));
        assert!(!verify_secret(&stored, "Pass"));
        assert!(!stored.contains("pass"));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(hash_secret("same"), hash_secret("same"));
    }

    #[test]
    fn malformed_stored_secret_never_matches() {
        assert!(!verify_secret("no-separator", "pass"));
        assert!(!verify_secret("zz$abc", "pass"));
    }
}
