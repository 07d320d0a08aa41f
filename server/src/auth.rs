//! Credential checks for incoming sessions
//!
//! Sessions only see the [`Authenticator`] trait. The stock implementation,
//! [`CredentialStore`], reads a whitespace-separated `username password`
//! file with an optional `Username Password` header line.

use log::{info, warn};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CREDENTIALS_FILE: &str = "Authentication.txt";

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("failed to read credentials from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| AuthError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self::parse(&contents);
        info!("Loaded {} users from {}", store.len(), path.display());
        Ok(store)
    }

    /// Parses credential file contents. Malformed lines are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut users = HashMap::new();

        for (number, line) in contents.lines().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [] => {}
                [user, pass] if number == 0 && is_header(user, pass) => {}
                [user, pass] => {
                    users.insert(user.to_string(), pass.to_string());
                }
                _ => warn!("Skipping malformed credentials line {}", number + 1),
            }
        }

        Self { users }
    }

    pub fn from_pairs<I, U, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            users: pairs
                .into_iter()
                .map(|(user, pass)| (user.into(), pass.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

fn is_header(user: &str, pass: &str) -> bool {
    user.eq_ignore_ascii_case("username") && pass.eq_ignore_ascii_case("password")
}

impl Authenticator for CredentialStore {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}
