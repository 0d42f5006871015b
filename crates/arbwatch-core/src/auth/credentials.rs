use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use keyring::Entry;

/// Keychain service name for stored access tokens
const SERVICE_NAME: &str = "arbwatch";

/// Keychain account under which the access token lives
const TOKEN_ACCOUNT: &str = "access-token";

/// Storage for the bearer token used by the API client.
///
/// Injected into the client at construction so callers choose where the
/// token lives and tests can substitute their own store.
pub trait CredentialStore: Send + Sync {
    /// Current access token, if one is stored.
    fn token(&self) -> Result<Option<String>>;

    /// Persist a new access token, replacing any previous one.
    fn set_token(&self, token: &str) -> Result<()>;

    /// Remove all stored credentials. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

/// Process-local token storage.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn token(&self) -> Result<Option<String>> {
        let guard = self
            .token
            .read()
            .map_err(|_| anyhow!("Credential lock poisoned"))?;
        Ok(guard.clone())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| anyhow!("Credential lock poisoned"))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| anyhow!("Credential lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// Access token stored in the OS keychain.
pub struct KeyringCredentialStore {
    entry: Entry,
}

impl KeyringCredentialStore {
    pub fn new() -> Result<Self> {
        Self::for_account(TOKEN_ACCOUNT)
    }

    /// Use a separate keychain account, e.g. one per API environment.
    pub fn for_account(account: &str) -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, account).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn token(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set_token(&self, token: &str) -> Result<()> {
        self.entry
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
