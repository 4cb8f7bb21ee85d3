use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncCredentials {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SyncCredentials {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.user_id.trim().is_empty()
            && !self.access_token.trim().is_empty()
            && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

pub trait CredentialStore: Send + Sync {
    fn save_credentials(&self, credentials: &SyncCredentials) -> Result<(), InfraError>;
    fn load_credentials(&self) -> Result<Option<SyncCredentials>, InfraError>;
    fn delete_credentials(&self) -> Result<(), InfraError>;
}

pub const DEFAULT_KEYRING_SERVICE: &str = "pomotrack.sync";

/// Stores the credential payload as one JSON secret in the platform keyring.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service_name: String,
    account_name: String,
}

impl KeyringCredentialStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE, "default")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_credentials(&self, credentials: &SyncCredentials) -> Result<(), InfraError> {
        let payload = serde_json::to_string(credentials)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        self.entry()?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_credentials(&self) -> Result<Option<SyncCredentials>, InfraError> {
        let payload = match self.entry()?.get_password() {
            Ok(value) => value,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(error) => return Err(InfraError::Credential(error.to_string())),
        };

        let credentials = serde_json::from_str::<SyncCredentials>(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))?;
        Ok(Some(credentials))
    }

    fn delete_credentials(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<Option<SyncCredentials>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_credentials(&self, credentials: &SyncCredentials) -> Result<(), InfraError> {
        let mut guard = self
            .credentials
            .lock()
            .map_err(|error| InfraError::Lock(format!("credential store: {error}")))?;
        *guard = Some(credentials.clone());
        Ok(())
    }

    fn load_credentials(&self) -> Result<Option<SyncCredentials>, InfraError> {
        let guard = self
            .credentials
            .lock()
            .map_err(|error| InfraError::Lock(format!("credential store: {error}")))?;
        Ok(guard.clone())
    }

    fn delete_credentials(&self) -> Result<(), InfraError> {
        let mut guard = self
            .credentials
            .lock()
            .map_err(|error| InfraError::Lock(format!("credential store: {error}")))?;
        *guard = None;
        Ok(())
    }
}
