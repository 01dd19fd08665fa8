use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use fleet_tracker_lib::role::Role;

/// Credential object persisted by the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "_id")]
    pub identity_id: String,
}

impl StoredCredential {
    pub fn new(access_token: impl Into<String>, identity_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            identity_id: identity_id.into(),
        }
    }
}

/// Access to the locally stored credentials, keyed by role.
///
/// Absence or a malformed entry means unauthenticated and is never an
/// error.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, role: Role) -> Option<StoredCredential>;
    fn store(&self, role: Role, credential: &StoredCredential);
    fn clear(&self, role: Role);
}

/// Credential store backed by one JSON file per role key.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user's configuration directory.
    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleet-tracker");
        Self { dir }
    }

    fn path_for(&self, role: Role) -> PathBuf {
        self.dir.join(format!("{}.json", role.storage_key()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn credential(&self, role: Role) -> Option<StoredCredential> {
        let data = fs::read_to_string(self.path_for(role)).ok()?;
        match serde_json::from_str(&data) {
            Ok(credential) => Some(credential),
            Err(err) => {
                warn!("Stored {} credential is malformed: {err}", role.as_str());
                None
            }
        }
    }

    fn store(&self, role: Role, credential: &StoredCredential) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!("Could not create credential directory: {err}");
            return;
        }
        match serde_json::to_vec(credential) {
            Ok(data) => {
                if let Err(err) = fs::write(self.path_for(role), data) {
                    warn!("Could not persist {} credential: {err}", role.as_str());
                }
            }
            Err(err) => warn!("Could not serialize credential: {err}"),
        }
    }

    fn clear(&self, role: Role) {
        let path = self.path_for(role);
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }
}

/// In-memory store for tests and the simulation binary.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<Role, StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credential(&self, role: Role) -> Option<StoredCredential> {
        self.entries.lock().unwrap().get(&role).cloned()
    }

    fn store(&self, role: Role, credential: &StoredCredential) {
        self.entries.lock().unwrap().insert(role, credential.clone());
    }

    fn clear(&self, role: Role) {
        self.entries.lock().unwrap().remove(&role);
    }
}
