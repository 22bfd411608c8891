//! Saved connection profiles, bookmarks and key references.
//!
//! The engine does not persist or encrypt credentials. Hosts plug their own
//! storage in through [`ProfileStore`] and [`KeyStore`]; [`resolve_config`]
//! turns a saved profile into a [`ConnectionConfig`] ready for `connect`.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{ConnectionConfig, Protocol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

// ─── Records ─────────────────────────────────────────────────────────

/// A saved server profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Key looked up in the [`KeyStore`] at connect time.
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub preserve_timestamps: bool,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub implicit_tls: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl SavedProfile {
    pub fn new(
        name: impl Into<String>,
        protocol: Protocol,
        host: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            protocol,
            host: host.into(),
            port: 0,
            username: username.into(),
            password: None,
            key_id: None,
            preserve_timestamps: false,
            accept_invalid_certs: false,
            implicit_tls: false,
            created_at: Utc::now(),
        }
    }
}

/// A remote location saved under a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(default)]
    pub id: String,
    pub profile_id: String,
    pub label: String,
    pub remote_path: String,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Where a private key lives and how to unlock it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyRef {
    pub path: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

// ─── Collaborator traits ─────────────────────────────────────────────

pub trait ProfileStore: Send + Sync {
    /// Store a profile. An empty id is replaced with a fresh one; the id
    /// actually used is returned.
    fn create_profile(&self, profile: SavedProfile) -> TransferResult<String>;
    fn get_profile(&self, id: &str) -> TransferResult<SavedProfile>;
    fn list_profiles(&self) -> TransferResult<Vec<SavedProfile>>;
    /// Deletes the profile's bookmarks too.
    fn delete_profile(&self, id: &str) -> TransferResult<()>;

    fn create_bookmark(&self, bookmark: Bookmark) -> TransferResult<String>;
    fn get_bookmark(&self, id: &str) -> TransferResult<Bookmark>;
    fn list_bookmarks(&self, profile_id: Option<&str>) -> TransferResult<Vec<Bookmark>>;
    fn delete_bookmark(&self, id: &str) -> TransferResult<()>;
}

pub trait KeyStore: Send + Sync {
    fn key(&self, key_id: &str) -> TransferResult<KeyRef>;
}

/// Build the connection config for a saved profile.
pub fn resolve_config(
    profiles: &dyn ProfileStore,
    keys: &dyn KeyStore,
    profile_id: &str,
) -> TransferResult<ConnectionConfig> {
    let profile = profiles.get_profile(profile_id)?;
    let mut config = ConnectionConfig::new(profile.protocol, profile.host, profile.username);
    config.port = profile.port;
    config.password = profile.password;
    config.preserve_timestamps = profile.preserve_timestamps;
    config.accept_invalid_certs = profile.accept_invalid_certs;
    config.implicit_tls = profile.implicit_tls;
    config.label = Some(profile.name);
    if let Some(key_id) = profile.key_id.as_deref() {
        let key = keys.key(key_id)?;
        config.private_key_path = Some(key.path);
        config.passphrase = key.passphrase;
    }
    Ok(config)
}

// ─── In-memory implementations ───────────────────────────────────────

#[derive(Default)]
struct Records {
    profiles: BTreeMap<String, SavedProfile>,
    bookmarks: BTreeMap<String, Bookmark>,
}

/// Process-local [`ProfileStore`] for embedding and tests.
#[derive(Default)]
pub struct InMemoryProfileStore {
    records: Mutex<Records>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn assign_id(id: &mut String) -> String {
    if id.trim().is_empty() {
        *id = Uuid::new_v4().to_string();
    }
    id.clone()
}

impl ProfileStore for InMemoryProfileStore {
    fn create_profile(&self, mut profile: SavedProfile) -> TransferResult<String> {
        if profile.host.trim().is_empty() {
            return Err(TransferError::invalid("Profile host must not be empty"));
        }
        let id = assign_id(&mut profile.id);
        self.records().profiles.insert(id.clone(), profile);
        Ok(id)
    }

    fn get_profile(&self, id: &str) -> TransferResult<SavedProfile> {
        self.records()
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::not_found(format!("Profile '{}' not found", id)))
    }

    fn list_profiles(&self) -> TransferResult<Vec<SavedProfile>> {
        Ok(self.records().profiles.values().cloned().collect())
    }

    fn delete_profile(&self, id: &str) -> TransferResult<()> {
        let mut records = self.records();
        records
            .profiles
            .remove(id)
            .ok_or_else(|| TransferError::not_found(format!("Profile '{}' not found", id)))?;
        records.bookmarks.retain(|_, b| b.profile_id != id);
        Ok(())
    }

    fn create_bookmark(&self, mut bookmark: Bookmark) -> TransferResult<String> {
        let mut records = self.records();
        if !records.profiles.contains_key(&bookmark.profile_id) {
            return Err(TransferError::not_found(format!(
                "Profile '{}' not found",
                bookmark.profile_id
            )));
        }
        let id = assign_id(&mut bookmark.id);
        records.bookmarks.insert(id.clone(), bookmark);
        Ok(id)
    }

    fn get_bookmark(&self, id: &str) -> TransferResult<Bookmark> {
        self.records()
            .bookmarks
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::not_found(format!("Bookmark '{}' not found", id)))
    }

    fn list_bookmarks(&self, profile_id: Option<&str>) -> TransferResult<Vec<Bookmark>> {
        Ok(self
            .records()
            .bookmarks
            .values()
            .filter(|b| profile_id.map_or(true, |p| b.profile_id == p))
            .cloned()
            .collect())
    }

    fn delete_bookmark(&self, id: &str) -> TransferResult<()> {
        self.records()
            .bookmarks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TransferError::not_found(format!("Bookmark '{}' not found", id)))
    }
}

/// Process-local [`KeyStore`].
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: Mutex<HashMap<String, KeyRef>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key_id: impl Into<String>, key: KeyRef) {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_id.into(), key);
    }
}

impl KeyStore for InMemoryKeyStore {
    fn key(&self, key_id: &str) -> TransferResult<KeyRef> {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key_id)
            .cloned()
            .ok_or_else(|| TransferError::not_found(format!("Key '{}' not found", key_id)))
    }
}
