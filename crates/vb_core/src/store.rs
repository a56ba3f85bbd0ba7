use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::backpack::{Backpack, BackpackRaw};
use crate::error::{CoreError, CoreErrorCode};
use crate::index::ItemIndex;
use crate::lock::{self, LockPolicy, LockState};

pub const FIELD_PLAYER_NAME: &str = "LastAccessPlayerName";
pub const FIELD_FACTION_NAME: &str = "LastAccessFactionName";
pub const FIELD_LOCK_NAME: &str = "OpendByName";
pub const FIELD_LOCK_ID: &str = "OpendBySteamId";
pub const FIELD_BACKPACKS: &str = "Backpacks";

static UNSET: JsonValue = JsonValue::Null;

/// One virtual backpack save file together with its advisory lock fields.
///
/// The lock lives inside the document itself. Nothing here takes a filesystem
/// lock; every participant is expected to check the two lock fields before
/// writing, and a writer that does not can still clobber the file.
#[derive(Debug, Clone)]
pub struct BackpackStore {
    path: PathBuf,
    index: Arc<ItemIndex>,
    policy: LockPolicy,
    max_backpacks: usize,
    document: JsonMap<String, JsonValue>,
    player_name: Option<String>,
    faction_name: Option<String>,
    lock_owner_name: Option<String>,
    lock_owner_id: Option<i64>,
    backpacks: Vec<Backpack>,
}

impl BackpackStore {
    pub fn open(
        path: impl Into<PathBuf>,
        index: Arc<ItemIndex>,
        max_backpacks: usize,
        policy: LockPolicy,
    ) -> Result<Self, CoreError> {
        let mut store = Self {
            path: path.into(),
            index,
            policy,
            max_backpacks,
            document: JsonMap::new(),
            player_name: None,
            faction_name: None,
            lock_owner_name: None,
            lock_owner_id: None,
            backpacks: Vec::new(),
        };
        store.refresh(false)?;
        Ok(store)
    }

    /// Re-reads the file. A full refresh rebuilds every backpack and drops
    /// unwritten edits; `locks_only` leaves the in-memory backpacks alone.
    pub fn refresh(&mut self, locks_only: bool) -> Result<(), CoreError> {
        let document = read_document(&self.path)?;

        let backpacks = if locks_only {
            None
        } else {
            Some(self.load_backpacks(&document)?)
        };

        self.player_name = string_field(&document, FIELD_PLAYER_NAME);
        self.faction_name = string_field(&document, FIELD_FACTION_NAME);
        self.lock_owner_name = holder_label(&document, FIELD_LOCK_NAME);
        self.lock_owner_id = id_field(&document, FIELD_LOCK_ID);
        self.document = document;

        if let Some(backpacks) = backpacks {
            self.backpacks = backpacks;
        }

        tracing::debug!(
            path = %self.path.display(),
            locks_only,
            state = self.lock_state().as_str(),
            "refreshed backpack store"
        );
        Ok(())
    }

    fn load_backpacks(
        &self,
        document: &JsonMap<String, JsonValue>,
    ) -> Result<Vec<Backpack>, CoreError> {
        let raw = document.get(FIELD_BACKPACKS).cloned().unwrap_or(JsonValue::Null);
        let raw: Vec<BackpackRaw> = serde_json::from_value(raw).map_err(|e| {
            CoreError::new(
                CoreErrorCode::MalformedDocument,
                format!("{}: invalid {FIELD_BACKPACKS}: {e}", self.path.display()),
            )
        })?;

        let mut backpacks = raw
            .into_iter()
            .map(|backpack| Backpack::load_from(backpack, &self.index))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                CoreError::new(e.code, format!("{}: {}", self.path.display(), e.message))
            })?;

        while backpacks.len() < self.max_backpacks {
            backpacks.push(Backpack::new());
        }
        Ok(backpacks)
    }

    /// Replaces the whole file with the retained document and the in-memory
    /// backpacks. Changes made on disk since the last refresh are lost.
    pub fn write(&mut self) -> Result<(), CoreError> {
        let backpacks = self
            .backpacks
            .iter()
            .map(|backpack| serde_json::to_value(backpack.to_raw()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Encode,
                    format!("failed to encode backpacks: {e}"),
                )
            })?;
        self.document
            .insert(FIELD_BACKPACKS.to_string(), JsonValue::Array(backpacks));

        let bytes = serde_json::to_vec(&self.document).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Encode,
                format!("failed to encode {}: {e}", self.path.display()),
            )
        })?;
        fs::write(&self.path, bytes).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to write {}: {e}", self.path.display()),
            )
        })?;
        tracing::debug!(path = %self.path.display(), "wrote backpack store");
        Ok(())
    }

    /// Waits up to `timeout` poll intervals for the file to be unlocked, then
    /// writes. Returns `false` without writing if it never unlocked. A holder
    /// can still take the lock between the last check and the write.
    pub fn safe_write(&mut self, timeout: u32) -> Result<bool, CoreError> {
        self.refresh(true)?;
        let mut budget = timeout;
        while self.is_locked() && budget > 0 {
            budget -= 1;
            thread::sleep(self.policy.poll_interval);
            self.refresh(true)?;
        }

        if self.is_locked() {
            tracing::warn!(
                path = %self.path.display(),
                holder = self.lock_owner_name.as_deref().unwrap_or("<unnamed>"),
                "still locked after {timeout} polls, not writing"
            );
            return Ok(false);
        }

        self.write()?;
        Ok(true)
    }

    /// Claims the lock for the override identity. Without `blocking` this only
    /// succeeds if the file is free or already ours; with it, polls up to
    /// `timeout` intervals for another holder to let go.
    pub fn acquire_lock(&mut self, blocking: bool, timeout: u32) -> Result<bool, CoreError> {
        self.refresh(true)?;
        let mut budget = timeout;
        while blocking && budget > 0 && self.lock_state() == LockState::LockedByOther {
            self.refresh(true)?;
            budget -= 1;
            if self.lock_state() == LockState::LockedByOther {
                thread::sleep(self.policy.poll_interval);
            }
        }

        if self.lock_state() == LockState::LockedByOther {
            tracing::info!(
                path = %self.path.display(),
                holder = self.lock_owner_name.as_deref().unwrap_or("<unnamed>"),
                "lock held by another participant"
            );
            return Ok(false);
        }

        self.lock()?;
        Ok(true)
    }

    /// Seizes the lock for the override identity regardless of the holder.
    pub fn lock(&mut self) -> Result<(), CoreError> {
        let identity = &self.policy.identity;
        self.document.insert(
            FIELD_LOCK_NAME.to_string(),
            JsonValue::String(identity.name.clone()),
        );
        self.document
            .insert(FIELD_LOCK_ID.to_string(), JsonValue::from(identity.steam_id));
        self.lock_owner_name = Some(identity.name.clone());
        self.lock_owner_id = Some(identity.steam_id);
        tracing::info!(path = %self.path.display(), "locked as {}", identity.name);
        self.write()
    }

    /// Clears both lock fields and persists when the override identity holds
    /// the lock, or unconditionally when `release_only` is set. Returns whether
    /// a release happened.
    pub fn unlock(&mut self, release_only: bool) -> Result<bool, CoreError> {
        if !(release_only || self.lock_state() == LockState::LockedBySelf) {
            return Ok(false);
        }

        self.document
            .insert(FIELD_LOCK_NAME.to_string(), JsonValue::Null);
        self.document.insert(FIELD_LOCK_ID.to_string(), JsonValue::Null);
        let previous = self.lock_owner_name.take();
        self.lock_owner_id = None;
        tracing::info!(
            path = %self.path.display(),
            previous = previous.as_deref().unwrap_or("<unnamed>"),
            "released lock"
        );
        self.write()?;
        Ok(true)
    }

    pub fn lock_state(&self) -> LockState {
        LockState::from_fields(
            self.document.get(FIELD_LOCK_NAME).unwrap_or(&UNSET),
            self.document.get(FIELD_LOCK_ID).unwrap_or(&UNSET),
            &self.policy.identity,
        )
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().is_locked()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &ItemIndex {
        &self.index
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    pub fn faction_name(&self) -> Option<&str> {
        self.faction_name.as_deref()
    }

    /// Holder shown to operators. A set lock field that is not a string is
    /// rendered as its JSON text.
    pub fn lock_owner_name(&self) -> Option<&str> {
        self.lock_owner_name.as_deref()
    }

    pub fn lock_owner_id(&self) -> Option<i64> {
        self.lock_owner_id
    }

    pub fn max_backpacks(&self) -> usize {
        self.max_backpacks
    }

    pub fn backpacks(&self) -> &[Backpack] {
        &self.backpacks
    }

    pub fn backpack(&self, number: usize) -> Result<&Backpack, CoreError> {
        self.backpacks
            .get(number)
            .ok_or_else(|| missing_backpack(number, self.backpacks.len()))
    }

    pub fn backpack_mut(&mut self, number: usize) -> Result<&mut Backpack, CoreError> {
        let len = self.backpacks.len();
        self.backpacks
            .get_mut(number)
            .ok_or_else(|| missing_backpack(number, len))
    }
}

fn missing_backpack(number: usize, len: usize) -> CoreError {
    CoreError::new(
        CoreErrorCode::InvalidArgument,
        format!("backpack {number} does not exist, store has {len}"),
    )
}

fn read_document(path: &Path) -> Result<JsonMap<String, JsonValue>, CoreError> {
    let bytes = fs::read(path).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Io,
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let value: JsonValue = serde_json::from_slice(&bytes).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Decode,
            format!("{} is not valid JSON: {e}", path.display()),
        )
    })?;

    let JsonValue::Object(document) = value else {
        return Err(CoreError::new(
            CoreErrorCode::MalformedDocument,
            format!("{} is not a JSON object", path.display()),
        ));
    };
    if !document.contains_key(FIELD_BACKPACKS) {
        return Err(CoreError::new(
            CoreErrorCode::MalformedDocument,
            format!("{} has no {FIELD_BACKPACKS} collection", path.display()),
        ));
    }
    Ok(document)
}

fn string_field(document: &JsonMap<String, JsonValue>, field: &str) -> Option<String> {
    document
        .get(field)
        .and_then(JsonValue::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// Display text for whoever holds the lock. Values that are not strings still
// hold the lock, so they are shown as raw JSON rather than dropped.
fn holder_label(document: &JsonMap<String, JsonValue>, field: &str) -> Option<String> {
    match document.get(field)? {
        JsonValue::String(name) if !name.is_empty() => Some(name.clone()),
        other if lock::field_is_set(other) => Some(other.to_string()),
        _ => None,
    }
}

// Parsed for display only; lock state comes from the raw value.
fn id_field(document: &JsonMap<String, JsonValue>, field: &str) -> Option<i64> {
    let value = document.get(field)?;
    value
        .as_i64()
        .or_else(|| value.as_u64().and_then(|id| i64::try_from(id).ok()))
        .or_else(|| value.as_str().and_then(|id| id.trim().parse().ok()))
        .filter(|&id| id != 0)
}
