use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub id: i64,
    pub key: String,
    pub name: Option<String>,
    pub legacy_id: Option<i64>,
}

/// Canonical id <-> key table for every item the save format can reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemIndex {
    entries: BTreeMap<String, IdentityEntry>,
    keys_by_id: BTreeMap<i64, String>,
    keys_by_legacy_id: BTreeMap<i64, String>,
}

impl ItemIndex {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        let index = Self::from_json_str(&text).map_err(|e| {
            CoreError::new(e.code, format!("{}: {}", path.display(), e.message))
        })?;
        tracing::debug!(path = %path.display(), items = index.len(), "loaded item index");
        Ok(index)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let raw: BTreeMap<String, i64> = serde_json::from_str(text).map_err(|e| {
            CoreError::new(
                CoreErrorCode::MalformedIndex,
                format!("identity table must be an object of key -> integer id: {e}"),
            )
        })?;
        Self::from_pairs(raw)
    }

    pub fn from_pairs<I, K>(pairs: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let mut index = Self::default();
        for (key, id) in pairs {
            let key = key.into();
            if let Some(existing) = index.keys_by_id.get(&id) {
                return Err(CoreError::new(
                    CoreErrorCode::MalformedIndex,
                    format!("id {id} is mapped to both {existing:?} and {key:?}"),
                ));
            }
            if let Some(previous) = index.entries.remove(&key) {
                index.keys_by_id.remove(&previous.id);
            }
            index.keys_by_id.insert(id, key.clone());
            index.entries.insert(
                key.clone(),
                IdentityEntry {
                    id,
                    key,
                    name: None,
                    legacy_id: None,
                },
            );
        }
        Ok(index)
    }

    /// Applies `key,name,...` lines; unknown keys and nameless lines are ignored.
    /// Returns the number of entries that received a name.
    pub fn overlay_names(&mut self, localization: &str) -> usize {
        let mut applied = 0;
        for line in localization.lines() {
            let mut columns = line.split(',');
            let (Some(key), Some(name)) = (columns.next(), columns.next()) else {
                continue;
            };
            if let Some(entry) = self.entries.get_mut(key) {
                entry.name = Some(name.trim().to_string());
                applied += 1;
            }
        }
        applied
    }

    pub fn overlay_names_from_path(&mut self, path: &Path) -> Result<usize, CoreError> {
        let bytes = fs::read(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        let applied = self.overlay_names(&String::from_utf8_lossy(&bytes));
        tracing::debug!(path = %path.display(), applied, "applied localization overlay");
        Ok(applied)
    }

    /// Records `other`'s id as the legacy id of every key both tables share.
    pub fn overlay_legacy_ids(&mut self, other: &ItemIndex) -> usize {
        let mut applied = 0;
        for (key, theirs) in &other.entries {
            if let Some(entry) = self.entries.get_mut(key) {
                if let Some(stale) = entry.legacy_id.replace(theirs.id) {
                    self.keys_by_legacy_id.remove(&stale);
                }
                self.keys_by_legacy_id.insert(theirs.id, key.clone());
                applied += 1;
            }
        }
        applied
    }

    pub fn resolve_by_id(&self, id: i64) -> Result<&IdentityEntry, CoreError> {
        self.keys_by_id
            .get(&id)
            .and_then(|key| self.entries.get(key))
            .ok_or_else(|| {
                CoreError::new(CoreErrorCode::UnknownItem, format!("unknown item id {id}"))
            })
    }

    pub fn resolve_by_key(&self, key: &str) -> Result<&IdentityEntry, CoreError> {
        self.entries.get(key).ok_or_else(|| {
            CoreError::new(CoreErrorCode::UnknownItem, format!("unknown item key {key:?}"))
        })
    }

    pub fn resolve_by_legacy_id(&self, legacy_id: i64) -> Result<&IdentityEntry, CoreError> {
        self.keys_by_legacy_id
            .get(&legacy_id)
            .and_then(|key| self.entries.get(key))
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorCode::UnknownItem,
                    format!("unknown legacy item id {legacy_id}"),
                )
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IdentityEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
