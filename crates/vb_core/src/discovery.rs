use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, CoreErrorCode};
use crate::index::ItemIndex;
use crate::lock::LockPolicy;
use crate::store::BackpackStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreScope {
    Player,
    Faction,
    Origin,
    Global,
}

impl StoreScope {
    /// Routes a save file by filename convention, case-insensitively. Callers
    /// pass the path relative to the scanned root so that directory names
    /// inside the tree count but the root's own location does not.
    pub fn classify(path: &Path) -> Self {
        let lowered = path.to_string_lossy().to_lowercase();
        if lowered.contains("global.json") {
            Self::Global
        } else if lowered.contains("faction") {
            Self::Faction
        } else if lowered.contains("origin") {
            Self::Origin
        } else {
            Self::Player
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Player => "player",
            Self::Faction => "faction",
            Self::Origin => "origin",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: CoreError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub scope: StoreScope,
    pub name: String,
    pub backpack: usize,
    pub slot: usize,
    pub count: i64,
}

/// Every usable save file under a directory, routed by scope.
#[derive(Debug, Default)]
pub struct Discovery {
    players: BTreeMap<String, BackpackStore>,
    factions: BTreeMap<String, BackpackStore>,
    origins: BTreeMap<String, BackpackStore>,
    global: Option<BackpackStore>,
    skipped: Vec<SkippedFile>,
}

impl Discovery {
    /// Opens every `*.json` file below `dir`. A file that fails to load is
    /// recorded in [`Discovery::skipped`] and never stops the scan.
    pub fn scan(
        dir: &Path,
        index: Arc<ItemIndex>,
        max_backpacks: usize,
        policy: &LockPolicy,
    ) -> Result<Self, CoreError> {
        let mut files = Vec::new();
        collect_json_files(dir, &mut files)?;
        files.sort();

        let mut discovery = Self::default();
        for path in files {
            let scope = StoreScope::classify(path.strip_prefix(dir).unwrap_or(&path));
            match BackpackStore::open(&path, Arc::clone(&index), max_backpacks, policy.clone()) {
                Ok(store) => discovery.route(scope, store),
                Err(error) => {
                    if error.code == CoreErrorCode::Decode {
                        tracing::debug!(path = %path.display(), "skipping non-JSON file: {error}");
                    } else {
                        tracing::warn!(path = %path.display(), "skipping save file: {error}");
                    }
                    discovery.skipped.push(SkippedFile { path, error });
                }
            }
        }

        tracing::info!(
            players = discovery.players.len(),
            factions = discovery.factions.len(),
            origins = discovery.origins.len(),
            global = discovery.global.is_some(),
            skipped = discovery.skipped.len(),
            "scanned {}",
            dir.display()
        );
        Ok(discovery)
    }

    fn route(&mut self, scope: StoreScope, store: BackpackStore) {
        match scope {
            StoreScope::Global => self.global = Some(store),
            StoreScope::Faction => {
                let key = match (store.faction_name(), store.player_name()) {
                    (Some(faction), _) => faction.to_string(),
                    (None, player) => format!("PRIVATE-{}", player.unwrap_or("unknown")),
                };
                self.factions.insert(key, store);
            }
            StoreScope::Origin => {
                let key = store
                    .path()
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "origin".to_string());
                self.origins.insert(key, store);
            }
            StoreScope::Player => match store.player_name() {
                Some(player) => {
                    self.players.insert(player.to_string(), store);
                }
                None => {
                    tracing::debug!(path = %store.path().display(), "player save without a name");
                }
            },
        }
    }

    pub fn names(&self, scope: StoreScope) -> Vec<&str> {
        match scope {
            StoreScope::Player => self.players.keys().map(String::as_str).collect(),
            StoreScope::Faction => self.factions.keys().map(String::as_str).collect(),
            StoreScope::Origin => self.origins.keys().map(String::as_str).collect(),
            StoreScope::Global => self.global.iter().map(|_| "global").collect(),
        }
    }

    /// Looks a store up by scope and case-insensitive name. The global store
    /// ignores `name`.
    pub fn get(&self, scope: StoreScope, name: &str) -> Option<&BackpackStore> {
        match scope {
            StoreScope::Player => find_case_insensitive(&self.players, name),
            StoreScope::Faction => find_case_insensitive(&self.factions, name),
            StoreScope::Origin => find_case_insensitive(&self.origins, name),
            StoreScope::Global => self.global.as_ref(),
        }
    }

    pub fn get_mut(&mut self, scope: StoreScope, name: &str) -> Option<&mut BackpackStore> {
        let map = match scope {
            StoreScope::Player => &mut self.players,
            StoreScope::Faction => &mut self.factions,
            StoreScope::Origin => &mut self.origins,
            StoreScope::Global => return self.global.as_mut(),
        };
        let key = map.keys().find(|key| key.eq_ignore_ascii_case(name))?.clone();
        map.get_mut(&key)
    }

    pub fn global(&self) -> Option<&BackpackStore> {
        self.global.as_ref()
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn stores(&self) -> impl Iterator<Item = (StoreScope, &str, &BackpackStore)> {
        let players = self
            .players
            .iter()
            .map(|(name, store)| (StoreScope::Player, name.as_str(), store));
        let factions = self
            .factions
            .iter()
            .map(|(name, store)| (StoreScope::Faction, name.as_str(), store));
        let origins = self
            .origins
            .iter()
            .map(|(name, store)| (StoreScope::Origin, name.as_str(), store));
        let global = self
            .global
            .iter()
            .map(|store| (StoreScope::Global, "global", store));
        players.chain(factions).chain(origins).chain(global)
    }

    /// Every slot, in every store, holding the item with `key`.
    pub fn search(&self, key: &str) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for (scope, name, store) in self.stores() {
            for (number, backpack) in store.backpacks().iter().enumerate() {
                for (slot, item) in backpack.iter_occupied() {
                    if item.key() == key {
                        hits.push(SearchHit {
                            scope,
                            name: name.to_string(),
                            backpack: number,
                            slot,
                            count: item.count,
                        });
                    }
                }
            }
        }
        hits
    }
}

fn find_case_insensitive<'a>(
    map: &'a BTreeMap<String, BackpackStore>,
    name: &str,
) -> Option<&'a BackpackStore> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, store)| store)
    })
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Io,
            format!("failed to read directory {}: {e}", dir.display()),
        )
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if let Err(e) = collect_json_files(&path, out) {
                tracing::warn!("{e}");
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}
