use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::backpack::SLOT_COUNT;
use crate::error::{CoreError, CoreErrorCode};
use crate::index::{IdentityEntry, ItemIndex};

/// On-disk shape of one backpack item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecordRaw {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub count: i64,
    #[serde(rename = "slotIdx")]
    pub slot_idx: i64,
    #[serde(default)]
    pub ammo: i64,
    #[serde(default)]
    pub decay: i64,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: i64,
    pub name: Option<String>,
    pub count: i64,
    pub slot_index: usize,
    pub ammo: i64,
    pub decay: i64,
    key: String,
    localized_name: Option<String>,
    extra: JsonMap<String, JsonValue>,
}

impl ItemRecord {
    pub fn from_persisted(raw: ItemRecordRaw, index: &ItemIndex) -> Result<Self, CoreError> {
        let entry = index.resolve_by_id(raw.id)?;
        let slot_index = usize::try_from(raw.slot_idx)
            .ok()
            .filter(|&slot| slot < SLOT_COUNT)
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorCode::MalformedDocument,
                    format!(
                        "item {} declares slot {}, expected 0-{}",
                        raw.id,
                        raw.slot_idx,
                        SLOT_COUNT - 1
                    ),
                )
            })?;

        Ok(Self {
            id: raw.id,
            name: raw.name,
            count: raw.count,
            slot_index,
            ammo: raw.ammo,
            decay: raw.decay,
            key: entry.key.clone(),
            localized_name: entry.name.clone(),
            extra: raw.extra,
        })
    }

    pub fn from_key(key: &str, index: &ItemIndex) -> Result<Self, CoreError> {
        index.resolve_by_key(key).map(Self::fresh)
    }

    pub fn from_id(id: i64, index: &ItemIndex) -> Result<Self, CoreError> {
        index.resolve_by_id(id).map(Self::fresh)
    }

    fn fresh(entry: &IdentityEntry) -> Self {
        Self {
            id: entry.id,
            name: None,
            count: 1,
            slot_index: 0,
            ammo: 0,
            decay: 0,
            key: entry.key.clone(),
            localized_name: entry.name.clone(),
            extra: JsonMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Own override, then the localized name, then the raw key.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.localized_name.as_deref())
            .unwrap_or(&self.key)
    }

    pub fn set_count(&mut self, count: i64) -> Result<(), CoreError> {
        if count < 1 {
            return Err(CoreError::new(
                CoreErrorCode::InvalidArgument,
                format!("item count must be at least 1, got {count}"),
            ));
        }
        self.count = count;
        Ok(())
    }

    pub fn reset_decay(&mut self) {
        self.decay = 0;
    }

    pub fn to_raw(&self) -> ItemRecordRaw {
        ItemRecordRaw {
            id: self.id,
            name: self.name.clone(),
            count: self.count,
            slot_idx: self.slot_index as i64,
            ammo: self.ammo,
            decay: self.decay,
            extra: self.extra.clone(),
        }
    }
}
