use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{CoreError, CoreErrorCode};
use crate::index::ItemIndex;
use crate::item::{ItemRecord, ItemRecordRaw};

pub const SLOT_COUNT: usize = 49;

/// On-disk shape of one backpack: `{"Items": [...]}` plus anything else the server stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackpackRaw {
    #[serde(rename = "Items", default, deserialize_with = "null_as_empty")]
    pub items: Vec<ItemRecordRaw>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ItemRecordRaw>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Vec<ItemRecordRaw>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Slots refer to records by handle, so one record can sit in several slots
/// at once and an edit through any of them shows up in all.
#[derive(Debug, Clone)]
pub struct Backpack {
    records: Vec<ItemRecord>,
    slots: Vec<Option<usize>>,
    slot_collisions: usize,
    extra: JsonMap<String, JsonValue>,
}

impl Default for Backpack {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Backpack {
    fn eq(&self, other: &Self) -> bool {
        self.slots().eq(other.slots())
            && self.slot_collisions == other.slot_collisions
            && self.extra == other.extra
    }
}

impl Backpack {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            slots: vec![None; SLOT_COUNT],
            slot_collisions: 0,
            extra: JsonMap::new(),
        }
    }

    /// Builds a backpack from its persisted item list. When two items claim the
    /// same slot the later one wins; the number of such overwrites is kept in
    /// [`Backpack::slot_collisions`].
    pub fn load_from(raw: BackpackRaw, index: &ItemIndex) -> Result<Self, CoreError> {
        let mut backpack = Self::new();
        backpack.extra = raw.extra;
        for raw_item in raw.items {
            let item = ItemRecord::from_persisted(raw_item, index)?;
            let slot = item.slot_index;
            if backpack.slots[slot].is_some() {
                backpack.slot_collisions += 1;
                tracing::warn!(slot, id = item.id, "duplicate slot index, later item wins");
            }
            let handle = backpack.insert_record(item);
            backpack.assign(slot, handle);
        }
        Ok(backpack)
    }

    pub fn place(&mut self, mut item: ItemRecord, slot: usize) -> Result<(), CoreError> {
        check_slot(slot)?;
        item.slot_index = slot;
        let handle = self.insert_record(item);
        self.assign(slot, handle);
        Ok(())
    }

    /// Empties the slot. Other slots sharing the record keep it.
    pub fn remove(&mut self, slot: usize) -> Result<Option<ItemRecord>, CoreError> {
        check_slot(slot)?;
        let handle = self.slots[slot].take();
        let removed = handle.map(|handle| self.records[handle].clone());
        if let Some(handle) = handle {
            self.release_if_orphaned(handle);
        }
        Ok(removed)
    }

    /// Places the item at `from` into `to` without clearing `from`. Both slots
    /// then hold the same record, whose slot index is now `to`, so a serialized
    /// backpack lists it twice under `to` and later edits through either slot
    /// reach both.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), CoreError> {
        check_slot(from)?;
        check_slot(to)?;
        let Some(handle) = self.slots[from] else {
            return Ok(());
        };
        self.records[handle].slot_index = to;
        self.assign(to, handle);
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<&ItemRecord> {
        let handle = (*self.slots.get(slot)?)?;
        self.records.get(handle)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut ItemRecord> {
        let handle = (*self.slots.get(slot)?)?;
        self.records.get_mut(handle)
    }

    /// Every slot in order, `None` where empty.
    pub fn slots(&self) -> impl Iterator<Item = Option<&ItemRecord>> + '_ {
        self.slots
            .iter()
            .map(|handle| handle.map(|handle| &self.records[handle]))
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &ItemRecord)> {
        self.slots()
            .enumerate()
            .filter_map(|(slot, item)| item.map(|item| (slot, item)))
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied_count() == 0
    }

    pub fn slot_collisions(&self) -> usize {
        self.slot_collisions
    }

    /// Occupied slots in ascending slot order; empty slots are omitted.
    pub fn serialize(&self) -> Vec<ItemRecordRaw> {
        self.slots().flatten().map(ItemRecord::to_raw).collect()
    }

    pub fn to_raw(&self) -> BackpackRaw {
        BackpackRaw {
            items: self.serialize(),
            extra: self.extra.clone(),
        }
    }

    fn insert_record(&mut self, item: ItemRecord) -> usize {
        self.records.push(item);
        self.records.len() - 1
    }

    fn assign(&mut self, slot: usize, handle: usize) {
        if let Some(replaced) = self.slots[slot].replace(handle) {
            if replaced != handle {
                self.release_if_orphaned(replaced);
            }
        }
    }

    // Drops a record no slot refers to any more. The last record is swapped
    // into its place, so the slot pointing at it is renumbered.
    fn release_if_orphaned(&mut self, handle: usize) {
        if self.slots.contains(&Some(handle)) {
            return;
        }
        let last = self.records.len() - 1;
        self.records.swap_remove(handle);
        if handle != last {
            for slot in self.slots.iter_mut().filter(|slot| **slot == Some(last)) {
                *slot = Some(handle);
            }
        }
    }
}

fn check_slot(slot: usize) -> Result<(), CoreError> {
    if slot >= SLOT_COUNT {
        return Err(CoreError::new(
            CoreErrorCode::InvalidSlot,
            format!("slot {slot} out of range, expected 0-{}", SLOT_COUNT - 1),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn index() -> ItemIndex {
        ItemIndex::from_json_str(r#"{"Medkit": 10, "Rifle": 20, "Ammo": 30}"#).expect("index")
    }

    fn raw(value: JsonValue) -> BackpackRaw {
        serde_json::from_value(value).expect("raw backpack should deserialize")
    }

    #[test]
    fn later_item_wins_on_duplicate_slot() {
        let backpack = Backpack::load_from(
            raw(json!({"Items": [
                {"id": 10, "name": null, "count": 1, "slotIdx": 3, "ammo": 0, "decay": 0},
                {"id": 20, "name": null, "count": 5, "slotIdx": 3, "ammo": 0, "decay": 0}
            ]})),
            &index(),
        )
        .unwrap();

        let occupant = backpack.get(3).expect("slot 3 should be occupied");
        assert_eq!(occupant.id, 20);
        assert_eq!(occupant.count, 5);
        assert_eq!(backpack.occupied_count(), 1);
        assert_eq!(backpack.slot_collisions(), 1);
    }

    #[test]
    fn serialize_then_load_keeps_slot_assignment() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Ammo", &index).unwrap(), 40)
            .unwrap();
        backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), 0)
            .unwrap();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 17)
            .unwrap();

        let serialized = backpack.serialize();
        let slots: Vec<i64> = serialized.iter().map(|item| item.slot_idx).collect();
        assert_eq!(slots, vec![0, 17, 40]);

        let reloaded = Backpack::load_from(
            BackpackRaw {
                items: serialized,
                extra: JsonMap::new(),
            },
            &index,
        )
        .unwrap();
        assert_eq!(reloaded, backpack);
    }

    #[test]
    fn place_overwrites_and_sets_slot_index() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), 8)
            .unwrap();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 8)
            .unwrap();
        let item = backpack.get(8).unwrap();
        assert_eq!(item.key(), "Rifle");
        assert_eq!(item.slot_index, 8);
    }

    #[test]
    fn place_rejects_slot_past_end() {
        let index = index();
        let mut backpack = Backpack::new();
        let err = backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), SLOT_COUNT)
            .unwrap_err();
        assert_eq!(err.code, CoreErrorCode::InvalidSlot);
    }

    #[test]
    fn remove_clears_and_tolerates_empty_slots() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), 2)
            .unwrap();
        assert!(backpack.remove(2).unwrap().is_some());
        assert!(backpack.remove(2).unwrap().is_none());
        assert!(backpack.is_empty());
    }

    #[test]
    fn remove_keeps_other_slots_addressable() {
        let index = index();
        let mut backpack = Backpack::new();
        for (key, slot) in [("Medkit", 0), ("Rifle", 1), ("Ammo", 2)] {
            backpack
                .place(ItemRecord::from_key(key, &index).unwrap(), slot)
                .unwrap();
        }

        backpack.remove(0).unwrap();
        backpack.remove(1).unwrap();

        assert_eq!(backpack.get(2).unwrap().key(), "Ammo");
        assert_eq!(backpack.occupied_count(), 1);
        let ids: Vec<i64> = backpack.serialize().iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![30]);
    }

    #[test]
    fn move_leaves_source_slot_populated() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 1)
            .unwrap();

        backpack.move_item(1, 6).unwrap();

        assert_eq!(backpack.get(6).unwrap().slot_index, 6);
        assert_eq!(backpack.get(1).unwrap().key(), "Rifle");
        assert_eq!(backpack.get(1).unwrap().slot_index, 6);
        assert_eq!(backpack.occupied_count(), 2);

        let slots: Vec<i64> = backpack.serialize().iter().map(|item| item.slot_idx).collect();
        assert_eq!(slots, vec![6, 6]);
    }

    #[test]
    fn moved_item_settles_in_target_after_reload() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 1)
            .unwrap();
        backpack.move_item(1, 6).unwrap();

        let reloaded = Backpack::load_from(backpack.to_raw(), &index).unwrap();
        assert!(reloaded.get(1).is_none());
        assert_eq!(reloaded.get(6).unwrap().key(), "Rifle");
        assert_eq!(reloaded.slot_collisions(), 1);
    }

    #[test]
    fn edits_through_a_moved_slot_reach_every_alias() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 1)
            .unwrap();

        backpack.move_item(1, 6).unwrap();
        backpack.get_mut(6).unwrap().set_count(9).unwrap();
        backpack.move_item(6, 10).unwrap();

        let serialized: Vec<(i64, i64)> = backpack
            .serialize()
            .iter()
            .map(|item| (item.slot_idx, item.count))
            .collect();
        assert_eq!(serialized, vec![(10, 9), (10, 9), (10, 9)]);

        backpack.get_mut(1).unwrap().reset_decay();
        backpack.get_mut(1).unwrap().set_count(2).unwrap();
        assert_eq!(backpack.get(10).unwrap().count, 2);
    }

    #[test]
    fn removing_one_alias_keeps_the_others() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 1)
            .unwrap();
        backpack.move_item(1, 6).unwrap();

        let removed = backpack.remove(1).unwrap().expect("slot 1 held the rifle");
        assert_eq!(removed.key(), "Rifle");
        assert!(backpack.get(1).is_none());
        assert_eq!(backpack.get(6).unwrap().key(), "Rifle");

        backpack.get_mut(6).unwrap().set_count(4).unwrap();
        backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), 2)
            .unwrap();
        assert_eq!(backpack.get(6).unwrap().count, 4);
        assert_eq!(backpack.get(2).unwrap().key(), "Medkit");
    }

    #[test]
    fn placing_over_an_alias_detaches_only_that_slot() {
        let index = index();
        let mut backpack = Backpack::new();
        backpack
            .place(ItemRecord::from_key("Rifle", &index).unwrap(), 1)
            .unwrap();
        backpack
            .place(ItemRecord::from_key("Ammo", &index).unwrap(), 3)
            .unwrap();
        backpack.move_item(1, 6).unwrap();

        backpack
            .place(ItemRecord::from_key("Medkit", &index).unwrap(), 6)
            .unwrap();
        backpack.get_mut(1).unwrap().set_count(7).unwrap();

        assert_eq!(backpack.get(6).unwrap().key(), "Medkit");
        assert_eq!(backpack.get(6).unwrap().count, 1);
        assert_eq!(backpack.get(1).unwrap().count, 7);
        assert_eq!(backpack.get(3).unwrap().key(), "Ammo");
        assert_eq!(backpack.occupied_count(), 3);
    }

    #[test]
    fn move_from_empty_slot_is_noop() {
        let mut backpack = Backpack::new();
        backpack.move_item(4, 5).unwrap();
        assert!(backpack.is_empty());
    }

    #[test]
    fn null_items_load_as_empty_backpack() {
        let backpack = Backpack::load_from(raw(json!({"Items": null})), &index()).unwrap();
        assert!(backpack.is_empty());
        assert_eq!(backpack.to_raw().items.len(), 0);
    }
}
