use std::fmt::Write as _;

use serde_json::{Map as JsonMap, Value as JsonValue};
use vb_core::{Backpack, BackpackStore, LockState, SearchHit, StoreScope};

const NAME_COL_WIDTH: usize = 32;
const SCOPE_COL_WIDTH: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    /// Include empty slots when listing a backpack.
    pub show_empty: bool,
}

/// Per-backpack item counts for one store, with a warning when it is locked.
pub fn render_store_summary(store: &BackpackStore, label: &str) -> String {
    let mut out = String::new();
    write_lock_warning(&mut out, store);
    writeln!(out, "{label}'s backpacks:").expect("writing to String cannot fail");
    for (number, backpack) in store.backpacks().iter().enumerate() {
        writeln!(out, "\t{number}: {} items", backpack.occupied_count())
            .expect("writing to String cannot fail");
    }
    out
}

pub fn render_backpack(backpack: &Backpack, options: TextRenderOptions) -> String {
    let mut out = String::new();
    for (slot, item) in backpack.slots().enumerate() {
        match item {
            Some(item) => writeln!(
                out,
                "{slot}: {} x {}",
                format_number_with_commas(item.count),
                item.display_name()
            ),
            None if options.show_empty => writeln!(out, "{slot}: Empty"),
            None => continue,
        }
        .expect("writing to String cannot fail");
    }
    if out.is_empty() {
        out.push_str("  none\n");
    }
    out
}

pub fn render_names(title: &str, names: &[&str]) -> String {
    let mut out = String::new();
    writeln!(out, "{title}:").expect("writing to String cannot fail");
    for name in names {
        writeln!(out, "{name}").expect("writing to String cannot fail");
    }
    out
}

pub fn render_search_hits(key: &str, hits: &[SearchHit]) -> String {
    let mut out = String::new();
    if hits.is_empty() {
        writeln!(out, "No backpack holds {key}.").expect("writing to String cannot fail");
        return out;
    }
    for hit in hits {
        writeln!(
            out,
            "{:<s$}{:<n$}backpack {:>2}  slot {:>2}  x{}",
            hit.scope.as_str(),
            fit_column(&hit.name, NAME_COL_WIDTH - 2),
            hit.backpack,
            hit.slot,
            format_number_with_commas(hit.count),
            s = SCOPE_COL_WIDTH,
            n = NAME_COL_WIDTH
        )
        .expect("writing to String cannot fail");
    }
    out
}

pub fn render_store_json(store: &BackpackStore, scope: StoreScope, name: &str) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("scope".to_string(), JsonValue::from(scope.as_str()));
    out.insert("name".to_string(), JsonValue::from(name));
    out.insert(
        "path".to_string(),
        JsonValue::from(store.path().display().to_string()),
    );
    out.insert("player".to_string(), optional_str(store.player_name()));
    out.insert("faction".to_string(), optional_str(store.faction_name()));
    out.insert("lock".to_string(), lock_to_json(store));
    out.insert(
        "backpacks".to_string(),
        JsonValue::Array(store.backpacks().iter().map(backpack_to_json).collect()),
    );
    JsonValue::Object(out)
}

pub fn render_search_json(hits: &[SearchHit]) -> JsonValue {
    JsonValue::Array(
        hits.iter()
            .map(|hit| {
                let mut entry = JsonMap::new();
                entry.insert("scope".to_string(), JsonValue::from(hit.scope.as_str()));
                entry.insert("name".to_string(), JsonValue::from(hit.name.clone()));
                entry.insert("backpack".to_string(), JsonValue::from(hit.backpack));
                entry.insert("slot".to_string(), JsonValue::from(hit.slot));
                entry.insert("count".to_string(), JsonValue::from(hit.count));
                JsonValue::Object(entry)
            })
            .collect(),
    )
}

fn lock_to_json(store: &BackpackStore) -> JsonValue {
    let mut lock = JsonMap::new();
    lock.insert(
        "state".to_string(),
        JsonValue::from(match store.lock_state() {
            LockState::Unlocked => "unlocked",
            LockState::LockedByOther => "locked_by_other",
            LockState::LockedBySelf => "locked_by_self",
        }),
    );
    lock.insert("owner_name".to_string(), optional_str(store.lock_owner_name()));
    lock.insert(
        "owner_id".to_string(),
        store
            .lock_owner_id()
            .map(JsonValue::from)
            .unwrap_or(JsonValue::Null),
    );
    JsonValue::Object(lock)
}

fn backpack_to_json(backpack: &Backpack) -> JsonValue {
    JsonValue::Array(
        backpack
            .iter_occupied()
            .map(|(slot, item)| {
                let mut entry = JsonMap::new();
                entry.insert("slot".to_string(), JsonValue::from(slot));
                entry.insert("key".to_string(), JsonValue::from(item.key()));
                entry.insert("name".to_string(), JsonValue::from(item.display_name()));
                entry.insert("id".to_string(), JsonValue::from(item.id));
                entry.insert("count".to_string(), JsonValue::from(item.count));
                entry.insert("ammo".to_string(), JsonValue::from(item.ammo));
                entry.insert("decay".to_string(), JsonValue::from(item.decay));
                JsonValue::Object(entry)
            })
            .collect(),
    )
}

fn optional_str(value: Option<&str>) -> JsonValue {
    value.map(JsonValue::from).unwrap_or(JsonValue::Null)
}

fn write_lock_warning(out: &mut String, store: &BackpackStore) {
    match store.lock_state() {
        LockState::Unlocked => {}
        LockState::LockedBySelf => {
            writeln!(out, "Backpack is locked by {}.", store.policy().identity.name)
                .expect("writing to String cannot fail");
        }
        LockState::LockedByOther => {
            writeln!(
                out,
                "\nWARNING BACKPACK IS LOCKED BY {}! MAKE SURE PLAYER ISN'T USING IT!\n",
                store.lock_owner_name().unwrap_or("AN UNNAMED HOLDER")
            )
            .expect("writing to String cannot fail");
        }
    }
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }

    let mut out = String::with_capacity(width);
    for ch in value.chars().take(width - 3) {
        out.push(ch);
    }
    out.push_str("...");
    out
}

fn format_number_with_commas(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
