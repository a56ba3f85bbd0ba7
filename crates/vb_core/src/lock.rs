use std::time::Duration;

use serde_json::Value as JsonValue;

pub const DEFAULT_OVERRIDE_NAME: &str = "ADMIN";
pub const DEFAULT_OVERRIDE_STEAM_ID: i64 = 1;
pub const DEFAULT_TIMEOUT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    LockedByOther,
    LockedBySelf,
}

impl LockState {
    /// Derives the state from the raw values of the two lock fields of a save
    /// document. Either field being set locks the file.
    pub fn from_fields(
        owner_name: &JsonValue,
        owner_id: &JsonValue,
        identity: &OverrideIdentity,
    ) -> Self {
        if !field_is_set(owner_name) && !field_is_set(owner_id) {
            return Self::Unlocked;
        }
        match owner_name.as_str() {
            Some(name) if identity.holds(name) => Self::LockedBySelf,
            _ => Self::LockedByOther,
        }
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self, Self::Unlocked)
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Unlocked => "unlocked",
            Self::LockedByOther => "locked by another holder",
            Self::LockedBySelf => "locked by operator",
        }
    }
}

/// Whether a lock field holds the lock. Null, `""`, zero, `false` and empty
/// containers are unset; any other value is set, whatever its type.
pub fn field_is_set(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(set) => *set,
        JsonValue::Number(number) => number.as_f64().is_none_or(|n| n != 0.0),
        JsonValue::String(text) => !text.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(fields) => !fields.is_empty(),
    }
}

/// The reserved operator identity that may always seize or release a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideIdentity {
    pub name: String,
    pub steam_id: i64,
}

impl OverrideIdentity {
    pub fn new(name: impl Into<String>, steam_id: i64) -> Self {
        Self {
            name: name.into(),
            steam_id,
        }
    }

    pub fn holds(&self, owner_name: &str) -> bool {
        owner_name == self.name
    }
}

impl Default for OverrideIdentity {
    fn default() -> Self {
        Self::new(DEFAULT_OVERRIDE_NAME, DEFAULT_OVERRIDE_STEAM_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    pub identity: OverrideIdentity,
    /// One time unit of every timeout budget.
    pub poll_interval: Duration,
}

impl LockPolicy {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_identity(mut self, identity: OverrideIdentity) -> Self {
        self.identity = identity;
        self
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            identity: OverrideIdentity::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}
