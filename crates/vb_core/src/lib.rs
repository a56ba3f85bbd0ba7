//! Editing virtual backpack save files that a live game server may also own.
//!
//! Save files are plain JSON documents shared between the server and operator
//! tooling. Coordination is an advisory lock stored in the document itself
//! (`OpendByName` / `OpendBySteamId`); see [`store::BackpackStore`].

pub mod backpack;
pub mod config;
pub mod discovery;
pub mod error;
pub mod index;
pub mod item;
pub mod lock;
pub mod store;

pub use backpack::{Backpack, BackpackRaw, SLOT_COUNT};
pub use config::{DEFAULT_MAX_BACKPACKS, DataPaths, RuntimeConfig, ToolConfig};
pub use discovery::{Discovery, SearchHit, SkippedFile, StoreScope};
pub use error::{CoreError, CoreErrorCode};
pub use index::{IdentityEntry, ItemIndex};
pub use item::{ItemRecord, ItemRecordRaw};
pub use lock::{LockPolicy, LockState, OverrideIdentity};
pub use store::BackpackStore;
