use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;
use vb_core::lock::DEFAULT_TIMEOUT;
use vb_core::{
    BackpackStore, CoreError, CoreErrorCode, DataPaths, Discovery, ItemIndex, ItemRecord,
    LockPolicy, RuntimeConfig, StoreScope, ToolConfig,
};
use vb_render::{
    TextRenderOptions, render_backpack, render_names, render_search_hits, render_search_json,
    render_store_json, render_store_summary,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_LOCKED: i32 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Player,
    Faction,
    Origin,
    Global,
}

impl From<ScopeArg> for StoreScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Player => StoreScope::Player,
            ScopeArg::Faction => StoreScope::Faction,
            ScopeArg::Origin => StoreScope::Origin,
            ScopeArg::Global => StoreScope::Global,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Directory holding NameIdMapping.json, Localization.csv and Configuration.json.
    #[arg(long, value_name = "DIR", default_value = "Data")]
    data_dir: PathBuf,
    /// Virtual backpack save directory; defaults to the saved `vb_path`.
    #[arg(long, value_name = "DIR")]
    vb_dir: Option<PathBuf>,
    /// Remember --vb-dir in vbm_config.json.
    #[arg(long, requires = "vb_dir")]
    save_path: bool,
    /// Identity table of a previous index generation, bridged as legacy ids.
    #[arg(long, value_name = "PATH")]
    legacy_index: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, hide = true, default_value_t = 1000)]
    poll_interval_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Target {
    #[arg(value_enum)]
    scope: ScopeArg,
    /// Player, faction or origin name (case-insensitive); unused for global.
    name: Option<String>,
}

#[derive(Debug, Args)]
struct SlotTarget {
    #[command(flatten)]
    target: Target,
    #[arg(long)]
    backpack: usize,
    #[arg(long)]
    slot: usize,
}

#[derive(Debug, Args)]
struct WriteOptions {
    /// Poll intervals to wait for another holder to release the save.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT)]
    timeout: u32,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List player backpacks.
    Players,
    /// List faction backpacks.
    Factions,
    /// List origin backpacks.
    Origins,
    /// Show a store's backpacks, or one backpack's slots.
    Show {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        backpack: Option<usize>,
        #[arg(long)]
        all_slots: bool,
    },
    /// Add or replace the item in a slot.
    Add {
        #[command(flatten)]
        slot: SlotTarget,
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 1)]
        count: i64,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Empty a slot.
    Remove {
        #[command(flatten)]
        slot: SlotTarget,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Change the quantity of the item in a slot.
    SetCount {
        #[command(flatten)]
        slot: SlotTarget,
        #[arg(long)]
        count: i64,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Reset the decay of the item in a slot.
    ResetDecay {
        #[command(flatten)]
        slot: SlotTarget,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Place the item of one slot into another; the source slot keeps it too.
    Move {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        backpack: usize,
        #[arg(long)]
        from: usize,
        #[arg(long)]
        to: usize,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Claim the advisory lock for the operator identity.
    Lock {
        #[command(flatten)]
        target: Target,
        /// Wait for another holder instead of failing immediately.
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        write: WriteOptions,
    },
    /// Release the advisory lock, whoever holds it.
    Unlock {
        #[command(flatten)]
        target: Target,
        /// Only release a lock held by the operator identity.
        #[arg(long)]
        only_if_held: bool,
    },
    /// Find every slot holding an item key.
    Search { key: String },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = DataPaths::new(&cli.data_dir);
    let mut index = ItemIndex::load(&paths.id_mapping()).unwrap_or_else(|e| {
        eprintln!("Error loading item index: {e}");
        process::exit(EXIT_FAILURE);
    });
    if let Err(e) = index.overlay_names_from_path(&paths.localization()) {
        tracing::info!("no localization applied: {e}");
    }
    if let Some(legacy_path) = &cli.legacy_index {
        let legacy = ItemIndex::load(legacy_path).unwrap_or_else(|e| {
            eprintln!("Error loading legacy item index: {e}");
            process::exit(EXIT_FAILURE);
        });
        index.overlay_legacy_ids(&legacy);
    }
    let index = Arc::new(index);

    let runtime = RuntimeConfig::load_or_default(&paths.server_config()).unwrap_or_else(|e| {
        eprintln!("Error loading server configuration: {e}");
        process::exit(EXIT_FAILURE);
    });
    let vb_dir = resolve_vb_dir(&cli, &paths);

    let policy =
        LockPolicy::default().with_poll_interval(Duration::from_millis(cli.poll_interval_ms));
    let mut discovery = Discovery::scan(&vb_dir, index, runtime.max_backpacks(), &policy)
        .unwrap_or_else(|e| {
            eprintln!("Error scanning {}: {e}", vb_dir.display());
            process::exit(EXIT_FAILURE);
        });

    match cli.command {
        Command::Players => print_names(&discovery, StoreScope::Player, "All players", cli.json),
        Command::Factions => {
            print_names(&discovery, StoreScope::Faction, "All factions", cli.json)
        }
        Command::Origins => print_names(&discovery, StoreScope::Origin, "All origins", cli.json),
        Command::Show {
            target,
            backpack,
            all_slots,
        } => {
            let (scope, name) = target_key(&target);
            let store = discovery
                .get(scope, &name)
                .unwrap_or_else(|| no_such_store(scope, &name));
            if cli.json {
                print_json(&render_store_json(store, scope, &name));
                return;
            }
            match backpack {
                Some(number) => {
                    let backpack = store.backpack(number).unwrap_or_else(|e| fail(e));
                    print!(
                        "{}",
                        render_backpack(
                            backpack,
                            TextRenderOptions {
                                show_empty: all_slots
                            }
                        )
                    );
                }
                None => {
                    let label = store.player_name().unwrap_or(&name).to_string();
                    print!("{}", render_store_summary(store, &label));
                }
            }
        }
        Command::Add {
            slot,
            key,
            count,
            write,
        } => edit_slot(&mut discovery, &slot, write.timeout, |store| {
            let mut item = ItemRecord::from_key(&key, store.index())?;
            item.set_count(count)?;
            store.backpack_mut(slot.backpack)?.place(item, slot.slot)?;
            Ok(format!("Added {count} of {key}"))
        }),
        Command::Remove { slot, write } => {
            edit_slot(&mut discovery, &slot, write.timeout, |store| {
                match store.backpack_mut(slot.backpack)?.remove(slot.slot)? {
                    Some(item) => Ok(format!("Removed {}", item.display_name())),
                    None => Ok("Slot already empty".to_string()),
                }
            })
        }
        Command::SetCount { slot, count, write } => {
            edit_slot(&mut discovery, &slot, write.timeout, |store| {
                let item = occupied(store, &slot)?;
                item.set_count(count)?;
                Ok(format!("Set {} to {count}", item.display_name()))
            })
        }
        Command::ResetDecay { slot, write } => {
            edit_slot(&mut discovery, &slot, write.timeout, |store| {
                let item = occupied(store, &slot)?;
                item.reset_decay();
                Ok(format!("Reset decay on {}", item.display_name()))
            })
        }
        Command::Move {
            target,
            backpack,
            from,
            to,
            write,
        } => {
            let store = store_mut(&mut discovery, &target);
            store
                .backpack_mut(backpack)
                .and_then(|b| b.move_item(from, to))
                .unwrap_or_else(|e| fail(e));
            persist(store, write.timeout, &format!("Moved slot {from} to slot {to}"));
        }
        Command::Lock {
            target,
            wait,
            write,
        } => {
            let store = store_mut(&mut discovery, &target);
            let acquired = store
                .acquire_lock(wait, write.timeout)
                .unwrap_or_else(|e| fail(e));
            if !acquired {
                eprintln!(
                    "Backpack is locked by {}; not taking it over.",
                    store.lock_owner_name().unwrap_or("an unnamed holder")
                );
                process::exit(EXIT_LOCKED);
            }
            println!("Locked {} as {}", store.path().display(), store.policy().identity.name);
        }
        Command::Unlock {
            target,
            only_if_held,
        } => {
            let store = store_mut(&mut discovery, &target);
            if store.unlock(!only_if_held).unwrap_or_else(|e| fail(e)) {
                println!("Unlocked {}", store.path().display());
            } else {
                println!("Lock not held by {}; left as is.", store.policy().identity.name);
            }
        }
        Command::Search { key } => {
            let hits = discovery.search(&key);
            if cli.json {
                print_json(&render_search_json(&hits));
            } else {
                print!("{}", render_search_hits(&key, &hits));
            }
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn resolve_vb_dir(cli: &Cli, paths: &DataPaths) -> PathBuf {
    let config_path = paths.tool_config();
    let mut config = ToolConfig::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::warn!("ignoring tool configuration: {e}");
        ToolConfig::default()
    });

    if let Some(dir) = &cli.vb_dir {
        if cli.save_path {
            config.vb_path = Some(dir.clone());
            config.save(&config_path).unwrap_or_else(|e| fail(e));
        }
        return dir.clone();
    }

    config.vb_path.unwrap_or_else(|| {
        eprintln!(
            "No virtual backpack directory: pass --vb-dir <DIR> (add --save-path to remember it)"
        );
        process::exit(EXIT_USAGE);
    })
}

fn target_key(target: &Target) -> (StoreScope, String) {
    let scope = StoreScope::from(target.scope);
    match (&target.name, scope) {
        (_, StoreScope::Global) => (scope, String::new()),
        (Some(name), _) => (scope, name.clone()),
        (None, _) => {
            eprintln!("A {scope} name is required");
            process::exit(EXIT_USAGE);
        }
    }
}

fn store_mut<'a>(discovery: &'a mut Discovery, target: &Target) -> &'a mut BackpackStore {
    let (scope, name) = target_key(target);
    match discovery.get_mut(scope, &name) {
        Some(store) => store,
        None => no_such_store(scope, &name),
    }
}

fn occupied<'a>(
    store: &'a mut BackpackStore,
    slot: &SlotTarget,
) -> Result<&'a mut ItemRecord, CoreError> {
    store
        .backpack_mut(slot.backpack)?
        .get_mut(slot.slot)
        .ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::InvalidSlot,
                format!("no item in slot {}", slot.slot),
            )
        })
}

fn edit_slot<F>(discovery: &mut Discovery, slot: &SlotTarget, timeout: u32, edit: F)
where
    F: FnOnce(&mut BackpackStore) -> Result<String, CoreError>,
{
    let store = store_mut(discovery, &slot.target);
    if store.is_locked() {
        eprintln!("\nWARNING BACKPACK IS LOCKED! MAKE SURE PLAYER ISN'T USING IT!\n");
    }
    let message = edit(&mut *store).unwrap_or_else(|e| fail(e));
    persist(store, timeout, &message);
}

fn persist(store: &mut BackpackStore, timeout: u32, message: &str) {
    match store.safe_write(timeout) {
        Ok(true) => println!("{message}"),
        Ok(false) => {
            eprintln!(
                "Backpack is still locked by {} after {timeout} polls; nothing was written.",
                store.lock_owner_name().unwrap_or("an unnamed holder")
            );
            process::exit(EXIT_LOCKED);
        }
        Err(e) => fail(e),
    }
}

fn print_names(discovery: &Discovery, scope: StoreScope, title: &str, json: bool) {
    let names = discovery.names(scope);
    if json {
        print_json(&JsonValue::from(names));
    } else {
        print!("{}", render_names(title, &names));
    }
}

fn print_json(value: &JsonValue) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(EXIT_FAILURE);
    });
    println!("{rendered}");
}

fn no_such_store(scope: StoreScope, name: &str) -> ! {
    eprintln!("No {scope} backpack named {name:?}");
    process::exit(EXIT_FAILURE);
}

fn fail(e: CoreError) -> ! {
    eprintln!("Error: {e}");
    process::exit(EXIT_FAILURE);
}
