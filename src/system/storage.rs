//! Durable key-value persistence for container levels and the cup counter.
//!
//! The controller only sees [`SettingsStore`], which never fails from its point
//! of view. [`JsonFileStore`] keeps the values in a small JSON document on disk,
//! [`MemoryStore`] is the in-memory fake used by tests and short-lived demos.

use anyhow::Context;
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    WaterLevel,
    MilkLevel,
    BeansLevel,
    RestBinLevel,
    OverflowLevel,
    CupsProcessed,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::WaterLevel,
        SettingKey::MilkLevel,
        SettingKey::BeansLevel,
        SettingKey::RestBinLevel,
        SettingKey::OverflowLevel,
        SettingKey::CupsProcessed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::WaterLevel => "water_level",
            SettingKey::MilkLevel => "milk_level",
            SettingKey::BeansLevel => "beans_level",
            SettingKey::RestBinLevel => "rest_bin_level",
            SettingKey::OverflowLevel => "overflow_level",
            SettingKey::CupsProcessed => "cups_processed",
        }
    }
}

impl From<Resource> for SettingKey {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::Water => SettingKey::WaterLevel,
            Resource::Milk => SettingKey::MilkLevel,
            Resource::Beans => SettingKey::BeansLevel,
            Resource::RestBin => SettingKey::RestBinLevel,
            Resource::Overflow => SettingKey::OverflowLevel,
        }
    }
}

/// Integer key-value store. Writes are synchronous and assumed to succeed.
pub trait SettingsStore: Send {
    fn load(&self, key: SettingKey) -> Option<u32>;
    fn save(&mut self, key: SettingKey, value: u32);
}

/// Shared in-memory store. Clones see the same values, which lets a second
/// controller be built on top of what the first one persisted.
#[derive(Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<CriticalSectionRawMutex, RefCell<HashMap<SettingKey, u32>>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(RefCell::new(HashMap::new()))),
        }
    }

    pub fn with_values(values: &[(SettingKey, u32)]) -> Self {
        let store = Self::new();
        store.values.lock(|cell| {
            let mut map = cell.borrow_mut();
            for (key, value) in values {
                map.insert(*key, *value);
            }
        });
        store
    }

    pub fn get(&self, key: SettingKey) -> Option<u32> {
        self.values.lock(|cell| cell.borrow().get(&key).copied())
    }

    pub fn len(&self) -> usize {
        self.values.lock(|cell| cell.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, key: SettingKey) -> Option<u32> {
        self.get(key)
    }

    fn save(&mut self, key: SettingKey, value: u32) {
        self.values.lock(|cell| {
            cell.borrow_mut().insert(key, value);
        });
    }
}

/// Values kept in a JSON object keyed by [`SettingKey::as_str`].
pub struct JsonFileStore {
    path: PathBuf,
    cached: BTreeMap<String, u32>,
}

impl JsonFileStore {
    /// Opens the document at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cached = if path.exists() {
            let raw = std::fs::read(&path)
                .with_context(|| format!("reading machine state from {}", path.display()))?;
            serde_json::from_slice::<BTreeMap<String, u32>>(&raw)
                .with_context(|| format!("parsing machine state in {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        info!(
            "🗄️ Machine state store at {} ({} keys)",
            path.display(),
            cached.len()
        );
        Ok(Self { path, cached })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(&self.cached)?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("writing machine state to {}", self.path.display()))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self, key: SettingKey) -> Option<u32> {
        self.cached.get(key.as_str()).copied()
    }

    fn save(&mut self, key: SettingKey, value: u32) {
        self.cached.insert(key.as_str().to_string(), value);
        match self.flush() {
            Ok(()) => debug!("💾 Saved {}={}", key.as_str(), value),
            Err(e) => warn!("Failed to persist {}={}: {:?}", key.as_str(), value, e),
        }
    }
}
