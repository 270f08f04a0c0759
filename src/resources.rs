//! Container levels and the processed-cups counter, backed by a [`SettingsStore`].

use log::{info, warn};
use rand::Rng;

use crate::system::{MachineConfig, SettingKey, SettingsStore};
use crate::types::Resource;

const MAX_PENDING_CHANGES: usize = 8;

/// A value that was actually written since the last [`ResourceStore::take_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Level { resource: Resource, level: u32 },
    CupsProcessed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLevel {
    pub current: u32,
    pub max: u32,
}

pub struct ResourceStore {
    levels: [ResourceLevel; 5],
    cups_processed: u32,
    cleaning_threshold: u32,
    persistence: Box<dyn SettingsStore>,
    changes: heapless::Vec<StoreChange, MAX_PENDING_CHANGES>,
}

fn slot(resource: Resource) -> usize {
    match resource {
        Resource::Water => 0,
        Resource::Milk => 1,
        Resource::Beans => 2,
        Resource::RestBin => 3,
        Resource::Overflow => 4,
    }
}

impl ResourceStore {
    /// Reads every level from `persistence`. Absent container levels are seeded
    /// uniformly from `[0, max)`, an absent cup counter starts at zero.
    pub fn load<R: Rng>(
        persistence: Box<dyn SettingsStore>,
        config: &MachineConfig,
        rng: &mut R,
    ) -> Self {
        let levels = Resource::ALL.map(|resource| {
            let max = config.capacity(resource);
            let current = match persistence.load(resource.into()) {
                Some(value) if value > max => {
                    warn!(
                        "Persisted {} level {} exceeds capacity {}, clamping",
                        resource.as_str(),
                        value,
                        max
                    );
                    max
                }
                Some(value) => value,
                None if max > 0 => rng.gen_range(0..max),
                None => 0,
            };
            ResourceLevel { current, max }
        });
        let cups_processed = persistence.load(SettingKey::CupsProcessed).unwrap_or(0);

        let store = Self {
            levels,
            cups_processed,
            cleaning_threshold: config.cups_until_cleaning,
            persistence,
            changes: heapless::Vec::new(),
        };

        for resource in Resource::ALL {
            let level = store.levels[slot(resource)];
            info!("{}: {}/{}", resource.as_str(), level.current, level.max);
        }
        info!("cups: {}/{}", store.cups_processed, store.cleaning_threshold);

        store
    }

    pub fn level(&self, resource: Resource) -> u32 {
        self.levels[slot(resource)].current
    }

    pub fn capacity(&self, resource: Resource) -> u32 {
        self.levels[slot(resource)].max
    }

    pub fn cups_processed(&self) -> u32 {
        self.cups_processed
    }

    pub fn cleaning_threshold(&self) -> u32 {
        self.cleaning_threshold
    }

    /// Takes up to `amount`, returning what was actually available.
    pub fn consume(&mut self, resource: Resource, amount: u32) -> u32 {
        let current = self.level(resource);
        let taken = amount.min(current);
        self.set(resource, current - taken);
        taken
    }

    /// Adds `amount`, discarding whatever does not fit. Returns the new level.
    pub fn replenish(&mut self, resource: Resource, amount: u32) -> u32 {
        let level = self
            .level(resource)
            .saturating_add(amount)
            .min(self.capacity(resource));
        self.set(resource, level);
        level
    }

    /// Writes `value` (clamped to capacity). Returns false and does nothing
    /// when the level already holds it.
    pub fn set(&mut self, resource: Resource, value: u32) -> bool {
        let entry = &mut self.levels[slot(resource)];
        let value = value.min(entry.max);
        if entry.current == value {
            return false;
        }
        entry.current = value;
        self.persistence.save(resource.into(), value);
        self.record(StoreChange::Level {
            resource,
            level: value,
        });
        true
    }

    pub fn set_cups_processed(&mut self, cups: u32) -> bool {
        if self.cups_processed == cups {
            return false;
        }
        self.cups_processed = cups;
        self.persistence.save(SettingKey::CupsProcessed, cups);
        self.record(StoreChange::CupsProcessed(cups));
        true
    }

    pub fn add_cups_processed(&mut self, cups: u32) -> bool {
        self.set_cups_processed(self.cups_processed.saturating_add(cups))
    }

    /// Changes recorded since the last call, oldest first.
    pub fn take_changes(&mut self) -> heapless::Vec<StoreChange, MAX_PENDING_CHANGES> {
        core::mem::take(&mut self.changes)
    }

    fn record(&mut self, change: StoreChange) {
        if self.changes.push(change).is_err() {
            warn!("Dropping store change {:?}: too many pending changes", change);
        }
    }
}
