//! Machine configuration: capacities, thresholds and phase timings

use anyhow::Context;
use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::*;

/// Longest accepted phase delay or catalog timeout: one day.
pub const MAX_DELAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub water_max_ml: u32,
    pub milk_max_ml: u32,
    pub beans_max_g: u32,
    pub rest_bin_max: u32,
    pub overflow_max: u32,
    pub cups_until_cleaning: u32,

    pub self_check_delay_ms: u64,
    pub grinding_delay_ms: u64,
    pub brewing_delay_ms: u64,
    pub milk_prep_delay_ms: u64,

    pub catalog_timeout_ms: u64,
    pub state_file: PathBuf,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            water_max_ml: WATER_MAX_ML,
            milk_max_ml: MILK_MAX_ML,
            beans_max_g: BEANS_MAX_G,
            rest_bin_max: REST_BIN_MAX,
            overflow_max: OVERFLOW_MAX,
            cups_until_cleaning: CUPS_UNTIL_CLEANING,

            self_check_delay_ms: SELF_CHECK_DELAY_MS,
            grinding_delay_ms: GRINDING_DELAY_MS,
            brewing_delay_ms: BREWING_DELAY_MS,
            milk_prep_delay_ms: MILK_PREP_DELAY_MS,

            catalog_timeout_ms: CATALOG_TIMEOUT_MS,
            state_file: PathBuf::from("machine_state.json"),
        }
    }
}

impl MachineConfig {
    /// Loads a (possibly partial) JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Rejects values the controller cannot run with: empty containers, a
    /// zero cleaning threshold (CleaningRequired could never be left) and
    /// delays too long for the clock.
    pub fn validate(&self) -> anyhow::Result<()> {
        for resource in Resource::ALL {
            if self.capacity(resource) == 0 {
                anyhow::bail!("{} capacity must be greater than zero", resource.as_str());
            }
        }
        if self.cups_until_cleaning == 0 {
            anyhow::bail!("cups_until_cleaning must be greater than zero");
        }

        let delays = [
            ("self_check_delay_ms", self.self_check_delay_ms),
            ("grinding_delay_ms", self.grinding_delay_ms),
            ("brewing_delay_ms", self.brewing_delay_ms),
            ("milk_prep_delay_ms", self.milk_prep_delay_ms),
            ("catalog_timeout_ms", self.catalog_timeout_ms),
        ];
        for (name, ms) in delays {
            if ms > MAX_DELAY_MS {
                anyhow::bail!("{} is {}ms, at most {}ms allowed", name, ms, MAX_DELAY_MS);
            }
        }
        Ok(())
    }

    pub fn capacity(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Water => self.water_max_ml,
            Resource::Milk => self.milk_max_ml,
            Resource::Beans => self.beans_max_g,
            Resource::RestBin => self.rest_bin_max,
            Resource::Overflow => self.overflow_max,
        }
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }
}
