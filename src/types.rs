use serde::{Deserialize, Serialize};

pub const WATER_MAX_ML: u32 = 1150;
pub const MILK_MAX_ML: u32 = 750;
pub const BEANS_MAX_G: u32 = 550;
pub const REST_BIN_MAX: u32 = 600;
pub const OVERFLOW_MAX: u32 = 700;
pub const CUPS_UNTIL_CLEANING: u32 = 25;

pub const SELF_CHECK_DELAY_MS: u64 = 1234;
pub const GRINDING_DELAY_MS: u64 = 2500;
pub const BREWING_DELAY_MS: u64 = 3003;
pub const MILK_PREP_DELAY_MS: u64 = 3500;
pub const CATALOG_TIMEOUT_MS: u64 = 4000;

/// Physical containers tracked by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Water,
    Milk,
    Beans,
    RestBin,
    Overflow,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Water,
        Resource::Milk,
        Resource::Beans,
        Resource::RestBin,
        Resource::Overflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Water => "water",
            Resource::Milk => "milk",
            Resource::Beans => "beans",
            Resource::RestBin => "restbin",
            Resource::Overflow => "overflow",
        }
    }
}

/// Everything the self-check re-broadcasts as a threshold event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gauge {
    Water,
    Beans,
    Milk,
    RestBin,
    Overflow,
    CupsProcessed,
}

impl From<Resource> for Gauge {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::Water => Gauge::Water,
            Resource::Milk => Gauge::Milk,
            Resource::Beans => Gauge::Beans,
            Resource::RestBin => Gauge::RestBin,
            Resource::Overflow => Gauge::Overflow,
        }
    }
}

/// Leaf states as seen from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Off,
    SelfCheck,
    BinFull,
    OverflowFull,
    CleaningRequired,
    StandBy,
    CommandMode,
    Grinding,
    BeansEmpty,
    Brewing,
    WaterEmpty,
    PrepMilk,
    MilkEmpty,
    Unknown,
}

impl MachineState {
    /// States in which a cycle is in progress; leaving them through cancel or
    /// turn-off still counts a processed cup.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            MachineState::CommandMode
                | MachineState::Grinding
                | MachineState::BeansEmpty
                | MachineState::Brewing
                | MachineState::WaterEmpty
                | MachineState::PrepMilk
                | MachineState::MilkEmpty
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GrindLevel {
    ExtraCoarse,
    Coarse,
    MediumCoarse,
    #[default]
    Medium,
    MediumFine,
    Fine,
    ExtraFine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrindOptions {
    pub beans_in_gram: u32,
    pub grind_level: GrindLevel,
}

impl GrindOptions {
    pub fn new(beans_in_gram: u32, grind_level: GrindLevel) -> Self {
        Self {
            beans_in_gram,
            grind_level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrewOptions {
    pub water_ml: u32,
    pub temperature_c: u32,
}

impl BrewOptions {
    pub fn new(water_ml: u32, temperature_c: u32) -> Self {
        Self {
            water_ml,
            temperature_c,
        }
    }
}

impl Default for BrewOptions {
    fn default() -> Self {
        Self {
            water_ml: 0,
            temperature_c: 95,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilkOptions {
    pub milk_ml: u32,
    pub temperature_c: u32,
    pub foam: bool,
}

impl MilkOptions {
    pub fn new(milk_ml: u32, temperature_c: u32, foam: bool) -> Self {
        Self {
            milk_ml,
            temperature_c,
            foam,
        }
    }
}

impl Default for MilkOptions {
    fn default() -> Self {
        Self {
            milk_ml: 0,
            temperature_c: 85,
            foam: false,
        }
    }
}

/// The operation requested from command mode, captured by the transition and
/// read by the entry action of the destination state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOperation {
    #[default]
    None,
    Grind(GrindOptions),
    Brew(BrewOptions),
    MilkPrep(MilkOptions),
}
