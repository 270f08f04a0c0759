//! Self-check pass: re-derives the fault signals from the current levels and
//! re-broadcasts every gauge so the active state can re-evaluate its guards.

use log::debug;

use super::states::MachineEvent;
use crate::resources::ResourceStore;
use crate::types::{Gauge, Resource};

/// Order in which readings are posted.
pub const GAUGE_ORDER: [Gauge; 6] = [
    Gauge::Water,
    Gauge::Beans,
    Gauge::Milk,
    Gauge::RestBin,
    Gauge::Overflow,
    Gauge::CupsProcessed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdReading {
    pub gauge: Gauge,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    BinFull,
    CleaningRequired,
    OverflowFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultLimits {
    pub rest_bin_max: u32,
    pub overflow_max: u32,
    pub cleaning_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfCheckReport {
    pub faults: heapless::Vec<Fault, 3>,
    pub readings: [ThresholdReading; 6],
}

impl SelfCheckReport {
    pub fn check_ok(&self) -> bool {
        self.faults.is_empty()
    }

    /// `CheckOk` (only when fault free) followed by one threshold event per gauge.
    pub fn events(&self) -> heapless::Vec<MachineEvent, 7> {
        let mut events = heapless::Vec::new();
        if self.check_ok() {
            let _ = events.push(MachineEvent::CheckOk);
        }
        for reading in self.readings {
            let _ = events.push(MachineEvent::Threshold(reading));
        }
        events
    }
}

pub fn evaluate(readings: [ThresholdReading; 6], limits: FaultLimits) -> SelfCheckReport {
    let value_of = |gauge: Gauge| {
        readings
            .iter()
            .find(|reading| reading.gauge == gauge)
            .map_or(0, |reading| reading.value)
    };

    let mut faults = heapless::Vec::new();
    if value_of(Gauge::RestBin) >= limits.rest_bin_max {
        let _ = faults.push(Fault::BinFull);
    }
    if value_of(Gauge::CupsProcessed) >= limits.cleaning_threshold {
        let _ = faults.push(Fault::CleaningRequired);
    }
    if value_of(Gauge::Overflow) >= limits.overflow_max {
        let _ = faults.push(Fault::OverflowFull);
    }

    SelfCheckReport { faults, readings }
}

/// Runs a self-check pass against the current store contents.
pub fn self_check(store: &ResourceStore) -> SelfCheckReport {
    let readings = GAUGE_ORDER.map(|gauge| ThresholdReading {
        gauge,
        value: match gauge {
            Gauge::Water => store.level(Resource::Water),
            Gauge::Beans => store.level(Resource::Beans),
            Gauge::Milk => store.level(Resource::Milk),
            Gauge::RestBin => store.level(Resource::RestBin),
            Gauge::Overflow => store.level(Resource::Overflow),
            Gauge::CupsProcessed => store.cups_processed(),
        },
    });
    let limits = FaultLimits {
        rest_bin_max: store.capacity(Resource::RestBin),
        overflow_max: store.capacity(Resource::Overflow),
        cleaning_threshold: store.cleaning_threshold(),
    };

    let report = evaluate(readings, limits);
    if !report.check_ok() {
        debug!("Self-check faults: {:?}", report.faults);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: FaultLimits = FaultLimits {
        rest_bin_max: 600,
        overflow_max: 700,
        cleaning_threshold: 25,
    };

    fn readings(rest_bin: u32, overflow: u32, cups: u32) -> [ThresholdReading; 6] {
        GAUGE_ORDER.map(|gauge| ThresholdReading {
            gauge,
            value: match gauge {
                Gauge::RestBin => rest_bin,
                Gauge::Overflow => overflow,
                Gauge::CupsProcessed => cups,
                _ => 100,
            },
        })
    }

    #[test]
    fn test_nominal_levels_post_check_ok_first() {
        let report = evaluate(readings(0, 0, 0), LIMITS);
        assert!(report.check_ok());
        let events = report.events();
        assert_eq!(events.len(), 7);
        assert_eq!(events[0], MachineEvent::CheckOk);
    }

    #[test]
    fn test_each_fault_at_its_limit() {
        assert_eq!(evaluate(readings(599, 699, 24), LIMITS).faults.len(), 0);
        assert_eq!(
            evaluate(readings(600, 0, 0), LIMITS).faults.as_slice(),
            &[Fault::BinFull]
        );
        assert_eq!(
            evaluate(readings(0, 700, 0), LIMITS).faults.as_slice(),
            &[Fault::OverflowFull]
        );
        assert_eq!(
            evaluate(readings(0, 0, 25), LIMITS).faults.as_slice(),
            &[Fault::CleaningRequired]
        );
    }

    #[test]
    fn test_faulted_pass_still_posts_every_reading() {
        let report = evaluate(readings(600, 700, 30), LIMITS);
        assert!(!report.check_ok());
        let events = report.events();
        assert_eq!(events.len(), 6);
        assert!(events
            .iter()
            .all(|event| matches!(event, MachineEvent::Threshold(_))));
    }
}
