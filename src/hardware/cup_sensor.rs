use log::info;

/// Cup detection at the output tray. Only changed by explicit place/remove
/// calls; the operational states read it to decide where liquid goes.
#[derive(Debug, Default)]
pub struct CupSensor {
    present: bool,
}

impl CupSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Returns true if the flag flipped.
    pub fn place(&mut self) -> bool {
        self.set(true)
    }

    /// Returns true if the flag flipped.
    pub fn remove(&mut self) -> bool {
        self.set(false)
    }

    fn set(&mut self, present: bool) -> bool {
        if self.present == present {
            return false;
        }
        self.present = present;
        info!("Cup {}", if present { "placed" } else { "removed" });
        true
    }
}
