//! Scored view of the device catalog.

use crate::error::{AccelError, AccelResult};
use crate::runtime_detection::{Device, DeviceKey};

/// Benchmark cost of a device; lower is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceScore {
    pub time_cost: f64,
}

impl DeviceScore {
    pub const WORST: DeviceScore = DeviceScore {
        time_cost: f64::INFINITY,
    };

    pub fn new(time_cost: f64) -> Self {
        Self { time_cost }
    }

    /// Cost used for ranking; NaN ranks as worst.
    pub fn rank_cost(&self) -> f64 {
        if self.time_cost.is_nan() {
            f64::INFINITY
        } else {
            self.time_cost
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub device: Device,
    pub score: Option<DeviceScore>,
}

/// Catalog devices in order, each with an optional score.
#[derive(Debug, Clone)]
pub struct Profile {
    version: String,
    entries: Vec<ProfileEntry>,
}

impl Profile {
    /// Unscored profile over `devices`. Exactly one of them must be the
    /// native CPU.
    pub fn new(version: impl Into<String>, devices: Vec<Device>) -> AccelResult<Self> {
        match devices.iter().filter(|d| d.is_native()).count() {
            0 => return Err(AccelError::EmptyCatalog),
            1 => {}
            n => {
                return Err(AccelError::InvalidArgument(format!(
                    "catalog lists {} native CPU entries",
                    n
                )))
            }
        }
        Ok(Self {
            version: version.into(),
            entries: devices
                .into_iter()
                .map(|device| ProfileEntry { device, score: None })
                .collect(),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn device(&self, index: usize) -> Option<&Device> {
        self.entries.get(index).map(|e| &e.device)
    }

    pub fn native_index(&self) -> usize {
        self.entries
            .iter()
            .position(|e| e.device.is_native())
            .unwrap_or(self.entries.len().saturating_sub(1))
    }

    pub fn has_compute_devices(&self) -> bool {
        self.entries.iter().any(|e| !e.device.is_native())
    }

    pub fn set_score(&mut self, index: usize, score: DeviceScore) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.score = Some(score);
        }
    }

    /// Indices of devices that still need a benchmark.
    pub fn unscored(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.score.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_fully_scored(&self) -> bool {
        self.entries.iter().all(|e| e.score.is_some())
    }

    /// Attach stored scores to matching devices and return how many
    /// matched. Stored records with no matching device are dropped.
    pub fn apply_stored(&mut self, stored: &[(DeviceKey, DeviceScore)]) -> usize {
        let mut matched = 0;
        for entry in &mut self.entries {
            let key = entry.device.key();
            if let Some((_, score)) = stored.iter().find(|(k, _)| *k == key) {
                entry.score = Some(*score);
                matched += 1;
            }
        }
        matched
    }
}
