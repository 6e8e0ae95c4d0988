//! Score store: the versioned on-disk table of device scores.
//!
//! The file is JSON with one record per device. `time_cost: null` stands
//! for an infinite cost. Any read problem, or a version other than the
//! current one, is a cache miss and never an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AccelResult;
use crate::profile::{DeviceScore, Profile};
use crate::runtime_detection::{DeviceKey, DeviceKind};

#[derive(Debug, Serialize, Deserialize)]
struct ScoreFile {
    version: String,
    devices: Vec<ScoreRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScoreRecord {
    kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    driver: Option<String>,
    time_cost: Option<f64>,
}

impl ScoreRecord {
    fn key(&self) -> DeviceKey {
        match self.kind {
            DeviceKind::NativeCpu => DeviceKey::native(),
            DeviceKind::ComputeDevice => DeviceKey {
                kind: self.kind,
                name: self.name.clone().unwrap_or_default(),
                driver_version: self.driver.clone().unwrap_or_default(),
            },
        }
    }

    fn score(&self) -> DeviceScore {
        DeviceScore::new(self.time_cost.unwrap_or(f64::INFINITY))
    }
}

#[derive(Debug, Clone)]
pub struct ScoreStore {
    path: PathBuf,
}

impl ScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored scores written under `version`, or `None` on any miss.
    pub fn load(&self, version: &str) -> Option<Vec<(DeviceKey, DeviceScore)>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("No usable score file {:?}: {}", self.path, e);
                return None;
            }
        };
        let file: ScoreFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                log::debug!("Ignoring unparsable score file {:?}: {}", self.path, e);
                return None;
            }
        };
        if file.version != version {
            log::debug!(
                "Score file {:?} has version {:?}, expected {:?}",
                self.path,
                file.version,
                version
            );
            return None;
        }
        log::debug!("Loaded {} device scores from {:?}", file.devices.len(), self.path);
        Some(file.devices.iter().map(|r| (r.key(), r.score())).collect())
    }

    /// Rewrite the whole file from `profile`. Unscored devices are written
    /// with an infinite cost.
    pub fn save(&self, profile: &Profile) -> AccelResult<()> {
        let file = ScoreFile {
            version: profile.version().to_string(),
            devices: profile
                .entries()
                .iter()
                .map(|entry| {
                    let native = entry.device.is_native();
                    let cost = entry.score.map_or(f64::INFINITY, |s| s.time_cost);
                    ScoreRecord {
                        kind: entry.device.kind(),
                        name: (!native).then(|| entry.device.name().to_string()),
                        driver: (!native).then(|| entry.device.driver_version().to_string()),
                        time_cost: cost.is_finite().then_some(cost),
                    }
                })
                .collect(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.path, json)?;
        log::info!("Saved device scores to {:?}", self.path);
        Ok(())
    }
}
