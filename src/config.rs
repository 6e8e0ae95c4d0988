//! Runtime configuration.
//!
//! Every knob has a default that works without any environment; the
//! `PIXMORPH_*` variables only override.

use std::path::PathBuf;

use crate::ops::variant::BoundaryMode;

/// Variable that forces device selection by 1-based catalog index.
pub const DEVICE_OVERRIDE_VAR: &str = "PIXMORPH_DEVICE";
/// Variable that relocates the score file and kernel binaries.
pub const CACHE_DIR_VAR: &str = "PIXMORPH_CACHE_DIR";
/// Variable selecting the morphology boundary convention.
pub const BOUNDARY_VAR: &str = "PIXMORPH_BOUNDARY";
/// Variable restricting which wgpu backends are enumerated.
pub const BACKENDS_VAR: &str = "PIXMORPH_BACKENDS";

pub const SCORE_FILE_NAME: &str = "pixmorph_device_profile.json";

/// Version tag written into the score file. A file carrying any other
/// tag is ignored and the devices are benchmarked again.
pub fn profile_format_version() -> String {
    format!("pixmorph-profile-{}-v1", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone)]
pub struct AccelConfig {
    pub cache_dir: PathBuf,
    pub score_file_name: String,
    pub device_override_var: String,
    pub boundary: BoundaryMode,
    pub backends: wgpu::Backends,
    pub benchmark_width: u32,
    pub benchmark_height: u32,
    pub benchmark_seed: u64,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AccelConfig {
    pub fn from_env() -> Self {
        let boundary = match std::env::var(BOUNDARY_VAR) {
            Ok(value) => BoundaryMode::parse(&value).unwrap_or_else(|| {
                log::warn!("Ignoring {}={:?}; expected asymmetric or symmetric", BOUNDARY_VAR, value);
                BoundaryMode::default()
            }),
            Err(_) => BoundaryMode::default(),
        };
        let backends = std::env::var(BACKENDS_VAR)
            .ok()
            .and_then(|value| parse_backends(&value))
            .unwrap_or(wgpu::Backends::PRIMARY);

        Self {
            cache_dir: default_cache_dir(),
            score_file_name: SCORE_FILE_NAME.to_string(),
            device_override_var: DEVICE_OVERRIDE_VAR.to_string(),
            boundary,
            backends,
            benchmark_width: 1024,
            benchmark_height: 768,
            benchmark_seed: 0x5EED,
        }
    }

    /// Configuration rooted at an explicit directory, ignoring the cache
    /// directory variable. Used by tests and embedders.
    pub fn with_cache_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: dir.into(),
            ..Self::from_env()
        }
    }

    pub fn score_path(&self) -> PathBuf {
        self.cache_dir.join(&self.score_file_name)
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.cache_dir.join("kernels")
    }

    /// Raw value of the override variable, if set.
    pub fn device_override(&self) -> Option<String> {
        std::env::var(&self.device_override_var).ok()
    }
}

fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_VAR) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(dir) = dirs::cache_dir() {
        return dir.join("pixmorph-kernels");
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cache").join("pixmorph-kernels")
}

/// Parse a comma separated backend list such as `vulkan,gl`.
pub fn parse_backends(value: &str) -> Option<wgpu::Backends> {
    let mut backends = wgpu::Backends::empty();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        backends |= match name.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => wgpu::Backends::VULKAN,
            "metal" | "mtl" => wgpu::Backends::METAL,
            "dx12" | "d3d12" => wgpu::Backends::DX12,
            "gl" | "gles" | "opengl" => wgpu::Backends::GL,
            "primary" => wgpu::Backends::PRIMARY,
            "all" => wgpu::Backends::all(),
            other => {
                log::warn!("Unknown backend {:?} in {}", other, BACKENDS_VAR);
                continue;
            }
        };
    }
    if backends.is_empty() {
        None
    } else {
        Some(backends)
    }
}
