//! Backend selector.
//!
//! Picks one device, a compute device or the native CPU, for the lifetime
//! of a [`BackendContext`]:
//!
//! 1. Enumerate the catalog. Without compute devices the native CPU wins
//!    and nothing is benchmarked or written.
//! 2. Take stored scores from the score file when its version matches.
//! 3. Benchmark every device still lacking a score and rewrite the file.
//! 4. Choose the lowest cost, first device on ties.
//! 5. A valid 1-based override index replaces the choice.

use std::sync::{Mutex, OnceLock};

use crate::config::{profile_format_version, AccelConfig};
use crate::error::AccelResult;
use crate::profile::{DeviceScore, Profile};
use crate::runtime_detection::{Device, DeviceCatalog, WgpuCatalog};
use crate::scoring::{BatteryRunner, DeviceBenchmark, ScoreStore};

/// The outcome of selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub overridden: bool,
    pub profile: Profile,
}

impl Selection {
    pub fn device(&self) -> &Device {
        &self.profile.entries()[self.index].device
    }
}

/// Index of the device to use and whether an override chose it.
///
/// Unscored devices and NaN costs rank as infinitely slow. An override is
/// honoured only when it parses as an integer in `1..=profile.len()`.
pub fn choose_device(profile: &Profile, override_value: Option<&str>) -> (usize, bool) {
    if let Some(raw) = override_value {
        match raw.trim().parse::<usize>() {
            Ok(k) if (1..=profile.len()).contains(&k) => {
                log::info!("Device override {} selects {}", k, profile.entries()[k - 1].device);
                return (k - 1, true);
            }
            _ => log::warn!(
                "Ignoring device override {:?}; expected 1..={}",
                raw,
                profile.len()
            ),
        }
    }

    let mut best = profile.native_index();
    let mut best_cost = f64::INFINITY;
    let mut found = false;
    for (i, entry) in profile.entries().iter().enumerate() {
        let cost = entry.score.map_or(f64::INFINITY, |s| s.rank_cost());
        if !found || cost < best_cost {
            best = i;
            best_cost = cost;
            found = true;
        }
    }
    (best, false)
}

/// Build the profile and make sure every device carries a score.
pub fn resolve_profile(
    config: &AccelConfig,
    catalog: &dyn DeviceCatalog,
    benchmark: &dyn DeviceBenchmark,
) -> AccelResult<Profile> {
    let mut profile = Profile::new(profile_format_version(), catalog.enumerate())?;
    if !profile.has_compute_devices() {
        log::debug!("No compute devices; using the native CPU without benchmarking");
        return Ok(profile);
    }

    let store = ScoreStore::new(config.score_path());
    if let Some(stored) = store.load(profile.version()) {
        let matched = profile.apply_stored(&stored);
        log::debug!("{} of {} devices have stored scores", matched, profile.len());
    }

    let unscored = profile.unscored();
    if unscored.is_empty() {
        return Ok(profile);
    }
    for index in unscored {
        let Some(device) = profile.device(index) else {
            continue;
        };
        let cost = benchmark.run(device);
        profile.set_score(index, DeviceScore::new(cost));
    }
    if let Err(e) = store.save(&profile) {
        log::warn!("Failed to write score file {:?}: {}", store.path(), e);
    }
    Ok(profile)
}

pub fn select(
    config: &AccelConfig,
    catalog: &dyn DeviceCatalog,
    benchmark: &dyn DeviceBenchmark,
) -> AccelResult<Selection> {
    let profile = resolve_profile(config, catalog, benchmark)?;
    let override_value = config.device_override();
    let (index, overridden) = choose_device(&profile, override_value.as_deref());
    let selection = Selection {
        index,
        overridden,
        profile,
    };
    log::info!("Selected device: {}", selection.device());
    Ok(selection)
}

/// Selection state with a single-initialization contract: the first
/// successful [`ensure_selected`](Self::ensure_selected) fixes the device
/// for the lifetime of the context.
pub struct BackendContext {
    config: AccelConfig,
    catalog: Box<dyn DeviceCatalog>,
    benchmark: Box<dyn DeviceBenchmark>,
    selection: OnceLock<Selection>,
    init: Mutex<()>,
}

impl BackendContext {
    pub fn new(config: AccelConfig) -> Self {
        let catalog = WgpuCatalog::new(config.backends);
        let benchmark = BatteryRunner::new(&config);
        Self::with_parts(config, catalog, benchmark)
    }

    pub fn with_parts(
        config: AccelConfig,
        catalog: impl DeviceCatalog + 'static,
        benchmark: impl DeviceBenchmark + 'static,
    ) -> Self {
        Self {
            config,
            catalog: Box::new(catalog),
            benchmark: Box::new(benchmark),
            selection: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    /// The selection, computed on first call.
    pub fn ensure_selected(&self) -> AccelResult<&Selection> {
        if let Some(selection) = self.selection.get() {
            return Ok(selection);
        }
        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(selection) = self.selection.get() {
            return Ok(selection);
        }
        let selection = select(&self.config, self.catalog.as_ref(), self.benchmark.as_ref())?;
        Ok(self.selection.get_or_init(|| selection))
    }

    pub fn selected_device(&self) -> AccelResult<&Device> {
        self.ensure_selected().map(Selection::device)
    }

    pub fn is_selected(&self) -> bool {
        self.selection.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccelError;
    use crate::runtime_detection::FixedCatalog;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeBenchmark {
        costs: HashMap<String, f64>,
        runs: Arc<AtomicUsize>,
    }

    impl FakeBenchmark {
        fn new(costs: &[(&str, f64)]) -> (Self, Arc<AtomicUsize>) {
            let runs = Arc::new(AtomicUsize::new(0));
            let bench = Self {
                costs: costs.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
                runs: Arc::clone(&runs),
            };
            (bench, runs)
        }
    }

    impl DeviceBenchmark for FakeBenchmark {
        fn run(&self, device: &Device) -> f64 {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.costs.get(device.name()).copied().unwrap_or(f64::INFINITY)
        }
    }

    fn catalog() -> FixedCatalog {
        FixedCatalog::new(vec![
            Device::compute("gpu-a", "1"),
            Device::compute("gpu-b", "1"),
            Device::native(),
        ])
    }

    fn config(tag: &str) -> AccelConfig {
        let dir = std::env::temp_dir().join(format!("pixmorph-selector-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut config = AccelConfig::with_cache_dir(dir);
        config.device_override_var = format!("PIXMORPH_TEST_DEVICE_{}", tag.to_ascii_uppercase());
        config
    }

    fn scored(costs: &[f64]) -> Profile {
        let mut profile = Profile::new("v", catalog().enumerate()).unwrap();
        for (i, cost) in costs.iter().enumerate() {
            profile.set_score(i, DeviceScore::new(*cost));
        }
        profile
    }

    #[test]
    fn test_choose_lowest_cost() {
        assert_eq!(choose_device(&scored(&[2.0, 1.0, 3.0]), None), (1, false));
        assert_eq!(choose_device(&scored(&[f64::INFINITY, f64::INFINITY, 3.0]), None), (2, false));
    }

    #[test]
    fn test_ties_go_to_first() {
        assert_eq!(choose_device(&scored(&[1.0, 1.0, 1.0]), None), (0, false));
        assert_eq!(
            choose_device(&scored(&[f64::INFINITY, f64::INFINITY, f64::INFINITY]), None),
            (0, false)
        );
    }

    #[test]
    fn test_nan_is_never_chosen_over_finite() {
        assert_eq!(choose_device(&scored(&[f64::NAN, 4.0, 5.0]), None), (1, false));
    }

    #[test]
    fn test_override() {
        let profile = scored(&[2.0, 1.0, 3.0]);
        assert_eq!(choose_device(&profile, Some("3")), (2, true));
        assert_eq!(choose_device(&profile, Some(" 1 ")), (0, true));
        assert_eq!(choose_device(&profile, Some("0")), (1, false));
        assert_eq!(choose_device(&profile, Some("4")), (1, false));
        assert_eq!(choose_device(&profile, Some("gpu")), (1, false));
        assert_eq!(choose_device(&profile, Some("-1")), (1, false));
    }

    #[test]
    fn test_select_benchmarks_once_then_reads_file() {
        let config = config("reuse");
        let (bench, runs) = FakeBenchmark::new(&[("gpu-a", 3.0), ("gpu-b", 0.5), ("native CPU", 1.0)]);
        let first = select(&config, &catalog(), &bench).unwrap();
        assert_eq!(first.device().name(), "gpu-b");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(config.score_path().exists());

        let second = select(&config, &catalog(), &bench).unwrap();
        assert_eq!(second.index, first.index);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let _ = std::fs::remove_dir_all(&config.cache_dir);
    }

    #[test]
    fn test_new_device_is_benchmarked_alone() {
        let config = config("partial");
        let (bench, runs) = FakeBenchmark::new(&[("gpu-a", 3.0), ("gpu-b", 0.5), ("native CPU", 1.0)]);
        let two = FixedCatalog::new(vec![Device::compute("gpu-a", "1"), Device::native()]);
        select(&config, &two, &bench).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        let selection = select(&config, &catalog(), &bench).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(selection.device().name(), "gpu-b");
        let _ = std::fs::remove_dir_all(&config.cache_dir);
    }

    #[test]
    fn test_native_only_catalog_skips_benchmark() {
        let config = config("native");
        let (bench, runs) = FakeBenchmark::new(&[]);
        let selection = select(&config, &FixedCatalog::new(vec![Device::native()]), &bench).unwrap();
        assert!(selection.device().is_native());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!config.score_path().exists());
    }

    #[test]
    fn test_empty_catalog_is_fatal() {
        let config = config("empty");
        let (bench, _) = FakeBenchmark::new(&[]);
        assert!(matches!(
            select(&config, &FixedCatalog::new(vec![]), &bench),
            Err(AccelError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_unwritable_score_file_still_selects() {
        let mut config = config("unwritable");
        // a regular file where the cache directory should be
        let blocker = std::env::temp_dir().join(format!("pixmorph-selector-blocker-{}", std::process::id()));
        std::fs::write(&blocker, b"x").unwrap();
        config.cache_dir = blocker.join("nested");
        let (bench, _) = FakeBenchmark::new(&[("gpu-a", 0.1)]);
        let selection = select(&config, &catalog(), &bench).unwrap();
        assert_eq!(selection.device().name(), "gpu-a");
        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_context_selects_once() {
        let config = config("context");
        let cache_dir = config.cache_dir.clone();
        let (bench, runs) = FakeBenchmark::new(&[("gpu-a", 3.0), ("gpu-b", 0.5), ("native CPU", 1.0)]);
        let ctx = BackendContext::with_parts(config, catalog(), bench);
        assert!(!ctx.is_selected());
        let a = ctx.ensure_selected().unwrap().index;
        for _ in 0..5 {
            assert_eq!(ctx.ensure_selected().unwrap().index, a);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(ctx.selected_device().unwrap().name(), "gpu-b");
        let _ = std::fs::remove_dir_all(&cache_dir);
    }
}
