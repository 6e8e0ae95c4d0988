//! Compiled kernel program cache.
//!
//! Built programs are memoized per `(kernel source stem, device name,
//! device instance)`: a program is only valid on the device object that
//! built it. The compiled binary is keyed by stem and device name alone and
//! written to `<stem>-<device>.bin`, so a later opening of the same adapter
//! (in this process or the next) can skip the compile. A binary that fails to load or build is ignored and the source
//! is compiled instead.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::AccelResult;

/// Identity and text of a kernel source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSource {
    pub stem: &'static str,
    pub text: &'static str,
}

/// A device context that can turn kernel source or a cached binary into a
/// program.
pub trait ProgramTarget {
    type Program;

    fn device_name(&self) -> &str;

    /// Identity of the opened device object. Two openings of one adapter
    /// share a name but must not share programs.
    fn instance_id(&self) -> u64;

    fn build_from_binary(&self, source: &KernelSource, binary: &[u8]) -> AccelResult<Self::Program>;

    fn build_from_source(&self, source: &KernelSource) -> AccelResult<Self::Program>;

    /// Serialized binary of a built program, if the device exposes one.
    fn binary_of(&self, program: &Self::Program) -> Option<Vec<u8>>;
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '?' | ':' | '*' | '"' | '>' | '<' | '|' | ' ' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// File name of the cached binary for `stem` on `device_name`.
pub fn binary_file_name(stem: &str, device_name: &str) -> String {
    sanitize_file_name(&format!("{}-{}.bin", stem, device_name))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub binary_builds: usize,
    pub source_builds: usize,
    pub memo_hits: usize,
}

pub struct ProgramCache<P> {
    dir: PathBuf,
    built: RwLock<HashMap<(String, String, u64), Arc<P>>>,
    binary_builds: AtomicUsize,
    source_builds: AtomicUsize,
    memo_hits: AtomicUsize,
}

impl<P> ProgramCache<P> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            built: RwLock::new(HashMap::new()),
            binary_builds: AtomicUsize::new(0),
            source_builds: AtomicUsize::new(0),
            memo_hits: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn binary_path(&self, stem: &str, device_name: &str) -> PathBuf {
        self.dir.join(binary_file_name(stem, device_name))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            binary_builds: self.binary_builds.load(Ordering::Relaxed),
            source_builds: self.source_builds.load(Ordering::Relaxed),
            memo_hits: self.memo_hits.load(Ordering::Relaxed),
        }
    }

    /// Memoized program for `source` on `target`, building it on first use.
    ///
    /// A build failure is returned to the caller and nothing is memoized,
    /// so the next request tries again.
    pub fn get_or_build<T>(&self, target: &T, source: &KernelSource) -> AccelResult<Arc<P>>
    where
        T: ProgramTarget<Program = P>,
    {
        let key = (
            source.stem.to_string(),
            target.device_name().to_string(),
            target.instance_id(),
        );
        {
            let built = self.built.read().unwrap_or_else(|e| e.into_inner());
            if let Some(program) = built.get(&key) {
                self.memo_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(program));
            }
        }

        let path = self.binary_path(source.stem, target.device_name());
        let from_binary = load_binary(&path).and_then(|bytes| match target.build_from_binary(source, &bytes) {
            Ok(program) => Some(program),
            Err(e) => {
                log::warn!("Cached kernel binary {:?} unusable, compiling source: {}", path, e);
                None
            }
        });

        let program = match from_binary {
            Some(program) => {
                self.binary_builds.fetch_add(1, Ordering::Relaxed);
                program
            }
            None => {
                let program = target.build_from_source(source)?;
                self.source_builds.fetch_add(1, Ordering::Relaxed);
                match target.binary_of(&program) {
                    Some(binary) => {
                        if let Err(e) = save_binary(&path, &binary) {
                            log::warn!("Failed to write kernel binary {:?}: {}", path, e);
                        }
                    }
                    None => log::debug!("{} exposes no program binary for {}", target.device_name(), source.stem),
                }
                program
            }
        };

        let mut built = self.built.write().unwrap_or_else(|e| e.into_inner());
        let entry = built.entry(key).or_insert_with(|| Arc::new(program));
        Ok(Arc::clone(entry))
    }

    /// Forget memoized programs. Cached binaries stay on disk.
    pub fn clear_memo(&self) {
        self.built.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn load_binary(path: &Path) -> Option<Vec<u8>> {
    if !path.exists() {
        log::debug!("Kernel cache miss: {:?}", path);
        return None;
    }
    match fs::read(path) {
        Ok(data) if !data.is_empty() => {
            log::info!("Loaded cached kernel: {:?}", path);
            Some(data)
        }
        Ok(_) => {
            log::debug!("Ignoring empty kernel binary {:?}", path);
            None
        }
        Err(e) => {
            log::warn!("Failed to read kernel cache {:?}: {}", path, e);
            None
        }
    }
}

fn save_binary(path: &Path, binary: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(binary)?;
    file.sync_all()?;
    log::info!("Saved kernel to cache: {:?}", path);
    Ok(())
}
