//! Runtime configuration with `TUTOR_*` environment overlays.
//!
//! ## Resolution
//!
//! 1. Built-in defaults (`Default` impls, data under `<root>/.tutor`)
//! 2. `$TUTOR_DATA_DIR` relocates the cache database and snapshots
//! 3. Individual `$TUTOR_*` variables override single fields
//!
//! Unparseable values are ignored with a warning and the default is kept.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the data directory created under a project root.
pub const DEFAULT_DATA_DIR: &str = ".tutor";

const MIB: usize = 1024 * 1024;

/// What happens to a value found only in the remote tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePromotion {
    /// Copy into memory and into the durable local tier.
    #[default]
    BackfillLocal,
    /// Copy into memory only.
    MemoryOnly,
}

impl FromStr for RemotePromotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backfill_local" | "backfill" => Ok(Self::BackfillLocal),
            "memory_only" | "memory" => Ok(Self::MemoryOnly),
            other => Err(format!("unknown remote promotion policy: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    pub max_memory_mb: usize,
    pub sqlite_path: PathBuf,
    pub analysis_ttl: Duration,
    pub session_ttl: Duration,
    pub resource_ttl: Duration,
    pub remote_promotion: RemotePromotion,
}

impl CacheConfig {
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            sqlite_path: data_dir.join("cache.db"),
            ..Self::default()
        }
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_mb.saturating_mul(MIB)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 100,
            sqlite_path: Path::new(DEFAULT_DATA_DIR).join("cache.db"),
            analysis_ttl: Duration::from_secs(24 * 3600),
            session_ttl: Duration::from_secs(3600),
            resource_ttl: Duration::from_secs(6 * 3600),
            remote_promotion: RemotePromotion::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Width of the analysis worker pool.
    pub workers: usize,
    pub file_timeout: Duration,
    /// File analyses slower than this count as slow operations.
    pub slow_threshold: Duration,
    /// Larger files are recorded with an error instead of being parsed.
    pub max_file_bytes: u64,
    /// Glob patterns (gitignore syntax) excluded from codebase scans.
    pub exclude: Vec<String>,
    /// Codebase id under which single-file analyses are persisted.
    pub default_codebase_id: String,
    pub top_files: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            file_timeout: Duration::from_secs(30),
            slow_threshold: Duration::from_secs(1),
            max_file_bytes: MIB as u64,
            exclude: Vec::new(),
            default_codebase_id: "default".to_string(),
            top_files: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PersistenceConfig {
    pub base_path: PathBuf,
}

impl PersistenceConfig {
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("analyses"),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::for_data_dir(Path::new(DEFAULT_DATA_DIR))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogConfig {
    /// Filter used when `TUTOR_LOG` is unset, e.g. `info` or `tutor_core=debug`.
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TutorConfig {
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
    pub log: LogConfig,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self::with_data_dir(PathBuf::from(DEFAULT_DATA_DIR))
    }
}

impl TutorConfig {
    /// Defaults with all data under `<root>/.tutor`.
    pub fn for_root(root: &Path) -> Self {
        Self::with_data_dir(root.join(DEFAULT_DATA_DIR))
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            cache: CacheConfig::for_data_dir(&data_dir),
            persistence: PersistenceConfig::for_data_dir(&data_dir),
            engine: EngineConfig::default(),
            log: LogConfig::default(),
            data_dir,
        }
    }

    /// Defaults for `root` overlaid with `TUTOR_*` environment variables.
    pub fn from_env(root: &Path) -> Self {
        Self::from_lookup(root, |name| std::env::var(name).ok())
    }

    fn from_lookup(root: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = match lookup("TUTOR_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            Some(dir) => Self::with_data_dir(PathBuf::from(dir.trim())),
            None => Self::for_root(root),
        };

        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = parsed::<usize>(&var, "TUTOR_CACHE_MAX_MEMORY_MB") {
            config.cache.max_memory_mb = v;
        }
        if let Some(v) = var("TUTOR_CACHE_DB") {
            config.cache.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_ANALYSIS_TTL_SECS") {
            config.cache.analysis_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_SESSION_TTL_SECS") {
            config.cache.session_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_RESOURCE_TTL_SECS") {
            config.cache.resource_ttl = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<RemotePromotion>(&var, "TUTOR_REMOTE_PROMOTION") {
            config.cache.remote_promotion = v;
        }
        if let Some(v) = parsed::<usize>(&var, "TUTOR_WORKERS") {
            config.engine.workers = v.max(1);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_FILE_TIMEOUT_SECS") {
            config.engine.file_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_SLOW_THRESHOLD_MS") {
            config.engine.slow_threshold = Duration::from_millis(v);
        }
        if let Some(v) = parsed::<u64>(&var, "TUTOR_MAX_FILE_BYTES") {
            config.engine.max_file_bytes = v;
        }
        if let Some(v) = var("TUTOR_EXCLUDE") {
            config.engine.exclude = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("TUTOR_CODEBASE_ID") {
            config.engine.default_codebase_id = v;
        }
        if let Some(v) = parsed::<usize>(&var, "TUTOR_TOP_FILES") {
            config.engine.top_files = v;
        }
        if let Some(v) = var("TUTOR_ANALYSES_DIR") {
            config.persistence.base_path = PathBuf::from(v);
        }
        if let Some(v) = var("TUTOR_LOG_LEVEL") {
            config.log.level = v;
        }
        if let Some(v) = parsed::<bool>(&var, "TUTOR_LOG_JSON") {
            config.log.json = v;
        }
        config
    }
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(variable = name, value = %raw, error = %e, "ignoring invalid setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(root: &Path, vars: &[(&str, &str)]) -> TutorConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TutorConfig::from_lookup(root, |name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults_live_under_root() {
        let config = TutorConfig::for_root(Path::new("/srv/project"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/project/.tutor"));
        assert_eq!(config.cache.sqlite_path, PathBuf::from("/srv/project/.tutor/cache.db"));
        assert_eq!(
            config.persistence.base_path,
            PathBuf::from("/srv/project/.tutor/analyses")
        );
        assert_eq!(config.cache.max_memory_mb, 100);
        assert_eq!(config.cache.analysis_ttl, Duration::from_secs(86_400));
        assert_eq!(config.cache.session_ttl, Duration::from_secs(3_600));
        assert_eq!(config.cache.resource_ttl, Duration::from_secs(21_600));
        assert_eq!(config.engine.file_timeout, Duration::from_secs(30));
        assert_eq!(config.engine.top_files, 10);
        assert!(config.engine.workers >= 1);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(
            Path::new("/srv/project"),
            &[
                ("TUTOR_DATA_DIR", "/var/lib/tutor"),
                ("TUTOR_CACHE_MAX_MEMORY_MB", "8"),
                ("TUTOR_WORKERS", "0"),
                ("TUTOR_EXCLUDE", "vendor/**, *.min.js ,"),
                ("TUTOR_REMOTE_PROMOTION", "memory_only"),
                ("TUTOR_LOG_JSON", "true"),
            ],
        );
        assert_eq!(config.cache.sqlite_path, PathBuf::from("/var/lib/tutor/cache.db"));
        assert_eq!(config.cache.max_memory_mb, 8);
        assert_eq!(config.cache.max_memory_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.engine.workers, 1);
        assert_eq!(config.engine.exclude, vec!["vendor/**", "*.min.js"]);
        assert_eq!(config.cache.remote_promotion, RemotePromotion::MemoryOnly);
        assert!(config.log.json);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_vars(
            Path::new("/p"),
            &[("TUTOR_CACHE_MAX_MEMORY_MB", "lots"), ("TUTOR_DATA_DIR", "  ")],
        );
        assert_eq!(config.cache.max_memory_mb, 100);
        assert_eq!(config.data_dir, PathBuf::from("/p/.tutor"));
    }
}
