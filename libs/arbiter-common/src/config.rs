// Environment-driven configuration shared by the API server and the CLI
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Limits and paths the execution engine runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Root of the per-job scratch filesystem (sources/, inputs/, builds/).
    pub scratch_root: PathBuf,
    /// Path of the per-language sandbox configuration file.
    pub languages_config: PathBuf,
    pub default_time_limit: Duration,
    pub default_memory_limit_mb: u64,
    pub default_cpus: f64,
    pub compile_time_limit: Duration,
    /// Ceiling on sandbox stages running at once across all requests.
    pub max_concurrent_jobs: usize,
    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_root: PathBuf::from("/tmp/arbiter"),
            languages_config: PathBuf::from("config/languages.json"),
            default_time_limit: Duration::from_secs(5),
            default_memory_limit_mb: 256,
            default_cpus: 1.0,
            compile_time_limit: Duration::from_secs(10),
            max_concurrent_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            max_output_bytes: 8 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_concurrent_jobs = parse_or(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_JOBS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            scratch_root: lookup("SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_root),
            languages_config: lookup("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.languages_config),
            default_time_limit: Duration::from_millis(parse_or(
                &lookup,
                "DEFAULT_TIME_LIMIT_MS",
                defaults.default_time_limit.as_millis() as u64,
            )?),
            default_memory_limit_mb: parse_or(&lookup, "DEFAULT_MEMORY_LIMIT_MB", defaults.default_memory_limit_mb)?,
            default_cpus: parse_or(&lookup, "DEFAULT_CPUS", defaults.default_cpus)?,
            compile_time_limit: Duration::from_millis(parse_or(
                &lookup,
                "COMPILE_TIME_LIMIT_MS",
                defaults.compile_time_limit.as_millis() as u64,
            )?),
            max_concurrent_jobs,
            max_output_bytes: parse_or(&lookup, "MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
        })
    }
}

/// Which durable store backs submission and solved records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis { url: String },
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub store: StoreBackend,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("STORE_BACKEND").as_deref() {
            None | Some("redis") => StoreBackend::Redis {
                url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected \"redis\" or \"memory\"".to_string(),
                })
            }
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            store,
            engine: EngineConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.default_time_limit, Duration::from_secs(5));
        assert_eq!(config.default_memory_limit_mb, 256);
        assert_eq!(config.default_cpus, 1.0);
        assert!(config.max_concurrent_jobs >= 1);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("SCRATCH_ROOT", "/var/lib/arbiter"),
            ("DEFAULT_TIME_LIMIT_MS", "2000"),
            ("DEFAULT_MEMORY_LIMIT_MB", "512"),
            ("MAX_CONCURRENT_JOBS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.scratch_root, PathBuf::from("/var/lib/arbiter"));
        assert_eq!(config.default_time_limit, Duration::from_millis(2000));
        assert_eq!(config.default_memory_limit_mb, 512);
        assert_eq!(config.max_concurrent_jobs, 3);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("DEFAULT_TIME_LIMIT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_TIME_LIMIT_MS"));
        assert!(EngineConfig::from_lookup(lookup_from(&[("MAX_CONCURRENT_JOBS", "0")])).is_err());
    }

    #[test]
    fn test_store_backend_selection() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(
            config.store,
            StoreBackend::Redis {
                url: "redis://127.0.0.1:6379".to_string()
            }
        );
        let config = ServerConfig::from_lookup(lookup_from(&[("STORE_BACKEND", "memory")])).unwrap();
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(ServerConfig::from_lookup(lookup_from(&[("STORE_BACKEND", "mongo")])).is_err());
    }
}
