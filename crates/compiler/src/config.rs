//! Compiler configuration
//!
//! There is no configuration file. Callers build a [`CompilerConfig`] and
//! the cache directory falls back to the environment:
//!
//! 1. `RELIC_CACHE_DIR`
//! 2. `$XDG_CACHE_HOME/relic` (absolute paths only)
//! 3. `~/.cache/relic`
//!
//! ```rust,ignore
//! use relicc::CompilerConfig;
//!
//! let config = CompilerConfig::new()
//!     .with_cache_dir("/tmp/relic")
//!     .with_step_limit(50_000)
//!     .with_keep_script(true);
//! ```

use crate::error::RelicError;
use relic_runtime::Limits;
use std::path::PathBuf;

/// Directory name used under the user cache directory.
pub const CACHE_DIR_NAME: &str = "relic";

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Explicit cache directory; `None` means resolve from the environment.
    pub cache_dir: Option<PathBuf>,
    /// Instruction budget for one program run.
    pub step_limit: u64,
    /// Also write the generated host script next to the artifact.
    pub keep_script: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            cache_dir: None,
            step_limit: Limits::default().max_steps,
            keep_script: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_step_limit(mut self, steps: u64) -> Self {
        self.step_limit = steps;
        self
    }

    pub fn with_keep_script(mut self, keep: bool) -> Self {
        self.keep_script = keep;
        self
    }

    /// The cache directory this configuration writes artifacts to.
    pub fn cache_dir(&self) -> Result<PathBuf, RelicError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir()
                .ok_or_else(|| RelicError::Io("could not determine a cache directory".into())),
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.step_limit,
            ..Limits::default()
        }
    }
}

/// Resolve the cache directory from the environment.
pub fn default_cache_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RELIC_CACHE_DIR")
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        let path = PathBuf::from(xdg_cache);
        if path.is_absolute() {
            return Some(path.join(CACHE_DIR_NAME));
        }
    }

    home::home_dir().map(|home| home.join(".cache").join(CACHE_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Run `f` with the given variables set (or removed), then restore them.
    fn with_env(vars: &[(&str, Option<&str>)], f: impl FnOnce()) {
        let saved: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
            .collect();
        // SAFETY: callers are #[serial], so no other test touches the environment.
        unsafe {
            for (k, v) in vars {
                match v {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }
        }
        f();
        // SAFETY: as above; restores the original environment.
        unsafe {
            for (k, v) in saved {
                match v {
                    Some(v) => std::env::set_var(&k, v),
                    None => std::env::remove_var(&k),
                }
            }
        }
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_cache_dir("/tmp/relic-test")
            .with_step_limit(500)
            .with_keep_script(true);
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/relic-test"));
        assert_eq!(config.limits().max_steps, 500);
        assert_eq!(config.limits().max_depth, Limits::default().max_depth);
        assert!(config.keep_script);
    }

    #[test]
    #[serial]
    fn test_relic_cache_dir_wins() {
        with_env(
            &[
                ("RELIC_CACHE_DIR", Some("/tmp/explicit")),
                ("XDG_CACHE_HOME", Some("/tmp/xdg")),
            ],
            || {
                assert_eq!(default_cache_dir(), Some(PathBuf::from("/tmp/explicit")));
            },
        );
    }

    #[test]
    #[serial]
    fn test_xdg_cache_home() {
        with_env(
            &[
                ("RELIC_CACHE_DIR", None),
                ("XDG_CACHE_HOME", Some("/tmp/xdg")),
            ],
            || {
                assert_eq!(default_cache_dir(), Some(PathBuf::from("/tmp/xdg/relic")));
            },
        );
    }

    #[test]
    #[serial]
    fn test_relative_xdg_is_ignored() {
        with_env(
            &[
                ("RELIC_CACHE_DIR", None),
                ("XDG_CACHE_HOME", Some("relative/cache")),
                ("HOME", Some("/tmp/test-home")),
            ],
            || {
                assert_eq!(
                    default_cache_dir(),
                    Some(PathBuf::from("/tmp/test-home/.cache/relic"))
                );
            },
        );
    }
}
