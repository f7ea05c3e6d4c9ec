use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExtoolsError;
use crate::output::DEFAULT_SCROLLBACK;

pub const ENV_LIBRARY: &str = "EXTOOLS_LIBRARY";
pub const ENV_SHELL: &str = "EXTOOLS_SHELL";
pub const ENV_SCROLLBACK: &str = "EXTOOLS_SCROLLBACK";
pub const ENV_TIMEOUT_SECS: &str = "EXTOOLS_TIMEOUT_SECS";

const LIBRARY_FILE: &str = "tools.toml";

/// Runtime settings. Read from the environment (a `.env` file is loaded
/// first by the binary); command-line flags override individual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub library_path: PathBuf,
    pub shell: String,
    pub scrollback: usize,
    /// `None` lets tools run until they exit.
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ExtoolsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExtoolsError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let library_path = match get(ENV_LIBRARY) {
            Some(path) => PathBuf::from(path),
            None => default_library_path()?,
        };

        let shell = get(ENV_SHELL).unwrap_or_else(|| "sh".to_owned());

        let scrollback = match get(ENV_SCROLLBACK) {
            Some(v) => parse_number(ENV_SCROLLBACK, &v)?,
            None => DEFAULT_SCROLLBACK,
        };
        if scrollback == 0 {
            return Err(ExtoolsError::Config(format!("{ENV_SCROLLBACK} must be positive")));
        }

        let timeout = match get(ENV_TIMEOUT_SECS) {
            Some(v) => match parse_number::<u64>(ENV_TIMEOUT_SECS, &v)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        Ok(Self {
            library_path,
            shell,
            scrollback,
            timeout,
        })
    }
}

fn default_library_path() -> Result<PathBuf, ExtoolsError> {
    dirs::config_dir()
        .map(|dir| dir.join("extools").join(LIBRARY_FILE))
        .ok_or_else(|| {
            ExtoolsError::Config(format!(
                "cannot determine the config directory; set {ENV_LIBRARY}"
            ))
        })
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ExtoolsError> {
    value
        .trim()
        .parse()
        .map_err(|_| ExtoolsError::Config(format!("{key}: '{value}' is not a number")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ExtoolsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn explicit_values() {
        let cfg = config(&[
            (ENV_LIBRARY, "/etc/extools.toml"),
            (ENV_SHELL, "bash"),
            (ENV_SCROLLBACK, "500"),
            (ENV_TIMEOUT_SECS, "30"),
        ])
        .unwrap();
        assert_eq!(cfg.library_path, PathBuf::from("/etc/extools.toml"));
        assert_eq!(cfg.shell, "bash");
        assert_eq!(cfg.scrollback, 500);
        assert_eq!(cfg.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn defaults() {
        let cfg = config(&[(ENV_LIBRARY, "/tmp/t.toml")]).unwrap();
        assert_eq!(cfg.shell, "sh");
        assert_eq!(cfg.scrollback, DEFAULT_SCROLLBACK);
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn zero_timeout_disables() {
        let cfg = config(&[(ENV_LIBRARY, "/tmp/t.toml"), (ENV_TIMEOUT_SECS, "0")]).unwrap();
        assert_eq!(cfg.timeout, None);
    }

    #[test]
    fn blank_shell_uses_default() {
        let cfg = config(&[(ENV_LIBRARY, "/tmp/t.toml"), (ENV_SHELL, " ")]).unwrap();
        assert_eq!(cfg.shell, "sh");
    }

    #[test]
    fn bad_number_rejected() {
        let err = config(&[(ENV_LIBRARY, "/tmp/t.toml"), (ENV_SCROLLBACK, "lots")]).unwrap_err();
        assert!(matches!(err, ExtoolsError::Config(ref m) if m.contains(ENV_SCROLLBACK)));
    }

    #[test]
    fn zero_scrollback_rejected() {
        let err = config(&[(ENV_LIBRARY, "/tmp/t.toml"), (ENV_SCROLLBACK, "0")]).unwrap_err();
        assert!(matches!(err, ExtoolsError::Config(_)));
    }
}
