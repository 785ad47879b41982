//! Runtime settings loaded from TOML, the environment, and the command line.
//!
//! Lookup order for the file is an explicit `--config` path, then
//! `./tbv.toml`, then `<config dir>/tbv/config.toml`. A missing file means
//! defaults. `TBV_REGISTRY_URL` and `TBV_TIMEOUT_SECS` override the file, and
//! command-line flags override both.

use crate::error::{Result, VerifyError};
use crate::registry::DEFAULT_REGISTRY_URL;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tbv.toml";

/// Environment variable overriding [`Settings::registry_url`].
pub const REGISTRY_ENV: &str = "TBV_REGISTRY_URL";

/// Environment variable overriding [`Settings::timeout_secs`].
pub const TIMEOUT_ENV: &str = "TBV_TIMEOUT_SECS";

/// Top-level settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base URL of the package registry.
    pub registry_url: String,
    /// Whole-run deadline in seconds; `0` disables it.
    pub timeout_secs: u64,
    /// Cap on any single HTTP request, in seconds.
    pub http_timeout_secs: u64,
    /// Parent directory for temporary checkouts.
    pub temp_root: Option<Utf8PathBuf>,
    /// Version-control tool.
    pub git: GitSettings,
    /// Packaging tool.
    pub package_manager: PackageManagerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_owned(),
            timeout_secs: 1800,
            http_timeout_secs: 60,
            temp_root: None,
            git: GitSettings::default(),
            package_manager: PackageManagerSettings::default(),
        }
    }
}

impl Settings {
    /// Per-request HTTP timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] naming `origin` if the text is invalid.
    pub fn from_toml(source: &str, origin: &Utf8Path) -> Result<Self> {
        toml::from_str(source).map_err(|err| VerifyError::Config {
            path: origin.to_owned(),
            reason: err.message().to_owned(),
        })
    }

    /// Reads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|err| VerifyError::Config {
            path: path.to_owned(),
            reason: err.to_string(),
        })?;
        Self::from_toml(&source, path)
    }

    /// Applies `TBV_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Config`] if `TBV_TIMEOUT_SECS` is not a number.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value(REGISTRY_ENV) {
            self.registry_url = url;
        }
        if let Some(raw) = env_value(TIMEOUT_ENV) {
            self.timeout_secs = raw.parse().map_err(|_| VerifyError::Config {
                path: Utf8PathBuf::from(format!("${TIMEOUT_ENV}")),
                reason: format!("expected a number of seconds, got `{raw}`"),
            })?;
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Settings for the `git` executable.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitSettings {
    /// Executable name or path.
    pub program: String,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            program: "git".to_owned(),
        }
    }
}

/// Settings for the package manager.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PackageManagerSettings {
    /// Executable name or path.
    pub program: String,
    /// Arguments producing a real archive.
    pub pack_args: Vec<String>,
    /// Arguments reporting the archive digest without writing it.
    pub dry_run_pack_args: Vec<String>,
    /// Arguments installing locked dependencies.
    pub install_args: Vec<String>,
}

impl Default for PackageManagerSettings {
    fn default() -> Self {
        Self {
            program: "npm".to_owned(),
            pack_args: vec!["pack".to_owned(), "--unsafe-perm".to_owned()],
            dry_run_pack_args: vec!["pack".to_owned(), "--dry-run".to_owned()],
            install_args: vec!["ci".to_owned()],
        }
    }
}

/// Source of the per-user configuration directory.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigDirs {
    /// The platform configuration directory, if one can be determined.
    fn config_dir(&self) -> Option<PathBuf>;
}

/// [`ConfigDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConfigDirs;

impl ConfigDirs for SystemConfigDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
    }
}

/// Finds the configuration file to load, if any.
///
/// An explicit path is returned as is, whether or not it exists. Otherwise
/// `tbv.toml` in `cwd` wins over the per-user file, and `None` means neither
/// exists.
#[must_use]
pub fn locate(
    explicit: Option<&Utf8Path>,
    cwd: &Utf8Path,
    dirs: &dyn ConfigDirs,
) -> Option<Utf8PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs.config_dir()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .map(|dir| dir.join("tbv").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Loads settings: file (if found), then environment overrides.
///
/// # Errors
///
/// Returns [`VerifyError::Config`] if the located file is unreadable or
/// invalid, or an environment override is malformed.
pub fn load(explicit: Option<&Utf8Path>, cwd: &Utf8Path, dirs: &dyn ConfigDirs) -> Result<Settings> {
    let mut settings = match locate(explicit, cwd, dirs) {
        Some(path) => {
            log::debug!("loading settings from {path}");
            Settings::from_file(&path)?
        }
        None => Settings::default(),
    };
    settings.apply_env()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utf8_temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        (dir, path)
    }

    fn no_dirs() -> MockConfigDirs {
        let mut dirs = MockConfigDirs::new();
        dirs.expect_config_dir().returning(|| None);
        dirs
    }

    #[rstest]
    fn defaults_target_the_public_registry() {
        let settings = Settings::default();
        assert_eq!(settings.registry_url, "https://registry.npmjs.com");
        assert_eq!(settings.timeout_secs, 1800);
        assert_eq!(settings.http_timeout(), Duration::from_secs(60));
        assert_eq!(settings.package_manager.install_args, ["ci"]);
    }

    #[rstest]
    fn deserialises_partial_overrides() {
        let source = concat!(
            "timeout_secs = 0\n",
            "[package_manager]\n",
            "program = \"pnpm\"\n",
        );
        let settings =
            Settings::from_toml(source, Utf8Path::new("tbv.toml")).expect("valid settings");

        assert_eq!(settings.timeout_secs, 0);
        assert_eq!(settings.package_manager.program, "pnpm");
        assert_eq!(settings.package_manager.pack_args, ["pack", "--unsafe-perm"]);
        assert_eq!(settings.git.program, "git");
    }

    #[rstest]
    #[case::unknown_top_level("colour = true\n")]
    #[case::unknown_nested("[git]\nbinary = \"git\"\n")]
    #[case::wrong_type("timeout_secs = \"soon\"\n")]
    fn rejects_invalid_files(#[case] source: &str) {
        let err = Settings::from_toml(source, Utf8Path::new("/etc/tbv.toml")).expect_err("invalid");
        assert!(matches!(err, VerifyError::Config { ref path, .. } if path == "/etc/tbv.toml"));
    }

    #[rstest]
    fn local_file_wins_over_user_file() {
        let (_cwd_guard, cwd) = utf8_temp_dir();
        let (_home_guard, home) = utf8_temp_dir();
        std::fs::write(cwd.join(LOCAL_CONFIG_FILE), "").expect("write local");
        std::fs::create_dir_all(home.join("tbv")).expect("mkdir");
        std::fs::write(home.join("tbv/config.toml"), "").expect("write user");

        let mut dirs = MockConfigDirs::new();
        let home_path = home.clone().into_std_path_buf();
        dirs.expect_config_dir().returning(move || Some(home_path.clone()));

        assert_eq!(locate(None, &cwd, &dirs), Some(cwd.join(LOCAL_CONFIG_FILE)));
    }

    #[rstest]
    fn falls_back_to_user_file() {
        let (_cwd_guard, cwd) = utf8_temp_dir();
        let (_home_guard, home) = utf8_temp_dir();
        std::fs::create_dir_all(home.join("tbv")).expect("mkdir");
        std::fs::write(home.join("tbv/config.toml"), "").expect("write user");

        let mut dirs = MockConfigDirs::new();
        let home_path = home.clone().into_std_path_buf();
        dirs.expect_config_dir().returning(move || Some(home_path.clone()));

        assert_eq!(locate(None, &cwd, &dirs), Some(home.join("tbv/config.toml")));
    }

    #[rstest]
    fn missing_files_mean_defaults() {
        let (_guard, cwd) = utf8_temp_dir();
        temp_env::with_vars_unset([REGISTRY_ENV, TIMEOUT_ENV], || {
            let settings = load(None, &cwd, &no_dirs()).expect("defaults");
            assert_eq!(settings, Settings::default());
        });
    }

    #[rstest]
    fn explicit_missing_file_is_an_error() {
        let (_guard, cwd) = utf8_temp_dir();
        let missing = cwd.join("nope.toml");
        let err = load(Some(&missing), &cwd, &no_dirs()).expect_err("missing file");
        assert!(matches!(err, VerifyError::Config { .. }));
    }

    #[rstest]
    fn environment_overrides_file() {
        let (_guard, cwd) = utf8_temp_dir();
        std::fs::write(
            cwd.join(LOCAL_CONFIG_FILE),
            "registry_url = \"https://file.example\"\ntimeout_secs = 5\n",
        )
        .expect("write");

        temp_env::with_vars(
            [
                (REGISTRY_ENV, Some("https://env.example")),
                (TIMEOUT_ENV, Some("42")),
            ],
            || {
                let settings = load(None, &cwd, &no_dirs()).expect("settings");
                assert_eq!(settings.registry_url, "https://env.example");
                assert_eq!(settings.timeout_secs, 42);
            },
        );
    }

    #[rstest]
    fn malformed_timeout_env_is_rejected() {
        temp_env::with_var(TIMEOUT_ENV, Some("forever"), || {
            let mut settings = Settings::default();
            assert!(matches!(
                settings.apply_env(),
                Err(VerifyError::Config { .. })
            ));
        });
    }
}
