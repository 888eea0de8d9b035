use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project manifest, looked up from the working directory upward.
pub const CONFIG_FILE: &str = ".omnienv.yaml";

/// Image remote used when a system names no explicit image.
pub const DEFAULT_REMOTE: &str = "ubuntu-daily";

/// Environment variable supplying the system when the manifest has none.
pub const DEFAULT_SYSTEM_ENV: &str = "DEFAULT_SERIES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found: no {file} in {start} or any parent", file = CONFIG_FILE)]
    NotFound { start: PathBuf },
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(
        "no system configured: set `system` in {}, pass --system, or set ${}",
        CONFIG_FILE,
        DEFAULT_SYSTEM_ENV
    )]
    MissingSystem,
}

/// Guest operating system an instance is built from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct System {
    /// Release name or number, e.g. `noble` or `24.04`. Also part of the
    /// instance name.
    pub name: String,
    /// Full image reference; defaults to `ubuntu-daily:<name>`.
    #[serde(default)]
    pub image: Option<String>,
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
        }
    }

    pub fn launch_image(&self) -> String {
        match &self.image {
            Some(image) => image.clone(),
            None => format!("{DEFAULT_REMOTE}:{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Lxd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Virtualization {
    #[default]
    Container,
    Vm,
}

/// `system: noble` or `system: {name: noble, image: ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SystemEntry {
    Name(String),
    Full(System),
}

impl From<SystemEntry> for System {
    fn from(entry: SystemEntry) -> Self {
        match entry {
            SystemEntry::Name(name) => System::new(name),
            SystemEntry::Full(system) => system,
        }
    }
}

/// The manifest as written, before defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    system: Option<SystemEntry>,
    #[serde(alias = "rootdir")]
    root_dir: Option<PathBuf>,
    label: Option<String>,
    backend: Option<Backend>,
    virtualization: Option<Virtualization>,

    // Legacy keys, read only to warn about them.
    series: Option<String>,
    project: Option<String>,
}

/// Resolved project configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `None` when neither the manifest nor the environment names one; a
    /// `--system` override can still supply it.
    pub system: Option<System>,
    /// Defaults to the directory holding the manifest.
    pub root_dir: PathBuf,
    /// Defaults to the basename of `root_dir`. First half of the instance name.
    pub label: String,
    pub backend: Backend,
    pub virtualization: Virtualization,
}

impl Config {
    pub fn is_vm(&self) -> bool {
        self.virtualization == Virtualization::Vm
    }

    /// Find and load the manifest for the current directory.
    pub fn load() -> anyhow::Result<Self> {
        debug!("config:loading");
        let cwd = std::env::current_dir().context("failed to determine working directory")?;
        let path = find_config(&cwd)?;
        let default_system = std::env::var(DEFAULT_SYSTEM_ENV).ok();
        Ok(load_from_path(&path, default_system.as_deref())?)
    }
}

/// Walk from `start` up to `/` looking for the manifest.
pub fn find_config(start: &Path) -> Result<PathBuf, ConfigError> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "config:found");
            return Ok(candidate);
        }
    }
    Err(ConfigError::NotFound {
        start: start.to_path_buf(),
    })
}

/// Load the manifest at `path` and apply defaults. `default_system` is used
/// when the manifest names no system.
pub fn load_from_path(path: &Path, default_system: Option<&str>) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "config:reading file");
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = if contents.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str::<Option<RawConfig>>(&contents)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
            .unwrap_or_default()
    };

    if let Some(project) = &raw.project {
        warn!(project = %project, "config: ignoring legacy key `project`");
    }

    let system = match (raw.system, raw.series) {
        (Some(entry), series) => {
            if let Some(series) = series {
                warn!(series = %series, "config: legacy key `series` overridden by `system`");
            }
            Some(System::from(entry))
        }
        (None, Some(series)) => {
            warn!(series = %series, "config: legacy key `series`, use `system` instead");
            Some(System::new(series))
        }
        (None, None) => default_system
            .filter(|name| !name.is_empty())
            .map(System::new),
    };

    let root_dir = raw.root_dir.unwrap_or_else(|| {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"))
    });
    let label = raw.label.unwrap_or_else(|| {
        root_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let config = Config {
        system,
        root_dir,
        label,
        backend: raw.backend.unwrap_or_default(),
        virtualization: raw.virtualization.unwrap_or_default(),
    };
    debug!(?config, "config:loaded");
    Ok(config)
}
