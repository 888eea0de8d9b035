//! Ties configuration, command line, and the sandbox operations together.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::Opts;
use crate::cmd::SystemRunner;
use crate::config::{Config, ConfigError, System};
use crate::progress::TerminalProgress;
use crate::sandbox::launch_config::launch_config;
use crate::sandbox::lifecycle::{LaunchRequest, create_instance, ensure_running};
use crate::sandbox::login::{self, Execv, LoginRequest};
use crate::sandbox::lxd::LxdUnix;
use crate::sandbox::readiness::wait_until_ready;
use crate::sandbox::{Host, ThreadPause};
use crate::user::{self, UserInfo};

/// Instance name for a project label and system: `<label>-<system>`.
pub fn identity(label: &str, system: &str) -> String {
    format!("{label}-{system}")
}

#[derive(Debug, Clone)]
pub struct App {
    config: Config,
    opts: Opts,
    system: System,
}

impl App {
    /// `--system` wins over the manifest and always uses the default remote.
    pub fn new(config: Config, opts: Opts) -> Result<Self, ConfigError> {
        let system = match (&opts.system, &config.system) {
            (Some(name), _) => System::new(name.as_str()),
            (None, Some(system)) => system.clone(),
            (None, None) => return Err(ConfigError::MissingSystem),
        };
        Ok(Self {
            config,
            opts,
            system,
        })
    }

    pub fn name(&self) -> String {
        identity(&self.config.label, &self.system.name)
    }

    pub fn launch(&self, host: &Host<'_>, user: &UserInfo) -> Result<()> {
        debug!(user = %user.name, uid = user.uid, gid = user.gid, "oe:seeding user");
        let request = LaunchRequest {
            name: self.name(),
            image: self.system.launch_image(),
            vm: self.config.is_vm(),
            device_config: launch_config(user).context("failed to render launch configuration")?,
        };
        create_instance(host, &request)
    }

    /// Start the instance if needed, wait for it, and exec into a login
    /// shell. Returns only on failure when run for real.
    pub fn shell(&self, host: &Host<'_>, user: &str, cwd: &Path) -> Result<()> {
        let name = self.name();
        ensure_running(host.platform, &name).context("failed to start instance")?;
        wait_until_ready(host, &name).context("failed to wait for instance")?;

        let request = LoginRequest {
            name: &name,
            release: &self.system.name,
            user,
            cwd,
            command: &self.opts.params,
        };
        login::enter(host.image, &request).context("failed to lxc exec")?;
        Ok(())
    }
}

pub fn run(opts: Opts) -> Result<()> {
    let config = Config::load()?;
    let app = App::new(config, opts)?;
    info!(
        instance = %app.name(),
        root_dir = %app.config.root_dir.display(),
        backend = ?app.config.backend,
        virtualization = ?app.config.virtualization,
        "oe:target"
    );

    let runner = SystemRunner;
    let platform = LxdUnix::from_env();
    debug!(socket = %platform.socket().display(), "oe:lxd socket");
    let pause = ThreadPause;
    let progress = TerminalProgress::stdout();
    let image = Execv;
    let host = Host {
        runner: &runner,
        platform: &platform,
        pause: &pause,
        progress: &progress,
        image: &image,
    };

    let operator = UserInfo::current()?;
    if app.opts.launch {
        app.launch(&host, &operator)?;
    }
    let cwd = user::working_dir()?;
    app.shell(&host, &operator.name, &cwd)
}
