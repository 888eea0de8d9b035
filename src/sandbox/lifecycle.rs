//! Bringing an instance into existence and into the running state.

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info};

use super::lxd::{InstanceStatus, Platform, PlatformError, Session};
use super::readiness::wait_until_ready;
use super::{Host, LXC, guest_argv};

/// Exit code of the quirk probe when the guest is affected by LP #1878225.
pub const QUIRK_AFFECTED_EXIT_CODE: i32 = 225;

/// What to do about an instance in a given status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Nothing,
    Start,
    Unhandled(String),
}

pub fn transition(status: &InstanceStatus) -> Transition {
    match status {
        InstanceStatus::Stopped => Transition::Start,
        InstanceStatus::Running => Transition::Nothing,
        InstanceStatus::Other(s) => Transition::Unhandled(s.clone()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("no handler for status {0}")]
    UnhandledStatus(String),
}

/// Start `name` if it is stopped. A running instance is left alone.
pub fn ensure_running(platform: &dyn Platform, name: &str) -> Result<(), LifecycleError> {
    let session = Session::open(platform)?;
    let status = session.instance_state(name)?;
    debug!(instance = name, %status, "lifecycle:status");
    match transition(&status) {
        Transition::Nothing => Ok(()),
        Transition::Start => {
            info!(instance = name, "starting instance");
            session.request_start(name)?;
            Ok(())
        }
        Transition::Unhandled(status) => Err(LifecycleError::UnhandledStatus(status)),
    }
}

/// Everything `lxc launch` needs to create one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub name: String,
    pub image: String,
    pub vm: bool,
    /// YAML document fed to `lxc launch` on stdin.
    pub device_config: String,
}

impl LaunchRequest {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            LXC.to_string(),
            "launch".to_string(),
            self.image.clone(),
            self.name.clone(),
        ];
        if self.vm {
            argv.push("--vm".to_string());
        }
        argv
    }
}

/// Create the instance, wait for it, then apply the post-provision fixups.
///
/// A failure part way through leaves the half-built instance in place.
pub fn create_instance(host: &Host<'_>, request: &LaunchRequest) -> Result<()> {
    let name = request.name.as_str();
    let argv = request.argv();
    info!(instance = name, image = %request.image, vm = request.vm, "creating instance");
    debug!(command = ?argv, "lifecycle:launch");
    host.runner
        .run_with_input(&argv, request.device_config.as_bytes())
        .context("failed to create instance")?;

    wait_until_ready(host, name).context("failed to wait for instance")?;

    guest_run(
        host,
        name,
        &["sh", "-c", "echo 'Defaults use_pty' > /etc/sudoers.d/use_pty"],
    )
    .context("use_pty setup failure")?;

    early_boot_quirk(host, name).context("LP #1878225 workaround failure")?;

    guest_run(host, name, &["cloud-init", "status", "--wait"]).context("cloud-init failure")?;
    info!(instance = name, "instance ready");
    Ok(())
}

fn guest_run(host: &Host<'_>, name: &str, args: &[&str]) -> Result<()> {
    let argv = guest_argv(name, args);
    debug!(command = ?argv, "lifecycle:guest");
    host.runner
        .run(&argv)
        .map_err(|e| anyhow!(e).context(format!("cmd {argv:?} failure")))
}

const QUIRK_PROBE: &str = r#"
command -v lsb_release || exit 0
[ "$(lsb_release -i -s)" = "Ubuntu" ] || exit 0
[ "$(lsb_release -r -s)" = "22.04" ] || exit 0
exit 225
"#;

const BUS_WAIT: &str = r#"
for i in $(seq 10); do
    if [ -e /run/dbus/system_bus_socket ]; then
        exit 0
    fi
    sleep 1
done
[ -e /run/dbus/system_bus_socket ]
"#;

/// On Ubuntu 22.04 `cloud-init status --wait` can hang behind snapd seeding.
/// Stopping the seeded unit unblocks it, once the system bus is up.
fn early_boot_quirk(host: &Host<'_>, name: &str) -> Result<()> {
    let probe = guest_argv(name, &["sh", "-c", QUIRK_PROBE]);
    debug!(command = ?probe, "lifecycle:quirk probe");
    let Err(err) = host.runner.run_quiet(&probe) else {
        debug!(instance = name, "lifecycle:quirk not applicable");
        return Ok(());
    };
    match err.code() {
        Some(QUIRK_AFFECTED_EXIT_CODE) => {}
        Some(code) => bail!("strange exit code {code}"),
        None => return Err(err.into()),
    }

    info!(instance = name, "applying LP #1878225 workaround");
    guest_run(host, name, &["sh", "-c", BUS_WAIT]).context("bus wait failure")?;
    guest_run(host, name, &["systemctl", "stop", "snapd.seeded.service"])
        .context("seeded stop failure")?;
    Ok(())
}
