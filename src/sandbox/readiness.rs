//! Blocking until a freshly booted instance accepts `lxc exec`.
//!
//! Containers share the host kernel and are usable as soon as LXD reports
//! them running. Virtual machines need the guest agent up first, and until
//! then `lxc exec` exits with [`NOT_READY_EXIT_CODE`].

use std::time::Duration;

use tracing::debug;

use super::Host;
use super::guest_argv;
use super::lxd::{self, InstanceKind, PlatformError};
use crate::cmd::ExitFailure;

/// Exit code of `lxc exec` while the VM agent is not reachable yet.
pub const NOT_READY_EXIT_CODE: i32 = 255;

/// Delay between liveness probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("strange exit code {0}")]
    UnexpectedExit(i32),
    #[error("liveness probe failed: {0}")]
    Probe(ExitFailure),
}

/// Wait until `name` runs commands. There is no attempt limit; callers that
/// need a deadline must impose one themselves.
pub fn wait_until_ready(host: &Host<'_>, name: &str) -> Result<(), ReadinessError> {
    let kind = lxd::instance_kind(host.platform, name)?;
    if kind != InstanceKind::VirtualMachine {
        debug!(instance = name, ?kind, "readiness:skip");
        return Ok(());
    }

    let probe = guest_argv(name, &["/bin/true"]);
    host.progress.begin("Waiting.");
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match host.runner.run_quiet(&probe) {
            Ok(()) => {
                host.progress.end();
                debug!(instance = name, attempts, "readiness:ready");
                return Ok(());
            }
            Err(ExitFailure::Code(NOT_READY_EXIT_CODE)) => {
                debug!(instance = name, attempts, "readiness:not yet");
                host.progress.tick();
                host.pause.sleep(POLL_INTERVAL);
            }
            Err(ExitFailure::Code(code)) => {
                host.progress.end();
                return Err(ReadinessError::UnexpectedExit(code));
            }
            Err(err) => {
                host.progress.end();
                return Err(ReadinessError::Probe(err));
            }
        }
    }
}
