//! LXD-backed sandboxes: creation, start, readiness, and login.

pub mod launch_config;
pub mod lifecycle;
pub mod login;
pub mod lxd;
pub mod readiness;

use std::time::Duration;

use crate::cmd::{ProcessRunner, argv};
use crate::progress::WaitProgress;
use login::ProcessImage;
use lxd::Platform;

/// The `lxc` command-line client.
pub const LXC: &str = "lxc";

/// Suspends the calling thread between polls.
pub trait Pause {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Host-side capabilities the orchestration runs against.
///
/// Everything that touches processes, the platform API, or the clock goes
/// through here, so tests can substitute scripted doubles.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub platform: &'a dyn Platform,
    pub pause: &'a dyn Pause,
    pub progress: &'a dyn WaitProgress,
    pub image: &'a dyn ProcessImage,
}

/// `lxc exec <name> -- <args...>`
pub fn guest_argv(name: &str, args: &[&str]) -> Vec<String> {
    let mut full = argv(&[LXC, "exec", name, "--"]);
    full.extend(argv(args));
    full
}
