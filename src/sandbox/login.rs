//! Handing the terminal over to a login shell inside the instance.
//!
//! The shell is entered with `su` as the operator's own user. Whether `su`
//! may allocate a pty (`-P`) depends on the guest release: focal and older
//! either lack the flag or mishandle `/dev/pts` ownership with it.

use std::convert::Infallible;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::LXC;
use crate::shell::{escape_double_quoted, quote_command};

/// Releases whose `su -P` works, by codename.
const PTY_CODENAMES: &[&str] = &["jammy", "noble", "oracular", "plucky", "questing"];

/// Numeric releases newer than 22.04 (with a little slack for `22.04.x`
/// style parses) support `su -P`.
const PTY_MIN_RELEASE: f64 = 22.039;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("cannot find {program}: {message}")]
    ToolNotFound { program: String, message: String },
    #[error("exec failed: {0}")]
    Exec(#[from] nix::errno::Errno),
    #[error("invalid exec argument: {0}")]
    InvalidArgument(String),
}

/// Whether `su -P` is usable on `release` (`"24.04"` or `"noble"`).
pub fn su_can_use_pty(release: &str) -> bool {
    match release.parse::<f64>() {
        Ok(version) => version > PTY_MIN_RELEASE,
        Err(_) => PTY_CODENAMES.contains(&release),
    }
}

/// Shell snippet that enters `cwd` and runs the login shell, or `command`
/// through it when one is given.
pub fn login_script(cwd: &Path, command: &[String]) -> String {
    let cwd = escape_double_quoted(&cwd.to_string_lossy());
    let script = format!(r#"cd "{cwd}" && exec $SHELL"#);
    if command.is_empty() {
        script
    } else {
        let command = escape_double_quoted(&quote_command(command));
        format!(r#"{script} -c "{command}""#)
    }
}

/// Inputs for entering an instance.
#[derive(Debug, Clone)]
pub struct LoginRequest<'a> {
    pub name: &'a str,
    pub release: &'a str,
    pub user: &'a str,
    pub cwd: &'a Path,
    pub command: &'a [String],
}

/// Resolved program and argv that will replace this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPlan {
    pub program: PathBuf,
    /// Full argv, `args[0]` being the program path.
    pub args: Vec<String>,
}

impl LoginPlan {
    pub fn new(program: PathBuf, request: &LoginRequest<'_>) -> Self {
        let script = login_script(request.cwd, request.command);
        let args = login_args(
            &program.to_string_lossy(),
            request.name,
            request.release,
            request.user,
            &script,
        );
        Self { program, args }
    }
}

pub fn login_args(program: &str, name: &str, release: &str, user: &str, script: &str) -> Vec<String> {
    let mut args = vec![
        program.to_string(),
        "exec".to_string(),
        name.to_string(),
        "--".to_string(),
        "su".to_string(),
    ];
    if su_can_use_pty(release) {
        args.push("-P".to_string());
    }
    args.extend(["-", user, "-c", script].map(str::to_string));
    args
}

/// Program lookup and process replacement.
pub trait ProcessImage {
    fn locate(&self, program: &str) -> Result<PathBuf, LoginError>;

    /// Replace the current process. The real implementation only returns
    /// on failure.
    fn replace(&self, plan: &LoginPlan) -> Result<(), LoginError>;
}

/// `which` for lookup, `execv(2)` for replacement. The environment is
/// inherited unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Execv;

impl ProcessImage for Execv {
    fn locate(&self, program: &str) -> Result<PathBuf, LoginError> {
        which::which(program).map_err(|e| LoginError::ToolNotFound {
            program: program.to_string(),
            message: e.to_string(),
        })
    }

    fn replace(&self, plan: &LoginPlan) -> Result<(), LoginError> {
        let program = to_cstring(&plan.program.to_string_lossy())?;
        let args = plan
            .args
            .iter()
            .map(|a| to_cstring(a))
            .collect::<Result<Vec<_>, _>>()?;
        let never: Infallible = nix::unistd::execv(&program, &args)?;
        match never {}
    }
}

fn to_cstring(s: &str) -> Result<CString, LoginError> {
    CString::new(s).map_err(|_| LoginError::InvalidArgument(s.to_string()))
}

/// Locate `lxc` and replace this process with a login shell in the instance.
/// Nothing is executed when `lxc` cannot be found.
pub fn enter(image: &dyn ProcessImage, request: &LoginRequest<'_>) -> Result<(), LoginError> {
    let program = image.locate(LXC)?;
    let plan = LoginPlan::new(program, request);
    debug!(command = ?plan.args, "login:exec");
    image.replace(&plan)
}
