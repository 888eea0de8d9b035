//! The invoking operator, as seen from the host.

use std::path::PathBuf;

use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid, User, getgid, getuid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl UserInfo {
    /// `$USER` names the operator when set; otherwise the passwd entry of
    /// the real uid does.
    pub fn current() -> Result<Self> {
        let uid = getuid();
        let gid = getgid();
        let name = resolve_name(std::env::var("USER").ok(), uid)?;
        Ok(Self::new(name, uid, gid))
    }

    fn new(name: String, uid: Uid, gid: Gid) -> Self {
        Self {
            name,
            uid: uid.as_raw(),
            gid: gid.as_raw(),
        }
    }
}

fn resolve_name(env_user: Option<String>, uid: Uid) -> Result<String> {
    match env_user {
        Some(name) if !name.is_empty() => Ok(name),
        _ => passwd_name(uid),
    }
}

fn passwd_name(uid: Uid) -> Result<String> {
    let user = User::from_uid(uid)
        .with_context(|| format!("failed to look up user {uid}"))?
        .with_context(|| format!("no passwd entry for uid {uid}"))?;
    Ok(user.name)
}

/// `$PWD` when set, so symlinked paths survive into the guest; otherwise the
/// process working directory.
pub fn working_dir() -> Result<PathBuf> {
    match std::env::var_os("PWD") {
        Some(pwd) if !pwd.is_empty() => Ok(PathBuf::from(pwd)),
        _ => std::env::current_dir().context("failed to determine working directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_user_wins() {
        let name = resolve_name(Some("alice".to_string()), Uid::from_raw(0)).unwrap();
        assert_eq!(name, "alice");
    }

    #[test]
    fn empty_env_user_falls_back_to_passwd() {
        assert_eq!(resolve_name(Some(String::new()), Uid::from_raw(0)).unwrap(), "root");
        assert_eq!(resolve_name(None, Uid::from_raw(0)).unwrap(), "root");
    }

    #[test]
    fn ids_are_copied_raw() {
        let user = UserInfo::new("alice".to_string(), Uid::from_raw(1000), Gid::from_raw(100));
        assert_eq!((user.uid, user.gid), (1000, 100));
    }

    #[test]
    fn working_dir_is_absolute() {
        assert!(working_dir().unwrap().is_absolute());
    }
}
