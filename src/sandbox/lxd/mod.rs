//! LXD management API client.
//!
//! Talks to the local daemon over its unix socket. Only the calls the
//! lifecycle needs are implemented: instance state, instance type, and the
//! start action with its async operation wait.

mod http;

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

/// Status string LXD reports for an instance, as far as the lifecycle cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Stopped,
    Running,
    /// Anything else (`Frozen`, `Error`, `Starting`, ...).
    Other(String),
}

impl InstanceStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Stopped" => InstanceStatus::Stopped,
            "Running" => InstanceStatus::Running,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Stopped => f.write_str("Stopped"),
            InstanceStatus::Running => f.write_str("Running"),
            InstanceStatus::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Container,
    VirtualMachine,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to connect to LXD at {socket}: {message}")]
    Connect { socket: PathBuf, message: String },
    #[error("failed to query instance {name}: {message}")]
    Query { name: String, message: String },
    #[error("failed to start instance {name}: {message}")]
    Start { name: String, message: String },
    #[error("unexpected response from LXD: {0}")]
    Protocol(String),
}

/// Entry point to the virtualization platform.
pub trait Platform {
    fn connect(&self) -> Result<Box<dyn PlatformConnection>, PlatformError>;
}

/// An open connection, exclusively owned by the call that opened it.
pub trait PlatformConnection {
    fn instance_state(&self, name: &str) -> Result<InstanceStatus, PlatformError>;

    fn instance_kind(&self, name: &str) -> Result<InstanceKind, PlatformError>;

    /// Ask the platform to start `name` and block until the operation is
    /// finished. Returning early on "accepted" would be a bug: callers treat
    /// a successful return as "started".
    fn request_start(&self, name: &str) -> Result<(), PlatformError>;

    /// Release the connection. Safe to call more than once.
    fn disconnect(&mut self);
}

/// Connection guard that disconnects when dropped, on every exit path.
pub struct Session {
    conn: Box<dyn PlatformConnection>,
}

impl Session {
    pub fn open(platform: &dyn Platform) -> Result<Self, PlatformError> {
        Ok(Self {
            conn: platform.connect()?,
        })
    }
}

impl Deref for Session {
    type Target = dyn PlatformConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.conn.disconnect();
    }
}

/// Connect, look up the instance type, disconnect.
pub fn instance_kind(platform: &dyn Platform, name: &str) -> Result<InstanceKind, PlatformError> {
    let session = Session::open(platform)?;
    session.instance_kind(name)
}

// ── Unix socket implementation ───────────────────────────────────────────────

/// LXD reached over its local unix socket.
#[derive(Debug, Clone)]
pub struct LxdUnix {
    socket: PathBuf,
}

impl LxdUnix {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Locate the daemon socket the same way the `lxc` client does, with the
    /// snap location checked before the traditional one.
    pub fn from_env() -> Self {
        let lxd_socket = std::env::var_os("LXD_SOCKET").map(PathBuf::from);
        let lxd_dir = std::env::var_os("LXD_DIR").map(PathBuf::from);
        Self::new(resolve_socket(lxd_socket, lxd_dir, Path::exists))
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }
}

const SNAP_SOCKET: &str = "/var/snap/lxd/common/lxd/unix.socket";
const LEGACY_SOCKET: &str = "/var/lib/lxd/unix.socket";

fn resolve_socket(
    lxd_socket: Option<PathBuf>,
    lxd_dir: Option<PathBuf>,
    exists: impl Fn(&Path) -> bool,
) -> PathBuf {
    if let Some(socket) = lxd_socket.filter(|p| !p.as_os_str().is_empty()) {
        return socket;
    }
    if let Some(dir) = lxd_dir.filter(|p| !p.as_os_str().is_empty()) {
        return dir.join("unix.socket");
    }
    [SNAP_SOCKET, LEGACY_SOCKET]
        .iter()
        .map(PathBuf::from)
        .find(|p| exists(p))
        .unwrap_or_else(|| PathBuf::from(LEGACY_SOCKET))
}

impl Platform for LxdUnix {
    fn connect(&self) -> Result<Box<dyn PlatformConnection>, PlatformError> {
        debug!(socket = %self.socket.display(), "lxd:connect");
        let conn = LxdConnection {
            socket: self.socket.clone(),
            open: true,
        };
        conn.call("GET", "/1.0", None)
            .map_err(|message| PlatformError::Connect {
                socket: self.socket.clone(),
                message,
            })?;
        Ok(Box::new(conn))
    }
}

/// Standard LXD response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    operation: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_code: i64,
}

const OPERATION_SUCCESS: i64 = 200;

struct LxdConnection {
    socket: PathBuf,
    open: bool,
}

impl LxdConnection {
    /// Perform one API call, folding transport failures and LXD error
    /// envelopes into a message.
    fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Envelope, String> {
        if !self.open {
            return Err("connection closed".to_string());
        }
        let body = body.map(Value::to_string);
        let response = http::request(&self.socket, method, path, body.as_deref().map(str::as_bytes))
            .map_err(|e| e.to_string())?;
        let envelope: Envelope = serde_json::from_slice(&response.body).map_err(|e| {
            format!(
                "invalid JSON (HTTP {}): {}: {}",
                response.status,
                e,
                String::from_utf8_lossy(&response.body).trim()
            )
        })?;
        if envelope.kind == "error" || response.status >= 400 {
            let code = if envelope.error_code != 0 {
                envelope.error_code
            } else {
                i64::from(response.status)
            };
            return Err(format!("{} (code {})", envelope.error, code));
        }
        trace!(method, path, kind = %envelope.kind, "lxd:response");
        Ok(envelope)
    }

    fn query(&self, name: &str, path: &str) -> Result<Value, PlatformError> {
        self.call("GET", path, None)
            .map(|e| e.metadata)
            .map_err(|message| PlatformError::Query {
                name: name.to_string(),
                message,
            })
    }
}

/// Characters escaped in a URL path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

fn instance_path(name: &str) -> String {
    format!("/1.0/instances/{}", utf8_percent_encode(name, SEGMENT))
}

fn metadata_str<'a>(metadata: &'a Value, key: &str) -> Result<&'a str, PlatformError> {
    metadata
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PlatformError::Protocol(format!("missing string field {key:?}")))
}

impl PlatformConnection for LxdConnection {
    fn instance_state(&self, name: &str) -> Result<InstanceStatus, PlatformError> {
        let metadata = self.query(name, &format!("{}/state", instance_path(name)))?;
        let status = InstanceStatus::parse(metadata_str(&metadata, "status")?);
        debug!(instance = name, %status, "lxd:instance state");
        Ok(status)
    }

    fn instance_kind(&self, name: &str) -> Result<InstanceKind, PlatformError> {
        let metadata = self.query(name, &instance_path(name))?;
        match metadata_str(&metadata, "type")? {
            "container" => Ok(InstanceKind::Container),
            "virtual-machine" => Ok(InstanceKind::VirtualMachine),
            other => Err(PlatformError::Query {
                name: name.to_string(),
                message: format!("unknown instance type {other:?}"),
            }),
        }
    }

    fn request_start(&self, name: &str) -> Result<(), PlatformError> {
        let start_err = |message: String| PlatformError::Start {
            name: name.to_string(),
            message,
        };

        let body = json!({ "action": "start", "timeout": -1 });
        let accepted = self
            .call("PUT", &format!("{}/state", instance_path(name)), Some(&body))
            .map_err(start_err)?;
        if accepted.operation.is_empty() {
            return Err(PlatformError::Protocol(
                "start request returned no operation".to_string(),
            ));
        }
        debug!(instance = name, operation = %accepted.operation, "lxd:waiting for start");

        let finished = self
            .call("GET", &format!("{}/wait?timeout=-1", accepted.operation), None)
            .map_err(start_err)?;
        let code = finished
            .metadata
            .get("status_code")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        if code != OPERATION_SUCCESS {
            let err = finished
                .metadata
                .get("err")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("operation did not succeed");
            return Err(start_err(format!("{err} (status code {code})")));
        }
        debug!(instance = name, "lxd:started");
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.open {
            trace!(socket = %self.socket.display(), "lxd:disconnect");
            self.open = false;
        }
    }
}
