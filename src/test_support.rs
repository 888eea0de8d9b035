//! Scripted doubles for the host capabilities in [`Host`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use crate::cmd::{ExitFailure, ProcessRunner};
use crate::progress::WaitProgress;
use crate::sandbox::login::{LoginError, LoginPlan, ProcessImage};
use crate::sandbox::lxd::{
    InstanceKind, InstanceStatus, Platform, PlatformConnection, PlatformError,
};
use crate::sandbox::{Host, Pause, guest_argv};

/// The readiness liveness probe for `name`.
pub fn probe_argv(name: &str) -> Vec<String> {
    guest_argv(name, &["/bin/true"])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub argv: Vec<String>,
    pub quiet: bool,
    pub input: Option<Vec<u8>>,
}

/// Answers calls from a queue of results, succeeding once it runs dry.
#[derive(Default)]
pub struct ScriptedRunner {
    results: RefCell<VecDeque<Result<(), ExitFailure>>>,
    calls: RefCell<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn push(&self, result: Result<(), ExitFailure>) {
        self.results.borrow_mut().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) -> Result<(), ExitFailure> {
        self.calls.borrow_mut().push(call);
        self.results.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, argv: &[String]) -> Result<(), ExitFailure> {
        self.record(Call {
            argv: argv.to_vec(),
            quiet: false,
            input: None,
        })
    }

    fn run_quiet(&self, argv: &[String]) -> Result<(), ExitFailure> {
        self.record(Call {
            argv: argv.to_vec(),
            quiet: true,
            input: None,
        })
    }

    fn run_with_input(&self, argv: &[String], input: &[u8]) -> Result<(), ExitFailure> {
        self.record(Call {
            argv: argv.to_vec(),
            quiet: false,
            input: Some(input.to_vec()),
        })
    }
}

struct PlatformState {
    status: RefCell<InstanceStatus>,
    kind: Cell<InstanceKind>,
    fail_connect: Cell<bool>,
    fail_start: Cell<bool>,
    connects: Cell<usize>,
    disconnects: Cell<usize>,
    starts: Cell<usize>,
}

/// In-memory platform holding a single instance. Connections share its
/// state, so counters survive them.
pub struct FakePlatform {
    state: Rc<PlatformState>,
}

impl FakePlatform {
    pub fn new(kind: InstanceKind) -> Self {
        Self {
            state: Rc::new(PlatformState {
                status: RefCell::new(InstanceStatus::Running),
                kind: Cell::new(kind),
                fail_connect: Cell::new(false),
                fail_start: Cell::new(false),
                connects: Cell::new(0),
                disconnects: Cell::new(0),
                starts: Cell::new(0),
            }),
        }
    }

    pub fn set_status(&self, status: InstanceStatus) {
        *self.state.status.borrow_mut() = status;
    }

    pub fn fail_connect(&self) {
        self.state.fail_connect.set(true);
    }

    pub fn fail_start(&self) {
        self.state.fail_start.set(true);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.get()
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.get()
    }

    pub fn starts(&self) -> usize {
        self.state.starts.get()
    }
}

impl Platform for FakePlatform {
    fn connect(&self) -> Result<Box<dyn PlatformConnection>, PlatformError> {
        self.state.connects.set(self.state.connects.get() + 1);
        if self.state.fail_connect.get() {
            return Err(PlatformError::Connect {
                socket: PathBuf::from("/fake/unix.socket"),
                message: "connection refused".to_string(),
            });
        }
        Ok(Box::new(FakeConnection {
            state: Rc::clone(&self.state),
            open: true,
        }))
    }
}

struct FakeConnection {
    state: Rc<PlatformState>,
    open: bool,
}

impl PlatformConnection for FakeConnection {
    fn instance_state(&self, _name: &str) -> Result<InstanceStatus, PlatformError> {
        Ok(self.state.status.borrow().clone())
    }

    fn instance_kind(&self, _name: &str) -> Result<InstanceKind, PlatformError> {
        Ok(self.state.kind.get())
    }

    fn request_start(&self, name: &str) -> Result<(), PlatformError> {
        self.state.starts.set(self.state.starts.get() + 1);
        if self.state.fail_start.get() {
            return Err(PlatformError::Start {
                name: name.to_string(),
                message: "no space left".to_string(),
            });
        }
        *self.state.status.borrow_mut() = InstanceStatus::Running;
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.state.disconnects.set(self.state.disconnects.get() + 1);
        }
    }
}

#[derive(Default)]
pub struct RecordingPause {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingPause {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Pause for RecordingPause {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

#[derive(Default)]
pub struct CountingProgress {
    begins: Cell<usize>,
    ticks: Cell<usize>,
    ends: Cell<usize>,
}

impl CountingProgress {
    pub fn ticks(&self) -> usize {
        self.ticks.get()
    }

    pub fn balanced(&self) -> bool {
        self.begins.get() == self.ends.get()
    }
}

impl WaitProgress for CountingProgress {
    fn begin(&self, _message: &str) {
        self.begins.set(self.begins.get() + 1);
    }

    fn tick(&self) {
        self.ticks.set(self.ticks.get() + 1);
    }

    fn end(&self) {
        self.ends.set(self.ends.get() + 1);
    }
}

/// Records plans instead of replacing the process.
pub struct RecordingImage {
    program: Option<PathBuf>,
    plans: RefCell<Vec<LoginPlan>>,
}

impl RecordingImage {
    pub fn found(program: &str) -> Self {
        Self {
            program: Some(PathBuf::from(program)),
            plans: RefCell::default(),
        }
    }

    pub fn missing() -> Self {
        Self {
            program: None,
            plans: RefCell::default(),
        }
    }

    pub fn plans(&self) -> Vec<LoginPlan> {
        self.plans.borrow().clone()
    }
}

impl ProcessImage for RecordingImage {
    fn locate(&self, program: &str) -> Result<PathBuf, LoginError> {
        self.program.clone().ok_or_else(|| LoginError::ToolNotFound {
            program: program.to_string(),
            message: "cannot find binary path".to_string(),
        })
    }

    fn replace(&self, plan: &LoginPlan) -> Result<(), LoginError> {
        self.plans.borrow_mut().push(plan.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub runner: ScriptedRunner,
    pub platform: FakePlatform,
    pub pause: RecordingPause,
    pub progress: CountingProgress,
    pub image: RecordingImage,
}

impl Fakes {
    pub fn new(kind: InstanceKind) -> Self {
        Self {
            runner: ScriptedRunner::default(),
            platform: FakePlatform::new(kind),
            pause: RecordingPause::default(),
            progress: CountingProgress::default(),
            image: RecordingImage::found("/usr/bin/lxc"),
        }
    }

    pub fn host(&self) -> Host<'_> {
        Host {
            runner: &self.runner,
            platform: &self.platform,
            pause: &self.pause,
            progress: &self.progress,
            image: &self.image,
        }
    }
}
