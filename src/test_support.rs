//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::command::{CommandError, CommandOutput, CommandRunner};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// When the queue is exhausted the optional default output is repeated, which
/// keeps wait-loop timeout tests simple.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<RunnerState>>,
}

#[derive(Debug, Default)]
struct RunnerState {
    responses: VecDeque<CommandOutput>,
    default_output: Option<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunnerState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted runner lock poisoned: {err}"))
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.lock().invocations.clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.lock().responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }

    /// Sets the output repeated once the queue is exhausted.
    pub fn set_default_output(&self, code: Option<i32>, stdout: impl Into<String>) {
        self.lock().default_output = Some(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: String::new(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let mut state = self.lock();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        state
            .responses
            .pop_front()
            .or_else(|| state.default_output.clone())
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Arguments for [`json_volume`].
#[derive(Clone, Debug, Default)]
pub struct VolumePayload<'a> {
    /// Volume identifier.
    pub id: &'a str,
    /// Size in GiB.
    pub size: u32,
    /// Provider storage class string (for example `gp2`).
    pub volume_type: &'a str,
    /// Provisioned IOPS, when present.
    pub iops: Option<u32>,
    /// Encryption flag.
    pub encrypted: bool,
    /// Availability zone.
    pub zone: &'a str,
    /// Volume state string (for example `in-use`).
    pub state: &'a str,
    /// Tags as key/value pairs.
    pub tags: &'a [(&'a str, &'a str)],
    /// Attachments as (instance, device, state) triples.
    pub attachments: &'a [(&'a str, &'a str, &'a str)],
}

/// Produces a minimal JSON payload matching `describe-volumes` output.
#[must_use]
pub fn json_volume(payload: &VolumePayload<'_>) -> String {
    let tags: Vec<_> = payload
        .tags
        .iter()
        .map(|(key, value)| json!({"Key": key, "Value": value}))
        .collect();
    let attachments: Vec<_> = payload
        .attachments
        .iter()
        .map(|(instance, device, state)| {
            json!({"InstanceId": instance, "Device": device, "State": state})
        })
        .collect();
    json!({
        "Volumes": [{
            "VolumeId": payload.id,
            "Size": payload.size,
            "VolumeType": payload.volume_type,
            "Iops": payload.iops,
            "Encrypted": payload.encrypted,
            "AvailabilityZone": payload.zone,
            "State": payload.state,
            "Tags": tags,
            "Attachments": attachments,
        }]
    })
    .to_string()
}

/// Produces a minimal JSON payload matching `describe-instances` output.
#[must_use]
pub fn json_instance_state(instance_id: &str, state: &str) -> String {
    json!({
        "Reservations": [{
            "Instances": [{
                "InstanceId": instance_id,
                "State": {"Name": state},
            }]
        }]
    })
    .to_string()
}

/// Produces a minimal JSON payload matching `create-volume` output.
#[must_use]
pub fn json_created_volume(volume_id: &str) -> String {
    json!({"VolumeId": volume_id, "State": "creating"}).to_string()
}

/// Produces a minimal JSON payload matching `create-snapshot` output.
#[must_use]
pub fn json_created_snapshot(snapshot_id: &str) -> String {
    json!({"SnapshotId": snapshot_id, "State": "pending"}).to_string()
}

/// Produces a minimal JSON payload matching `describe-snapshots` output.
#[must_use]
pub fn json_snapshot_state(snapshot_id: &str, state: &str) -> String {
    json!({
        "Snapshots": [{"SnapshotId": snapshot_id, "State": state}]
    })
    .to_string()
}
