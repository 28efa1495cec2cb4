//! EC2 binding that drives the provider through its CLI with JSON output.
//!
//! Each wait mirrors the provider SDK's waiters by polling the relevant
//! describe call until the terminal state is observed.

mod error;
mod types;
mod wait;

use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;

use crate::backend::{Backend, BackendFuture, Tag, VolumeInfo, VolumeSpec};
use crate::command::{CommandRunner, ProcessCommandRunner};

pub use error::Ec2Error;
use types::{
    ApiVolume, CreateSnapshotResponse, CreateVolumeResponse, DescribeInstancesResponse,
    DescribeSnapshotsResponse, DescribeVolumesResponse, TagSpecification,
};

/// Default provider CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) const INSTANCE_STATE_OPERATION: &str = "describe-instances";
pub(crate) const VOLUME_STATE_OPERATION: &str = "describe-volumes";

/// Settings for the EC2 binding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ec2Settings {
    /// Path to the provider CLI binary.
    pub aws_bin: String,
    /// Region passed to every call; the CLI's own default applies when unset.
    pub region: Option<String>,
    /// Interval between describe polls while waiting.
    pub poll_interval: Duration,
    /// Upper bound on each wait.
    pub wait_timeout: Duration,
}

impl Default for Ec2Settings {
    fn default() -> Self {
        Self {
            aws_bin: String::from(DEFAULT_AWS_BIN),
            region: None,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
        }
    }
}

/// Backend that shells out to the EC2 CLI.
#[derive(Clone, Debug)]
pub struct Ec2Backend<R: CommandRunner = ProcessCommandRunner> {
    settings: Ec2Settings,
    runner: R,
}

impl Ec2Backend<ProcessCommandRunner> {
    /// Creates a backend wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(settings: Ec2Settings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> Ec2Backend<R> {
    /// Creates a backend using the provided runner.
    #[must_use]
    pub const fn new(settings: Ec2Settings, runner: R) -> Self {
        Self { settings, runner }
    }

    /// Builds the full argument vector for an `ec2` subcommand.
    fn build_args(&self, subcommand: &str, extra: Vec<OsString>) -> Vec<OsString> {
        let mut args = vec![OsString::from("ec2"), OsString::from(subcommand)];
        args.extend(extra);
        if let Some(region) = &self.settings.region {
            args.push(OsString::from("--region"));
            args.push(OsString::from(region));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    fn run_ec2(
        &self,
        subcommand: &str,
        extra: Vec<OsString>,
        resource_id: &str,
    ) -> Result<String, Ec2Error> {
        let args = self.build_args(subcommand, extra);
        let output = self.runner.run(&self.settings.aws_bin, &args)?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(Ec2Error::OperationFailed {
            operation: subcommand.to_owned(),
            resource_id: resource_id.to_owned(),
            message: output.stderr,
        })
    }

    fn run_ec2_json<T: DeserializeOwned>(
        &self,
        subcommand: &str,
        extra: Vec<OsString>,
        resource_id: &str,
    ) -> Result<T, Ec2Error> {
        let stdout = self.run_ec2(subcommand, extra, resource_id)?;
        serde_json::from_str(&stdout).map_err(|err| Ec2Error::Parse {
            operation: subcommand.to_owned(),
            message: err.to_string(),
        })
    }

    pub(crate) fn fetch_volume(&self, volume_id: &str) -> Result<ApiVolume, Ec2Error> {
        let response: DescribeVolumesResponse = self.run_ec2_json(
            "describe-volumes",
            vec![OsString::from("--volume-ids"), OsString::from(volume_id)],
            volume_id,
        )?;
        response
            .volumes
            .into_iter()
            .next()
            .ok_or_else(|| Ec2Error::NotFound {
                resource_id: volume_id.to_owned(),
            })
    }

    pub(crate) fn fetch_instance_state(&self, instance_id: &str) -> Result<String, Ec2Error> {
        let response: DescribeInstancesResponse = self.run_ec2_json(
            INSTANCE_STATE_OPERATION,
            vec![
                OsString::from("--instance-ids"),
                OsString::from(instance_id),
            ],
            instance_id,
        )?;
        response
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .next()
            .map(|instance| instance.state.name)
            .ok_or_else(|| Ec2Error::NotFound {
                resource_id: instance_id.to_owned(),
            })
    }

    pub(crate) fn fetch_snapshot_state(&self, snapshot_id: &str) -> Result<String, Ec2Error> {
        let response: DescribeSnapshotsResponse = self.run_ec2_json(
            "describe-snapshots",
            vec![
                OsString::from("--snapshot-ids"),
                OsString::from(snapshot_id),
            ],
            snapshot_id,
        )?;
        response
            .snapshots
            .into_iter()
            .next()
            .map(|snapshot| snapshot.state)
            .ok_or_else(|| Ec2Error::NotFound {
                resource_id: snapshot_id.to_owned(),
            })
    }

    fn tag_specifications_arg(resource_type: &str, tags: &[Tag]) -> Result<OsString, Ec2Error> {
        let payload = vec![TagSpecification::for_resource(resource_type, tags)];
        let json = serde_json::to_string(&payload).map_err(|err| Ec2Error::Parse {
            operation: String::from("tag-specifications"),
            message: err.to_string(),
        })?;
        Ok(OsString::from(json))
    }

    fn create_volume_args(spec: &VolumeSpec) -> Result<Vec<OsString>, Ec2Error> {
        let mut args = vec![
            OsString::from("--availability-zone"),
            OsString::from(&spec.availability_zone),
            OsString::from("--volume-type"),
            OsString::from(spec.storage_class.as_api_str()),
        ];
        if let Some(size) = spec.size_gib {
            args.push(OsString::from("--size"));
            args.push(OsString::from(size.to_string()));
        }
        if let Some(iops) = spec.iops {
            args.push(OsString::from("--iops"));
            args.push(OsString::from(iops.to_string()));
        }
        if let Some(snapshot_id) = &spec.snapshot_id {
            args.push(OsString::from("--snapshot-id"));
            args.push(OsString::from(snapshot_id));
        }
        if !spec.tags.is_empty() {
            args.push(OsString::from("--tag-specifications"));
            args.push(Self::tag_specifications_arg("volume", &spec.tags)?);
        }
        Ok(args)
    }
}

impl<R: CommandRunner + Send + Sync> Ec2Backend<R> {
    async fn stop_instance_impl(&self, instance_id: &str) -> Result<(), Ec2Error> {
        self.run_ec2(
            "stop-instances",
            vec![
                OsString::from("--instance-ids"),
                OsString::from(instance_id),
            ],
            instance_id,
        )?;
        self.wait_for_instance_state(instance_id, "stopped").await
    }

    async fn start_instance_impl(&self, instance_id: &str) -> Result<(), Ec2Error> {
        self.run_ec2(
            "start-instances",
            vec![
                OsString::from("--instance-ids"),
                OsString::from(instance_id),
            ],
            instance_id,
        )?;
        self.wait_for_instance_state(instance_id, "running").await
    }

    async fn create_snapshot_impl(
        &self,
        volume_id: &str,
        description: &str,
        tags: &[Tag],
    ) -> Result<String, Ec2Error> {
        let mut args = vec![
            OsString::from("--volume-id"),
            OsString::from(volume_id),
            OsString::from("--description"),
            OsString::from(description),
        ];
        if !tags.is_empty() {
            args.push(OsString::from("--tag-specifications"));
            args.push(Self::tag_specifications_arg("snapshot", tags)?);
        }
        let response: CreateSnapshotResponse =
            self.run_ec2_json("create-snapshot", args, volume_id)?;
        self.wait_for_snapshot_completed(&response.snapshot_id)
            .await?;
        Ok(response.snapshot_id)
    }

    async fn detach_volume_impl(
        &self,
        volume_id: &str,
        instance_id: &str,
    ) -> Result<Option<Utf8PathBuf>, Ec2Error> {
        let info = self.fetch_volume(volume_id)?.into_info()?;
        let Some(attachment) = info.attachment_to(instance_id) else {
            return Ok(None);
        };
        let device = attachment.device.clone();

        self.run_ec2(
            "detach-volume",
            vec![
                OsString::from("--volume-id"),
                OsString::from(volume_id),
                OsString::from("--instance-id"),
                OsString::from(instance_id),
                OsString::from("--device"),
                OsString::from(device.as_str()),
            ],
            volume_id,
        )?;
        self.wait_for_volume_state(volume_id, "available").await?;
        Ok(Some(device))
    }

    async fn attach_volume_impl(
        &self,
        volume_id: &str,
        instance_id: &str,
        device: &Utf8Path,
    ) -> Result<(), Ec2Error> {
        let info = self.fetch_volume(volume_id)?.into_info()?;
        // Idempotent only when fully attached; a partial attachment still
        // goes through the provider call and its wait.
        if !info.attachments.is_empty() {
            return Ok(());
        }

        self.run_ec2(
            "attach-volume",
            vec![
                OsString::from("--volume-id"),
                OsString::from(volume_id),
                OsString::from("--instance-id"),
                OsString::from(instance_id),
                OsString::from("--device"),
                OsString::from(device.as_str()),
            ],
            volume_id,
        )?;
        self.wait_for_attachment(volume_id, instance_id).await
    }

    async fn create_volume_impl(&self, spec: &VolumeSpec) -> Result<String, Ec2Error> {
        let args = Self::create_volume_args(spec)?;
        let response: CreateVolumeResponse =
            self.run_ec2_json("create-volume", args, &spec.availability_zone)?;
        self.wait_for_volume_state(&response.volume_id, "available")
            .await?;
        Ok(response.volume_id)
    }

    fn delete_volume_impl(&self, volume_id: &str) -> Result<(), Ec2Error> {
        // Fire-and-forget: the volume is being discarded, so no deletion wait.
        self.run_ec2(
            "delete-volume",
            vec![OsString::from("--volume-id"), OsString::from(volume_id)],
            volume_id,
        )?;
        Ok(())
    }
}

impl<R: CommandRunner + Send + Sync> Backend for Ec2Backend<R> {
    type Error = Ec2Error;

    fn stop_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.stop_instance_impl(instance_id))
    }

    fn start_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.start_instance_impl(instance_id))
    }

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        description: &'a str,
        tags: &'a [Tag],
    ) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(self.create_snapshot_impl(volume_id, description, tags))
    }

    fn detach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Option<Utf8PathBuf>, Self::Error> {
        Box::pin(self.detach_volume_impl(volume_id, instance_id))
    }

    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
        device: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(self.attach_volume_impl(volume_id, instance_id, device))
    }

    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> BackendFuture<'a, String, Self::Error> {
        Box::pin(self.create_volume_impl(spec))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.delete_volume_impl(volume_id) })
    }

    fn describe_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> BackendFuture<'a, VolumeInfo, Self::Error> {
        Box::pin(async move { self.fetch_volume(volume_id)?.into_info() })
    }
}

#[cfg(test)]
mod tests;
