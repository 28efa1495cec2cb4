//! Poll-until-stable wait loops for the EC2 binding.
//!
//! Provider transitions are asynchronous; every mutating call is followed by
//! one of these loops so callers only observe terminal states.

use std::time::Instant;

use tokio::time::sleep;

use super::error::Ec2Error;
use super::types::ATTACHMENT_STATE_ATTACHED;
use super::{Ec2Backend, INSTANCE_STATE_OPERATION, VOLUME_STATE_OPERATION};
use crate::command::CommandRunner;

impl<R: CommandRunner + Send + Sync> Ec2Backend<R> {
    pub(super) async fn wait_for_instance_state(
        &self,
        instance_id: &str,
        target: &str,
    ) -> Result<(), Ec2Error> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            let state = self.fetch_instance_state(instance_id)?;
            if state == target {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(Ec2Error::Timeout {
                    operation: format!("{INSTANCE_STATE_OPERATION} ({target})"),
                    resource_id: instance_id.to_owned(),
                });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    pub(super) async fn wait_for_volume_state(
        &self,
        volume_id: &str,
        target: &str,
    ) -> Result<(), Ec2Error> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            let volume = self.fetch_volume(volume_id)?;
            if volume.state == target {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(Ec2Error::Timeout {
                    operation: format!("{VOLUME_STATE_OPERATION} ({target})"),
                    resource_id: volume_id.to_owned(),
                });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    pub(super) async fn wait_for_attachment(
        &self,
        volume_id: &str,
        instance_id: &str,
    ) -> Result<(), Ec2Error> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            let volume = self.fetch_volume(volume_id)?;
            let attached = volume.attachments.iter().any(|attachment| {
                attachment.instance_id == instance_id
                    && attachment.state == ATTACHMENT_STATE_ATTACHED
            });
            if attached {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(Ec2Error::Timeout {
                    operation: format!("{VOLUME_STATE_OPERATION} (attached)"),
                    resource_id: volume_id.to_owned(),
                });
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    pub(super) async fn wait_for_snapshot_completed(
        &self,
        snapshot_id: &str,
    ) -> Result<(), Ec2Error> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            let state = self.fetch_snapshot_state(snapshot_id)?;
            match state.as_str() {
                "completed" => return Ok(()),
                "error" => {
                    return Err(Ec2Error::OperationFailed {
                        operation: String::from("create-snapshot"),
                        resource_id: snapshot_id.to_owned(),
                        message: String::from("snapshot entered the error state"),
                    });
                }
                _ => {}
            }
            if Instant::now() > deadline {
                return Err(Ec2Error::Timeout {
                    operation: String::from("describe-snapshots (completed)"),
                    resource_id: snapshot_id.to_owned(),
                });
            }
            sleep(self.settings.poll_interval).await;
        }
    }
}
