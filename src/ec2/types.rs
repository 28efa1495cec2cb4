//! Serde models of the EC2 CLI's JSON input and output shapes.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::backend::{Tag, VolumeAttachment, VolumeInfo};

use super::error::Ec2Error;

/// Attachment state reported for a fully attached volume.
pub(super) const ATTACHMENT_STATE_ATTACHED: &str = "attached";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct DescribeVolumesResponse {
    #[serde(default)]
    pub volumes: Vec<ApiVolume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiVolume {
    pub volume_id: String,
    pub size: u32,
    pub volume_type: String,
    #[serde(default)]
    pub iops: Option<u32>,
    #[serde(default)]
    pub encrypted: bool,
    pub availability_zone: String,
    pub state: String,
    #[serde(default)]
    pub tags: Vec<ApiTag>,
    #[serde(default)]
    pub attachments: Vec<ApiAttachment>,
}

impl ApiVolume {
    /// Converts the raw API shape into the domain view, keeping only active
    /// attachments.
    pub(super) fn into_info(self) -> Result<VolumeInfo, Ec2Error> {
        let storage_class =
            self.volume_type
                .parse()
                .map_err(|err: crate::backend::UnknownStorageClass| Ec2Error::Parse {
                    operation: String::from("describe-volumes"),
                    message: err.to_string(),
                })?;

        Ok(VolumeInfo {
            id: self.volume_id,
            size_gib: self.size,
            storage_class,
            iops: self.iops,
            encrypted: self.encrypted,
            availability_zone: self.availability_zone,
            tags: self.tags.into_iter().map(ApiTag::into_tag).collect(),
            attachments: self
                .attachments
                .into_iter()
                .filter(|attachment| attachment.state == ATTACHMENT_STATE_ATTACHED)
                .map(|attachment| VolumeAttachment {
                    instance_id: attachment.instance_id,
                    device: Utf8PathBuf::from(attachment.device),
                })
                .collect(),
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiTag {
    pub key: String,
    pub value: String,
}

impl ApiTag {
    pub(super) fn from_tag(tag: &Tag) -> Self {
        Self {
            key: tag.key.clone(),
            value: tag.value.clone(),
        }
    }

    fn into_tag(self) -> Tag {
        Tag {
            key: self.key,
            value: self.value,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiAttachment {
    pub instance_id: String,
    pub device: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct DescribeInstancesResponse {
    #[serde(default)]
    pub reservations: Vec<ApiReservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiReservation {
    #[serde(default)]
    pub instances: Vec<ApiInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiInstance {
    pub state: ApiInstanceState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiInstanceState {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct CreateVolumeResponse {
    pub volume_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct CreateSnapshotResponse {
    pub snapshot_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct DescribeSnapshotsResponse {
    #[serde(default)]
    pub snapshots: Vec<ApiSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ApiSnapshot {
    pub state: String,
}

/// Payload for `--tag-specifications`, passed as JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<ApiTag>,
}

impl TagSpecification {
    pub(super) fn for_resource(resource_type: &str, tags: &[Tag]) -> Self {
        Self {
            resource_type: resource_type.to_owned(),
            tags: tags.iter().map(ApiTag::from_tag).collect(),
        }
    }
}
