//! Provider abstraction for querying and mutating compute instances and
//! block volumes.
//!
//! Every mutating operation blocks until the resource reaches a stable target
//! state; cloud transitions are eventually consistent, so callers must never
//! assume completion from the mutation call's return alone.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// A single key/value tag on a volume or snapshot. Keys are unique within a
/// tag set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Convenience constructor.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Performance/cost tier of a block volume. The tier decides size floors and
/// whether provisioned IOPS are meaningful.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageClass {
    /// Baseline general-purpose SSD (`gp2`); the provider derives IOPS from
    /// size, so requests must not carry an IOPS field.
    GeneralPurpose,
    /// Second-generation general-purpose SSD (`gp3`).
    GeneralPurposeV3,
    /// Provisioned-IOPS SSD (`io1`).
    ProvisionedIops,
    /// Second-generation provisioned-IOPS SSD (`io2`).
    ProvisionedIopsV2,
    /// Throughput-optimised HDD (`st1`); 500 GiB minimum.
    ThroughputOptimized,
    /// Cold HDD (`sc1`); 500 GiB minimum.
    ColdHdd,
    /// Previous-generation magnetic volume (`standard`).
    Magnetic,
}

impl StorageClass {
    /// Provider API identifier for the class.
    #[must_use]
    pub const fn as_api_str(self) -> &'static str {
        match self {
            Self::GeneralPurpose => "gp2",
            Self::GeneralPurposeV3 => "gp3",
            Self::ProvisionedIops => "io1",
            Self::ProvisionedIopsV2 => "io2",
            Self::ThroughputOptimized => "st1",
            Self::ColdHdd => "sc1",
            Self::Magnetic => "standard",
        }
    }

    /// Minimum size the provider accepts for the class, when one exists.
    #[must_use]
    pub const fn size_floor_gib(self) -> Option<u32> {
        match self {
            Self::ThroughputOptimized | Self::ColdHdd => Some(500),
            _ => None,
        }
    }

    /// Whether the provider derives IOPS from size for this class, in which
    /// case creation requests must omit the IOPS field entirely.
    #[must_use]
    pub const fn derives_iops(self) -> bool {
        matches!(self, Self::GeneralPurpose)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Error raised when a provider reports a storage class this crate does not
/// model.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown storage class '{0}'")]
pub struct UnknownStorageClass(pub String);

impl FromStr for StorageClass {
    type Err = UnknownStorageClass;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "gp2" => Ok(Self::GeneralPurpose),
            "gp3" => Ok(Self::GeneralPurposeV3),
            "io1" => Ok(Self::ProvisionedIops),
            "io2" => Ok(Self::ProvisionedIopsV2),
            "st1" => Ok(Self::ThroughputOptimized),
            "sc1" => Ok(Self::ColdHdd),
            "standard" => Ok(Self::Magnetic),
            other => Err(UnknownStorageClass(other.to_owned())),
        }
    }
}

/// An active attachment relating a volume to exactly one instance at exactly
/// one device path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeAttachment {
    /// Instance the volume is attached to.
    pub instance_id: String,
    /// Device path on that instance.
    pub device: Utf8PathBuf,
}

/// Current attributes of an existing volume, as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeInfo {
    /// Provider-assigned volume identifier.
    pub id: String,
    /// Size in GiB.
    pub size_gib: u32,
    /// Storage class of the volume.
    pub storage_class: StorageClass,
    /// Provisioned IOPS, when the class carries them.
    pub iops: Option<u32>,
    /// Whether the volume is encrypted.
    pub encrypted: bool,
    /// Availability zone the volume lives in.
    pub availability_zone: String,
    /// Tags currently applied, in provider order.
    pub tags: Vec<Tag>,
    /// Active attachments (at most one by the provider's own invariant).
    pub attachments: Vec<VolumeAttachment>,
}

impl VolumeInfo {
    /// Returns the active attachment to `instance_id`, if any.
    #[must_use]
    pub fn attachment_to(&self, instance_id: &str) -> Option<&VolumeAttachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.instance_id == instance_id)
    }
}

/// Creation specification for a new volume.
///
/// Encryption is deliberately absent: the whole point of the clone is to
/// produce an unencrypted volume, so no encryption flag or KMS key is ever
/// requested.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSpec {
    /// Availability zone for the new volume.
    pub availability_zone: String,
    /// Requested size in GiB; omitted when created from a snapshot.
    pub size_gib: Option<u32>,
    /// Storage class of the new volume.
    pub storage_class: StorageClass,
    /// Provisioned IOPS; must be absent for classes that derive IOPS.
    pub iops: Option<u32>,
    /// Snapshot to create the volume from, for the alternate creation path.
    pub snapshot_id: Option<String>,
    /// Tags to apply at creation time.
    pub tags: Vec<Tag>,
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Interface implemented by cloud provider bindings.
///
/// Implementations must honour the idempotence contract: `attach_volume` is a
/// no-op when the volume already holds an active attachment, and
/// `detach_volume` returns `None` without raising when no attachment to the
/// given instance exists. Every wait observes a terminal state or fails.
pub trait Backend {
    /// Provider-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stops an instance and waits until it reports `stopped`.
    fn stop_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Starts an instance and waits until it reports `running`.
    fn start_instance<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Creates a point-in-time snapshot of a volume, waits until it completes,
    /// and returns the snapshot identifier.
    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        description: &'a str,
        tags: &'a [Tag],
    ) -> BackendFuture<'a, String, Self::Error>;

    /// Detaches a volume from an instance, waiting until the volume is free.
    ///
    /// Returns the device path the volume had been attached at, or `None`
    /// when no attachment to `instance_id` existed (no-op).
    fn detach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
    ) -> BackendFuture<'a, Option<Utf8PathBuf>, Self::Error>;

    /// Attaches a volume to an instance at `device`, waiting until the
    /// attachment is active. No-op when the volume is already attached.
    fn attach_volume<'a>(
        &'a self,
        volume_id: &'a str,
        instance_id: &'a str,
        device: &'a Utf8Path,
    ) -> BackendFuture<'a, (), Self::Error>;

    /// Creates a volume per `spec`, waits until it is available, and returns
    /// the new volume identifier.
    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> BackendFuture<'a, String, Self::Error>;

    /// Requests volume deletion. Fire-and-forget: no deletion wait is
    /// enforced, since the volume is being discarded.
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BackendFuture<'a, (), Self::Error>;

    /// Returns the volume's current attributes for read-only decisions.
    fn describe_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> BackendFuture<'a, VolumeInfo, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gp2", StorageClass::GeneralPurpose)]
    #[case("st1", StorageClass::ThroughputOptimized)]
    #[case("sc1", StorageClass::ColdHdd)]
    #[case("standard", StorageClass::Magnetic)]
    fn storage_class_round_trips_api_strings(#[case] text: &str, #[case] class: StorageClass) {
        assert_eq!(text.parse::<StorageClass>().ok(), Some(class));
        assert_eq!(class.as_api_str(), text);
    }

    #[rstest]
    fn storage_class_rejects_unknown_values() {
        let err = "gp9".parse::<StorageClass>().expect_err("should reject");
        assert_eq!(err, UnknownStorageClass(String::from("gp9")));
    }

    #[rstest]
    fn hdd_classes_carry_the_size_floor() {
        assert_eq!(
            StorageClass::ThroughputOptimized.size_floor_gib(),
            Some(500)
        );
        assert_eq!(StorageClass::ColdHdd.size_floor_gib(), Some(500));
        assert_eq!(StorageClass::GeneralPurpose.size_floor_gib(), None);
        assert_eq!(StorageClass::ProvisionedIops.size_floor_gib(), None);
    }

    #[rstest]
    fn only_the_baseline_class_derives_iops() {
        assert!(StorageClass::GeneralPurpose.derives_iops());
        assert!(!StorageClass::GeneralPurposeV3.derives_iops());
        assert!(!StorageClass::ProvisionedIops.derives_iops());
    }

    #[rstest]
    fn attachment_lookup_matches_instance() {
        let info = VolumeInfo {
            id: String::from("vol-1"),
            size_gib: 100,
            storage_class: StorageClass::GeneralPurpose,
            iops: None,
            encrypted: true,
            availability_zone: String::from("eu-west-1a"),
            tags: Vec::new(),
            attachments: vec![VolumeAttachment {
                instance_id: String::from("i-1"),
                device: Utf8PathBuf::from("/dev/sdf"),
            }],
        };
        assert!(info.attachment_to("i-1").is_some());
        assert!(info.attachment_to("i-2").is_none());
    }
}
