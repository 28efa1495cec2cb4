//! Core library for the volclone volume migration tool.
//!
//! The crate exposes a backend abstraction over block-storage providers and
//! an EC2 implementation that powers the clone lifecycle (stop → detach →
//! copy → reattach → start), with best-effort rollback when a step fails
//! after the source volume has been disturbed.

pub mod backend;
pub mod command;
pub mod config;
pub mod copier;
pub mod ec2;
pub mod metadata;
pub mod provision;
pub mod test_support;
pub mod workflow;

pub use backend::{Backend, StorageClass, Tag, VolumeAttachment, VolumeInfo, VolumeSpec};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{CloneConfig, ConfigError};
pub use copier::{BlockCopier, CopierSettings, CopyError, DdCopier};
pub use ec2::{Ec2Backend, Ec2Error, Ec2Settings};
pub use metadata::{IdentitySource, ImdsClient, MetadataError};
pub use workflow::{
    CloneError, CloneOptions, CloneReport, CloneRequest, CloneStep, CloneWorkflow, StepFailure,
};
