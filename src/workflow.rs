//! The clone saga: an ordered sequence of provider state transitions wrapped
//! around a raw block copy, with a single-level compensating rollback.
//!
//! The workflow moves the source volume onto the helper instance, copies it
//! onto a freshly created unencrypted volume, and swaps the result back onto
//! the source instance. Steps run strictly in order; each one waits for a
//! stable provider state before the next begins. Once the source volume has
//! been moved out of its original attachment, any failure triggers rollback:
//! free the half-made target from wherever it currently sits, reattach the
//! source volume at its recorded device path, restart the source instance,
//! and delete the target. Rollback is best-effort; if it fails there is no
//! second-level compensation.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{Backend, Tag};
use crate::copier::{BlockCopier, CopyError};
use crate::metadata::{IdentitySource, MetadataError};
use crate::provision::{self, CLONE_MARKER_KEY};

/// Default scratch device path for the source volume on the helper instance.
pub const DEFAULT_HELPER_SOURCE_DEVICE: &str = "/dev/sds";

/// Default scratch device path for the target volume on the helper instance.
pub const DEFAULT_HELPER_TARGET_DEVICE: &str = "/dev/sdt";

/// Inputs identifying the volume to clone and where it currently lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneRequest {
    /// Instance the source volume is attached to.
    pub source_instance_id: String,
    /// Volume whose contents are to be cloned.
    pub source_volume_id: String,
    /// Optional size for the clone, in GiB; defaults to the source size.
    pub target_size_gib: Option<u32>,
}

impl CloneRequest {
    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when an identifier is blank or the size
    /// override is zero.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.source_instance_id.trim().is_empty() {
            return Err(RequestError::MissingField("source_instance_id"));
        }
        if self.source_volume_id.trim().is_empty() {
            return Err(RequestError::MissingField("source_volume_id"));
        }
        if self.target_size_gib == Some(0) {
            return Err(RequestError::ZeroSize);
        }
        Ok(())
    }
}

/// Validation errors for a [`CloneRequest`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a required identifier is blank.
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    /// Raised when the size override is zero.
    #[error("target size must be a positive number of GiB")]
    ZeroSize,
}

/// Knobs for the workflow that are fixed for the saga's whole lifetime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneOptions {
    /// Scratch device path the source volume is attached at on the helper.
    pub helper_source_device: Utf8PathBuf,
    /// Scratch device path the target volume is attached at on the helper.
    pub helper_target_device: Utf8PathBuf,
    /// Whether to take a safety snapshot of the source volume before any
    /// destructive step. Disabled by default.
    pub backup_snapshot: bool,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            helper_source_device: Utf8PathBuf::from(DEFAULT_HELPER_SOURCE_DEVICE),
            helper_target_device: Utf8PathBuf::from(DEFAULT_HELPER_TARGET_DEVICE),
            backup_snapshot: false,
        }
    }
}

/// The saga's steps, in strict forward order. No branching, no loops, no
/// skipping; [`CloneStep::next`] is the complete transition table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CloneStep {
    /// Inputs validated.
    Init,
    /// Helper instance identity resolved from the metadata service.
    ResolveHelper,
    /// Source instance stopped.
    StopSource,
    /// Optional safety snapshot of the source volume.
    Snapshot,
    /// Source volume detached; original device path recorded.
    DetachSource,
    /// Source volume attached to the helper at the source scratch path.
    AttachSourceToHelper,
    /// Target volume provisioned.
    CreateTarget,
    /// Target volume attached to the helper at the target scratch path.
    AttachTargetToHelper,
    /// Raw block copy from source scratch path to target scratch path.
    Copy,
    /// Target volume detached from the helper.
    DetachTargetFromHelper,
    /// Target volume attached to the source instance at the recorded path.
    AttachTargetToSource,
    /// Source instance started again.
    StartSource,
    /// Orphaned source volume detached from the helper.
    DetachSourceFromHelper,
    /// Source volume deleted.
    DeleteSource,
    /// Terminal success state.
    Done,
}

impl CloneStep {
    /// Returns the step that follows `self`, or `None` from [`CloneStep::Done`].
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::ResolveHelper),
            Self::ResolveHelper => Some(Self::StopSource),
            Self::StopSource => Some(Self::Snapshot),
            Self::Snapshot => Some(Self::DetachSource),
            Self::DetachSource => Some(Self::AttachSourceToHelper),
            Self::AttachSourceToHelper => Some(Self::CreateTarget),
            Self::CreateTarget => Some(Self::AttachTargetToHelper),
            Self::AttachTargetToHelper => Some(Self::Copy),
            Self::Copy => Some(Self::DetachTargetFromHelper),
            Self::DetachTargetFromHelper => Some(Self::AttachTargetToSource),
            Self::AttachTargetToSource => Some(Self::StartSource),
            Self::StartSource => Some(Self::DetachSourceFromHelper),
            Self::DetachSourceFromHelper => Some(Self::DeleteSource),
            Self::DeleteSource => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl fmt::Display for CloneStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ResolveHelper => "resolve-helper",
            Self::StopSource => "stop-source",
            Self::Snapshot => "snapshot",
            Self::DetachSource => "detach-source",
            Self::AttachSourceToHelper => "attach-source-to-helper",
            Self::CreateTarget => "create-target",
            Self::AttachTargetToHelper => "attach-target-to-helper",
            Self::Copy => "copy",
            Self::DetachTargetFromHelper => "detach-target-from-helper",
            Self::AttachTargetToSource => "attach-target-to-source",
            Self::StartSource => "start-source",
            Self::DetachSourceFromHelper => "detach-source-from-helper",
            Self::DeleteSource => "delete-source",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What went wrong inside a single step.
#[derive(Debug, Error)]
pub enum StepFailure<E>
where
    E: std::error::Error + 'static,
{
    /// The inputs did not validate.
    #[error("invalid request: {0}")]
    Request(#[source] RequestError),
    /// The helper identity lookup failed.
    #[error("helper identity lookup failed: {0}")]
    Identity(#[source] MetadataError),
    /// A provider operation or its wait failed.
    #[error("provider operation failed: {0}")]
    Resource(#[source] E),
    /// The source volume holds no active attachment to the source instance,
    /// so there is no device path to restore later.
    #[error("volume {volume_id} has no active attachment to instance {instance_id}")]
    SourceNotAttached {
        /// Volume that was expected to be attached.
        volume_id: String,
        /// Instance it was expected to be attached to.
        instance_id: String,
    },
    /// The block copy failed. Always fatal, never retried: a partial copy
    /// leaves the target device in an unknown, non-resumable state.
    #[error("block copy failed: {0}")]
    Copy(#[source] CopyError),
}

/// Outcome of a failed saga, including whether compensation ran.
///
/// Rollback is damage control, not success: callers must treat every variant
/// as a failure, including [`CloneError::RolledBack`].
#[derive(Debug, Error)]
pub enum CloneError<E>
where
    E: std::error::Error + 'static,
{
    /// The saga failed before the source volume left its original
    /// attachment; nothing was rolled back because nothing needed it.
    #[error("{step} failed: {source}")]
    Aborted {
        /// Step at which the saga failed.
        step: CloneStep,
        /// Underlying failure.
        #[source]
        source: StepFailure<E>,
    },
    /// The saga failed and the compensating sequence restored the source
    /// volume and instance; the target volume, if created, was deleted.
    #[error("{step} failed; source volume restored by rollback: {source}")]
    RolledBack {
        /// Step at which the saga failed.
        step: CloneStep,
        /// Underlying failure.
        #[source]
        source: StepFailure<E>,
    },
    /// The saga failed and so did the compensating sequence. Resources may be
    /// left inconsistent; operator recovery is required.
    #[error("{step} failed and rollback also failed ({rollback}): {source}")]
    RollbackFailed {
        /// Step at which the saga failed.
        step: CloneStep,
        /// Underlying failure.
        #[source]
        source: StepFailure<E>,
        /// Error raised by the rollback itself.
        rollback: E,
    },
}

impl<E> CloneError<E>
where
    E: std::error::Error + 'static,
{
    /// The step the saga had reached when it failed.
    #[must_use]
    pub const fn step(&self) -> CloneStep {
        match self {
            Self::Aborted { step, .. }
            | Self::RolledBack { step, .. }
            | Self::RollbackFailed { step, .. } => *step,
        }
    }
}

/// Result of a completed clone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneReport {
    /// Identifier of the newly created unencrypted volume.
    pub new_volume_id: String,
    /// Safety snapshot taken before destructive work, when enabled.
    pub snapshot_id: Option<String>,
    /// Device path the clone was attached at on the source instance.
    pub restored_device: Utf8PathBuf,
}

/// In-memory record of what the saga has determined or created so far. This
/// is the basis for the rollback decision; it does not survive the process.
#[derive(Clone, Debug, Default)]
struct WorkflowState {
    helper_instance_id: Option<String>,
    source_device: Option<Utf8PathBuf>,
    new_volume_id: Option<String>,
    snapshot_id: Option<String>,
}

fn resource_at<E>(step: CloneStep) -> impl FnOnce(E) -> (CloneStep, StepFailure<E>)
where
    E: std::error::Error + 'static,
{
    move |err| (step, StepFailure::Resource(err))
}

/// Drives the clone saga over injected capabilities.
#[derive(Debug)]
pub struct CloneWorkflow<B, C, I> {
    backend: B,
    copier: C,
    identity: I,
    options: CloneOptions,
}

impl<B, C, I> CloneWorkflow<B, C, I>
where
    B: Backend,
    C: BlockCopier,
    I: IdentitySource,
{
    /// Creates a workflow over the given capabilities.
    #[must_use]
    pub const fn new(backend: B, copier: C, identity: I, options: CloneOptions) -> Self {
        Self {
            backend,
            copier,
            identity,
            options,
        }
    }

    /// Runs the saga to completion or through rollback.
    ///
    /// The decision to terminate the process, and with which status, belongs
    /// to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`CloneError`] describing the failed step and whether the
    /// compensating sequence ran (and succeeded).
    pub async fn run(&self, request: &CloneRequest) -> Result<CloneReport, CloneError<B::Error>> {
        let mut state = WorkflowState::default();
        match self.advance(request, &mut state).await {
            Ok(report) => Ok(report),
            Err((step, failure)) => Err(self.handle_failure(request, &state, step, failure).await),
        }
    }

    #[expect(
        clippy::too_many_lines,
        reason = "the step sequence reads best as one ordered block"
    )]
    async fn advance(
        &self,
        request: &CloneRequest,
        state: &mut WorkflowState,
    ) -> Result<CloneReport, (CloneStep, StepFailure<B::Error>)> {
        request
            .validate()
            .map_err(|err| (CloneStep::Init, StepFailure::Request(err)))?;
        info!(step = %CloneStep::Init, volume = %request.source_volume_id, "inputs validated");

        let helper = self
            .identity
            .local_instance_id()
            .await
            .map_err(|err| (CloneStep::ResolveHelper, StepFailure::Identity(err)))?;
        info!(step = %CloneStep::ResolveHelper, helper = %helper, "resolved helper instance");
        state.helper_instance_id = Some(helper.clone());

        self.backend
            .stop_instance(&request.source_instance_id)
            .await
            .map_err(resource_at(CloneStep::StopSource))?;
        info!(step = %CloneStep::StopSource, instance = %request.source_instance_id, "source instance stopped");

        if self.options.backup_snapshot {
            let run_id = Uuid::new_v4().simple().to_string();
            let description = format!("volclone backup {run_id}");
            let tags = [Tag::new(CLONE_MARKER_KEY, "clone-backup")];
            let snapshot_id = self
                .backend
                .create_snapshot(&request.source_volume_id, &description, &tags)
                .await
                .map_err(resource_at(CloneStep::Snapshot))?;
            info!(step = %CloneStep::Snapshot, snapshot = %snapshot_id, "safety snapshot completed");
            state.snapshot_id = Some(snapshot_id);
        }

        let device = self
            .backend
            .detach_volume(&request.source_volume_id, &request.source_instance_id)
            .await
            .map_err(resource_at(CloneStep::DetachSource))?
            .ok_or_else(|| {
                (
                    CloneStep::DetachSource,
                    StepFailure::SourceNotAttached {
                        volume_id: request.source_volume_id.clone(),
                        instance_id: request.source_instance_id.clone(),
                    },
                )
            })?;
        info!(step = %CloneStep::DetachSource, device = %device, "source volume detached");
        state.source_device = Some(device.clone());

        self.backend
            .attach_volume(
                &request.source_volume_id,
                &helper,
                &self.options.helper_source_device,
            )
            .await
            .map_err(resource_at(CloneStep::AttachSourceToHelper))?;
        info!(step = %CloneStep::AttachSourceToHelper, device = %self.options.helper_source_device, "source volume attached to helper");

        let source_info = self
            .backend
            .describe_volume(&request.source_volume_id)
            .await
            .map_err(resource_at(CloneStep::CreateTarget))?;
        let spec = provision::plan_volume(&source_info, request.target_size_gib, None);
        let new_volume_id = self
            .backend
            .create_volume(&spec)
            .await
            .map_err(resource_at(CloneStep::CreateTarget))?;
        info!(step = %CloneStep::CreateTarget, volume = %new_volume_id, "target volume created");
        state.new_volume_id = Some(new_volume_id.clone());

        self.backend
            .attach_volume(&new_volume_id, &helper, &self.options.helper_target_device)
            .await
            .map_err(resource_at(CloneStep::AttachTargetToHelper))?;
        info!(step = %CloneStep::AttachTargetToHelper, device = %self.options.helper_target_device, "target volume attached to helper");

        info!(step = %CloneStep::Copy, "copying blocks; this can take a long time");
        self.copier
            .copy(
                &self.options.helper_source_device,
                &self.options.helper_target_device,
            )
            .map_err(|err| (CloneStep::Copy, StepFailure::Copy(err)))?;
        info!(step = %CloneStep::Copy, "copy finished and flushed");

        self.backend
            .detach_volume(&new_volume_id, &helper)
            .await
            .map_err(resource_at(CloneStep::DetachTargetFromHelper))?;
        info!(step = %CloneStep::DetachTargetFromHelper, "target volume detached from helper");

        self.backend
            .attach_volume(&new_volume_id, &request.source_instance_id, &device)
            .await
            .map_err(resource_at(CloneStep::AttachTargetToSource))?;
        info!(step = %CloneStep::AttachTargetToSource, device = %device, "target volume attached to source instance");

        self.backend
            .start_instance(&request.source_instance_id)
            .await
            .map_err(resource_at(CloneStep::StartSource))?;
        info!(step = %CloneStep::StartSource, instance = %request.source_instance_id, "source instance running");

        self.backend
            .detach_volume(&request.source_volume_id, &helper)
            .await
            .map_err(resource_at(CloneStep::DetachSourceFromHelper))?;
        info!(step = %CloneStep::DetachSourceFromHelper, "source volume detached from helper");

        self.backend
            .delete_volume(&request.source_volume_id)
            .await
            .map_err(resource_at(CloneStep::DeleteSource))?;
        info!(step = %CloneStep::DeleteSource, volume = %request.source_volume_id, "source volume deletion requested");

        info!(step = %CloneStep::Done, volume = %new_volume_id, "clone complete");
        Ok(CloneReport {
            new_volume_id,
            snapshot_id: state.snapshot_id.clone(),
            restored_device: device,
        })
    }

    async fn handle_failure(
        &self,
        request: &CloneRequest,
        state: &WorkflowState,
        step: CloneStep,
        failure: StepFailure<B::Error>,
    ) -> CloneError<B::Error> {
        let Some(device) = state.source_device.clone() else {
            warn!(step = %step, "failed before any detachment; nothing to roll back");
            return CloneError::Aborted {
                step,
                source: failure,
            };
        };

        warn!(step = %step, "step failed; rolling back");
        match self.rollback(request, state, &device).await {
            Ok(()) => CloneError::RolledBack {
                step,
                source: failure,
            },
            Err(rollback) => CloneError::RollbackFailed {
                step,
                source: failure,
                rollback,
            },
        }
    }

    /// Compensating sequence: detach the target volume from wherever it is
    /// currently attached, restore the source volume to its original
    /// attachment, restart the source instance, and discard the target
    /// volume. Sequential and best-effort; the first error ends it.
    ///
    /// The target detach runs first because a failure late in the saga can
    /// leave the target occupying the source volume's original device path.
    async fn rollback(
        &self,
        request: &CloneRequest,
        state: &WorkflowState,
        device: &Utf8Path,
    ) -> Result<(), B::Error> {
        if let Some(new_volume_id) = state.new_volume_id.as_deref() {
            let info = self.backend.describe_volume(new_volume_id).await?;
            for attachment in &info.attachments {
                self.backend
                    .detach_volume(new_volume_id, &attachment.instance_id)
                    .await?;
            }
        }

        if let Some(helper) = state.helper_instance_id.as_deref() {
            self.backend
                .detach_volume(&request.source_volume_id, helper)
                .await?;
        }

        self.backend
            .attach_volume(&request.source_volume_id, &request.source_instance_id, device)
            .await?;
        self.backend
            .start_instance(&request.source_instance_id)
            .await?;
        info!(instance = %request.source_instance_id, device = %device, "source volume restored");

        if let Some(new_volume_id) = state.new_volume_id.as_deref() {
            self.backend.delete_volume(new_volume_id).await?;
            info!(volume = %new_volume_id, "target volume discarded");
        }

        Ok(())
    }
}
