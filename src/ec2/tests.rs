//! Unit tests for the EC2 binding, driven by scripted CLI outputs.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;
use crate::backend::{StorageClass, Tag};
use crate::test_support::{
    ScriptedRunner, VolumePayload, json_created_snapshot, json_created_volume,
    json_instance_state, json_snapshot_state, json_volume,
};

fn backend(runner: ScriptedRunner) -> Ec2Backend<ScriptedRunner> {
    let settings = Ec2Settings {
        aws_bin: String::from("aws"),
        region: Some(String::from("eu-west-1")),
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(50),
    };
    Ec2Backend::new(settings, runner)
}

fn attached_volume(instance: &str, device: &str) -> String {
    json_volume(&VolumePayload {
        id: "vol-1",
        size: 100,
        volume_type: "gp2",
        iops: None,
        encrypted: true,
        zone: "eu-west-1a",
        state: "in-use",
        tags: &[],
        attachments: &[(instance, device, "attached")],
    })
}

fn detached_volume(state: &str) -> String {
    json_volume(&VolumePayload {
        id: "vol-1",
        size: 100,
        volume_type: "gp2",
        iops: None,
        encrypted: true,
        zone: "eu-west-1a",
        state,
        tags: &[],
        attachments: &[],
    })
}

#[rstest]
#[tokio::test]
async fn attach_is_a_noop_when_already_attached() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), attached_volume("i-1", "/dev/sdf"), "");
    let backend = backend(runner.clone());

    backend
        .attach_volume("vol-1", "i-1", &Utf8PathBuf::from("/dev/sdf"))
        .await
        .expect("attach should be a no-op");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1, "only the describe call should run");
    assert!(invocations[0].command_string().contains("describe-volumes"));
}

#[rstest]
#[tokio::test]
async fn detach_without_attachment_returns_no_device() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), detached_volume("available"), "");
    let backend = backend(runner.clone());

    let device = backend
        .detach_volume("vol-1", "i-1")
        .await
        .expect("detach should be a no-op");

    assert_eq!(device, None);
    assert_eq!(runner.invocations().len(), 1);
}

#[rstest]
#[tokio::test]
async fn detach_returns_the_recorded_device_path() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), attached_volume("i-1", "/dev/sdf"), "");
    runner.push_output(Some(0), "{}", "");
    runner.push_output(Some(0), detached_volume("available"), "");
    let backend = backend(runner.clone());

    let device = backend
        .detach_volume("vol-1", "i-1")
        .await
        .expect("detach should succeed");

    assert_eq!(device, Some(Utf8PathBuf::from("/dev/sdf")));
    let detach_call = runner.invocations()[1].command_string();
    assert!(detach_call.contains("detach-volume"));
    assert!(detach_call.contains("--device /dev/sdf"));
}

#[rstest]
#[tokio::test]
async fn attach_runs_the_provider_call_then_waits() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), detached_volume("available"), "");
    runner.push_output(Some(0), "{}", "");
    runner.push_output(Some(0), attached_volume("i-1", "/dev/sds"), "");
    let backend = backend(runner.clone());

    backend
        .attach_volume("vol-1", "i-1", &Utf8PathBuf::from("/dev/sds"))
        .await
        .expect("attach should succeed");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations[1].command_string().contains("attach-volume"));
}

#[rstest]
#[tokio::test]
async fn stop_polls_until_the_instance_is_stopped() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "{}", "");
    runner.push_output(Some(0), json_instance_state("i-1", "stopping"), "");
    runner.push_output(Some(0), json_instance_state("i-1", "stopped"), "");
    let backend = backend(runner.clone());

    backend
        .stop_instance("i-1")
        .await
        .expect("stop should succeed");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations[0].command_string().contains("stop-instances"));
    assert!(invocations[2].command_string().contains("describe-instances"));
}

#[rstest]
#[tokio::test]
async fn stuck_instance_transition_times_out() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "{}", "");
    runner.set_default_output(Some(0), json_instance_state("i-1", "stopping"));
    let backend = backend(runner);

    let err = backend
        .stop_instance("i-1")
        .await
        .expect_err("stop should time out");

    assert!(matches!(err, Ec2Error::Timeout { ref resource_id, .. } if resource_id == "i-1"));
}

#[rstest]
#[tokio::test]
async fn rejected_call_surfaces_operation_and_stderr() {
    let runner = ScriptedRunner::new();
    runner.push_failure(254);
    let backend = backend(runner);

    let err = backend
        .stop_instance("i-1")
        .await
        .expect_err("stop should fail");

    assert!(matches!(
        err,
        Ec2Error::OperationFailed { ref operation, ref message, .. }
            if operation == "stop-instances" && message.contains("simulated failure")
    ));
}

#[rstest]
#[tokio::test]
async fn create_volume_omits_iops_and_carries_tags() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), json_created_volume("vol-new"), "");
    runner.push_output(
        Some(0),
        json_volume(&VolumePayload {
            id: "vol-new",
            size: 100,
            volume_type: "gp2",
            state: "available",
            zone: "eu-west-1a",
            ..VolumePayload::default()
        }),
        "",
    );
    let backend = backend(runner.clone());
    let spec = VolumeSpec {
        availability_zone: String::from("eu-west-1a"),
        size_gib: Some(100),
        storage_class: StorageClass::GeneralPurpose,
        iops: None,
        snapshot_id: None,
        tags: vec![Tag::new("clone-marker", "created-by-clone")],
    };

    let volume_id = backend
        .create_volume(&spec)
        .await
        .expect("create should succeed");

    assert_eq!(volume_id, "vol-new");
    let create_call = runner.invocations()[0].command_string();
    assert!(create_call.contains("create-volume"));
    assert!(create_call.contains("--size 100"));
    assert!(create_call.contains("--volume-type gp2"));
    assert!(!create_call.contains("--iops"));
    assert!(create_call.contains("--tag-specifications"));
    assert!(create_call.contains("clone-marker"));
    assert!(create_call.contains("--region eu-west-1"));
    assert!(create_call.contains("--output json"));
}

#[rstest]
#[tokio::test]
async fn create_volume_passes_iops_for_provisioned_classes() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), json_created_volume("vol-new"), "");
    runner.push_output(
        Some(0),
        json_volume(&VolumePayload {
            id: "vol-new",
            size: 500,
            volume_type: "st1",
            state: "available",
            zone: "eu-west-1a",
            ..VolumePayload::default()
        }),
        "",
    );
    let backend = backend(runner.clone());
    let spec = VolumeSpec {
        availability_zone: String::from("eu-west-1a"),
        size_gib: Some(500),
        storage_class: StorageClass::ThroughputOptimized,
        iops: Some(120),
        snapshot_id: None,
        tags: Vec::new(),
    };

    backend
        .create_volume(&spec)
        .await
        .expect("create should succeed");

    let create_call = runner.invocations()[0].command_string();
    assert!(create_call.contains("--iops 120"));
    assert!(create_call.contains("--volume-type st1"));
}

#[rstest]
#[tokio::test]
async fn snapshot_polls_until_completed_and_carries_its_tags() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), json_created_snapshot("snap-1"), "");
    runner.push_output(Some(0), json_snapshot_state("snap-1", "pending"), "");
    runner.push_output(Some(0), json_snapshot_state("snap-1", "completed"), "");
    let backend = backend(runner.clone());

    let snapshot_id = backend
        .create_snapshot(
            "vol-1",
            "pre-clone safety copy",
            &[Tag::new("clone-marker", "clone-backup")],
        )
        .await
        .expect("snapshot should succeed");

    assert_eq!(snapshot_id, "snap-1");
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 3);
    let create_call = invocations[0].command_string();
    assert!(create_call.contains("create-snapshot"));
    assert!(create_call.contains("--description pre-clone safety copy"));
    assert!(create_call.contains("--tag-specifications"));
    assert!(create_call.contains("clone-backup"));
    assert!(invocations[2].command_string().contains("describe-snapshots"));
}

#[rstest]
#[tokio::test]
async fn snapshot_entering_the_error_state_fails_the_operation() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), json_created_snapshot("snap-1"), "");
    runner.push_output(Some(0), json_snapshot_state("snap-1", "error"), "");
    let backend = backend(runner);

    let err = backend
        .create_snapshot("vol-1", "pre-clone safety copy", &[])
        .await
        .expect_err("snapshot should fail");

    assert!(matches!(
        err,
        Ec2Error::OperationFailed { ref operation, ref resource_id, .. }
            if operation == "create-snapshot" && resource_id == "snap-1"
    ));
}

#[rstest]
#[tokio::test]
async fn delete_volume_does_not_wait() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), "{}", "");
    let backend = backend(runner.clone());

    backend
        .delete_volume("vol-1")
        .await
        .expect("delete should succeed");

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1, "no describe poll after deletion");
    assert!(invocations[0].command_string().contains("delete-volume"));
}

#[rstest]
#[tokio::test]
async fn describe_missing_volume_is_not_found() {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(0), r#"{"Volumes": []}"#, "");
    let backend = backend(runner);

    let err = backend
        .describe_volume("vol-gone")
        .await
        .expect_err("describe should fail");

    assert!(matches!(err, Ec2Error::NotFound { ref resource_id } if resource_id == "vol-gone"));
}
