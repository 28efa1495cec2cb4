//! Decides the configuration of the new volume and the tags it is created
//! with.
//!
//! Both decisions are pure functions over the source volume's attributes so
//! they can be exercised without a provider.

use crate::backend::{Tag, VolumeInfo, VolumeSpec};

/// Tag key marking volumes produced by this tool.
pub const CLONE_MARKER_KEY: &str = "clone-marker";

/// Tag value paired with [`CLONE_MARKER_KEY`].
pub const CLONE_MARKER_VALUE: &str = "created-by-clone";

/// Computes the tag set for a newly created clone volume.
///
/// Pre-existing tags pass through in order. The marker tag is appended last,
/// unless the source already carries one, in which case the set is returned
/// unchanged so repeated application is idempotent.
#[must_use]
pub fn clone_tags(source_tags: &[Tag]) -> Vec<Tag> {
    if source_tags.iter().any(|tag| tag.key == CLONE_MARKER_KEY) {
        return source_tags.to_vec();
    }

    let mut tags = source_tags.to_vec();
    tags.push(Tag::new(CLONE_MARKER_KEY, CLONE_MARKER_VALUE));
    tags
}

/// Produces the creation specification for the clone volume.
///
/// The size is the caller override when supplied, otherwise the source size,
/// raised to the class minimum for throughput-optimised and cold HDD classes.
/// IOPS propagate from the source except for classes where the provider
/// derives them from size. When `snapshot_id` is supplied the spec sources its
/// data (and size) from the snapshot instead of carrying an explicit size.
///
/// Encryption is never requested; producing an unencrypted volume is the
/// purpose of the clone.
#[must_use]
pub fn plan_volume(
    source: &VolumeInfo,
    size_override_gib: Option<u32>,
    snapshot_id: Option<&str>,
) -> VolumeSpec {
    let mut size = size_override_gib.unwrap_or(source.size_gib);
    if let Some(floor) = source.storage_class.size_floor_gib() {
        size = size.max(floor);
    }

    let iops = if source.storage_class.derives_iops() {
        None
    } else {
        source.iops
    };

    let size_gib = if snapshot_id.is_some() {
        None
    } else {
        Some(size)
    };

    VolumeSpec {
        availability_zone: source.availability_zone.clone(),
        size_gib,
        storage_class: source.storage_class,
        iops,
        snapshot_id: snapshot_id.map(str::to_owned),
        tags: clone_tags(&source.tags),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageClass;
    use rstest::rstest;

    fn source(size_gib: u32, storage_class: StorageClass, iops: Option<u32>) -> VolumeInfo {
        VolumeInfo {
            id: String::from("vol-src"),
            size_gib,
            storage_class,
            iops,
            encrypted: true,
            availability_zone: String::from("eu-west-1a"),
            tags: Vec::new(),
            attachments: Vec::new(),
        }
    }

    #[rstest]
    fn gp2_spec_has_no_iops_and_keeps_size() {
        let spec = plan_volume(&source(100, StorageClass::GeneralPurpose, Some(300)), None, None);

        assert_eq!(spec.size_gib, Some(100));
        assert_eq!(spec.iops, None);
        assert_eq!(spec.storage_class, StorageClass::GeneralPurpose);
    }

    #[rstest]
    #[case(StorageClass::ThroughputOptimized)]
    #[case(StorageClass::ColdHdd)]
    fn hdd_classes_are_floored_to_500(#[case] class: StorageClass) {
        let spec = plan_volume(&source(100, class, Some(120)), None, None);

        assert_eq!(spec.size_gib, Some(500));
        assert_eq!(spec.iops, Some(120));
    }

    #[rstest]
    fn floor_applies_to_small_overrides_too() {
        let spec = plan_volume(
            &source(600, StorageClass::ColdHdd, None),
            Some(200),
            None,
        );

        assert_eq!(spec.size_gib, Some(500));
    }

    #[rstest]
    fn override_replaces_source_size_for_other_classes() {
        let spec = plan_volume(
            &source(100, StorageClass::ProvisionedIops, Some(4000)),
            Some(50),
            None,
        );

        assert_eq!(spec.size_gib, Some(50));
        assert_eq!(spec.iops, Some(4000));
    }

    #[rstest]
    fn snapshot_path_omits_size() {
        let spec = plan_volume(
            &source(100, StorageClass::GeneralPurpose, None),
            None,
            Some("snap-1"),
        );

        assert_eq!(spec.size_gib, None);
        assert_eq!(spec.snapshot_id.as_deref(), Some("snap-1"));
    }

    #[rstest]
    fn zone_follows_the_source() {
        let spec = plan_volume(&source(10, StorageClass::Magnetic, None), None, None);
        assert_eq!(spec.availability_zone, "eu-west-1a");
    }

    #[rstest]
    fn marker_tag_is_appended_after_existing_tags() {
        let tags = vec![Tag::new("env", "prod")];
        let result = clone_tags(&tags);

        assert_eq!(
            result,
            vec![
                Tag::new("env", "prod"),
                Tag::new(CLONE_MARKER_KEY, CLONE_MARKER_VALUE),
            ]
        );
    }

    #[rstest]
    fn marker_tag_is_added_to_an_empty_set() {
        let result = clone_tags(&[]);
        assert_eq!(result, vec![Tag::new(CLONE_MARKER_KEY, CLONE_MARKER_VALUE)]);
    }

    #[rstest]
    fn tagging_is_idempotent() {
        let once = clone_tags(&[Tag::new("env", "prod")]);
        let twice = clone_tags(&once);

        assert_eq!(once, twice);
        let markers = twice
            .iter()
            .filter(|tag| tag.key == CLONE_MARKER_KEY)
            .count();
        assert_eq!(markers, 1);
    }

    #[rstest]
    fn planned_spec_carries_the_marker_tag() {
        let mut src = source(100, StorageClass::GeneralPurpose, None);
        src.tags = vec![Tag::new("env", "prod")];
        let spec = plan_volume(&src, None, None);

        assert_eq!(
            spec.tags.last().map(|tag| tag.key.as_str()),
            Some(CLONE_MARKER_KEY)
        );
    }
}
