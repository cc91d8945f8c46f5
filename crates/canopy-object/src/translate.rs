//! Bucket/key to namespace-path mapping. Everything here is deterministic
//! and free of I/O; the gateway and the upload coordinator both lean on it.

use canopy_common::error::{CanopyError, Result};
use canopy_namespace::SYS_DIR_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    File,
    Directory,
}

/// A key ending in `/` always denotes a directory marker, whatever the
/// payload length.
pub fn classify_create(key: &str) -> CreateKind {
    if key.ends_with('/') {
        CreateKind::Directory
    } else {
        CreateKind::File
    }
}

pub fn object_path(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", key.trim_end_matches('/'))
}

/// Staging directory for one upload session: a sibling of the final object
/// suffixed with the session's fresh id, so it cannot collide with a real
/// object and its parts stay addressable while the session is open.
pub fn staging_path(bucket: &str, key: &str, upload_id: &str) -> String {
    format!("{}_{upload_id}", object_path(bucket, key))
}

pub fn part_path(staging_path: &str, part_number: i32) -> String {
    format!("{staging_path}/{part_number}")
}

pub fn multipart_meta_dir() -> String {
    format!("{SYS_DIR_NAME}/multipart")
}

/// Persisted session record; survives process restart.
pub fn upload_meta_path(upload_id: &str) -> String {
    format!("{SYS_DIR_NAME}/multipart/{upload_id}.json")
}

pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    if bucket.is_empty() || bucket == SYS_DIR_NAME || bucket.contains('/') || bucket.contains('\\')
    {
        return Err(CanopyError::InvalidBucketName(bucket.to_string()));
    }
    Ok(())
}

pub fn validate_key(key: &str) -> Result<()> {
    let trimmed = key.trim_end_matches('/');
    if trimmed.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(CanopyError::InvalidObjectName(key.to_string()));
    }
    for component in trimmed.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(CanopyError::InvalidObjectName(key.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_separator_means_directory() {
        assert_eq!(classify_create("a/b/"), CreateKind::Directory);
        assert_eq!(classify_create("a/b"), CreateKind::File);
    }

    #[test]
    fn object_path_preserves_hierarchy() {
        assert_eq!(object_path("bucket", "a/b/c"), "bucket/a/b/c");
        assert_eq!(object_path("bucket", "folder/"), "bucket/folder");
    }

    #[test]
    fn staging_path_is_a_sibling_of_the_object() {
        assert_eq!(
            staging_path("bucket", "dir/object", "id-1"),
            "bucket/dir/object_id-1"
        );
        assert_eq!(part_path("bucket/dir/object_id-1", 7), "bucket/dir/object_id-1/7");
    }

    #[test]
    fn bucket_names_are_validated() {
        assert!(validate_bucket_name("bucket").is_ok());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("a/b").is_err());
        assert!(validate_bucket_name(SYS_DIR_NAME).is_err());
    }

    #[test]
    fn keys_are_validated() {
        assert!(validate_key("a/b/c").is_ok());
        assert!(validate_key("folder/").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a//b").is_err());
        assert!(validate_key("a/../b").is_err());
    }

    #[test]
    fn distinct_keys_map_to_distinct_paths() {
        // "a" and "a/" share a node path; "a" and "ab" never collide.
        assert_ne!(object_path("b", "a"), object_path("b", "ab"));
        assert_eq!(object_path("b", "a"), object_path("b", "a/"));
    }
}
