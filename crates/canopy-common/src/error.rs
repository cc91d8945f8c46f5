use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanopyError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("path already exists: {0}")]
    PathAlreadyExists(String),
    #[error("no such upload: {0}")]
    NoSuchUpload(String),
    #[error("content digest mismatch: expected {expected}, computed {computed}")]
    BadDigest { expected: String, computed: String },
    #[error("invalid part: {0}")]
    InvalidPart(i32),
    #[error("manifest part numbers must be ascending")]
    InvalidPartOrder,
    #[error("part {part_number} is too small: size={size}, min_size={min_size}")]
    EntityTooSmall {
        part_number: i32,
        size: i64,
        min_size: i64,
    },
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),
    #[error("invalid object key: {0}")]
    InvalidObjectName(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("deadline exceeded during {0}")]
    Deadline(&'static str),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CanopyError {
    pub fn s3_error_code(&self) -> &'static str {
        match self {
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::ObjectNotFound { .. } | Self::PathNotFound(_) => "NoSuchKey",
            Self::PathAlreadyExists(_) => "InvalidArgument",
            Self::NoSuchUpload(_) => "NoSuchUpload",
            Self::BadDigest { .. } => "BadDigest",
            Self::InvalidPart(_) => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::EntityTooSmall { .. } => "EntityTooSmall",
            Self::DirectoryNotEmpty(_) => "BucketNotEmpty",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidObjectName(_) => "InvalidObjectName",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Deadline(_) => "SlowDown",
            Self::InternalError(_) | Self::Io(_) => "InternalError",
        }
    }

    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Deadline(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, CanopyError>;

#[cfg(test)]
mod tests {
    use super::CanopyError;

    #[test]
    fn protocol_codes_cover_the_upload_taxonomy() {
        assert_eq!(
            CanopyError::NoSuchUpload("id".to_string()).s3_error_code(),
            "NoSuchUpload"
        );
        assert_eq!(CanopyError::InvalidPart(-1).s3_error_code(), "InvalidPart");
        assert_eq!(
            CanopyError::InvalidPartOrder.s3_error_code(),
            "InvalidPartOrder"
        );
        assert_eq!(
            CanopyError::EntityTooSmall {
                part_number: 1,
                size: 1,
                min_size: 1024,
            }
            .s3_error_code(),
            "EntityTooSmall"
        );
    }

    #[test]
    fn only_transport_level_failures_are_retryable() {
        assert!(CanopyError::Deadline("commit upload").is_retryable());
        assert!(!CanopyError::InvalidPartOrder.is_retryable());
        assert!(!CanopyError::BucketNotFound("b".to_string()).is_retryable());
    }
}
