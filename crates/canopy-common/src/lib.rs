pub mod error;
pub mod time;
pub mod types;

pub use error::{CanopyError, Result};
pub use types::{BucketInfo, ObjectStat, PartStat, UploadInfo};
