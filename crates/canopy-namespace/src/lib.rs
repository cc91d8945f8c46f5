pub mod local;
pub mod traits;

pub use local::LocalNamespace;
pub use traits::{NamespaceStore, NodeStat, SYS_DIR_NAME};
