pub mod config;
pub mod gateway;
pub mod multipart;
pub mod translate;

mod deadline;

pub use config::GatewayConfig;
pub use gateway::{ListObjectsPage, ObjectGateway};
pub use multipart::ManifestEntry;
