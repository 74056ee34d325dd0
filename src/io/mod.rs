mod memory;
mod s3;
mod store;

pub use memory::MemoryStore;
pub use s3::{create_s3_client, S3OriginStore, S3VariantStore};
pub use store::{OriginStore, SourceObject, VariantStore};
