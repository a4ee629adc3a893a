pub mod codec;
pub mod format;

pub use format::SnapshotFile;
