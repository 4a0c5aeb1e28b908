pub mod artifacts;
pub mod mirror;

pub use artifacts::JobArtifacts;
pub use mirror::MirrorStore;
