//! Artifact directory layout, scanning and window loading.

pub mod layout;
mod resolver;
mod window;

pub use layout::{human_date, ArtifactLayout, Scope};
pub use resolver::{ArtifactPath, DirectoryResolver, ResolvedArtifacts};
pub use window::{list_files, WindowArtifacts, WindowFile};
