pub mod descriptor;
pub mod registry;

pub use descriptor::{ComponentSource, InstanceDescriptor, Multisite, WordPressSource};
pub use registry::{validate_slug, EnvironmentRegistry};
