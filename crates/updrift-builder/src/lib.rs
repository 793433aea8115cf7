//! Release package builder for updrift.
//!
//! Turns a built application package into a distribution-ready release
//! artifact: validates the platform and dependency policy, strips
//! dependency metadata, renders release notes, repairs the container's
//! content-type declarations, and re-zips the result.

pub mod container;
pub mod content_types;
pub mod release;
pub mod spec;

pub use container::ContainerError;
pub use release::{
    BuildError, ReleasePackageBuilder, previous_release_package, suggested_file_name,
};
pub use spec::{PackageSpec, SpecError, is_valid_package_id};
