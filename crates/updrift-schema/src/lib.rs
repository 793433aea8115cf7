//! Shared data model for the updrift release engine.
//!
//! Everything that both producers (the release package builder) and
//! consumers (update clients) need to agree on lives here: the lenient
//! release version, the runtime platform tag, the filename identity codec,
//! and the SHA-1 newtype used by the `RELEASES` manifest.

pub mod hash;
pub mod identity;
pub mod platform;
pub mod version;

pub use hash::{HashError, Sha1Hash};
pub use identity::{IdentityError, PACKAGE_EXTENSION, PackageIdentity};
pub use platform::{Os, PlatformError, PlatformTag};
pub use version::{PackageVersion, VersionError};
