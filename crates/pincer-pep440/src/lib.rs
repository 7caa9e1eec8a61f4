//! Python version numbers and version specifiers, following
//! [PEP 440](https://peps.python.org/pep-0440).
//!
//! Two properties matter most to the resolver:
//!
//! * Release segments are zero padded before comparing, so `1.2 == 1.2.0` and both hash the same.
//!   A [`VersionSpecifier`] inherits this: `==1.2` and `==1.2.0` are the same predicate.
//! * [`VersionSpecifiers`] is a conjunction. Combining two sets with
//!   [`VersionSpecifiers::intersect`] keeps every predicate of both, drops duplicates and keeps
//!   the set sorted by its rendered form, so combining is associative and commutative.
pub use version::{LocalSegment, Operator, PreRelease, PreReleaseKind, Version, VersionParseError};
pub use version_specifier::{
    VersionSpecifier, VersionSpecifierParseError, VersionSpecifiers, VersionSpecifiersParseError,
};

mod version;
mod version_specifier;
