use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use pincer_pep508::Requirement;

use crate::{InstallRequirement, NoCandidateFound};

pub use static_index::StaticRepository;

mod static_index;

/// The answer to "which version should this requirement be pinned to".
#[derive(Debug, Clone)]
pub enum BestMatch {
    /// A requirement pinned to a single version, or the requirement itself for editable and
    /// direct-URL requirements.
    Found(InstallRequirement),
    /// No version satisfies the requirement.
    NotFound(NoCandidateFound),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Expected a pinned, editable or URL requirement, got `{0}`")]
    NotPinned(String),

    #[error("Metadata for `{0}` can only be determined by building it")]
    RequiresBuild(String),

    #[error("Package `{0}` was not found in the package index")]
    UnknownPackage(String),

    #[error("Failed to fetch: `{url}`")]
    Fetch {
        url: String,
        #[source]
        err: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid metadata for `{package}`")]
    Metadata {
        package: String,
        #[source]
        err: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The package index capability the resolver needs.
pub trait Repository: Send + Sync {
    /// Pin a requirement to the best version the index offers.
    ///
    /// Editable and direct-URL requirements are their own best match.
    fn find_best_match<'io>(
        &'io self,
        ireq: &'io InstallRequirement,
        prereleases: bool,
    ) -> impl Future<Output = Result<BestMatch, RepositoryError>> + Send + 'io;

    /// The direct dependencies of a pinned, editable or direct-URL requirement, with their
    /// markers still attached.
    fn get_dependencies<'io>(
        &'io self,
        ireq: &'io InstallRequirement,
    ) -> impl Future<Output = Result<Vec<Requirement>, RepositoryError>> + Send + 'io;

    /// The `algorithm:hexdigest` hashes of every acceptable distribution of a pin. Empty for
    /// local directories.
    fn get_hashes<'io>(
        &'io self,
        ireq: &'io InstallRequirement,
    ) -> impl Future<Output = Result<BTreeSet<String>, RepositoryError>> + Send + 'io;

    /// The index locations consulted, for diagnostics.
    fn index_urls(&self) -> Vec<String>;

    /// The platform compatibility filter applied to distributions.
    fn platform_filter(&self) -> &PlatformFilter;

    /// Drop any memoized index responses.
    fn clear_caches(&self);
}

/// Whether distributions are filtered to those compatible with the current platform.
///
/// Hash collection wants every distribution of a pin, so it switches the filter off for its
/// duration with [`PlatformFilter::unrestricted`].
#[derive(Debug, Default)]
pub struct PlatformFilter {
    unrestricted: AtomicBool,
}

impl PlatformFilter {
    /// Whether every platform is currently accepted.
    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted.load(Ordering::Acquire)
    }

    /// Accept every platform until the returned guard is dropped.
    pub fn unrestricted(&self) -> UnrestrictedGuard<'_> {
        let previous = self.unrestricted.swap(true, Ordering::AcqRel);
        UnrestrictedGuard {
            filter: self,
            previous,
        }
    }
}

/// Restores the previous [`PlatformFilter`] mode on drop.
#[derive(Debug)]
#[must_use]
pub struct UnrestrictedGuard<'a> {
    filter: &'a PlatformFilter,
    previous: bool,
}

impl Drop for UnrestrictedGuard<'_> {
    fn drop(&mut self) {
        self.filter
            .unrestricted
            .store(self.previous, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores() {
        let filter = PlatformFilter::default();
        assert!(!filter.is_unrestricted());
        {
            let _outer = filter.unrestricted();
            assert!(filter.is_unrestricted());
            {
                let _inner = filter.unrestricted();
                assert!(filter.is_unrestricted());
            }
            assert!(filter.is_unrestricted());
        }
        assert!(!filter.is_unrestricted());
    }
}
