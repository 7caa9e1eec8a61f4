pub use cache::{CacheError, DependencyCache};
pub use combine::combine_install_requirements;
pub use error::{IncompatibleRequirements, NoCandidateFound, ResolveError};
pub use options::{ResolverOptions, ResolverOptionsBuilder};
pub use repository::{
    BestMatch, PlatformFilter, Repository, RepositoryError, StaticRepository, UnrestrictedGuard,
};
pub use requirement::{ComesFrom, InstallRequirement, parse_constraints};
pub use resolution::Resolution;
pub use resolver::Resolver;
pub use summary::RequirementSummary;

mod cache;
mod combine;
mod error;
mod options;
mod repository;
mod requirement;
mod resolution;
mod resolver;
pub mod specifier;
mod summary;
