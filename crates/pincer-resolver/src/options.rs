use std::collections::BTreeSet;
use std::str::FromStr;

use pincer_normalize::PackageName;

/// Packages that install other packages, left out of generated requirements unless asked for.
const DEFAULT_UNSAFE_PACKAGES: &[&str] = &["setuptools", "distribute", "pip"];

/// Options for a single resolution.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Allow pre-release and development versions to be selected.
    pub prereleases: bool,
    /// Keep unsafe packages in the pinned set instead of setting them aside.
    pub allow_unsafe: bool,
    pub unsafe_packages: BTreeSet<PackageName>,
    /// Give up after this many rounds without reaching a fixpoint.
    pub max_rounds: usize,
    /// How many index queries may be in flight at once within a round.
    pub concurrency: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            prereleases: false,
            allow_unsafe: false,
            unsafe_packages: DEFAULT_UNSAFE_PACKAGES
                .iter()
                .filter_map(|name| PackageName::from_str(name).ok())
                .collect(),
            max_rounds: 10,
            concurrency: 16,
        }
    }
}

/// Builder for [`ResolverOptions`].
#[derive(Debug, Default, Clone)]
pub struct ResolverOptionsBuilder {
    options: ResolverOptions,
}

impl ResolverOptionsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn prereleases(mut self, prereleases: bool) -> Self {
        self.options.prereleases = prereleases;
        self
    }

    #[must_use]
    pub fn allow_unsafe(mut self, allow_unsafe: bool) -> Self {
        self.options.allow_unsafe = allow_unsafe;
        self
    }

    /// Replace the default set of unsafe packages. An empty iterator keeps the defaults.
    #[must_use]
    pub fn unsafe_packages(mut self, unsafe_packages: impl IntoIterator<Item = PackageName>) -> Self {
        let unsafe_packages: BTreeSet<PackageName> = unsafe_packages.into_iter().collect();
        if !unsafe_packages.is_empty() {
            self.options.unsafe_packages = unsafe_packages;
        }
        self
    }

    #[must_use]
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.options.max_rounds = max_rounds;
        self
    }

    /// Sets the per-round concurrency limit; zero is treated as one.
    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency.max(1);
        self
    }

    /// Builds the options.
    pub fn build(self) -> ResolverOptions {
        self.options
    }
}
