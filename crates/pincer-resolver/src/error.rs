use std::fmt::{Display, Formatter};

use itertools::Itertools;
use thiserror::Error;

use pincer_pep440::Version;
use pincer_pep508::Pep508Error;

use crate::{CacheError, InstallRequirement, RepositoryError};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    NoCandidateFound(Box<NoCandidateFound>),

    #[error(transparent)]
    Incompatible(#[from] Box<IncompatibleRequirements>),

    #[error(
        "No stable configuration of concrete packages could be found for the given constraints after {rounds} rounds of resolving. This is likely a bug."
    )]
    RoundLimit { rounds: usize },

    #[error("Failed to query the package repository for `{0}`")]
    Repository(String, #[source] RepositoryError),

    #[error("Failed to parse dependency `{dependency}` of `{parent}`")]
    InvalidDependency {
        parent: String,
        dependency: String,
        #[source]
        err: Box<Pep508Error>,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<NoCandidateFound> for ResolveError {
    fn from(value: NoCandidateFound) -> Self {
        Self::NoCandidateFound(Box::new(value))
    }
}

impl From<IncompatibleRequirements> for ResolveError {
    fn from(value: IncompatibleRequirements) -> Self {
        Self::Incompatible(Box::new(value))
    }
}

/// Two requirements pin the same package to different versions.
#[derive(Error, Debug, Clone)]
#[error("Incompatible requirements found: {first} and {second}")]
pub struct IncompatibleRequirements {
    pub first: InstallRequirement,
    pub second: InstallRequirement,
}

/// No version of a package satisfies its combined requirement.
#[derive(Debug, Clone)]
pub struct NoCandidateFound {
    /// The combined requirement that couldn't be matched.
    pub ireq: InstallRequirement,
    /// Every version of the package the index offered.
    pub tried: Vec<Version>,
    /// The index locations that were consulted.
    pub index_urls: Vec<String>,
    /// Whether pre-releases were allowed.
    pub prereleases: bool,
}

impl std::error::Error for NoCandidateFound {}

impl Display for NoCandidateFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (pre_versions, versions): (Vec<&Version>, Vec<&Version>) = self
            .tried
            .iter()
            .sorted()
            .partition(|version| version.any_prerelease());

        write!(f, "Could not find a version that matches {}", self.ireq)?;

        if !versions.is_empty() {
            write!(f, "\nTried: {}", versions.iter().join(", "))?;
        }

        if !pre_versions.is_empty() {
            let verb = if self.prereleases { "Tried" } else { "Skipped" };
            write!(f, "\n{verb} pre-versions: {}", pre_versions.iter().join(", "))?;
        }

        if versions.is_empty() && pre_versions.is_empty() {
            let verb = if self.index_urls.len() > 1 { "Were" } else { "Was" };
            write!(
                f,
                "\nNo versions found\n{verb} {} reachable?",
                self.index_urls.join(" or ")
            )?;
        } else {
            f.write_str("\nThere are incompatible versions in the resolved dependencies:")?;
            for source in self.ireq.sources() {
                write!(f, "\n  {source}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use insta::assert_snapshot;
    use pincer_pep440::Version;
    use pincer_pep508::Requirement;

    use super::*;

    fn ireq(input: &str) -> InstallRequirement {
        InstallRequirement::from_requirement(Requirement::from_str(input).unwrap(), None)
    }

    #[test]
    fn no_versions() {
        let err = NoCandidateFound {
            ireq: ireq("missing>=1"),
            tried: Vec::new(),
            index_urls: vec![
                "https://pypi.org/simple".to_string(),
                "https://mirror.invalid/simple".to_string(),
            ],
            prereleases: false,
        };
        assert_snapshot!(err, @r"
        Could not find a version that matches missing>=1
        No versions found
        Were https://pypi.org/simple or https://mirror.invalid/simple reachable?
        ");
    }

    #[test]
    fn skipped_prereleases() {
        let err = NoCandidateFound {
            ireq: ireq("sqlalchemy>1.0.6"),
            tried: ["1.0.6", "0.9.9", "1.0.0b5", "0.9.8"]
                .iter()
                .map(|version| Version::from_str(version).unwrap())
                .collect(),
            index_urls: vec!["https://pypi.org/simple".to_string()],
            prereleases: false,
        };
        assert_snapshot!(err, @r"
        Could not find a version that matches sqlalchemy>1.0.6
        Tried: 0.9.8, 0.9.9, 1.0.6
        Skipped pre-versions: 1.0.0b5
        There are incompatible versions in the resolved dependencies:
          sqlalchemy>1.0.6
        ");
    }

    #[test]
    fn tried_prereleases() {
        let err = NoCandidateFound {
            ireq: ireq("sqlalchemy>1.0.6"),
            tried: ["1.0.6", "1.0.0b5", "0.9.9"]
                .iter()
                .map(|version| Version::from_str(version).unwrap())
                .collect(),
            index_urls: vec!["https://pypi.org/simple".to_string()],
            prereleases: true,
        };
        assert_snapshot!(err, @r"
        Could not find a version that matches sqlalchemy>1.0.6
        Tried: 0.9.9, 1.0.6
        Tried pre-versions: 1.0.0b5
        There are incompatible versions in the resolved dependencies:
          sqlalchemy>1.0.6
        ");
    }

    #[test]
    fn incompatible() {
        let err = IncompatibleRequirements {
            first: ireq("six==1.9.0"),
            second: ireq("six==1.6.1"),
        };
        assert_eq!(
            err.to_string(),
            "Incompatible requirements found: six==1.9.0 and six==1.6.1"
        );
    }
}
