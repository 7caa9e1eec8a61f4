//! Operations on the version constraints and extras of requirements on a single package.

use std::collections::BTreeSet;

use pincer_normalize::ExtraName;
use pincer_pep440::{Version, VersionSpecifiers};

use crate::InstallRequirement;

/// The AND of two specifier sets. Duplicates, including ones that differ only by zero padding,
/// are kept once.
pub fn combine(a: &VersionSpecifiers, b: &VersionSpecifiers) -> VersionSpecifiers {
    a.intersect(b)
}

/// The union of the extras of two requirements on the same package.
///
/// Extras are tracked on the requirement itself, so the union is the same whether either side
/// was declared with a version specifier or only with a path or URL.
pub fn union_extras(a: &InstallRequirement, b: &InstallRequirement) -> BTreeSet<ExtraName> {
    a.extras.union(&b.extras).cloned().collect()
}

/// The outcome of [`filter_versions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredVersions<'a> {
    /// The matching versions, in the order they were given.
    pub versions: Vec<&'a Version>,
    /// Pre-releases were returned only because no stable version matched.
    pub prerelease_fallback: bool,
}

impl FilteredVersions<'_> {
    /// The highest matching version.
    pub fn best(&self) -> Option<&Version> {
        self.versions.iter().max().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Return the candidates that satisfy every specifier.
///
/// Unless `prereleases` is set, or a specifier names a pre-release itself (`>=2.0b1`),
/// pre-release and development versions are dropped whenever a stable version matches. When
/// only pre-releases match they are returned, flagged as a fallback.
pub fn filter_versions<'a>(
    candidates: impl IntoIterator<Item = &'a Version>,
    specifier: &VersionSpecifiers,
    prereleases: bool,
) -> FilteredVersions<'a> {
    let matching: Vec<&Version> = candidates
        .into_iter()
        .filter(|version| specifier.contains(version))
        .collect();

    if prereleases || specifier.any_prerelease() {
        return FilteredVersions {
            versions: matching,
            prerelease_fallback: false,
        };
    }

    let stable: Vec<&Version> = matching
        .iter()
        .copied()
        .filter(|version| !version.any_prerelease())
        .collect();
    if stable.is_empty() && !matching.is_empty() {
        FilteredVersions {
            versions: matching,
            prerelease_fallback: true,
        }
    } else {
        FilteredVersions {
            versions: stable,
            prerelease_fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pincer_pep440::{Version, VersionSpecifiers};
    use pincer_pep508::Requirement;
    use test_case::test_case;

    use super::*;

    fn versions(versions: &[&str]) -> Vec<Version> {
        versions
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect()
    }

    #[test_case(">=0.9", false, &["0.9.8", "0.9.9", "1.0.6"], false; "stable only")]
    #[test_case(">=0.9", true, &["0.9.8", "0.9.9", "1.0.0b5", "1.0.6"], false; "prereleases allowed")]
    #[test_case(">0.9.9,<1.0.6", false, &["1.0.0b5"], true; "prerelease fallback")]
    #[test_case(">=1.0.0b1", false, &["1.0.0b5", "1.0.6"], false; "specifier opts in")]
    #[test_case(">2", false, &[], false; "nothing matches")]
    fn filter(specifier: &str, prereleases: bool, expected: &[&str], fallback: bool) {
        let candidates = versions(&["0.9.8", "0.9.9", "1.0.0b5", "1.0.6"]);
        let specifier = VersionSpecifiers::from_str(specifier).unwrap();
        let filtered = filter_versions(&candidates, &specifier, prereleases);
        let rendered: Vec<String> = filtered.versions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, expected);
        assert_eq!(filtered.prerelease_fallback, fallback);
    }

    #[test]
    fn best_is_highest() {
        let candidates = versions(&["1.10", "1.8", "1.9.1"]);
        let filtered = filter_versions(&candidates, &VersionSpecifiers::empty(), false);
        assert_eq!(filtered.best().map(ToString::to_string).as_deref(), Some("1.10"));
    }

    #[test]
    fn combine_is_commutative() {
        let a = VersionSpecifiers::from_str(">=1.0,<3").unwrap();
        let b = VersionSpecifiers::from_str("!=2.0,>=1.0.0").unwrap();
        assert_eq!(combine(&a, &b), combine(&b, &a));
        assert_eq!(combine(&a, &b).to_string(), "!=2.0,<3,>=1.0");
    }

    #[test]
    fn extras_union_with_links() {
        let with_url = InstallRequirement::from_requirement(
            Requirement::from_str("app[web] @ file:///src/app").unwrap(),
            None,
        );
        let with_specifier = InstallRequirement::from_requirement(
            Requirement::from_str("App[CLI]>=1").unwrap(),
            None,
        );
        let union: Vec<String> = union_extras(&with_url, &with_specifier)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(union, ["cli", "web"]);
        assert_eq!(
            union_extras(&with_specifier, &with_url),
            union_extras(&with_url, &with_specifier)
        );
    }
}
