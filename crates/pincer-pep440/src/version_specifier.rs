use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::version::compare_release;
use crate::{Operator, Version, VersionParseError};

/// A conjunction of version specifiers, such as `>=2.1,<3`.
///
/// The set holds no two equal specifiers and is kept sorted by the rendered form of each
/// specifier, so the display of a combined set doesn't depend on the order the parts were
/// combined in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl std::ops::Deref for VersionSpecifiers {
    type Target = [VersionSpecifier];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VersionSpecifiers {
    /// Matches all versions.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether every specifier matches the given version.
    pub fn contains(&self, version: &Version) -> bool {
        self.iter().all(|specifier| specifier.contains(version))
    }

    /// The logical AND of two specifier sets.
    ///
    /// Specifiers that are equal up to zero padding (`==1.2` and `==1.2.0`) are kept once, in
    /// their shortest rendering.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        self.iter().chain(other.iter()).cloned().collect()
    }

    /// Whether any specifier names a pre-release with an inclusive operator (`>=1.0b1`), which
    /// opts the requirement into pre-releases.
    pub fn any_prerelease(&self) -> bool {
        self.iter().any(VersionSpecifier::any_prerelease)
    }

    /// If the set pins a single version with `==` or `===`, returns it.
    pub fn pinned_version(&self) -> Option<&Version> {
        match self.0.as_slice() {
            [specifier] if specifier.is_pin() => Some(specifier.version()),
            _ => None,
        }
    }

    fn from_unsorted(specifiers: Vec<VersionSpecifier>) -> Self {
        let mut rendered: Vec<(String, VersionSpecifier)> = specifiers
            .into_iter()
            .map(|specifier| (specifier.to_string(), specifier))
            .collect();
        // Shorter renderings first, so the retained member of a duplicate group is the shortest.
        rendered.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let mut unique: Vec<(String, VersionSpecifier)> = Vec::with_capacity(rendered.len());
        for (string, specifier) in rendered {
            if !unique.iter().any(|(_, kept)| *kept == specifier) {
                unique.push((string, specifier));
            }
        }
        unique.sort_by(|(a, _), (b, _)| a.cmp(b));

        Self(unique.into_iter().map(|(_, specifier)| specifier).collect())
    }
}

impl FromIterator<VersionSpecifier> for VersionSpecifiers {
    fn from_iter<T: IntoIterator<Item = VersionSpecifier>>(iter: T) -> Self {
        Self::from_unsorted(iter.into_iter().collect())
    }
}

impl IntoIterator for VersionSpecifiers {
    type Item = VersionSpecifier;
    type IntoIter = std::vec::IntoIter<VersionSpecifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<VersionSpecifier> for VersionSpecifiers {
    fn from(specifier: VersionSpecifier) -> Self {
        Self(vec![specifier])
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionSpecifiersParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        let specifiers = s
            .split(',')
            .map(|part| {
                VersionSpecifier::from_str(part).map_err(|err| VersionSpecifiersParseError {
                    err,
                    line: s.to_string(),
                    specifier: part.trim().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_unsorted(specifiers))
    }
}

impl Display for VersionSpecifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, specifier) in self.0.iter().enumerate() {
            if idx == 0 {
                write!(f, "{specifier}")?;
            } else {
                write!(f, ",{specifier}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A specifier list that failed to parse, naming the offending specifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse version specifier `{specifier}`: {err}")]
pub struct VersionSpecifiersParseError {
    err: VersionSpecifierParseError,
    line: String,
    specifier: String,
}

impl VersionSpecifiersParseError {
    /// The full specifier list that was being parsed.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// A single predicate such as `>=1.16` or `==2.*`.
///
/// Equality and hashing are zero-padding insensitive (`>=1.2` equals `>=1.2.0`), except for the
/// prefix operators, where `==1.2.*` and `==1.2.0.*` match different sets of versions.
#[derive(Debug, Clone)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    /// Build a specifier, checking the combinations PEP 440 disallows.
    pub fn new(
        operator: Operator,
        version: Version,
        star: bool,
    ) -> Result<Self, VersionSpecifierParseError> {
        let operator = match (operator, star) {
            (Operator::Equal, true) => Operator::EqualStar,
            (Operator::NotEqual, true) => Operator::NotEqualStar,
            (operator, true) => {
                return Err(VersionSpecifierParseError::StarOperator(operator));
            }
            (operator, false) => operator,
        };

        if version.is_local()
            && !matches!(
                operator,
                Operator::Equal | Operator::NotEqual | Operator::ExactEqual
            )
        {
            return Err(VersionSpecifierParseError::LocalVersion(operator));
        }

        if operator == Operator::TildeEqual && version.release.len() < 2 {
            return Err(VersionSpecifierParseError::CompatibleRelease);
        }

        Ok(Self { operator, version })
    }

    /// `==<version>`
    pub fn equals_version(version: Version) -> Self {
        Self {
            operator: Operator::Equal,
            version,
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether this specifier pins exactly one version (`==1.2.3` or `===1.2.3`).
    pub fn is_pin(&self) -> bool {
        matches!(self.operator, Operator::Equal | Operator::ExactEqual)
    }

    /// Whether the specifier explicitly names a pre-release it would match.
    pub fn any_prerelease(&self) -> bool {
        self.operator.is_inclusive() && self.version.any_prerelease()
    }

    /// Whether the version satisfies this specifier.
    pub fn contains(&self, version: &Version) -> bool {
        // Local labels of the candidate are ignored unless the specifier has one itself.
        let candidate = if self.version.is_local() {
            version.clone()
        } else {
            version.without_local()
        };
        let this = &self.version;

        match self.operator {
            Operator::Equal => candidate == *this,
            Operator::ExactEqual => version.to_string() == this.to_string(),
            Operator::NotEqual => candidate != *this,
            Operator::EqualStar => Self::prefix_matches(this, &candidate),
            Operator::NotEqualStar => !Self::prefix_matches(this, &candidate),
            Operator::TildeEqual => {
                // `~=V.N` means `>=V.N, ==V.*`.
                let prefix = Version {
                    epoch: this.epoch,
                    ..Version::new(this.release[..this.release.len() - 1].iter().copied())
                };
                Self::prefix_matches(&prefix, &candidate) && candidate >= *this
            }
            Operator::GreaterThan => Self::greater_than(this, &candidate),
            Operator::GreaterThanEqual => candidate >= *this,
            Operator::LessThan => Self::less_than(this, &candidate),
            Operator::LessThanEqual => candidate <= *this,
        }
    }

    fn prefix_matches(prefix: &Version, candidate: &Version) -> bool {
        prefix.epoch == candidate.epoch
            && prefix
                .release
                .iter()
                .zip(candidate.release.iter().chain(std::iter::repeat(&0)))
                .all(|(this, other)| this == other)
    }

    /// `<V` excludes pre-releases of `V` itself unless `V` is a pre-release.
    fn less_than(this: &Version, candidate: &Version) -> bool {
        if !this.any_prerelease()
            && candidate.any_prerelease()
            && candidate.epoch == this.epoch
            && compare_release(&this.release, &candidate.release) == Ordering::Equal
        {
            return false;
        }
        candidate < this
    }

    /// `>V` excludes post-releases of `V` unless `V` is a post-release.
    fn greater_than(this: &Version, candidate: &Version) -> bool {
        if candidate.epoch == this.epoch
            && compare_release(&this.release, &candidate.release) == Ordering::Equal
            && !this.is_post()
            && candidate.is_post()
            && this.pre == candidate.pre
        {
            return false;
        }
        candidate > this
    }

    fn star_len(&self) -> usize {
        match self.operator {
            Operator::EqualStar | Operator::NotEqualStar => self.version.release.len(),
            _ => 0,
        }
    }
}

impl PartialEq for VersionSpecifier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionSpecifier {}

impl Hash for VersionSpecifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.operator.hash(state);
        self.version.hash(state);
        self.star_len().hash(state);
        if self.operator == Operator::ExactEqual {
            self.version.to_string().hash(state);
        }
    }
}

impl PartialOrd for VersionSpecifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSpecifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.operator
            .cmp(&other.operator)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.star_len().cmp(&other.star_len()))
            .then_with(|| {
                if self.operator == Operator::ExactEqual {
                    self.version.to_string().cmp(&other.version.to_string())
                } else {
                    Ordering::Equal
                }
            })
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionSpecifierParseError;

    /// Parses a specifier such as `>= 1.19`, `== 1.1.*` or `~=1.0`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let spec = spec.trim();
        let split = spec
            .find(|c: char| !matches!(c, '=' | '!' | '~' | '<' | '>'))
            .unwrap_or(spec.len());
        let (operator, version) = spec.split_at(split);
        if operator.is_empty() {
            return Err(VersionSpecifierParseError::MissingOperator(spec.to_string()));
        }
        let operator =
            Operator::from_str(operator).map_err(VersionSpecifierParseError::InvalidOperator)?;
        let version = version.trim();
        if version.is_empty() {
            return Err(VersionSpecifierParseError::MissingVersion(operator));
        }
        let (version, star) = Version::from_str_star(version)?;
        Self::new(operator, version, star)
    }
}

impl Display for VersionSpecifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.operator {
            Operator::EqualStar | Operator::NotEqualStar => {
                write!(f, "{}{}.*", self.operator, self.version)
            }
            _ => write!(f, "{}{}", self.operator, self.version),
        }
    }
}

impl<'de> Deserialize<'de> for VersionSpecifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for VersionSpecifier {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionSpecifierParseError {
    #[error("Expected a comparison operator (`==`, `>=`, ...) before `{0}`")]
    MissingOperator(String),
    #[error("{0}")]
    InvalidOperator(String),
    #[error("Expected a version after `{0}`")]
    MissingVersion(Operator),
    #[error(transparent)]
    InvalidVersion(#[from] VersionParseError),
    #[error("A `.*` version can only be used with `==` and `!=`, not `{0}`")]
    StarOperator(Operator),
    #[error("A local version can only be used with `==`, `!=` and `===`, not `{0}`")]
    LocalVersion(Operator),
    #[error("The `~=` operator requires at least two release segments")]
    CompatibleRelease,
}
