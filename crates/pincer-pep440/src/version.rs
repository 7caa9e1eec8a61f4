use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::iter;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Adapted from <https://peps.python.org/pep-0440/#appendix-b-parsing-version-strings-with-regular-expressions>,
/// with an optional trailing `.*` for prefix matching in specifiers.
const VERSION_PATTERN: &str = r"
    v?
    (?:(?P<epoch>[0-9]+)!)?
    (?P<release>[0-9]+(?:\.[0-9]+)*)
    (?P<pre_field>
        [-_\.]?
        (?P<pre_name>alpha|a|beta|b|preview|pre|c|rc)
        [-_\.]?
        (?P<pre>[0-9]+)?
    )?
    (?P<post_field>
        (?:-(?P<post_old>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_new>[0-9]+)?
        )
    )?
    (?P<dev_field>
        [-_\.]?
        dev
        [-_\.]?
        (?P<dev>[0-9]+)?
    )?
    (?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?
    (?P<star>\.\*)?
";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?xi)^\s*{VERSION_PATTERN}\s*$")).expect("version regex is valid")
});

/// One of `~=` `==` `!=` `<=` `>=` `<` `>` `===`.
///
/// `==` and `!=` followed by a `.*` version are separate variants, since they match by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `== 1.2.3`
    Equal,
    /// `== 1.2.*`
    EqualStar,
    /// `=== 1.2.3`, compared on the rendered version.
    ExactEqual,
    /// `!= 1.2.3`
    NotEqual,
    /// `!= 1.2.*`
    NotEqualStar,
    /// `~= 1.2`
    TildeEqual,
    /// `< 1.2`
    LessThan,
    /// `<= 1.2`
    LessThanEqual,
    /// `> 1.2`
    GreaterThan,
    /// `>= 1.2`
    GreaterThanEqual,
}

impl Operator {
    /// The operator as written, without any `.*` suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal | Self::EqualStar => "==",
            Self::ExactEqual => "===",
            Self::NotEqual | Self::NotEqualStar => "!=",
            Self::TildeEqual => "~=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
        }
    }

    /// Whether the operator also matches the version it names, which is what decides if a
    /// pre-release in the specifier opts the whole requirement into pre-releases.
    pub(crate) fn is_inclusive(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::ExactEqual
                | Self::TildeEqual
                | Self::LessThanEqual
                | Self::GreaterThanEqual
        )
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Parses the operator without knowledge of a trailing star.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let operator = match s {
            "==" => Self::Equal,
            "===" => Self::ExactEqual,
            "!=" => Self::NotEqual,
            "~=" => Self::TildeEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            other => {
                return Err(format!(
                    "No such comparison operator '{other}', must be one of ~= == != <= >= < > ==="
                ));
            }
        };
        Ok(operator)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of a pre-release: alpha, beta or release candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreReleaseKind {
    Alpha,
    Beta,
    Rc,
}

impl FromStr for PreReleaseKind {
    type Err = String;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Ok(Self::Alpha),
            "b" | "beta" => Ok(Self::Beta),
            "c" | "rc" | "pre" | "preview" => Ok(Self::Rc),
            _ => Err(format!(
                "'{kind}' isn't recognized as alpha, beta or release candidate"
            )),
        }
    }
}

impl Display for PreReleaseKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alpha => f.write_str("a"),
            Self::Beta => f.write_str("b"),
            Self::Rc => f.write_str("rc"),
        }
    }
}

/// A pre-release marker such as `rc2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreRelease {
    pub kind: PreReleaseKind,
    pub number: u64,
}

/// A segment of a local version label (`+ubuntu.1`).
///
/// Numeric segments sort above alphanumeric ones, and a longer label sorts above a shorter one
/// that it starts with, which is exactly what the derived `Ord` on `Vec<LocalSegment>` does
/// given the manual `Ord` below.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    String(String),
    Number(u64),
}

impl LocalSegment {
    fn parse(segment: &str) -> Self {
        if let Ok(number) = segment.parse::<u64>() {
            Self::Number(number)
        } else {
            Self::String(segment.to_ascii_lowercase())
        }
    }
}

impl Display for LocalSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(string) => f.write_str(string),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(n1), Self::Number(n2)) => n1.cmp(n2),
            (Self::String(s1), Self::String(s2)) => s1.cmp(s2),
            (Self::Number(_), Self::String(_)) => Ordering::Greater,
            (Self::String(_), Self::Number(_)) => Ordering::Less,
        }
    }
}

/// A version number such as `1.2.3` or `4!5.6.7a8.post9.dev0+local`.
///
/// Equality, ordering and hashing treat missing release segments as zeros: `1.2`, `1.2.0` and
/// `1.2.0.0` are one version. The rendered form keeps the segments as written.
#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<PreRelease>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Vec<LocalSegment>,
}

impl Version {
    /// A final release such as `3.12`.
    pub fn new(release: impl IntoIterator<Item = u64>) -> Self {
        Self {
            epoch: 0,
            release: release.into_iter().collect(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Whether this is an alpha, beta, release candidate or development release.
    pub fn any_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_post(&self) -> bool {
        self.post.is_some()
    }

    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The version without its local label, used when matching against specifiers that carry
    /// no local label themselves.
    pub fn without_local(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Like [`FromStr`], but also accepts a trailing `.*` and reports whether it was present.
    pub fn from_str_star(version: &str) -> Result<(Self, bool), VersionParseError> {
        let captures = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParseError::new(version, "doesn't match PEP 440 rules"))?;
        Self::from_captures(version, &captures)
    }

    fn from_captures(input: &str, captures: &Captures) -> Result<(Self, bool), VersionParseError> {
        let number = |name: &str| -> Result<Option<u64>, VersionParseError> {
            captures
                .name(name)
                .map(|field| {
                    field.as_str().parse::<u64>().map_err(|err| {
                        VersionParseError::new(input, format!("`{}` {err}", field.as_str()))
                    })
                })
                .transpose()
        };

        // An implicit epoch, pre-release number, post-release number or dev number is zero.
        let epoch = number("epoch")?.unwrap_or_default();
        let pre = match captures.name("pre_name") {
            Some(kind) => Some(PreRelease {
                kind: kind
                    .as_str()
                    .parse()
                    .map_err(|err: String| VersionParseError::new(input, err))?,
                number: number("pre")?.unwrap_or_default(),
            }),
            None => None,
        };
        let post = if captures.name("post_field").is_some() {
            Some(
                number("post_new")?
                    .or(number("post_old")?)
                    .unwrap_or_default(),
            )
        } else {
            None
        };
        let dev = if captures.name("dev_field").is_some() {
            Some(number("dev")?.unwrap_or_default())
        } else {
            None
        };
        let local = captures
            .name("local")
            .map(|local| {
                local
                    .as_str()
                    .split(['-', '_', '.'])
                    .map(LocalSegment::parse)
                    .collect()
            })
            .unwrap_or_default();
        let release = captures
            .name("release")
            .ok_or_else(|| VersionParseError::new(input, "no release segment"))?
            .as_str()
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|err| VersionParseError::new(input, format!("`{segment}` {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let version = Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        };

        let star = captures.name("star").is_some();
        if star && (version.any_prerelease() || version.is_post() || version.is_local()) {
            return Err(VersionParseError::new(
                input,
                "a trailing `.*` can only follow a release segment",
            ));
        }

        Ok((version, star))
    }

    /// Orders the suffixes of versions with equal epoch and release:
    /// `.devN < aN < bN < rcN < (final) < .postN`, with a dev suffix sorting just below the
    /// same version without it, and local labels last.
    fn suffix_key(&self) -> (u8, u64, Option<u64>, u64, &[LocalSegment]) {
        let dev = self.dev.unwrap_or(u64::MAX);
        match (self.pre, self.post, self.dev) {
            (None, None, Some(dev)) => (0, 0, None, dev, &self.local),
            (Some(pre), post, _) => {
                let rank = match pre.kind {
                    PreReleaseKind::Alpha => 1,
                    PreReleaseKind::Beta => 2,
                    PreReleaseKind::Rc => 3,
                };
                (rank, pre.number, post, dev, &self.local)
            }
            (None, None, None) => (4, 0, None, 0, &self.local),
            (None, Some(post), _) => (5, 0, Some(post), dev, &self.local),
        }
    }
}

/// Compare two release segments, padding the shorter one with zeros.
pub(crate) fn compare_release(this: &[u64], other: &[u64]) -> Ordering {
    let len = this.len().max(other.len());
    let this = this.iter().chain(iter::repeat(&0)).take(len);
    let other = other.iter().chain(iter::repeat(&0)).take(len);
    this.cmp(other)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    /// Trailing zeros are skipped to agree with the zero-padding `Eq`.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        let significant = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |index| index + 1);
        self.release[..significant].hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| self.suffix_key().cmp(&other.suffix_key()))
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let (parsed, star) = Self::from_str_star(version)?;
        if star {
            return Err(VersionParseError::new(
                version,
                "a `.*` suffix is only allowed in `==` and `!=` specifiers",
            ));
        }
        Ok(parsed)
    }
}

/// Renders the normalized form, e.g. `1.0-RC.1` as `1.0rc1`.
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let mut segments = self.release.iter();
        if let Some(first) = segments.next() {
            write!(f, "{first}")?;
        }
        for segment in segments {
            write!(f, ".{segment}")?;
        }
        if let Some(pre) = self.pre {
            write!(f, "{}{}", pre.kind, pre.number)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        let mut local = self.local.iter();
        if let Some(first) = local.next() {
            write!(f, "+{first}")?;
            for segment in local {
                write!(f, ".{segment}")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A string that isn't a valid PEP 440 version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Version `{version}` is invalid: {reason}")]
pub struct VersionParseError {
    version: String,
    reason: String,
}

impl VersionParseError {
    fn new(version: &str, reason: impl Into<String>) -> Self {
        Self {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::str::FromStr;

    use super::*;

    fn hash(version: &Version) -> u64 {
        let mut hasher = DefaultHasher::new();
        version.hash(&mut hasher);
        hasher.finish()
    }

    /// <https://github.com/pypa/packaging/blob/237ff3aa348486cf835a980592af3a59fccd6101/tests/test_version.py#L24-L81>
    #[test]
    fn ordering() {
        let versions = [
            "1.0.dev456",
            "1.0a1",
            "1.0a2.dev456",
            "1.0a12.dev456",
            "1.0a12",
            "1.0b1.dev456",
            "1.0b2",
            "1.0b2.post345.dev456",
            "1.0b2.post345",
            "1.0c1.dev456",
            "1.0c1",
            "1.0rc2",
            "1.0c3",
            "1.0",
            "1.0.post456.dev34",
            "1.0.post456",
            "1.1.dev1",
            "1.2+abc",
            "1.2+abc123",
            "1.2+123456",
            "1!1.0.dev456",
            "1!1.0",
        ];
        let parsed: Vec<Version> = versions
            .iter()
            .map(|version| Version::from_str(version).unwrap())
            .collect();
        for window in parsed.windows(2) {
            assert!(window[0] < window[1], "{} < {}", window[0], window[1]);
        }
    }

    #[test]
    fn zero_padding() {
        let short = Version::from_str("1.2").unwrap();
        let long = Version::from_str("1.2.0.0").unwrap();
        assert_eq!(short, long);
        assert_eq!(hash(&short), hash(&long));
        assert_eq!(long.to_string(), "1.2.0.0");

        let zero = Version::from_str("0").unwrap();
        assert_eq!(zero, Version::from_str("0.0").unwrap());
        assert_eq!(hash(&zero), hash(&Version::from_str("0.0").unwrap()));
    }

    #[test]
    fn normalized_display() {
        let cases = [
            ("1.0-RC.1", "1.0rc1"),
            ("v2.0", "2.0"),
            ("1.0.alpha", "1.0a0"),
            ("1.0-1", "1.0.post1"),
            ("1.0.rev2", "1.0.post2"),
            ("1.0-dev", "1.0.dev0"),
            ("1!2.0+Ubuntu-1", "1!2.0+ubuntu.1"),
        ];
        for (input, expected) in cases {
            assert_eq!(Version::from_str(input).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn prerelease_detection() {
        assert!(Version::from_str("2.0b1").unwrap().any_prerelease());
        assert!(Version::from_str("2.0.dev3").unwrap().any_prerelease());
        assert!(!Version::from_str("2.0.post1").unwrap().any_prerelease());
    }

    #[test]
    fn star() {
        let (version, star) = Version::from_str_star("1.2.*").unwrap();
        assert!(star);
        assert_eq!(version.release, vec![1, 2]);
        assert!(Version::from_str("1.2.*").is_err());
        assert!(Version::from_str_star("1.0a1.*").is_err());
    }

    #[test]
    fn failures() {
        for version in ["french toast", "1.0+", "1.0.", "", "1.0+a+b", "==1.0"] {
            assert!(Version::from_str(version).is_err(), "{version:?}");
        }
        assert_eq!(
            Version::from_str("french toast").unwrap_err().to_string(),
            "Version `french toast` is invalid: doesn't match PEP 440 rules"
        );
    }
}
