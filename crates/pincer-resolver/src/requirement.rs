use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use pincer_normalize::{ExtraName, PackageName};
use pincer_pep440::{Version, VersionSpecifier, VersionSpecifiers};
use pincer_pep508::{MarkerTree, Requirement, VerbatimUrl, VersionOrUrl};
use pincer_warnings::warn_user;

/// Where a requirement came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComesFrom {
    /// A free-text source, such as `-r requirements.in (line 3)`.
    Label(String),
    /// The pinned requirement that declared this one as a dependency.
    Parent(Arc<InstallRequirement>),
}

impl Display for ComesFrom {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Label(label) => f.write_str(label),
            Self::Parent(parent) => f.write_str(&parent.from_path()),
        }
    }
}

/// A requirement as seen by the resolver: a parsed dependency specification plus the
/// bookkeeping needed to combine it with other requirements on the same package and to explain
/// where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstallRequirement {
    pub name: PackageName,
    pub extras: BTreeSet<ExtraName>,
    pub specifier: VersionSpecifiers,
    pub marker: Option<MarkerTree>,
    /// Install from a local source; the version is whatever the source declares.
    pub editable: bool,
    /// A direct reference that replaces the index lookup.
    pub link: Option<VerbatimUrl>,
    pub comes_from: Option<ComesFrom>,
    /// Restricts the versions of a same-named requirement without being installed itself.
    pub constraint: bool,
    /// The requirements that were combined into this one, or empty if it was never combined.
    pub source_ireqs: Vec<Arc<InstallRequirement>>,
}

impl InstallRequirement {
    pub fn from_requirement(requirement: Requirement, comes_from: Option<ComesFrom>) -> Self {
        let (specifier, link) = match requirement.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifier)) => (specifier, None),
            Some(VersionOrUrl::Url(url)) => (VersionSpecifiers::empty(), Some(url)),
            None => (VersionSpecifiers::empty(), None),
        };
        Self {
            name: requirement.name,
            extras: requirement.extras.into_iter().collect(),
            specifier,
            marker: requirement.marker,
            editable: false,
            link,
            comes_from,
            constraint: false,
            source_ireqs: Vec::new(),
        }
    }

    /// An editable install of the project at `link`.
    pub fn editable(
        name: PackageName,
        link: VerbatimUrl,
        extras: impl IntoIterator<Item = ExtraName>,
        comes_from: Option<ComesFrom>,
    ) -> Self {
        Self {
            name,
            extras: extras.into_iter().collect(),
            specifier: VersionSpecifiers::empty(),
            marker: None,
            editable: true,
            link: Some(link),
            comes_from,
            constraint: false,
            source_ireqs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_constraint(self, constraint: bool) -> Self {
        Self { constraint, ..self }
    }

    /// A copy of this requirement pinned to `version`, keeping its extras and provenance.
    #[must_use]
    pub fn pin(&self, version: Version) -> Self {
        Self {
            specifier: VersionSpecifiers::from(VersionSpecifier::equals_version(version)),
            ..self.clone()
        }
    }

    /// Whether the requirement names exactly one version with `==` or `===`.
    pub fn is_pinned(&self) -> bool {
        !self.editable && self.pinned_version().is_some()
    }

    pub fn pinned_version(&self) -> Option<&Version> {
        self.specifier.pinned_version()
    }

    /// Whether the requirement is resolved from a local path or URL rather than an index.
    pub fn is_direct(&self) -> bool {
        self.editable || self.link.is_some()
    }

    /// The requirements this one was combined from, or the requirement itself.
    pub fn sources(&self) -> Vec<&Self> {
        if self.source_ireqs.is_empty() {
            vec![self]
        } else {
            self.source_ireqs.iter().map(AsRef::as_ref).collect()
        }
    }

    /// The requirement without provenance, e.g. `flask[async]>=2`, `-e file:///src/app` or
    /// `app @ file:///src/app`.
    pub fn format_requirement(&self) -> String {
        let extras = if self.extras.is_empty() {
            String::new()
        } else {
            format!("[{}]", self.extras.iter().map(ToString::to_string).collect::<Vec<_>>().join(","))
        };
        match &self.link {
            Some(link) if self.editable => format!("-e {link}"),
            Some(link) => format!("{}{extras} @ {link}", self.name),
            None => format!("{}{extras}{}", self.name, self.specifier),
        }
    }

    /// The version constraint, or `<any>` when there is none.
    pub fn format_specifier(&self) -> String {
        if let Some(link) = &self.link {
            link.to_string()
        } else if self.specifier.is_empty() {
            "<any>".to_string()
        } else {
            self.specifier.to_string()
        }
    }

    /// The requirement followed by its chain of parents, e.g.
    /// `kombu<5,>=4->celery==4.0.2->-r requirements.in (line 2)`.
    pub fn from_path(&self) -> String {
        let mut path = self.format_requirement();
        if let Some(comes_from) = &self.comes_from {
            path.push_str("->");
            path.push_str(&comes_from.to_string());
        }
        path
    }

    /// Convert back to a dependency specification, without markers.
    pub fn to_requirement(&self) -> Requirement {
        let version_or_url = match &self.link {
            Some(link) => Some(VersionOrUrl::Url(link.clone())),
            None if self.specifier.is_empty() => None,
            None => Some(VersionOrUrl::VersionSpecifier(self.specifier.clone())),
        };
        Requirement {
            name: self.name.clone(),
            extras: self.extras.iter().cloned().collect(),
            version_or_url,
            marker: None,
        }
    }
}

impl Display for InstallRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_requirement())?;
        if let Some(comes_from) = &self.comes_from {
            write!(f, " (from {comes_from})")?;
        }
        Ok(())
    }
}

/// Parse constraint lines, skipping (with a warning) any line that isn't a valid requirement.
///
/// Blank lines and `#` comments are ignored. Every constraint is labelled with `source`.
pub fn parse_constraints<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    source: &str,
    working_dir: &Path,
) -> Vec<InstallRequirement> {
    let mut constraints = Vec::new();
    for (index, line) in lines.into_iter().enumerate() {
        let line = line.split_once(" #").map_or(line, |(line, _)| line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Requirement::parse(line, working_dir) {
            Ok(requirement) => {
                let comes_from = ComesFrom::Label(format!("-c {source} (line {})", index + 1));
                constraints.push(
                    InstallRequirement::from_requirement(requirement, Some(comes_from))
                        .with_constraint(true),
                );
            }
            Err(err) => {
                warn_user!(
                    "Skipping invalid constraint on line {} of {source}: {}",
                    index + 1,
                    err.to_string().lines().next().unwrap_or_default()
                );
            }
        }
    }
    constraints
}
