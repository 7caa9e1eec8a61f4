use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use pincer_normalize::{ExtraName, PackageName};
use pincer_pep440::VersionSpecifier;

use crate::InstallRequirement;

/// The identity of a requirement for the purpose of deciding whether a round discovered
/// anything new: its name, its set of specifiers and its set of extras.
///
/// Provenance, markers and constraint status are not part of the identity. Specifiers compare
/// up to zero padding, so `foo==1.2` and `foo==1.2.0` are the same summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequirementSummary {
    pub name: PackageName,
    pub specifier: BTreeSet<VersionSpecifier>,
    pub extras: BTreeSet<ExtraName>,
}

impl From<&InstallRequirement> for RequirementSummary {
    fn from(ireq: &InstallRequirement) -> Self {
        Self {
            name: ireq.name.clone(),
            specifier: ireq.specifier.iter().cloned().collect(),
            extras: ireq.extras.clone(),
        }
    }
}

impl Display for RequirementSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<String> = self.extras.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        let specifier: Vec<String> = self.specifier.iter().map(ToString::to_string).collect();
        write!(f, "{}", specifier.join(","))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::str::FromStr;

    use pincer_pep508::Requirement;

    use super::*;

    fn summary(input: &str) -> RequirementSummary {
        let ireq =
            InstallRequirement::from_requirement(Requirement::from_str(input).unwrap(), None);
        RequirementSummary::from(&ireq)
    }

    fn hash(summary: &RequirementSummary) -> u64 {
        let mut hasher = DefaultHasher::new();
        summary.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn zero_padding() {
        let short = summary("X==1.2");
        let long = summary("x==1.2.0");
        assert_eq!(short, long);
        assert_eq!(hash(&short), hash(&long));
    }

    #[test]
    fn extras_and_specifier_order() {
        assert_eq!(summary("Pkg[B,a]>=1,<2"), summary("pkg[A,b]<2.0,>=1.0"));
        assert_ne!(summary("pkg[a]"), summary("pkg"));
        assert_ne!(summary("pkg>=1"), summary("pkg>1"));
    }

    #[test]
    fn provenance_is_ignored() {
        let plain = summary("six>=1.9");
        let constrained = InstallRequirement::from_requirement(
            Requirement::from_str("six>=1.9 ; python_version >= '3'").unwrap(),
            Some(crate::ComesFrom::Label("-r requirements.in (line 1)".to_string())),
        )
        .with_constraint(true);
        assert_eq!(plain, RequirementSummary::from(&constrained));
    }
}
