use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use pincer_normalize::PackageName;

use crate::{DependencyCache, InstallRequirement};

/// The outcome of a successful resolution: the pinned requirements, sorted by name, and the
/// unsafe packages that were set aside.
#[derive(Debug, Clone)]
pub struct Resolution {
    requirements: Vec<InstallRequirement>,
    unsafe_requirements: Vec<InstallRequirement>,
    rounds: usize,
}

impl Resolution {
    pub(crate) fn new(
        mut requirements: Vec<InstallRequirement>,
        mut unsafe_requirements: Vec<InstallRequirement>,
        rounds: usize,
    ) -> Self {
        requirements.sort_by(|a, b| a.name.cmp(&b.name));
        unsafe_requirements.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            requirements,
            unsafe_requirements,
            rounds,
        }
    }

    /// The pinned requirements to install.
    pub fn requirements(&self) -> &[InstallRequirement] {
        &self.requirements
    }

    /// Pinned packaging tools that were resolved but are not meant to be installed from a
    /// requirements file.
    pub fn unsafe_requirements(&self) -> &[InstallRequirement] {
        &self.unsafe_requirements
    }

    /// The number of rounds it took to reach the fixpoint.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Every pin, safe or not.
    pub fn iter(&self) -> impl Iterator<Item = &InstallRequirement> {
        self.requirements.iter().chain(&self.unsafe_requirements)
    }

    pub fn get(&self, name: &PackageName) -> Option<&InstallRequirement> {
        self.iter().find(|ireq| &ireq.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.unsafe_requirements.is_empty()
    }

    /// Map each pinned package to the names of the pins that require it, from the dependency
    /// lists cached during resolution. Editable and direct-URL pins are not cached, so the
    /// packages they require are missing from the map.
    pub fn reverse_dependencies(
        &self,
        cache: &DependencyCache,
    ) -> BTreeMap<PackageName, BTreeSet<PackageName>> {
        cache.reverse_dependencies(self.iter().filter(|ireq| !ireq.is_direct()))
    }

    /// The provenance chains of a pinned package, e.g.
    /// `["celery==4.0.2->-r requirements.in (line 2)"]`. Requirements that were requested
    /// directly contribute no chain.
    pub fn provenance(&self, name: &PackageName) -> Vec<String> {
        let Some(ireq) = self.get(name) else {
            return Vec::new();
        };
        ireq.sources()
            .into_iter()
            .filter_map(|source| source.comes_from.as_ref())
            .map(ToString::to_string)
            .unique()
            .collect()
    }
}

impl Display for Resolution {
    /// One pin per line, unsafe packages last.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for ireq in self.iter() {
            writeln!(f, "{}", ireq.format_requirement())?;
        }
        Ok(())
    }
}
