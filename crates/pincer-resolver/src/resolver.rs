//! The round-based resolver.
//!
//! Each round combines every known requirement by name, pins each combined requirement to its
//! best match and collects the dependencies of the pins. The dependencies found in one round
//! feed the next; resolution is done when a round finds exactly the dependencies the previous
//! round found.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use itertools::Itertools;
use tracing::{debug, instrument};

use pincer_normalize::{ExtraName, PackageName};
use pincer_pep508::{MarkerEnvironment, Requirement};

use crate::{
    BestMatch, ComesFrom, DependencyCache, IncompatibleRequirements, InstallRequirement,
    Repository, RepositoryError, RequirementSummary, Resolution, ResolveError, ResolverOptions,
    combine_install_requirements,
};

pub struct Resolver<'a, R: Repository> {
    /// The requirements and constraints given by the user.
    our_constraints: Vec<InstallRequirement>,
    /// The dependencies discovered in the last round.
    their_constraints: Vec<InstallRequirement>,
    repository: &'a R,
    cache: &'a DependencyCache,
    markers: &'a MarkerEnvironment,
    options: ResolverOptions,
}

impl<'a, R: Repository> Resolver<'a, R> {
    /// Initialize a resolver for the given requirements and constraints.
    ///
    /// Requirements whose markers don't match `markers` are dropped.
    pub fn new(
        constraints: impl IntoIterator<Item = InstallRequirement>,
        repository: &'a R,
        cache: &'a DependencyCache,
        markers: &'a MarkerEnvironment,
        options: ResolverOptions,
    ) -> Self {
        let our_constraints = constraints
            .into_iter()
            .filter(|ireq| {
                let applies = ireq
                    .marker
                    .as_ref()
                    .is_none_or(|marker| marker.evaluate(markers, &[]));
                if !applies {
                    debug!("Ignoring {ireq}: markers don't match the environment");
                }
                applies
            })
            .collect();
        Self {
            our_constraints,
            their_constraints: Vec::new(),
            repository,
            cache,
            markers,
            options,
        }
    }

    /// Find concrete package versions for every requirement, and their dependencies.
    #[instrument(skip_all, fields(requirements = self.our_constraints.len()))]
    pub async fn resolve(&mut self) -> Result<Resolution, ResolveError> {
        let mut round = 0;
        let best_matches = loop {
            round += 1;
            if round > self.options.max_rounds {
                return Err(ResolveError::RoundLimit {
                    rounds: self.options.max_rounds,
                });
            }

            debug!("{:^60}", format!("ROUND {round}"));
            let (has_changed, best_matches) = self.resolve_one_round().await?;
            debug!("{}", "-".repeat(60));
            debug!(
                "Result of round {round}: {}",
                if has_changed { "not stable" } else { "stable, done" }
            );

            if !has_changed {
                break best_matches;
            }
        };

        // Constraints restrict versions but aren't installed.
        let results: Vec<InstallRequirement> = best_matches
            .into_iter()
            .filter(|ireq| !ireq.constraint)
            .collect();

        if self.options.allow_unsafe {
            return Ok(Resolution::new(results, Vec::new(), round));
        }

        // Packages only unsafe packages depend on are set aside with them, unless they were
        // requested directly. None of the usual unsafe packages have dependencies, so one
        // level is enough.
        let reverse_dependencies = self
            .cache
            .reverse_dependencies(results.iter().filter(|ireq| !ireq.is_direct()));
        let (unsafe_requirements, requirements): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|ireq| {
                self.is_unsafe(&ireq.name)
                    || (!is_top_level(ireq)
                        && reverse_dependencies
                            .get(&ireq.name)
                            .is_some_and(|required_by| {
                                !required_by.is_empty()
                                    && required_by.iter().all(|name| self.is_unsafe(name))
                            }))
            });

        Ok(Resolution::new(requirements, unsafe_requirements, round))
    }

    /// Collect the hashes of every given pin, with the platform filter lifted so that the
    /// distributions of every platform are included.
    pub async fn resolve_hashes(
        &self,
        ireqs: &[InstallRequirement],
    ) -> Result<BTreeMap<PackageName, BTreeSet<String>>, ResolveError> {
        let _unrestricted = self.repository.platform_filter().unrestricted();
        stream::iter(ireqs)
            .map(|ireq| async move {
                let hashes = self
                    .repository
                    .get_hashes(ireq)
                    .await
                    .map_err(|err| ResolveError::Repository(ireq.format_requirement(), err))?;
                Ok::<_, ResolveError>((ireq.name.clone(), hashes))
            })
            .buffered(self.options.concurrency)
            .try_collect()
            .await
    }

    fn is_unsafe(&self, name: &PackageName) -> bool {
        self.options.unsafe_packages.contains(name)
    }

    /// Resolve one level of the dependency graph. Returns whether the set of discovered
    /// dependencies changed, and the best matches of this round.
    async fn resolve_one_round(
        &mut self,
    ) -> Result<(bool, Vec<InstallRequirement>), ResolveError> {
        let constraints = group_constraints(
            self.our_constraints
                .iter()
                .chain(&self.their_constraints)
                .cloned(),
        )?;

        debug!("Current constraints:");
        for ireq in &constraints {
            debug!("  {ireq}");
        }

        let this = &*self;

        debug!("Finding the best candidates:");
        let best_matches: Vec<InstallRequirement> = stream::iter(&constraints)
            .map(|ireq| this.get_best_match(ireq))
            .buffered(this.options.concurrency)
            .try_collect()
            .await?;

        debug!("Finding secondary dependencies:");
        let dependencies: Vec<Vec<InstallRequirement>> = stream::iter(&best_matches)
            .map(|ireq| this.iter_dependencies(ireq))
            .buffered(this.options.concurrency)
            .try_collect()
            .await?;
        let theirs = group_constraints(dependencies.into_iter().flatten())?;

        let current: BTreeSet<RequirementSummary> =
            theirs.iter().map(RequirementSummary::from).collect();
        let previous: BTreeSet<RequirementSummary> = self
            .their_constraints
            .iter()
            .map(RequirementSummary::from)
            .collect();
        let added: Vec<&RequirementSummary> = current.difference(&previous).collect();
        let removed: Vec<&RequirementSummary> = previous.difference(&current).collect();

        let has_changed = !added.is_empty() || !removed.is_empty();
        if !added.is_empty() {
            debug!("New dependencies found in this round:");
            for summary in &added {
                debug!("  adding {summary}");
            }
        }
        if !removed.is_empty() {
            debug!("Removed dependencies in this round:");
            for summary in &removed {
                debug!("  removing {summary}");
            }
        }

        self.their_constraints = theirs;
        Ok((has_changed, best_matches))
    }

    /// Pin a combined requirement.
    ///
    /// Editable, direct-URL and constraint-only requirements are their own best match.
    /// Everything else is looked up in the repository, including pins, so that a pin to a
    /// version the index doesn't have fails like any other unsatisfiable requirement.
    async fn get_best_match(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<InstallRequirement, ResolveError> {
        let mut best_match = if ireq.is_direct() || ireq.constraint {
            ireq.clone()
        } else {
            match self
                .repository
                .find_best_match(ireq, self.options.prereleases)
                .await
                .map_err(|err| ResolveError::Repository(ireq.format_requirement(), err))?
            {
                BestMatch::Found(best_match) => best_match,
                BestMatch::NotFound(err) => return Err(err.into()),
            }
        };

        debug!(
            "found candidate {} (constraint was {})",
            best_match.format_requirement(),
            ireq.format_specifier()
        );

        best_match.comes_from.clone_from(&ireq.comes_from);
        best_match.source_ireqs.clone_from(&ireq.source_ireqs);
        Ok(best_match)
    }

    /// The dependencies of a best match, each pointing back at it as its parent.
    ///
    /// Constraints are never expanded. The dependencies of pins are read through the
    /// dependency cache, after dropping the ones whose markers don't apply.
    async fn iter_dependencies(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<Vec<InstallRequirement>, ResolveError> {
        if ireq.constraint {
            return Ok(Vec::new());
        }

        let dependency_strings = if ireq.is_direct() {
            let dependencies = self.fetch_dependencies(ireq).await?;
            self.applicable_dependencies(ireq, dependencies)
        } else if !ireq.is_pinned() {
            return Err(ResolveError::Repository(
                ireq.format_requirement(),
                RepositoryError::NotPinned(ireq.to_string()),
            ));
        } else if let Some(dependency_strings) = self.cache.get(ireq) {
            dependency_strings
        } else {
            debug!(
                "{} not in cache, need to check index",
                ireq.format_requirement()
            );
            let dependencies = self.fetch_dependencies(ireq).await?;
            let dependency_strings = self.applicable_dependencies(ireq, dependencies);
            self.cache.insert(ireq, dependency_strings.clone())?;
            dependency_strings
        };

        Self::ireqs_of_dependencies(ireq, &dependency_strings)
    }

    async fn fetch_dependencies(
        &self,
        ireq: &InstallRequirement,
    ) -> Result<Vec<Requirement>, ResolveError> {
        self.repository
            .get_dependencies(ireq)
            .await
            .map_err(|err| ResolveError::Repository(ireq.format_requirement(), err))
    }

    /// Drop dependencies whose markers don't match the environment (with the extras of
    /// `ireq` active), and render the rest without markers, sorted and deduplicated.
    fn applicable_dependencies(
        &self,
        ireq: &InstallRequirement,
        dependencies: Vec<Requirement>,
    ) -> Vec<String> {
        let extras: Vec<ExtraName> = ireq.extras.iter().cloned().collect();
        dependencies
            .into_iter()
            .filter(|dependency| dependency.evaluate_markers(self.markers, &extras))
            .map(|dependency| {
                Requirement {
                    marker: None,
                    ..dependency
                }
                .to_string()
            })
            .sorted()
            .dedup()
            .collect()
    }

    fn ireqs_of_dependencies(
        ireq: &InstallRequirement,
        dependency_strings: &[String],
    ) -> Result<Vec<InstallRequirement>, ResolveError> {
        debug!(
            "{:25} requires {}",
            ireq.format_requirement(),
            if dependency_strings.is_empty() {
                "-".to_string()
            } else {
                dependency_strings
                    .iter()
                    .sorted_by_key(|dependency| dependency.to_lowercase())
                    .join(", ")
            }
        );

        let parent = Arc::new(ireq.clone());
        dependency_strings
            .iter()
            .map(|dependency| {
                let requirement = Requirement::from_str(dependency).map_err(|err| {
                    ResolveError::InvalidDependency {
                        parent: ireq.format_requirement(),
                        dependency: dependency.clone(),
                        err: Box::new(err),
                    }
                })?;
                Ok(InstallRequirement::from_requirement(
                    requirement,
                    Some(ComesFrom::Parent(Arc::clone(&parent))),
                )
                .with_constraint(ireq.constraint))
            })
            .collect()
    }
}

/// Whether any non-constraint source of `ireq` was given by the user rather than found as a
/// dependency.
fn is_top_level(ireq: &InstallRequirement) -> bool {
    ireq.sources().into_iter().any(|source| {
        !source.constraint && !matches!(source.comes_from, Some(ComesFrom::Parent(_)))
    })
}

/// Combine requirements by name, in name order. Within a name, editable requirements come
/// first so that their source is the one kept.
fn group_constraints(
    constraints: impl IntoIterator<Item = InstallRequirement>,
) -> Result<Vec<InstallRequirement>, IncompatibleRequirements> {
    let mut constraints: Vec<InstallRequirement> = constraints.into_iter().collect();
    constraints.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| b.editable.cmp(&a.editable))
    });

    let mut grouped = Vec::new();
    for (_, mut group) in &constraints.into_iter().chunk_by(|ireq| ireq.name.clone()) {
        let Some(first) = group.next() else {
            continue;
        };
        grouped.push(combine_install_requirements(first, group)?);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pincer_pep508::Requirement;

    use super::*;

    fn ireq(input: &str) -> InstallRequirement {
        InstallRequirement::from_requirement(Requirement::from_str(input).unwrap(), None)
    }

    #[test]
    fn grouping() {
        let grouped = group_constraints([
            ireq("Werkzeug>=0.7"),
            ireq("flask"),
            ireq("werkzeug<1"),
            ireq("app @ file:///src/app"),
        ])
        .unwrap();
        let rendered: Vec<String> = grouped.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["app @ file:///src/app", "flask", "werkzeug<1,>=0.7"]);
    }

    #[test]
    fn grouping_puts_editables_first() {
        let editable = InstallRequirement {
            editable: true,
            ..ireq("app @ file:///src/app")
        };
        let grouped = group_constraints([ireq("app>=1"), editable]).unwrap();
        assert!(grouped[0].editable);
        assert_eq!(grouped[0].format_requirement(), "-e file:///src/app");
    }
}
