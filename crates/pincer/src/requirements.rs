use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use url::Url;

use pincer_fs::Simplified;
use pincer_requirements_txt::{EditableRequirement, OriginKind, RequirementEntry, RequirementsTxt};
use pincer_resolver::{ComesFrom, InstallRequirement};

/// Everything read from the requirements and constraints files given on the command line.
#[derive(Debug, Default)]
pub(crate) struct RequirementsSpecification {
    /// The packages to pin, editables included.
    pub(crate) requirements: Vec<InstallRequirement>,
    /// Version restrictions that don't add packages of their own.
    pub(crate) constraints: Vec<InstallRequirement>,
    pub(crate) index_url: Option<Url>,
    pub(crate) extra_index_urls: Vec<Url>,
}

impl RequirementsSpecification {
    /// Read every source file and every constraint file, flattening their includes.
    pub(crate) fn from_sources(
        requirements: &[PathBuf],
        constraints: &[PathBuf],
        working_dir: &Path,
    ) -> Result<Self> {
        let mut spec = Self::default();
        for path in requirements {
            spec.extend(RequirementsTxt::parse(path, working_dir)?)?;
        }
        for path in constraints {
            spec.extend(RequirementsTxt::parse_constraints(path, working_dir)?)?;
        }
        Ok(spec)
    }

    fn extend(&mut self, requirements_txt: RequirementsTxt) -> Result<()> {
        for entry in requirements_txt.requirements {
            self.requirements.push(install_requirement(entry));
        }
        for entry in requirements_txt.constraints {
            self.constraints.push(install_requirement(entry).with_constraint(true));
        }
        for editable in requirements_txt.editables {
            let ireq = editable_requirement(editable)?;
            if ireq.constraint {
                self.constraints.push(ireq);
            } else {
                self.requirements.push(ireq);
            }
        }
        if let Some(index_url) = requirements_txt.index_url {
            self.index_url = Some(index_url);
        }
        for url in requirements_txt.extra_index_urls {
            if !self.extra_index_urls.contains(&url) {
                self.extra_index_urls.push(url);
            }
        }
        Ok(())
    }
}

fn install_requirement(entry: RequirementEntry) -> InstallRequirement {
    InstallRequirement::from_requirement(
        entry.requirement,
        Some(ComesFrom::Label(entry.origin.to_string())),
    )
}

/// Name an editable by its `#egg=` fragment or, failing that, by its `pyproject.toml`.
fn editable_requirement(editable: EditableRequirement) -> Result<InstallRequirement> {
    let Some(path) = editable.path() else {
        bail!(
            "Editable `{}` ({}) must be a local directory",
            editable.url,
            editable.origin
        );
    };
    let name = match editable.name {
        Some(name) => name,
        None => pincer_client::project_name(&path).with_context(|| {
            format!(
                "Couldn't determine the name of the editable project at `{}`",
                path.user_display()
            )
        })?,
    };
    let constraint = editable.origin.kind == OriginKind::Constraints;
    Ok(InstallRequirement::editable(
        name,
        editable.url,
        editable.extras,
        Some(ComesFrom::Label(editable.origin.to_string())),
    )
    .with_constraint(constraint))
}
