//! Render a resolution in the `requirements.txt` format.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use pincer_normalize::PackageName;
use pincer_resolver::{ComesFrom, InstallRequirement, Resolution};

const UNSAFE_HEADER: &str =
    "# The following packages are considered to be unsafe in a requirements file:";

/// Writes pins sorted by name, optionally with `# via` annotations and `--hash` options, and
/// an unsafe section at the end.
#[derive(Debug)]
pub(crate) struct RequirementsTxtWriter<'a> {
    requirements: Vec<&'a InstallRequirement>,
    unsafe_requirements: Vec<&'a InstallRequirement>,
    /// Commented out unless unsafe packages were requested.
    allow_unsafe: bool,
    header: Option<String>,
    reverse_dependencies: Option<&'a BTreeMap<PackageName, BTreeSet<PackageName>>>,
    hashes: Option<&'a BTreeMap<PackageName, BTreeSet<String>>>,
}

impl<'a> RequirementsTxtWriter<'a> {
    pub(crate) fn new(
        requirements: &'a [InstallRequirement],
        unsafe_requirements: &'a [InstallRequirement],
    ) -> Self {
        Self {
            requirements: requirements.iter().collect(),
            unsafe_requirements: unsafe_requirements.iter().collect(),
            allow_unsafe: false,
            header: None,
            reverse_dependencies: None,
            hashes: None,
        }
    }

    /// A writer for `resolution`.
    ///
    /// When unsafe packages were allowed they are part of the pinned requirements; they are
    /// moved to the unsafe section, uncommented.
    pub(crate) fn from_resolution(
        resolution: &'a Resolution,
        unsafe_packages: &BTreeSet<PackageName>,
        allow_unsafe: bool,
    ) -> Self {
        let mut writer = Self::new(resolution.requirements(), resolution.unsafe_requirements());
        if allow_unsafe {
            let (unsafe_requirements, requirements): (Vec<_>, Vec<_>) = writer
                .requirements
                .into_iter()
                .partition(|ireq| unsafe_packages.contains(&ireq.name));
            writer.requirements = requirements;
            writer.unsafe_requirements = unsafe_requirements;
        }
        writer.allow_unsafe = allow_unsafe;
        writer
    }

    #[must_use]
    pub(crate) fn with_header(mut self, header: Option<String>) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub(crate) fn with_annotations(
        mut self,
        reverse_dependencies: Option<&'a BTreeMap<PackageName, BTreeSet<PackageName>>>,
    ) -> Self {
        self.reverse_dependencies = reverse_dependencies;
        self
    }

    #[must_use]
    pub(crate) fn with_hashes(
        mut self,
        hashes: Option<&'a BTreeMap<PackageName, BTreeSet<String>>>,
    ) -> Self {
        self.hashes = hashes;
        self
    }

    /// The packages and files that pulled in `ireq`: parents by name first, then the
    /// requirements files, without their line numbers.
    fn required_by(&self, ireq: &InstallRequirement) -> Vec<String> {
        let mut parents: BTreeSet<String> = self
            .reverse_dependencies
            .and_then(|reverse_dependencies| reverse_dependencies.get(&ireq.name))
            .into_iter()
            .flatten()
            .map(ToString::to_string)
            .collect();
        let mut files = Vec::new();
        for source in ireq.sources() {
            match &source.comes_from {
                Some(ComesFrom::Parent(parent)) => {
                    parents.insert(parent.name.to_string());
                }
                Some(ComesFrom::Label(label)) => {
                    let label = label
                        .rsplit_once(" (line ")
                        .map_or(label.as_str(), |(file, _)| file);
                    files.push(label.to_string());
                }
                None => {}
            }
        }
        parents
            .into_iter()
            .chain(files.into_iter().unique())
            .collect()
    }

    fn write_pin(&self, f: &mut Formatter<'_>, ireq: &InstallRequirement) -> std::fmt::Result {
        let hashes = self
            .hashes
            .and_then(|hashes| hashes.get(&ireq.name))
            .filter(|hashes| !hashes.is_empty() && !ireq.is_direct());
        f.write_str(&ireq.format_requirement())?;
        for hash in hashes.into_iter().flatten() {
            f.write_str(" \\\n")?;
            write!(f, "    --hash={hash}")?;
        }
        f.write_str("\n")?;

        if self.reverse_dependencies.is_some() {
            match self.required_by(ireq).as_slice() {
                [] => {}
                [single] => writeln!(f, "    # via {single}")?,
                many => {
                    writeln!(f, "    # via")?;
                    for via in many {
                        writeln!(f, "    #   {via}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Display for RequirementsTxtWriter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(header) = &self.header {
            for line in header.lines() {
                writeln!(f, "# {line}")?;
            }
            writeln!(f, "#")?;
        }

        for ireq in &self.requirements {
            self.write_pin(f, ireq)?;
        }

        if !self.unsafe_requirements.is_empty() {
            if !self.requirements.is_empty() {
                writeln!(f)?;
            }
            writeln!(f, "{UNSAFE_HEADER}")?;
            for ireq in &self.unsafe_requirements {
                if self.allow_unsafe {
                    self.write_pin(f, ireq)?;
                } else {
                    writeln!(f, "# {}", ireq.name)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use insta::assert_snapshot;

    use pincer_pep508::Requirement;

    use super::*;

    fn pin(requirement: &str, comes_from: Option<ComesFrom>) -> InstallRequirement {
        InstallRequirement::from_requirement(Requirement::from_str(requirement).unwrap(), comes_from)
    }

    fn label(label: &str) -> Option<ComesFrom> {
        Some(ComesFrom::Label(label.to_string()))
    }

    fn name(name: &str) -> PackageName {
        PackageName::from_str(name).unwrap()
    }

    fn pins() -> Vec<InstallRequirement> {
        let celery = pin("celery==4.0.2", label("-r requirements.in (line 1)"));
        let parent = Some(ComesFrom::Parent(Arc::new(celery.clone())));
        vec![
            celery,
            pin("kombu==4.0.2", parent.clone()),
            pin("vine==1.1.3", parent),
        ]
    }

    #[test]
    fn plain() {
        let requirements = pins();
        let writer = RequirementsTxtWriter::new(&requirements, &[]);
        assert_snapshot!(writer.to_string(), @r"
        celery==4.0.2
        kombu==4.0.2
        vine==1.1.3
        ");
    }

    #[test]
    fn annotated() {
        let requirements = pins();
        let reverse_dependencies = BTreeMap::from([
            (name("kombu"), BTreeSet::from([name("celery")])),
            (name("vine"), BTreeSet::from([name("amqp"), name("kombu")])),
        ]);
        let writer = RequirementsTxtWriter::new(&requirements, &[])
            .with_header(Some("Generated by a test".to_string()))
            .with_annotations(Some(&reverse_dependencies));
        assert_snapshot!(writer.to_string(), @r"
        # Generated by a test
        #
        celery==4.0.2
            # via -r requirements.in
        kombu==4.0.2
            # via celery
        vine==1.1.3
            # via
            #   amqp
            #   celery
            #   kombu
        ");
    }

    #[test]
    fn hashes() {
        let requirements = pins();
        let hashes = BTreeMap::from([
            (
                name("celery"),
                BTreeSet::from(["sha256:aaaa".to_string(), "sha256:bbbb".to_string()]),
            ),
            (name("kombu"), BTreeSet::new()),
        ]);
        let writer = RequirementsTxtWriter::new(&requirements[..2], &[]).with_hashes(Some(&hashes));
        assert_snapshot!(writer.to_string(), @r"
        celery==4.0.2 \
            --hash=sha256:aaaa \
            --hash=sha256:bbbb
        kombu==4.0.2
        ");
    }

    #[test]
    fn unsafe_section() {
        let requirements = vec![pin("flask==0.10.1", label("-r requirements.in (line 1)"))];
        let unsafe_requirements = vec![pin("setuptools==35.0.0", label("-r requirements.in (line 2)"))];
        let reverse_dependencies = BTreeMap::new();

        let writer = RequirementsTxtWriter::new(&requirements, &unsafe_requirements)
            .with_annotations(Some(&reverse_dependencies));
        assert_snapshot!(writer.to_string(), @r"
        flask==0.10.1
            # via -r requirements.in

        # The following packages are considered to be unsafe in a requirements file:
        # setuptools
        ");

        let mut writer = RequirementsTxtWriter::new(&requirements, &unsafe_requirements)
            .with_annotations(Some(&reverse_dependencies));
        writer.allow_unsafe = true;
        assert_snapshot!(writer.to_string(), @r"
        flask==0.10.1
            # via -r requirements.in

        # The following packages are considered to be unsafe in a requirements file:
        setuptools==35.0.0
            # via -r requirements.in
        ");
    }

    #[test]
    fn combined_sources() {
        let mut flask = pin("flask==0.10.1", None);
        flask.source_ireqs = vec![
            Arc::new(pin("flask", label("-r requirements.in (line 1)"))),
            Arc::new(pin("flask<1", label("-c constraints.txt (line 3)"))),
            Arc::new(pin("flask>0.9", label("-r requirements.in (line 7)"))),
        ];
        let requirements = vec![flask];
        let reverse_dependencies = BTreeMap::new();
        let writer = RequirementsTxtWriter::new(&requirements, &[])
            .with_annotations(Some(&reverse_dependencies));
        assert_snapshot!(writer.to_string(), @r"
        flask==0.10.1
            # via
            #   -r requirements.in
            #   -c constraints.txt
        ");
    }
}
