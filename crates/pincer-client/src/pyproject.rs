//! Static metadata of local projects, read from `pyproject.toml` without building them.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use pincer_normalize::{ExtraName, PackageName};

use crate::ClientError;

#[derive(Debug, Deserialize)]
struct PyProjectToml {
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Project {
    name: Option<PackageName>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<ExtraName, Vec<String>>,
    #[serde(default)]
    dynamic: Vec<String>,
}

/// The `[project]` table of a local project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMetadata {
    pub name: PackageName,
    pub dependencies: Vec<String>,
    pub optional_dependencies: BTreeMap<ExtraName, Vec<String>>,
}

impl Project {
    fn load(directory: &Path) -> Result<(Self, PathBuf), ClientError> {
        let path = directory.join("pyproject.toml");
        let content = fs_err::read_to_string(&path).map_err(|err| ClientError::Io {
            path: path.clone(),
            err,
        })?;
        let project = Self::parse(&content, &path)?;
        Ok((project, path))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ClientError> {
        let pyproject: PyProjectToml =
            toml::from_str(content).map_err(|err| ClientError::PyprojectToml {
                path: path.to_path_buf(),
                err: Box::new(err),
            })?;
        pyproject
            .project
            .ok_or_else(|| ClientError::MissingProjectName {
                path: path.to_path_buf(),
            })
    }
}

impl StaticMetadata {
    /// Read `<directory>/pyproject.toml`.
    ///
    /// Projects that list `dependencies` or `optional-dependencies` under `dynamic` can't be read
    /// statically.
    pub fn read(directory: &Path) -> Result<Self, ClientError> {
        let (project, path) = Project::load(directory)?;
        Self::from_project(project, path)
    }

    fn from_project(project: Project, path: PathBuf) -> Result<Self, ClientError> {
        let Some(name) = project.name else {
            return Err(ClientError::MissingProjectName { path });
        };
        if project
            .dynamic
            .iter()
            .any(|field| field == "dependencies" || field == "optional-dependencies")
        {
            return Err(ClientError::DynamicDependencies { path });
        }
        Ok(Self {
            name,
            dependencies: project.dependencies,
            optional_dependencies: project.optional_dependencies,
        })
    }

    /// The dependency specifications for an install with `extras`.
    pub fn requires<'a>(&'a self, extras: impl IntoIterator<Item = &'a ExtraName>) -> Vec<&'a str> {
        let mut requires: Vec<&str> = self.dependencies.iter().map(String::as_str).collect();
        for extra in extras {
            if let Some(optional) = self.optional_dependencies.get(extra) {
                requires.extend(optional.iter().map(String::as_str));
            }
        }
        requires
    }
}

/// Read only the project name of a local directory, for editables without `#egg=`. The name
/// is known even when the dependencies are dynamic.
pub fn project_name(directory: &Path) -> Result<PackageName, ClientError> {
    let (project, path) = Project::load(directory)?;
    project
        .name
        .ok_or(ClientError::MissingProjectName { path })
}

/// Whether `directory` holds a project that can be read statically.
pub fn is_project_directory(directory: &Path) -> io::Result<bool> {
    match fs_err::metadata(directory.join("pyproject.toml")) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use indoc::indoc;

    use super::*;

    fn parse(content: &str) -> Result<StaticMetadata, ClientError> {
        let path = Path::new("pyproject.toml");
        StaticMetadata::from_project(Project::parse(content, path)?, path.to_path_buf())
    }

    #[test]
    fn static_dependencies() {
        let metadata = parse(
            indoc! {r#"
                [project]
                name = "App"
                version = "0.1.0"
                dependencies = ["flask", "six>=1.9 ; python_version >= '3'"]

                [project.optional-dependencies]
                Dev = ["pytest"]
            "#},
        )
        .unwrap();
        assert_eq!(metadata.name.as_str(), "app");

        let dev = ExtraName::from_str("dev").unwrap();
        assert_eq!(metadata.requires([]), ["flask", "six>=1.9 ; python_version >= '3'"]);
        assert_eq!(
            metadata.requires([&dev]),
            ["flask", "six>=1.9 ; python_version >= '3'", "pytest"]
        );
    }

    #[test]
    fn dynamic_dependencies() {
        let err = parse(
            indoc! {r#"
                [project]
                name = "app"
                dynamic = ["version", "dependencies"]
            "#},
        )
        .unwrap_err();
        assert!(matches!(err, ClientError::DynamicDependencies { .. }));
    }

    #[test]
    fn missing_project_table() {
        let err = parse("[tool.black]\n").unwrap_err();
        assert!(matches!(err, ClientError::MissingProjectName { .. }));
    }

    #[test]
    fn name_of_dynamic_project() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"my_app\"\ndynamic = [\"dependencies\"]\n",
        )
        .unwrap();
        assert_eq!(project_name(dir.path()).unwrap().as_str(), "my-app");
        assert!(is_project_directory(dir.path()).unwrap());
        assert!(!is_project_directory(&dir.path().join("missing")).unwrap());
    }
}
