//! The subset of the [PyPI JSON API](https://docs.pypi.org/api/json/) the repository reads.

use std::collections::BTreeMap;

use serde::Deserialize;

/// `GET /pypi/<project>/json`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectJson {
    /// Every release, keyed by the version as the index spells it.
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<File>>,
}

/// `GET /pypi/<project>/<version>/json`
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseJson {
    pub info: ReleaseInfo,
    /// The files of this release.
    #[serde(default)]
    pub urls: Vec<File>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub version: String,
    /// `Requires-Dist` from the core metadata. PyPI sends `null` when the field is absent.
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
    #[serde(default)]
    pub requires_python: Option<String>,
}

/// A distribution file of a release.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub filename: String,
    #[serde(default)]
    pub packagetype: PackageType,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub digests: Digests,
    #[serde(default)]
    pub yanked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    BdistWheel,
    #[default]
    Sdist,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Digests {
    #[serde(default)]
    pub sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn project() {
        let project: ProjectJson = serde_json::from_str(indoc! {r#"
            {
              "info": { "name": "six", "version": "1.9.0" },
              "releases": {
                "1.9.0": [
                  {
                    "filename": "six-1.9.0-py2.py3-none-any.whl",
                    "packagetype": "bdist_wheel",
                    "requires_python": null,
                    "digests": { "md5": "...", "sha256": "e24052411fc4fbd1f672635537c3fc2330d9481b18c0317695b46259512c91d5" },
                    "yanked": false
                  },
                  {
                    "filename": "six-1.9.0.tar.gz",
                    "packagetype": "sdist",
                    "digests": { "sha256": "e24052411fc4fbd1f672635537c3fc2330d9481b18c0317695b46259512c91d5" }
                  }
                ],
                "1.0b1": [
                  { "filename": "six-1.0b1.zip", "packagetype": "bdist_dumb" }
                ]
              }
            }
        "#})
        .unwrap();

        let files = &project.releases["1.9.0"];
        assert_eq!(files[0].packagetype, PackageType::BdistWheel);
        assert_eq!(files[1].packagetype, PackageType::Sdist);
        assert!(files[0].digests.sha256.is_some());
        assert_eq!(project.releases["1.0b1"][0].packagetype, PackageType::Other);
    }

    #[test]
    fn release_without_requirements() {
        let release: ReleaseJson = serde_json::from_str(
            r#"{"info": {"name": "six", "version": "1.9.0", "requires_dist": null}, "urls": []}"#,
        )
        .unwrap();
        assert_eq!(release.info.requires_dist, None);
    }
}
