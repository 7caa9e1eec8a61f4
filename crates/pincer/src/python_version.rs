use std::fmt::{Display, Formatter};
use std::str::FromStr;

use pincer_pep440::Version;
use pincer_pep508::{MarkerEnvironment, StringVersion};

/// The `major.minor` version of the interpreter requirements are compiled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PythonVersion {
    major: u8,
    minor: u8,
}

impl Default for PythonVersion {
    fn default() -> Self {
        Self {
            major: 3,
            minor: 12,
        }
    }
}

impl FromStr for PythonVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((major, minor)) = s.split_once('.') else {
            return Err(format!("Python version `{s}` must be of the form `major.minor`"));
        };
        let major = major
            .parse::<u8>()
            .map_err(|_| format!("Python version `{s}` has an invalid major version"))?;
        let minor = minor
            .parse::<u8>()
            .map_err(|_| format!("Python version `{s}` has an invalid minor version"))?;
        if major < 3 {
            return Err(format!("Python version `{s}` is not supported, use 3.x"));
        }
        Ok(Self { major, minor })
    }
}

impl Display for PythonVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl PythonVersion {
    pub(crate) fn major(&self) -> u8 {
        self.major
    }

    pub(crate) fn minor(&self) -> u8 {
        self.minor
    }

    /// The version as compared against `Requires-Python`, e.g. `3.12.0`.
    pub(crate) fn version(&self) -> Version {
        Version::new([u64::from(self.major), u64::from(self.minor), 0])
    }

    /// Return a [`MarkerEnvironment`] for a CPython interpreter of this version running on the
    /// host platform.
    pub(crate) fn markers(&self) -> MarkerEnvironment {
        let full = format!("{}.{}.0", self.major, self.minor);
        let string_version = |string: String| {
            let version = Version::new(
                string
                    .split('.')
                    .filter_map(|segment| segment.parse::<u64>().ok()),
            );
            StringVersion { string, version }
        };

        let (os_name, platform_system, sys_platform) = match std::env::consts::OS {
            "windows" => ("nt", "Windows", "win32"),
            "macos" => ("posix", "Darwin", "darwin"),
            "linux" => ("posix", "Linux", "linux"),
            other => ("posix", other, other),
        };
        let platform_machine = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", "x86_64") => "AMD64",
            ("windows", "aarch64") => "ARM64",
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        };

        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: string_version(full.clone()),
            os_name: os_name.to_string(),
            platform_machine: platform_machine.to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: String::new(),
            platform_system: platform_system.to_string(),
            platform_version: String::new(),
            python_full_version: string_version(full),
            python_version: string_version(self.to_string()),
            sys_platform: sys_platform.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn markers() {
        let python_version = PythonVersion::from_str("3.8").unwrap();
        let markers = python_version.markers();
        assert_eq!(markers.python_version.string, "3.8");
        assert_eq!(markers.python_full_version.string, "3.8.0");
        assert_eq!(markers.implementation_version.version, Version::new([3, 8]));
        assert_eq!(markers.implementation_name, "cpython");
        assert_eq!(python_version.version().to_string(), "3.8.0");
    }

    #[test_case("3.12", Some((3, 12)))]
    #[test_case("3.7", Some((3, 7)))]
    #[test_case("3", None)]
    #[test_case("3.x", None)]
    #[test_case("2.7", None)]
    #[test_case("3.12.1", None)]
    fn parse(input: &str, expected: Option<(u8, u8)>) {
        let parsed = PythonVersion::from_str(input)
            .ok()
            .map(|version| (version.major(), version.minor()));
        assert_eq!(parsed, expected);
    }
}
