use std::fmt::{Display, Formatter};

/// The operating system wheels are selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Macos,
    Windows,
    Other,
}

/// The processor architecture wheels are selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    X86,
    Aarch64,
    Other,
}

impl Arch {
    /// The names this architecture goes by in platform tags.
    fn tag_names(self) -> &'static [&'static str] {
        match self {
            Self::X86_64 => &["x86_64", "amd64", "intel", "universal", "universal2"],
            Self::X86 => &["i686", "i386", "win32"],
            Self::Aarch64 => &["aarch64", "arm64", "universal2"],
            Self::Other => &[],
        }
    }
}

impl Display for Arch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X86_64 => f.write_str("x86_64"),
            Self::X86 => f.write_str("x86"),
            Self::Aarch64 => f.write_str("aarch64"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// Accepts the platform tags of wheels built for one operating system and architecture.
///
/// This doesn't rank tags or check glibc and macOS versions: a wheel is acceptable when some
/// platform tag names the same operating system family and architecture, or is `any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    os: Os,
    arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this process runs on.
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::Macos,
            "windows" => Os::Windows,
            _ => Os::Other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "x86" => Arch::X86,
            "aarch64" => Arch::Aarch64,
            _ => Arch::Other,
        };
        Self { os, arch }
    }

    /// Whether a single platform tag, like `manylinux_2_17_x86_64`, runs here.
    pub fn is_compatible_tag(&self, tag: &str) -> bool {
        if tag == "any" {
            return true;
        }
        let family = match self.os {
            Os::Linux => ["manylinux", "musllinux", "linux"]
                .iter()
                .any(|prefix| tag.starts_with(prefix)),
            Os::Macos => tag.starts_with("macosx_"),
            Os::Windows => tag.starts_with("win"),
            Os::Other => false,
        };
        family
            && self
                .arch
                .tag_names()
                .iter()
                .any(|arch| tag == *arch || tag.ends_with(&format!("_{arch}")))
    }

    /// Whether a distribution file can be installed here. Source distributions always can.
    pub fn is_compatible_filename(&self, filename: &str) -> bool {
        match WheelTags::from_filename(filename) {
            Some(tags) => tags
                .platform
                .split('.')
                .any(|tag| self.is_compatible_tag(tag)),
            None => true,
        }
    }
}

/// The compatibility tags of a wheel filename,
/// `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelTags<'a> {
    pub python: &'a str,
    pub abi: &'a str,
    /// Possibly compressed, e.g. `manylinux1_x86_64.manylinux2010_x86_64`.
    pub platform: &'a str,
}

impl<'a> WheelTags<'a> {
    /// Returns `None` for anything that isn't a wheel filename.
    pub fn from_filename(filename: &'a str) -> Option<Self> {
        let stem = filename.strip_suffix(".whl")?;
        let mut parts = stem.rsplitn(4, '-');
        let platform = parts.next()?;
        let abi = parts.next()?;
        let python = parts.next()?;
        // The name and version (and build tag) remain.
        parts.next()?;
        Some(Self {
            python,
            abi,
            platform,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn wheel_tags() {
        assert_eq!(
            WheelTags::from_filename("numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl"),
            Some(WheelTags {
                python: "cp312",
                abi: "cp312",
                platform: "manylinux_2_17_x86_64.manylinux2014_x86_64",
            })
        );
        assert_eq!(
            WheelTags::from_filename("six-1.9.0-1-py2.py3-none-any.whl").map(|tags| tags.python),
            Some("py2.py3")
        );
        assert_eq!(WheelTags::from_filename("six-1.9.0.tar.gz"), None);
        assert_eq!(WheelTags::from_filename("broken.whl"), None);
    }

    #[test_case(Os::Linux, Arch::X86_64, "numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl", true)]
    #[test_case(Os::Linux, Arch::Aarch64, "numpy-1.26.4-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl", false)]
    #[test_case(Os::Linux, Arch::Aarch64, "numpy-1.26.4-cp312-cp312-musllinux_1_1_aarch64.whl", true)]
    #[test_case(Os::Macos, Arch::Aarch64, "numpy-1.26.4-cp312-cp312-macosx_11_0_arm64.whl", true)]
    #[test_case(Os::Macos, Arch::X86_64, "numpy-1.26.4-cp312-cp312-macosx_10_9_universal2.whl", true)]
    #[test_case(Os::Windows, Arch::X86_64, "numpy-1.26.4-cp312-cp312-win_amd64.whl", true)]
    #[test_case(Os::Windows, Arch::X86, "numpy-1.26.4-cp312-cp312-win32.whl", true)]
    #[test_case(Os::Linux, Arch::X86_64, "numpy-1.26.4-cp312-cp312-win_amd64.whl", false)]
    #[test_case(Os::Other, Arch::Other, "six-1.9.0-py2.py3-none-any.whl", true)]
    #[test_case(Os::Windows, Arch::X86_64, "numpy-1.26.4.tar.gz", true)]
    fn compatibility(os: Os, arch: Arch, filename: &str, expected: bool) {
        assert_eq!(
            Platform::new(os, arch).is_compatible_filename(filename),
            expected
        );
    }
}
