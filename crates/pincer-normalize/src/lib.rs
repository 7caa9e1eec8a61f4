use std::error::Error;
use std::fmt::{Display, Formatter};

pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

/// Lowercase the name and collapse every run of `-`, `_` and `.` into a single `-`.
///
/// Names must start and end with an ASCII letter or digit.
pub(crate) fn canonicalize(name: &str) -> Result<String, InvalidNameError> {
    let mut canonical = String::with_capacity(name.len());
    let mut in_separator_run = false;

    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => {
                if in_separator_run {
                    canonical.push('-');
                    in_separator_run = false;
                }
                canonical.push(byte.to_ascii_lowercase() as char);
            }
            b'-' | b'_' | b'.' => {
                if canonical.is_empty() {
                    return Err(InvalidNameError(name.to_string()));
                }
                in_separator_run = true;
            }
            _ => return Err(InvalidNameError(name.to_string())),
        }
    }

    if canonical.is_empty() || in_separator_run {
        return Err(InvalidNameError(name.to_string()));
    }

    Ok(canonical)
}

/// Canonicalize an owned name, reusing the allocation when it is already canonical.
pub(crate) fn canonicalize_owned(name: String) -> Result<String, InvalidNameError> {
    let already_canonical = name
        .bytes()
        .all(|byte| matches!(byte, b'a'..=b'z' | b'0'..=b'9' | b'-'))
        && !name.contains("--")
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.is_empty();
    if already_canonical {
        Ok(name)
    } else {
        canonicalize(&name)
    }
}

/// A string that is neither a valid [`PackageName`] nor a valid [`ExtraName`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the rejected input.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Not a valid package or extra name: \"{}\". Names must start and end with a letter or \
            digit and may only contain -, _, ., and alphanumeric characters.",
            self.0
        )
    }
}

impl Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        let inputs = [
            "friendly-bard",
            "Friendly-Bard",
            "FRIENDLY-BARD",
            "friendly.bard",
            "friendly_bard",
            "friendly--bard",
            "FrIeNdLy-._.-bArD",
        ];
        for input in inputs {
            assert_eq!(canonicalize(input).unwrap(), "friendly-bard");
            assert_eq!(
                canonicalize_owned(input.to_string()).unwrap(),
                "friendly-bard"
            );
        }
    }

    #[test]
    fn unchanged() {
        let unchanged = ["friendly-bard", "1okay", "okay2", "zope-interface"];
        for input in unchanged {
            assert_eq!(canonicalize(input).unwrap(), input);
            assert_eq!(canonicalize_owned(input.to_string()).unwrap(), input);
        }
    }

    #[test]
    fn failures() {
        let failures = [
            "",
            " starts-with-space",
            "-starts-with-dash",
            "ends-with-dash-",
            "ends-with-dot.",
            "ends-with-space ",
            "includes!invalid-char",
            "space in middle",
        ];
        for input in failures {
            assert!(canonicalize(input).is_err(), "{input:?}");
            assert!(canonicalize_owned(input.to_string()).is_err(), "{input:?}");
        }
    }

    #[test]
    fn package_and_extra_names_compare_canonically() {
        let a: PackageName = "Django_Rest.Framework".parse().unwrap();
        let b = PackageName::new("django-rest-framework".to_string()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "django-rest-framework");

        let extra: ExtraName = "Security".parse().unwrap();
        assert_eq!(extra.as_ref(), "security");
    }
}
