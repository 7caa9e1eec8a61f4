//! Dependency specifiers such as `requests [security] >= 2.8.1, == 2.8.* ; python_version > "3.8"`,
//! following [PEP 508](https://peps.python.org/pep-0508/), plus the `name @ ./local/path` form
//! pip accepts in requirements files.

use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;
use unicode_width::UnicodeWidthChar;

pub use marker::{
    MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue,
    MarkerValueString, MarkerValueVersion, StringVersion,
};
use pincer_normalize::{ExtraName, PackageName};
use pincer_pep440::{VersionSpecifier, VersionSpecifiers};
pub use verbatim_url::{VerbatimUrl, VerbatimUrlError};

use crate::cursor::Cursor;

mod cursor;
mod marker;
mod verbatim_url;

/// A parse error with the offending span of the input.
#[derive(Debug)]
pub struct Pep508Error {
    pub message: Pep508ErrorSource,
    /// Byte offset of the span.
    pub start: usize,
    /// Byte length of the span.
    pub len: usize,
    pub input: String,
}

#[derive(Debug, Error)]
pub enum Pep508ErrorSource {
    #[error("{0}")]
    String(String),
    #[error(transparent)]
    UrlError(#[from] VerbatimUrlError),
}

impl Display for Pep508Error {
    /// Renders the message, the input, and a `^^^` underline below the span.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let width = |s: &str| s.chars().filter_map(UnicodeWidthChar::width).sum::<usize>();
        let start = self.start.min(self.input.len());
        let end = (self.start + self.len).min(self.input.len());
        let start_offset = width(&self.input[..start]);
        let underline_len = width(&self.input[start..end]).max(1);
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(start_offset),
            "^".repeat(underline_len)
        )
    }
}

impl std::error::Error for Pep508Error {}

/// A PEP 508 dependency specification.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    pub name: PackageName,
    /// Extras in the order they were written; duplicates are kept.
    pub extras: Vec<ExtraName>,
    pub version_or_url: Option<VersionOrUrl>,
    pub marker: Option<MarkerTree>,
}

/// The version constraint or the direct reference of a requirement.
#[derive(Hash, Debug, Clone, Eq, PartialEq)]
pub enum VersionOrUrl {
    VersionSpecifier(VersionSpecifiers),
    Url(VerbatimUrl),
}

impl Requirement {
    /// Parse a requirement, resolving relative paths in `name @ path` against `working_dir`.
    pub fn parse(input: &str, working_dir: impl AsRef<Path>) -> Result<Self, Pep508Error> {
        parse(&mut Cursor::new(input), working_dir.as_ref())
    }

    /// The version specifiers, or an empty set for URL and unconstrained requirements.
    pub fn specifiers(&self) -> VersionSpecifiers {
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => specifiers.clone(),
            Some(VersionOrUrl::Url(_)) | None => VersionSpecifiers::empty(),
        }
    }

    pub fn url(&self) -> Option<&VerbatimUrl> {
        match &self.version_or_url {
            Some(VersionOrUrl::Url(url)) => Some(url),
            _ => None,
        }
    }

    /// Whether the requirement applies in `env` when installed on behalf of `extras`.
    pub fn evaluate_markers(&self, env: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker
            .as_ref()
            .is_none_or(|marker| marker.evaluate(env, extras))
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let working_dir = std::env::current_dir().unwrap_or_default();
        Self::parse(input, working_dir)
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            f.write_str("[")?;
            for (index, extra) in self.extras.iter().enumerate() {
                if index > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{extra}")?;
            }
            f.write_str("]")?;
        }
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => write!(f, "{specifiers}")?,
            Some(VersionOrUrl::Url(url)) => write!(f, " @ {url}")?,
            None => {}
        }
        if let Some(marker) = &self.marker {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for Requirement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

fn parse_name(cursor: &mut Cursor) -> Result<PackageName, Pep508Error> {
    // https://peps.python.org/pep-0508/#names
    let Some((index, first)) = cursor.next() else {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String("Empty field is not allowed for PEP508".to_string()),
            start: 0,
            len: 1,
            input: cursor.to_string(),
        });
    };
    if !first.is_ascii_alphanumeric() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Expected package name starting with an alphanumeric character, found '{first}'"
            )),
            start: index,
            len: first.len_utf8(),
            input: cursor.to_string(),
        });
    }

    let (_, len) =
        cursor.take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '.' | '-' | '_'));
    let name = cursor.slice(index, len + first.len_utf8());
    if let Some(last) = name.chars().last().filter(|char| matches!(char, '.' | '-' | '_')) {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(format!(
                "Package name must end with an alphanumeric character, not '{last}'"
            )),
            start: index + name.len() - 1,
            len: 1,
            input: cursor.to_string(),
        });
    }

    PackageName::from_str(name).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::String(err.to_string()),
        start: index,
        len: name.len(),
        input: cursor.to_string(),
    })
}

/// Parses extras in the `[extra1,extra2]` format.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let Some(bracket_pos) = cursor.eat_char('[') else {
        return Ok(vec![]);
    };
    let mut extras = Vec::new();

    cursor.eat_whitespace();
    if cursor.eat_char(']').is_some() {
        return Ok(extras);
    }

    loop {
        cursor.eat_whitespace();
        let (start, len) = cursor
            .take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.'));
        let buffer = cursor.slice(start, len);
        let extra = ExtraName::from_str(buffer).map_err(|_| match cursor.peek() {
            Some((pos, other)) if buffer.is_empty() => Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected an alphanumeric character starting the extra name, found '{other}'"
                )),
                start: pos,
                len: other.len_utf8(),
                input: cursor.to_string(),
            },
            None if buffer.is_empty() => Pep508Error {
                message: Pep508ErrorSource::String(
                    "Missing closing bracket (expected ']', found end of dependency specification)"
                        .to_string(),
                ),
                start: bracket_pos,
                len: 1,
                input: cursor.to_string(),
            },
            _ => Pep508Error {
                message: Pep508ErrorSource::String(format!("Invalid extra name '{buffer}'")),
                start,
                len,
                input: cursor.to_string(),
            },
        })?;
        extras.push(extra);

        cursor.eat_whitespace();
        match cursor.next() {
            Some((_, ',')) => {}
            Some((_, ']')) => break,
            Some((pos, other)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected either ',' (separating extras) or ']' (ending the extras section), found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            None => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Missing closing bracket (expected ']', found end of dependency specification)"
                            .to_string(),
                    ),
                    start: bracket_pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
        }
    }

    Ok(extras)
}

/// A URL or a local path after `@`.
fn parse_url(cursor: &mut Cursor, working_dir: &Path) -> Result<VerbatimUrl, Pep508Error> {
    cursor.eat_whitespace();
    let (start, len) = cursor.take_while(|char| !char.is_whitespace());
    let url = cursor.slice(start, len);
    if url.is_empty() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String("Expected URL".to_string()),
            start,
            len: 1,
            input: cursor.to_string(),
        });
    }
    VerbatimUrl::parse(url, working_dir).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::UrlError(err),
        start,
        len,
        input: cursor.to_string(),
    })
}

fn parse_specifier(
    cursor: &Cursor,
    buffer: &str,
    start: usize,
    end: usize,
) -> Result<VersionSpecifier, Pep508Error> {
    VersionSpecifier::from_str(buffer).map_err(|err| Pep508Error {
        message: Pep508ErrorSource::String(err.to_string()),
        start,
        len: end - start,
        input: cursor.to_string(),
    })
}

/// Such as `>=1.19,<2.0`, ended by the end of input, a `;` or (inside parentheses) a `)`.
///
/// ```text
/// version_one (wsp* ',' version_one)*
/// ```
fn parse_version_specifier(
    cursor: &mut Cursor,
    parenthesized: Option<usize>,
) -> Result<VersionSpecifiers, Pep508Error> {
    let mut start = cursor.pos();
    let mut specifiers = Vec::new();
    loop {
        let (_, len) = cursor.take_while(|char| !matches!(char, ',' | ';' | ')'));
        let end = start + len;
        let buffer = cursor.slice(start, len);
        match (cursor.peek(), parenthesized) {
            (Some((_, ',')), _) => {
                specifiers.push(parse_specifier(cursor, buffer, start, end)?);
                cursor.next();
                start = cursor.pos();
            }
            (Some((_, ')')), Some(_)) => {
                specifiers.push(parse_specifier(cursor, buffer, start, end)?);
                cursor.next();
                break;
            }
            (Some((_, ';')) | None, None) => {
                specifiers.push(parse_specifier(cursor, buffer, start, end)?);
                break;
            }
            (Some((_, ';')) | None, Some(brace_pos)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(
                        "Missing closing parenthesis (expected ')', found end of dependency specification)"
                            .to_string(),
                    ),
                    start: brace_pos,
                    len: 1,
                    input: cursor.to_string(),
                });
            }
            (Some((pos, other)), None) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!(
                        "Expected a version specifier, found '{other}'"
                    )),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
            (Some((pos, other)), Some(_)) => {
                return Err(Pep508Error {
                    message: Pep508ErrorSource::String(format!("Unexpected '{other}'")),
                    start: pos,
                    len: other.len_utf8(),
                    input: cursor.to_string(),
                });
            }
        }
    }
    Ok(specifiers.into_iter().collect())
}

/// ```text
/// specification = wsp* name wsp* extras? wsp* (('@' wsp* url) | ('(' versionspec ')') | versionspec)? wsp* (';' wsp* marker)? wsp*
/// ```
fn parse(cursor: &mut Cursor, working_dir: &Path) -> Result<Requirement, Pep508Error> {
    cursor.eat_whitespace();
    let name = parse_name(cursor)?;
    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;
    cursor.eat_whitespace();

    let version_or_url = match cursor.peek_char() {
        Some('@') => {
            cursor.next();
            Some(VersionOrUrl::Url(parse_url(cursor, working_dir)?))
        }
        Some('(') => {
            let brace_pos = cursor.pos();
            cursor.next();
            Some(VersionOrUrl::VersionSpecifier(parse_version_specifier(
                cursor,
                Some(brace_pos),
            )?))
        }
        Some('<' | '=' | '>' | '~' | '!') => Some(VersionOrUrl::VersionSpecifier(
            parse_version_specifier(cursor, None)?,
        )),
        Some(';') | None => None,
        Some(other) => {
            return Err(Pep508Error {
                message: Pep508ErrorSource::String(format!(
                    "Expected one of `@`, `(`, `<`, `=`, `>`, `~`, `!`, `;`, found `{other}`"
                )),
                start: cursor.pos(),
                len: other.len_utf8(),
                input: cursor.to_string(),
            });
        }
    };

    cursor.eat_whitespace();
    let marker = if cursor.eat_char(';').is_some() {
        Some(marker::parse_markers_cursor(cursor)?)
    } else {
        None
    };
    cursor.eat_whitespace();
    if let Some((pos, char)) = cursor.next() {
        return Err(Pep508Error {
            message: Pep508ErrorSource::String(if marker.is_none() {
                format!("Expected end of input or ';', found '{char}'")
            } else {
                format!("Expected end of input, found '{char}'")
            }),
            start: pos,
            len: char.len_utf8(),
            input: cursor.to_string(),
        });
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}
