//! Parses the subset of the requirements file format that pincer reads as input.
//!
//! <https://pip.pypa.io/en/stable/reference/requirements-file-format/>
//!
//! Supported:
//!  * [PEP 508 requirements](https://packaging.python.org/en/latest/specifications/dependency-specifiers/),
//!    including `name @ ./local/path`
//!  * `-r`/`--requirement` and `-c`/`--constraint` includes
//!  * `-e`/`--editable` with a path or URL, named through `#egg=name[extras]` or the project's
//!    `pyproject.toml`
//!  * `-i`/`--index-url` and `--extra-index-url`
//!  * `--hash` (postfix)
//!  * comments and `\` line continuations
//!
//! Grammar as implemented:
//!
//! ```text
//! file = (statement | empty ('#' any*)? '\n')*
//! empty = whitespace*
//! statement = constraint_include | requirements_include | editable_requirement | index_url
//!           | extra_index_url | requirement
//! constraint_include = ('-c' | '--constraint') ('=' | wrappable_whitespaces) filepath
//! requirements_include = ('-r' | '--requirement') ('=' | wrappable_whitespaces) filepath
//! editable_requirement = ('-e' | '--editable') ('=' | wrappable_whitespaces) path_or_url
//! index_url = ('-i' | '--index-url') ('=' | wrappable_whitespaces) url
//! extra_index_url = '--extra-index-url' ('=' | wrappable_whitespaces) url
//! requirement = [a-zA-Z0-9] pep508_grammar_tail wrappable_whitespaces hashes
//! hashes = ('--hash' ('=' | wrappable_whitespaces) [a-zA-Z0-9-_]+ ':' [a-zA-Z0-9-_] wrappable_whitespaces+)*
//! # This should indicate a single backslash before a newline
//! wrappable_whitespaces = whitespace ('\\\n' | whitespace)*
//! ```

use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;
use unscanny::{Pattern, Scanner};
use url::Url;

use pincer_fs::Simplified;
use pincer_normalize::{ExtraName, PackageName};
use pincer_pep508::{Pep508Error, Requirement, VerbatimUrl, VerbatimUrlError};
use pincer_warnings::warn_user;

/// Whether the entries of a file were requested or only constrain the resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// Read from the top-level file or through `-r`.
    Requirements,
    /// Read through `-c`, directly or nested.
    Constraints,
}

/// Where an entry was written: `-r requirements.in (line 3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    pub kind: OriginKind,
    pub path: PathBuf,
    /// One-based; the first line of a continued entry.
    pub line: usize,
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let flag = match self.kind {
            OriginKind::Requirements => "-r",
            OriginKind::Constraints => "-c",
        };
        write!(f, "{flag} {} (line {})", self.path.user_display(), self.line)
    }
}

/// A [`Requirement`] with the hashes written after it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequirementEntry {
    pub requirement: Requirement,
    pub hashes: Vec<String>,
    pub origin: Origin,
}

impl Display for RequirementEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.requirement)?;
        for hash in &self.hashes {
            write!(f, " --hash {hash}")?;
        }
        Ok(())
    }
}

/// An `-e` line. Relative paths are resolved against the working directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EditableRequirement {
    pub url: VerbatimUrl,
    /// The name given through `#egg=`, if any.
    pub name: Option<PackageName>,
    pub extras: Vec<ExtraName>,
    pub origin: Origin,
}

impl EditableRequirement {
    /// The local directory of the project, for `file://` editables.
    pub fn path(&self) -> Option<PathBuf> {
        self.url.to_file_path()
    }
}

impl Display for EditableRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "-e {}", self.url)
    }
}

/// A parsed requirements file with its includes flattened.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RequirementsTxt {
    pub requirements: Vec<RequirementEntry>,
    /// Entries read through `-c`.
    pub constraints: Vec<RequirementEntry>,
    pub editables: Vec<EditableRequirement>,
    /// The last `--index-url` seen, if any.
    pub index_url: Option<Url>,
    pub extra_index_urls: Vec<Url>,
}

enum Statement {
    Requirements { filename: String, start: usize },
    Constraints { filename: String, start: usize },
    Editable { given: String, start: usize },
    IndexUrl { given: String, start: usize },
    ExtraIndexUrl { given: String, start: usize },
    Requirement(Requirement, Vec<String>, usize),
    InvalidRequirement(Box<Pep508Error>, usize),
}

impl RequirementsTxt {
    /// Parse a requirements file and everything it includes.
    ///
    /// Includes are resolved relative to the including file; relative paths in requirements
    /// and editables are resolved against `working_dir`.
    pub fn parse(
        path: impl AsRef<Path>,
        working_dir: impl AsRef<Path>,
    ) -> Result<Self, RequirementsTxtError> {
        Self::parse_as(path.as_ref(), working_dir.as_ref(), OriginKind::Requirements)
    }

    /// Parse a constraints file: every entry, including those of nested `-r` files, is a
    /// constraint.
    pub fn parse_constraints(
        path: impl AsRef<Path>,
        working_dir: impl AsRef<Path>,
    ) -> Result<Self, RequirementsTxtError> {
        Self::parse_as(path.as_ref(), working_dir.as_ref(), OriginKind::Constraints)
    }

    fn parse_as(
        path: &Path,
        working_dir: &Path,
        kind: OriginKind,
    ) -> Result<Self, RequirementsTxtError> {
        let content = fs_err::read_to_string(path).map_err(|err| RequirementsTxtError::Io {
            path: path.to_path_buf(),
            err,
        })?;
        let data = Self::parse_str(&content, path, working_dir, kind)?;
        if data == Self::default() {
            warn_user!(
                "Requirements file `{}` does not contain any dependencies",
                path.user_display()
            );
        }
        Ok(data)
    }

    /// Parse `content` as if it had been read from `path`.
    pub fn parse_str(
        content: &str,
        path: &Path,
        working_dir: &Path,
        kind: OriginKind,
    ) -> Result<Self, RequirementsTxtError> {
        let mut s = Scanner::new(content);
        let origin = |start: usize| Origin {
            kind,
            path: path.to_path_buf(),
            line: calculate_row_column(content, start).0,
        };

        let mut data = Self::default();
        while let Some(statement) = parse_entry(&mut s, content, path, working_dir)? {
            match statement {
                Statement::Requirements { filename, start } => {
                    let sub_file = include_path(path, &filename);
                    debug!("Including `{}`", sub_file.user_display());
                    let sub = Self::parse_as(&sub_file, working_dir, kind).map_err(|err| {
                        RequirementsTxtError::Subfile {
                            path: path.to_path_buf(),
                            line: calculate_row_column(content, start).0,
                            err: Box::new(err),
                        }
                    })?;
                    data.update_from(sub);
                }
                Statement::Constraints { filename, start } => {
                    let sub_file = include_path(path, &filename);
                    debug!("Including constraints from `{}`", sub_file.user_display());
                    let sub = Self::parse_as(&sub_file, working_dir, OriginKind::Constraints)
                        .map_err(|err| RequirementsTxtError::Subfile {
                            path: path.to_path_buf(),
                            line: calculate_row_column(content, start).0,
                            err: Box::new(err),
                        })?;
                    data.update_from(sub);
                }
                Statement::Editable { given, start } => {
                    let editable = parse_editable(&given, working_dir, origin(start))?;
                    data.editables.push(editable);
                }
                Statement::IndexUrl { given, start } => {
                    data.index_url = Some(parse_url(&given, path, content, start)?);
                }
                Statement::ExtraIndexUrl { given, start } => {
                    data.extra_index_urls
                        .push(parse_url(&given, path, content, start)?);
                }
                Statement::Requirement(requirement, hashes, start) => {
                    let entry = RequirementEntry {
                        requirement,
                        hashes,
                        origin: origin(start),
                    };
                    match kind {
                        OriginKind::Requirements => data.requirements.push(entry),
                        OriginKind::Constraints => data.constraints.push(entry),
                    }
                }
                Statement::InvalidRequirement(err, start) => {
                    let line = calculate_row_column(content, start).0;
                    match kind {
                        OriginKind::Requirements => {
                            return Err(RequirementsTxtError::Pep508 {
                                path: path.to_path_buf(),
                                line,
                                err,
                            });
                        }
                        // A constraint that can't be read only loosens the resolution.
                        OriginKind::Constraints => {
                            warn_user!(
                                "Skipping invalid constraint on line {line} of {}: {}",
                                path.user_display(),
                                err.to_string().lines().next().unwrap_or_default()
                            );
                        }
                    }
                }
            }
        }
        Ok(data)
    }

    /// Merges other into self
    pub fn update_from(&mut self, other: Self) {
        self.requirements.extend(other.requirements);
        self.constraints.extend(other.constraints);
        self.editables.extend(other.editables);
        if other.index_url.is_some() {
            self.index_url = other.index_url;
        }
        self.extra_index_urls.extend(other.extra_index_urls);
    }
}

/// Includes are relative to the directory of the file that names them.
fn include_path(parent: &Path, filename: &str) -> PathBuf {
    match parent.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(filename),
        _ => PathBuf::from(filename),
    }
}

fn parse_url(
    given: &str,
    path: &Path,
    content: &str,
    start: usize,
) -> Result<Url, RequirementsTxtError> {
    Url::parse(given).map_err(|err| RequirementsTxtError::Url {
        path: path.to_path_buf(),
        line: calculate_row_column(content, start).0,
        given: given.to_string(),
        err: VerbatimUrlError::Url(err),
    })
}

/// Split `./path#egg=name[extras]` into the location and the optional name and extras.
fn parse_editable(
    given: &str,
    working_dir: &Path,
    origin: Origin,
) -> Result<EditableRequirement, RequirementsTxtError> {
    let (location, fragment) = given.split_once('#').unwrap_or((given, ""));
    let url = VerbatimUrl::parse(location, working_dir).map_err(|err| {
        RequirementsTxtError::Url {
            path: origin.path.clone(),
            line: origin.line,
            given: given.to_string(),
            err,
        }
    })?;

    let mut name = None;
    let mut extras = Vec::new();
    if let Some(egg) = fragment
        .split('&')
        .find_map(|part| part.strip_prefix("egg="))
    {
        // `#egg=name[extras]` reads like a requirement without a version.
        let requirement = Requirement::from_str(egg).map_err(|err| {
            RequirementsTxtError::Pep508 {
                path: origin.path.clone(),
                line: origin.line,
                err: Box::new(err),
            }
        })?;
        name = Some(requirement.name);
        extras = requirement.extras;
    }

    Ok(EditableRequirement {
        url,
        name,
        extras,
        origin,
    })
}

/// Parse a single entry, that is a requirement, an inclusion or a comment line
///
/// Consumes all preceding trivia (whitespace and comments). If it returns None, we've reached
/// the end of file
fn parse_entry(
    s: &mut Scanner,
    content: &str,
    path: &Path,
    working_dir: &Path,
) -> Result<Option<Statement>, RequirementsTxtError> {
    // Eat all preceding whitespace, this may run us to the end of file
    eat_wrappable_whitespace(s);
    while s.at(['\n', '\r', '#']) {
        // skip comments
        eat_trailing_line(s, content, path)?;
        eat_wrappable_whitespace(s);
    }

    let start = s.cursor();
    let statement = if s.eat_if("--requirement") || s.eat_if("-r") {
        let filename = parse_value(s, content, path, |c: char| !['\n', '\r', '#'].contains(&c))?;
        eat_trailing_line(s, content, path)?;
        Statement::Requirements {
            filename: filename.to_string(),
            start,
        }
    } else if s.eat_if("--constraint") || s.eat_if("-c") {
        let filename = parse_value(s, content, path, |c: char| !['\n', '\r', '#'].contains(&c))?;
        eat_trailing_line(s, content, path)?;
        Statement::Constraints {
            filename: filename.to_string(),
            start,
        }
    } else if s.eat_if("--editable") || s.eat_if("-e") {
        let given = parse_value(s, content, path, |c: char| !['\n', '\r'].contains(&c))?;
        // A comment after an editable needs whitespace before the `#`, as `#egg=` is part of it.
        let given = given
            .split_once(" #")
            .map_or(given, |(given, _)| given)
            .trim_end();
        eat_trailing_line(s, content, path)?;
        Statement::Editable {
            given: given.to_string(),
            start,
        }
    } else if s.eat_if("--index-url") || s.eat_if("-i") {
        let given = parse_value(s, content, path, |c: char| !c.is_whitespace())?;
        eat_trailing_line(s, content, path)?;
        Statement::IndexUrl {
            given: given.to_string(),
            start,
        }
    } else if s.eat_if("--extra-index-url") {
        let given = parse_value(s, content, path, |c: char| !c.is_whitespace())?;
        eat_trailing_line(s, content, path)?;
        Statement::ExtraIndexUrl {
            given: given.to_string(),
            start,
        }
    } else if s.at(char::is_ascii_alphanumeric) {
        let (requirement, hashes) = parse_requirement_and_hashes(s, content, path, working_dir)?;
        match requirement {
            Ok(requirement) => Statement::Requirement(requirement, hashes, start),
            Err(err) => Statement::InvalidRequirement(err, start),
        }
    } else if s.at('-') {
        let option = s.eat_while(|c: char| !c.is_whitespace() && c != '=');
        return Err(parser_error(
            format!("Unsupported option `{option}`"),
            content,
            path,
            start,
        ));
    } else if let Some(char) = s.peek() {
        return Err(parser_error(
            format!("Unexpected '{char}', expected '-c', '-e', '-r' or the start of a requirement"),
            content,
            path,
            s.cursor(),
        ));
    } else {
        // EOF
        return Ok(None);
    };
    Ok(Some(statement))
}

/// Eat whitespace and ignore newlines escaped with a backslash
fn eat_wrappable_whitespace<'a>(s: &mut Scanner<'a>) -> &'a str {
    let start = s.cursor();
    s.eat_while([' ', '\t']);
    // Allow multiple escaped line breaks
    // With the order we support `\n`, `\r`, `\r\n` without accidentally eating a `\n\r`
    while s.eat_if("\\\n") || s.eat_if("\\\r\n") || s.eat_if("\\\r") {
        s.eat_while([' ', '\t']);
    }
    s.from(start)
}

/// Eats the end of line or a trailing comment
fn eat_trailing_line(s: &mut Scanner, content: &str, path: &Path) -> Result<(), RequirementsTxtError> {
    s.eat_while([' ', '\t']);
    match s.eat() {
        None | Some('\n') => {} // End of file or end of line, nothing to do
        Some('\r') => {
            s.eat_if('\n'); // `\r\n`, but just `\r` is also accepted
        }
        Some('#') => {
            s.eat_until(['\r', '\n']);
            s.eat_if('\r');
            s.eat_if('\n');
        }
        Some(other) => {
            return Err(parser_error(
                format!("Expected comment or end-of-line, found '{other}'"),
                content,
                path,
                s.cursor(),
            ));
        }
    }
    Ok(())
}

/// Parse a PEP 508 requirement with optional trailing hashes
///
/// The whole entry is consumed even if the requirement itself is invalid, so that the caller
/// can decide whether to skip it.
fn parse_requirement_and_hashes(
    s: &mut Scanner,
    content: &str,
    path: &Path,
    working_dir: &Path,
) -> Result<(Result<Requirement, Box<Pep508Error>>, Vec<String>), RequirementsTxtError> {
    let start = s.cursor();
    // Termination: s.eat() eventually becomes None
    let (end, has_hashes) = loop {
        let end = s.cursor();

        //  We look for the end of the line ...
        if s.eat_if('\n') {
            break (end, false);
        }
        if s.eat_if('\r') {
            s.eat_if('\n'); // Support `\r\n` but also accept stray `\r`
            break (end, false);
        }
        // ... or `--hash`, an escaped newline or a comment separated by whitespace ...
        if !eat_wrappable_whitespace(s).is_empty() {
            if s.after().starts_with("--") {
                break (end, true);
            } else if s.eat_if('#') {
                s.eat_until(['\r', '\n']);
                s.eat_if('\r');
                s.eat_if('\n');
                break (end, false);
            }
            continue;
        }
        // ... or the end of the file, which works like the end of line
        if s.eat().is_none() {
            break (end, false);
        }
    };

    // Continuations inside the requirement are whitespace to the PEP 508 parser.
    let text = content[start..end]
        .replace("\\\r\n", " ")
        .replace("\\\n", " ")
        .replace("\\\r", " ");
    let requirement = Requirement::parse(text.trim_end(), working_dir).map_err(Box::new);
    let hashes = if has_hashes {
        let hashes = parse_hashes(s, content, path)?;
        eat_trailing_line(s, content, path)?;
        hashes
    } else {
        Vec::new()
    };
    Ok((requirement, hashes))
}

/// Parse `--hash=... --hash ...` after a requirement
fn parse_hashes(
    s: &mut Scanner,
    content: &str,
    path: &Path,
) -> Result<Vec<String>, RequirementsTxtError> {
    let mut hashes = Vec::new();
    if !s.eat_if("--hash") {
        let found = s.eat_while(|c: char| !c.is_whitespace());
        return Err(parser_error(
            format!("Expected '--hash', found '{found}'"),
            content,
            path,
            s.cursor(),
        ));
    }
    let hash = parse_value(s, content, path, |c: char| !c.is_whitespace())?;
    hashes.push(hash.to_string());
    loop {
        eat_wrappable_whitespace(s);
        if !s.eat_if("--hash") {
            break;
        }
        let hash = parse_value(s, content, path, |c: char| !c.is_whitespace())?;
        hashes.push(hash.to_string());
    }
    Ok(hashes)
}

/// In `-<key>=<value>` or `-<key> value`, this parses the part after the key
fn parse_value<'a, T>(
    s: &mut Scanner<'a>,
    content: &str,
    path: &Path,
    while_pattern: impl Pattern<T>,
) -> Result<&'a str, RequirementsTxtError> {
    if s.eat_if('=') {
        // Explicit equals sign
        Ok(s.eat_while(while_pattern).trim_end())
    } else if s.eat_if(char::is_whitespace) {
        // Key and value are separated by whitespace instead
        eat_wrappable_whitespace(s);
        Ok(s.eat_while(while_pattern).trim_end())
    } else {
        Err(parser_error(
            format!("Expected '=' or whitespace, found {:?}", s.peek()),
            content,
            path,
            s.cursor(),
        ))
    }
}

fn parser_error(message: String, content: &str, path: &Path, location: usize) -> RequirementsTxtError {
    let (line, column) = calculate_row_column(content, location);
    RequirementsTxtError::Parser {
        path: path.to_path_buf(),
        message,
        line,
        column,
    }
}

/// One-based line and column of a byte offset; `\r\n` and lone `\r` count as one line break.
fn calculate_row_column(content: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;

    let mut chars = content.char_indices().peekable();
    while let Some((index, char)) = chars.next() {
        if index >= position {
            break;
        }
        match char {
            '\r' => {
                chars.next_if(|&(_, next)| next == '\n');
                line += 1;
                column = 1;
            }
            '\n' => {
                line += 1;
                column = 1;
            }
            _ => column += 1,
        }
    }

    (line, column)
}

#[derive(Debug, Error)]
pub enum RequirementsTxtError {
    #[error("Failed to read `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("{message} in `{}` at line {line}, column {column}", path.user_display())]
    Parser {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
    },
    #[error("Couldn't parse requirement in `{}` at line {line}", path.user_display())]
    Pep508 {
        path: PathBuf,
        line: usize,
        #[source]
        err: Box<Pep508Error>,
    },
    #[error("Invalid URL in `{}` at line {line}: `{given}`", path.user_display())]
    Url {
        path: PathBuf,
        line: usize,
        given: String,
        #[source]
        err: VerbatimUrlError,
    },
    #[error("Error parsing a file included into `{}` at line {line}", path.user_display())]
    Subfile {
        path: PathBuf,
        line: usize,
        #[source]
        err: Box<RequirementsTxtError>,
    },
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use anyhow::Result;
    use fs_err as fs;
    use indoc::indoc;
    use tempfile::tempdir;
    use test_case::test_case;

    use super::*;

    fn parse(content: &str) -> Result<RequirementsTxt, RequirementsTxtError> {
        RequirementsTxt::parse_str(
            content,
            Path::new("requirements.in"),
            Path::new("/work"),
            OriginKind::Requirements,
        )
    }

    fn names(entries: &[RequirementEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|entry| entry.requirement.to_string())
            .collect()
    }

    #[test]
    fn requirements_with_provenance() -> Result<()> {
        let requirements = parse(indoc! {r#"
            # Top-level requirements
            Flask>=0.10

            django<1.9  # pinned for now
            ipython[notebook]==2.1.0 ; python_version >= "3"
        "#})?;
        assert_eq!(
            names(&requirements.requirements),
            [
                "flask>=0.10",
                "django<1.9",
                "ipython[notebook]==2.1.0 ; python_version >= \"3\"",
            ]
        );
        let origins: Vec<String> = requirements
            .requirements
            .iter()
            .map(|entry| entry.origin.to_string())
            .collect();
        assert_eq!(
            origins,
            [
                "-r requirements.in (line 2)",
                "-r requirements.in (line 4)",
                "-r requirements.in (line 5)",
            ]
        );
        assert!(requirements.constraints.is_empty());
        Ok(())
    }

    #[test]
    fn continuation_and_hashes() -> Result<()> {
        let requirements = parse(indoc! {r"
            six==1.9.0 \
                --hash=sha256:e24052411fc4fbd1f672635537c3fc2330d9481b18c0317695b46259512c91d5 \
                --hash sha256:671dd20c3c8f4e3bfbd28c0ec7ff7d10fdb4a8daa4fa5d6c0cc7d5c8e8e8e8e8
            celery>=3.1 \
              ,<4
        "})?;
        assert_eq!(names(&requirements.requirements), ["six==1.9.0", "celery<4,>=3.1"]);
        assert_eq!(requirements.requirements[0].hashes.len(), 2);
        assert_eq!(requirements.requirements[1].origin.line, 4);
        Ok(())
    }

    #[test]
    fn index_urls() -> Result<()> {
        let requirements = parse(indoc! {"
            --index-url https://pypi.org/simple
            --extra-index-url=https://example.org/simple
            -i https://mirror.example.org/simple
            flask
        "})?;
        assert_eq!(
            requirements.index_url.as_ref().map(Url::as_str),
            Some("https://mirror.example.org/simple")
        );
        assert_eq!(
            requirements
                .extra_index_urls
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>(),
            ["https://example.org/simple"]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn editables() -> Result<()> {
        let requirements = parse(indoc! {"
            -e ./src/app#egg=app[dev]  # local checkout
            --editable=file:///opt/lib
        "})?;
        let [app, lib] = requirements.editables.as_slice() else {
            panic!("expected two editables, got {:?}", requirements.editables);
        };
        assert_eq!(app.url.raw().as_str(), "file:///work/src/app");
        assert_eq!(app.to_string(), "-e ./src/app");
        assert_eq!(app.name.as_ref().map(PackageName::as_str), Some("app"));
        assert_eq!(app.extras.len(), 1);
        assert_eq!(app.origin.to_string(), "-r requirements.in (line 1)");
        assert_eq!(lib.name, None);
        assert_eq!(lib.path(), Some(PathBuf::from("/opt/lib")));
        Ok(())
    }

    #[test_case("--find-links ./wheels", "Unsupported option `--find-links` in `requirements.in` at line 1, column 1"; "unsupported option")]
    #[test_case("flask\n-r", "Expected '=' or whitespace, found None in `requirements.in` at line 2, column 3"; "missing value")]
    #[test_case("flask\n\n  ;", "Unexpected ';', expected '-c', '-e', '-r' or the start of a requirement in `requirements.in` at line 3, column 3"; "unexpected character")]
    fn invalid(content: &str, expected: &str) {
        let err = parse(content).unwrap_err();
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn invalid_requirement() {
        let err = parse("flask\n\nnumpy[!]==1.29\n").unwrap_err();
        let errors = anyhow::Error::new(err)
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(errors[0], "Couldn't parse requirement in `requirements.in` at line 3");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn invalid_constraint_is_skipped() -> Result<()> {
        let constraints = RequirementsTxt::parse_str(
            "click==7.0\nitsdangerous (>=0.24\nsix<2\n",
            Path::new("constraints.txt"),
            Path::new("/work"),
            OriginKind::Constraints,
        )?;
        assert_eq!(names(&constraints.constraints), ["click==7.0", "six<2"]);
        assert_eq!(constraints.constraints[1].origin.line, 3);
        Ok(())
    }

    #[test]
    fn invalid_constraint_in_include() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();
        fs::write(dir.join("requirements.in"), "flask\n-c constraints.txt\n")?;
        fs::write(dir.join("constraints.txt"), "werkzeug<1\nnumpy[!]==1.29\n")?;

        let requirements = RequirementsTxt::parse(dir.join("requirements.in"), dir)?;
        assert_eq!(names(&requirements.requirements), ["flask"]);
        assert_eq!(names(&requirements.constraints), ["werkzeug<1"]);
        Ok(())
    }

    #[test]
    fn includes() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("nested"))?;
        fs::write(
            dir.join("requirements.in"),
            indoc! {"
                -r nested/base.in
                -c constraints.txt
                flask
            "},
        )?;
        fs::write(dir.join("nested").join("base.in"), "django<1.9\n")?;
        fs::write(
            dir.join("constraints.txt"),
            indoc! {"
                # Shared pins
                -r constraints-extra.txt
                click==6.7
            "},
        )?;
        fs::write(dir.join("constraints-extra.txt"), "itsdangerous==0.24\n")?;

        let requirements = RequirementsTxt::parse(dir.join("requirements.in"), dir)?;
        assert_eq!(names(&requirements.requirements), ["django<1.9", "flask"]);
        assert_eq!(
            names(&requirements.constraints),
            ["itsdangerous==0.24", "click==6.7"]
        );
        assert!(
            requirements
                .constraints
                .iter()
                .all(|entry| entry.origin.kind == OriginKind::Constraints)
        );
        assert_eq!(requirements.constraints[1].origin.line, 3);
        assert_eq!(
            requirements.requirements[0].origin.path,
            dir.join("nested").join("base.in")
        );
        Ok(())
    }

    #[test]
    fn missing_include() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();
        fs::write(dir.join("requirements.in"), "flask\n-r missing.txt\n")?;

        let err = RequirementsTxt::parse(dir.join("requirements.in"), dir).unwrap_err();
        let RequirementsTxtError::Subfile { line, err, .. } = err else {
            panic!("expected an include error");
        };
        assert_eq!(line, 2);
        assert!(matches!(*err, RequirementsTxtError::Io { .. }));
        Ok(())
    }

    #[test]
    fn line_endings() -> Result<()> {
        let unix = parse("flask\n# comment\ndjango<1.9 \\\n  ,>=1.6\n")?;
        let windows = parse("flask\r\n# comment\r\ndjango<1.9 \\\r\n  ,>=1.6\r\n")?;
        assert_eq!(unix, windows);
        assert_eq!(unix.requirements[1].origin.line, 3);
        Ok(())
    }

    #[test]
    fn row_column() {
        let content = "a\nbc\r\nd";
        assert_eq!(calculate_row_column(content, 0), (1, 1));
        assert_eq!(calculate_row_column(content, 3), (2, 2));
        assert_eq!(calculate_row_column(content, 6), (3, 1));
    }
}
