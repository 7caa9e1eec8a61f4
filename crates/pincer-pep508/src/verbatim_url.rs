use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use url::Url;

/// A [`Url`] that remembers how it was written.
///
/// Local paths (`./vendor/foo`, `file:../foo`) are resolved against a working directory into
/// `file://` URLs; the text as given is kept for display so that rendered requirements round-trip.
#[derive(Debug, Clone, Eq)]
pub struct VerbatimUrl {
    url: Url,
    given: Option<String>,
}

impl VerbatimUrl {
    /// Parse a URL or a path. Relative paths are resolved against `working_dir`.
    pub fn parse(given: &str, working_dir: &Path) -> Result<Self, VerbatimUrlError> {
        let url = if let Some(path) = given.strip_prefix("file:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            Self::path_to_url(Path::new(path), working_dir)?
        } else if given.contains("://") {
            Url::parse(given)?
        } else {
            Self::path_to_url(Path::new(given), working_dir)?
        };
        Ok(Self {
            url,
            given: Some(given.to_string()),
        })
    }

    /// Wrap a [`Url`] that has no written form of its own.
    pub fn unknown(url: Url) -> Self {
        Self { url, given: None }
    }

    pub fn raw(&self) -> &Url {
        &self.url
    }

    /// The text as the user wrote it, if any.
    pub fn given(&self) -> Option<&str> {
        self.given.as_deref()
    }

    /// The local directory or file this URL points at, for `file://` URLs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.url.scheme() == "file" {
            self.url.to_file_path().ok()
        } else {
            None
        }
    }

    fn path_to_url(path: &Path, working_dir: &Path) -> Result<Url, VerbatimUrlError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            working_dir.join(path)
        };
        Url::from_file_path(&absolute).map_err(|()| VerbatimUrlError::Path(absolute))
    }
}

impl PartialEq for VerbatimUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Hash for VerbatimUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl std::fmt::Display for VerbatimUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(given) = &self.given {
            given.fmt(f)
        } else {
            self.url.fmt(f)
        }
    }
}

impl Deref for VerbatimUrl {
    type Target = Url;

    fn deref(&self) -> &Self::Target {
        &self.url
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerbatimUrlError {
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("Path can't be converted to a URL: `{}`", _0.display())]
    Path(PathBuf),
}
