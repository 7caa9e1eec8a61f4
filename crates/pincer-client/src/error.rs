use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use pincer_fs::Simplified;
use pincer_resolver::RepositoryError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// An invalid URL was provided.
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error("Index URL `{0}` can't be used as a base URL")]
    CannotBeABase(Url),

    /// The package was not found on any configured index.
    #[error("Package `{0}` was not found in the package index")]
    PackageNotFound(String),

    #[error("Version `{version}` of `{package}` was not found in the package index")]
    VersionNotFound { package: String, version: String },

    /// A generic request error happened while making a request. Refer to the
    /// error message for more details.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// A generic request middleware error happened while making a request.
    /// Refer to the error message for more details.
    #[error(transparent)]
    RequestMiddleware(#[from] reqwest_middleware::Error),

    #[error("Received some unexpected JSON from {url}")]
    BadJson {
        #[source]
        source: serde_json::Error,
        url: Url,
    },

    #[error("Failed to read `{}`", path.user_display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Failed to parse `{}`", path.user_display())]
    PyprojectToml {
        path: PathBuf,
        #[source]
        err: Box<toml::de::Error>,
    },

    #[error("`{}` does not declare a `[project].name`", path.user_display())]
    MissingProjectName { path: PathBuf },

    #[error("The project at `{}` declares its dependencies as dynamic", path.user_display())]
    DynamicDependencies { path: PathBuf },

    #[error("Failed to build the HTTP client")]
    ClientBuild(#[source] reqwest::Error),
}

impl ClientError {
    pub fn from_json_err(err: serde_json::Error, url: Url) -> Self {
        Self::BadJson { source: err, url }
    }

    /// Whether the index answered that the resource doesn't exist, as opposed to failing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PackageNotFound(_) | Self::VersionNotFound { .. } => true,
            Self::Request(err) => err.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

impl From<ClientError> for RepositoryError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::PackageNotFound(package) => Self::UnknownPackage(package),
            ClientError::VersionNotFound { package, version } => {
                Self::UnknownPackage(format!("{package}=={version}"))
            }
            ClientError::Io { err, .. } => Self::Io(err),
            ClientError::PyprojectToml { .. }
            | ClientError::MissingProjectName { .. }
            | ClientError::DynamicDependencies { .. } => {
                let package = match &err {
                    ClientError::PyprojectToml { path, .. }
                    | ClientError::MissingProjectName { path }
                    | ClientError::DynamicDependencies { path } => path.user_display().to_string(),
                    _ => String::new(),
                };
                Self::Metadata {
                    package,
                    err: Box::new(err),
                }
            }
            err => {
                let url = match &err {
                    ClientError::BadJson { url, .. } => url.to_string(),
                    ClientError::Request(request) => {
                        request.url().map(ToString::to_string).unwrap_or_default()
                    }
                    _ => String::new(),
                };
                Self::Fetch {
                    url,
                    err: Box::new(err),
                }
            }
        }
    }
}
