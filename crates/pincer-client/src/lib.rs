pub use error::ClientError;
pub use pypi::{DEFAULT_INDEX_URL, PypiRepository, PypiRepositoryBuilder};
pub use pyproject::{StaticMetadata, is_project_directory, project_name};
pub use tags::{Arch, Os, Platform, WheelTags};

mod error;
mod json;
mod pypi;
mod pyproject;
mod tags;
