use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Return a [`NamedTempFile`] in the specified directory.
///
/// Sets the permissions of the temporary file to `0o666`, to match the non-temporary file default.
/// The umask is applied on top, as with a regular `File::create`.
#[cfg(unix)]
pub fn tempfile_in(path: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(path)
}

#[cfg(not(unix))]
pub fn tempfile_in(path: &Path) -> io::Result<NamedTempFile> {
    tempfile::Builder::new().tempfile_in(path)
}

/// Write `data` to `path` atomically: readers see either the previous contents or the new
/// contents, never a partial file.
pub fn write_atomic_sync(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(parent)?;
    let temp_file = tempfile_in(parent)?;
    fs_err::write(temp_file.path(), data.as_ref())?;
    temp_file.persist(path).map_err(|err| {
        io::Error::other(format!(
            "Failed to persist temporary file to {}: {}",
            path.user_display(),
            err.error
        ))
    })?;
    Ok(())
}

/// Remove a file, treating a missing file as success. Returns whether a file was removed.
pub fn remove_file_if_exists(path: impl AsRef<Path>) -> io::Result<bool> {
    match fs_err::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

pub trait Simplified {
    /// Render the path relative to the current working directory when it is inside it, for
    /// messages shown to the user.
    fn user_display(&self) -> Cow<'_, str>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn user_display(&self) -> Cow<'_, str> {
        let path = self.as_ref();
        let relative = std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(cwd).ok().map(PathBuf::from));
        match relative {
            Some(relative) if !relative.as_os_str().is_empty() => {
                Cow::Owned(relative.to_string_lossy().into_owned())
            }
            _ => path.to_string_lossy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");

        write_atomic_sync(&path, b"first").unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "first");

        write_atomic_sync(&path, b"second").unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "second");

        let leftovers = fs_err::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn remove_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(!remove_file_if_exists(&path).unwrap());
        fs_err::write(&path, "").unwrap();
        assert!(remove_file_if_exists(&path).unwrap());
    }
}
