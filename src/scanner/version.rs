//! Version resolution for applications deployed behind a `current` symlink.
//!
//! A version-managed application keeps its releases under `<app>/versions/`
//! and points `<app>/current` at the active one. The working tree of such an
//! application is the link target, which changes on every deployment.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DtsError, Result};
use crate::core::identity::Instance;
use crate::core::paths::{clean_path, resolve_against};

pub const VERSIONS_DIR: &str = "versions";
pub const CURRENT_LINK: &str = "current";

/// Components of a user-supplied work tree argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposed {
    pub work_tree: PathBuf,
    pub app_dir: PathBuf,
    pub instance: Instance,
}

/// Resolve the live working tree of an application root.
///
/// Returns `app_dir` unchanged when the platform has no symlinks or the
/// application has no `versions` directory.
pub fn resolve_working_tree(app_dir: &Path) -> Result<PathBuf> {
    if !cfg!(unix) {
        return Ok(app_dir.to_path_buf());
    }

    let versions = app_dir.join(VERSIONS_DIR);
    match fs::metadata(&versions) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(app_dir.to_path_buf()),
        Err(source) => return Err(DtsError::io(&versions, source)),
    }

    let link = app_dir.join(CURRENT_LINK);
    let meta = fs::symlink_metadata(&link).map_err(|source| DtsError::io(&link, source))?;
    if !meta.file_type().is_symlink() {
        return Err(DtsError::NotASymlink { path: link });
    }
    let target = fs::read_link(&link).map_err(|source| DtsError::io(&link, source))?;
    Ok(resolve_against(app_dir, &target))
}

/// Split an `init` argument into work tree, application dir and instance.
///
/// A symlink argument (typically `<app>/current`) yields its target as the
/// work tree and its parent as the application dir; a directory argument is
/// both. Regular files are rejected.
pub fn decompose(work_tree_arg: &Path) -> Result<Decomposed> {
    let cleaned = clean_path(work_tree_arg);
    let meta =
        fs::symlink_metadata(&cleaned).map_err(|source| DtsError::io(&cleaned, source))?;

    let (work_tree, app_dir) = if meta.file_type().is_symlink() {
        let parent = cleaned
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let target = fs::read_link(&cleaned).map_err(|source| DtsError::io(&cleaned, source))?;
        let work_tree = resolve_against(&parent, &target);
        let target_meta =
            fs::metadata(&work_tree).map_err(|source| DtsError::io(&work_tree, source))?;
        if !target_meta.is_dir() {
            return Err(DtsError::NotADirectory { path: work_tree });
        }
        (work_tree, clean_path(&parent))
    } else if meta.is_dir() {
        (cleaned.clone(), cleaned)
    } else {
        return Err(DtsError::NotADirectory { path: cleaned });
    };

    let instance = Instance::for_path(&app_dir);
    Ok(Decomposed {
        work_tree,
        app_dir,
        instance,
    })
}

/// Whether an entry's work tree differs from its application root, i.e. the
/// application uses the version-symlink convention.
pub fn is_version_managed(work_tree: &Path, app_dir: &Path) -> bool {
    clean_path(work_tree) != clean_path(app_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unversioned_app_resolves_to_itself() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(resolve_working_tree(tmp.path()).unwrap(), tmp.path());
    }

    #[cfg(unix)]
    #[test]
    fn versioned_app_resolves_current_link() {
        let tmp = TempDir::new().unwrap();
        let v2 = tmp.path().join("versions").join("v2");
        fs::create_dir_all(&v2).unwrap();
        std::os::unix::fs::symlink(&v2, tmp.path().join("current")).unwrap();

        assert_eq!(resolve_working_tree(tmp.path()).unwrap(), v2);
    }

    #[cfg(unix)]
    #[test]
    fn relative_current_link_is_joined_to_app_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("versions/v7")).unwrap();
        std::os::unix::fs::symlink("versions/v7", tmp.path().join("current")).unwrap();

        assert_eq!(
            resolve_working_tree(tmp.path()).unwrap(),
            tmp.path().join("versions").join("v7")
        );
    }

    #[cfg(unix)]
    #[test]
    fn regular_current_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("versions")).unwrap();
        fs::write(tmp.path().join("current"), b"v1").unwrap();

        let err = resolve_working_tree(tmp.path()).unwrap_err();
        assert!(matches!(err, DtsError::NotASymlink { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn missing_current_link_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("versions")).unwrap();
        let err = resolve_working_tree(tmp.path()).unwrap_err();
        assert_eq!(err.code(), "DTS-3001");
    }

    #[test]
    fn directory_argument_is_its_own_app_dir() {
        let tmp = TempDir::new().unwrap();
        let arg = format!("{}/", tmp.path().display());
        let parts = decompose(Path::new(&arg)).unwrap();
        assert_eq!(parts.work_tree, tmp.path());
        assert_eq!(parts.app_dir, tmp.path());
        assert_eq!(parts.instance, Instance::for_path(tmp.path()));
        assert!(!is_version_managed(&parts.work_tree, &parts.app_dir));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_argument_splits_into_target_and_parent() {
        let tmp = TempDir::new().unwrap();
        let v1 = tmp.path().join("versions").join("v1");
        fs::create_dir_all(&v1).unwrap();
        let current = tmp.path().join("current");
        std::os::unix::fs::symlink(&v1, &current).unwrap();

        let parts = decompose(&current).unwrap();
        assert_eq!(parts.work_tree, v1);
        assert_eq!(parts.app_dir, tmp.path());
        assert_eq!(parts.instance, Instance::for_path(tmp.path()));
        assert!(is_version_managed(&parts.work_tree, &parts.app_dir));
    }

    #[test]
    fn file_argument_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("app.jar");
        fs::write(&file, b"bin").unwrap();
        let err = decompose(&file).unwrap_err();
        assert!(matches!(err, DtsError::NotADirectory { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("release.tar");
        fs::write(&file, b"bin").unwrap();
        let link = tmp.path().join("current");
        std::os::unix::fs::symlink(&file, &link).unwrap();
        let err = decompose(&link).unwrap_err();
        assert!(matches!(err, DtsError::NotADirectory { .. }), "{err}");
    }
}
