//! Shared path manipulation utilities.

use std::path::{Component, Path, PathBuf};

/// Lexically clean a path: drop `.` components, fold `name/..` pairs and
/// strip trailing separators. Does not touch the filesystem and never makes a
/// relative path absolute, so the cleaned text is what gets fed to
/// [`Instance::for_path`](crate::core::identity::Instance::for_path).
pub fn clean_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir | Component::Prefix(..)) => {}
                _ => components.push(component),
            },
        }
    }
    if components.is_empty() {
        return PathBuf::from(".");
    }
    components.into_iter().collect()
}

/// Join `target` onto `base` unless it is already absolute, then clean it.
///
/// Used for symlink targets, which are relative to the link's parent.
pub fn resolve_against(base: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        clean_path(target)
    } else {
        clean_path(&base.join(target))
    }
}

/// Render a path as the string form stored in the registry.
pub fn display_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
