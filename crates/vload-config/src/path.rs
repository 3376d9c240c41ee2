//! Virtual path utilities shared by the store, the file table and the shim.
//!
//! Every path that names a virtual file goes through [`normalize_virtual`]
//! before it is used as a table key, so `./id1/gfx.wad` and `id1/gfx.wad`
//! resolve to the same entry.

use std::path::{Component, Path, PathBuf};

/// Normalize a virtual path into its table key.
///
/// Strips any leading `./` segments. Nothing else is rewritten: the key is
/// otherwise the path exactly as the application spelled it.
///
/// # Example
/// ```
/// use vload_config::path::normalize_virtual;
/// assert_eq!(normalize_virtual("./id1/config.cfg"), "id1/config.cfg");
/// ```
pub fn normalize_virtual(path: &str) -> String {
    let mut rest = path;
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Parent directory of a normalized virtual path, or `""` at top level.
pub fn parent_dir(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Convert a virtual path into a path relative to a store root.
///
/// Leading `/` is dropped. Returns `None` when the path would escape the
/// root through a `..` component or names no file at all.
pub fn store_relative(name: &str) -> Option<PathBuf> {
    let trimmed = name.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let relative = Path::new(trimmed);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        None
    } else {
        Some(relative.to_path_buf())
    }
}

/// Expand a leading `~` to the home directory.
///
/// Falls back to `/tmp` when the home directory cannot be determined.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_dot_slash() {
        assert_eq!(normalize_virtual("./a.cfg"), "a.cfg");
        assert_eq!(normalize_virtual("././id1/a.cfg"), "id1/a.cfg");
        assert_eq!(normalize_virtual("id1/a.cfg"), "id1/a.cfg");
    }

    #[test]
    fn test_normalize_keeps_other_prefixes() {
        assert_eq!(normalize_virtual("../a.cfg"), "../a.cfg");
        assert_eq!(normalize_virtual("/abs/a.cfg"), "/abs/a.cfg");
        assert_eq!(normalize_virtual("."), ".");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("id1/maps/e1m3.bsp"), "id1/maps");
        assert_eq!(parent_dir("id1/config.cfg"), "id1");
        assert_eq!(parent_dir("quake.rc"), "");
    }

    #[test]
    fn test_store_relative_rejects_escape() {
        assert_eq!(store_relative("id1/a.cfg"), Some(PathBuf::from("id1/a.cfg")));
        assert_eq!(store_relative("/id1/a.cfg"), Some(PathBuf::from("id1/a.cfg")));
        assert_eq!(store_relative("../etc/passwd"), None);
        assert_eq!(store_relative("id1/../../x"), None);
        assert_eq!(store_relative(""), None);
        assert_eq!(store_relative("/"), None);
    }

    #[test]
    fn test_expand_home() {
        let plain = expand_home("/var/lib/vload");
        assert_eq!(plain, PathBuf::from("/var/lib/vload"));

        let expanded = expand_home("~/.vload/store");
        assert!(expanded.ends_with(".vload/store"));
        assert!(!expanded.starts_with("~"));
    }
}
