//! Pure path helpers shared by the resolvers.

use std::path::{Component, Path, PathBuf};

/// Replace backslashes with forward slashes.
#[must_use]
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Node-style `path.extname`: the last `.`-suffix of the final segment,
/// including the dot. Dotfiles such as `.bashrc` have no extension.
#[must_use]
pub fn extname(path: &str) -> &str {
    let base_start = path.rfind(['/', '\\']).map_or(0, |i| i + 1);
    let base = &path[base_start..];
    match base.rfind('.') {
        Some(0) | None => "",
        Some(i) => &base[i..],
    }
}

/// Whether any component of `path` is a `node_modules` directory.
#[must_use]
pub fn has_node_modules_segment(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}

/// Lexically resolve `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Lexical relative path from directory `from` to `to` (Node's `path.relative`).
#[must_use]
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component);
    }
    out
}
