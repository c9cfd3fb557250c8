//! Specifier classification and bare package name parsing.

use super::error::ResolveError;

/// Node.js core modules, without the `node:` prefix.
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "sys",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Whether `specifier` names a core module, with or without `node:`.
#[must_use]
pub fn is_builtin(specifier: &str) -> bool {
    let name = specifier.strip_prefix("node:").unwrap_or(specifier);
    BUILTIN_MODULES.contains(&name)
}

/// `./`, `../`, `/`, or exactly `.` / `..`.
#[must_use]
pub fn is_relative_specifier(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Relative or absolute path specifier (ESM `shouldBeTreatedAsRelativeOrAbsolutePath`).
#[must_use]
pub fn is_relative_or_absolute(specifier: &str) -> bool {
    !specifier.is_empty() && (specifier.starts_with('/') || is_relative_specifier(specifier))
}

/// A bare specifier split into package name and exports subpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageName<'a> {
    pub name: &'a str,
    /// `"."` for the package root, otherwise `"./rest"`.
    pub subpath: String,
    pub is_scoped: bool,
}

/// Split `specifier` into package name and subpath.
///
/// # Errors
/// `InvalidModuleSpecifier` for an empty or malformed name (leading `.`,
/// `%`, `\`, or a scope without a name).
pub fn parse_package_name<'a>(
    specifier: &'a str,
    base: &str,
) -> Result<PackageName<'a>, ResolveError> {
    let invalid = || ResolveError::InvalidModuleSpecifier {
        specifier: specifier.to_string(),
        reason: "is not a valid package name".to_string(),
        base: Some(base.to_string()),
    };

    let mut separator = specifier.find('/');
    let is_scoped = specifier.starts_with('@');
    if is_scoped {
        match separator {
            None => return Err(invalid()),
            Some(first) => {
                separator = specifier[first + 1..].find('/').map(|i| first + 1 + i);
            }
        }
    }

    let name = separator.map_or(specifier, |i| &specifier[..i]);
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('%')
        || name.contains('\\')
        || (is_scoped && name.ends_with('/'))
    {
        return Err(invalid());
    }

    let subpath = format!(".{}", &specifier[name.len()..]);
    Ok(PackageName {
        name,
        subpath,
        is_scoped,
    })
}
