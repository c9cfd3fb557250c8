//! Resolution error taxonomy.
//!
//! Every variant carries a stable Node-style code (see [`codes`]) so hosts
//! can surface failures as ordinary `require`/`import` exceptions.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const MODULE_NOT_FOUND: &str = "ERR_MODULE_NOT_FOUND";
    pub const CJS_MODULE_NOT_FOUND: &str = "MODULE_NOT_FOUND";
    pub const INVALID_MODULE_SPECIFIER: &str = "ERR_INVALID_MODULE_SPECIFIER";
    pub const INVALID_PACKAGE_CONFIG: &str = "ERR_INVALID_PACKAGE_CONFIG";
    pub const INVALID_PACKAGE_TARGET: &str = "ERR_INVALID_PACKAGE_TARGET";
    pub const UNSUPPORTED_ESM_URL_SCHEME: &str = "ERR_UNSUPPORTED_ESM_URL_SCHEME";
    pub const PACKAGE_PATH_NOT_EXPORTED: &str = "ERR_PACKAGE_PATH_NOT_EXPORTED";
    pub const PACKAGE_IMPORT_NOT_DEFINED: &str = "ERR_PACKAGE_IMPORT_NOT_DEFINED";
    pub const UNSUPPORTED_DIR_IMPORT: &str = "ERR_UNSUPPORTED_DIR_IMPORT";
    pub const UNKNOWN_FILE_EXTENSION: &str = "ERR_UNKNOWN_FILE_EXTENSION";
}

/// Which loader raised a not-found error; the two use different codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    CommonJs,
    Esm,
}

/// A module resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Cannot find {what} '{specifier}' imported from {base}")]
    NotFound {
        specifier: String,
        base: String,
        what: &'static str,
        loader: LoaderKind,
    },

    #[error("Invalid module \"{specifier}\" {reason}{}", from_base(.base.as_deref()))]
    InvalidModuleSpecifier {
        specifier: String,
        reason: String,
        base: Option<String>,
    },

    #[error("Invalid package config {path}{}{}", from_base(.base.as_deref()), message_suffix(.message.as_deref()))]
    InvalidPackageConfig {
        path: PathBuf,
        base: Option<String>,
        message: Option<String>,
    },

    #[error("Invalid \"{field}\" target {target} defined for '{subpath}' in the package config {package_json}{}", from_base(.base.as_deref()))]
    InvalidPackageTarget {
        package_json: PathBuf,
        subpath: String,
        target: String,
        field: &'static str,
        base: Option<String>,
    },

    #[error("Only file and data URLs are supported by the default ESM loader. Received protocol '{scheme}'")]
    UnsupportedUrlScheme { scheme: String },

    #[error("{}", path_not_exported_message(.subpath, .package_json, .base.as_deref()))]
    PathNotExported {
        package_json: PathBuf,
        subpath: String,
        base: Option<String>,
    },

    #[error("Package import specifier \"{specifier}\" is not defined in package {package_json}{}", from_base(.base.as_deref()))]
    PackageImportNotDefined {
        specifier: String,
        package_json: PathBuf,
        base: Option<String>,
    },

    #[error("Directory import '{path}' is not supported resolving ES modules imported from {base}")]
    UnsupportedDirImport { path: PathBuf, base: String },

    #[error("Unknown file extension \"{extension}\" for {path}")]
    UnknownFileExtension { extension: String, path: PathBuf },
}

impl ResolveError {
    /// The stable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound {
                loader: LoaderKind::CommonJs,
                ..
            } => codes::CJS_MODULE_NOT_FOUND,
            Self::NotFound { .. } => codes::MODULE_NOT_FOUND,
            Self::InvalidModuleSpecifier { .. } => codes::INVALID_MODULE_SPECIFIER,
            Self::InvalidPackageConfig { .. } => codes::INVALID_PACKAGE_CONFIG,
            Self::InvalidPackageTarget { .. } => codes::INVALID_PACKAGE_TARGET,
            Self::UnsupportedUrlScheme { .. } => codes::UNSUPPORTED_ESM_URL_SCHEME,
            Self::PathNotExported { .. } => codes::PACKAGE_PATH_NOT_EXPORTED,
            Self::PackageImportNotDefined { .. } => codes::PACKAGE_IMPORT_NOT_DEFINED,
            Self::UnsupportedDirImport { .. } => codes::UNSUPPORTED_DIR_IMPORT,
            Self::UnknownFileExtension { .. } => codes::UNKNOWN_FILE_EXTENSION,
        }
    }

    /// ESM not-found error for a module path.
    pub fn esm_not_found(specifier: impl Into<String>, base: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
            base: base.into(),
            what: "module",
            loader: LoaderKind::Esm,
        }
    }

    /// ESM not-found error for a package name.
    pub fn package_not_found(name: impl Into<String>, base: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: name.into(),
            base: base.into(),
            what: "package",
            loader: LoaderKind::Esm,
        }
    }

    /// CommonJS `MODULE_NOT_FOUND`.
    pub fn cjs_not_found(specifier: impl Into<String>, base: impl Into<String>) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
            base: base.into(),
            what: "module",
            loader: LoaderKind::CommonJs,
        }
    }

    /// Errors an array `exports` target may swallow while trying the next item.
    #[must_use]
    pub fn is_recoverable_target_error(&self) -> bool {
        matches!(
            self,
            Self::PathNotExported { .. } | Self::InvalidPackageTarget { .. }
        )
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

fn from_base(base: Option<&str>) -> String {
    base.map(|b| format!(" imported from {b}")).unwrap_or_default()
}

fn message_suffix(message: Option<&str>) -> String {
    message.map(|m| format!(". {m}")).unwrap_or_default()
}

fn path_not_exported_message(subpath: &str, package_json: &std::path::Path, base: Option<&str>) -> String {
    let dir = package_json
        .parent()
        .map_or_else(String::new, |p| format!("{}/", p.display()));
    if subpath == "." {
        format!("No \"exports\" main defined in {dir}package.json{}", from_base(base))
    } else {
        format!(
            "Package subpath '{subpath}' is not defined by \"exports\" in {dir}package.json{}",
            from_base(base)
        )
    }
}
