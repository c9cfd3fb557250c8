//! Memoized package.json loading.
//!
//! Each manifest is read at most once per service: the first lookup reads
//! and parses it, later lookups return the same [`Rc`]. Missing manifests
//! are cached as `exists: false` sentinels and malformed ones as
//! `is_valid: false`; neither is an error until something needs the config.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::trace;
use tsnode_util::fs::FileSystem;
use url::Url;

/// The package.json `"type"` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageType {
    Module,
    CommonJs,
    #[default]
    None,
}

/// The parts of a package.json that resolution reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageConfig {
    /// Absolute path to the package.json.
    pub path: PathBuf,
    pub exists: bool,
    pub main: Option<String>,
    pub name: Option<String>,
    pub pkg_type: PackageType,
    pub exports: Option<Value>,
    pub imports: Option<Value>,
    /// False when the file exists but is not valid JSON.
    pub is_valid: bool,
}

impl PackageConfig {
    /// Sentinel for a package.json that does not exist.
    #[must_use]
    pub fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            main: None,
            name: None,
            pkg_type: PackageType::None,
            exports: None,
            imports: None,
            is_valid: true,
        }
    }

    fn invalid(path: PathBuf) -> Self {
        Self {
            exists: true,
            is_valid: false,
            ..Self::missing(path)
        }
    }

    /// Build a config from manifest text.
    #[must_use]
    pub fn parse(path: PathBuf, source: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(source) else {
            return Self::invalid(path);
        };

        let string_field = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);
        let pkg_type = match value.get("type").and_then(Value::as_str) {
            Some("module") => PackageType::Module,
            Some("commonjs") => PackageType::CommonJs,
            _ => PackageType::None,
        };

        Self {
            main: string_field("main"),
            name: string_field("name"),
            pkg_type,
            exports: value.get("exports").cloned(),
            imports: value.get("imports").cloned(),
            exists: true,
            is_valid: true,
            path,
        }
    }

    /// Directory containing this package.json.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }
}

/// Append-only cache of package.json configs, keyed by absolute path.
#[derive(Debug)]
pub struct PackageConfigCache {
    fs: Rc<dyn FileSystem>,
    entries: RefCell<HashMap<PathBuf, Rc<PackageConfig>>>,
}

impl PackageConfigCache {
    #[must_use]
    pub fn new(fs: Rc<dyn FileSystem>) -> Self {
        Self {
            fs,
            entries: RefCell::new(HashMap::new()),
        }
    }

    /// Load the package.json at `path`, reading it at most once.
    #[must_use]
    pub fn get_package_config(&self, path: &Path) -> Rc<PackageConfig> {
        if let Some(cached) = self.entries.borrow().get(path) {
            return Rc::clone(cached);
        }

        trace!(path = %path.display(), "reading package.json");
        let config = match self.fs.read_to_string(path) {
            Ok(source) => PackageConfig::parse(path.to_path_buf(), &source),
            Err(_) => PackageConfig::missing(path.to_path_buf()),
        };
        let config = Rc::new(config);

        self.entries
            .borrow_mut()
            .entry(path.to_path_buf())
            .or_insert(config)
            .clone()
    }

    /// Find the package.json governing `start`, walking up one directory at a time.
    ///
    /// Stops at the first existing manifest, at a `node_modules/package.json`
    /// boundary, or at the filesystem root; the latter two return a
    /// non-existent sentinel.
    #[must_use]
    pub fn get_package_scope_config(&self, start: &Url) -> Rc<PackageConfig> {
        let Ok(mut candidate) = start.join("./package.json") else {
            return Rc::new(PackageConfig::missing(PathBuf::from("/package.json")));
        };

        loop {
            if candidate.path().ends_with("node_modules/package.json") {
                break;
            }

            let Ok(path) = candidate.to_file_path() else {
                break;
            };
            let config = self.get_package_config(&path);
            if config.exists {
                return config;
            }

            let Ok(parent) = candidate.join("../package.json") else {
                break;
            };
            if parent.path() == candidate.path() {
                break;
            }
            candidate = parent;
        }

        let path = candidate
            .to_file_path()
            .unwrap_or_else(|()| PathBuf::from(candidate.path()));
        Rc::new(PackageConfig::missing(path))
    }

    /// Same as [`Self::get_package_scope_config`] for the path of a file.
    #[must_use]
    pub fn get_package_scope_config_for_path(&self, path: &Path) -> Rc<PackageConfig> {
        match Url::from_file_path(path) {
            Ok(url) => self.get_package_scope_config(&url),
            Err(()) => Rc::new(PackageConfig::missing(path.join("package.json"))),
        }
    }

    /// Forget one manifest so the next lookup re-reads it.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.borrow_mut().remove(path).is_some()
    }

    /// Number of cached manifests, present or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
