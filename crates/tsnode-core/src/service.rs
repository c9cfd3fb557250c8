//! One compiler instance's resolution state.
//!
//! The service owns the configuration, the derived extension policy and
//! every cache the resolvers share. Resolvers hold an `Rc<Service>`.

use crate::buckets::InternalBucketTracker;
use crate::config::{CompilerFacts, ResolverOptions};
use crate::error::Error;
use crate::extensions::ExtensionPolicy;
use crate::module_types::ModuleTypeClassifier;
use crate::resolver::PackageConfigCache;
use regex_lite::Regex;
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;
use tsnode_util::fs::{FileSystem, RealFs};
use tsnode_util::path::{extname, normalize_slashes, relative};

#[derive(Debug)]
pub struct Service {
    options: ResolverOptions,
    facts: CompilerFacts,
    extensions: ExtensionPolicy,
    fs: Rc<dyn FileSystem>,
    package_configs: PackageConfigCache,
    module_types: ModuleTypeClassifier,
    buckets: InternalBucketTracker,
    ignore: Vec<Regex>,
    enabled: Cell<bool>,
}

impl Service {
    /// Create a service backed by the real filesystem.
    pub fn new(options: ResolverOptions, facts: CompilerFacts) -> Result<Self, Error> {
        Self::with_fs(options, facts, Rc::new(RealFs))
    }

    /// Create a service backed by `fs`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPattern`] if an ignore regex or a
    /// `moduleTypes` pattern does not compile.
    pub fn with_fs(
        options: ResolverOptions,
        facts: CompilerFacts,
        fs: Rc<dyn FileSystem>,
    ) -> Result<Self, Error> {
        let extensions = ExtensionPolicy::new(&options, &facts);
        let module_types = ModuleTypeClassifier::new(&options.module_types, &options.cwd)?;
        let ignore = if options.skip_ignore {
            Vec::new()
        } else {
            options
                .ignore
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        debug!(
            cwd = %options.cwd.display(),
            compiled = ?extensions.compiled,
            "service created"
        );

        Ok(Self {
            package_configs: PackageConfigCache::new(Rc::clone(&fs)),
            buckets: InternalBucketTracker::new(),
            enabled: Cell::new(true),
            options,
            facts,
            extensions,
            fs,
            module_types,
            ignore,
        })
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    #[must_use]
    pub fn facts(&self) -> &CompilerFacts {
        &self.facts
    }

    #[must_use]
    pub fn extensions(&self) -> &ExtensionPolicy {
        &self.extensions
    }

    #[must_use]
    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    #[must_use]
    pub fn package_configs(&self) -> &PackageConfigCache {
        &self.package_configs
    }

    #[must_use]
    pub fn module_types(&self) -> &ModuleTypeClassifier {
        &self.module_types
    }

    #[must_use]
    pub fn buckets(&self) -> &InternalBucketTracker {
        &self.buckets
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Whether `path` should be left to the runtime instead of compiled.
    #[must_use]
    pub fn ignored(&self, path: &Path) -> bool {
        if !self.enabled() {
            return true;
        }

        let ext = extname(&path.to_string_lossy()).to_string();
        if !self.extensions.is_compiled(&ext) {
            return true;
        }

        if self.options.scope {
            let scope_dir = self.options.scope_dir.as_deref().unwrap_or(&self.options.cwd);
            if !path.starts_with(scope_dir) {
                return true;
            }
        }

        let rel = relative(&self.options.cwd, path);
        let rel = normalize_slashes(&rel.to_string_lossy());
        self.ignore.iter().any(|re| re.is_match(&rel))
    }
}
