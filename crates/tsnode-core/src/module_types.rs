//! Per-pattern CommonJS/ESM overrides (`moduleTypes`).
//!
//! Patterns use tsconfig `exclude` wildcard rules and are resolved against a
//! base directory. When several patterns match a file, the one declared last
//! wins.

use crate::config::ModuleTypeOverride;
use crate::error::Error;
use indexmap::IndexMap;
use regex_lite::Regex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::trace;
use tsnode_util::path::{normalize, normalize_slashes};

/// Result of classifying one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleTypeClassification {
    pub module_type: ModuleTypeOverride,
}

impl ModuleTypeClassification {
    const PACKAGE: Self = Self {
        module_type: ModuleTypeOverride::Package,
    };
}

#[derive(Debug)]
struct CompiledPattern {
    source: String,
    regex: Regex,
    module_type: ModuleTypeOverride,
}

/// Matches files against the configured `moduleTypes` patterns.
#[derive(Debug, Default)]
pub struct ModuleTypeClassifier {
    patterns: Vec<CompiledPattern>,
    memo: RefCell<HashMap<PathBuf, ModuleTypeClassification>>,
}

impl ModuleTypeClassifier {
    /// Compile every pattern once, relative to `base`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPattern`] if a pattern cannot be compiled.
    pub fn new(
        module_types: &IndexMap<String, ModuleTypeOverride>,
        base: &Path,
    ) -> Result<Self, Error> {
        let patterns = module_types
            .iter()
            .map(|(pattern, module_type)| {
                let source = pattern_to_regex(base, pattern);
                let regex = Regex::new(&source).map_err(|source| Error::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
                Ok(CompiledPattern {
                    source,
                    regex,
                    module_type: *module_type,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            patterns,
            memo: RefCell::new(HashMap::new()),
        })
    }

    /// Classify `path`. Files matching no pattern are `package`.
    #[must_use]
    pub fn classify_module(&self, path: &Path) -> ModuleTypeClassification {
        if self.patterns.is_empty() {
            return ModuleTypeClassification::PACKAGE;
        }
        if let Some(hit) = self.memo.borrow().get(path) {
            return *hit;
        }

        let normalized = normalize_slashes(&path.to_string_lossy());
        let classification = self
            .patterns
            .iter()
            .rev()
            .find(|p| p.regex.is_match(&normalized))
            .map_or(ModuleTypeClassification::PACKAGE, |p| {
                trace!(path = %normalized, pattern = %p.source, module_type = ?p.module_type, "moduleTypes match");
                ModuleTypeClassification {
                    module_type: p.module_type,
                }
            });

        self.memo
            .borrow_mut()
            .insert(path.to_path_buf(), classification);
        classification
    }

    /// Drop all memoized classifications.
    pub fn invalidate(&self) {
        self.memo.borrow_mut().clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Translate a tsconfig-style wildcard into an anchored regex source.
///
/// `*` and `?` never cross a `/`; a `**` segment spans any number of
/// directories; every pattern also matches whatever lies beneath it.
fn pattern_to_regex(base: &Path, pattern: &str) -> String {
    let joined = normalize(&base.join(normalize_slashes(pattern)));
    let joined = normalize_slashes(&joined.to_string_lossy());

    let mut body = String::new();
    for (i, segment) in joined.split('/').enumerate() {
        if i == 0 {
            body.push_str(&regex_lite::escape(segment));
            continue;
        }
        if segment.is_empty() {
            continue;
        }
        if segment == "**" {
            body.push_str("(/.+?)?");
            continue;
        }
        body.push('/');
        for ch in segment.chars() {
            match ch {
                '*' => body.push_str("[^/]*"),
                '?' => body.push_str("[^/]"),
                other => body.push_str(&regex_lite::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
    }

    format!("^({body})($|/)")
}
