use crate::error::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default ignore rule: anything inside a `node_modules` directory.
pub const DEFAULT_IGNORE: &str = "(?:^|/)node_modules/";

/// Environment variables honored the same way node honors them.
pub const PRESERVE_SYMLINKS_ENV: &str = "NODE_PRESERVE_SYMLINKS";
pub const PRESERVE_SYMLINKS_MAIN_ENV: &str = "NODE_PRESERVE_SYMLINKS_MAIN";

/// Resolver options for one service instance.
///
/// Deserializes from the camelCase shape used in a tsconfig `"ts-node"` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverOptions {
    /// Working directory; ignore rules and `moduleTypes` are relative to it.
    pub cwd: PathBuf,

    /// Prefer TypeScript sources over same-named JavaScript files.
    pub prefer_ts_exts: bool,

    /// Install the CommonJS `.js` -> TS substitution hook.
    pub experimental_resolver: bool,

    /// Whether ESM imports may omit extensions.
    pub experimental_specifier_resolution: SpecifierResolution,

    /// Let the type-checking resolver accept `.ts` in import specifiers.
    pub experimental_ts_import_specifiers: bool,

    /// Per-pattern module type overrides, in declaration order.
    pub module_types: IndexMap<String, ModuleTypeOverride>,

    /// Ignore regexes, matched against cwd-relative paths.
    pub ignore: Vec<String>,

    /// Disable the ignore regexes entirely.
    pub skip_ignore: bool,

    /// Only compile files inside `scope_dir`.
    pub scope: bool,

    /// Directory limiting compilation when `scope` is set (defaults to cwd).
    pub scope_dir: Option<PathBuf>,

    /// Do not realpath resolved modules.
    pub preserve_symlinks: bool,

    /// Do not realpath the main entry point.
    pub preserve_symlinks_main: bool,
}

/// ESM specifier resolution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpecifierResolution {
    /// Probe for omitted extensions and directory indexes.
    #[default]
    Node,
    /// Node's strict behavior: extensions are mandatory.
    Explicit,
}

/// A `moduleTypes` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleTypeOverride {
    Cjs,
    Esm,
    Package,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            prefer_ts_exts: false,
            experimental_resolver: false,
            experimental_specifier_resolution: SpecifierResolution::default(),
            experimental_ts_import_specifiers: false,
            module_types: IndexMap::new(),
            ignore: vec![DEFAULT_IGNORE.to_string()],
            skip_ignore: false,
            scope: false,
            scope_dir: None,
            preserve_symlinks: false,
            preserve_symlinks_main: false,
        }
    }
}

impl ResolverOptions {
    /// Create options rooted at the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Load options from a JSON file.
    ///
    /// Relative `cwd`/`scopeDir` values are resolved against the file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut options: Self =
            serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(dir) = path.parent() {
            if options.cwd.is_relative() {
                options.cwd = dir.join(&options.cwd);
            }
            if let Some(scope_dir) = options.scope_dir.as_mut() {
                if scope_dir.is_relative() {
                    *scope_dir = dir.join(&*scope_dir);
                }
            }
        }
        Ok(options)
    }

    /// Apply `NODE_PRESERVE_SYMLINKS` / `NODE_PRESERVE_SYMLINKS_MAIN`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if env_flag(PRESERVE_SYMLINKS_ENV) {
            self.preserve_symlinks = true;
        }
        if env_flag(PRESERVE_SYMLINKS_MAIN_ENV) {
            self.preserve_symlinks_main = true;
        }
        self
    }

    #[must_use]
    pub fn with_prefer_ts_exts(mut self, prefer: bool) -> Self {
        self.prefer_ts_exts = prefer;
        self
    }

    #[must_use]
    pub fn with_experimental_resolver(mut self, enabled: bool) -> Self {
        self.experimental_resolver = enabled;
        self
    }

    #[must_use]
    pub fn with_specifier_resolution(mut self, mode: SpecifierResolution) -> Self {
        self.experimental_specifier_resolution = mode;
        self
    }

    #[must_use]
    pub fn with_ts_import_specifiers(mut self, enabled: bool) -> Self {
        self.experimental_ts_import_specifiers = enabled;
        self
    }

    #[must_use]
    pub fn with_module_type(mut self, pattern: impl Into<String>, ty: ModuleTypeOverride) -> Self {
        self.module_types.insert(pattern.into(), ty);
        self
    }

    #[must_use]
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    #[must_use]
    pub fn with_skip_ignore(mut self, skip: bool) -> Self {
        self.skip_ignore = skip;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope_dir: Option<PathBuf>) -> Self {
        self.scope = true;
        self.scope_dir = scope_dir;
        self
    }

    #[must_use]
    pub fn with_preserve_symlinks(mut self, preserve: bool) -> Self {
        self.preserve_symlinks = preserve;
        self
    }

    #[must_use]
    pub fn with_preserve_symlinks_main(mut self, preserve: bool) -> Self {
        self.preserve_symlinks_main = preserve;
        self
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// Facts about the project's compiler configuration that shape resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerFacts {
    /// `compilerOptions.allowJs`
    pub allow_js: bool,
    /// Whether `compilerOptions.jsx` is set.
    pub jsx: bool,
    /// Version of the TypeScript compiler in use.
    pub typescript_version: semver::Version,
}

impl Default for CompilerFacts {
    fn default() -> Self {
        Self {
            allow_js: false,
            jsx: false,
            typescript_version: semver::Version::new(5, 0, 0),
        }
    }
}

impl CompilerFacts {
    #[must_use]
    pub fn with_allow_js(mut self, allow_js: bool) -> Self {
        self.allow_js = allow_js;
        self
    }

    #[must_use]
    pub fn with_jsx(mut self, jsx: bool) -> Self {
        self.jsx = jsx;
        self
    }

    #[must_use]
    pub fn with_typescript_version(mut self, version: semver::Version) -> Self {
        self.typescript_version = version;
        self
    }

    /// `.mts`/`.cts` landed in TypeScript 4.5.
    #[must_use]
    pub fn supports_mts_cts(&self) -> bool {
        self.typescript_version >= semver::Version::new(4, 5, 0)
    }
}
