//! ESM loader hooks.
//!
//! Node has shipped two hook APIs: the legacy trio (`resolve`, `getFormat`,
//! `transformSource`) and the newer `resolve` + `load` pair, where `load`
//! composes the other two. [`EsmHooks`] implements both; each hook receives
//! the next stage of the pipeline explicitly.

mod format;

pub use format::{NodeDefaultLoad, NodeDefaultResolve, NodeGetFormat};

use crate::config::ModuleTypeOverride;
use crate::extensions::{ExtensionPolicy, NODE_DOES_NOT_UNDERSTAND};
use crate::resolver::{
    install_commonjs_resolve_hook, CjsRequest, CjsResolution, CjsResolverChain, EsmResolution,
    EsmResolver, ResolveError,
};
use crate::service::Service;
use futures::future::LocalBoxFuture;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;
use tsnode_util::path::extname;
use url::Url;

/// Node's module format vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Builtin,
    #[serde(rename = "commonjs")]
    CommonJs,
    Module,
    Json,
    Wasm,
    Dynamic,
}

impl Format {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::CommonJs => "commonjs",
            Self::Module => "module",
            Self::Json => "json",
            Self::Wasm => "wasm",
            Self::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which hook API the running node expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookGeneration {
    /// `resolve`, `getFormat`, `transformSource`.
    Legacy,
    /// `resolve`, `load`.
    ResolveLoad,
}

impl HookGeneration {
    /// `load` replaced the legacy hooks in node 16.12.0.
    #[must_use]
    pub fn for_node_version(version: &semver::Version) -> Self {
        if *version >= semver::Version::new(16, 12, 0) {
            Self::ResolveLoad
        } else {
            Self::Legacy
        }
    }

    /// Hook names exported for this generation.
    #[must_use]
    pub fn hook_names(self) -> &'static [&'static str] {
        match self {
            Self::Legacy => &["resolve", "getFormat", "transformSource"],
            Self::ResolveLoad => &["resolve", "load"],
        }
    }
}

/// Loader pipeline failures.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{source}\n\nHint:\ntsnode is configured to ignore this file.\nIf you want tsnode to handle this file, consider enabling the \"skipIgnore\" option or adjusting your \"ignore\" patterns.")]
    Ignored {
        path: PathBuf,
        #[source]
        source: Box<LoaderError>,
    },

    #[error("Failed to compile {path}: {message}")]
    Compile { path: PathBuf, message: String },

    #[error("Failed to load raw source: format was '{format}' and url was '{url}'")]
    MissingSource { url: String, format: Format },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoaderError {
    /// The Node-style code, when the failure came from resolution.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Resolve(e) => Some(e.code()),
            Self::Ignored { source, .. } => source.code(),
            _ => None,
        }
    }
}

/// Context passed to `resolve`.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// The importing module; `None` for the entry point.
    pub parent_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutput {
    pub url: Url,
    /// Set when resolution already knows the format.
    pub format: Option<Format>,
}

/// Context passed to `load`.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    pub format: Option<Format>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutput {
    pub format: Format,
    /// `None` for formats node loads itself (builtins, CommonJS).
    pub source: Option<String>,
}

/// The next `resolve` stage.
pub trait NextResolve {
    fn resolve<'a>(
        &'a self,
        specifier: &'a str,
        context: &'a ResolveContext,
    ) -> LocalBoxFuture<'a, Result<ResolveOutput, LoaderError>>;
}

/// The next `getFormat` stage.
pub trait NextGetFormat {
    fn get_format<'a>(&'a self, url: &'a Url) -> LocalBoxFuture<'a, Result<Format, LoaderError>>;
}

/// The next `load` stage; yields raw source.
pub trait NextLoad {
    fn load<'a>(
        &'a self,
        url: &'a Url,
        format: Format,
    ) -> LocalBoxFuture<'a, Result<Option<String>, LoaderError>>;
}

/// Turns TypeScript source into JavaScript.
pub trait SourceCompiler {
    fn compile(&self, code: &str, path: &Path) -> Result<String, LoaderError>;
}

/// The TypeScript-aware ESM hooks for one service.
#[derive(Debug)]
pub struct EsmHooks<C> {
    resolver: EsmResolver,
    require: CjsResolverChain,
    default_get_format: NodeGetFormat,
    compiler: C,
    /// Entry points only CommonJS resolution could find.
    commonjs_entrypoints: RefCell<HashSet<Url>>,
}

impl<C> EsmHooks<C> {
    #[must_use]
    pub fn new(service: Rc<Service>, compiler: C) -> Self {
        let require = CjsResolverChain::for_service(Rc::clone(&service));
        install_commonjs_resolve_hook(&require, &service);
        Self {
            resolver: EsmResolver::new(Rc::clone(&service)),
            default_get_format: NodeGetFormat::new(service),
            require,
            compiler,
            commonjs_entrypoints: RefCell::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn service(&self) -> &Rc<Service> {
        self.resolver.service()
    }

    /// The `resolve` hook.
    pub async fn resolve(
        &self,
        specifier: &str,
        context: &ResolveContext,
        next: &dyn NextResolve,
    ) -> Result<ResolveOutput, LoaderError> {
        let is_entry = context.parent_url.is_none();
        let base = match &context.parent_url {
            Some(url) => url.clone(),
            None => self.cwd_url()?,
        };

        match self.resolver.resolve(specifier, &base, is_entry) {
            Ok(EsmResolution::Resolved(url)) => Ok(ResolveOutput { url, format: None }),
            Ok(EsmResolution::Defer) => next.resolve(specifier, context).await,
            Err(err) if is_entry => match self.entrypoint_fallback(specifier) {
                Some(output) => Ok(output),
                None => Err(err.into()),
            },
            Err(err) => Err(err.into()),
        }
    }

    fn cwd_url(&self) -> Result<Url, ResolveError> {
        let cwd = &self.service().options().cwd;
        Url::from_directory_path(cwd).map_err(|()| ResolveError::InvalidModuleSpecifier {
            specifier: cwd.display().to_string(),
            reason: "is not an absolute directory".to_string(),
            base: None,
        })
    }

    /// Resolve an entry point the ESM resolver rejected through `require`
    /// from the working directory.
    fn entrypoint_fallback(&self, specifier: &str) -> Option<ResolveOutput> {
        let as_path = Url::parse(specifier)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
            .map(|p| p.display().to_string());
        let cjs_specifier = as_path.as_deref().unwrap_or(specifier);

        let CjsResolution::File(path) = self.require.resolve(CjsRequest::main(cjs_specifier)).ok()?
        else {
            return None;
        };
        let url = Url::from_file_path(&path).ok()?;
        debug!(specifier, resolved = %url, "entry point resolved via CommonJS fallback");
        self.commonjs_entrypoints.borrow_mut().insert(url.clone());
        Some(ResolveOutput {
            url,
            format: Some(Format::CommonJs),
        })
    }

    /// The legacy `getFormat` hook.
    pub async fn get_format(
        &self,
        url: &Url,
        next: &dyn NextGetFormat,
    ) -> Result<Format, LoaderError> {
        if url.scheme() != "file" {
            return self.with_entrypoint_fallback(url, next.get_format(url).await);
        }

        let path = url
            .to_file_path()
            .map_err(|()| ResolveError::InvalidModuleSpecifier {
                specifier: url.to_string(),
                reason: "is not a local file URL".to_string(),
                base: None,
            })?;
        let ext = extname(&path.to_string_lossy()).to_string();
        let ignored = self.service().ignored(&path);

        let node_equivalent = ExtensionPolicy::node_equivalents(&ext).and_then(|e| e.first());
        let node_says = match node_equivalent {
            Some(equivalent) if !ignored => {
                let mut emitted = OsString::from(path.as_os_str());
                emitted.push(equivalent);
                let emitted_url = Url::from_file_path(PathBuf::from(emitted)).map_err(|()| {
                    ResolveError::InvalidModuleSpecifier {
                        specifier: url.to_string(),
                        reason: "is not a local file URL".to_string(),
                        base: None,
                    }
                })?;
                self.with_entrypoint_fallback(url, next.get_format(&emitted_url).await)?
            }
            _ => match self.with_entrypoint_fallback(url, next.get_format(url).await) {
                Ok(format) => format,
                Err(err) if ignored && NODE_DOES_NOT_UNDERSTAND.contains(&ext.as_str()) => {
                    return Err(LoaderError::Ignored {
                        path,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            },
        };

        if !ignored && matches!(node_says, Format::CommonJs | Format::Module) {
            let classification = self.service().module_types().classify_module(&path);
            match classification.module_type {
                ModuleTypeOverride::Cjs => return Ok(Format::CommonJs),
                ModuleTypeOverride::Esm => return Ok(Format::Module),
                ModuleTypeOverride::Package => {}
            }
        }
        Ok(node_says)
    }

    fn with_entrypoint_fallback(
        &self,
        url: &Url,
        result: Result<Format, LoaderError>,
    ) -> Result<Format, LoaderError> {
        match result {
            Err(_) if self.commonjs_entrypoints.borrow().contains(url) => Ok(Format::CommonJs),
            other => other,
        }
    }
}

impl<C: SourceCompiler> EsmHooks<C> {
    /// The legacy `transformSource` hook: compile unless the file is ignored.
    pub async fn transform_source(&self, source: &str, url: &Url) -> Result<String, LoaderError> {
        let Ok(path) = url.to_file_path() else {
            return Ok(source.to_string());
        };
        if url.scheme() != "file" || self.service().ignored(&path) {
            return Ok(source.to_string());
        }
        debug!(path = %path.display(), "compiling");
        self.compiler.compile(source, &path)
    }

    /// The `load` hook: format detection plus compilation.
    pub async fn load(
        &self,
        url: &Url,
        context: &LoadContext,
        next: &dyn NextLoad,
    ) -> Result<LoadOutput, LoaderError> {
        let format = match context.format {
            Some(format) => format,
            None => self.get_format(url, &self.default_get_format).await?,
        };

        if matches!(format, Format::Builtin | Format::CommonJs) {
            return Ok(LoadOutput {
                format,
                source: None,
            });
        }

        let raw = next
            .load(url, format)
            .await?
            .ok_or_else(|| LoaderError::MissingSource {
                url: url.to_string(),
                format,
            })?;
        let source = self.transform_source(&raw, url).await?;
        Ok(LoadOutput {
            format,
            source: Some(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerFacts, ResolverOptions, SpecifierResolution};
    use futures::executor::block_on;
    use futures::future;
    use std::cell::Cell;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Default)]
    struct PrefixCompiler {
        calls: Cell<usize>,
    }

    impl SourceCompiler for PrefixCompiler {
        fn compile(&self, code: &str, _path: &Path) -> Result<String, LoaderError> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("/* compiled */ {code}"))
        }
    }

    struct FailingNext;

    impl NextGetFormat for FailingNext {
        fn get_format<'a>(&'a self, url: &'a Url) -> LocalBoxFuture<'a, Result<Format, LoaderError>> {
            let err = ResolveError::UnknownFileExtension {
                extension: ".ts".into(),
                path: PathBuf::from(url.path()),
            };
            Box::pin(future::ready(Err(err.into())))
        }
    }

    struct NoSource;

    impl NextLoad for NoSource {
        fn load<'a>(
            &'a self,
            _url: &'a Url,
            _format: Format,
        ) -> LocalBoxFuture<'a, Result<Option<String>, LoaderError>> {
            Box::pin(future::ready(Ok(None)))
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let root = dir.path().canonicalize().unwrap();
            Self { _dir: dir, root }
        }

        fn write(&self, rel: &str, content: &str) -> Url {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            Url::from_file_path(path).unwrap()
        }

        fn hooks(&self, options: ResolverOptions, facts: CompilerFacts) -> EsmHooks<PrefixCompiler> {
            let service = Rc::new(Service::new(options, facts).unwrap());
            EsmHooks::new(service, PrefixCompiler::default())
        }
    }

    #[test]
    fn test_hook_generation() {
        let v = |s: &str| semver::Version::parse(s).unwrap();
        assert_eq!(HookGeneration::for_node_version(&v("16.11.1")), HookGeneration::Legacy);
        assert_eq!(HookGeneration::for_node_version(&v("16.12.0")), HookGeneration::ResolveLoad);
        assert_eq!(HookGeneration::for_node_version(&v("20.0.0")), HookGeneration::ResolveLoad);
        assert_eq!(HookGeneration::ResolveLoad.hook_names(), ["resolve", "load"]);
    }

    #[test]
    fn test_module_types_override_package_type() {
        let fx = Fixture::new();
        fx.write("package.json", r#"{"type": "module"}"#);
        let legacy = fx.write("vendor/legacy.js", "module.exports = 1;");
        let modern = fx.write("src/modern.js", "export default 1;");

        let options = ResolverOptions::new(fx.root.clone())
            .with_module_type("vendor/**", ModuleTypeOverride::Cjs);
        let hooks = fx.hooks(options, CompilerFacts::default().with_allow_js(true));
        let node = NodeGetFormat::new(Rc::clone(hooks.service()));

        assert_eq!(block_on(hooks.get_format(&legacy, &node)).unwrap(), Format::CommonJs);
        assert_eq!(block_on(hooks.get_format(&modern, &node)).unwrap(), Format::Module);
    }

    #[test]
    fn test_ts_format_follows_package_scope() {
        let fx = Fixture::new();
        fx.write("esm/package.json", r#"{"type": "module"}"#);
        let esm = fx.write("esm/a.ts", "");
        let cjs = fx.write("cjs/a.ts", "");
        let mts = fx.write("cjs/b.mts", "");

        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let node = NodeGetFormat::new(Rc::clone(hooks.service()));

        assert_eq!(block_on(hooks.get_format(&esm, &node)).unwrap(), Format::Module);
        assert_eq!(block_on(hooks.get_format(&cjs, &node)).unwrap(), Format::CommonJs);
        assert_eq!(block_on(hooks.get_format(&mts, &node)).unwrap(), Format::Module);
    }

    #[test]
    fn test_ignored_ts_gets_hint() {
        let fx = Fixture::new();
        let ignored = fx.write("node_modules/dep/index.ts", "");
        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let node = NodeGetFormat::new(Rc::clone(hooks.service()));

        let err = block_on(hooks.get_format(&ignored, &node)).unwrap_err();
        assert!(matches!(err, LoaderError::Ignored { .. }));
        assert_eq!(err.code(), Some("ERR_UNKNOWN_FILE_EXTENSION"));
        assert!(err.to_string().contains("configured to ignore this file"));
    }

    #[test]
    fn test_resolve_defers_foreign_schemes() {
        let fx = Fixture::new();
        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let context = ResolveContext {
            parent_url: Some(fx.write("main.ts", "")),
        };
        let err = block_on(hooks.resolve("https://x.dev/a.js", &context, &NodeDefaultResolve))
            .unwrap_err();
        assert_eq!(err.code(), Some("ERR_UNSUPPORTED_ESM_URL_SCHEME"));
    }

    #[test]
    fn test_resolve_maps_js_to_ts() {
        let fx = Fixture::new();
        let util = fx.write("util.ts", "");
        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let context = ResolveContext {
            parent_url: Some(fx.write("main.ts", "")),
        };
        let out = block_on(hooks.resolve("./util.js", &context, &NodeDefaultResolve)).unwrap();
        assert_eq!(out.url, util);
        assert_eq!(out.format, None);
    }

    #[test]
    fn test_entrypoint_commonjs_fallback() {
        let fx = Fixture::new();
        let entry = fx.write("entry.ts", "");
        let options = ResolverOptions::new(fx.root.clone())
            .with_specifier_resolution(SpecifierResolution::Explicit);
        let hooks = fx.hooks(options, CompilerFacts::default());

        let out = block_on(hooks.resolve("./entry", &ResolveContext::default(), &NodeDefaultResolve))
            .unwrap();
        assert_eq!(out.url, entry);
        assert_eq!(out.format, Some(Format::CommonJs));

        // Remembered: format falls back to commonjs when node cannot say.
        assert_eq!(block_on(hooks.get_format(&entry, &FailingNext)).unwrap(), Format::CommonJs);

        // Non-entry imports never fall back.
        let context = ResolveContext {
            parent_url: Some(entry.clone()),
        };
        assert!(block_on(hooks.resolve("./entry", &context, &NodeDefaultResolve)).is_err());
    }

    #[test]
    fn test_load_compiles_esm_and_skips_commonjs() {
        let fx = Fixture::new();
        fx.write("esm/package.json", r#"{"type": "module"}"#);
        let esm = fx.write("esm/a.ts", "export const a: number = 1;");
        let cjs = fx.write("cjs/a.ts", "exports.a = 1;");

        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let next = NodeDefaultLoad::new(Rc::clone(hooks.service()));

        let out = block_on(hooks.load(&esm, &LoadContext::default(), &next)).unwrap();
        assert_eq!(out.format, Format::Module);
        assert_eq!(out.source.as_deref(), Some("/* compiled */ export const a: number = 1;"));

        let out = block_on(hooks.load(&cjs, &LoadContext::default(), &next)).unwrap();
        assert_eq!(out.format, Format::CommonJs);
        assert!(out.source.is_none());

        let builtin = Url::parse("node:fs").unwrap();
        let out = block_on(hooks.load(&builtin, &LoadContext::default(), &next)).unwrap();
        assert_eq!(out.format, Format::Builtin);
        assert_eq!(hooks.compiler.calls.get(), 1);
    }

    #[test]
    fn test_load_missing_source() {
        let fx = Fixture::new();
        let url = fx.write("a.mjs", "");
        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());
        let err = block_on(hooks.load(&url, &LoadContext::default(), &NoSource)).unwrap_err();
        assert!(matches!(err, LoaderError::MissingSource { .. }));
    }

    #[test]
    fn test_transform_source_leaves_ignored_files() {
        let fx = Fixture::new();
        let js = fx.write("a.js", "plain");
        let ts = fx.write("a.ts", "typed");
        let hooks = fx.hooks(ResolverOptions::new(fx.root.clone()), CompilerFacts::default());

        assert_eq!(block_on(hooks.transform_source("plain", &js)).unwrap(), "plain");
        assert_eq!(
            block_on(hooks.transform_source("typed", &ts)).unwrap(),
            "/* compiled */ typed"
        );
    }
}
