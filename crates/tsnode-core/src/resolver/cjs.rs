//! CommonJS `require` resolution as a middleware chain.
//!
//! [`NodeCjsResolver`] reproduces node's filename resolution against an
//! explicit [`ExtensionRegistry`]. Middleware installed on a
//! [`CjsResolverChain`] sees each request first and may hand it on through
//! [`Next`]. The TypeScript middleware maps `./x.js` requests onto sources.

use super::error::ResolveError;
use super::exports::{package_exports_resolve, package_imports_resolve, CJS_CONDITIONS};
use super::package_config::PackageConfig;
use super::specifier::{is_builtin, is_relative_specifier, parse_package_name};
use crate::extensions::ExtensionPolicy;
use crate::service::Service;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};
use tsnode_util::path::{has_node_modules_segment, normalize};
use url::Url;

/// Extensions node registers out of the box, in registration order.
pub const NODE_DEFAULT_EXTENSIONS: &[&str] = &[".js", ".json", ".node"];

/// Compiled extensions node refuses to register; their presence registers `.js`.
const UNREGISTRABLE: &[&str] = &[".mts", ".cts", ".mjs", ".cjs"];

/// Ordered `require.extensions` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistry {
    extensions: Vec<String>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::node_defaults()
    }
}

impl ExtensionRegistry {
    #[must_use]
    pub fn node_defaults() -> Self {
        Self {
            extensions: NODE_DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
        }
    }

    /// Node defaults plus every compiled extension the policy allows.
    #[must_use]
    pub fn for_policy(policy: &ExtensionPolicy, prefer_ts_exts: bool) -> Self {
        let mut registry = Self::node_defaults();
        registry.register_compiled(policy, prefer_ts_exts);
        registry
    }

    /// Register an extension; already-registered extensions keep their slot.
    pub fn register(&mut self, ext: &str) {
        if !self.contains(ext) {
            self.extensions.push(ext.to_string());
        }
    }

    /// Register the compiled extensions; with `prefer_ts_exts` they move
    /// ahead of everything registered before.
    pub fn register_compiled(&mut self, policy: &ExtensionPolicy, prefer_ts_exts: bool) {
        let mut added: Vec<&str> = Vec::new();
        for ext in &policy.compiled {
            let ext = if UNREGISTRABLE.contains(ext) { ".js" } else { *ext };
            if !added.contains(&ext) {
                added.push(ext);
            }
        }
        for ext in &added {
            self.register(ext);
        }

        if prefer_ts_exts {
            let mut reordered: Vec<String> = added.iter().map(|e| (*e).to_string()).collect();
            for ext in &self.extensions {
                if !reordered.contains(ext) {
                    reordered.push(ext.clone());
                }
            }
            self.extensions = reordered;
        }
    }

    #[must_use]
    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }
}

/// One `require` request.
#[derive(Debug, Clone, Copy)]
pub struct CjsRequest<'a> {
    pub specifier: &'a str,
    /// The requiring file; `None` resolves from the working directory.
    pub parent: Option<&'a Path>,
    pub is_main: bool,
}

impl<'a> CjsRequest<'a> {
    #[must_use]
    pub fn new(specifier: &'a str, parent: Option<&'a Path>) -> Self {
        Self {
            specifier,
            parent,
            is_main: false,
        }
    }

    #[must_use]
    pub fn main(specifier: &'a str) -> Self {
        Self {
            specifier,
            parent: None,
            is_main: true,
        }
    }

    #[must_use]
    pub fn with_specifier(self, specifier: &'a str) -> Self {
        Self { specifier, ..self }
    }
}

/// What a `require` resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CjsResolution {
    /// A core module, by its bare name.
    Builtin(String),
    File(PathBuf),
}

impl CjsResolution {
    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Builtin(_) => None,
        }
    }
}

/// A resolver stage that may handle a request or defer to the next one.
pub trait CjsMiddleware: fmt::Debug {
    fn resolve(
        &self,
        request: CjsRequest<'_>,
        next: Next<'_>,
    ) -> Result<CjsResolution, ResolveError>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Rc<dyn CjsMiddleware>],
    base: &'a NodeCjsResolver,
}

impl Next<'_> {
    /// Pass `request` to the next stage.
    pub fn call(self, request: CjsRequest<'_>) -> Result<CjsResolution, ResolveError> {
        match self.rest.split_first() {
            Some((first, rest)) => first.resolve(
                request,
                Next {
                    rest,
                    base: self.base,
                },
            ),
            None => self.base.resolve(request),
        }
    }
}

/// Handle returned by [`CjsResolverChain::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

/// Middleware chain ending in node's own resolution.
#[derive(Debug)]
pub struct CjsResolverChain {
    base: NodeCjsResolver,
    middleware: RefCell<Vec<(HookHandle, Rc<dyn CjsMiddleware>)>>,
    next_id: Cell<u64>,
}

impl CjsResolverChain {
    #[must_use]
    pub fn new(base: NodeCjsResolver) -> Self {
        Self {
            base,
            middleware: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Chain for `service` with the compiled extensions registered.
    #[must_use]
    pub fn for_service(service: Rc<Service>) -> Self {
        let registry = ExtensionRegistry::for_policy(
            service.extensions(),
            service.options().prefer_ts_exts,
        );
        Self::new(NodeCjsResolver::new(service, registry))
    }

    /// Install `middleware` in front of everything installed before it.
    pub fn install(&self, middleware: Rc<dyn CjsMiddleware>) -> HookHandle {
        let handle = HookHandle(self.next_id.get());
        self.next_id.set(handle.0 + 1);
        self.middleware.borrow_mut().insert(0, (handle, middleware));
        handle
    }

    /// Remove previously installed middleware. Returns false if unknown.
    pub fn uninstall(&self, handle: HookHandle) -> bool {
        let mut middleware = self.middleware.borrow_mut();
        let before = middleware.len();
        middleware.retain(|(h, _)| *h != handle);
        middleware.len() != before
    }

    #[must_use]
    pub fn base(&self) -> &NodeCjsResolver {
        &self.base
    }

    pub fn resolve(&self, request: CjsRequest<'_>) -> Result<CjsResolution, ResolveError> {
        // Snapshot so middleware may install/uninstall while resolving.
        let stages: Vec<Rc<dyn CjsMiddleware>> = self
            .middleware
            .borrow()
            .iter()
            .map(|(_, m)| Rc::clone(m))
            .collect();
        Next {
            rest: &stages,
            base: &self.base,
        }
        .call(request)
    }
}

/// Install the `.js` -> TypeScript middleware when `experimentalResolver`
/// is enabled.
pub fn install_commonjs_resolve_hook(
    chain: &CjsResolverChain,
    service: &Rc<Service>,
) -> Option<HookHandle> {
    if !service.options().experimental_resolver {
        return None;
    }
    debug!("installing CommonJS resolve hook");
    Some(chain.install(Rc::new(TsCjsMiddleware::new(Rc::clone(service)))))
}

/// Maps relative `.js` requests onto TypeScript sources.
#[derive(Debug)]
pub struct TsCjsMiddleware {
    service: Rc<Service>,
}

impl TsCjsMiddleware {
    #[must_use]
    pub fn new(service: Rc<Service>) -> Self {
        Self { service }
    }
}

impl CjsMiddleware for TsCjsMiddleware {
    fn resolve(
        &self,
        request: CjsRequest<'_>,
        next: Next<'_>,
    ) -> Result<CjsResolution, ResolveError> {
        if !self.service.enabled() || request.parent.is_some_and(|p| self.service.ignored(p)) {
            return next.call(request);
        }

        let parent_in_node_modules = request.parent.is_some_and(has_node_modules_segment);
        if request.is_main || !is_relative_specifier(request.specifier) || parent_in_node_modules {
            return next.call(request);
        }
        let Some(stripped) = request.specifier.strip_suffix(".js") else {
            return next.call(request);
        };

        match next.call(request.with_specifier(stripped)) {
            Ok(resolved) => {
                trace!(specifier = request.specifier, "resolved without .js");
                Ok(resolved)
            }
            Err(e) => {
                trace!(specifier = request.specifier, error = %e, "retrying as written");
                let resolved = next.call(request)?;
                if let CjsResolution::File(path) = &resolved {
                    let path_str = path.to_string_lossy();
                    if let Some(stripped) = path_str.strip_suffix(".js") {
                        if let Ok(retried) = next.call(request.with_specifier(stripped)) {
                            return Ok(retried);
                        }
                    }
                }
                Ok(resolved)
            }
        }
    }
}

/// Node's synchronous `require` filename resolution.
#[derive(Debug)]
pub struct NodeCjsResolver {
    service: Rc<Service>,
    registry: ExtensionRegistry,
}

impl NodeCjsResolver {
    #[must_use]
    pub fn new(service: Rc<Service>, registry: ExtensionRegistry) -> Self {
        Self { service, registry }
    }

    #[must_use]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn resolve(&self, request: CjsRequest<'_>) -> Result<CjsResolution, ResolveError> {
        let specifier = request.specifier;
        if is_builtin(specifier) {
            let name = specifier.strip_prefix("node:").unwrap_or(specifier);
            return Ok(CjsResolution::Builtin(name.to_string()));
        }

        let options = self.service.options();
        let parent_dir = request
            .parent
            .and_then(Path::parent)
            .unwrap_or(&options.cwd);
        let parent_display = request
            .parent
            .map_or_else(|| options.cwd.display().to_string(), |p| p.display().to_string());
        let not_found = || ResolveError::cjs_not_found(specifier, parent_display.clone());

        let found = if is_relative_specifier(specifier) || Path::new(specifier).is_absolute() {
            let target = normalize(&parent_dir.join(specifier));
            self.load_as_file_or_directory(&target, specifier.ends_with('/'), &parent_display)?
        } else if specifier.starts_with('#') {
            Some(self.resolve_imports(specifier, parent_dir, &parent_display)?)
        } else {
            match self.resolve_self(specifier, parent_dir, &parent_display)? {
                Some(path) => Some(path),
                None => self.resolve_node_modules(specifier, parent_dir, &parent_display)?,
            }
        };

        let found = found.ok_or_else(not_found)?;
        let preserve = if request.is_main {
            options.preserve_symlinks_main
        } else {
            options.preserve_symlinks
        };
        let found = if preserve {
            found
        } else {
            self.service.fs().realpath(&found).map_err(|_| not_found())?
        };

        trace!(specifier, resolved = %found.display(), "require resolved");
        Ok(CjsResolution::File(found))
    }

    /// `LOAD_AS_FILE` then `LOAD_AS_DIRECTORY`.
    fn load_as_file_or_directory(
        &self,
        path: &Path,
        trailing_slash: bool,
        parent_display: &str,
    ) -> Result<Option<PathBuf>, ResolveError> {
        if !trailing_slash {
            if let Some(found) = self.load_as_file(path) {
                return Ok(Some(found));
            }
        }
        self.load_as_directory(path, parent_display)
    }

    fn load_as_file(&self, path: &Path) -> Option<PathBuf> {
        let fs = self.service.fs();
        if fs.file_exists(path) {
            return Some(path.to_path_buf());
        }
        self.registry.iter().find_map(|ext| {
            let mut candidate = path.as_os_str().to_os_string();
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            fs.file_exists(&candidate).then_some(candidate)
        })
    }

    fn load_index(&self, dir: &Path) -> Option<PathBuf> {
        let fs = self.service.fs();
        self.registry.iter().find_map(|ext| {
            let candidate = dir.join(format!("index{ext}"));
            fs.file_exists(&candidate).then_some(candidate)
        })
    }

    fn load_as_directory(
        &self,
        dir: &Path,
        parent_display: &str,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let config = self
            .service
            .package_configs()
            .get_package_config(&dir.join("package.json"));
        check_valid(&config, parent_display)?;
        if let Some(main) = config.main.as_deref().filter(|m| !m.is_empty()) {
            let main_path = normalize(&dir.join(main));
            if let Some(found) = self
                .load_as_file(&main_path)
                .or_else(|| self.load_index(&main_path))
            {
                return Ok(Some(found));
            }
        }
        Ok(self.load_index(dir))
    }

    /// A package requiring itself by name through its own `exports`.
    fn resolve_self(
        &self,
        specifier: &str,
        parent_dir: &Path,
        parent_display: &str,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let scope = self.scope_config(parent_dir);
        if !scope.exists || scope.exports.as_ref().map_or(true, serde_json::Value::is_null) {
            return Ok(None);
        }
        let Some(name) = scope.name.as_deref() else {
            return Ok(None);
        };
        let Some(rest) = specifier.strip_prefix(name) else {
            return Ok(None);
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return Ok(None);
        }

        let subpath = format!(".{rest}");
        let url = package_exports_resolve(&scope, &subpath, Some(parent_display), CJS_CONDITIONS)?;
        self.finalize_exports_target(&url, specifier, parent_display)
            .map(Some)
    }

    fn resolve_node_modules(
        &self,
        specifier: &str,
        parent_dir: &Path,
        parent_display: &str,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let parsed = parse_package_name(specifier, parent_display)?;
        let fs = self.service.fs();

        for dir in parent_dir.ancestors() {
            if dir.file_name().is_some_and(|n| n == "node_modules") {
                continue;
            }
            let node_modules = dir.join("node_modules");
            if !fs.dir_exists(&node_modules) {
                continue;
            }

            let package_dir = node_modules.join(parsed.name);
            let config = self
                .service
                .package_configs()
                .get_package_config(&package_dir.join("package.json"));
            check_valid(&config, parent_display)?;
            if config.exists && config.exports.as_ref().is_some_and(|e| !e.is_null()) {
                let url = package_exports_resolve(
                    &config,
                    &parsed.subpath,
                    Some(parent_display),
                    CJS_CONDITIONS,
                )?;
                return self
                    .finalize_exports_target(&url, specifier, parent_display)
                    .map(Some);
            }

            let target = node_modules.join(specifier);
            if let Some(found) =
                self.load_as_file_or_directory(&target, specifier.ends_with('/'), parent_display)?
            {
                debug!(specifier, dir = %node_modules.display(), "found in node_modules");
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn resolve_imports(
        &self,
        specifier: &str,
        parent_dir: &Path,
        parent_display: &str,
    ) -> Result<PathBuf, ResolveError> {
        let scope = self.scope_config(parent_dir);
        if !scope.exists {
            return Err(ResolveError::PackageImportNotDefined {
                specifier: specifier.to_string(),
                package_json: scope.path.clone(),
                base: Some(parent_display.to_string()),
            });
        }

        let scope_dir = scope.dir().to_path_buf();
        let resolve_bare = |target: &str| -> Result<Url, ResolveError> {
            let found = self
                .resolve_node_modules(target, &scope_dir, parent_display)?
                .ok_or_else(|| ResolveError::cjs_not_found(target, parent_display))?;
            Url::from_file_path(&found)
                .map_err(|()| ResolveError::cjs_not_found(target, parent_display))
        };
        let url = package_imports_resolve(
            &scope,
            specifier,
            Some(parent_display),
            CJS_CONDITIONS,
            &resolve_bare,
        )?;
        self.finalize_exports_target(&url, specifier, parent_display)
    }

    fn scope_config(&self, dir: &Path) -> Rc<PackageConfig> {
        match Url::from_directory_path(dir) {
            Ok(url) => self.service.package_configs().get_package_scope_config(&url),
            Err(()) => Rc::new(PackageConfig::missing(dir.join("package.json"))),
        }
    }

    /// `exports` targets must name an existing file.
    fn finalize_exports_target(
        &self,
        url: &Url,
        specifier: &str,
        parent_display: &str,
    ) -> Result<PathBuf, ResolveError> {
        let path = url
            .to_file_path()
            .map_err(|()| ResolveError::cjs_not_found(specifier, parent_display))?;
        if self.service.fs().file_exists(&path) {
            Ok(path)
        } else {
            Err(ResolveError::cjs_not_found(specifier, parent_display))
        }
    }
}

/// A manifest that exists but failed to parse stops resolution.
fn check_valid(config: &PackageConfig, parent_display: &str) -> Result<(), ResolveError> {
    if config.exists && !config.is_valid {
        return Err(ResolveError::InvalidPackageConfig {
            path: config.path.clone(),
            base: Some(parent_display.to_string()),
            message: None,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerFacts, ResolverOptions};
    use std::fs;
    use tempfile::{tempdir, TempDir};

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

        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn service(&self, options: ResolverOptions) -> Rc<Service> {
            Rc::new(Service::new(options, CompilerFacts::default()).unwrap())
        }

        fn options(&self) -> ResolverOptions {
            ResolverOptions::new(self.root.clone())
        }
    }

    fn file(result: Result<CjsResolution, ResolveError>) -> PathBuf {
        match result.unwrap() {
            CjsResolution::File(path) => path,
            CjsResolution::Builtin(name) => panic!("unexpected builtin {name}"),
        }
    }

    #[test]
    fn test_registry_order() {
        let policy = ExtensionPolicy::compute(false, false, false, true);
        let registry = ExtensionRegistry::for_policy(&policy, false);
        assert_eq!(registry.iter().collect::<Vec<_>>(), [".js", ".json", ".node", ".ts"]);

        let registry = ExtensionRegistry::for_policy(&policy, true);
        assert_eq!(registry.iter().collect::<Vec<_>>(), [".ts", ".js", ".json", ".node"]);

        let jsx = ExtensionPolicy::compute(false, true, true, true);
        let registry = ExtensionRegistry::for_policy(&jsx, false);
        assert!(registry.contains(".tsx"));
        assert!(registry.contains(".jsx"));
        assert!(!registry.contains(".mts"));
        assert!(!registry.contains(".mjs"));
    }

    #[test]
    fn test_node_resolution_basics() {
        let fx = Fixture::new();
        let a = fx.write("src/a.ts", "");
        let b = fx.write("src/b.js", "");
        let idx = fx.write("src/dir/index.ts", "");
        let main = fx.write("src/withmain/lib/start.ts", "");
        fx.write("src/withmain/package.json", r#"{"main": "lib/start"}"#);
        let parent = fx.write("src/index.ts", "");

        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        let req = |s| chain.resolve(CjsRequest::new(s, Some(&parent)));

        assert_eq!(file(req("./a")), a);
        assert_eq!(file(req("./b")), b);
        assert_eq!(file(req("./dir")), idx);
        assert_eq!(file(req("./withmain")), main);
        assert_eq!(
            chain.resolve(CjsRequest::new("fs", Some(&parent))).unwrap(),
            CjsResolution::Builtin("fs".into())
        );
        assert_eq!(
            chain.resolve(CjsRequest::new("node:fs", Some(&parent))).unwrap(),
            CjsResolution::Builtin("fs".into())
        );

        let err = req("./missing").unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_FOUND");
    }

    #[test]
    fn test_without_hook_js_specifier_is_literal() {
        let fx = Fixture::new();
        fx.write("src/util.ts", "");
        let parent = fx.write("src/index.ts", "");

        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        let err = chain
            .resolve(CjsRequest::new("./util.js", Some(&parent)))
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_FOUND");
    }

    #[test]
    fn test_hook_maps_js_to_ts() {
        let fx = Fixture::new();
        let util = fx.write("src/util.ts", "");
        let parent = fx.write("src/index.ts", "");

        let service = fx.service(fx.options().with_experimental_resolver(true));
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        let handle = install_commonjs_resolve_hook(&chain, &service).unwrap();

        assert_eq!(file(chain.resolve(CjsRequest::new("./util.js", Some(&parent)))), util);

        assert!(chain.uninstall(handle));
        assert!(!chain.uninstall(handle));
        assert!(chain.resolve(CjsRequest::new("./util.js", Some(&parent))).is_err());
    }

    #[test]
    fn test_hook_not_installed_without_flag() {
        let fx = Fixture::new();
        let service = fx.service(fx.options());
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        assert!(install_commonjs_resolve_hook(&chain, &service).is_none());
    }

    #[test]
    fn test_hook_prefers_ts_when_configured() {
        let fx = Fixture::new();
        let ts = fx.write("src/both.ts", "");
        let js = fx.write("src/both.js", "");
        let parent = fx.write("src/index.ts", "");

        let plain = fx.service(fx.options().with_experimental_resolver(true));
        let chain = CjsResolverChain::for_service(Rc::clone(&plain));
        install_commonjs_resolve_hook(&chain, &plain);
        assert_eq!(file(chain.resolve(CjsRequest::new("./both.js", Some(&parent)))), js);

        let preferring = fx.service(
            fx.options()
                .with_experimental_resolver(true)
                .with_prefer_ts_exts(true),
        );
        let chain = CjsResolverChain::for_service(Rc::clone(&preferring));
        install_commonjs_resolve_hook(&chain, &preferring);
        assert_eq!(file(chain.resolve(CjsRequest::new("./both.js", Some(&parent)))), ts);
    }

    #[test]
    fn test_hook_skips_node_modules_parents() {
        let fx = Fixture::new();
        fx.write("node_modules/dep/util.ts", "");
        fx.write("node_modules/dep/other.ts", "");
        let js = fx.write("node_modules/dep/other.js", "");
        let parent = fx.write("node_modules/dep/index.ts", "");

        let service = fx.service(
            fx.options()
                .with_experimental_resolver(true)
                .with_prefer_ts_exts(true)
                .with_skip_ignore(true),
        );
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        install_commonjs_resolve_hook(&chain, &service);

        let err = chain
            .resolve(CjsRequest::new("./util.js", Some(&parent)))
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_FOUND");
        assert_eq!(file(chain.resolve(CjsRequest::new("./other.js", Some(&parent)))), js);
    }

    #[test]
    fn test_hook_leaves_bare_specifiers_alone() {
        let fx = Fixture::new();
        fx.write("node_modules/pkg/package.json", r#"{"main": "lib/index.js"}"#);
        fx.write("node_modules/pkg/lib/index.ts", "");
        let js = fx.write("node_modules/pkg/lib/index.js", "");
        let parent = fx.write("src/index.ts", "");

        let service = fx.service(
            fx.options()
                .with_experimental_resolver(true)
                .with_prefer_ts_exts(true),
        );
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        install_commonjs_resolve_hook(&chain, &service);

        assert_eq!(file(chain.resolve(CjsRequest::new("pkg", Some(&parent)))), js);
        let entry = js.to_string_lossy();
        assert_eq!(file(chain.resolve(CjsRequest::main(&entry))), js);
    }

    #[test]
    fn test_hook_retries_as_written_when_stripped_fails() {
        let fx = Fixture::new();
        fx.write("src/vendor.js/package.json", r#"{"main": "main.js"}"#);
        fx.write("src/vendor.js/main.js", "");
        let ts = fx.write("src/vendor.js/main.ts", "");
        fx.write("src/legacy.js/package.json", r#"{"main": "main.js"}"#);
        let legacy = fx.write("src/legacy.js/main.js", "");
        let parent = fx.write("src/index.ts", "");

        let service = fx.service(
            fx.options()
                .with_experimental_resolver(true)
                .with_prefer_ts_exts(true),
        );
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        install_commonjs_resolve_hook(&chain, &service);

        // `./vendor` does not exist, so the directory is found as written and
        // its `.js` main is retried without the extension.
        assert_eq!(file(chain.resolve(CjsRequest::new("./vendor.js", Some(&parent)))), ts);
        assert_eq!(
            file(chain.resolve(CjsRequest::new("./legacy.js", Some(&parent)))),
            legacy
        );
    }

    #[test]
    fn test_invalid_directory_manifest_fails() {
        let fx = Fixture::new();
        fx.write("src/broken/package.json", "{ nope");
        fx.write("src/broken/index.js", "");
        let parent = fx.write("src/index.ts", "");

        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        let err = chain
            .resolve(CjsRequest::new("./broken", Some(&parent)))
            .unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_PACKAGE_CONFIG");
    }

    #[test]
    fn test_disabled_service_passes_through() {
        let fx = Fixture::new();
        fx.write("src/util.ts", "");
        let parent = fx.write("src/index.ts", "");

        let service = fx.service(fx.options().with_experimental_resolver(true));
        let chain = CjsResolverChain::for_service(Rc::clone(&service));
        install_commonjs_resolve_hook(&chain, &service);
        service.set_enabled(false);

        assert!(chain.resolve(CjsRequest::new("./util.js", Some(&parent))).is_err());
    }

    #[test]
    fn test_node_modules_and_exports() {
        let fx = Fixture::new();
        fx.write(
            "node_modules/dual/package.json",
            r#"{"exports": {".": {"import": "./esm.mjs", "require": "./cjs.cjs"}, "./sub": "./sub.js"}}"#,
        );
        let cjs = fx.write("node_modules/dual/cjs.cjs", "");
        let sub = fx.write("node_modules/dual/sub.js", "");
        fx.write("node_modules/plain/package.json", r#"{"main": "main.js"}"#);
        let plain = fx.write("node_modules/plain/main.js", "");
        let deep = fx.write("node_modules/plain/lib/deep.js", "");
        let parent = fx.write("a/b/index.js", "");

        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        let req = |s| chain.resolve(CjsRequest::new(s, Some(&parent)));

        assert_eq!(file(req("dual")), cjs);
        assert_eq!(file(req("dual/sub")), sub);
        assert_eq!(req("dual/hidden").unwrap_err().code(), "ERR_PACKAGE_PATH_NOT_EXPORTED");
        assert_eq!(file(req("plain")), plain);
        assert_eq!(file(req("plain/lib/deep")), deep);
        assert_eq!(req("absent").unwrap_err().code(), "MODULE_NOT_FOUND");
    }

    #[test]
    fn test_self_reference_and_imports() {
        let fx = Fixture::new();
        fx.write(
            "package.json",
            r##"{"name": "me", "exports": {"./x": "./lib/x.js"}, "imports": {"#cfg": "./lib/cfg.js"}}"##,
        );
        let x = fx.write("lib/x.js", "");
        let cfg = fx.write("lib/cfg.js", "");
        let parent = fx.write("test/t.js", "");

        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        assert_eq!(file(chain.resolve(CjsRequest::new("me/x", Some(&parent)))), x);
        assert_eq!(file(chain.resolve(CjsRequest::new("#cfg", Some(&parent)))), cfg);
    }

    #[test]
    fn test_main_request_from_cwd() {
        let fx = Fixture::new();
        let entry = fx.write("entry.ts", "");
        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        assert_eq!(file(chain.resolve(CjsRequest::main("./entry"))), entry);
    }

    #[test]
    fn test_parentless_request_resolves_from_cwd() {
        let fx = Fixture::new();
        let manifest = fx.write("node_modules/@types/node/package.json", r#"{"name": "@types/node"}"#);
        let chain = CjsResolverChain::for_service(fx.service(fx.options()));
        let resolved = chain
            .resolve(CjsRequest::new("@types/node/package.json", None))
            .unwrap();
        assert_eq!(resolved.as_path(), Some(manifest.as_path()));
    }
}
