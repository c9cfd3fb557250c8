//! Node-compatible ESM resolution with TypeScript extension substitution.
//!
//! Resolution order:
//! 1. `node:` and builtin names pass through untouched
//! 2. Foreign URL schemes defer to the next resolver
//! 3. Relative/absolute specifiers join against the parent URL
//! 4. `#name` goes through the enclosing package's `imports`
//! 5. Bare names go through self-reference, then ancestor `node_modules`
//! 6. Every file result is finalized: `.js` may become `.ts`, omitted
//!    extensions are probed, symlinks are resolved

use super::error::ResolveError;
use super::exports::{package_exports_resolve, package_imports_resolve, ESM_CONDITIONS};
use super::package_config::{PackageConfig, PackageType};
use super::specifier::{is_builtin, is_relative_or_absolute, parse_package_name};
use crate::config::SpecifierResolution;
use crate::service::Service;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};
use tsnode_util::fs::FileKind;
use tsnode_util::path::extname;
use url::Url;

/// Outcome of an ESM resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsmResolution {
    Resolved(Url),
    /// Not ours to resolve; hand the request to the next resolver.
    Defer,
}

/// ESM resolver bound to one service.
#[derive(Debug, Clone)]
pub struct EsmResolver {
    service: Rc<Service>,
}

impl EsmResolver {
    #[must_use]
    pub fn new(service: Rc<Service>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &Rc<Service> {
        &self.service
    }

    /// Resolve `specifier` imported from `base`.
    ///
    /// `is_main` selects the entry-point symlink policy.
    pub fn resolve(
        &self,
        specifier: &str,
        base: &Url,
        is_main: bool,
    ) -> Result<EsmResolution, ResolveError> {
        if specifier.starts_with("node:") {
            return Url::parse(specifier)
                .map(EsmResolution::Resolved)
                .map_err(|_| invalid_specifier(specifier, "is not a valid URL", base));
        }
        if is_builtin(specifier) {
            return Url::parse(&format!("node:{specifier}"))
                .map(EsmResolution::Resolved)
                .map_err(|_| invalid_specifier(specifier, "is not a valid URL", base));
        }

        if !is_relative_or_absolute(specifier) && !specifier.starts_with('#') {
            if let Ok(url) = Url::parse(specifier) {
                match url.scheme() {
                    "data" => return Ok(EsmResolution::Resolved(url)),
                    "file" if url.host_str().map_or(true, str::is_empty) => {}
                    scheme => {
                        debug!(specifier, scheme, "deferring foreign URL");
                        return Ok(EsmResolution::Defer);
                    }
                }
            }
        }

        self.module_resolve(specifier, base, is_main)
            .map(EsmResolution::Resolved)
    }

    fn module_resolve(
        &self,
        specifier: &str,
        base: &Url,
        is_main: bool,
    ) -> Result<Url, ResolveError> {
        let resolved = if is_relative_or_absolute(specifier) {
            base.join(specifier)
                .map_err(|_| invalid_specifier(specifier, "cannot be joined to its parent", base))?
        } else if specifier.starts_with('#') {
            self.package_imports_resolve(specifier, base)?
        } else if let Ok(url) = Url::parse(specifier) {
            url
        } else {
            self.package_resolve(specifier, base)?
        };

        trace!(specifier, resolved = %resolved, "finalizing");
        self.finalize_resolution(resolved, base, is_main)
    }

    fn package_imports_resolve(&self, name: &str, base: &Url) -> Result<Url, ResolveError> {
        let base_display = display_url(base);
        if name == "#" || name.starts_with("#/") {
            return Err(ResolveError::InvalidModuleSpecifier {
                specifier: name.to_string(),
                reason: "is not a valid internal imports specifier name".to_string(),
                base: Some(base_display),
            });
        }

        let scope = self.service.package_configs().get_package_scope_config(base);
        if !scope.exists {
            return Err(ResolveError::PackageImportNotDefined {
                specifier: name.to_string(),
                package_json: scope.path.clone(),
                base: Some(base_display),
            });
        }

        let package_json_url = file_url(&scope.path, base)?;
        let resolve_bare = |target: &str| self.package_resolve(target, &package_json_url);
        package_imports_resolve(
            &scope,
            name,
            Some(&base_display),
            ESM_CONDITIONS,
            &resolve_bare,
        )
    }

    fn package_resolve(&self, specifier: &str, base: &Url) -> Result<Url, ResolveError> {
        let base_display = display_url(base);
        let parsed = parse_package_name(specifier, &base_display)?;
        let cache = self.service.package_configs();

        let scope = cache.get_package_scope_config(base);
        if scope.exists
            && scope.name.as_deref() == Some(parsed.name)
            && scope.exports.as_ref().is_some_and(|e| !e.is_null())
        {
            debug!(name = parsed.name, "resolving package self-reference");
            return package_exports_resolve(
                &scope,
                &parsed.subpath,
                Some(&base_display),
                ESM_CONDITIONS,
            );
        }

        let ascend = if parsed.is_scoped {
            "../../../../node_modules/"
        } else {
            "../../../node_modules/"
        };
        let join = |url: &Url, relative: &str| {
            url.join(relative)
                .map_err(|_| invalid_specifier(specifier, "is not a valid package name", base))
        };

        let mut package_json_url =
            join(base, &format!("./node_modules/{}/package.json", parsed.name))?;
        loop {
            let package_json_path = url_to_path(&package_json_url, base)?;
            let package_dir = package_json_path.parent().unwrap_or(Path::new("/"));

            if !self.service.fs().dir_exists(package_dir) {
                trace!(dir = %package_dir.display(), "package directory missing");
                let next = join(
                    &package_json_url,
                    &format!("{ascend}{}/package.json", parsed.name),
                )?;
                if next.path() == package_json_url.path() {
                    break;
                }
                package_json_url = next;
                continue;
            }

            debug!(name = parsed.name, dir = %package_dir.display(), "found package");
            if parsed.subpath == "./" {
                return join(&package_json_url, "./");
            }

            let config = cache.get_package_config(&package_json_path);
            if config.exports.as_ref().is_some_and(|e| !e.is_null()) {
                return package_exports_resolve(
                    &config,
                    &parsed.subpath,
                    Some(&base_display),
                    ESM_CONDITIONS,
                );
            }
            if parsed.subpath == "." {
                return self.package_main_resolve(&package_json_url, &config, base);
            }
            if !config.is_valid {
                return Err(ResolveError::InvalidPackageConfig {
                    path: config.path.clone(),
                    base: Some(base_display),
                    message: None,
                });
            }
            return join(&package_json_url, &parsed.subpath);
        }

        Err(ResolveError::package_not_found(parsed.name, base_display))
    }

    fn package_main_resolve(
        &self,
        package_json_url: &Url,
        config: &PackageConfig,
        base: &Url,
    ) -> Result<Url, ResolveError> {
        let base_display = display_url(base);
        if !config.is_valid {
            return Err(ResolveError::InvalidPackageConfig {
                path: config.path.clone(),
                base: Some(base_display),
                message: None,
            });
        }
        if config.exports.as_ref().is_some_and(|e| !e.is_null()) {
            return package_exports_resolve(config, ".", Some(&base_display), ESM_CONDITIONS);
        }

        if let Some(main) = config.main.as_deref() {
            if let Ok(guess) = package_json_url.join(main) {
                let path = url_to_path(&guess, base)?;
                if let Some(found) = self.probe_replacements(&path) {
                    return file_url(&found, base);
                }
            }
        }

        if config.pkg_type != PackageType::Module {
            return self.legacy_main_resolve(package_json_url, config, base);
        }

        Err(ResolveError::esm_not_found(
            config.dir().display().to_string(),
            base_display,
        ))
    }

    /// `main`, `main.<ext>`, `main/index.<ext>`, then `index.<ext>`.
    fn legacy_main_resolve(
        &self,
        package_json_url: &Url,
        config: &PackageConfig,
        base: &Url,
    ) -> Result<Url, ResolveError> {
        let candidates = &self.service.extensions().legacy_main_candidates;
        let mut guesses = Vec::new();
        if let Some(main) = config.main.as_deref() {
            let main = main.trim_end_matches('/');
            guesses.push(main.to_string());
            guesses.extend(candidates.iter().map(|ext| format!("{main}{ext}")));
            guesses.extend(candidates.iter().map(|ext| format!("{main}/index{ext}")));
        }
        guesses.extend(candidates.iter().map(|ext| format!("./index{ext}")));

        for guess in &guesses {
            let Ok(url) = package_json_url.join(guess) else {
                continue;
            };
            let path = url_to_path(&url, base)?;
            if self.service.fs().file_exists(&path) {
                trace!(path = %path.display(), "legacy main hit");
                return Ok(url);
            }
        }

        Err(ResolveError::esm_not_found(
            config.dir().display().to_string(),
            display_url(base),
        ))
    }

    fn finalize_resolution(
        &self,
        resolved: Url,
        base: &Url,
        is_main: bool,
    ) -> Result<Url, ResolveError> {
        if resolved.scheme() != "file" {
            return Ok(resolved);
        }

        let lower = resolved.path().to_ascii_lowercase();
        if lower.contains("%2f") || lower.contains("%5c") {
            return Err(ResolveError::InvalidModuleSpecifier {
                specifier: resolved.path().to_string(),
                reason: "must not include encoded \"/\" or \"\\\" characters".to_string(),
                base: Some(display_url(base)),
            });
        }

        if resolved.path().ends_with('/') {
            return Ok(resolved);
        }

        let path = url_to_path(&resolved, base)?;
        let found = self.resolve_file(&path, base)?;
        self.apply_symlink_policy(&found, &resolved, base, is_main)
    }

    /// Pick the file that satisfies `path`, TypeScript sources included.
    fn resolve_file(&self, path: &Path, base: &Url) -> Result<PathBuf, ResolveError> {
        if let Some(found) = self.probe_replacements(path) {
            return Ok(found);
        }

        let fs = self.service.fs();
        let kind = fs.stat(path);
        if self.service.options().experimental_specifier_resolution == SpecifierResolution::Node {
            let candidates = &self.service.extensions().omitted_extension_candidates;
            for ext in candidates {
                let mut with_ext = path.as_os_str().to_os_string();
                with_ext.push(ext);
                let candidate = PathBuf::from(with_ext);
                if fs.file_exists(&candidate) {
                    debug!(path = %candidate.display(), "probed omitted extension");
                    return Ok(candidate);
                }
            }
            if kind == Some(FileKind::Directory) {
                for ext in candidates {
                    let candidate = path.join(format!("index{ext}"));
                    if fs.file_exists(&candidate) {
                        return Ok(candidate);
                    }
                }
            }
        }

        if kind == Some(FileKind::Directory) {
            return Err(ResolveError::UnsupportedDirImport {
                path: path.to_path_buf(),
                base: display_url(base),
            });
        }
        Err(ResolveError::esm_not_found(
            path.display().to_string(),
            display_url(base),
        ))
    }

    /// The first existing replacement for a compiled-JS extension, else the
    /// literal path if it is a file.
    fn probe_replacements(&self, path: &Path) -> Option<PathBuf> {
        let fs = self.service.fs();
        let path_str = path.to_string_lossy();
        let ext = extname(&path_str);
        if let Some(replacements) = self.service.extensions().replacements_for(ext) {
            let stem = &path_str[..path_str.len() - ext.len()];
            for replacement in replacements {
                let candidate = PathBuf::from(format!("{stem}{replacement}"));
                if fs.file_exists(&candidate) {
                    if *replacement != ext {
                        debug!(from = %path.display(), to = %candidate.display(), "substituted source extension");
                    }
                    return Some(candidate);
                }
            }
        }
        fs.file_exists(path).then(|| path.to_path_buf())
    }

    fn apply_symlink_policy(
        &self,
        path: &Path,
        original: &Url,
        base: &Url,
        is_main: bool,
    ) -> Result<Url, ResolveError> {
        let options = self.service.options();
        let preserve = if is_main {
            options.preserve_symlinks_main
        } else {
            options.preserve_symlinks
        };

        let real = if preserve {
            path.to_path_buf()
        } else {
            self.service.fs().realpath(path).map_err(|_| {
                ResolveError::esm_not_found(path.display().to_string(), display_url(base))
            })?
        };

        let mut url = file_url(&real, base)?;
        url.set_query(original.query());
        url.set_fragment(original.fragment());
        Ok(url)
    }
}

/// A URL as shown in error messages: file URLs as paths.
#[must_use]
pub fn display_url(url: &Url) -> String {
    if url.scheme() == "file" {
        if let Ok(path) = url.to_file_path() {
            return path.display().to_string();
        }
    }
    url.to_string()
}

fn invalid_specifier(specifier: &str, reason: &str, base: &Url) -> ResolveError {
    ResolveError::InvalidModuleSpecifier {
        specifier: specifier.to_string(),
        reason: reason.to_string(),
        base: Some(display_url(base)),
    }
}

fn url_to_path(url: &Url, base: &Url) -> Result<PathBuf, ResolveError> {
    url.to_file_path()
        .map_err(|()| invalid_specifier(url.as_str(), "is not a local file URL", base))
}

fn file_url(path: &Path, base: &Url) -> Result<Url, ResolveError> {
    Url::from_file_path(path).map_err(|()| {
        invalid_specifier(&path.display().to_string(), "is not an absolute path", base)
    })
}
