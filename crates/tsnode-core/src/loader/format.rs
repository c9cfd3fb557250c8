//! Node's own format rules and default source loading.
//!
//! These are the `next` stages the TypeScript hooks fall back to.

use super::{Format, LoaderError, NextGetFormat, NextLoad, NextResolve, ResolveContext, ResolveOutput};
use crate::resolver::ResolveError;
use crate::resolver::PackageType;
use crate::service::Service;
use futures::future::{self, LocalBoxFuture};
use std::path::PathBuf;
use std::rc::Rc;
use tsnode_util::path::extname;
use url::Url;

/// Node's default format detection.
#[derive(Debug, Clone)]
pub struct NodeGetFormat {
    service: Rc<Service>,
}

impl NodeGetFormat {
    #[must_use]
    pub fn new(service: Rc<Service>) -> Self {
        Self { service }
    }

    /// Classify `url` the way node does without any loader hooks.
    pub fn format_of(&self, url: &Url) -> Result<Format, ResolveError> {
        match url.scheme() {
            "node" => Ok(Format::Builtin),
            "data" => data_url_format(url).ok_or_else(|| ResolveError::UnknownFileExtension {
                extension: data_url_mime(url).to_string(),
                path: PathBuf::from(url.as_str()),
            }),
            "file" => {
                let path = url.to_file_path().map_err(|()| ResolveError::InvalidModuleSpecifier {
                    specifier: url.to_string(),
                    reason: "is not a local file URL".to_string(),
                    base: None,
                })?;
                let ext = extname(&path.to_string_lossy()).to_string();
                match ext.as_str() {
                    ".mjs" => Ok(Format::Module),
                    ".cjs" => Ok(Format::CommonJs),
                    ".json" => Ok(Format::Json),
                    ".wasm" => Ok(Format::Wasm),
                    ".node" => Ok(Format::Dynamic),
                    ".js" | "" => {
                        let scope = self.service.package_configs().get_package_scope_config(url);
                        if !scope.is_valid {
                            return Err(ResolveError::InvalidPackageConfig {
                                path: scope.path.clone(),
                                base: None,
                                message: None,
                            });
                        }
                        Ok(if scope.pkg_type == PackageType::Module {
                            Format::Module
                        } else {
                            Format::CommonJs
                        })
                    }
                    _ => Err(ResolveError::UnknownFileExtension {
                        extension: ext,
                        path,
                    }),
                }
            }
            scheme => Err(ResolveError::UnsupportedUrlScheme {
                scheme: format!("{scheme}:"),
            }),
        }
    }
}

impl NextGetFormat for NodeGetFormat {
    fn get_format<'a>(&'a self, url: &'a Url) -> LocalBoxFuture<'a, Result<Format, LoaderError>> {
        Box::pin(future::ready(self.format_of(url).map_err(LoaderError::from)))
    }
}

fn data_url_mime(url: &Url) -> &str {
    let body = url.path();
    let end = body.find([',', ';']).unwrap_or(body.len());
    &body[..end]
}

fn data_url_format(url: &Url) -> Option<Format> {
    match data_url_mime(url) {
        "text/javascript" => Some(Format::Module),
        "application/json" => Some(Format::Json),
        "application/wasm" => Some(Format::Wasm),
        _ => None,
    }
}

/// Node's default resolver for requests the TypeScript resolver deferred.
///
/// Only schemes node loads natively pass; everything else is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeDefaultResolve;

impl NextResolve for NodeDefaultResolve {
    fn resolve<'a>(
        &'a self,
        specifier: &'a str,
        _context: &'a ResolveContext,
    ) -> LocalBoxFuture<'a, Result<ResolveOutput, LoaderError>> {
        let result = match Url::parse(specifier) {
            Ok(url) if matches!(url.scheme(), "node" | "data") => Ok(ResolveOutput {
                url,
                format: None,
            }),
            Ok(url) => Err(ResolveError::UnsupportedUrlScheme {
                scheme: format!("{}:", url.scheme()),
            }
            .into()),
            Err(_) => Err(ResolveError::InvalidModuleSpecifier {
                specifier: specifier.to_string(),
                reason: "was deferred but is not a URL".to_string(),
                base: None,
            }
            .into()),
        };
        Box::pin(future::ready(result))
    }
}

/// Node's default loader: raw file contents through the service filesystem.
#[derive(Debug, Clone)]
pub struct NodeDefaultLoad {
    service: Rc<Service>,
}

impl NodeDefaultLoad {
    #[must_use]
    pub fn new(service: Rc<Service>) -> Self {
        Self { service }
    }
}

impl NextLoad for NodeDefaultLoad {
    fn load<'a>(
        &'a self,
        url: &'a Url,
        _format: Format,
    ) -> LocalBoxFuture<'a, Result<Option<String>, LoaderError>> {
        let result = match url.to_file_path() {
            Ok(path) => self
                .service
                .fs()
                .read_to_string(&path)
                .map(Some)
                .map_err(|source| LoaderError::Read { path, source }),
            Err(()) => Ok(None),
        };
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompilerFacts, ResolverOptions};
    use futures::executor::block_on;
    use std::fs;
    use tempfile::tempdir;

    fn get_format(dir: &std::path::Path) -> NodeGetFormat {
        let options = ResolverOptions::new(dir.to_path_buf());
        NodeGetFormat::new(Rc::new(Service::new(options, CompilerFacts::default()).unwrap()))
    }

    #[test]
    fn test_extension_rules() {
        let dir = tempdir().unwrap();
        let nf = get_format(dir.path());
        let url = |name: &str| Url::from_file_path(dir.path().join(name)).unwrap();

        assert_eq!(nf.format_of(&url("a.mjs")).unwrap(), Format::Module);
        assert_eq!(nf.format_of(&url("a.cjs")).unwrap(), Format::CommonJs);
        assert_eq!(nf.format_of(&url("a.json")).unwrap(), Format::Json);
        assert_eq!(nf.format_of(&url("a.wasm")).unwrap(), Format::Wasm);
        assert_eq!(nf.format_of(&url("a.node")).unwrap(), Format::Dynamic);
        assert_eq!(nf.format_of(&url("a.js")).unwrap(), Format::CommonJs);
        assert_eq!(nf.format_of(&url("bin")).unwrap(), Format::CommonJs);

        let err = nf.format_of(&url("a.ts")).unwrap_err();
        assert_eq!(err.code(), "ERR_UNKNOWN_FILE_EXTENSION");
    }

    #[test]
    fn test_package_type_module() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"type": "module"}"#).unwrap();
        let nf = get_format(dir.path());
        let url = Url::from_file_path(dir.path().join("src/a.js")).unwrap();
        assert_eq!(nf.format_of(&url).unwrap(), Format::Module);
    }

    #[test]
    fn test_invalid_scope_manifest() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{ nope").unwrap();
        let nf = get_format(dir.path());
        let url = |name: &str| Url::from_file_path(dir.path().join(name)).unwrap();

        let err = nf.format_of(&url("a.js")).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_PACKAGE_CONFIG");
        assert_eq!(nf.format_of(&url("a.mjs")).unwrap(), Format::Module);
    }

    #[test]
    fn test_non_file_urls() {
        let dir = tempdir().unwrap();
        let nf = get_format(dir.path());
        let parse = |s: &str| Url::parse(s).unwrap();

        assert_eq!(nf.format_of(&parse("node:fs")).unwrap(), Format::Builtin);
        assert_eq!(
            nf.format_of(&parse("data:text/javascript,export default 1")).unwrap(),
            Format::Module
        );
        assert_eq!(
            nf.format_of(&parse("data:application/json,{}")).unwrap(),
            Format::Json
        );
        assert!(nf.format_of(&parse("data:text/plain,hi")).is_err());
        assert_eq!(
            nf.format_of(&parse("https://x.dev/a.js")).unwrap_err().code(),
            "ERR_UNSUPPORTED_ESM_URL_SCHEME"
        );
    }

    #[test]
    fn test_default_resolve_rejects_foreign_schemes() {
        let context = ResolveContext::default();
        let err = block_on(NodeDefaultResolve.resolve("https://x.dev/a.js", &context)).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Resolve(ResolveError::UnsupportedUrlScheme { .. })
        ));
        let ok = block_on(NodeDefaultResolve.resolve("node:fs", &context)).unwrap();
        assert_eq!(ok.url.as_str(), "node:fs");
    }

    #[test]
    fn test_default_load_reads_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.ts");
        fs::write(&file, "const x: number = 1;").unwrap();

        let options = ResolverOptions::new(dir.path().to_path_buf());
        let service = Rc::new(Service::new(options, CompilerFacts::default()).unwrap());
        let load = NodeDefaultLoad::new(service);

        let url = Url::from_file_path(&file).unwrap();
        let source = block_on(load.load(&url, Format::Module)).unwrap();
        assert_eq!(source.as_deref(), Some("const x: number = 1;"));

        let missing = Url::from_file_path(dir.path().join("missing.ts")).unwrap();
        assert!(matches!(
            block_on(load.load(&missing, Format::Module)),
            Err(LoaderError::Read { .. })
        ));
    }
}
