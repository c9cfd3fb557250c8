//! Module resolution for TypeScript sources under node.
//!
//! Two resolvers share one package config cache: [`EsmResolver`] follows
//! node's ESM algorithm with TypeScript extension mapping, and
//! [`CjsResolverChain`] wraps node's `require` resolution in middleware.

mod cjs;
mod error;
mod esm;
mod exports;
mod package_config;
mod specifier;

pub use cjs::{
    install_commonjs_resolve_hook, CjsMiddleware, CjsRequest, CjsResolution, CjsResolverChain,
    ExtensionRegistry, HookHandle, Next, NodeCjsResolver, TsCjsMiddleware,
    NODE_DEFAULT_EXTENSIONS,
};
pub use error::{codes, LoaderKind, ResolveError};
pub use esm::{display_url, EsmResolution, EsmResolver};
pub use exports::{
    package_exports_resolve, package_imports_resolve, PackageResolveFn, CJS_CONDITIONS,
    ESM_CONDITIONS,
};
pub use package_config::{PackageConfig, PackageConfigCache, PackageType};
pub use specifier::{
    is_builtin, is_relative_or_absolute, is_relative_specifier, parse_package_name, PackageName,
    BUILTIN_MODULES,
};
