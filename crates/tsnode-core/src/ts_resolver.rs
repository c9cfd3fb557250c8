//! Resolution entry points used by the type checker.
//!
//! The compiler's own per-name resolver is injected through
//! [`CompilerModuleResolver`]; [`ResolverFunctions`] wraps it so that every
//! hit is classified internal or external the same way the runtime loader
//! would compile it.

use crate::buckets::InternalBucketTracker;
use crate::extensions::ExtensionPolicy;
use crate::resolver::{CjsRequest, CjsResolverChain};
use crate::service::Service;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;
use tsnode_util::path::normalize_slashes;

/// A module the compiler resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub resolved_file_name: String,
    /// True when the compiler considers this a pre-built dependency.
    pub is_external_library_import: bool,
    pub extension: Option<String>,
}

/// The compiler's single-name resolvers.
pub trait CompilerModuleResolver {
    fn resolve_module_name(&self, name: &str, containing_file: &str) -> Option<ResolvedModule>;

    /// `type_roots` overrides the configured `typeRoots` when set.
    fn resolve_type_reference_directive(
        &self,
        name: &str,
        containing_file: &str,
        type_roots: Option<&[PathBuf]>,
    ) -> Option<ResolvedModule>;
}

/// `resolveModuleNames` / `resolveTypeReferenceDirectives` for one service.
#[derive(Debug)]
pub struct ResolverFunctions<R> {
    service: Rc<Service>,
    resolver: R,
    require: CjsResolverChain,
}

impl<R: CompilerModuleResolver> ResolverFunctions<R> {
    #[must_use]
    pub fn new(service: Rc<Service>, resolver: R) -> Self {
        let require = CjsResolverChain::for_service(Rc::clone(&service));
        Self {
            service,
            resolver,
            require,
        }
    }

    fn buckets(&self) -> &InternalBucketTracker {
        self.service.buckets()
    }

    pub fn resolve_module_names(
        &self,
        names: &[&str],
        containing_file: &str,
    ) -> Vec<Option<ResolvedModule>> {
        names
            .iter()
            .map(|name| {
                let mut resolved = self.resolver.resolve_module_name(name, containing_file);
                if resolved.is_none() && self.service.options().experimental_ts_import_specifiers {
                    resolved = self.resolve_with_swapped_extension(name, containing_file);
                }
                resolved.map(|mut module| {
                    self.buckets().fixup_resolved_module(&mut module);
                    module
                })
            })
            .collect()
    }

    /// Retry `./x.ts` as `./x.js` (and friends) when the compiler does not
    /// accept source extensions in specifiers.
    fn resolve_with_swapped_extension(
        &self,
        name: &str,
        containing_file: &str,
    ) -> Option<ResolvedModule> {
        let ext = name.rfind('.').map_or("", |i| &name[i..]);
        let replacements = ExtensionPolicy::ts_resolver_equivalents(ext)?;
        let stem = &name[..name.len() - ext.len()];
        replacements.iter().find_map(|replacement| {
            let swapped = format!("{stem}{replacement}");
            let hit = self.resolver.resolve_module_name(&swapped, containing_file);
            if hit.is_some() {
                debug!(name, swapped = %swapped, "resolved with swapped extension");
            }
            hit
        })
    }

    pub fn resolve_type_reference_directives(
        &self,
        names: &[&str],
        containing_file: &str,
    ) -> Vec<Option<ResolvedModule>> {
        names
            .iter()
            .map(|name| {
                let mut resolved =
                    self.resolver
                        .resolve_type_reference_directive(name, containing_file, None);
                if resolved.is_none() && *name == "node" {
                    if let Some(type_root) = self.types_node_root() {
                        debug!(type_root = %type_root.display(), "retrying @types/node");
                        resolved = self.resolver.resolve_type_reference_directive(
                            name,
                            containing_file,
                            Some(std::slice::from_ref(&type_root)),
                        );
                    }
                }
                resolved.map(|mut module| {
                    self.buckets().fixup_resolved_module(&mut module);
                    module
                })
            })
            .collect()
    }

    /// Directory holding `@types/node`, found by requiring its manifest from the cwd.
    fn types_node_root(&self) -> Option<PathBuf> {
        let resolved = self
            .require
            .resolve(CjsRequest::new("@types/node/package.json", None))
            .ok()?;
        resolved
            .as_path()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .map(Path::to_path_buf)
    }

    pub fn mark_bucket_of_filename_internal(&self, file_name: &str) {
        self.buckets()
            .mark_bucket_of_filename_internal(&normalize_slashes(file_name));
    }

    #[must_use]
    pub fn is_file_known_to_be_internal(&self, file_name: &str) -> bool {
        self.buckets()
            .is_file_known_to_be_internal(&normalize_slashes(file_name))
    }
}
