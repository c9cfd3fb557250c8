//! Internal/external classification for the type-checking resolver.
//!
//! A "bucket" is everything under one `node_modules/<package>/` directory
//! (two segments for scoped packages). Files outside `node_modules` share
//! the empty bucket. Once a bucket or file is marked internal it stays
//! internal until explicitly invalidated.

use crate::extensions::is_ts_source_requiring_compilation;
use crate::ts_resolver::ResolvedModule;
use std::cell::RefCell;
use std::collections::HashSet;
use tracing::debug;

const NODE_MODULES_SEGMENT: &str = "/node_modules/";

/// Remembers which buckets and files must be compiled rather than treated
/// as pre-built dependencies.
#[derive(Debug, Default)]
pub struct InternalBucketTracker {
    internal_buckets: RefCell<HashSet<String>>,
    known_internal_files: RefCell<HashSet<String>>,
}

impl InternalBucketTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the bucket containing `file_name` internal.
    ///
    /// Called when a file is explicitly required as a compilation root.
    pub fn mark_bucket_of_filename_internal(&self, file_name: &str) {
        let bucket = module_bucket(file_name);
        if self.internal_buckets.borrow_mut().insert(bucket.to_string()) {
            debug!(bucket, "marked bucket internal");
        }
    }

    #[must_use]
    pub fn is_file_in_internal_bucket(&self, file_name: &str) -> bool {
        self.internal_buckets
            .borrow()
            .contains(module_bucket(file_name))
    }

    #[must_use]
    pub fn is_file_known_to_be_internal(&self, file_name: &str) -> bool {
        self.known_internal_files.borrow().contains(file_name)
    }

    pub fn remember_internal_file(&self, file_name: &str) {
        self.known_internal_files
            .borrow_mut()
            .insert(file_name.to_string());
    }

    /// Flip an external import to internal when it has to be compiled, then
    /// remember every internal result by name.
    pub fn fixup_resolved_module(&self, module: &mut ResolvedModule) {
        let file_name = module.resolved_file_name.as_str();
        if module.is_external_library_import
            && (is_ts_source_requiring_compilation(file_name)
                || self.is_file_known_to_be_internal(file_name)
                || self.is_file_in_internal_bucket(file_name))
        {
            debug!(file = file_name, "treating external import as internal");
            module.is_external_library_import = false;
        }
        if !module.is_external_library_import {
            self.remember_internal_file(file_name);
        }
    }

    /// Forget every internal bucket.
    pub fn invalidate_buckets(&self) {
        self.internal_buckets.borrow_mut().clear();
    }

    /// Forget every file remembered by name.
    pub fn invalidate_known_files(&self) {
        self.known_internal_files.borrow_mut().clear();
    }
}

/// The innermost `.../node_modules/<pkg>/` prefix of `file_name`, or `""`.
#[must_use]
pub fn module_bucket(file_name: &str) -> &str {
    let mut search_end = file_name.len();
    while let Some(idx) = file_name[..search_end].rfind(NODE_MODULES_SEGMENT) {
        let start = idx + NODE_MODULES_SEGMENT.len();
        if let Some(len) = package_dir_len(&file_name[start..]) {
            return &file_name[..start + len];
        }
        // Allow overlapping `/node_modules/node_modules/` matches.
        search_end = idx + NODE_MODULES_SEGMENT.len() - 1;
    }
    ""
}

/// Length of `@scope/name/` or `name/` at the start of `rest`.
fn package_dir_len(rest: &str) -> Option<usize> {
    let segment = |s: &str| s.find('/').filter(|&i| i > 0).map(|i| i + 1);

    if rest.starts_with('@') {
        if let Some(scope) = segment(rest).filter(|&len| len > 2) {
            if let Some(name) = segment(&rest[scope..]) {
                return Some(scope + name);
            }
        }
    }
    segment(rest)
}
