//! Extension policy: which file extensions are compiled, in what order they
//! are preferred, and which TypeScript sources may stand in for a compiled
//! JavaScript extension.
//!
//! Everything here is a pure function of [`ResolverOptions`] and
//! [`CompilerFacts`]; the result is computed once per service and never
//! mutated.

use crate::config::{CompilerFacts, ResolverOptions};
use serde::Serialize;

/// All extensions understood by vanilla node.
pub const VANILLA_NODE_EXTENSIONS: &[&str] = &[".js", ".json", ".node", ".mjs", ".cjs"];

/// Extensions node does not understand without help.
pub const NODE_DOES_NOT_UNDERSTAND: &[&str] = &[".ts", ".tsx", ".jsx", ".cts", ".mts"];

/// TypeScript source extensions that produce emitted JavaScript.
pub const TS_SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".cts"];

/// Declaration-file suffixes; never compiled.
pub const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

const JS_FAMILY: &[&str] = &[".js", ".jsx", ".ts", ".tsx"];
const JSX_FAMILY: &[&str] = &[".jsx", ".tsx"];
const MJS_FAMILY: &[&str] = &[".mjs", ".mts"];
const CJS_FAMILY: &[&str] = &[".cjs", ".cts"];

/// Computed extension lists for one service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionPolicy {
    /// Every extension compiled by the service, in preference order.
    pub compiled: Vec<&'static str>,
    /// Compiled extensions that are TypeScript sources.
    pub compiled_typescript: Vec<&'static str>,
    /// Compiled extensions that are JavaScript (only with `allowJs`).
    pub compiled_javascript: Vec<&'static str>,
    /// Compiled extensions node cannot load on its own.
    pub compiled_node_does_not_understand: Vec<&'static str>,
    pub replacements_for_js: Vec<&'static str>,
    pub replacements_for_jsx: Vec<&'static str>,
    pub replacements_for_mjs: Vec<&'static str>,
    pub replacements_for_cjs: Vec<&'static str>,
    /// Probed, in order, when an ESM specifier omits its extension.
    pub omitted_extension_candidates: Vec<&'static str>,
    /// Probed by legacy `main` resolution.
    pub legacy_main_candidates: Vec<&'static str>,
    /// Extensions that need a newer TypeScript than the one in use.
    pub requires_higher_typescript_version: Vec<&'static str>,
}

impl ExtensionPolicy {
    /// Compute the policy for a configuration.
    #[must_use]
    pub fn new(options: &ResolverOptions, facts: &CompilerFacts) -> Self {
        Self::compute(
            options.prefer_ts_exts,
            facts.allow_js,
            facts.jsx,
            facts.supports_mts_cts(),
        )
    }

    /// Compute the policy from its raw inputs.
    #[must_use]
    pub fn compute(prefer_ts_exts: bool, allow_js: bool, jsx: bool, mts_cts: bool) -> Self {
        let mut requires_higher_typescript_version = Vec::new();
        if !mts_cts {
            requires_higher_typescript_version.extend([".cts", ".cjs", ".mts", ".mjs"]);
        }

        let pool = preference_pool(prefer_ts_exts);

        let mut compiled_unsorted = vec![".ts"];
        if jsx {
            compiled_unsorted.push(".tsx");
        }
        if mts_cts {
            compiled_unsorted.extend([".mts", ".cts"]);
        }
        if allow_js {
            compiled_unsorted.push(".js");
            if jsx {
                compiled_unsorted.push(".jsx");
            }
            if mts_cts {
                compiled_unsorted.extend([".mjs", ".cjs"]);
            }
        }

        let compiled: Vec<&'static str> = pool
            .iter()
            .copied()
            .filter(|ext| compiled_unsorted.contains(ext))
            .collect();

        // Emitted-JS extensions always remain candidates for replacement
        // lists, even when the JS itself is not compiled.
        let replaceable: Vec<&'static str> = pool
            .iter()
            .copied()
            .filter(|ext| {
                compiled_unsorted.contains(ext)
                    || [".js", ".mjs", ".cjs", ".mts", ".cts"].contains(ext)
            })
            .collect();
        let family = |members: &[&str]| -> Vec<&'static str> {
            replaceable
                .iter()
                .copied()
                .filter(|ext| members.contains(ext))
                .collect()
        };

        let replacements_for_js = family(JS_FAMILY);
        let replacements_for_jsx = family(JSX_FAMILY);
        let replacements_for_mjs = family(MJS_FAMILY);
        let replacements_for_cjs = family(CJS_FAMILY);

        let js_or_mjs: Vec<&str> = JS_FAMILY.iter().chain(MJS_FAMILY).copied().collect();
        let mut omitted_extension_candidates = family(&js_or_mjs);
        push_unique(&mut omitted_extension_candidates, ".json");
        push_unique(&mut omitted_extension_candidates, ".node");

        // node does not append .mjs during legacy main resolution
        let mut legacy_main_candidates = replacements_for_js.clone();
        push_unique(&mut legacy_main_candidates, ".json");
        push_unique(&mut legacy_main_candidates, ".node");

        let compiled_typescript = compiled
            .iter()
            .copied()
            .filter(|ext| TS_SOURCE_EXTENSIONS.contains(ext))
            .collect();
        let compiled_javascript = compiled
            .iter()
            .copied()
            .filter(|ext| [".js", ".jsx", ".mjs", ".cjs"].contains(ext))
            .collect();
        let compiled_node_does_not_understand = NODE_DOES_NOT_UNDERSTAND
            .iter()
            .copied()
            .filter(|ext| compiled.contains(ext))
            .collect();

        Self {
            compiled,
            compiled_typescript,
            compiled_javascript,
            compiled_node_does_not_understand,
            replacements_for_js,
            replacements_for_jsx,
            replacements_for_mjs,
            replacements_for_cjs,
            omitted_extension_candidates,
            legacy_main_candidates,
            requires_higher_typescript_version,
        }
    }

    /// Replacement candidates for a compiled-JS extension, or `None` if the
    /// extension is not one node emits.
    #[must_use]
    pub fn replacements_for(&self, ext: &str) -> Option<&[&'static str]> {
        match ext {
            ".js" => Some(&self.replacements_for_js),
            ".jsx" => Some(&self.replacements_for_jsx),
            ".mjs" => Some(&self.replacements_for_mjs),
            ".cjs" => Some(&self.replacements_for_cjs),
            _ => None,
        }
    }

    /// Whether files with this extension are compiled.
    #[must_use]
    pub fn is_compiled(&self, ext: &str) -> bool {
        self.compiled.iter().any(|e| *e == ext)
    }

    /// Extensions node emits for a source extension it does not understand,
    /// so node can be asked how it would classify the emitted file.
    #[must_use]
    pub fn node_equivalents(ext: &str) -> Option<&'static [&'static str]> {
        match ext {
            ".ts" => Some(&[".js"]),
            ".tsx" => Some(&[".js", ".jsx"]),
            ".jsx" => Some(&[".js"]),
            ".mts" => Some(&[".mjs"]),
            ".cts" => Some(&[".cjs"]),
            _ => None,
        }
    }

    /// Emitted extensions the TypeScript resolver understands for a source
    /// extension written in an import specifier.
    #[must_use]
    pub fn ts_resolver_equivalents(ext: &str) -> Option<&'static [&'static str]> {
        match ext {
            ".ts" => Some(&[".js"]),
            ".tsx" => Some(&[".js", ".jsx"]),
            ".mts" => Some(&[".mjs"]),
            ".cts" => Some(&[".cjs"]),
            _ => None,
        }
    }
}

/// Whether a filename is a TypeScript source that always needs compiling:
/// `.ts`/`.mts`/`.cts`, excluding declaration files.
#[must_use]
pub fn is_ts_source_requiring_compilation(file_name: &str) -> bool {
    if DECLARATION_SUFFIXES.iter().any(|s| file_name.ends_with(s)) {
        return false;
    }
    [".ts", ".mts", ".cts"]
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

fn preference_pool(prefer_ts_exts: bool) -> Vec<&'static str> {
    let mut pool = Vec::new();
    let head: &[&'static str] = if prefer_ts_exts {
        NODE_DOES_NOT_UNDERSTAND
    } else {
        &[]
    };
    for ext in head
        .iter()
        .chain(VANILLA_NODE_EXTENSIONS)
        .chain(NODE_DOES_NOT_UNDERSTAND)
    {
        push_unique(&mut pool, *ext);
    }
    pool
}

fn push_unique(list: &mut Vec<&'static str>, ext: &'static str) {
    if !list.contains(&ext) {
        list.push(ext);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_compile_only_ts() {
        let policy = ExtensionPolicy::compute(false, false, false, true);
        assert_eq!(policy.compiled, vec![".ts", ".cts", ".mts"]);
        assert_eq!(policy.replacements_for_js, vec![".js", ".ts"]);
        assert_eq!(policy.replacements_for_mjs, vec![".mjs", ".mts"]);
        assert_eq!(policy.replacements_for_cjs, vec![".cjs", ".cts"]);
        assert!(policy.requires_higher_typescript_version.is_empty());
    }

    #[test]
    fn test_prefer_ts_exts_puts_sources_first() {
        let policy = ExtensionPolicy::compute(true, true, true, true);
        assert_eq!(policy.replacements_for_js, vec![".ts", ".tsx", ".jsx", ".js"]);
        assert_eq!(policy.replacements_for_mjs, vec![".mts", ".mjs"]);
        assert_eq!(policy.replacements_for_jsx, vec![".tsx", ".jsx"]);
        assert_eq!(
            policy.compiled,
            vec![".ts", ".tsx", ".jsx", ".cts", ".mts", ".js", ".mjs", ".cjs"]
        );
    }

    #[test]
    fn test_js_first_without_preference() {
        let policy = ExtensionPolicy::compute(false, true, true, true);
        assert_eq!(policy.replacements_for_js, vec![".js", ".ts", ".tsx", ".jsx"]);
        assert_eq!(policy.compiled_javascript, vec![".js", ".mjs", ".cjs", ".jsx"]);
    }

    #[test]
    fn test_no_duplicates() {
        for prefer in [false, true] {
            let policy = ExtensionPolicy::compute(prefer, true, true, true);
            let mut seen = policy.compiled.clone();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), policy.compiled.len());
        }
    }

    #[test]
    fn test_old_typescript_lacks_mts_cts() {
        let policy = ExtensionPolicy::compute(false, true, false, false);
        assert_eq!(policy.compiled, vec![".js", ".ts"]);
        assert_eq!(
            policy.requires_higher_typescript_version,
            vec![".cts", ".cjs", ".mts", ".mjs"]
        );
        // emitted-JS extensions remain even though their sources are unsupported
        assert_eq!(policy.replacements_for_mjs, vec![".mjs", ".mts"]);
    }

    #[test]
    fn test_omitted_and_legacy_candidates() {
        let policy = ExtensionPolicy::compute(false, false, false, true);
        assert_eq!(
            policy.omitted_extension_candidates,
            vec![".js", ".mjs", ".ts", ".mts", ".json", ".node"]
        );
        assert_eq!(policy.legacy_main_candidates, vec![".js", ".ts", ".json", ".node"]);
    }

    #[test]
    fn test_replacements_for() {
        let policy = ExtensionPolicy::compute(false, false, false, true);
        assert_eq!(policy.replacements_for(".js"), Some(&[".js", ".ts"][..]));
        assert_eq!(policy.replacements_for(".ts"), None);
    }

    #[test]
    fn test_ts_source_requiring_compilation() {
        assert!(is_ts_source_requiring_compilation("/a/b.ts"));
        assert!(is_ts_source_requiring_compilation("/a/b.mts"));
        assert!(!is_ts_source_requiring_compilation("/a/b.d.ts"));
        assert!(!is_ts_source_requiring_compilation("/a/b.d.cts"));
        assert!(!is_ts_source_requiring_compilation("/a/b.tsx"));
        assert!(!is_ts_source_requiring_compilation("/a/b.js"));
    }
}
