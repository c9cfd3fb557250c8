//! Package.json `exports` / `imports` evaluation.
//!
//! Implements Node.js-compatible target resolution:
//! - Main sugar (`exports: "./index.js"`, arrays, root conditions)
//! - Exact subpath keys (`"./feature"`)
//! - Pattern keys with one `*` (`"./features/*"`, `"./*.js"`), most specific wins
//! - Legacy directory keys ending in `/`
//! - Conditional targets, nested to any depth, with array fallbacks
//!
//! Targets resolve to URLs inside the package; the caller still runs the
//! result through file finalization (extension replacement, existence).

use super::error::ResolveError;
use super::package_config::PackageConfig;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::path::Path;
use url::Url;

/// Conditions active for ESM `import`.
pub const ESM_CONDITIONS: &[&str] = &["node", "import"];

/// Conditions active for CommonJS `require`.
pub const CJS_CONDITIONS: &[&str] = &["node", "require"];

/// Resolves a bare specifier found in an `imports` target.
pub type PackageResolveFn<'a> = &'a dyn Fn(&str) -> Result<Url, ResolveError>;

/// Outcome of evaluating one target value.
#[derive(Debug)]
enum Target {
    Found(Url),
    /// Explicit `null`: the subpath is deliberately not exported.
    Excluded,
    /// No condition matched.
    NoMatch,
}

struct TargetContext<'a> {
    package_json_url: Url,
    package_json_path: &'a Path,
    base: Option<&'a str>,
    conditions: &'a [&'a str],
    /// Only set for `imports`, whose targets may name other packages.
    package_resolve: Option<PackageResolveFn<'a>>,
}

impl TargetContext<'_> {
    fn field(&self) -> &'static str {
        if self.package_resolve.is_some() {
            "imports"
        } else {
            "exports"
        }
    }

    fn invalid_target(&self, subpath: &str, target: &Value) -> ResolveError {
        ResolveError::InvalidPackageTarget {
            package_json: self.package_json_path.to_path_buf(),
            subpath: subpath.to_string(),
            target: target.to_string(),
            field: self.field(),
            base: self.base.map(String::from),
        }
    }

    fn invalid_config(&self, message: &str) -> ResolveError {
        ResolveError::InvalidPackageConfig {
            path: self.package_json_path.to_path_buf(),
            base: self.base.map(String::from),
            message: Some(message.to_string()),
        }
    }
}

/// Resolve `subpath` (`"."` or `"./..."`) through a package's `exports`.
///
/// # Errors
/// `PathNotExported` when no key (or only a `null` target) matches,
/// `InvalidPackageConfig` for malformed maps, `InvalidPackageTarget` for
/// targets escaping the package.
pub fn package_exports_resolve(
    config: &PackageConfig,
    subpath: &str,
    base: Option<&str>,
    conditions: &[&str],
) -> Result<Url, ResolveError> {
    let ctx = context_for(config, base, conditions, None)?;
    let not_exported = || ResolveError::PathNotExported {
        package_json: config.path.clone(),
        subpath: subpath.to_string(),
        base: base.map(String::from),
    };

    let Some(exports) = config.exports.as_ref().filter(|v| !v.is_null()) else {
        return Err(not_exported());
    };

    let sugar_map;
    let map: &Map<String, Value> = if is_conditional_exports_main_sugar(exports, &ctx)? {
        let mut wrapped = Map::new();
        wrapped.insert(".".to_string(), exports.clone());
        sugar_map = wrapped;
        &sugar_map
    } else {
        match exports.as_object() {
            Some(obj) => obj,
            None => return Err(not_exported()),
        }
    };

    if !subpath.contains('*') {
        if let Some(target) = map.get(subpath) {
            return match resolve_package_target(&ctx, target, "", subpath, false)? {
                Target::Found(url) => Ok(url),
                Target::Excluded | Target::NoMatch => Err(not_exported()),
            };
        }
    }

    if let Some(best) = best_match(map, subpath) {
        let target = &map[best.key];
        return match resolve_package_target(&ctx, target, &best.remainder, best.key, best.pattern)?
        {
            Target::Found(url) => Ok(url),
            Target::Excluded | Target::NoMatch => Err(not_exported()),
        };
    }

    Err(not_exported())
}

/// Resolve a `#name` specifier through a package's `imports`.
///
/// # Errors
/// `PackageImportNotDefined` when no key matches.
pub fn package_imports_resolve(
    config: &PackageConfig,
    name: &str,
    base: Option<&str>,
    conditions: &[&str],
    package_resolve: PackageResolveFn<'_>,
) -> Result<Url, ResolveError> {
    let not_defined = || ResolveError::PackageImportNotDefined {
        specifier: name.to_string(),
        package_json: config.path.clone(),
        base: base.map(String::from),
    };

    let ctx = context_for(config, base, conditions, Some(package_resolve))?;
    let Some(imports) = config.imports.as_ref().and_then(Value::as_object) else {
        return Err(not_defined());
    };

    if !name.contains('*') {
        if let Some(target) = imports.get(name) {
            if let Target::Found(url) = resolve_package_target(&ctx, target, "", name, false)? {
                return Ok(url);
            }
            return Err(not_defined());
        }
    }

    if let Some(best) = best_match(imports, name) {
        let target = &imports[best.key];
        if let Target::Found(url) =
            resolve_package_target(&ctx, target, &best.remainder, best.key, best.pattern)?
        {
            return Ok(url);
        }
    }

    Err(not_defined())
}

fn context_for<'a>(
    config: &'a PackageConfig,
    base: Option<&'a str>,
    conditions: &'a [&'a str],
    package_resolve: Option<PackageResolveFn<'a>>,
) -> Result<TargetContext<'a>, ResolveError> {
    if !config.is_valid {
        return Err(ResolveError::InvalidPackageConfig {
            path: config.path.clone(),
            base: base.map(String::from),
            message: None,
        });
    }
    let package_json_url =
        Url::from_file_path(&config.path).map_err(|()| ResolveError::InvalidPackageConfig {
            path: config.path.clone(),
            base: base.map(String::from),
            message: Some("package.json path is not absolute".to_string()),
        })?;
    Ok(TargetContext {
        package_json_url,
        package_json_path: &config.path,
        base,
        conditions,
        package_resolve,
    })
}

/// Whether `exports` only describes the package main (string, array, or an
/// object of condition keys). Mixing `.`-keys with condition keys is an error.
fn is_conditional_exports_main_sugar(
    exports: &Value,
    ctx: &TargetContext<'_>,
) -> Result<bool, ResolveError> {
    match exports {
        Value::String(_) | Value::Array(_) => Ok(true),
        Value::Object(obj) => {
            let mut sugar: Option<bool> = None;
            for key in obj.keys() {
                let is_condition = key.is_empty() || !key.starts_with('.');
                match sugar {
                    None => sugar = Some(is_condition),
                    Some(prev) if prev != is_condition => {
                        return Err(ctx.invalid_config(
                            "\"exports\" cannot contain some keys starting with '.' and some not. \
                             The exports object must either be an object of package subpath keys \
                             or an object of main entry condition name keys only.",
                        ));
                    }
                    Some(_) => {}
                }
            }
            Ok(sugar.unwrap_or(false))
        }
        _ => Ok(false),
    }
}

struct BestMatch<'a> {
    key: &'a str,
    remainder: String,
    pattern: bool,
}

/// Find the most specific pattern (`*`) or directory (`/`) key for `subpath`.
fn best_match<'a>(map: &'a Map<String, Value>, subpath: &str) -> Option<BestMatch<'a>> {
    let mut best: Option<BestMatch<'a>> = None;

    for key in map.keys() {
        let candidate = if let Some(star) = key.find('*') {
            // Only one `*` is allowed in a pattern key
            if key.rfind('*') != Some(star) {
                continue;
            }
            let prefix = &key[..star];
            let trailer = &key[star + 1..];
            if !subpath.starts_with(prefix)
                || subpath.len() < key.len()
                || !subpath.ends_with(trailer)
            {
                continue;
            }
            BestMatch {
                key,
                remainder: subpath[star..subpath.len() - trailer.len()].to_string(),
                pattern: true,
            }
        } else if key.ends_with('/') && subpath.starts_with(key.as_str()) {
            BestMatch {
                key,
                remainder: subpath[key.len()..].to_string(),
                pattern: false,
            }
        } else {
            continue;
        };

        let better = best
            .as_ref()
            .map_or(true, |b| pattern_key_compare(b.key, candidate.key) == Ordering::Greater);
        if better {
            best = Some(candidate);
        }
    }

    best
}

/// Node's pattern key ordering: `Greater` means `b` is more specific than `a`.
fn pattern_key_compare(a: &str, b: &str) -> Ordering {
    let a_star = a.find('*');
    let b_star = b.find('*');
    let base_a = a_star.map_or(a.len(), |i| i + 1);
    let base_b = b_star.map_or(b.len(), |i| i + 1);
    if base_a > base_b {
        return Ordering::Less;
    }
    if base_b > base_a {
        return Ordering::Greater;
    }
    if a_star.is_none() {
        return Ordering::Greater;
    }
    if b_star.is_none() {
        return Ordering::Less;
    }
    b.len().cmp(&a.len())
}

fn resolve_package_target(
    ctx: &TargetContext<'_>,
    target: &Value,
    subpath: &str,
    match_key: &str,
    pattern: bool,
) -> Result<Target, ResolveError> {
    match target {
        Value::String(s) => resolve_target_string(ctx, s, target, subpath, match_key, pattern),
        Value::Array(items) => {
            let mut last_error: Option<ResolveError> = None;
            for item in items {
                match resolve_package_target(ctx, item, subpath, match_key, pattern) {
                    Ok(Target::Found(url)) => return Ok(Target::Found(url)),
                    Ok(Target::NoMatch) => {}
                    Ok(Target::Excluded) => last_error = None,
                    Err(e) if e.is_recoverable_target_error() => last_error = Some(e),
                    Err(e) => return Err(e),
                }
            }
            match last_error {
                Some(e) => Err(e),
                None => Ok(Target::Excluded),
            }
        }
        Value::Object(obj) => {
            if obj.keys().any(|k| is_array_index(k)) {
                return Err(ctx.invalid_config("\"exports\" cannot contain numeric property keys."));
            }
            for (key, value) in obj {
                if key == "default" || ctx.conditions.contains(&key.as_str()) {
                    match resolve_package_target(ctx, value, subpath, match_key, pattern)? {
                        Target::NoMatch => continue,
                        resolved => return Ok(resolved),
                    }
                }
            }
            Ok(Target::NoMatch)
        }
        Value::Null => Ok(Target::Excluded),
        _ => Err(ctx.invalid_target(match_key, target)),
    }
}

fn resolve_target_string(
    ctx: &TargetContext<'_>,
    target: &str,
    raw: &Value,
    subpath: &str,
    match_key: &str,
    pattern: bool,
) -> Result<Target, ResolveError> {
    if !subpath.is_empty() && !pattern && !target.ends_with('/') {
        return Err(ctx.invalid_target(match_key, raw));
    }

    if !target.starts_with("./") {
        if let Some(package_resolve) = ctx.package_resolve {
            if !target.starts_with("../") && !target.starts_with('/') && Url::parse(target).is_err()
            {
                let specifier = if pattern {
                    target.replace('*', subpath)
                } else {
                    format!("{target}{subpath}")
                };
                return package_resolve(&specifier).map(Target::Found);
            }
        }
        return Err(ctx.invalid_target(match_key, raw));
    }

    if has_invalid_segment(&target[2..]) {
        return Err(ctx.invalid_target(match_key, raw));
    }

    let resolved = ctx
        .package_json_url
        .join(target)
        .map_err(|_| ctx.invalid_target(match_key, raw))?;
    let package_root = ctx
        .package_json_url
        .join(".")
        .map_err(|_| ctx.invalid_target(match_key, raw))?;
    let Some(inside) = resolved.path().strip_prefix(package_root.path()) else {
        return Err(ctx.invalid_target(match_key, raw));
    };
    if has_invalid_segment(inside) {
        return Err(ctx.invalid_target(match_key, raw));
    }

    if subpath.is_empty() {
        return Ok(Target::Found(resolved));
    }

    if has_invalid_segment(subpath) {
        return Err(ResolveError::InvalidModuleSpecifier {
            specifier: format!("{match_key}{subpath}"),
            reason: format!(
                "request is not a valid subpath for the \"{}\" resolution of {}",
                ctx.field(),
                ctx.package_json_path.display()
            ),
            base: ctx.base.map(String::from),
        });
    }

    let joined = if pattern {
        Url::parse(&resolved.as_str().replace('*', subpath))
    } else {
        resolved.join(subpath)
    };
    joined
        .map(Target::Found)
        .map_err(|_| ctx.invalid_target(match_key, raw))
}

/// A path segment of `.`, `..` or `node_modules` (either slash style), matched
/// case-insensitively after percent-decoding.
fn has_invalid_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let segment = percent_decode(segment).to_ascii_lowercase();
        segment == "." || segment == ".." || segment == "node_modules"
    })
}

fn percent_decode(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_array_index(key: &str) -> bool {
    key.parse::<u32>()
        .is_ok_and(|n| n != u32::MAX && n.to_string() == key)
}
