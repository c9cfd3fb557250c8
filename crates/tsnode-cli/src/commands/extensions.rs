//! `tsnode extensions`: show the computed extension lists.

use super::Setup;
use miette::Result;
use serde::Serialize;
use tsnode_core::resolver::ExtensionRegistry;
use tsnode_core::ExtensionPolicy;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionsReport<'a> {
    #[serde(flatten)]
    policy: &'a ExtensionPolicy,
    /// `require` probing order once compiled extensions are registered.
    require_extensions: Vec<&'a str>,
}

pub fn run(setup: &Setup, json: bool) -> Result<()> {
    let service = setup.service()?;
    let policy = service.extensions();
    let registry = ExtensionRegistry::for_policy(policy, service.options().prefer_ts_exts);

    let report = ExtensionsReport {
        policy,
        require_extensions: registry.iter().collect(),
    };

    if json {
        return super::print_json(&report);
    }

    let rows: [(&str, &[&str]); 9] = [
        ("compiled", policy.compiled.as_slice()),
        ("typescript", policy.compiled_typescript.as_slice()),
        ("javascript", policy.compiled_javascript.as_slice()),
        ("node cannot load", policy.compiled_node_does_not_understand.as_slice()),
        ("replaces .js", policy.replacements_for_js.as_slice()),
        ("replaces .jsx", policy.replacements_for_jsx.as_slice()),
        ("replaces .mjs", policy.replacements_for_mjs.as_slice()),
        ("replaces .cjs", policy.replacements_for_cjs.as_slice()),
        ("omitted (esm)", policy.omitted_extension_candidates.as_slice()),
    ];
    for (label, exts) in rows {
        println!("{label:<18}{}", exts.join(" "));
    }
    println!("{:<18}{}", "legacy main", policy.legacy_main_candidates.join(" "));
    println!("{:<18}{}", "require order", report.require_extensions.join(" "));
    if !policy.requires_higher_typescript_version.is_empty() {
        println!(
            "{:<18}{}",
            "needs newer tsc",
            policy.requires_higher_typescript_version.join(" ")
        );
    }
    Ok(())
}
