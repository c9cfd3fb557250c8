//! `tsnode resolve`: run a specifier through the ESM hooks or `require`.

use super::Setup;
use futures::executor::block_on;
use miette::{miette, Result};
use serde::Serialize;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;
use tsnode_core::loader::{NodeDefaultResolve, ResolveContext};
use tsnode_core::resolver::{
    display_url, install_commonjs_resolve_hook, CjsRequest, CjsResolution, CjsResolverChain,
    ExtensionRegistry,
};
use tsnode_core::{EsmHooks, Format, Service, SpecifierResolution};
use tsnode_util::path::extname;
use url::Url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport<'a> {
    specifier: &'a str,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Format>,
    builtin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

#[derive(Serialize)]
struct ErrorReport {
    code: Option<&'static str>,
    message: String,
    tried_extensions: Vec<String>,
}

struct Resolved {
    display: String,
    url: Option<String>,
    format: Option<Format>,
    builtin: bool,
}

struct Failure {
    code: Option<&'static str>,
    message: String,
}

pub fn run(
    setup: &Setup,
    specifier: &str,
    from: Option<&Path>,
    cjs: bool,
    json: bool,
) -> Result<()> {
    let service = setup.service()?;
    let from = from.map(|p| setup.absolutize(p));
    let mode = if cjs { "cjs" } else { "esm" };
    debug!(specifier, mode, from = ?from, "resolving");

    let outcome = if cjs {
        resolve_cjs(&service, specifier, from.as_deref())
    } else {
        resolve_esm(&service, specifier, from.as_deref())?
    };

    let mut report = ResolveReport {
        specifier,
        mode,
        from: from.as_ref().map(|p| p.display().to_string()),
        resolved: None,
        url: None,
        format: None,
        builtin: false,
        error: None,
    };

    match outcome {
        Ok(resolved) => {
            if json {
                report.resolved = Some(resolved.display);
                report.url = resolved.url;
                report.format = resolved.format;
                report.builtin = resolved.builtin;
                return super::print_json(&report);
            }
            match resolved.format {
                Some(format) => println!("{} ({format})", resolved.display),
                None => println!("{}", resolved.display),
            }
            Ok(())
        }
        Err(failure) => {
            let tried = tried_extensions(&service, specifier, cjs);
            if json {
                report.error = Some(ErrorReport {
                    code: failure.code,
                    message: failure.message,
                    tried_extensions: tried,
                });
                super::print_json(&report)?;
                std::process::exit(1);
            }
            let help = if tried.is_empty() {
                "no extension candidates apply to this specifier".to_string()
            } else {
                format!("extension candidates tried: {}", tried.join(", "))
            };
            Err(miette!(
                code = failure.code.unwrap_or("ERR_RESOLVE"),
                help = help,
                "{}",
                failure.message
            ))
        }
    }
}

fn resolve_esm(
    service: &Rc<Service>,
    specifier: &str,
    from: Option<&Path>,
) -> Result<std::result::Result<Resolved, Failure>> {
    let parent_url = match from {
        Some(path) => Some(
            Url::from_file_path(path)
                .map_err(|()| miette!("{} is not an absolute path", path.display()))?,
        ),
        None => None,
    };
    let hooks = EsmHooks::new(Rc::clone(service), ());
    let context = ResolveContext { parent_url };

    Ok(
        match block_on(hooks.resolve(specifier, &context, &NodeDefaultResolve)) {
            Ok(output) => Ok(Resolved {
                display: display_url(&output.url),
                builtin: output.url.scheme() == "node",
                url: Some(output.url.to_string()),
                format: output.format,
            }),
            Err(err) => Err(Failure {
                code: err.code(),
                message: err.to_string(),
            }),
        },
    )
}

fn resolve_cjs(
    service: &Rc<Service>,
    specifier: &str,
    from: Option<&Path>,
) -> std::result::Result<Resolved, Failure> {
    let chain = CjsResolverChain::for_service(Rc::clone(service));
    install_commonjs_resolve_hook(&chain, service);

    let request = match from {
        Some(parent) => CjsRequest::new(specifier, Some(parent)),
        None => CjsRequest::main(specifier),
    };
    match chain.resolve(request) {
        Ok(CjsResolution::Builtin(name)) => Ok(Resolved {
            display: name,
            url: None,
            format: Some(Format::Builtin),
            builtin: true,
        }),
        Ok(CjsResolution::File(path)) => Ok(Resolved {
            url: Url::from_file_path(&path).ok().map(String::from),
            display: path.display().to_string(),
            format: None,
            builtin: false,
        }),
        Err(err) => Err(Failure {
            code: Some(err.code()),
            message: err.to_string(),
        }),
    }
}

/// Extensions resolution would have probed for `specifier`.
fn tried_extensions(service: &Service, specifier: &str, cjs: bool) -> Vec<String> {
    let policy = service.extensions();
    if cjs {
        return ExtensionRegistry::for_policy(policy, service.options().prefer_ts_exts)
            .iter()
            .map(str::to_string)
            .collect();
    }

    let ext = extname(specifier);
    if let Some(replacements) = policy.replacements_for(ext) {
        return replacements.iter().map(|e| (*e).to_string()).collect();
    }
    if ext.is_empty()
        && service.options().experimental_specifier_resolution == SpecifierResolution::Node
    {
        return policy
            .omitted_extension_candidates
            .iter()
            .map(|e| (*e).to_string())
            .collect();
    }
    Vec::new()
}

