//! `tsnode format`: the module format the ESM hooks assign to a file.

use super::Setup;
use futures::executor::block_on;
use miette::{miette, Result};
use serde::Serialize;
use std::path::Path;
use std::rc::Rc;
use tsnode_core::loader::NodeGetFormat;
use tsnode_core::{EsmHooks, Format, ModuleTypeOverride};
use url::Url;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatReport {
    file: String,
    format: Format,
    /// Whether the service leaves this file to node untouched.
    ignored: bool,
    module_type: ModuleTypeOverride,
}

pub fn run(setup: &Setup, file: &Path, json: bool) -> Result<()> {
    let service = setup.service()?;
    let path = setup.absolutize(file);
    let url = Url::from_file_path(&path)
        .map_err(|()| miette!("{} is not an absolute path", path.display()))?;

    let hooks = EsmHooks::new(Rc::clone(&service), ());
    let node = NodeGetFormat::new(Rc::clone(&service));
    let format = block_on(hooks.get_format(&url, &node)).map_err(|err| match err.code() {
        Some(code) => miette!(code = code, "{err}"),
        None => miette!("{err}"),
    })?;

    let ignored = service.ignored(&path);
    let module_type = if ignored {
        ModuleTypeOverride::Package
    } else {
        service.module_types().classify_module(&path).module_type
    };

    if json {
        return super::print_json(&FormatReport {
            file: path.display().to_string(),
            format,
            ignored,
            module_type,
        });
    }

    println!("{format}");
    if ignored {
        println!("  (ignored: node handles this file unchanged)");
    } else if module_type != ModuleTypeOverride::Package {
        println!("  (moduleTypes override: {module_type:?})");
    }
    Ok(())
}
