use miette::Result;
use serde::Serialize;
use tsnode_core::version::{version_string, VERSION};

#[derive(Serialize)]
struct VersionReport {
    name: &'static str,
    version: &'static str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        return super::print_json(&VersionReport {
            name: "tsnode",
            version: VERSION,
        });
    }
    println!("{}", version_string());
    Ok(())
}
