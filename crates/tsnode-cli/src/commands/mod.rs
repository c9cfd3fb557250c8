pub mod extensions;
pub mod format;
pub mod resolve;
pub mod version;

use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tsnode_core::{CompilerFacts, ResolverOptions, Service};

/// Everything needed to build a service, gathered from global flags.
#[derive(Debug, Clone)]
pub struct Setup {
    pub cwd: PathBuf,
    /// Whether `--cwd` was passed; it then wins over a config file's `cwd`.
    pub cwd_explicit: bool,
    pub config: Option<PathBuf>,
    pub facts: CompilerFacts,
    pub prefer_ts_exts: bool,
    pub experimental_resolver: bool,
}

impl Setup {
    pub fn options(&self) -> Result<ResolverOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let mut options =
                    ResolverOptions::from_json_file(&self.absolutize(path)).into_diagnostic()?;
                if self.cwd_explicit {
                    options.cwd.clone_from(&self.cwd);
                }
                options
            }
            None => ResolverOptions::new(self.cwd.clone()),
        };
        if self.prefer_ts_exts {
            options.prefer_ts_exts = true;
        }
        if self.experimental_resolver {
            options.experimental_resolver = true;
        }
        Ok(options.with_env_overrides())
    }

    pub fn service(&self) -> Result<Rc<Service>> {
        let service = Service::new(self.options()?, self.facts.clone()).into_diagnostic()?;
        Ok(Rc::new(service))
    }

    /// Resolve a user-supplied path against the working directory.
    pub fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
