#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::fn_params_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use commands::Setup;
use miette::Result;
use std::path::PathBuf;
use tsnode_core::CompilerFacts;

#[derive(Parser, Debug)]
#[command(name = "tsnode")]
#[command(author, version, about = "Inspect TypeScript-aware Node module resolution", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Resolver options file (JSON with camelCase keys)
    #[arg(long, global = true, value_name = "FILE", env = "TSNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Treat JavaScript as compiled source (compilerOptions.allowJs)
    #[arg(long, global = true)]
    allow_js: bool,

    /// Enable .tsx/.jsx (compilerOptions.jsx is set)
    #[arg(long, global = true)]
    jsx: bool,

    /// TypeScript version in use; below 4.5 disables .mts/.cts
    #[arg(long, global = true, value_name = "VERSION", default_value = "5.0.0")]
    typescript_version: semver::Version,

    /// Prefer TypeScript sources over same-named JavaScript
    #[arg(long, global = true)]
    prefer_ts_exts: bool,

    /// Map `.js` requires onto TypeScript sources
    #[arg(long, global = true)]
    experimental_resolver: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve a specifier the way node would with TypeScript support
    Resolve {
        /// The import or require specifier
        specifier: String,

        /// Importing file (omit to resolve as the entry point)
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,

        /// Use CommonJS `require` resolution instead of ESM
        #[arg(long)]
        cjs: bool,
    },

    /// Print the module format the loader assigns to a file
    Format {
        /// File to classify
        file: PathBuf,
    },

    /// Print the computed extension lists
    Extensions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd_explicit = cli.cwd.is_some();
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    logging::init(cli.verbose, cli.json);

    let setup = Setup {
        cwd,
        cwd_explicit,
        config: cli.config,
        facts: CompilerFacts::default()
            .with_allow_js(cli.allow_js)
            .with_jsx(cli.jsx)
            .with_typescript_version(cli.typescript_version),
        prefer_ts_exts: cli.prefer_ts_exts,
        experimental_resolver: cli.experimental_resolver,
    };

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Resolve {
            specifier,
            from,
            cjs,
        }) => commands::resolve::run(&setup, &specifier, from.as_deref(), cjs, cli.json),
        Some(Commands::Format { file }) => commands::format::run(&setup, &file, cli.json),
        Some(Commands::Extensions) => commands::extensions::run(&setup, cli.json),
    }
}
