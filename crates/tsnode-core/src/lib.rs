#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! TypeScript-aware module resolution for node's CommonJS and ESM loaders.

pub mod buckets;
pub mod config;
pub mod error;
pub mod extensions;
pub mod loader;
pub mod module_types;
pub mod resolver;
pub mod service;
pub mod ts_resolver;
pub mod version;

pub use buckets::{module_bucket, InternalBucketTracker};
pub use config::{CompilerFacts, ModuleTypeOverride, ResolverOptions, SpecifierResolution};
pub use error::Error;
pub use extensions::ExtensionPolicy;
pub use loader::{EsmHooks, Format, HookGeneration, LoaderError, SourceCompiler};
pub use module_types::{ModuleTypeClassification, ModuleTypeClassifier};
pub use resolver::{
    CjsRequest, CjsResolution, CjsResolverChain, EsmResolution, EsmResolver, ResolveError,
};
pub use service::Service;
pub use ts_resolver::{CompilerModuleResolver, ResolvedModule, ResolverFunctions};
pub use version::VERSION;
