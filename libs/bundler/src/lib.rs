#[cfg(feature = "napi")]
#[macro_use]
extern crate napi_derive;

#[cfg(feature = "napi")]
mod bindings;
pub mod compiler;
mod internal;
pub mod plugin;
pub mod registry;
pub mod replace;
pub mod scanner;
#[cfg(test)]
mod test_utils;

#[cfg(feature = "napi")]
pub use bindings::{JsBundlerPlugin, JsCompileTarget, JsContractCompiler, JsResolvedId, JsTransformResult};
pub use compiler::backend::{BackendLoader, NativeSolc, SolcBackend};
pub use compiler::output::{CompiledArtifacts, CompiledContract, Diagnostic, Severity};
pub use compiler::{CompileOptions, CompileTarget, CompilerStrategy, ContractCompiler};
pub use internal::config::{
  capture_environment, CompilerConfig, CompilerConfigOptions, ContractsOptions, PluginConfig,
  PluginConfigOptions, ENVIRONMENT_PREFIX,
};
pub use internal::errors::{Error, Result};
pub use internal::logging::init_tracing;
pub use plugin::{BundlerPlugin, ResolutionTarget, ResolvedId, VirtualModule};
pub use registry::{FileStorage, InterfaceRegistry, RegistryBuilder, RegistryEntry};
pub use replace::{ReplacementValue, Replaced, TextReplacer};
pub use scanner::{scan, SourceFileEntry};
