use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::compiler::input::BytecodeHash;
use crate::compiler::{CompileOptions, CompilerStrategy};
use crate::internal::errors::{Error, Result};
use crate::internal::path::{canonicalize_path, canonicalize_with_base};
use crate::internal::solc::{default_version, parse_version};
use crate::replace::ReplacementValue;

/// Only variables with this prefix are inlined when no explicit environment is given.
pub const ENVIRONMENT_PREFIX: &str = "HEDERAS_";
pub const DEFAULT_CONTRACTS_PATH: &str = "contracts";
pub const DEFAULT_POLYFILLS_DIR: &str = "polyfills";

const PROCESS_ENV: &str = "process.env";

/// Finalised compiler settings for a build's [`crate::compiler::ContractCompiler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
  pub strategy: CompilerStrategy,
  pub solc_version: Version,
  pub compile: CompileOptions,
  pub install_missing: bool,
}

impl Default for CompilerConfig {
  fn default() -> Self {
    CompilerConfig {
      strategy: CompilerStrategy::default(),
      solc_version: default_version(),
      compile: CompileOptions::default(),
      install_missing: false,
    }
  }
}

/// Finalised plugin configuration. Paths are absolute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginConfig {
  pub root: PathBuf,
  pub contracts_path: PathBuf,
  pub recurse: bool,
  pub include_compiler: bool,
  pub compiler_module: Option<PathBuf>,
  pub polyfills_dir: PathBuf,
  pub source_map: bool,
  pub environment: BTreeMap<String, String>,
  pub compiler: CompilerConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractsOptions {
  pub path: Option<PathBuf>,
  pub recurse: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfigOptions {
  pub strategy: Option<CompilerStrategy>,
  pub solc_version: Option<String>,
  pub bytecode_hash: Option<BytecodeHash>,
  pub ignore_warnings: Option<bool>,
  pub install_missing: Option<bool>,
}

/// User-facing overrides, deserialised from the bundler's plugin options object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfigOptions {
  pub root: Option<PathBuf>,
  pub contracts: Option<ContractsOptions>,
  pub include_compiler: Option<bool>,
  pub compiler_module: Option<PathBuf>,
  pub polyfills_dir: Option<PathBuf>,
  pub source_map: Option<bool>,
  pub environment: Option<BTreeMap<String, String>>,
  pub compiler: Option<CompilerConfigOptions>,
}

impl PluginConfigOptions {
  pub fn from_json(value: serde_json::Value) -> Result<Self> {
    serde_json::from_value(value)
      .map_err(|err| Error::Config(format!("invalid plugin options: {err}")))
  }
}

impl CompilerConfig {
  pub fn from_options(options: Option<CompilerConfigOptions>) -> Result<Self> {
    let mut config = CompilerConfig::default();
    let Some(options) = options else {
      return Ok(config);
    };

    if let Some(strategy) = options.strategy {
      config.strategy = strategy;
    }
    if let Some(version) = options.solc_version.as_deref() {
      config.solc_version = parse_version(version)?;
    }
    if let Some(bytecode_hash) = options.bytecode_hash {
      config.compile.bytecode_hash = bytecode_hash;
    }
    if let Some(ignore_warnings) = options.ignore_warnings {
      config.compile.ignore_warnings = ignore_warnings;
    }
    if let Some(install_missing) = options.install_missing {
      config.install_missing = install_missing;
    }
    Ok(config)
  }
}

impl PluginConfig {
  /// Merge `options` onto the defaults, resolving relative paths against `root`.
  pub fn from_options(options: Option<PluginConfigOptions>) -> Result<Self> {
    let options = options.unwrap_or_default();

    let root = match options.root {
      Some(root) => root,
      None => std::env::current_dir().map_err(|err| Error::io("reading working directory", err))?,
    };
    let root = canonicalize_path(&root);

    let contracts = options.contracts.unwrap_or_default();
    let contracts_path = canonicalize_with_base(
      &root,
      &contracts
        .path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTRACTS_PATH)),
    );
    let polyfills_dir = canonicalize_with_base(
      &root,
      &options
        .polyfills_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_POLYFILLS_DIR)),
    );

    let include_compiler = options.include_compiler.unwrap_or(false);
    let compiler_module = options
      .compiler_module
      .map(|module| canonicalize_with_base(&root, &module));
    if include_compiler && compiler_module.is_none() {
      return Err(Error::Config(
        "includeCompiler requires compilerModule to point at the compiler facade".to_string(),
      ));
    }

    let environment = match options.environment {
      Some(environment) => environment,
      None => capture_environment(std::env::vars()),
    };
    if let Some(key) = environment.keys().find(|key| !is_identifier(key)) {
      return Err(Error::Config(format!(
        "environment variable name {key:?} cannot be inlined"
      )));
    }

    Ok(PluginConfig {
      root,
      contracts_path,
      recurse: contracts.recurse.unwrap_or(false),
      include_compiler,
      compiler_module,
      polyfills_dir,
      source_map: options.source_map.unwrap_or(false),
      environment,
      compiler: CompilerConfig::from_options(options.compiler)?,
    })
  }

  /// `process.env.K` for each variable, plus `process.env` for the whole object.
  ///
  /// The object literal is parenthesised so it stays an expression where `{` would open a
  /// block (arrow bodies, statement starts).
  pub fn replacement_rules(&self) -> Result<Vec<(String, ReplacementValue)>> {
    let mut rules = Vec::with_capacity(self.environment.len() + 1);
    for (key, value) in &self.environment {
      rules.push((
        format!("{PROCESS_ENV}.{key}"),
        ReplacementValue::Literal(serde_json::to_string(value)?),
      ));
    }
    rules.push((
      PROCESS_ENV.to_string(),
      ReplacementValue::Literal(format!("({})", serde_json::to_string(&self.environment)?)),
    ));
    Ok(rules)
  }
}

/// Keep the variables carrying [`ENVIRONMENT_PREFIX`].
pub fn capture_environment<I>(vars: I) -> BTreeMap<String, String>
where
  I: IntoIterator<Item = (String, String)>,
{
  vars
    .into_iter()
    .filter(|(key, _)| key.starts_with(ENVIRONMENT_PREFIX))
    .collect()
}

fn is_identifier(key: &str) -> bool {
  let mut chars = key.chars();
  chars
    .next()
    .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
    && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$')
}
