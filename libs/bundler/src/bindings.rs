//! Node-API surface used by the Rollup plugin wrapper.

use std::collections::HashMap;

use napi::bindgen_prelude::*;
use serde_json::Value;

use crate::compiler::backend::NativeSolc;
use crate::compiler::{CompileTarget, ContractCompiler};
use crate::internal::config::{CompilerConfig, CompilerConfigOptions, PluginConfig, PluginConfigOptions};
use crate::internal::errors::{Error, Result as CrateResult};
use crate::internal::logging::init_tracing;
use crate::plugin::{BundlerPlugin, ResolvedId};
use crate::registry::FileStorage;
use crate::replace::Replaced;

#[napi(object, js_name = "ResolvedId")]
pub struct JsResolvedId {
  pub id: String,
  pub external: bool,
}

impl From<ResolvedId> for JsResolvedId {
  fn from(resolved: ResolvedId) -> Self {
    Self {
      id: resolved.id,
      external: resolved.external,
    }
  }
}

#[napi(object, js_name = "TransformResult")]
pub struct JsTransformResult {
  pub code: String,
  pub map: Option<String>,
}

impl From<Replaced> for JsTransformResult {
  fn from(replaced: Replaced) -> Self {
    Self {
      code: replaced.code,
      map: replaced.map,
    }
  }
}

#[napi(object, js_name = "CompileTarget")]
pub struct JsCompileTarget {
  pub code: Option<String>,
  pub path: Option<String>,
}

#[napi(js_name = "StratoPlugin")]
pub struct JsBundlerPlugin {
  inner: BundlerPlugin,
}

#[napi]
impl JsBundlerPlugin {
  #[napi(constructor, ts_args_type = "options?: StratoPluginOptions | undefined")]
  pub fn new(options: Option<Value>) -> Result<Self> {
    init_tracing();
    let options = options.map(PluginConfigOptions::from_json).transpose()?;
    let config = PluginConfig::from_options(options)?;
    Ok(Self {
      inner: BundlerPlugin::new(config)?,
    })
  }

  #[napi(getter)]
  pub fn name(&self) -> String {
    self.inner.name().to_string()
  }

  #[napi]
  pub fn resolve_id(&self, importee: String, importer: Option<String>) -> Option<JsResolvedId> {
    self
      .inner
      .resolve_id(&importee, importer.as_deref())
      .map(Into::into)
  }

  #[napi]
  pub async fn load(&self, id: String) -> Result<Option<String>> {
    Ok(self.inner.load(&id).await?)
  }

  #[napi]
  pub fn transform(&self, code: String, id: String) -> Option<JsTransformResult> {
    self.inner.transform(&code, &id).map(Into::into)
  }

  #[napi]
  pub fn render_chunk(&self, code: String, file: String) -> Option<JsTransformResult> {
    self.inner.render_chunk(&code, &file).map(Into::into)
  }

  #[napi]
  pub async fn close(&self) {
    self.inner.close().await;
  }
}

#[napi(js_name = "ContractCompiler")]
pub struct JsContractCompiler {
  inner: ContractCompiler,
}

#[napi]
impl JsContractCompiler {
  #[napi(constructor, ts_args_type = "options?: CompilerOptions | undefined")]
  pub fn new(options: Option<Value>) -> Result<Self> {
    init_tracing();
    let options = options.map(parse_compiler_options).transpose()?;
    let config = CompilerConfig::from_options(options)?;
    let loader = NativeSolc::loader(config.solc_version.clone(), config.install_missing);
    Ok(Self {
      inner: ContractCompiler::open(config.strategy, loader, config.compile),
    })
  }

  /// Sources that `compile({ path })` resolves against, keyed by virtual path.
  #[napi]
  pub fn register_sources(&self, sources: HashMap<String, String>) -> Result<()> {
    let mut storage = FileStorage::new();
    for (path, content) in sources {
      storage.insert(&path, content)?;
    }
    self.inner.register_sources(storage);
    Ok(())
  }

  #[napi(ts_return_type = "Promise<CompiledArtifacts>")]
  pub async fn compile(&self, target: JsCompileTarget) -> Result<Value> {
    let artifacts = self
      .inner
      .compile(CompileTarget {
        code: target.code,
        path: target.path,
      })
      .await?;
    Ok(serde_json::to_value(artifacts).map_err(Error::from)?)
  }

  #[napi]
  pub async fn close(&self) {
    self.inner.close().await;
  }
}

fn parse_compiler_options(value: Value) -> CrateResult<CompilerConfigOptions> {
  serde_json::from_value(value)
    .map_err(|err| Error::Config(format!("invalid compiler options: {err}")))
}
