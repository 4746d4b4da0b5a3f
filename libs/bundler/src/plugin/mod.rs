use tracing::{debug, trace};

use crate::compiler::backend::{BackendLoader, NativeSolc};
use crate::compiler::ContractCompiler;
use crate::internal::config::PluginConfig;
use crate::internal::errors::Result;
use crate::registry::{render_interface_module, render_source_storage_module, RegistryBuilder};
use crate::replace::{Replaced, TextReplacer};

pub mod resolution;

pub use resolution::{ResolutionTable, ResolutionTarget, ResolvedId, VirtualModule};

pub const PLUGIN_NAME: &str = "strato";

const COMPILER_STUB: &str = "\
export const compile = async () => undefined;
export default { compile };
";

/// Rollup-facing plugin for one build.
///
/// Owns the build's compiler session, the environment replacer and the resolution table.
/// Create one instance per build and call [`BundlerPlugin::close`] when the build ends.
pub struct BundlerPlugin {
  config: PluginConfig,
  compiler: ContractCompiler,
  replacer: TextReplacer,
  resolutions: ResolutionTable,
}

impl BundlerPlugin {
  /// Plugin compiling with the svm-managed solc named in the configuration.
  pub fn new(config: PluginConfig) -> Result<Self> {
    let loader = NativeSolc::loader(
      config.compiler.solc_version.clone(),
      config.compiler.install_missing,
    );
    Self::with_backend(config, loader)
  }

  pub fn with_backend(config: PluginConfig, loader: BackendLoader) -> Result<Self> {
    let replacer = TextReplacer::new(config.replacement_rules()?, config.source_map)?;
    let compiler = ContractCompiler::open(config.compiler.strategy, loader, config.compiler.compile);
    let resolutions = ResolutionTable::new(&config.polyfills_dir);
    debug!(
      contracts = %config.contracts_path.display(),
      recurse = config.recurse,
      strategy = ?config.compiler.strategy,
      variables = config.environment.len(),
      "strato plugin configured"
    );
    Ok(Self {
      config,
      compiler,
      replacer,
      resolutions,
    })
  }

  pub fn name(&self) -> &'static str {
    PLUGIN_NAME
  }

  pub fn config(&self) -> &PluginConfig {
    &self.config
  }

  pub fn compiler(&self) -> &ContractCompiler {
    &self.compiler
  }

  pub fn resolve_id(&self, importee: &str, importer: Option<&str>) -> Option<ResolvedId> {
    let resolved = self.resolutions.resolve(importee)?;
    trace!(importee, ?importer, id = %resolved.id.escape_default(), "intercepted import");
    Some(resolved)
  }

  /// Generate the content of a virtual module; `None` for ids this plugin does not own.
  pub async fn load(&self, id: &str) -> Result<Option<String>> {
    let Some(module) = VirtualModule::from_id(id) else {
      return Ok(None);
    };
    debug!(%module, "loading virtual module");

    let code = match module {
      VirtualModule::InterfaceRegistry => {
        let registry = RegistryBuilder::new(&self.compiler)
          .build_interface_registry(&self.config.contracts_path, self.config.recurse)
          .await;
        render_interface_module(&registry)?
      }
      VirtualModule::SourceStorageRegistry => {
        let storage = RegistryBuilder::new(&self.compiler)
          .build_source_storage_registry(&self.config.contracts_path, self.config.recurse)
          .await;
        render_source_storage_module(&storage, self.replacer.keys())?
      }
      VirtualModule::Compiler => self.compiler_module()?,
    };
    Ok(Some(code))
  }

  /// Inline environment values into a module.
  pub fn transform(&self, code: &str, id: &str) -> Option<Replaced> {
    self.replacer.try_replacing(code, id)
  }

  pub fn render_chunk(&self, code: &str, file: &str) -> Option<Replaced> {
    self.replacer.try_replacing(code, file)
  }

  pub async fn close(&self) {
    self.compiler.close().await;
    debug!("strato plugin closed");
  }

  /// Re-export of the compiler facade when it is bundled, a no-op stub otherwise.
  fn compiler_module(&self) -> Result<String> {
    let module = match (self.config.include_compiler, self.config.compiler_module.as_ref()) {
      (true, Some(module)) => module,
      _ => return Ok(COMPILER_STUB.to_string()),
    };
    let specifier = serde_json::to_string(&module.to_string_lossy())?;
    Ok(format!(
      "export * from {specifier};\nimport * as facade from {specifier};\nexport default facade.default ?? facade;\n"
    ))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::fs;
  use std::path::Path;

  use super::*;
  use crate::compiler::CompilerStrategy;
  use crate::internal::config::{CompilerConfigOptions, ContractsOptions, PluginConfigOptions};
  use crate::test_utils::FakeSolc;

  fn write_contracts(root: &Path) {
    let contracts = root.join("contracts");
    fs::create_dir_all(contracts.join("inner")).unwrap();
    fs::write(
      contracts.join("a.sol"),
      "contract A {\n  function get() public view returns (uint) { return 1; }\n}\n",
    )
    .unwrap();
    fs::write(
      contracts.join("inner").join("b.sol"),
      "contract B {\n  function set(uint v) external {}\n  function _internal() internal {}\n}\n",
    )
    .unwrap();
  }

  fn options(root: &Path, strategy: CompilerStrategy) -> PluginConfigOptions {
    PluginConfigOptions {
      root: Some(root.to_path_buf()),
      contracts: Some(ContractsOptions {
        path: None,
        recurse: Some(true),
      }),
      environment: Some(BTreeMap::from([(
        "HEDERAS_NETWORK".to_string(),
        "testnet".to_string(),
      )])),
      compiler: Some(CompilerConfigOptions {
        strategy: Some(strategy),
        ..Default::default()
      }),
      ..Default::default()
    }
  }

  fn plugin_with_environment(root: &Path, environment: BTreeMap<String, String>) -> BundlerPlugin {
    plugin(PluginConfigOptions {
      environment: Some(environment),
      ..options(root, CompilerStrategy::InProcess)
    })
  }

  fn plugin(options: PluginConfigOptions) -> BundlerPlugin {
    let config = PluginConfig::from_options(Some(options)).unwrap();
    let (_, loader) = FakeSolc::loader();
    BundlerPlugin::with_backend(config, loader).unwrap()
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn interface_registry_module_exports_promised_abis() {
    let temp = tempfile::tempdir().unwrap();
    write_contracts(temp.path());
    let plugin = plugin(options(temp.path(), CompilerStrategy::Worker));

    let resolved = plugin.resolve_id("./ContractRegistry", Some("src/index.js")).unwrap();
    assert_eq!(resolved.id, VirtualModule::InterfaceRegistry.id());
    let code = plugin.load(&resolved.id).await.unwrap().unwrap();

    assert!(code.starts_with("export default {\n"));
    assert!(code.contains("\"a\": Promise.resolve(["));
    assert!(code.contains("\"inner/b\": Promise.resolve(["));
    assert!(code.contains("\"name\":\"get\""));
    assert!(code.contains("\"name\":\"set\""));
    assert!(!code.contains("_internal"));
    assert!(!code.contains("rejected"));
    assert_eq!(plugin.compiler().workers_spawned(), 1);
    plugin.close().await;
  }

  #[tokio::test]
  async fn broken_contracts_only_reject_their_entry() {
    let temp = tempfile::tempdir().unwrap();
    write_contracts(temp.path());
    fs::write(
      temp.path().join("contracts").join("broken.sol"),
      "contract Broken { BROKEN }",
    )
    .unwrap();
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));

    let code = plugin
      .load(&VirtualModule::InterfaceRegistry.id())
      .await
      .unwrap()
      .unwrap();
    assert!(code.starts_with("const rejected = "));
    assert!(code.contains("\"broken\": rejected("));
    assert!(code.contains("\"a\": Promise.resolve("));
  }

  #[tokio::test]
  async fn source_storage_module_inlines_raw_sources() {
    let temp = tempfile::tempdir().unwrap();
    write_contracts(temp.path());
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));

    let id = plugin.resolve_id("ContractsInFileStorage", None).unwrap().id;
    let code = plugin.load(&id).await.unwrap().unwrap();
    assert!(code.contains("\"a.sol\": `contract A {"));
    assert!(code.contains("\"inner/b.sol\": `contract B {"));
    assert_eq!(plugin.compiler().workers_spawned(), 0);
  }

  #[tokio::test]
  async fn missing_contracts_directory_yields_empty_registries() {
    let temp = tempfile::tempdir().unwrap();
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));

    let registry = plugin
      .load(&VirtualModule::InterfaceRegistry.id())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(registry, "export default {\n};\n");
  }

  #[tokio::test]
  async fn compiler_module_is_a_stub_unless_included() {
    let temp = tempfile::tempdir().unwrap();
    let stubbed = plugin(options(temp.path(), CompilerStrategy::InProcess));
    let code = stubbed
      .load(&VirtualModule::Compiler.id())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(code, COMPILER_STUB);

    let facade = temp.path().join("compiler.js");
    fs::write(&facade, "export default {};\n").unwrap();
    let included = plugin(PluginConfigOptions {
      include_compiler: Some(true),
      compiler_module: Some(facade),
      ..options(temp.path(), CompilerStrategy::InProcess)
    });
    let code = included
      .load(&VirtualModule::Compiler.id())
      .await
      .unwrap()
      .unwrap();
    assert!(code.starts_with("export * from \""));
    assert!(code.contains("compiler.js\";\n"));
  }

  #[tokio::test]
  async fn foreign_ids_are_not_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));
    assert_eq!(plugin.load("src/index.js").await.unwrap(), None);
    assert_eq!(plugin.load("\0other:thing").await.unwrap(), None);
    assert_eq!(plugin.resolve_id("lodash", None), None);
  }

  #[test]
  fn transform_and_render_inline_the_environment() {
    let temp = tempfile::tempdir().unwrap();
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));

    let transformed = plugin
      .transform("const net = process.env.HEDERAS_NETWORK;", "src/net.js")
      .unwrap();
    assert_eq!(transformed.code, "const net = \"testnet\";");
    assert_eq!(transformed.map, None);

    let rendered = plugin
      .render_chunk("console.log(process.env);", "index.js")
      .unwrap();
    assert_eq!(rendered.code, "console.log(({\"HEDERAS_NETWORK\":\"testnet\"}));");

    assert_eq!(plugin.transform("const x = 1;", "src/x.js"), None);
    assert_eq!(plugin.name(), "strato");
  }

  #[test]
  fn environment_object_stays_an_expression_in_arrow_bodies() {
    let temp = tempfile::tempdir().unwrap();
    let plugin = plugin(options(temp.path(), CompilerStrategy::InProcess));
    let rendered = plugin
      .render_chunk("const env = () => process.env;", "index.js")
      .unwrap();
    assert_eq!(
      rendered.code,
      "const env = () => ({\"HEDERAS_NETWORK\":\"testnet\"});"
    );

    let empty = plugin_with_environment(temp.path(), BTreeMap::new());
    let rendered = empty.render_chunk("() => process.env", "index.js").unwrap();
    assert_eq!(rendered.code, "() => ({})");
  }

  #[tokio::test]
  async fn inlined_sources_survive_environment_replacement() {
    let temp = tempfile::tempdir().unwrap();
    let contracts = temp.path().join("contracts");
    fs::create_dir_all(&contracts).unwrap();
    fs::write(
      contracts.join("a.sol"),
      "// reads process.env.HEDERAS_NETWORK at deploy\ncontract A {}\n",
    )
    .unwrap();
    let plugin = plugin_with_environment(
      temp.path(),
      BTreeMap::from([("HEDERAS_NETWORK".to_string(), "a`b".to_string())]),
    );

    let id = VirtualModule::SourceStorageRegistry.id();
    let module = plugin.load(&id).await.unwrap().unwrap();
    assert!(module.contains("process\\u002eenv\\u002eHEDERAS_NETWORK"));

    let chunk = format!("{module}\nconsole.log(process.env.HEDERAS_NETWORK);\n");
    let rendered = plugin.render_chunk(&chunk, "index.js").unwrap();
    assert!(rendered.code.starts_with(&module));
    assert!(rendered.code.ends_with("console.log(\"a`b\");\n"));
    assert_eq!(plugin.transform(&module, &id), None);
  }

  #[test]
  fn source_maps_follow_configuration() {
    let temp = tempfile::tempdir().unwrap();
    let plugin = plugin(PluginConfigOptions {
      source_map: Some(true),
      ..options(temp.path(), CompilerStrategy::InProcess)
    });
    let rendered = plugin
      .render_chunk("a(process.env.HEDERAS_NETWORK)", "index.js")
      .unwrap();
    assert!(rendered.map.unwrap().contains("\"mappings\""));
  }
}
