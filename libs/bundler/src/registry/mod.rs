use std::collections::BTreeMap;
use std::path::Path;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::compiler::output::CompiledArtifacts;
use crate::compiler::{CompileTarget, ContractCompiler};
use crate::internal::path::SOLIDITY_EXTENSION;
use crate::scanner::scan;

pub mod render;
mod storage;

pub use render::{render_interface_module, render_source_storage_module};
pub use storage::FileStorage;

/// ABI fragments of one contract, or the reason they could not be produced.
pub type EntryOutcome = std::result::Result<Vec<Value>, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
  pub contract_name: String,
  pub interface: EntryOutcome,
}

/// Contract interfaces keyed by source path (extension stripped).
///
/// A file holding several contracts contributes one `<path>:<Contract>` entry per contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceRegistry {
  entries: BTreeMap<String, RegistryEntry>,
}

impl InterfaceRegistry {
  pub fn insert(&mut self, key: impl Into<String>, entry: RegistryEntry) {
    self.entries.insert(key.into(), entry);
  }

  pub fn get(&self, key: &str) -> Option<&RegistryEntry> {
    self.entries.get(key)
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
    self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
  }

  pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
    self.iter().filter_map(|(key, entry)| match &entry.interface {
      Err(message) => Some((key, message.as_str())),
      Ok(_) => None,
    })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn insert_artifacts(&mut self, key: &str, artifacts: CompiledArtifacts) {
    if artifacts.is_empty() {
      self.insert(
        key,
        RegistryEntry {
          contract_name: file_stem(key).to_string(),
          interface: Ok(Vec::new()),
        },
      );
      return;
    }

    let single = artifacts.len() == 1;
    for (name, contract) in artifacts.contracts {
      let entry_key = if single {
        key.to_string()
      } else {
        format!("{key}:{name}")
      };
      self.insert(
        entry_key,
        RegistryEntry {
          contract_name: name,
          interface: Ok(contract.into_interface()),
        },
      );
    }
  }
}

/// Builds both registries for one contracts root, sharing the build's compiler session.
pub struct RegistryBuilder<'a> {
  compiler: &'a ContractCompiler,
}

impl<'a> RegistryBuilder<'a> {
  pub fn new(compiler: &'a ContractCompiler) -> Self {
    Self { compiler }
  }

  /// Read every discovered source into a [`FileStorage`]. Unreadable files are skipped.
  pub async fn build_source_storage_registry(&self, root: &Path, recurse: bool) -> FileStorage {
    let entries = scan(root, recurse).await;
    let reads = entries.iter().map(|entry| async move {
      let content = tokio::fs::read_to_string(entry.path(root)).await;
      (entry.key(false), content)
    });

    let mut storage = FileStorage::new();
    for (key, content) in join_all(reads).await {
      let inserted = match content {
        Ok(content) => storage.insert(&key, content).map_err(|err| err.to_string()),
        Err(err) => Err(err.to_string()),
      };
      if let Err(err) = inserted {
        warn!(file = %key, %err, "skipping unreadable contract source");
      }
    }
    debug!(root = %root.display(), files = storage.len(), "source storage built");
    storage
  }

  /// Compile every discovered source concurrently and collect the ABIs.
  ///
  /// Sources are registered with the compiler first so imports between them resolve.
  /// A file that fails to compile yields a failed entry; the other entries are unaffected.
  pub async fn build_interface_registry(&self, root: &Path, recurse: bool) -> InterfaceRegistry {
    let storage = self.build_source_storage_registry(root, recurse).await;
    let paths: Vec<String> = storage.iter().map(|(path, _)| path.to_string()).collect();
    self.compiler.register_sources(storage);

    let compiles = paths.iter().map(|path| async move {
      let result = self.compiler.compile(CompileTarget::path(path.as_str())).await;
      (path, result)
    });

    let mut registry = InterfaceRegistry::default();
    for (path, result) in join_all(compiles).await {
      let key = strip_extension(path);
      match result {
        Ok(artifacts) => registry.insert_artifacts(key, artifacts),
        Err(err) => {
          warn!(contract = %key, %err, "contract failed to compile");
          registry.insert(
            key,
            RegistryEntry {
              contract_name: file_stem(key).to_string(),
              interface: Err(err.to_string()),
            },
          );
        }
      }
    }
    registry
  }
}

fn strip_extension(path: &str) -> &str {
  path
    .strip_suffix(SOLIDITY_EXTENSION)
    .and_then(|rest| rest.strip_suffix('.'))
    .unwrap_or(path)
}

fn file_stem(key: &str) -> &str {
  key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compiler::{CompileOptions, CompilerStrategy};
  use crate::test_utils::FakeSolc;
  use std::fs;

  fn fixture() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    fs::write(
      root.join("a.sol"),
      "contract A {\n  function get() public view returns (uint) { return 1; }\n  function hidden() private {}\n}\n",
    )
    .unwrap();
    fs::create_dir_all(root.join("inner")).unwrap();
    fs::write(
      root.join("inner").join("b.sol"),
      "import \"../a.sol\";\ncontract B {\n  function set(uint v) external {}\n}\n",
    )
    .unwrap();
    temp
  }

  fn names(entry: &RegistryEntry) -> Vec<String> {
    entry
      .interface
      .as_ref()
      .expect("resolved interface")
      .iter()
      .filter_map(|fragment| fragment["name"].as_str().map(str::to_string))
      .collect()
  }

  fn compiler(strategy: CompilerStrategy) -> ContractCompiler {
    let (_, loader) = FakeSolc::loader();
    ContractCompiler::open(strategy, loader, CompileOptions::default())
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn keys_follow_relative_paths() {
    let temp = fixture();
    let compiler = compiler(CompilerStrategy::Worker);
    let registry = RegistryBuilder::new(&compiler)
      .build_interface_registry(temp.path(), true)
      .await;

    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["a", "inner/b"]);
    assert_eq!(names(registry.get("a").unwrap()), vec!["get"]);
    assert_eq!(names(registry.get("inner/b").unwrap()), vec!["set"]);
    assert_eq!(registry.get("inner/b").unwrap().contract_name, "B");
    assert_eq!(compiler.workers_spawned(), 1);
    compiler.close().await;
  }

  #[tokio::test]
  async fn flat_registry_skips_nested_sources() {
    let temp = fixture();
    let compiler = compiler(CompilerStrategy::InProcess);
    let registry = RegistryBuilder::new(&compiler)
      .build_interface_registry(temp.path(), false)
      .await;
    assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["a"]);
  }

  #[tokio::test]
  async fn failing_file_is_isolated() {
    let temp = fixture();
    fs::write(temp.path().join("broken.sol"), "contract Broken { BROKEN }").unwrap();
    let compiler = compiler(CompilerStrategy::InProcess);
    let registry = RegistryBuilder::new(&compiler)
      .build_interface_registry(temp.path(), true)
      .await;

    assert_eq!(registry.len(), 3);
    let failures: Vec<_> = registry.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "broken");
    assert!(failures[0].1.contains("Expected ';'"));
    assert_eq!(names(registry.get("a").unwrap()), vec!["get"]);
  }

  #[tokio::test]
  async fn multi_contract_files_get_one_entry_per_contract() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
      temp.path().join("pair.sol"),
      "contract Left { function l() public {} }\ncontract Right { function r() public {} }\n",
    )
    .unwrap();
    let compiler = compiler(CompilerStrategy::InProcess);
    let registry = RegistryBuilder::new(&compiler)
      .build_interface_registry(temp.path(), false)
      .await;

    assert_eq!(
      registry.keys().collect::<Vec<_>>(),
      vec!["pair:Left", "pair:Right"]
    );
    assert_eq!(names(registry.get("pair:Right").unwrap()), vec!["r"]);
  }

  #[tokio::test]
  async fn source_storage_keeps_extensions_and_raw_text() {
    let temp = fixture();
    let compiler = compiler(CompilerStrategy::InProcess);
    let storage = RegistryBuilder::new(&compiler)
      .build_source_storage_registry(temp.path(), true)
      .await;

    assert_eq!(
      storage.iter().map(|(path, _)| path).collect::<Vec<_>>(),
      vec!["a.sol", "inner/b.sol"]
    );
    assert!(storage.get("inner/b.sol").unwrap().starts_with("import \"../a.sol\";"));
  }

  #[tokio::test]
  async fn missing_root_produces_empty_registries() {
    let temp = tempfile::tempdir().unwrap();
    let compiler = compiler(CompilerStrategy::InProcess);
    let builder = RegistryBuilder::new(&compiler);
    let missing = temp.path().join("nope");
    assert!(builder.build_interface_registry(&missing, true).await.is_empty());
    assert!(builder.build_source_storage_registry(&missing, true).await.is_empty());
  }

  #[test]
  fn strips_only_the_solidity_extension() {
    assert_eq!(strip_extension("inner/b.sol"), "inner/b");
    assert_eq!(strip_extension("inner/notsol"), "inner/notsol");
    assert_eq!(file_stem("inner/b"), "b");
  }
}
