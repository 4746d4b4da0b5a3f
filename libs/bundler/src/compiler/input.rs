use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Virtual file name used when compiling an inline source string.
pub const INLINE_SOURCE_NAME: &str = "__VIRTUAL__.sol";

/// Metadata hash appended to emitted bytecode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BytecodeHash {
  #[default]
  None,
  Ipfs,
}

/// One source handed to solc under a virtual file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationUnit {
  pub file_name: String,
  pub content: String,
}

impl CompilationUnit {
  pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      file_name: file_name.into(),
      content: content.into(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContent {
  pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSettings {
  pub bytecode_hash: BytecodeHash,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSettings {
  pub metadata: MetadataSettings,
  pub output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Standard-JSON compiler input: `{ language, settings, sources }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerRequest {
  pub language: String,
  pub settings: RequestSettings,
  pub sources: BTreeMap<String, SourceContent>,
}

impl CompilerRequest {
  /// Group `units` into a single request selecting every output of every contract.
  pub fn new(units: impl IntoIterator<Item = CompilationUnit>, bytecode_hash: BytecodeHash) -> Self {
    let wildcard = BTreeMap::from([(
      "*".to_string(),
      BTreeMap::from([("*".to_string(), vec!["*".to_string()])]),
    )]);
    let sources = units
      .into_iter()
      .map(|unit| {
        (
          unit.file_name,
          SourceContent {
            content: unit.content,
          },
        )
      })
      .collect();

    Self {
      language: "Solidity".to_string(),
      settings: RequestSettings {
        metadata: MetadataSettings { bytecode_hash },
        output_selection: wildcard,
      },
      sources,
    }
  }
}
