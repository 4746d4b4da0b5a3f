use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::internal::errors::{Error, Result};

// -----------------------------------------------------------------------------
// Standard-JSON output schema (the subset the registry consumes)
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
  Info,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Severity::Error => "error",
      Severity::Warning => "warning",
      Severity::Info => "info",
    };
    f.write_str(label)
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
  pub file: String,
  pub start: i32,
  pub end: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  pub severity: Severity,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub formatted_message: Option<String>,
  #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_location: Option<SourceLocation>,
}

impl Diagnostic {
  pub fn new(severity: Severity, message: impl Into<String>) -> Self {
    Self {
      severity,
      message: message.into(),
      formatted_message: None,
      error_type: None,
      source_location: None,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytecodeObject {
  #[serde(default)]
  pub object: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmOutput {
  #[serde(default)]
  pub bytecode: Option<BytecodeObject>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOutput {
  #[serde(default)]
  pub abi: Vec<Value>,
  #[serde(default)]
  pub evm: Option<EvmOutput>,
}

/// Raw standard-JSON output: `contracts` is keyed by source file, then by contract name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerOutput {
  #[serde(default)]
  pub errors: Vec<Diagnostic>,
  #[serde(default)]
  pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

// -----------------------------------------------------------------------------
// Compiled artifacts handed to callers
// -----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompiledContract {
  pub name: String,
  pub source: String,
  pub abi: Vec<Value>,
  pub bytecode: Option<String>,
}

impl CompiledContract {
  /// Keep the ABI fragments only; the bytecode is dropped.
  pub fn into_interface(self) -> Vec<Value> {
    self.abi
  }
}

/// Contracts keyed by name; names defined in more than one source are keyed `<file>:<name>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompiledArtifacts {
  pub contracts: BTreeMap<String, CompiledContract>,
  pub warnings: Vec<Diagnostic>,
}

impl CompiledArtifacts {
  pub fn contract(&self, name: &str) -> Option<&CompiledContract> {
    self.contracts.get(name)
  }

  pub fn len(&self) -> usize {
    self.contracts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.contracts.is_empty()
  }
}

impl CompilerOutput {
  pub fn has_errors(&self) -> bool {
    self
      .errors
      .iter()
      .any(|diagnostic| diagnostic.severity == Severity::Error)
  }

  /// Apply the diagnostic policy and flatten the contracts map.
  ///
  /// Error diagnostics always fail. Warnings fail unless `ignore_warnings` is set, in which
  /// case they are carried on the artifacts. When `source` is given only contracts defined
  /// in that file are kept.
  pub fn into_artifacts(self, source: Option<&str>, ignore_warnings: bool) -> Result<CompiledArtifacts> {
    if self.has_errors() {
      let errors = self
        .errors
        .into_iter()
        .filter(|diagnostic| diagnostic.severity == Severity::Error)
        .collect();
      return Err(Error::Compilation(errors));
    }

    let warnings: Vec<Diagnostic> = self
      .errors
      .into_iter()
      .filter(|diagnostic| diagnostic.severity == Severity::Warning)
      .collect();
    if !warnings.is_empty() && !ignore_warnings {
      return Err(Error::Compilation(warnings));
    }

    let selected: Vec<(String, String, ContractOutput)> = self
      .contracts
      .into_iter()
      .filter(|(file, _)| source.map_or(true, |wanted| wanted == file))
      .flat_map(|(file, set)| {
        set
          .into_iter()
          .map(move |(name, contract)| (file.clone(), name, contract))
      })
      .collect();

    let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
    for (_, name, _) in &selected {
      *occurrences.entry(name.clone()).or_default() += 1;
    }
    let contracts = selected
      .into_iter()
      .map(|(file, name, contract)| {
        let key = if occurrences.get(&name).copied().unwrap_or(0) > 1 {
          format!("{file}:{name}")
        } else {
          name.clone()
        };
        (key, standard_contract(name, &file, contract))
      })
      .collect();

    Ok(CompiledArtifacts {
      contracts,
      warnings,
    })
  }
}

fn standard_contract(name: String, source: &str, contract: ContractOutput) -> CompiledContract {
  let bytecode = contract
    .evm
    .and_then(|evm| evm.bytecode)
    .map(|bytecode| normalize_bytecode(&bytecode.object))
    .filter(|object| !object.is_empty());

  CompiledContract {
    name,
    source: source.to_string(),
    abi: contract.abi,
    bytecode,
  }
}

/// `0x`-prefix valid hex objects; unlinked library placeholders are returned untouched.
fn normalize_bytecode(object: &str) -> String {
  let trimmed = object.trim_start_matches("0x");
  if trimmed.is_empty() {
    return String::new();
  }
  match hex::decode(trimmed) {
    Ok(bytes) => format!("0x{}", hex::encode(bytes)),
    Err(_) => object.to_string(),
  }
}
