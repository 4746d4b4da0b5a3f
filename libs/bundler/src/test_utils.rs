//! In-memory solc stand-in for tests: derives an ABI from the public and external
//! functions declared in each source.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde_json::json;
use tokio::runtime::Handle;

use crate::compiler::backend::{BackendLoader, SolcBackend};
use crate::compiler::input::CompilerRequest;
use crate::compiler::output::{
  BytecodeObject, CompilerOutput, ContractOutput, Diagnostic, EvmOutput, Severity, SourceLocation,
};
use crate::internal::errors::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeStats {
  pub loads: AtomicUsize,
  pub compiles: AtomicUsize,
}

impl FakeStats {
  pub fn loads(&self) -> usize {
    self.loads.load(Ordering::SeqCst)
  }

  pub fn compiles(&self) -> usize {
    self.compiles.load(Ordering::SeqCst)
  }
}

pub(crate) struct FakeSolc {
  stats: Arc<FakeStats>,
}

impl FakeSolc {
  pub fn loader() -> (Arc<FakeStats>, BackendLoader) {
    let stats = Arc::new(FakeStats::default());
    let shared = Arc::clone(&stats);
    let loader: BackendLoader = Arc::new(move || {
      shared.loads.fetch_add(1, Ordering::SeqCst);
      Ok(Box::new(FakeSolc {
        stats: Arc::clone(&shared),
      }) as Box<dyn SolcBackend>)
    });
    (stats, loader)
  }
}

/// Like svm installs, loading and compiling drive a future with `Handle::block_on`, which
/// panics when called from an async task.
pub(crate) fn runtime_bound_loader() -> (Arc<FakeStats>, BackendLoader) {
  let (stats, inner) = FakeSolc::loader();
  let loader: BackendLoader = Arc::new(move || {
    Handle::current().block_on(async {});
    let backend = inner()?;
    Ok(Box::new(RuntimeBound(backend)) as Box<dyn SolcBackend>)
  });
  (stats, loader)
}

struct RuntimeBound(Box<dyn SolcBackend>);

impl SolcBackend for RuntimeBound {
  fn compile(&self, request: &CompilerRequest) -> Result<CompilerOutput> {
    Handle::current().block_on(async {});
    self.0.compile(request)
  }
}

pub(crate) fn failing_loader(message: &'static str) -> BackendLoader {
  Arc::new(move || Err(Error::Config(message.to_string())))
}

impl SolcBackend for FakeSolc {
  fn compile(&self, request: &CompilerRequest) -> Result<CompilerOutput> {
    self.stats.compiles.fetch_add(1, Ordering::SeqCst);
    let mut output = CompilerOutput::default();

    for (file, source) in &request.sources {
      if source.content.contains("BROKEN") {
        let mut diagnostic = Diagnostic::new(Severity::Error, "Expected ';' but got '}'");
        diagnostic.error_type = Some("ParserError".to_string());
        diagnostic.source_location = Some(SourceLocation {
          file: file.clone(),
          start: 0,
          end: 1,
        });
        output.errors.push(diagnostic);
        continue;
      }
      if source.content.contains("WARN") {
        output
          .errors
          .push(Diagnostic::new(Severity::Warning, "Unused local variable."));
      }
      let contracts = parse_contracts(&source.content);
      if !contracts.is_empty() {
        output.contracts.insert(file.clone(), contracts);
      }
    }
    Ok(output)
  }
}

fn parse_contracts(source: &str) -> BTreeMap<String, ContractOutput> {
  let contract_re = Regex::new(r"\b(?:contract|interface|library)\s+(\w+)").unwrap();
  let function_re = Regex::new(r"function\s+(\w+)\s*\(([^)]*)\)([^{;]*)").unwrap();

  let starts: Vec<(usize, String)> = contract_re
    .captures_iter(source)
    .map(|caps| (caps.get(0).unwrap().start(), caps[1].to_string()))
    .collect();

  let mut contracts = BTreeMap::new();
  for (index, (start, name)) in starts.iter().enumerate() {
    let end = starts
      .get(index + 1)
      .map(|(next, _)| *next)
      .unwrap_or(source.len());
    let body = &source[*start..end];
    let abi = function_re
      .captures_iter(body)
      .filter(|caps| caps[3].contains("public") || caps[3].contains("external"))
      .map(|caps| {
        json!({
          "type": "function",
          "name": &caps[1],
          "inputs": [],
          "outputs": [],
          "stateMutability": "nonpayable"
        })
      })
      .collect();
    contracts.insert(
      name.clone(),
      ContractOutput {
        abi,
        evm: Some(EvmOutput {
          bytecode: Some(BytecodeObject {
            object: "6080604052".to_string(),
          }),
        }),
      },
    );
  }
  contracts
}
