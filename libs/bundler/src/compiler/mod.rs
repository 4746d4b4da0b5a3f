use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::internal::errors::{Error, Result};
use crate::registry::FileStorage;
use backend::{BackendLoader, SolcBackend};
use input::{BytecodeHash, CompilationUnit, CompilerRequest, INLINE_SOURCE_NAME};
use output::{CompiledArtifacts, CompilerOutput};
use worker::Worker;

pub mod backend;
pub mod input;
pub mod output;
pub mod worker;

/// Where solc runs: on the calling task, or on a dedicated worker thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompilerStrategy {
  InProcess,
  #[default]
  Worker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileOptions {
  pub bytecode_hash: BytecodeHash,
  /// Accept outputs whose only diagnostics are warnings.
  pub ignore_warnings: bool,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      bytecode_hash: BytecodeHash::None,
      ignore_warnings: true,
    }
  }
}

/// A compile call: exactly one of inline `code` or a `path` registered in file storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileTarget {
  pub code: Option<String>,
  pub path: Option<String>,
}

impl CompileTarget {
  pub fn code(code: impl Into<String>) -> Self {
    Self {
      code: Some(code.into()),
      path: None,
    }
  }

  pub fn path(path: impl Into<String>) -> Self {
    Self {
      code: None,
      path: Some(path.into()),
    }
  }
}

/// Compiler session owned by a single build.
///
/// The backend (or the worker hosting it) is created on first use and reused by every later
/// call; [`ContractCompiler::close`] releases it. Sessions must not be shared between
/// unrelated builds since the registered file storage is part of their state.
pub struct ContractCompiler {
  strategy: CompilerStrategy,
  loader: BackendLoader,
  options: CompileOptions,
  storage: RwLock<Arc<FileStorage>>,
  in_process: OnceCell<Arc<dyn SolcBackend>>,
  worker: Mutex<Option<Arc<Worker>>>,
  workers_spawned: AtomicUsize,
}

impl ContractCompiler {
  pub fn open(strategy: CompilerStrategy, loader: BackendLoader, options: CompileOptions) -> Self {
    Self {
      strategy,
      loader,
      options,
      storage: RwLock::new(Arc::new(FileStorage::new())),
      in_process: OnceCell::new(),
      worker: Mutex::new(None),
      workers_spawned: AtomicUsize::new(0),
    }
  }

  pub fn strategy(&self) -> CompilerStrategy {
    self.strategy
  }

  pub fn options(&self) -> CompileOptions {
    self.options
  }

  /// Replace the file storage that path-based compiles resolve against.
  pub fn register_sources(&self, storage: FileStorage) {
    let mut slot = self
      .storage
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    *slot = Arc::new(storage);
  }

  pub fn file_storage(&self) -> Arc<FileStorage> {
    let slot = self.storage.read().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(&*slot)
  }

  /// Number of worker threads this session has started.
  pub fn workers_spawned(&self) -> usize {
    self.workers_spawned.load(Ordering::SeqCst)
  }

  /// Compile inline code or a registered path.
  ///
  /// Target validation (both or neither given, unknown or escaping path) fails before any
  /// backend is touched. For path targets only contracts defined in that file are returned.
  pub async fn compile(&self, target: CompileTarget) -> Result<CompiledArtifacts> {
    let (request, source) = self.prepare(target)?;
    let output = self.dispatch(request).await?;
    output.into_artifacts(Some(&source), self.options.ignore_warnings)
  }

  /// Compile several units in one request, returning the contracts of all of them.
  pub async fn compile_units(&self, units: Vec<CompilationUnit>) -> Result<CompiledArtifacts> {
    if units.is_empty() {
      return Err(Error::Usage(
        "compile_units requires at least one unit".to_string(),
      ));
    }
    let request = CompilerRequest::new(units, self.options.bytecode_hash);
    let output = self.dispatch(request).await?;
    output.into_artifacts(None, self.options.ignore_warnings)
  }

  fn prepare(&self, target: CompileTarget) -> Result<(CompilerRequest, String)> {
    match (target.code, target.path) {
      (Some(_), Some(_)) => Err(Error::Usage(
        "pass either `code` or `path`, not both".to_string(),
      )),
      (None, None) => Err(Error::Usage(
        "one of `code` or `path` is required".to_string(),
      )),
      (Some(code), None) => {
        let unit = CompilationUnit::new(INLINE_SOURCE_NAME, code);
        let request = CompilerRequest::new([unit], self.options.bytecode_hash);
        Ok((request, INLINE_SOURCE_NAME.to_string()))
      }
      (None, Some(path)) => {
        let storage = self.file_storage();
        let (entry, units) = storage.compilation_units(&path)?;
        let request = CompilerRequest::new(units, self.options.bytecode_hash);
        Ok((request, entry))
      }
    }
  }

  async fn dispatch(&self, request: CompilerRequest) -> Result<CompilerOutput> {
    match self.strategy {
      CompilerStrategy::InProcess => {
        let backend = self.in_process_backend().await?;
        run_blocking(move || backend.compile(&request)).await
      }
      CompilerStrategy::Worker => {
        let worker = self.worker().await?;
        worker.compile(request).await
      }
    }
  }

  /// Loading may install solc and compiling blocks on the binary, so both run on the
  /// blocking pool rather than on an executor thread.
  async fn in_process_backend(&self) -> Result<Arc<dyn SolcBackend>> {
    let backend = self
      .in_process
      .get_or_try_init(|| async {
        let loader = Arc::clone(&self.loader);
        let backend = run_blocking(move || loader()).await?;
        Ok::<_, Error>(Arc::from(backend))
      })
      .await?;
    Ok(Arc::clone(backend))
  }

  async fn worker(&self) -> Result<Arc<Worker>> {
    let mut slot = self.worker.lock().await;
    if let Some(worker) = slot.as_ref() {
      return Ok(Arc::clone(worker));
    }
    let worker = Arc::new(Worker::spawn(Arc::clone(&self.loader))?);
    let spawned = self.workers_spawned.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(spawned, "compiler worker created");
    *slot = Some(Arc::clone(&worker));
    Ok(worker)
  }

  /// Release the worker. Calls still in flight keep their handle until they finish.
  pub async fn close(&self) {
    let worker = self.worker.lock().await.take();
    if let Some(worker) = worker {
      match Arc::try_unwrap(worker) {
        Ok(worker) => worker.shutdown().await,
        Err(shared) => drop(shared),
      }
    }
  }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T> + Send + 'static,
{
  tokio::task::spawn_blocking(work)
    .await
    .map_err(|err| Error::Transport(format!("compiler task failed: {err}")))?
}
