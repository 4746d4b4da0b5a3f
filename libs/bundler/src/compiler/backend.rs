use std::sync::Arc;

use foundry_compilers::solc::Solc;
use semver::Version;
use tracing::debug;

use super::input::CompilerRequest;
use super::output::CompilerOutput;
use crate::internal::errors::{map_err_with_context, Result};
use crate::internal::solc;

/// Something that turns a standard-JSON request into standard-JSON output.
///
/// Compiler diagnostics are part of a successful [`CompilerOutput`]; an `Err` means the
/// compiler itself could not be driven.
pub trait SolcBackend: Send + Sync {
  fn compile(&self, request: &CompilerRequest) -> Result<CompilerOutput>;
}

/// Factory producing a ready backend. Runs once per in-process session and once per worker
/// start, so expensive runtime initialisation (locating or installing solc) happens there.
pub type BackendLoader = Arc<dyn Fn() -> Result<Box<dyn SolcBackend>> + Send + Sync>;

/// A solc binary managed by svm, driven over standard JSON.
pub struct NativeSolc {
  solc: Solc,
}

impl NativeSolc {
  pub fn load(version: &Version, install_missing: bool) -> Result<Self> {
    let solc = solc::ensure_installed(version, install_missing)?;
    Ok(Self { solc })
  }

  pub fn version(&self) -> &Version {
    &self.solc.version
  }

  /// Loader that resolves `version` every time it is invoked.
  pub fn loader(version: Version, install_missing: bool) -> BackendLoader {
    Arc::new(move || {
      let backend = NativeSolc::load(&version, install_missing)?;
      debug!(version = %backend.version(), "solc backend ready");
      Ok(Box::new(backend) as Box<dyn SolcBackend>)
    })
  }
}

impl SolcBackend for NativeSolc {
  fn compile(&self, request: &CompilerRequest) -> Result<CompilerOutput> {
    map_err_with_context(
      self.solc.compile_as::<_, CompilerOutput>(request),
      "Solc compilation failed",
    )
  }
}
