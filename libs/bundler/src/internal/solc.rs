use std::sync::{Mutex, OnceLock};

use foundry_compilers::solc::Solc;
use semver::Version;
use tracing::{debug, info};

use super::errors::{map_err_with_context, Error, Result};

pub(crate) const DEFAULT_SOLC_VERSION: &str = "0.8.30";

pub(crate) fn parse_version(version: &str) -> Result<Version> {
  let trimmed = version.trim().trim_start_matches('v');
  Version::parse(trimmed)
    .map_err(|err| Error::Config(format!("Failed to parse solc version `{version}`: {err}")))
}

pub(crate) fn default_version() -> Version {
  parse_version(DEFAULT_SOLC_VERSION).unwrap_or_else(|_| Version::new(0, 8, 30))
}

/// Locate the svm-managed solc binary for `version`, installing it first when
/// `install_missing` is set.
pub(crate) fn ensure_installed(version: &Version, install_missing: bool) -> Result<Solc> {
  if let Some(solc) = find_installed_version(version)? {
    debug!(%version, "using installed solc");
    return Ok(solc);
  }
  if !install_missing {
    return Err(Error::Config(format!(
      "Solc {version} is not installed. Enable compiler.installMissing or install it with svm."
    )));
  }
  install_version(version)
}

pub(crate) fn find_installed_version(version: &Version) -> Result<Option<Solc>> {
  map_err_with_context(
    Solc::find_svm_installed_version(version),
    "Failed to inspect solc versions",
  )
}

fn install_mutex() -> &'static Mutex<()> {
  static INSTALL_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
  INSTALL_MUTEX.get_or_init(|| Mutex::new(()))
}

fn install_version(version: &Version) -> Result<Solc> {
  let _guard = install_mutex()
    .lock()
    .map_err(|err| Error::Transport(format!("Solc install mutex poisoned: {err}")))?;

  if let Some(solc) = find_installed_version(version)? {
    return Ok(solc);
  }
  info!(%version, "installing solc");
  map_err_with_context(
    Solc::blocking_install(version),
    "Failed to install solc version",
  )
}
