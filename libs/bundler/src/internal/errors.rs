use std::fmt::Display;
use std::io;

use crate::compiler::output::Diagnostic;

/// Canonical error type shared by the scanner, compiler, registry and plugin layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("Invalid compile call: {0}")]
  Usage(String),

  #[error("Path `{path}` escapes the registered contracts root")]
  PathEscape { path: String },

  #[error("Source `{0}` is not registered in file storage")]
  UnknownSource(String),

  #[error("Solidity compilation failed:\n{}", render_diagnostics(.0))]
  Compilation(Vec<Diagnostic>),

  #[error("Compiler transport failure: {0}")]
  Transport(String),

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: io::Error,
  },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub fn io(context: impl Into<String>, source: io::Error) -> Self {
    Error::Io {
      context: context.into(),
      source,
    }
  }

  /// Diagnostics carried by a compilation failure, empty for every other variant.
  pub fn diagnostics(&self) -> &[Diagnostic] {
    match self {
      Error::Compilation(diagnostics) => diagnostics,
      _ => &[],
    }
  }
}

/// Result alias bound to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Annotate a foreign error with `context`, producing a [`Error::Transport`].
///
/// Used for failures of the compiler process itself rather than of the code it compiles.
pub fn map_err_with_context<T, E>(
  result: std::result::Result<T, E>,
  context: impl AsRef<str>,
) -> Result<T>
where
  E: Display,
{
  result.map_err(|err| Error::Transport(format!("{}: {err}", context.as_ref())))
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
  diagnostics
    .iter()
    .map(|diagnostic| {
      diagnostic
        .formatted_message
        .clone()
        .unwrap_or_else(|| format!("{}: {}", diagnostic.severity, diagnostic.message))
    })
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(feature = "napi")]
impl From<Error> for napi::Error {
  fn from(err: Error) -> Self {
    napi::Error::new(napi::Status::GenericFailure, err.to_string())
  }
}
