use std::path::{Component, Path, PathBuf};

use super::errors::{Error, Result};

/// File extension of Solidity sources.
pub const SOLIDITY_EXTENSION: &str = "sol";

/// Canonicalises a path while falling back to an absolute join if canonicalisation fails.
///
/// Missing paths are joined onto the current working directory so a contracts folder that
/// does not exist yet still produces a predictable location (the scanner reports it later).
pub fn canonicalize_path(path: &Path) -> PathBuf {
  match std::fs::canonicalize(path) {
    Ok(canonical) => canonical,
    Err(_) => {
      if path.is_absolute() {
        path.to_path_buf()
      } else {
        std::env::current_dir()
          .unwrap_or_else(|_| PathBuf::from("."))
          .join(path)
      }
    }
  }
}

/// Canonicalises `path` relative to `base`, returning the best-effort absolute path.
pub fn canonicalize_with_base(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    return canonicalize_path(path);
  }
  canonicalize_path(&base.join(path))
}

/// Normalises a `/`- or `\`-separated virtual path, folding `.` and `..` segments.
///
/// Absolute paths and any `..` that climbs above the virtual root are rejected with
/// [`Error::PathEscape`].
pub fn normalize_virtual_path(path: &str) -> Result<String> {
  let escape = || Error::PathEscape {
    path: path.to_string(),
  };
  if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
    return Err(escape());
  }

  let mut segments: Vec<&str> = Vec::new();
  for segment in path.split(['/', '\\']) {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop().ok_or_else(escape)?;
      }
      other => segments.push(other),
    }
  }

  if segments.is_empty() {
    return Err(Error::UnknownSource(path.to_string()));
  }
  Ok(segments.join("/"))
}

/// Resolve an import specifier found in `importer` to a virtual path.
///
/// Relative specifiers (`./`, `../`) are joined onto the importer's directory; anything else
/// is treated as relative to the virtual root.
pub fn resolve_import(importer: &str, specifier: &str) -> Result<String> {
  if specifier.starts_with("./") || specifier.starts_with("../") {
    let base = match importer.rfind('/') {
      Some(index) => &importer[..index],
      None => "",
    };
    if base.is_empty() {
      return normalize_virtual_path(specifier);
    }
    return normalize_virtual_path(&format!("{base}/{specifier}"));
  }
  normalize_virtual_path(specifier)
}

/// Build the registry key of `file` relative to `root`, always `/`-separated.
///
/// When `strip_extension` is set the trailing `.sol` is removed (`inner/B.sol` → `inner/B`).
pub fn relative_key(root: &Path, file: &Path, strip_extension: bool) -> String {
  let relative = file.strip_prefix(root).unwrap_or(file);
  let mut parts: Vec<String> = relative
    .components()
    .filter_map(|component| match component {
      Component::Normal(part) => Some(part.to_string_lossy().to_string()),
      _ => None,
    })
    .collect();

  if strip_extension {
    if let Some(last) = parts.last_mut() {
      if let Some(stem) = last.strip_suffix(&format!(".{SOLIDITY_EXTENSION}")) {
        *last = stem.to_string();
      }
    }
  }
  parts.join("/")
}

/// Whether `path` names a Solidity source file.
pub fn is_solidity_file(path: &Path) -> bool {
  path
    .extension()
    .map(|extension| extension == SOLIDITY_EXTENSION)
    .unwrap_or(false)
}

fn has_drive_prefix(path: &str) -> bool {
  let bytes = path.as_bytes();
  bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
