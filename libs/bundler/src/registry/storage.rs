use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::compiler::input::CompilationUnit;
use crate::internal::errors::{Error, Result};
use crate::internal::path::{normalize_virtual_path, resolve_import};

/// Raw Solidity sources keyed by their `/`-separated path relative to the contracts root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileStorage {
  files: BTreeMap<String, String>,
}

impl FileStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `content` under `path`; the path must stay inside the storage root.
  pub fn insert(&mut self, path: &str, content: impl Into<String>) -> Result<()> {
    let key = normalize_virtual_path(path)?;
    self.files.insert(key, content.into());
    Ok(())
  }

  /// Look up a source by path, normalising `.`/`..` segments first.
  pub fn resolve(&self, path: &str) -> Result<(String, &str)> {
    let key = normalize_virtual_path(path)?;
    match self.files.get(&key) {
      Some(content) => Ok((key, content.as_str())),
      None => Err(Error::UnknownSource(key)),
    }
  }

  pub fn get(&self, path: &str) -> Option<&str> {
    self.files.get(path).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .files
      .iter()
      .map(|(path, content)| (path.as_str(), content.as_str()))
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// Collect `path` and every source it transitively imports from this storage.
  ///
  /// Returns the normalised key of `path` along with the units. Imports that are not
  /// registered here are left for solc to report.
  pub fn compilation_units(&self, path: &str) -> Result<(String, Vec<CompilationUnit>)> {
    let (entry, _) = self.resolve(path)?;

    let mut visited = BTreeSet::new();
    let mut queue = vec![entry.clone()];
    let mut units = Vec::new();
    while let Some(current) = queue.pop() {
      if !visited.insert(current.clone()) {
        continue;
      }
      let Some(content) = self.files.get(&current) else {
        continue;
      };
      for specifier in import_specifiers(content) {
        match resolve_import(&current, specifier) {
          Ok(import) if self.files.contains_key(&import) => queue.push(import),
          _ => debug!(importer = %current, %specifier, "import not found in file storage"),
        }
      }
      units.push(CompilationUnit::new(current.clone(), content.clone()));
    }
    Ok((entry, units))
  }
}

fn import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"import\s+(?:[^;"']*?\s+from\s+)?["']([^"']+)["']"#)
      .expect("import pattern is a valid regex")
  })
}

fn import_specifiers(source: &str) -> impl Iterator<Item = &str> {
  import_pattern()
    .captures_iter(source)
    .filter_map(|caps| caps.get(1).map(|specifier| specifier.as_str()))
}
