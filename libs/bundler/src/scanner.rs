use std::io;
use std::path::{Path, PathBuf};

use futures::future::{join_all, BoxFuture, FutureExt};
use tracing::warn;

use crate::internal::path::{is_solidity_file, relative_key};

/// A directory listing entry, named relative to the scan root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFileEntry {
  pub name: PathBuf,
  pub is_directory: bool,
}

impl SourceFileEntry {
  /// Absolute location of the entry under `root`.
  pub fn path(&self, root: &Path) -> PathBuf {
    root.join(&self.name)
  }

  /// `/`-separated registry key, optionally without the `.sol` extension.
  pub fn key(&self, strip_extension: bool) -> String {
    relative_key(Path::new(""), &self.name, strip_extension)
  }
}

/// Collect the Solidity files under `root`.
///
/// Unreadable directories (missing, permission denied) are logged and contribute nothing.
/// With `recurse` every subdirectory is scanned concurrently and flattened into the result;
/// directories themselves are never returned. Order follows directory enumeration.
pub async fn scan(root: &Path, recurse: bool) -> Vec<SourceFileEntry> {
  scan_dir(root.to_path_buf(), PathBuf::new(), recurse).await
}

fn scan_dir(root: PathBuf, prefix: PathBuf, recurse: bool) -> BoxFuture<'static, Vec<SourceFileEntry>> {
  async move {
    let dir = root.join(&prefix);
    let entries = match read_entries(&dir).await {
      Ok(entries) => entries,
      Err(err) => {
        warn!(path = %dir.display(), %err, "skipping unreadable contracts directory");
        return Vec::new();
      }
    };

    let mut files = Vec::new();
    let mut nested = Vec::new();
    for entry in entries {
      let name = prefix.join(&entry.name);
      if entry.is_directory {
        if recurse {
          nested.push(scan_dir(root.clone(), name, true));
        }
      } else if is_solidity_file(&name) {
        files.push(SourceFileEntry {
          name,
          is_directory: false,
        });
      }
    }

    for batch in join_all(nested).await {
      files.extend(batch);
    }
    files
  }
  .boxed()
}

async fn read_entries(dir: &Path) -> io::Result<Vec<SourceFileEntry>> {
  let mut reader = tokio::fs::read_dir(dir).await?;
  let mut entries = Vec::new();
  while let Some(entry) = reader.next_entry().await? {
    let is_directory = entry
      .file_type()
      .await
      .map(|file_type| file_type.is_dir())
      .unwrap_or(false);
    entries.push(SourceFileEntry {
      name: PathBuf::from(entry.file_name()),
      is_directory,
    });
  }
  Ok(entries)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;
  use std::fs;

  fn fixture() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    fs::write(root.join("a.sol"), "contract A {}").unwrap();
    fs::write(root.join("notes.md"), "# notes").unwrap();
    fs::create_dir_all(root.join("inner").join("deeper")).unwrap();
    fs::write(root.join("inner").join("b.sol"), "contract B {}").unwrap();
    fs::write(root.join("inner").join("deeper").join("c.sol"), "contract C {}").unwrap();
    fs::create_dir_all(root.join("folder.sol")).unwrap();
    temp
  }

  fn keys(entries: &[SourceFileEntry]) -> BTreeSet<String> {
    entries.iter().map(|entry| entry.key(false)).collect()
  }

  #[tokio::test]
  async fn unreadable_root_yields_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("does-not-exist");
    assert!(scan(&missing, true).await.is_empty());
  }

  #[tokio::test]
  async fn flat_scan_ignores_subdirectories() {
    let temp = fixture();
    let entries = scan(temp.path(), false).await;
    assert_eq!(keys(&entries), BTreeSet::from(["a.sol".to_string()]));
  }

  #[tokio::test]
  async fn recursive_scan_flattens_nested_files() {
    let temp = fixture();
    let entries = scan(temp.path(), true).await;
    assert_eq!(
      keys(&entries),
      BTreeSet::from([
        "a.sol".to_string(),
        "inner/b.sol".to_string(),
        "inner/deeper/c.sol".to_string(),
      ])
    );
    assert!(entries.iter().all(|entry| !entry.is_directory));
  }

  #[tokio::test]
  async fn entries_resolve_back_to_disk() {
    let temp = fixture();
    let entries = scan(temp.path(), true).await;
    let nested = entries
      .iter()
      .find(|entry| entry.key(true) == "inner/b")
      .expect("inner/b entry");
    assert_eq!(
      fs::read_to_string(nested.path(temp.path())).unwrap(),
      "contract B {}"
    );
  }
}
