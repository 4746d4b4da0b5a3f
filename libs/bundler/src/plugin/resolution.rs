use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix marking ids owned by this plugin; the leading NUL keeps other plugins away.
pub const VIRTUAL_PREFIX: &str = "\0strato:";

const SOLJSON_URL: &str = "https://binaries.soliditylang.org/bin/soljson-latest.js";

/// Script extensions ignored when matching an importee against the table.
const SCRIPT_EXTENSIONS: [&str; 4] = [".js", ".mjs", ".cjs", ".ts"];

/// In-memory modules generated by the plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VirtualModule {
  InterfaceRegistry,
  SourceStorageRegistry,
  Compiler,
}

impl VirtualModule {
  pub const ALL: [VirtualModule; 3] = [
    VirtualModule::InterfaceRegistry,
    VirtualModule::SourceStorageRegistry,
    VirtualModule::Compiler,
  ];

  fn slug(self) -> &'static str {
    match self {
      VirtualModule::InterfaceRegistry => "contract-registry",
      VirtualModule::SourceStorageRegistry => "contracts-in-file-storage",
      VirtualModule::Compiler => "solidity-compiler",
    }
  }

  pub fn id(self) -> String {
    format!("{VIRTUAL_PREFIX}{}", self.slug())
  }

  pub fn from_id(id: &str) -> Option<Self> {
    let slug = id.strip_prefix(VIRTUAL_PREFIX)?;
    Self::ALL.into_iter().find(|module| module.slug() == slug)
  }
}

impl fmt::Display for VirtualModule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.slug())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionTarget {
  External(&'static str),
  /// File name under the configured polyfills directory.
  Polyfill(&'static str),
  Virtual(VirtualModule),
}

/// What the bundler should use for an importee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedId {
  pub id: String,
  pub external: bool,
}

/// Bare specifiers intercepted anywhere in the module graph.
const SPECIFIERS: [(&str, ResolutionTarget); 5] = [
  (
    "ContractRegistry",
    ResolutionTarget::Virtual(VirtualModule::InterfaceRegistry),
  ),
  (
    "ContractsInFileStorage",
    ResolutionTarget::Virtual(VirtualModule::SourceStorageRegistry),
  ),
  (
    "SolidityCompiler",
    ResolutionTarget::Virtual(VirtualModule::Compiler),
  ),
  ("StratoLogger", ResolutionTarget::Polyfill("StratoLogger.js")),
  ("soljson", ResolutionTarget::External(SOLJSON_URL)),
];

/// Suffix-matched resolution table, longest specifier first so matches are deterministic.
#[derive(Clone, Debug)]
pub struct ResolutionTable {
  entries: Vec<(String, ResolutionTarget)>,
  polyfills_dir: PathBuf,
}

impl ResolutionTable {
  pub fn new(polyfills_dir: &Path) -> Self {
    let entries = SPECIFIERS
      .into_iter()
      .map(|(specifier, target)| (specifier.to_string(), target))
      .collect();
    Self::with_entries(entries, polyfills_dir)
  }

  pub fn with_entries(mut entries: Vec<(String, ResolutionTarget)>, polyfills_dir: &Path) -> Self {
    entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    Self {
      entries,
      polyfills_dir: polyfills_dir.to_path_buf(),
    }
  }

  /// Target for `importee` when it equals a known specifier or ends with `/<specifier>`.
  pub fn lookup(&self, importee: &str) -> Option<&ResolutionTarget> {
    let bare = SCRIPT_EXTENSIONS
      .iter()
      .find_map(|extension| importee.strip_suffix(extension))
      .unwrap_or(importee);
    self
      .entries
      .iter()
      .find(|(specifier, _)| ends_with_segment(bare, specifier))
      .map(|(_, target)| target)
  }

  pub fn resolve(&self, importee: &str) -> Option<ResolvedId> {
    if VirtualModule::from_id(importee).is_some() {
      return Some(ResolvedId {
        id: importee.to_string(),
        external: false,
      });
    }

    let resolved = match *self.lookup(importee)? {
      ResolutionTarget::External(url) => ResolvedId {
        id: url.to_string(),
        external: true,
      },
      ResolutionTarget::Polyfill(file) => ResolvedId {
        id: self.polyfills_dir.join(file).to_string_lossy().into_owned(),
        external: false,
      },
      ResolutionTarget::Virtual(module) => ResolvedId {
        id: module.id(),
        external: false,
      },
    };
    Some(resolved)
  }
}

fn ends_with_segment(importee: &str, specifier: &str) -> bool {
  match importee.strip_suffix(specifier) {
    Some("") => true,
    Some(rest) => rest.ends_with('/') || rest.ends_with('\\'),
    None => false,
  }
}
