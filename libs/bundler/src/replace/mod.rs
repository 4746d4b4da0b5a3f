use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{trace, warn};

use crate::internal::errors::{Error, Result};

mod source_map;

type ValueFn = dyn Fn(&str) -> String + Send + Sync;

/// Replacement for a key: fixed text, or text computed from the module/chunk id.
#[derive(Clone)]
pub enum ReplacementValue {
  Literal(String),
  Computed(Arc<ValueFn>),
}

impl ReplacementValue {
  pub fn literal(value: impl Into<String>) -> Self {
    ReplacementValue::Literal(value.into())
  }

  pub fn computed(value: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
    ReplacementValue::Computed(Arc::new(value))
  }

  fn resolve(&self, id: &str) -> Cow<'_, str> {
    match self {
      ReplacementValue::Literal(value) => Cow::Borrowed(value),
      ReplacementValue::Computed(value) => Cow::Owned(value(id)),
    }
  }
}

impl fmt::Debug for ReplacementValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReplacementValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
      ReplacementValue::Computed(_) => f.write_str("Computed(..)"),
    }
  }
}

impl From<&str> for ReplacementValue {
  fn from(value: &str) -> Self {
    ReplacementValue::literal(value)
  }
}

impl From<String> for ReplacementValue {
  fn from(value: String) -> Self {
    ReplacementValue::Literal(value)
  }
}

/// Rewritten text plus its source map (when the replacer was built with maps enabled).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replaced {
  pub code: String,
  pub map: Option<String>,
}

#[derive(Debug)]
pub(crate) struct Edit {
  start: usize,
  end: usize,
  value: String,
}

/// Whole-word constant folding of configured keys.
///
/// A match must not touch word characters on either side, and is skipped when it is
/// immediately followed by a member access (`.`) or by an assignment (`=` that is not `==`),
/// so writes to a key or its properties survive. Longer keys win over their prefixes.
#[derive(Debug)]
pub struct TextReplacer {
  keys: Vec<String>,
  values: HashMap<String, ReplacementValue>,
  pattern: Option<Regex>,
  source_map: bool,
}

impl TextReplacer {
  pub fn new<I, K>(rules: I, source_map: bool) -> Result<Self>
  where
    I: IntoIterator<Item = (K, ReplacementValue)>,
    K: Into<String>,
  {
    let mut values = HashMap::new();
    for (key, value) in rules {
      let key = key.into();
      if key.trim().is_empty() {
        return Err(Error::Config(
          "replacement keys must not be empty".to_string(),
        ));
      }
      values.insert(key, value);
    }

    let mut keys: Vec<String> = values.keys().cloned().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let pattern = if keys.is_empty() {
      None
    } else {
      let alternation = keys
        .iter()
        .map(|key| regex::escape(key))
        .collect::<Vec<_>>()
        .join("|");
      let regex = Regex::new(&alternation)
        .map_err(|err| Error::Config(format!("invalid replacement keys: {err}")))?;
      Some(regex)
    };

    Ok(Self {
      keys,
      values,
      pattern,
      source_map,
    })
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  /// Keys in match priority order (longest first).
  pub fn keys(&self) -> &[String] {
    &self.keys
  }

  /// Replace every accepted occurrence in `text`; `None` means nothing matched.
  pub fn try_replacing(&self, text: &str, id: &str) -> Option<Replaced> {
    let pattern = self.pattern.as_ref()?;

    let mut edits = Vec::new();
    let mut position = 0;
    while let Some(found) = pattern.find_at(text, position) {
      let start = found.start();
      match self.accept_at(text, start) {
        Some((key, end)) => {
          let value = self.values[key].resolve(id).into_owned();
          edits.push(Edit { start, end, value });
          position = end;
        }
        None => {
          position = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
      }
      if position >= text.len() {
        break;
      }
    }

    if edits.is_empty() {
      return None;
    }
    trace!(id, replacements = edits.len(), "replaced configured keys");

    let map = if self.source_map {
      match source_map::build(text, &edits, id) {
        Ok(map) => Some(map),
        Err(err) => {
          warn!(id, %err, "failed to generate source map");
          None
        }
      }
    } else {
      None
    };

    let mut code = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in &edits {
      code.push_str(&text[cursor..edit.start]);
      code.push_str(&edit.value);
      cursor = edit.end;
    }
    code.push_str(&text[cursor..]);

    Some(Replaced { code, map })
  }

  /// First key (by priority) that forms an acceptable match at `start`.
  fn accept_at(&self, text: &str, start: usize) -> Option<(&str, usize)> {
    if text[..start].chars().next_back().is_some_and(is_word_char) {
      return None;
    }
    self.keys.iter().find_map(|key| {
      if !text[start..].starts_with(key.as_str()) {
        return None;
      }
      let end = start + key.len();
      let rest = &text[end..];
      if rest.chars().next().is_some_and(is_word_char) || is_write_target(rest) {
        return None;
      }
      Some((key.as_str(), end))
    })
  }
}

/// Characters that continue a JS identifier (ASCII subset).
fn is_word_char(ch: char) -> bool {
  ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

/// `.prop` or `= value` (but not `==`) directly after the match.
fn is_write_target(rest: &str) -> bool {
  if rest.starts_with('.') {
    return true;
  }
  let mut chars = rest.trim_start().chars();
  chars.next() == Some('=') && chars.next().is_some_and(|next| next != '=')
}
