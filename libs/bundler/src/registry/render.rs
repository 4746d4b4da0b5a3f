//! Code generation for the registry virtual modules.

use std::fmt::Write;

use super::{FileStorage, InterfaceRegistry};
use crate::internal::errors::Result;

const REJECTED_HELPER: &str = "\
const rejected = (message) => {
  const promise = Promise.reject(new Error(message));
  promise.catch(() => {});
  return promise;
};
";

/// `export default { "<key>": Promise<abi>, ... }`; failed entries become handled rejections.
pub fn render_interface_module(registry: &InterfaceRegistry) -> Result<String> {
  let mut code = String::new();
  if registry.failures().next().is_some() {
    code.push_str(REJECTED_HELPER);
    code.push('\n');
  }
  code.push_str("export default {\n");
  for (key, entry) in registry.iter() {
    let key = serde_json::to_string(key)?;
    let value = match &entry.interface {
      Ok(abi) => format!("Promise.resolve({})", serde_json::to_string(abi)?),
      Err(message) => format!("rejected({})", serde_json::to_string(message)?),
    };
    let _ = writeln!(code, "  {key}: {value},");
  }
  code.push_str("};\n");
  Ok(code)
}

/// `export default { "<path>": `<source>`, ... }`.
///
/// Occurrences of `protected_keys` inside the sources are written with one escaped character,
/// so replacing those keys over the emitted bundle leaves the inlined sources alone. The
/// string JS reads back is unchanged.
pub fn render_source_storage_module(
  storage: &FileStorage,
  protected_keys: &[String],
) -> Result<String> {
  let guards: Vec<(String, String)> = protected_keys
    .iter()
    .filter(|key| !key.is_empty())
    .map(|key| {
      let needle = escape_template_literal(key);
      let guarded = guard_key(&needle);
      (needle, guarded)
    })
    .collect();

  let mut code = String::from("export default {\n");
  for (path, content) in storage.iter() {
    let key = serde_json::to_string(path)?;
    let mut literal = escape_template_literal(content);
    for (needle, guarded) in &guards {
      if literal.contains(needle.as_str()) {
        literal = literal.replace(needle.as_str(), guarded);
      }
    }
    let _ = writeln!(code, "  {key}: `{literal}`,");
  }
  code.push_str("};\n");
  Ok(code)
}

fn escape_template_literal(text: &str) -> String {
  text
    .replace('\\', "\\\\")
    .replace('`', "\\`")
    .replace("${", "\\${")
}

/// `process.env` becomes `process\u002eenv`; keys without a dot get their first character escaped.
fn guard_key(key: &str) -> String {
  if key.contains('.') {
    return key.replace('.', "\\u002e");
  }
  let mut chars = key.chars();
  match chars.next() {
    Some(first) => format!("\\u{{{:x}}}{}", u32::from(first), chars.as_str()),
    None => String::new(),
  }
}
