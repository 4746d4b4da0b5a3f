use sourcemap::SourceMapBuilder;

use super::Edit;

#[derive(Clone, Copy, Default)]
struct Position {
  line: u32,
  column: u32,
}

impl Position {
  fn advance(&mut self, text: &str) {
    for ch in text.chars() {
      if ch == '\n' {
        self.line += 1;
        self.column = 0;
      } else {
        self.column += ch.len_utf16() as u32;
      }
    }
  }
}

struct MapWriter {
  builder: SourceMapBuilder,
  source: u32,
  generated: Position,
  original: Position,
}

impl MapWriter {
  fn mark(&mut self) {
    self.builder.add_raw(
      self.generated.line,
      self.generated.column,
      self.original.line,
      self.original.column,
      Some(self.source),
      None,
      false,
    );
  }

  /// Unchanged text maps one-to-one; a token is emitted at the start of every line.
  fn copy(&mut self, text: &str) {
    let mut line_start = true;
    for ch in text.chars() {
      if line_start {
        self.mark();
        line_start = false;
      }
      if ch == '\n' {
        self.generated.line += 1;
        self.generated.column = 0;
        self.original.line += 1;
        self.original.column = 0;
        line_start = true;
      } else {
        let width = ch.len_utf16() as u32;
        self.generated.column += width;
        self.original.column += width;
      }
    }
  }

  fn replace(&mut self, original: &str, replacement: &str) {
    self.mark();
    self.generated.advance(replacement);
    self.original.advance(original);
  }
}

/// Render a v3 source map from `original` to the text produced by applying `edits`.
pub(crate) fn build(original: &str, edits: &[Edit], source_id: &str) -> Result<String, String> {
  let mut builder = SourceMapBuilder::new(None);
  let source = builder.add_source(source_id);
  builder.set_source_contents(source, Some(original));

  let mut writer = MapWriter {
    builder,
    source,
    generated: Position::default(),
    original: Position::default(),
  };
  let mut cursor = 0;
  for edit in edits {
    writer.copy(&original[cursor..edit.start]);
    writer.replace(&original[edit.start..edit.end], &edit.value);
    cursor = edit.end;
  }
  writer.copy(&original[cursor..]);

  let mut encoded = Vec::new();
  writer
    .builder
    .into_sourcemap()
    .to_writer(&mut encoded)
    .map_err(|err| err.to_string())?;
  String::from_utf8(encoded).map_err(|err| err.to_string())
}
