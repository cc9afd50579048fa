use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    /// UTF-16 code unit offset within the line.
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_multiline(&self) -> bool {
        self.end.line > self.start.line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range,
    #[serde(rename = "newText")]
    pub new_text: String,
}

/// Byte offsets of every line start, used to map LSP positions into a `str`.
struct LineIndex<'a> {
    content: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(content: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { content, starts }
    }

    fn line_text(&self, line: usize) -> Option<&'a str> {
        let start = *self.starts.get(line)?;
        let end = self
            .starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.content.len());
        let text = &self.content[start..end];
        Some(text.trim_end_matches(['\n', '\r']))
    }

    fn offset(&self, pos: Position) -> Result<usize> {
        let line = pos.line as usize;
        let Some(text) = self.line_text(line) else {
            return Err(anyhow!(
                "line {} is past the end of the document ({} lines)",
                pos.line,
                self.starts.len()
            ));
        };

        let mut units = 0u32;
        for (byte_idx, ch) in text.char_indices() {
            if units >= pos.character {
                return Ok(self.starts[line] + byte_idx);
            }
            units += ch.len_utf16() as u32;
        }
        Ok(self.starts[line] + text.len())
    }
}

/// Applies LSP text edits (UTF-16 positions) to `content`.
///
/// Edits are resolved against the original text, so their order in `edits` does not matter.
/// Overlapping edits are rejected.
pub fn apply_text_edits(content: &str, edits: &[TextEdit]) -> Result<String> {
    if edits.is_empty() {
        return Ok(content.to_string());
    }

    let index = LineIndex::new(content);
    let mut spans = Vec::with_capacity(edits.len());
    for (idx, edit) in edits.iter().enumerate() {
        let start = index
            .offset(edit.range.start)
            .map_err(|e| anyhow!("edit #{idx}: bad start: {e}"))?;
        let end = index
            .offset(edit.range.end)
            .map_err(|e| anyhow!("edit #{idx}: bad end: {e}"))?;
        if start > end {
            return Err(anyhow!("edit #{idx}: range end precedes start"));
        }
        spans.push((start, end, edit.new_text.as_str()));
    }

    spans.sort_by_key(|(start, end, _)| (*start, *end));
    for pair in spans.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(anyhow!("overlapping text edits"));
        }
    }

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (start, end, new_text) in spans {
        out.push_str(&content[cursor..start]);
        out.push_str(new_text);
        cursor = end;
    }
    out.push_str(&content[cursor..]);
    Ok(out)
}
