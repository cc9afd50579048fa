//! Short source previews attached to locations.

/// Number of lines shown on either side of a multi-line range.
pub const CONTEXT_LINES: usize = 2;

const RANGE_MARKER: &str = "> ";
const CONTEXT_MARKER: &str = "  ";

/// Returns the trimmed text of `line` (0-based), or `None` when the document is shorter.
pub fn line_preview(content: &str, line: u32) -> Option<String> {
    content
        .lines()
        .nth(line as usize)
        .map(|text| text.trim().to_string())
}

/// Renders `start_line..=end_line` with up to `context` lines around it.
///
/// The range's first line is marked with `> `; every other line is indented by two spaces so the
/// block stays aligned. Single-line ranges collapse to [`line_preview`].
pub fn context_preview(
    content: &str,
    start_line: u32,
    end_line: u32,
    context: usize,
) -> Option<String> {
    if end_line <= start_line {
        return line_preview(content, start_line);
    }

    let lines: Vec<&str> = content.lines().collect();
    let start = start_line as usize;
    if start >= lines.len() {
        return None;
    }
    let end = (end_line as usize).min(lines.len() - 1);
    let from = start.saturating_sub(context);
    let to = (end + context).min(lines.len() - 1);

    let rendered = lines[from..=to]
        .iter()
        .enumerate()
        .map(|(offset, text)| {
            let marker = if from + offset == start {
                RANGE_MARKER
            } else {
                CONTEXT_MARKER
            };
            format!("{marker}{}", text.trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(rendered)
}
