use std::collections::{HashMap, HashSet};

use bifrost_core::preview::{CONTEXT_LINES, context_preview, line_preview};
use bifrost_core::text::Range;
use bifrost_lsp::{Provider, RawLocation};
use serde::Serialize;
use tracing::debug;

pub(crate) const PREVIEW_UNAVAILABLE: &str = "Preview unavailable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationWithPreview {
    pub uri: String,
    pub range: Range,
    pub preview: String,
}

/// Keeps the first location per `(uri, start.line, start.character)`, in discovery order.
pub fn dedupe_references(locations: Vec<RawLocation>) -> Vec<RawLocation> {
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|loc| {
            let range = loc.range();
            seen.insert((loc.uri().to_string(), range.start.line, range.start.character))
        })
        .collect()
}

/// Document reader that fetches each URI at most once per tool call.
pub(crate) struct PreviewSource<'a, P> {
    provider: &'a P,
    documents: HashMap<String, Option<String>>,
}

impl<'a, P: Provider> PreviewSource<'a, P> {
    pub(crate) fn new(provider: &'a P) -> Self {
        Self {
            provider,
            documents: HashMap::new(),
        }
    }

    async fn document(&mut self, uri: &str) -> Option<&str> {
        if !self.documents.contains_key(uri) {
            let text = match self.provider.read_document(uri).await {
                Ok(text) => Some(text),
                Err(err) => {
                    debug!("preview read failed for {uri}: {err}");
                    None
                }
            };
            self.documents.insert(uri.to_string(), text);
        }
        self.documents.get(uri).and_then(|d| d.as_deref())
    }

    /// Trimmed text of `line`.
    pub(crate) async fn line(&mut self, uri: &str, line: u32) -> String {
        self.document(uri)
            .await
            .and_then(|text| line_preview(text, line))
            .unwrap_or_else(|| PREVIEW_UNAVAILABLE.to_string())
    }

    /// Marked context window around a multi-line range; the trimmed start line otherwise.
    pub(crate) async fn context(&mut self, uri: &str, range: Range) -> String {
        if !range.is_multiline() {
            return self.line(uri, range.start.line).await;
        }
        self.document(uri)
            .await
            .and_then(|text| context_preview(text, range.start.line, range.end.line, CONTEXT_LINES))
            .unwrap_or_else(|| PREVIEW_UNAVAILABLE.to_string())
    }
}

/// Converts provider locations into `{uri, range, preview}` entries, keeping their order.
///
/// The preview is the trimmed source line at `range.start.line`, whatever the range spans.
pub async fn normalize<P: Provider>(provider: &P, locations: Vec<RawLocation>) -> Vec<LocationWithPreview> {
    let mut source = PreviewSource::new(provider);
    let mut out = Vec::with_capacity(locations.len());
    for loc in locations {
        let range = loc.range();
        let uri = loc.uri().to_string();
        let preview = source.line(&uri, range.start.line).await;
        out.push(LocationWithPreview { uri, range, preview });
    }
    out
}

/// Like [`normalize`], but multi-line ranges get a context window instead of a single line.
pub async fn normalize_with_context<P: Provider>(
    provider: &P,
    locations: Vec<RawLocation>,
) -> Vec<LocationWithPreview> {
    let mut source = PreviewSource::new(provider);
    let mut out = Vec::with_capacity(locations.len());
    for loc in locations {
        let range = loc.range();
        let uri = loc.uri().to_string();
        let preview = source.context(&uri, range).await;
        out.push(LocationWithPreview { uri, range, preview });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeProvider, link, location};
    use bifrost_core::text::Position;

    const ORDER: &str = "namespace App;\n\nclass Order\n{\n    int Total() { return 0; }\n}\n";

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let refs = vec![
            location("file:///b.cs", 4, 2),
            location("file:///a.cs", 1, 0),
            location("file:///b.cs", 4, 2),
            location("file:///a.cs", 1, 5),
        ];
        let deduped = dedupe_references(refs);
        let keys: Vec<(String, u32, u32)> = deduped
            .iter()
            .map(|l| (l.uri().to_string(), l.range().start.line, l.range().start.character))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("file:///b.cs".to_string(), 4, 2),
                ("file:///a.cs".to_string(), 1, 0),
                ("file:///a.cs".to_string(), 1, 5),
            ]
        );
    }

    #[tokio::test]
    async fn previews_come_from_the_start_line() {
        let provider = FakeProvider::default().with_file("file:///Order.cs", ORDER);
        let out = normalize(
            &provider,
            vec![location("file:///Order.cs", 0, 10), location("file:///Order.cs", 4, 8)],
        )
        .await;
        assert_eq!(out[0].preview, "namespace App;");
        assert_eq!(out[1].preview, "int Total() { return 0; }");
        assert_eq!(provider.reads(), 1);
    }

    #[tokio::test]
    async fn location_links_use_the_selection_range() {
        let provider = FakeProvider::default().with_file("file:///Order.cs", ORDER);
        let out = normalize(&provider, vec![link("file:///Order.cs", 2, 6)]).await;
        assert_eq!(out[0].uri, "file:///Order.cs");
        assert_eq!(out[0].range.start, Position::new(2, 6));
        assert_eq!(out[0].preview, "class Order");
    }

    #[tokio::test]
    async fn unreadable_documents_get_a_placeholder() {
        let provider = FakeProvider::default().with_file("file:///Order.cs", ORDER);
        let out = normalize(
            &provider,
            vec![location("file:///Gone.cs", 0, 0), location("file:///Order.cs", 99, 0)],
        )
        .await;
        assert_eq!(out[0].preview, PREVIEW_UNAVAILABLE);
        assert_eq!(out[1].preview, PREVIEW_UNAVAILABLE);
    }

    #[tokio::test]
    async fn multi_line_locations_preview_their_start_line() {
        let provider = FakeProvider::default().with_file("file:///Order.cs", ORDER);
        let whole_class = RawLocation::Location(bifrost_lsp::LspLocation {
            uri: "file:///Order.cs".to_string(),
            range: Range::new(Position::new(2, 0), Position::new(5, 1)),
        });
        let out = normalize(&provider, vec![whole_class]).await;
        assert_eq!(out[0].preview, "class Order");
    }

    #[tokio::test]
    async fn context_variant_widens_multi_line_ranges() {
        let provider = FakeProvider::default().with_file("file:///Order.cs", ORDER);
        let whole_class = RawLocation::Location(bifrost_lsp::LspLocation {
            uri: "file:///Order.cs".to_string(),
            range: Range::new(Position::new(2, 0), Position::new(5, 1)),
        });
        let out = normalize_with_context(
            &provider,
            vec![whole_class, location("file:///Order.cs", 4, 8)],
        )
        .await;
        assert_eq!(
            out[0].preview,
            "  namespace App;\n  \n> class Order\n  {\n      int Total() { return 0; }\n  }"
        );
        assert_eq!(out[1].preview, "int Total() { return 0; }");
        assert_eq!(provider.reads(), 1);
    }
}
