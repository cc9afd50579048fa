//! Bounded caller/callee tree expansion over a [`Provider`].
//!
//! The walk is breadth-first: every node of one level is expanded concurrently, and level `n + 1`
//! starts only once all edges of level `n` are known. A node at depth `d` was produced by exactly
//! `d` edge lookups starting from the root.

use bifrost_core::text::{Position, Range};
use bifrost_lsp::{CallHierarchyItem, Provider, ProviderResult, symbol_kind_name};
use futures::future::join_all;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone)]
pub struct HierarchyOptions {
    /// Maximum depth below the root.
    pub depth: u32,
    /// Only edges whose `detail` starts with one of these prefixes are expanded further.
    pub include_packages: Option<Vec<String>>,
    /// Stop at items that already appear on their own ancestor path.
    pub detect_cycles: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallHierarchyNode {
    #[serde(serialize_with = "serialize_item")]
    pub item: CallHierarchyItem,
    pub edges: Vec<CallHierarchyNode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchy {
    pub direction: Direction,
    pub root: Option<CallHierarchyNode>,
    /// Non-root nodes whose edges could not be fetched and were left as leaves.
    pub partial_failures: usize,
}

#[derive(Serialize)]
struct ItemView<'a> {
    name: &'a str,
    kind: &'static str,
    detail: Option<&'a str>,
    uri: &'a str,
    range: Range,
}

fn serialize_item<S: Serializer>(item: &CallHierarchyItem, serializer: S) -> Result<S::Ok, S::Error> {
    ItemView {
        name: &item.name,
        kind: symbol_kind_name(item.kind),
        detail: item.detail.as_deref(),
        uri: &item.uri,
        range: item.range,
    }
    .serialize(serializer)
}

struct ArenaNode {
    item: CallHierarchyItem,
    parent: Option<usize>,
    children: Vec<usize>,
    cycle: bool,
}

impl HierarchyOptions {
    fn admits(&self, item: &CallHierarchyItem) -> bool {
        let Some(prefixes) = self.include_packages.as_ref() else {
            return true;
        };
        let detail = item.detail.as_deref().unwrap_or_default();
        prefixes.iter().any(|p| detail.starts_with(p.as_str()))
    }
}

fn same_symbol(a: &CallHierarchyItem, b: &CallHierarchyItem) -> bool {
    a.uri == b.uri && a.name == b.name && a.selection_range.start == b.selection_range.start
}

fn on_ancestor_path(arena: &[ArenaNode], from: usize, item: &CallHierarchyItem) -> bool {
    let mut cursor = Some(from);
    while let Some(idx) = cursor {
        if same_symbol(&arena[idx].item, item) {
            return true;
        }
        cursor = arena[idx].parent;
    }
    false
}

async fn edges_of<P: Provider>(
    provider: &P,
    direction: Direction,
    item: &CallHierarchyItem,
) -> ProviderResult<Vec<CallHierarchyItem>> {
    match direction {
        Direction::Incoming => provider.incoming_calls(item).await,
        Direction::Outgoing => provider.outgoing_calls(item).await,
    }
}

/// Resolves the symbol at `(uri, position)` and expands its calls in `direction`.
///
/// No symbol at the position yields a `None` root. Failing to fetch the root's own edges is an
/// error; failures below the root are counted in [`CallHierarchy::partial_failures`].
pub async fn build_call_hierarchy<P: Provider>(
    provider: &P,
    uri: &str,
    position: Position,
    direction: Direction,
    options: &HierarchyOptions,
) -> ProviderResult<CallHierarchy> {
    let mut prepared = provider.prepare_call_hierarchy(uri, position).await?;
    if prepared.is_empty() {
        debug!("no call hierarchy item at {uri}:{}:{}", position.line, position.character);
        return Ok(CallHierarchy {
            direction,
            root: None,
            partial_failures: 0,
        });
    }
    let root = prepared.swap_remove(0);

    let mut arena = vec![ArenaNode {
        item: root,
        parent: None,
        children: Vec::new(),
        cycle: false,
    }];
    let mut partial_failures = 0;
    let mut frontier: Vec<(usize, u32)> = if options.depth > 0 {
        vec![(0, options.depth)]
    } else {
        Vec::new()
    };

    while !frontier.is_empty() {
        let lookups = frontier
            .iter()
            .map(|&(idx, _)| edges_of(provider, direction, &arena[idx].item));
        let results = join_all(lookups).await;

        let mut next = Vec::new();
        for ((idx, remaining), result) in frontier.into_iter().zip(results) {
            let items = match result {
                Ok(items) => items,
                Err(err) if idx == 0 => return Err(err),
                Err(err) => {
                    warn!(
                        "{direction:?} calls of {} failed, keeping it as a leaf: {err}",
                        arena[idx].item.name
                    );
                    partial_failures += 1;
                    continue;
                }
            };

            for item in items {
                let cycle = options.detect_cycles && on_ancestor_path(&arena, idx, &item);
                let expand = !cycle && remaining > 1 && options.admits(&item);
                let child = arena.len();
                arena.push(ArenaNode {
                    item,
                    parent: Some(idx),
                    children: Vec::new(),
                    cycle,
                });
                arena[idx].children.push(child);
                if expand {
                    next.push((child, remaining - 1));
                }
            }
        }
        frontier = next;
    }

    Ok(CallHierarchy {
        direction,
        root: Some(into_tree(&mut arena, 0)),
        partial_failures,
    })
}

fn into_tree(arena: &mut [ArenaNode], idx: usize) -> CallHierarchyNode {
    let children = std::mem::take(&mut arena[idx].children);
    let edges = children.into_iter().map(|c| into_tree(arena, c)).collect();
    let node = &arena[idx];
    CallHierarchyNode {
        item: node.item.clone(),
        edges,
        cycle: node.cycle,
    }
}

fn last_segment(detail: &str) -> &str {
    detail.rsplit('.').next().unwrap_or(detail)
}

fn label(item: &CallHierarchyItem, parent_detail: Option<&str>) -> String {
    let detail = item.detail.as_deref().unwrap_or_default();
    let shown = match parent_detail {
        Some(parent) if parent == detail => last_segment(detail),
        _ => detail,
    };
    format!(
        "{shown}[{}-{}].{}",
        item.range.start.line, item.range.end.line, item.name
    )
}

fn render_children(node: &CallHierarchyNode, prefix: &str, lines: &mut Vec<String>) {
    let parent_detail = node.item.detail.as_deref().unwrap_or_default();
    let count = node.edges.len();
    for (i, child) in node.edges.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└─" } else { "├─" };
        lines.push(format!("{prefix}{branch}{}", label(&child.item, Some(parent_detail))));
        let nested = format!("{prefix}{}", if last { "   " } else { "│  " });
        render_children(child, &nested, lines);
    }
}

/// Compact text form: one `detail[startLine-endLine].name` line per node, joined with `\n`.
pub fn render_tree(root: &CallHierarchyNode) -> String {
    let mut lines = vec![label(&root.item, None)];
    render_children(root, "", &mut lines);
    lines.join("\n")
}
