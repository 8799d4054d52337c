use std::collections::HashSet;

use crate::models::{split_href, TocNode};

/// Flattens the table of contents into the hrefs' document order.
///
/// Pre-order traversal: a section's own href (when it has one) comes before
/// its children. Duplicate hrefs keep only their first position.
pub fn flatten_toc(nodes: &[TocNode]) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for node in nodes {
        push_node(node, &mut out, &mut seen);
    }
    out
}

fn push_node(node: &TocNode, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    match node {
        TocNode::Leaf { href } => {
            if seen.insert(href.clone()) {
                out.push(href.clone());
            }
        }
        TocNode::Section { href, children } => {
            if let Some(href) = href {
                if seen.insert(href.clone()) {
                    out.push(href.clone());
                }
            }
            for child in children {
                push_node(child, out, seen);
            }
        }
    }
}

/// Maps a user selection onto document order and drops redundant anchors.
///
/// Selections that do not appear in the table of contents are unreachable
/// and silently dropped. An anchored href is dropped when the selection also
/// contains its bare resource, whose extraction already covers the fragment.
pub fn resolve_selection(selected: &[String], flattened: &[String]) -> Vec<String> {
    let selected_set: HashSet<&str> = selected.iter().map(String::as_str).collect();

    let ordered: Vec<String> = flattened
        .iter()
        .filter(|href| selected_set.contains(href.as_str()))
        .cloned()
        .collect();

    let ordered_set: HashSet<&str> = ordered.iter().map(String::as_str).collect();

    ordered
        .iter()
        .filter(|href| match split_href(href) {
            (resource, Some(_)) => !ordered_set.contains(resource),
            (_, None) => true,
        })
        .cloned()
        .collect()
}
