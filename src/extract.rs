use regex::Regex;

use crate::document::{markup_to_text, BookDocument};
use crate::models::{split_href, SectionText};

/// Wraps extracted plain text in the marker pair naming its href.
///
/// Downstream prompts rely on these markers to attribute answers back to
/// their source, so a chunk carries exactly one start and one end marker.
pub fn wrap_section(href: &str, text: &str) -> String {
    format!("\n\n[HREF START:\t{href}\t]\n{text}\n[HREF END:\t{href}\t]")
}

/// Removes the marker pair again, leaving the bare section text.
pub fn strip_markers(text: &str) -> String {
    let start = Regex::new(r"\[HREF START:\t[^\t]*\t\]").expect("static marker pattern");
    let end = Regex::new(r"\[HREF END:\t[^\t]*\t\]").expect("static marker pattern");

    let text = start.replace_all(text, "");
    end.replace_all(&text, "").trim().to_string()
}

/// Extracts the marker-wrapped plain text for one href.
///
/// A bare resource href yields the whole resource; `resource#anchor` yields
/// the span from the anchor's tag up to the tag of the next anchor of the
/// same resource in document order. A missing resource or an anchor that
/// never appears yields an empty section rather than an error.
pub fn extract_section(doc: &dyn BookDocument, href: &str, flattened: &[String]) -> SectionText {
    let (resource, anchor) = split_href(href);

    let body = match (doc.resource_markup(resource), anchor) {
        (None, _) => {
            tracing::warn!("resource {resource} not present in document");
            String::new()
        }
        (Some(markup), None) => markup_to_text(&markup),
        (Some(markup), Some(anchor)) => {
            let next = next_anchor_of_resource(flattened, href, resource);
            fragment_text(&markup, anchor, next.as_deref())
        }
    };

    SectionText {
        href: href.to_string(),
        text: wrap_section(href, &body),
    }
}

/// The anchor of the next href in document order that points into the same
/// resource, if any.
fn next_anchor_of_resource(flattened: &[String], href: &str, resource: &str) -> Option<String> {
    let position = flattened.iter().position(|h| h == href)?;
    let prefix = format!("{resource}#");

    flattened[position + 1..]
        .iter()
        .find(|candidate| candidate.starts_with(&prefix))
        .and_then(|candidate| split_href(candidate).1)
        .map(str::to_string)
}

/// Plain text between `anchor`'s tag and the next anchor's tag (or the end
/// of the resource).
fn fragment_text(markup: &str, anchor: &str, next_anchor: Option<&str>) -> String {
    let Some(start) = anchor_tag_offset(markup, anchor) else {
        tracing::warn!("anchor {anchor} not found in resource");
        return String::new();
    };

    let end = next_anchor
        .and_then(|next| anchor_tag_offset(markup, next))
        .filter(|&offset| offset > start)
        .unwrap_or(markup.len());

    markup_to_text(&markup[start..end])
}

/// Byte offset of the opening tag carrying `id="anchor"`.
///
/// The id attribute must sit inside a tag: candidates whose nearest `<` is
/// already closed by a `>` are markup text, not attributes, and are skipped.
fn anchor_tag_offset(markup: &str, anchor: &str) -> Option<usize> {
    let pattern = format!(r#"id\s*=\s*["']{}["']"#, regex::escape(anchor));
    let re = Regex::new(&pattern).ok()?;

    for found in re.find_iter(markup) {
        let Some(tag_open) = markup[..found.start()].rfind('<') else {
            continue;
        };
        if !markup[tag_open..found.start()].contains('>') {
            return Some(tag_open);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::models::TocNode;

    struct FakeBook {
        toc: Vec<TocNode>,
        resources: HashMap<String, String>,
    }

    impl FakeBook {
        fn new(resources: &[(&str, &str)]) -> Self {
            Self {
                toc: vec![],
                resources: resources
                    .iter()
                    .map(|(name, markup)| (name.to_string(), markup.to_string()))
                    .collect(),
            }
        }
    }

    impl BookDocument for FakeBook {
        fn toc(&self) -> &[TocNode] {
            &self.toc
        }

        fn resource_markup(&self, name: &str) -> Option<String> {
            self.resources.get(name).cloned()
        }
    }

    const CHAPTER: &str = concat!(
        "<html><body>\n",
        "<h1 id=\"intro\">Introduction</h1>\n",
        "<p>The modulo operator gives the remainder.</p>\n",
        "<h1 id=\"details\">Details</h1>\n",
        "<p>We write it as a percent sign.</p>\n",
        "</body></html>"
    );

    fn order(hrefs: &[&str]) -> Vec<String> {
        hrefs.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn whole_resource_extraction_covers_everything() {
        let book = FakeBook::new(&[("ch.xhtml", CHAPTER)]);
        let section = extract_section(&book, "ch.xhtml", &order(&["ch.xhtml"]));

        assert!(section.text.contains("remainder"));
        assert!(section.text.contains("percent sign"));
    }

    #[test]
    fn fragment_stops_at_next_anchor_of_same_resource() {
        let book = FakeBook::new(&[("ch.xhtml", CHAPTER)]);
        let flattened = order(&["ch.xhtml#intro", "ch.xhtml#details"]);

        let section = extract_section(&book, "ch.xhtml#intro", &flattened);
        assert!(section.text.contains("Introduction"));
        assert!(section.text.contains("remainder"));
        assert!(!section.text.contains("percent sign"));

        let section = extract_section(&book, "ch.xhtml#details", &flattened);
        assert!(section.text.contains("percent sign"));
        assert!(!section.text.contains("remainder"));
    }

    #[test]
    fn last_fragment_runs_to_end_of_resource() {
        let book = FakeBook::new(&[("ch.xhtml", CHAPTER)]);
        let flattened = order(&["ch.xhtml#details"]);

        let section = extract_section(&book, "ch.xhtml#details", &flattened);
        assert!(section.text.contains("percent sign"));
    }

    #[test]
    fn markers_name_the_full_target_exactly_once() {
        let book = FakeBook::new(&[("ch.xhtml", CHAPTER)]);
        let flattened = order(&["ch.xhtml#intro", "ch.xhtml#details"]);

        let section = extract_section(&book, "ch.xhtml#intro", &flattened);
        assert_eq!(
            section.text.matches("[HREF START:\tch.xhtml#intro\t]").count(),
            1
        );
        assert_eq!(
            section.text.matches("[HREF END:\tch.xhtml#intro\t]").count(),
            1
        );
        assert_eq!(section.text.matches("[HREF START:").count(), 1);
    }

    #[test]
    fn missing_anchor_yields_empty_section() {
        let book = FakeBook::new(&[("ch.xhtml", CHAPTER)]);
        let section = extract_section(&book, "ch.xhtml#ghost", &order(&["ch.xhtml#ghost"]));

        assert_eq!(strip_markers(&section.text), "");
    }

    #[test]
    fn missing_resource_yields_empty_section() {
        let book = FakeBook::new(&[]);
        let section = extract_section(&book, "gone.xhtml", &order(&["gone.xhtml"]));

        assert_eq!(strip_markers(&section.text), "");
    }

    #[test]
    fn id_inside_text_content_is_not_an_anchor() {
        let markup = concat!(
            "<p>the literal string id=\"fake\" appears in prose</p>\n",
            "<h2 id=\"real\">Real heading</h2>\n",
            "<p>Real body.</p>"
        );
        let book = FakeBook::new(&[("ch.xhtml", markup)]);

        let section = extract_section(&book, "ch.xhtml#fake", &order(&["ch.xhtml#fake"]));
        assert_eq!(strip_markers(&section.text), "");

        let section = extract_section(&book, "ch.xhtml#real", &order(&["ch.xhtml#real"]));
        assert!(section.text.contains("Real body."));
    }

    #[test]
    fn strip_markers_round_trips() {
        let wrapped = wrap_section("ch.xhtml#intro", "Some body text.");
        assert_eq!(strip_markers(&wrapped), "Some body text.");
    }
}
