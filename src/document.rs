use std::io::Cursor;
use std::sync::Mutex;

use epub::doc::{EpubDoc, NavPoint};

use crate::error::QuizError;
use crate::models::TocNode;

/// A parsed book exposing its table of contents and raw resource markup.
pub trait BookDocument: Send + Sync {
    fn toc(&self) -> &[TocNode];

    /// Body markup of the named resource, or `None` when the book has no
    /// such resource.
    fn resource_markup(&self, name: &str) -> Option<String>;
}

/// Turns raw bytes into a [`BookDocument`].
pub trait DocumentParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Box<dyn BookDocument>, QuizError>;
}

/// Strips markup down to plain text.
pub fn markup_to_text(markup: &str) -> String {
    html2text::from_read(markup.as_bytes(), 80)
        .trim()
        .to_string()
}

/// EPUB-backed document, parsed once from in-memory bytes.
pub struct EpubBook {
    // EpubDoc reads resources lazily from its archive and needs &mut for it.
    doc: Mutex<EpubDoc<Cursor<Vec<u8>>>>,
    toc: Vec<TocNode>,
}

impl EpubBook {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, QuizError> {
        let doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|err| QuizError::MalformedDocument(err.to_string()))?;

        let toc = doc.toc.iter().map(nav_to_node).collect();

        Ok(Self {
            doc: Mutex::new(doc),
            toc,
        })
    }
}

impl BookDocument for EpubBook {
    fn toc(&self) -> &[TocNode] {
        &self.toc
    }

    fn resource_markup(&self, name: &str) -> Option<String> {
        let mut doc = self.doc.lock().ok()?;
        doc.get_resource_str_by_path(name)
    }
}

fn nav_to_node(nav: &NavPoint) -> TocNode {
    let href = nav.content.to_string_lossy().to_string();

    if nav.children.is_empty() {
        TocNode::Leaf { href }
    } else {
        TocNode::Section {
            href: (!href.is_empty()).then_some(href),
            children: nav.children.iter().map(nav_to_node).collect(),
        }
    }
}

pub struct EpubParser;

impl DocumentParser for EpubParser {
    fn parse(&self, bytes: &[u8]) -> Result<Box<dyn BookDocument>, QuizError> {
        Ok(Box::new(EpubBook::from_bytes(bytes.to_vec())?))
    }
}
