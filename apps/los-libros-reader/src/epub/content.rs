//! XHTML content document flattening
//!
//! Walks a spine item with quick-xml and records every text chunk inside
//! `<body>` together with the structural address a CFI uses for it.

use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;

use super::parser::ParseError;
use super::types::TextNode;
use crate::cfi::TextNodeRef;

/// Elements whose text never reaches the reading surface
const SKIPPED_ELEMENTS: &[&[u8]] = &[b"head", b"script", b"style"];

/// Named entities that XHTML content commonly uses without a DTD
fn resolve_html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some("\u{a0}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "copy" => Some("\u{a9}"),
        "shy" => Some("\u{ad}"),
        _ => None,
    }
}

fn decode_text(text: BytesText<'_>) -> String {
    match text.unescape_with(resolve_html_entity) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&text.into_inner()).into_owned(),
    }
}

/// Open-element bookkeeping while walking the document
#[derive(Default)]
struct Walker {
    /// Element indices below the root element
    path: Vec<usize>,
    /// Element children seen so far, one counter per open element
    child_counts: Vec<usize>,
    body_depth: Option<usize>,
    skip_depth: Option<usize>,
    nodes: Vec<TextNode>,
}

impl Walker {
    fn open(&mut self, local_name: &[u8]) {
        if let Some(count) = self.child_counts.last_mut() {
            self.path.push(*count);
            *count += 1;
        }
        self.child_counts.push(0);

        let depth = self.child_counts.len();
        if local_name == b"body" && self.body_depth.is_none() {
            self.body_depth = Some(depth);
        }
        if SKIPPED_ELEMENTS.contains(&local_name) && self.skip_depth.is_none() {
            self.skip_depth = Some(depth);
        }
    }

    fn close(&mut self) {
        let depth = self.child_counts.len();
        if depth == 0 {
            return;
        }
        if self.skip_depth == Some(depth) {
            self.skip_depth = None;
        }
        if self.body_depth == Some(depth) {
            self.body_depth = None;
        }
        self.child_counts.pop();
        if depth > 1 {
            self.path.pop();
        }
    }

    fn text(&mut self, text: String) {
        if text.is_empty() || self.body_depth.is_none() || self.skip_depth.is_some() {
            return;
        }
        let Some(&text_index) = self.child_counts.last() else {
            return;
        };
        let node = TextNodeRef::new(self.path.clone(), text_index);

        // Comments and CDATA split one DOM text node into several events
        match self.nodes.last_mut() {
            Some(last) if last.node == node => last.text.push_str(&text),
            _ => self.nodes.push(TextNode { node, text }),
        }
    }
}

/// Flatten an XHTML document into its body text chunks
pub fn extract_text_nodes(xhtml: &str) -> Result<Vec<TextNode>, ParseError> {
    let mut reader = Reader::from_str(xhtml);
    reader.expand_empty_elements(true);
    reader.check_end_names(false);

    let mut walker = Walker::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => walker.open(e.local_name().as_ref()),
            Ok(Event::End(_)) => walker.close(),
            Ok(Event::Text(t)) => walker.text(decode_text(t)),
            Ok(Event::CData(c)) => {
                walker.text(String::from_utf8_lossy(&c.into_inner()).into_owned())
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::ContentError(format!(
                    "XHTML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(walker.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Skip me</title><style>p{}</style></head><body><h1>Title</h1><p>First <em>bold</em> tail&nbsp;text</p><p><![CDATA[raw]]> &amp; more</p></body></html>"#;

    #[test]
    fn test_extracts_body_text_with_addresses() {
        let nodes = extract_text_nodes(CHAPTER).unwrap();
        let texts: Vec<&str> = nodes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Title", "First ", "bold", " tail\u{a0}text", "raw & more"]);

        // body is the second child of <html>
        assert_eq!(nodes[0].node, TextNodeRef::new(vec![1, 0], 0));
        assert_eq!(nodes[1].node, TextNodeRef::new(vec![1, 1], 0));
        assert_eq!(nodes[2].node, TextNodeRef::new(vec![1, 1, 0], 0));
        // text after <em> is the second chunk of the paragraph
        assert_eq!(nodes[3].node, TextNodeRef::new(vec![1, 1], 1));
        assert_eq!(nodes[4].node, TextNodeRef::new(vec![1, 2], 0));
    }

    #[test]
    fn test_head_text_is_ignored() {
        let nodes = extract_text_nodes(CHAPTER).unwrap();
        assert!(nodes.iter().all(|n| !n.text.contains("Skip me")));
    }

    #[test]
    fn test_self_closing_elements_count_as_siblings() {
        let xhtml = "<html><head/><body><p>a<br/>b</p></body></html>";
        let nodes = extract_text_nodes(xhtml).unwrap();
        assert_eq!(nodes[0].node, TextNodeRef::new(vec![1, 0], 0));
        assert_eq!(nodes[1].node, TextNodeRef::new(vec![1, 0], 1));
    }
}
