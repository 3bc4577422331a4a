use super::dom::{Document, NodeId};

const BREAK_BEFORE: [&str; 5] = ["br", "p", "div", "li", "blockquote"];
const BREAK_AFTER: [&str; 4] = ["p", "div", "li", "blockquote"];

/// `textarea` or `<input type="text">`, which carry their text as a value.
pub fn is_plain_field(doc: &Document, node: NodeId) -> bool {
    match doc.tag(node) {
        Some("textarea") => true,
        Some("input") => doc.attr(node, "type").unwrap_or("text") == "text",
        _ => false,
    }
}

/// User-visible text of an editable target, with block boundaries folded
/// into single newlines and outer whitespace trimmed.
pub fn extract_text(doc: &Document, target: NodeId) -> String {
    if is_plain_field(doc, target) {
        return doc.value(target).unwrap_or_default().trim().to_string();
    }

    let mut pieces = Vec::new();
    walk(doc, target, &mut pieces);
    pieces.concat().trim().to_string()
}

fn walk<'a>(doc: &'a Document, node: NodeId, pieces: &mut Vec<&'a str>) {
    if let Some(text) = doc.text(node) {
        pieces.push(text);
        return;
    }

    let tag = doc.tag(node).unwrap_or_default();
    if BREAK_BEFORE.iter().any(|name| *name == tag) {
        push_break(pieces);
    }
    for child in doc.children(node) {
        walk(doc, *child, pieces);
    }
    if BREAK_AFTER.iter().any(|name| *name == tag) {
        push_break(pieces);
    }
}

fn push_break(pieces: &mut Vec<&str>) {
    if pieces.last().is_some_and(|last| !last.ends_with('\n')) {
        pieces.push("\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::placement::Viewport;

    fn editor() -> (Document, NodeId) {
        let mut doc = Document::new(Viewport::new(1024.0, 768.0));
        let body = doc.body();
        let editor = doc.append_element(body, "div");
        doc.set_attr(editor, "contenteditable", "true");
        (doc, editor)
    }

    fn block(doc: &mut Document, parent: NodeId, tag: &str, text: &str) {
        let node = doc.append_element(parent, tag);
        doc.append_text(node, text);
    }

    #[test]
    fn div_per_line_becomes_newline_separated() {
        let (mut doc, editor) = editor();
        block(&mut doc, editor, "div", "line1");
        block(&mut doc, editor, "div", "line2");
        assert_eq!(extract_text(&doc, editor), "line1\nline2");
    }

    #[test]
    fn duplicate_paragraphs_keep_a_single_separator() {
        let (mut doc, editor) = editor();
        block(&mut doc, editor, "p", "a");
        block(&mut doc, editor, "p", "a");
        assert_eq!(extract_text(&doc, editor), "a\na");
    }

    #[test]
    fn br_separates_inline_text() {
        let (mut doc, editor) = editor();
        doc.append_text(editor, "hello");
        doc.append_element(editor, "br");
        doc.append_element(editor, "br");
        doc.append_text(editor, "world");
        assert_eq!(extract_text(&doc, editor), "hello\nworld");
    }

    #[test]
    fn mentions_are_read_as_plain_text() {
        let (mut doc, editor) = editor();
        let mention = doc.append_element(editor, "span");
        doc.set_attr(mention, "data-mention-id", "U123");
        doc.append_text(mention, "@alice");
        doc.append_text(editor, " is late  ");
        assert_eq!(extract_text(&doc, editor), "@alice is late");
    }

    #[test]
    fn plain_fields_use_trimmed_value() {
        let mut doc = Document::new(Viewport::new(1024.0, 768.0));
        let body = doc.body();
        let area = doc.append_element(body, "textarea");
        doc.set_value(area, "  some draft text \n");
        assert!(is_plain_field(&doc, area));
        assert_eq!(extract_text(&doc, area), "some draft text");

        let search = doc.append_element(body, "input");
        doc.set_attr(search, "type", "search");
        assert!(!is_plain_field(&doc, search));
    }
}
