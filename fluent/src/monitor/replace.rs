//! Mention-preserving text replacement.
//!
//! The matching policy lives in [`apply_correction`] and only talks to a
//! [`RichTextSurface`]; [`Document`] is one such surface.

use super::dom::{Document, DomEvent, NodeId, Selector};
use super::extract::{extract_text, is_plain_field};

pub const MENTION_SELECTORS: [Selector; 4] = [
    Selector::AttrEquals("data-stringify-type", "mention"),
    Selector::HasAttr("data-mention-id"),
    Selector::Class("c-member_slug"),
    Selector::Class("c-channel_entity"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Field value replaced through the editing command.
    Inserted,
    /// Editing command unavailable; value assigned and an input event synthesized.
    Assigned,
    /// Whole rich region replaced.
    ReplacedAll,
    /// Only the text after the last mention widget replaced.
    ReplacedSuffix,
}

/// Editing operations a host toolkit offers for one editable target.
pub trait RichTextSurface {
    type Marker: Copy;

    fn is_plain_field(&self, target: NodeId) -> bool;
    fn extract(&self, target: NodeId) -> String;
    /// Mention widgets in document order with their display text.
    fn mentions(&self, target: NodeId) -> Vec<(Self::Marker, String)>;
    /// Returns `false` when the host refuses the insert command.
    fn insert_into_field(&mut self, target: NodeId, text: &str) -> bool;
    fn assign_field(&mut self, target: NodeId, text: &str);
    fn replace_all(&mut self, target: NodeId, text: &str);
    fn replace_suffix(&mut self, target: NodeId, after: Self::Marker, text: &str);
}

/// Removes the first occurrence of every mention's trimmed text, then trims.
pub fn strip_mentions<'a>(correction: &str, mentions: impl IntoIterator<Item = &'a str>) -> String {
    let mut remainder = correction.to_string();
    for mention in mentions {
        let mention = mention.trim();
        if mention.is_empty() {
            continue;
        }
        remainder = remainder.replacen(mention, "", 1);
    }
    remainder.trim().to_string()
}

pub fn apply_correction<S: RichTextSurface>(
    surface: &mut S,
    target: NodeId,
    correction: &str,
) -> ReplaceOutcome {
    if surface.is_plain_field(target) {
        if surface.insert_into_field(target, correction) {
            return ReplaceOutcome::Inserted;
        }
        surface.assign_field(target, correction);
        return ReplaceOutcome::Assigned;
    }

    let mentions = surface.mentions(target);
    let Some(last) = mentions.last().map(|(marker, _)| *marker) else {
        surface.replace_all(target, correction);
        return ReplaceOutcome::ReplacedAll;
    };

    let remainder = strip_mentions(correction, mentions.iter().map(|(_, text)| text.as_str()));
    surface.replace_suffix(target, last, &format!(" {remainder}"));
    ReplaceOutcome::ReplacedSuffix
}

pub fn has_mentions(doc: &Document, target: NodeId) -> bool {
    !doc.query_all(target, &MENTION_SELECTORS).is_empty()
}

impl Document {
    /// Text nodes for `text`, with `<br>` between lines.
    fn append_lines(&mut self, parent: NodeId, text: &str) {
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                self.append_element(parent, "br");
            }
            if !line.is_empty() {
                self.append_text(parent, line);
            }
        }
    }
}

impl RichTextSurface for Document {
    type Marker = NodeId;

    fn is_plain_field(&self, target: NodeId) -> bool {
        is_plain_field(self, target)
    }

    fn extract(&self, target: NodeId) -> String {
        extract_text(self, target)
    }

    fn mentions(&self, target: NodeId) -> Vec<(NodeId, String)> {
        let matches = self.query_all(target, &MENTION_SELECTORS);
        // Nested matches belong to their outermost widget.
        matches
            .iter()
            .copied()
            .filter(|node| {
                !matches
                    .iter()
                    .any(|outer| outer != node && self.contains(*outer, *node))
            })
            .map(|node| (node, self.text_content(node)))
            .collect()
    }

    fn insert_into_field(&mut self, target: NodeId, text: &str) -> bool {
        self.focus(target);
        if !self.insert_text_supported() {
            return false;
        }
        self.set_value(target, text);
        true
    }

    fn assign_field(&mut self, target: NodeId, text: &str) {
        self.set_value(target, text);
        self.dispatch(DomEvent::Input { target });
    }

    fn replace_all(&mut self, target: NodeId, text: &str) {
        self.focus(target);
        for child in self.remove_children(target) {
            self.release(child);
        }
        self.append_lines(target, text);
    }

    fn replace_suffix(&mut self, target: NodeId, after: NodeId, text: &str) {
        self.focus(target);

        // Drop everything following the marker up to the end of the region.
        let mut current = after;
        while current != target {
            let Some(parent) = self.parent(current) else {
                return;
            };
            let siblings = self.children(parent).to_vec();
            if let Some(index) = siblings.iter().position(|sibling| *sibling == current) {
                for sibling in &siblings[index + 1..] {
                    self.remove(*sibling);
                    self.release(*sibling);
                }
            }
            current = parent;
        }

        let inserted = self.create_text(text);
        self.insert_after(after, inserted);
    }
}
