//! In-memory page model the monitor drives.
//!
//! Nodes live in an arena keyed by `NodeId`. Removing a node only detaches
//! it; [`Document::release`] frees a detached subtree. Ids are never reused,
//! so a stale id reads as an empty, disconnected node.

use std::collections::{BTreeMap, HashMap};

use super::placement::{Rect, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        value: Option<String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Rect,
}

/// Minimal CSS-like matcher covering the selectors the monitor needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Tag(&'static str),
    Class(&'static str),
    HasAttr(&'static str),
    AttrEquals(&'static str, &'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextSelection {
    pub text: String,
    pub rect: Rect,
}

/// Events the document synthesizes on behalf of script, recorded for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    Input { target: NodeId },
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: HashMap<NodeId, Node>,
    next_id: usize,
    body: NodeId,
    viewport: Viewport,
    selection: Option<TextSelection>,
    caret: Option<Rect>,
    focused: Option<NodeId>,
    clipboard: Option<String>,
    insert_text_supported: bool,
    events: Vec<DomEvent>,
}

impl Document {
    pub fn new(viewport: Viewport) -> Self {
        let body = Node {
            data: NodeData::Element {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
                value: None,
            },
            parent: None,
            children: Vec::new(),
            rect: Rect::new(0.0, 0.0, viewport.width, viewport.height),
        };
        Self {
            nodes: HashMap::from([(NodeId(0), body)]),
            next_id: 1,
            body: NodeId(0),
            viewport,
            selection: None,
            caret: None,
            focused: None,
            clipboard: None,
            insert_text_supported: true,
            events: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            value: None,
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                data,
                parent: None,
                children: Vec::new(),
                rect: Rect::default(),
            },
        );
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|node| &node.data)
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(&id).map(|node| &mut node.data)
    }

    /// Number of nodes still held by the arena, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            return;
        }
        self.detach(child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }

    /// Inserts `node` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            return;
        };
        if !self.nodes.contains_key(&node) {
            return;
        }
        self.detach(node);
        if let Some(entry) = self.nodes.get_mut(&parent) {
            let index = entry
                .children
                .iter()
                .position(|sibling| *sibling == reference)
                .map_or(entry.children.len(), |index| index + 1);
            entry.children.insert(index, node);
        }
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.parent = Some(parent);
        }
    }

    pub fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    /// Detaches every child of `node` and returns them.
    pub fn remove_children(&mut self, node: NodeId) -> Vec<NodeId> {
        let children = self
            .nodes
            .get_mut(&node)
            .map(|entry| std::mem::take(&mut entry.children))
            .unwrap_or_default();
        for child in &children {
            if let Some(entry) = self.nodes.get_mut(child) {
                entry.parent = None;
            }
        }
        children
    }

    /// Frees `node` and its subtree. Only detached nodes are freed; the body
    /// and anything still in the tree stay.
    pub fn release(&mut self, node: NodeId) {
        if node == self.body || self.parent(node).is_some() {
            return;
        }
        for id in self.descendants(node) {
            self.nodes.remove(&id);
        }
        if self.focused == Some(node) {
            self.focused = None;
        }
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|entry| entry.parent.take()) else {
            return;
        };
        if let Some(entry) = self.nodes.get_mut(&parent) {
            entry.children.retain(|child| *child != node);
        }
    }

    /// Convenience builder: creates `<tag>` under `parent`.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let node = self.create_element(tag);
        self.append_child(parent, node);
        node
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let node = self.create_text(text);
        self.append_child(parent, node);
        node
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|entry| entry.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// True when `node` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.data(node), Some(NodeData::Text(_)))
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Text(text) => Some(text.as_str()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, value: &str) {
        if let Some(NodeData::Text(text)) = self.data_mut(node) {
            *text = value.to_string();
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attrs, .. }) = self.data_mut(node) {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|name| name == class))
    }

    /// Form-field value (`textarea`, `input`).
    pub fn value(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element { value, .. } => value.as_deref(),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_value(&mut self, node: NodeId, new_value: &str) {
        if let Some(NodeData::Element { value, .. }) = self.data_mut(node) {
            *value = Some(new_value.to_string());
        }
    }

    pub fn rect(&self, node: NodeId) -> Rect {
        self.node(node).map(|entry| entry.rect).unwrap_or_default()
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.rect = rect;
        }
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|id| self.text(id))
            .collect()
    }

    pub fn last_element_child(&self, node: NodeId) -> Option<NodeId> {
        self.children(node)
            .iter()
            .rev()
            .copied()
            .find(|child| !self.is_text(*child))
    }

    /// `node` and its descendants in document order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut ordered = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if !self.nodes.contains_key(&id) {
                continue;
            }
            ordered.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        ordered
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        match *selector {
            Selector::Tag(tag) => self.tag(node) == Some(tag),
            Selector::Class(class) => self.has_class(node, class),
            Selector::HasAttr(name) => self.attr(node, name).is_some(),
            Selector::AttrEquals(name, expected) => self.attr(node, name) == Some(expected),
        }
    }

    /// Descendants of `root` (excluding `root`) matching any selector, in document order.
    pub fn query_all(&self, root: NodeId, selectors: &[Selector]) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .skip(1)
            .filter(|node| selectors.iter().any(|selector| self.matches(*node, selector)))
            .collect()
    }

    /// Nearest inclusive ancestor matching any selector.
    pub fn closest(&self, node: NodeId, selectors: &[Selector]) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if selectors.iter().any(|selector| self.matches(id, selector)) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    pub fn selection(&self) -> Option<&TextSelection> {
        self.selection.as_ref()
    }

    pub fn select_text(&mut self, text: &str, rect: Rect) {
        self.selection = Some(TextSelection {
            text: text.to_string(),
            rect,
        });
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn caret_rect(&self) -> Option<Rect> {
        self.caret
    }

    pub fn set_caret_rect(&mut self, rect: Option<Rect>) {
        self.caret = rect;
    }

    pub fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    pub fn write_clipboard(&mut self, text: &str) {
        self.clipboard = Some(text.to_string());
    }

    /// Whether the page honours the editing "insert text" command.
    pub fn insert_text_supported(&self) -> bool {
        self.insert_text_supported
    }

    pub fn set_insert_text_supported(&mut self, supported: bool) {
        self.insert_text_supported = supported;
    }

    pub fn dispatch(&mut self, event: DomEvent) {
        self.events.push(event);
    }

    /// Drains events synthesized since the last call.
    pub fn take_events(&mut self) -> Vec<DomEvent> {
        std::mem::take(&mut self.events)
    }
}
