use super::dom::{Document, NodeId};
use super::placement::{Position, Rect, Size};
use super::schedule::ScheduledTask;

pub const COPY_LABEL: &str = "Copy";
pub const COPIED_LABEL: &str = "Copied!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    CheckIcon,
    SuggestionLoading,
    Suggestion,
    ExplainBubble,
    ExplainLoading,
    Explanation,
}

impl OverlayKind {
    pub fn class_name(self) -> &'static str {
        match self {
            OverlayKind::CheckIcon => "fluent-check-icon",
            OverlayKind::SuggestionLoading => "fluent-tooltip fluent-loading",
            OverlayKind::Suggestion => "fluent-tooltip",
            OverlayKind::ExplainBubble => "fluent-explain-bubble",
            OverlayKind::ExplainLoading => "fluent-tooltip fluent-loading fluent-explain-tooltip",
            OverlayKind::Explanation => "fluent-tooltip fluent-explain-tooltip",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OverlayKind::CheckIcon => "Fluentify",
            OverlayKind::SuggestionLoading => "Checking grammar...",
            OverlayKind::Suggestion => "Suggestion",
            OverlayKind::ExplainBubble => "Explain",
            OverlayKind::ExplainLoading => "Explaining...",
            OverlayKind::Explanation => "Explanation",
        }
    }

    fn shows_text(self) -> bool {
        matches!(self, OverlayKind::Suggestion | OverlayKind::Explanation)
    }

    pub fn is_loading(self) -> bool {
        matches!(
            self,
            OverlayKind::SuggestionLoading | OverlayKind::ExplainLoading
        )
    }
}

/// Read-only snapshot of an overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayView {
    pub kind: OverlayKind,
    pub generation: u64,
    pub position: Position,
    pub target: Option<NodeId>,
    pub text: Option<String>,
    pub copy_label: Option<&'static str>,
    pub node: Option<NodeId>,
    pub dismiss_armed: bool,
    /// A close after copying is pending; hovering does not cancel it.
    pub closing: bool,
}

/// One floating element owned by the monitor.
#[derive(Debug)]
pub struct Overlay {
    kind: OverlayKind,
    generation: u64,
    position: Position,
    size: Size,
    anchor: Rect,
    target: Option<NodeId>,
    text: Option<String>,
    copy_label: Option<&'static str>,
    node: Option<NodeId>,
    dismiss: Option<ScheduledTask>,
    linger: Option<ScheduledTask>,
}

impl Overlay {
    pub fn new(kind: OverlayKind, generation: u64, position: Position, size: Size) -> Self {
        Self {
            kind,
            generation,
            position,
            size,
            anchor: Rect::default(),
            target: None,
            text: None,
            copy_label: None,
            node: None,
            dismiss: None,
            linger: None,
        }
    }

    pub fn for_target(mut self, target: NodeId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_anchor(mut self, anchor: Rect) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_copy(mut self) -> Self {
        self.copy_label = Some(COPY_LABEL);
        self
    }

    pub fn kind(&self) -> OverlayKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn anchor(&self) -> Rect {
        self.anchor
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn copy_label(&self) -> Option<&'static str> {
        self.copy_label
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn view(&self) -> OverlayView {
        OverlayView {
            kind: self.kind,
            generation: self.generation,
            position: self.position,
            target: self.target,
            text: self.text.clone(),
            copy_label: self.copy_label,
            node: self.node,
            dismiss_armed: self.dismiss.is_some(),
            closing: self.linger.is_some(),
        }
    }

    /// Replaces (or with `None`, cancels) the auto-dismiss task.
    pub fn set_dismiss(&mut self, task: Option<ScheduledTask>) {
        self.dismiss = task;
    }

    /// Schedules the close that follows a copy, separate from auto-dismiss.
    pub fn set_linger(&mut self, task: ScheduledTask) {
        self.linger = Some(task);
    }

    pub fn mark_copied(&mut self) {
        if self.copy_label.is_some() {
            self.copy_label = Some(COPIED_LABEL);
        }
    }

    fn mount(&mut self, doc: &mut Document) {
        let body = doc.body();
        let node = doc.append_element(body, "div");
        doc.set_attr(node, "class", self.kind.class_name());
        doc.set_rect(
            node,
            Rect::new(
                self.position.left,
                self.position.top,
                self.size.width,
                self.size.height,
            ),
        );
        doc.append_text(node, self.kind.label());
        if let Some(text) = self.text.as_deref().filter(|_| self.kind.shows_text()) {
            let body = doc.append_element(node, "div");
            doc.set_attr(body, "class", "fluent-text");
            doc.append_text(body, text);
        }
        self.node = Some(node);
    }

    fn unmount(&mut self, doc: &mut Document) {
        self.dismiss = None;
        self.linger = None;
        if let Some(node) = self.node.take() {
            doc.remove(node);
            doc.release(node);
        }
    }
}

/// Holder for a singleton overlay; the previous occupant is always torn down
/// before a new one is mounted.
#[derive(Debug, Default)]
pub struct OverlaySlot {
    current: Option<Overlay>,
}

impl OverlaySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, doc: &mut Document, mut overlay: Overlay) -> &mut Overlay {
        self.clear(doc);
        overlay.mount(doc);
        self.current.insert(overlay)
    }

    /// Tears down the occupant, if any. Returns whether something was removed.
    pub fn clear(&mut self, doc: &mut Document) -> bool {
        self.take(doc).is_some()
    }

    /// Tears down the occupant and hands it back for inspection.
    pub fn take(&mut self, doc: &mut Document) -> Option<Overlay> {
        let mut overlay = self.current.take()?;
        overlay.unmount(doc);
        Some(overlay)
    }

    pub fn get(&self) -> Option<&Overlay> {
        self.current.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Overlay> {
        self.current.as_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn holds(&self, kind: OverlayKind, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|overlay| overlay.kind == kind && overlay.generation == generation)
    }
}
