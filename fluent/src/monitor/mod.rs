//! Per-page orchestration: editable target discovery, debounced checks,
//! floating overlays and mention-safe replacement.
//!
//! The host forwards page events (`on_input`, `on_mouse_up`, ...) to a
//! [`PageMonitor`]; timers and channel round-trips run as tokio tasks that
//! re-enter the monitor through a cloned handle.

pub mod dom;
pub mod extract;
pub mod overlay;
pub mod placement;
pub mod replace;
pub mod schedule;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelError};
use crate::service::{Request, Response};
use crate::settings::Settings;
use crate::utils::preview;

pub use dom::{Document, DomEvent, NodeId, Selector};
pub use overlay::{OverlayKind, OverlayView};
pub use placement::{Position, Rect, Size, Viewport};
pub use replace::ReplaceOutcome;

use extract::{extract_text, is_plain_field};
use overlay::{COPIED_LABEL, Overlay, OverlaySlot};
use placement::{place_above_or_below, place_beside, place_below};
use replace::{apply_correction, has_mentions};
use schedule::ScheduledTask;

const EDITABLE_SELECTORS: [Selector; 3] = [
    Selector::AttrEquals("contenteditable", "true"),
    Selector::AttrEquals("contenteditable", "plaintext-only"),
    Selector::Tag("textarea"),
];

const OWN_UI_SELECTORS: [Selector; 3] = [
    Selector::Class("fluent-tooltip"),
    Selector::Class("fluent-explain-bubble"),
    Selector::Class("fluent-check-icon"),
];

/// Timings, thresholds and overlay sizes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    pub debounce_ms: u64,
    pub min_length: usize,
    pub suppress_after_apply_ms: u64,
    pub suggestion_dismiss_ms: u64,
    pub explanation_dismiss_ms: u64,
    pub min_selection_length: usize,
    pub paste_settle_ms: u64,
    pub blur_grace_ms: u64,
    pub copied_linger_ms: u64,
    pub tooltip_pad: f64,
    pub icon_pad: f64,
    pub icon_size: Size,
    pub bubble_size: Size,
    pub loading_size: Size,
    pub tooltip_size: Size,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_500,
            min_length: 10,
            suppress_after_apply_ms: 3_000,
            suggestion_dismiss_ms: 10_000,
            explanation_dismiss_ms: 15_000,
            min_selection_length: 3,
            paste_settle_ms: 300,
            blur_grace_ms: 200,
            copied_linger_ms: 800,
            tooltip_pad: 8.0,
            icon_pad: 6.0,
            icon_size: Size::new(96.0, 28.0),
            bubble_size: Size::new(84.0, 28.0),
            loading_size: Size::new(180.0, 36.0),
            tooltip_size: Size::new(320.0, 120.0),
        }
    }
}

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeatureFlags {
    text_improvement: bool,
    fluentify: bool,
    explain: bool,
    site_disabled: bool,
}

impl FeatureFlags {
    fn resolve(settings: &Settings, hostname: &str) -> Self {
        Self {
            text_improvement: settings.text_improvement_enabled,
            fluentify: settings.fluentify_enabled,
            explain: settings.explain_enabled,
            site_disabled: settings.is_site_disabled(hostname),
        }
    }

    fn checks_allowed(self) -> bool {
        self.text_improvement && !self.site_disabled
    }

    fn icon_allowed(self) -> bool {
        self.checks_allowed() && self.fluentify
    }

    fn explain_allowed(self) -> bool {
        self.explain && !self.site_disabled
    }
}

#[derive(Debug, Default)]
struct TargetState {
    last_checked: String,
    icon: OverlaySlot,
    pending_check: Option<ScheduledTask>,
    pending_blur: Option<ScheduledTask>,
    pending_paste: Option<ScheduledTask>,
}

struct PageState {
    doc: Document,
    flags: FeatureFlags,
    targets: HashMap<NodeId, TargetState>,
    suggestion: OverlaySlot,
    explain_bubble: OverlaySlot,
    explain_tooltip: OverlaySlot,
    suppress_until: Option<Instant>,
    generation: u64,
}

impl PageState {
    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn remove_suggestion(&mut self) {
        self.suggestion.clear(&mut self.doc);
    }

    fn remove_explain(&mut self) {
        self.explain_bubble.clear(&mut self.doc);
        self.explain_tooltip.clear(&mut self.doc);
    }

    fn remove_icon(&mut self, target: NodeId) {
        if let Some(entry) = self.targets.get_mut(&target) {
            entry.icon.clear(&mut self.doc);
        }
    }

    fn tooltip_slot(&mut self, kind: OverlayKind) -> Option<&mut OverlaySlot> {
        match kind {
            OverlayKind::Suggestion | OverlayKind::SuggestionLoading => Some(&mut self.suggestion),
            OverlayKind::Explanation | OverlayKind::ExplainLoading => {
                Some(&mut self.explain_tooltip)
            }
            OverlayKind::ExplainBubble | OverlayKind::CheckIcon => None,
        }
    }
}

struct Inner<C> {
    channel: C,
    config: MonitorConfig,
    hostname: String,
    state: Mutex<PageState>,
}

/// Cheaply cloneable handle to one page's monitor.
pub struct PageMonitor<C: Channel> {
    inner: Arc<Inner<C>>,
}

impl<C: Channel> Clone for PageMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Channel> PageMonitor<C> {
    pub fn new(
        channel: C,
        document: Document,
        hostname: impl Into<String>,
        settings: &Settings,
        config: MonitorConfig,
    ) -> Self {
        let hostname = hostname.into();
        let flags = FeatureFlags::resolve(settings, &hostname);
        Self {
            inner: Arc::new(Inner {
                channel,
                config,
                hostname,
                state: Mutex::new(PageState {
                    doc: document,
                    flags,
                    targets: HashMap::new(),
                    suggestion: OverlaySlot::new(),
                    explain_bubble: OverlaySlot::new(),
                    explain_tooltip: OverlaySlot::new(),
                    suppress_until: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` against the page, e.g. to apply host-side DOM changes.
    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.state().doc)
    }

    pub fn is_tracked(&self, target: NodeId) -> bool {
        self.state().targets.contains_key(&target)
    }

    pub fn last_checked(&self, target: NodeId) -> Option<String> {
        self.state()
            .targets
            .get(&target)
            .map(|entry| entry.last_checked.clone())
    }

    pub fn suggestion(&self) -> Option<OverlayView> {
        self.state().suggestion.get().map(Overlay::view)
    }

    pub fn explain_bubble(&self) -> Option<OverlayView> {
        self.state().explain_bubble.get().map(Overlay::view)
    }

    pub fn explanation(&self) -> Option<OverlayView> {
        self.state().explain_tooltip.get().map(Overlay::view)
    }

    pub fn check_icon(&self, target: NodeId) -> Option<OverlayView> {
        self.state()
            .targets
            .get(&target)
            .and_then(|entry| entry.icon.get())
            .map(Overlay::view)
    }

    // --- discovery ---

    /// Attaches to new editable targets and forgets detached ones.
    /// Returns how many targets were newly attached.
    pub fn scan(&self) -> usize {
        let mut guard = self.state();
        let state = &mut *guard;

        let detached: Vec<NodeId> = state
            .targets
            .keys()
            .copied()
            .filter(|node| !state.doc.is_connected(*node))
            .collect();
        for node in detached {
            if let Some(mut entry) = state.targets.remove(&node) {
                entry.icon.clear(&mut state.doc);
            }
            debug!(?node, "editable target left the page");
        }

        let suggestion_orphaned = state
            .suggestion
            .get()
            .and_then(Overlay::target)
            .is_some_and(|target| !state.doc.is_connected(target));
        if suggestion_orphaned {
            state.remove_suggestion();
        }

        let body = state.doc.body();
        let mut attached = 0;
        for node in state.doc.query_all(body, &EDITABLE_SELECTORS) {
            if state.targets.contains_key(&node) || !should_attach(&state.doc, node) {
                continue;
            }
            state.targets.insert(node, TargetState::default());
            attached += 1;
        }
        if attached > 0 {
            debug!(attached, "attached to editable targets");
        }
        attached
    }

    pub fn on_mutation(&self) {
        self.scan();
    }

    // --- target events ---

    pub fn on_input(&self, target: NodeId) {
        let mut state = self.state();
        if !state.targets.contains_key(&target) {
            return;
        }
        self.schedule_check(&mut state, target, false);
        self.update_check_icon(&mut state, target);
    }

    pub fn on_paste(&self, target: NodeId) {
        let mut state = self.state();
        let monitor = self.clone();
        if let Some(entry) = state.targets.get_mut(&target) {
            entry.pending_paste = Some(ScheduledTask::after(
                millis(self.inner.config.paste_settle_ms),
                move || monitor.after_paste(target),
            ));
        }
    }

    fn after_paste(&self, target: NodeId) {
        let mut state = self.state();
        if let Some(entry) = state.targets.get_mut(&target) {
            entry.last_checked.clear();
        }
        self.update_check_icon(&mut state, target);
    }

    pub fn on_key_down(&self, target: NodeId, key: &str, shift: bool) {
        if key != "Enter" || shift {
            return;
        }
        let mut state = self.state();
        state.remove_suggestion();
        state.remove_icon(target);
        if let Some(entry) = state.targets.get_mut(&target) {
            entry.last_checked.clear();
        }
    }

    pub fn on_focus(&self, target: NodeId) {
        let mut state = self.state();
        if let Some(entry) = state.targets.get_mut(&target) {
            entry.pending_blur = None;
        }
        self.update_check_icon(&mut state, target);
    }

    pub fn on_blur(&self, target: NodeId) {
        let mut state = self.state();
        let monitor = self.clone();
        if let Some(entry) = state.targets.get_mut(&target) {
            entry.pending_blur = Some(ScheduledTask::after(
                millis(self.inner.config.blur_grace_ms),
                move || monitor.state().remove_icon(target),
            ));
        }
    }

    /// Fluentify: forget the last check and run one immediately.
    pub fn click_check_icon(&self, target: NodeId) {
        let mut state = self.state();
        let Some(entry) = state.targets.get_mut(&target) else {
            return;
        };
        entry.last_checked.clear();
        self.schedule_check(&mut state, target, true);
    }

    // --- document events ---

    pub fn on_document_key_down(&self, key: &str) {
        if key == "Escape" {
            let mut state = self.state();
            state.remove_suggestion();
            state.remove_explain();
        }
    }

    pub fn on_mouse_up(&self) {
        let config = &self.inner.config;
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.flags.explain_allowed() {
            return;
        }

        let selection = state
            .doc
            .selection()
            .map(|selection| (selection.text.trim().to_string(), selection.rect));
        let Some((text, rect)) =
            selection.filter(|(text, _)| text.chars().count() >= config.min_selection_length)
        else {
            state.remove_explain();
            return;
        };

        state.remove_explain();
        let generation = state.next_generation();
        let position = place_beside(rect, config.bubble_size, state.doc.viewport(), config.icon_pad);
        state.explain_bubble.replace(
            &mut state.doc,
            Overlay::new(OverlayKind::ExplainBubble, generation, position, config.bubble_size)
                .with_anchor(rect)
                .with_text(text),
        );
    }

    pub fn on_mouse_down(&self, node: NodeId) {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(bubble) = state.explain_bubble.get().and_then(Overlay::node) else {
            return;
        };
        let inside_tooltip = state
            .explain_tooltip
            .get()
            .and_then(Overlay::node)
            .is_some_and(|tooltip| state.doc.contains(tooltip, node));
        if !state.doc.contains(bubble, node) && !inside_tooltip {
            state.remove_explain();
        }
    }

    // --- overlay actions ---

    /// Replaces the target's text with the shown suggestion.
    pub fn apply_suggestion(&self) -> Option<ReplaceOutcome> {
        let config = &self.inner.config;
        let mut guard = self.state();
        let state = &mut *guard;
        if state.suggestion.get().map(Overlay::kind) != Some(OverlayKind::Suggestion) {
            return None;
        }
        let overlay = state.suggestion.take(&mut state.doc)?;
        let target = overlay.target()?;
        let improved = overlay.text()?.to_string();

        if let Some(entry) = state.targets.get_mut(&target) {
            entry.last_checked = improved.trim().to_string();
        }
        state.suppress_until = Some(Instant::now() + millis(config.suppress_after_apply_ms));

        if !state.doc.is_connected(target) {
            warn!(?target, "suggestion target left the page before apply");
            return None;
        }
        let outcome = apply_correction(&mut state.doc, target, &improved);
        info!(?outcome, text = %preview(&improved, 40), "applied suggestion");
        Some(outcome)
    }

    /// Copies the suggestion (offered only when mentions are present).
    pub fn copy_suggestion(&self) -> bool {
        let config = &self.inner.config;
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(overlay) = state.suggestion.get_mut() else {
            return false;
        };
        if overlay.kind() != OverlayKind::Suggestion || overlay.copy_label().is_none() {
            return false;
        }

        let text = overlay.text().unwrap_or_default().to_string();
        state.doc.write_clipboard(&text);
        overlay.mark_copied();
        let linger = self.dismiss_task(
            OverlayKind::Suggestion,
            overlay.generation(),
            millis(config.copied_linger_ms),
        );
        overlay.set_linger(linger);
        true
    }

    pub fn dismiss_suggestion(&self) {
        self.state().remove_suggestion();
    }

    pub fn dismiss_explanation(&self) {
        self.state().remove_explain();
    }

    /// Pauses auto-dismiss while the pointer is over a tooltip.
    pub fn pointer_enter(&self, kind: OverlayKind) {
        let mut state = self.state();
        let Some(overlay) = state.tooltip_slot(kind).and_then(OverlaySlot::get_mut) else {
            return;
        };
        if overlay.kind() == kind && !kind.is_loading() {
            overlay.set_dismiss(None);
        }
    }

    /// Restarts auto-dismiss from the full delay.
    pub fn pointer_leave(&self, kind: OverlayKind) {
        let config = &self.inner.config;
        let delay = match kind {
            OverlayKind::Suggestion => millis(config.suggestion_dismiss_ms),
            OverlayKind::Explanation => millis(config.explanation_dismiss_ms),
            _ => return,
        };
        let mut state = self.state();
        let Some(overlay) = state.tooltip_slot(kind).and_then(OverlaySlot::get_mut) else {
            return;
        };
        if overlay.kind() != kind || overlay.copy_label() == Some(COPIED_LABEL) {
            return;
        }
        let generation = overlay.generation();
        overlay.set_dismiss(Some(self.dismiss_task(kind, generation, delay)));
    }

    pub fn click_explain_bubble(&self) -> bool {
        let config = &self.inner.config;
        let (text, generation) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let Some(bubble) = state.explain_bubble.take(&mut state.doc) else {
                return false;
            };
            let text = bubble.text().unwrap_or_default().to_string();
            let rect = bubble.anchor();
            let generation = state.next_generation();
            let position = place_below(rect, state.doc.viewport(), config.tooltip_pad);
            state.explain_tooltip.replace(
                &mut state.doc,
                Overlay::new(OverlayKind::ExplainLoading, generation, position, config.loading_size)
                    .with_anchor(rect),
            );
            (text, generation)
        };

        info!(generation, text = %preview(&text, 40), "explaining selection");
        let monitor = self.clone();
        tokio::spawn(async move { monitor.request_explanation(text, generation).await });
        true
    }

    // --- settings ---

    /// Applies a new settings snapshot, tearing down UI for disabled features.
    pub fn apply_settings(&self, settings: &Settings) {
        let flags = FeatureFlags::resolve(settings, &self.inner.hostname);
        let mut guard = self.state();
        let state = &mut *guard;
        let previous = std::mem::replace(&mut state.flags, flags);

        if !flags.checks_allowed() {
            state.remove_suggestion();
            for entry in state.targets.values_mut() {
                entry.pending_check = None;
            }
        }
        if !flags.icon_allowed() {
            for entry in state.targets.values_mut() {
                entry.icon.clear(&mut state.doc);
            }
        }
        if !flags.explain_allowed() {
            state.remove_explain();
        }

        if flags != previous {
            info!(
                hostname = %self.inner.hostname,
                text_improvement = flags.text_improvement,
                fluentify = flags.fluentify,
                explain = flags.explain,
                site_disabled = flags.site_disabled,
                "page monitor settings changed"
            );
        }
    }

    /// Follows a settings feed until its sender goes away.
    pub fn follow_settings(&self, mut updates: watch::Receiver<Settings>) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let initial = updates.borrow_and_update().clone();
            monitor.apply_settings(&initial);
            while updates.changed().await.is_ok() {
                let settings = updates.borrow_and_update().clone();
                monitor.apply_settings(&settings);
            }
            debug!("settings feed closed");
        })
    }

    // --- internals ---

    fn schedule_check(&self, state: &mut PageState, target: NodeId, immediate: bool) {
        if !state.flags.checks_allowed() {
            return;
        }
        let Some(entry) = state.targets.get_mut(&target) else {
            return;
        };
        entry.pending_check = None;

        if state
            .suppress_until
            .is_some_and(|until| Instant::now() < until)
        {
            debug!(?target, "check suppressed right after apply");
            return;
        }

        let delay = if immediate {
            Duration::ZERO
        } else {
            millis(self.inner.config.debounce_ms)
        };
        let monitor = self.clone();
        entry.pending_check = Some(ScheduledTask::after(delay, move || {
            monitor.fire_check(target)
        }));
    }

    fn fire_check(&self, target: NodeId) {
        let config = &self.inner.config;
        let (text, generation) = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.doc.is_connected(target) {
                return;
            }
            let text = extract_text(&state.doc, target);
            let Some(entry) = state.targets.get_mut(&target) else {
                return;
            };
            if text.chars().count() < config.min_length {
                return;
            }
            if text == entry.last_checked {
                debug!(?target, "text unchanged since last check");
                return;
            }
            entry.last_checked = text.clone();
            entry.icon.clear(&mut state.doc);

            let generation = state.next_generation();
            let anchor = state.doc.rect(target);
            let position = place_above_or_below(
                anchor,
                config.loading_size,
                state.doc.viewport(),
                config.tooltip_pad,
            );
            state.suggestion.replace(
                &mut state.doc,
                Overlay::new(
                    OverlayKind::SuggestionLoading,
                    generation,
                    position,
                    config.loading_size,
                )
                .for_target(target)
                .with_anchor(anchor),
            );
            (text, generation)
        };

        info!(generation, text = %preview(&text, 40), "checking grammar");
        let monitor = self.clone();
        tokio::spawn(async move { monitor.request_correction(target, text, generation).await });
    }

    async fn ping_service(&self) -> Result<(), ChannelError> {
        match self.inner.channel.send(Request::Ping).await? {
            Response::Pong { ok: true } => Ok(()),
            other => Err(ChannelError::Malformed(format!(
                "unexpected ping reply: {other:?}"
            ))),
        }
    }

    async fn request_correction(&self, target: NodeId, text: String, generation: u64) {
        if let Err(err) = self.ping_service().await {
            warn!("correction service unavailable: {err}");
            self.discard_loading(OverlayKind::SuggestionLoading, generation);
            return;
        }

        let reply = self
            .inner
            .channel
            .send(Request::CheckGrammar { text: text.clone() })
            .await;
        let improved = match reply {
            Ok(Response::Improved { improved }) => improved,
            Ok(Response::Error { error }) => {
                warn!("grammar check failed: {error}");
                self.discard_loading(OverlayKind::SuggestionLoading, generation);
                return;
            }
            Ok(other) => {
                warn!(?other, "unexpected reply to grammar check");
                self.discard_loading(OverlayKind::SuggestionLoading, generation);
                return;
            }
            Err(err) => {
                warn!("grammar check did not reach the service: {err}");
                self.discard_loading(OverlayKind::SuggestionLoading, generation);
                return;
            }
        };

        if improved.trim().is_empty() || improved.trim() == text.trim() {
            debug!(generation, "no change suggested");
            self.discard_loading(OverlayKind::SuggestionLoading, generation);
            return;
        }
        self.show_suggestion(target, improved, generation);
    }

    fn show_suggestion(&self, target: NodeId, improved: String, generation: u64) {
        let config = &self.inner.config;
        let mut guard = self.state();
        let state = &mut *guard;
        if !state
            .suggestion
            .holds(OverlayKind::SuggestionLoading, generation)
        {
            debug!(generation, "dropping stale correction");
            return;
        }
        if !state.doc.is_connected(target) {
            state.remove_suggestion();
            return;
        }

        let anchor = state.doc.rect(target);
        let position = place_above_or_below(
            anchor,
            config.tooltip_size,
            state.doc.viewport(),
            config.tooltip_pad,
        );
        let mut overlay =
            Overlay::new(OverlayKind::Suggestion, generation, position, config.tooltip_size)
                .for_target(target)
                .with_anchor(anchor)
                .with_text(improved);
        if has_mentions(&state.doc, target) {
            overlay = overlay.with_copy();
        }
        let dismiss = self.dismiss_task(
            OverlayKind::Suggestion,
            generation,
            millis(config.suggestion_dismiss_ms),
        );
        state
            .suggestion
            .replace(&mut state.doc, overlay)
            .set_dismiss(Some(dismiss));
    }

    async fn request_explanation(&self, text: String, generation: u64) {
        if let Err(err) = self.ping_service().await {
            warn!("correction service unavailable: {err}");
            self.discard_loading(OverlayKind::ExplainLoading, generation);
            return;
        }

        match self.inner.channel.send(Request::ExplainText { text }).await {
            Ok(Response::Explanation { explanation }) if !explanation.trim().is_empty() => {
                self.show_explanation(explanation, generation);
            }
            Ok(Response::Error { error }) => {
                warn!("explain failed: {error}");
                self.discard_loading(OverlayKind::ExplainLoading, generation);
            }
            Ok(other) => {
                warn!(?other, "no explanation in reply");
                self.discard_loading(OverlayKind::ExplainLoading, generation);
            }
            Err(err) => {
                warn!("explain did not reach the service: {err}");
                self.discard_loading(OverlayKind::ExplainLoading, generation);
            }
        }
    }

    fn show_explanation(&self, explanation: String, generation: u64) {
        let config = &self.inner.config;
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(anchor) = state
            .explain_tooltip
            .get()
            .filter(|overlay| {
                overlay.kind() == OverlayKind::ExplainLoading
                    && overlay.generation() == generation
            })
            .map(Overlay::anchor)
        else {
            debug!(generation, "dropping stale explanation");
            return;
        };

        let position = place_below(anchor, state.doc.viewport(), config.tooltip_pad);
        let overlay =
            Overlay::new(OverlayKind::Explanation, generation, position, config.tooltip_size)
                .with_anchor(anchor)
                .with_text(explanation);
        let dismiss = self.dismiss_task(
            OverlayKind::Explanation,
            generation,
            millis(config.explanation_dismiss_ms),
        );
        state
            .explain_tooltip
            .replace(&mut state.doc, overlay)
            .set_dismiss(Some(dismiss));
    }

    fn discard_loading(&self, kind: OverlayKind, generation: u64) {
        let mut guard = self.state();
        let state = &mut *guard;
        let slot = match kind {
            OverlayKind::SuggestionLoading => &mut state.suggestion,
            OverlayKind::ExplainLoading => &mut state.explain_tooltip,
            _ => return,
        };
        if slot.holds(kind, generation) {
            slot.clear(&mut state.doc);
        } else {
            debug!(generation, "loading overlay already replaced");
        }
    }

    fn dismiss_task(&self, kind: OverlayKind, generation: u64, delay: Duration) -> ScheduledTask {
        let monitor = self.clone();
        ScheduledTask::after(delay, move || monitor.expire(kind, generation))
    }

    fn expire(&self, kind: OverlayKind, generation: u64) {
        let mut state = self.state();
        match kind {
            OverlayKind::Suggestion if state.suggestion.holds(kind, generation) => {
                state.remove_suggestion();
            }
            OverlayKind::Explanation if state.explain_tooltip.holds(kind, generation) => {
                state.remove_explain();
            }
            _ => {}
        }
    }

    fn update_check_icon(&self, state: &mut PageState, target: NodeId) {
        let config = &self.inner.config;
        if !state.flags.icon_allowed() || !state.targets.contains_key(&target) {
            return;
        }

        let text = extract_text(&state.doc, target);
        let anchor = icon_anchor(&state.doc, target);
        let position = place_beside(anchor, config.icon_size, state.doc.viewport(), config.icon_pad);
        let Some(entry) = state.targets.get_mut(&target) else {
            return;
        };

        if text.chars().count() >= config.min_length && text != entry.last_checked {
            if entry.icon.get().is_some_and(|icon| icon.position() == position) {
                return;
            }
            state.generation += 1;
            let generation = state.generation;
            entry.icon.replace(
                &mut state.doc,
                Overlay::new(OverlayKind::CheckIcon, generation, position, config.icon_size)
                    .for_target(target)
                    .with_anchor(anchor),
            );
        } else {
            entry.icon.clear(&mut state.doc);
        }
    }
}

fn should_attach(doc: &Document, node: NodeId) -> bool {
    if doc.closest(node, &OWN_UI_SELECTORS).is_some() {
        return false;
    }
    doc.tag(node) != Some("input")
}

/// Plain fields anchor on their box; rich regions on the caret, falling back
/// to the last child element or the region itself.
fn icon_anchor(doc: &Document, target: NodeId) -> Rect {
    if is_plain_field(doc, target) {
        return doc.rect(target);
    }
    if let Some(caret) = doc.caret_rect().filter(|rect| !rect.is_empty()) {
        return caret;
    }
    let fallback = doc.last_element_child(target).unwrap_or(target);
    doc.rect(fallback)
}
