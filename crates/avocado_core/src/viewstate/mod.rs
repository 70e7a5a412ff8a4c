//! Pages and animated page transitions
//!
//! A [`ViewState`] ("page") is a named camera plus element-arrangement
//! snapshot. The [`ViewStateManager`] drives the transition machine:
//! leaving a page snapshots every top-level element's transform and
//! visibility into it; entering a page jumps the camera and animates each
//! element whose stored transform differs from the live one, through a
//! temporary wrapper node inserted above the element. When the external
//! animation-finished notification arrives, every wrapper is baked into the
//! element's permanent transform and removed.
//!
//! A stored transform equal to the identity, or equal to the element's
//! current transform, is skipped entirely. An element added after a page
//! was snapshotted is therefore never moved by that page's restoration.

use crate::config::CoreConfig;
use crate::document::dispatch::{DispatchResult, ViewSink};
use crate::document::messages;
use crate::element::ElementMap;
use crate::foundation::ident::ElementId;
use crate::foundation::logging::{info, warn};
use crate::foundation::math::{invert_or_identity, Mat4, Mat4Ext};
use crate::lifecycle::LifecycleManager;
use crate::params::{ParamRecord, ParamValue};
use crate::scenegraph::{AnimationHandle, NodeHandle, SceneGraphService};

const TRANSFORM_EPSILON: f32 = 1e-5;

/// One page: a camera + element-arrangement snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Live view currently showing this page, `-1` when detached
    pub view_id: i32,
    /// Stored camera transform
    pub camera: Mat4,
    /// Background image path, empty for none
    pub background_image: String,
    /// HTML annotation shown with the page, empty for none
    pub html_annotation: String,
    /// Per-element transform overrides, in snapshot order
    pub element_locations: Vec<(ElementId, Mat4)>,
    /// Per-element visibility overrides, in snapshot order
    pub element_visibility: Vec<(ElementId, bool)>,
}

impl ViewState {
    /// Create an empty page attached to a view
    #[must_use]
    pub fn new(view_id: i32) -> Self {
        Self {
            view_id,
            camera: Mat4::identity(),
            background_image: String::new(),
            html_annotation: String::new(),
            element_locations: Vec::new(),
            element_visibility: Vec::new(),
        }
    }

    /// Replace the overrides with a snapshot of every top-level element's
    /// transform and visibility, in top-level order
    pub fn populate_from_elements(&mut self, elements: &ElementMap) {
        self.element_locations.clear();
        self.element_visibility.clear();
        for id in elements.top_level() {
            if let Some(element) = elements.get(*id) {
                self.element_locations.push((*id, element.transform));
                self.element_visibility.push((*id, element.visible));
            }
        }
    }

    /// Append this page's fields to a record under a key prefix
    pub fn write_into(&self, prefix: &str, record: &mut ParamRecord) {
        record.push(format!("{prefix}View"), ParamValue::Int(i64::from(self.view_id)));
        record.push(format!("{prefix}Camera"), ParamValue::Matrix(self.camera));
        record.push(
            format!("{prefix}Bg"),
            ParamValue::Str(self.background_image.clone()),
        );
        record.push(
            format!("{prefix}Html"),
            ParamValue::Str(self.html_annotation.clone()),
        );
        record.push(
            format!("{prefix}LocCount"),
            ParamValue::Int(self.element_locations.len() as i64),
        );
        for (idx, (id, transform)) in self.element_locations.iter().enumerate() {
            record.push(
                format!("{prefix}Loc{idx}Id"),
                ParamValue::Int(i64::from(id.raw())),
            );
            record.push(format!("{prefix}Loc{idx}T"), ParamValue::Matrix(*transform));
        }
        record.push(
            format!("{prefix}VisCount"),
            ParamValue::Int(self.element_visibility.len() as i64),
        );
        for (idx, (id, visible)) in self.element_visibility.iter().enumerate() {
            record.push(
                format!("{prefix}Vis{idx}Id"),
                ParamValue::Int(i64::from(id.raw())),
            );
            record.push(format!("{prefix}Vis{idx}V"), ParamValue::Bool(*visible));
        }
    }

    /// Rebuild a page from prefixed record fields. Missing fields fall
    /// back to the empty page, matching the lenient load policy.
    #[must_use]
    pub fn read_from(record: &ParamRecord, prefix: &str) -> Self {
        let mut page = Self::new(
            record
                .int_of(&format!("{prefix}View"))
                .map_or(-1, |raw| raw as i32),
        );
        if let Some(camera) = record.matrix_of(&format!("{prefix}Camera")) {
            page.camera = *camera;
        }
        page.background_image = record
            .str_of(&format!("{prefix}Bg"))
            .unwrap_or_default()
            .to_string();
        page.html_annotation = record
            .str_of(&format!("{prefix}Html"))
            .unwrap_or_default()
            .to_string();

        let loc_count = record
            .int_of(&format!("{prefix}LocCount"))
            .unwrap_or(0)
            .max(0) as usize;
        for idx in 0..loc_count {
            let id = record
                .int_of(&format!("{prefix}Loc{idx}Id"))
                .and_then(ElementId::from_wire);
            let transform = record.matrix_of(&format!("{prefix}Loc{idx}T"));
            if let (Some(id), Some(transform)) = (id, transform) {
                page.element_locations.push((id, *transform));
            }
        }
        let vis_count = record
            .int_of(&format!("{prefix}VisCount"))
            .unwrap_or(0)
            .max(0) as usize;
        for idx in 0..vis_count {
            let id = record
                .int_of(&format!("{prefix}Vis{idx}Id"))
                .and_then(ElementId::from_wire);
            let visible = record.bool_of(&format!("{prefix}Vis{idx}V"));
            if let (Some(id), Some(visible)) = (id, visible) {
                page.element_visibility.push((id, visible));
            }
        }
        page
    }
}

/// One element being animated onto its page
#[derive(Debug)]
struct PendingBake {
    element: ElementId,
    /// The element's own node, temporarily under `wrapper`
    node: NodeHandle,
    wrapper: NodeHandle,
    /// Parent to give the node back once the wrapper is removed
    restore_parent: Option<NodeHandle>,
    /// The wrapper's transition; the bake waits for this to finish
    animation: AnimationHandle,
    /// Attachments hidden for the transition, with their nodes
    attachments: Vec<(ElementId, NodeHandle)>,
}

/// Drives page snapshots, restoration and transition animations
#[derive(Debug, Default)]
pub struct ViewStateManager {
    current: usize,
    wait_list: Vec<AnimationHandle>,
    pending: Vec<PendingBake>,
}

impl ViewStateManager {
    /// Create a manager sitting on page 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the current page
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current
    }

    /// Whether a transition is still animating. New transitions are
    /// blocked until the wait list drains.
    #[must_use]
    pub fn transition_active(&self) -> bool {
        !self.wait_list.is_empty()
    }

    /// Back to page 0 with no in-flight work (new/close document)
    pub fn reset(&mut self) {
        self.current = 0;
        self.wait_list.clear();
        self.pending.clear();
    }

    fn camera_of(views: &[Box<dyn ViewSink>], view_id: i32) -> Mat4 {
        views
            .iter()
            .find(|view| view.view_id() == view_id)
            .map_or_else(
                || {
                    warn!("no attached view with id {view_id}");
                    Mat4::identity()
                },
                |view| view.camera(),
            )
    }

    /// Snapshot the page being left: camera from the active view, element
    /// overrides from the live elements, detached from its view
    fn snapshot_current(
        &mut self,
        pages: &mut [ViewState],
        elements: &ElementMap,
        views: &[Box<dyn ViewSink>],
        view_id: i32,
    ) {
        if let Some(page) = pages.get_mut(self.current) {
            page.camera = Self::camera_of(views, view_id);
            page.populate_from_elements(elements);
            page.view_id = -1;
        }
    }

    /// Snapshot the current page and open a fresh one after it
    pub fn new_page(
        &mut self,
        pages: &mut Vec<ViewState>,
        elements: &ElementMap,
        views: &[Box<dyn ViewSink>],
        view_id: i32,
    ) -> DispatchResult {
        if self.transition_active() {
            warn!("page transition still animating, NewPage ignored");
            return DispatchResult::empty();
        }
        self.snapshot_current(pages, elements, views, view_id);
        let mut page = ViewState::new(view_id);
        page.camera = Self::camera_of(views, view_id);
        pages.push(page);
        self.current = pages.len() - 1;
        DispatchResult::handled()
    }

    /// Leave the current page and restore `target`
    pub fn go_to_page(
        &mut self,
        pages: &mut [ViewState],
        elements: &mut ElementMap,
        lifecycle: &LifecycleManager,
        graph: &mut dyn SceneGraphService,
        views: &mut [Box<dyn ViewSink>],
        config: &CoreConfig,
        view_id: i32,
        target: usize,
    ) -> DispatchResult {
        if self.transition_active() {
            warn!("page transition still animating, GoToPage ignored");
            return DispatchResult::empty();
        }
        if target >= pages.len() {
            warn!("no page {target}");
            return DispatchResult::empty();
        }

        self.snapshot_current(pages, elements, views, view_id);
        self.current = target;
        pages[target].view_id = view_id;

        // Camera jumps are direct, not animated.
        let camera_payload = ParamRecord::new()
            .with("view", ParamValue::Int(i64::from(view_id)))
            .with("camera", ParamValue::Matrix(pages[target].camera));
        if let Some(view) = views.iter_mut().find(|view| view.view_id() == view_id) {
            view.handle(messages::MOVE_TO_CAMERA, &camera_payload);
        }

        for (id, visible) in pages[target].element_visibility.clone() {
            let Some(element) = elements.get_mut(id) else {
                warn!("page names unknown element {}", id.raw());
                continue;
            };
            element.visible = visible;
            if let Some(outer) = lifecycle.outer_node(id) {
                graph.set_visible(outer, visible);
            }
        }

        for (id, stored) in pages[target].element_locations.clone() {
            if !elements.contains(id) {
                warn!("page names unknown element {}", id.raw());
                continue;
            }
            let Some(node) = lifecycle.outer_node(id) else {
                continue;
            };
            if stored.approx_eq(&Mat4::identity(), TRANSFORM_EPSILON) {
                continue;
            }
            let live = graph.local_transform(node);
            if stored.approx_eq(&live, TRANSFORM_EPSILON) {
                continue;
            }

            let restore_parent = graph.parent(node);
            let wrapper = graph.create_empty_node();
            graph.set_parent(wrapper, restore_parent);
            graph.set_parent(node, Some(wrapper));

            let delta = stored * invert_or_identity(&live);
            let animation =
                graph.begin_transition(wrapper, delta, config.transition_duration_secs);
            self.wait_list.push(animation);

            let mut hidden = Vec::new();
            if let Some(element) = elements.get(id) {
                for attachment in &element.attachments {
                    if let Some(att_node) = lifecycle.outer_node(*attachment) {
                        graph.set_visible(att_node, false);
                        hidden.push((*attachment, att_node));
                    }
                }
            }
            self.pending.push(PendingBake {
                element: id,
                node,
                wrapper,
                restore_parent,
                animation,
                attachments: hidden,
            });
        }

        DispatchResult::handled_repaint()
    }

    /// Restore the page after the current one
    pub fn next_page(
        &mut self,
        pages: &mut [ViewState],
        elements: &mut ElementMap,
        lifecycle: &LifecycleManager,
        graph: &mut dyn SceneGraphService,
        views: &mut [Box<dyn ViewSink>],
        config: &CoreConfig,
        view_id: i32,
    ) -> DispatchResult {
        let target = self.current + 1;
        self.go_to_page(pages, elements, lifecycle, graph, views, config, view_id, target)
    }

    /// Restore the page before the current one
    pub fn back_page(
        &mut self,
        pages: &mut [ViewState],
        elements: &mut ElementMap,
        lifecycle: &LifecycleManager,
        graph: &mut dyn SceneGraphService,
        views: &mut [Box<dyn ViewSink>],
        config: &CoreConfig,
        view_id: i32,
    ) -> DispatchResult {
        let Some(target) = self.current.checked_sub(1) else {
            warn!("already on the first page");
            return DispatchResult::empty();
        };
        self.go_to_page(pages, elements, lifecycle, graph, views, config, view_id, target)
    }

    /// External notification that transition animations completed.
    ///
    /// Only the animations the scene graph reports finished are settled:
    /// their wrappers are baked into the element's permanent transform and
    /// removed, and their attachments are re-shown and told to re-anchor
    /// through the views. Wrappers whose animations are still in flight
    /// stay pending, so a premature notification never bakes a mid-flight
    /// transform. Draining an empty wait list is a no-op.
    pub fn animation_finished(
        &mut self,
        elements: &mut ElementMap,
        graph: &mut dyn SceneGraphService,
        views: &mut [Box<dyn ViewSink>],
    ) -> DispatchResult {
        if self.wait_list.is_empty() {
            return DispatchResult::handled();
        }
        let finished = graph.drain_finished();
        if finished.is_empty() {
            info!("animation-finished notification with nothing finished yet");
            return DispatchResult::handled();
        }
        self.wait_list
            .retain(|animation| !finished.contains(animation));

        let mut still_pending = Vec::new();
        for bake in self.pending.drain(..) {
            if !finished.contains(&bake.animation) {
                still_pending.push(bake);
                continue;
            }
            let delta = graph.local_transform(bake.wrapper);
            let baked = delta * graph.local_transform(bake.node);
            graph.set_parent(bake.node, bake.restore_parent);
            graph.set_local_transform(bake.node, baked);
            graph.remove_subtree(bake.wrapper);

            if let Some(element) = elements.get_mut(bake.element) {
                element.transform = baked;
            }
            // Attachments re-anchor only after their element has baked.
            for (attachment, node) in bake.attachments {
                let visible = elements.get(attachment).map_or(true, |att| att.visible);
                graph.set_visible(node, visible);
                let payload = ParamRecord::new()
                    .with("id", ParamValue::Handle(attachment))
                    .with("element", ParamValue::Handle(bake.element));
                for view in views.iter_mut() {
                    view.handle(messages::ATTACHMENT_MOVED, &payload);
                }
            }
        }
        self.pending = still_pending;
        DispatchResult::handled_repaint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::SceneElement;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_populate_follows_top_level_order() {
        let mut elements = ElementMap::new();
        let mut first = SceneElement::new(ElementId::from_raw(0), "a", "m");
        first.transform = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        elements.insert(first);
        let mut second = SceneElement::new(ElementId::from_raw(1), "b", "m");
        second.visible = false;
        elements.insert(second);

        let mut page = ViewState::new(0);
        page.populate_from_elements(&elements);
        assert_eq!(page.element_locations.len(), 2);
        assert_eq!(page.element_locations[0].0, ElementId::from_raw(0));
        assert_eq!(page.element_visibility[1], (ElementId::from_raw(1), false));
    }

    #[test]
    fn test_page_record_round_trip() {
        let mut page = ViewState::new(3);
        page.camera = Mat4::from_translation(Vec3::new(0.0, 5.0, 10.0));
        page.background_image = "bg.png".into();
        page.html_annotation = "<b>note</b>".into();
        page.element_locations.push((
            ElementId::from_raw(4),
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
        ));
        page.element_visibility.push((ElementId::from_raw(4), true));

        let mut record = ParamRecord::new();
        page.write_into("p0", &mut record);
        let rebuilt = ViewState::read_from(&record, "p0");
        assert_eq!(rebuilt, page);
    }

    #[test]
    fn test_finished_notification_with_empty_wait_list_is_a_noop() {
        let mut manager = ViewStateManager::new();
        let mut elements = ElementMap::new();
        let mut graph = crate::scenegraph::local::LocalSceneGraph::new();
        let mut views: Vec<Box<dyn ViewSink>> = Vec::new();
        let result = manager.animation_finished(&mut elements, &mut graph, &mut views);
        assert!(result.is_handled());
        assert!(!result.needs_repaint());
    }

    #[test]
    fn test_each_element_bakes_only_when_its_animation_finishes() {
        use crate::config::CoreConfig;
        use crate::document::dispatch::{HeadlessView, ModuleContext};
        use crate::foundation::ident::IdGenerator;
        use crate::lifecycle::LifecycleManager;
        use crate::material::CachingCompiler;
        use crate::scenegraph::local::LocalSceneGraph;

        let mut graph = LocalSceneGraph::new();
        let mut elements = ElementMap::new();
        let mut ids = IdGenerator::new();
        let mut compiler = CachingCompiler::new();
        let config = CoreConfig::default();
        let mut lifecycle = LifecycleManager::new("m");
        let mut views: Vec<Box<dyn ViewSink>> = vec![Box::new(HeadlessView::new(0))];

        let (first, second);
        {
            let mut ctx = ModuleContext {
                elements: &mut elements,
                ids: &mut ids,
                graph: &mut graph,
                compiler: &mut compiler,
                config: &config,
            };
            first = lifecycle.create_file_element(&mut ctx, "a.model", Vec::new());
            second = lifecycle.create_file_element(&mut ctx, "b.model", Vec::new());
        }
        let stored = [
            (first, Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0))),
            (second, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
        ];
        let mut page = ViewState::new(0);
        for (id, transform) in stored {
            page.element_locations.push((id, transform));
        }
        let mut pages = vec![ViewState::new(0), page];
        for (offset, (id, _)) in stored.iter().enumerate() {
            let live = Mat4::from_translation(Vec3::new(5.0, 5.0, offset as f32));
            elements.get_mut(*id).unwrap().transform = live;
            graph.set_local_transform(lifecycle.outer_node(*id).unwrap(), live);
        }

        let mut manager = ViewStateManager::new();
        let result = manager.go_to_page(
            &mut pages,
            &mut elements,
            &lifecycle,
            &mut graph,
            &mut views,
            &config,
            0,
            1,
        );
        assert!(result.is_handled());
        assert!(manager.transition_active());

        let at_stored = |elements: &ElementMap| {
            stored
                .iter()
                .filter(|(id, transform)| {
                    elements.get(*id).unwrap().transform.approx_eq(transform, 1e-4)
                })
                .count()
        };

        // First animation completes; only that element bakes.
        graph.complete_next_transition().unwrap();
        let result = manager.animation_finished(&mut elements, &mut graph, &mut views);
        assert!(result.needs_repaint());
        assert!(manager.transition_active());
        assert_eq!(at_stored(&elements), 1);

        // Second animation completes; the transition settles.
        graph.complete_next_transition().unwrap();
        let result = manager.animation_finished(&mut elements, &mut graph, &mut views);
        assert!(result.needs_repaint());
        assert!(!manager.transition_active());
        assert_eq!(at_stored(&elements), 2);
    }
}
