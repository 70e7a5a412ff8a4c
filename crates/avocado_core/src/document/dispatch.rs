//! Message dispatch plumbing
//!
//! Commands are plain strings with a [`ParamRecord`] payload. Resolution
//! order is fixed: the document's own built-in handlers run first, then each
//! registered module in registration order (first one to report handled
//! wins), and anything still unhandled is broadcast to every attached view.
//! A few commands (`SetDocParam`) are handled by the document and still
//! forwarded to modules afterwards, which is why the order matters and why
//! handler outcomes are flags rather than early returns.

use bitflags::bitflags;

use crate::config::CoreConfig;
use crate::element::ElementMap;
use crate::foundation::ident::IdGenerator;
use crate::foundation::logging::warn;
use crate::foundation::math::Mat4;
use crate::material::MaterialCompiler;
use crate::params::ParamRecord;
use crate::scenegraph::SceneGraphService;

use super::Document;

bitflags! {
    /// Outcome of one dispatch step
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DispatchResult: u8 {
        /// Some handler consumed the command
        const HANDLED = 0b01;
        /// Scene content changed; the UI should redraw
        const NEED_REPAINT = 0b10;
    }
}

impl DispatchResult {
    /// Command consumed, nothing visible changed
    #[must_use]
    pub const fn handled() -> Self {
        Self::HANDLED
    }

    /// Command consumed and the scene needs redrawing
    #[must_use]
    pub const fn handled_repaint() -> Self {
        Self::HANDLED.union(Self::NEED_REPAINT)
    }

    /// Whether any handler consumed the command
    #[must_use]
    pub const fn is_handled(self) -> bool {
        self.contains(Self::HANDLED)
    }

    /// Whether the scene needs redrawing
    #[must_use]
    pub const fn needs_repaint(self) -> bool {
        self.contains(Self::NEED_REPAINT)
    }
}

/// Mutable document state handed to module handlers
///
/// Modules never touch the document struct directly; they get the element
/// index, the id generator and the collaborator seams, nothing else.
pub struct ModuleContext<'a> {
    /// The document's element index
    pub elements: &'a mut ElementMap,
    /// The document's id generator
    pub ids: &'a mut IdGenerator,
    /// Spatial backend
    pub graph: &'a mut dyn SceneGraphService,
    /// Material subsystem
    pub compiler: &'a mut dyn MaterialCompiler,
    /// Core tunables
    pub config: &'a CoreConfig,
}

/// A pluggable command handler registered with a document
pub trait DocumentModule {
    /// Registration name, also recorded as `owner_module` on elements the
    /// module creates
    fn name(&self) -> &str;

    /// Handle one command. Return [`DispatchResult::empty`] to let the next
    /// handler in the chain see it.
    fn handle(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        command: &str,
        payload: &ParamRecord,
    ) -> DispatchResult;
}

/// One attached view, the last stop of the dispatch chain
pub trait ViewSink {
    /// Stable id of the view
    fn view_id(&self) -> i32;

    /// Camera transform the view is currently showing
    fn camera(&self) -> Mat4;

    /// Handle a broadcast or view-bound command
    fn handle(&mut self, command: &str, payload: &ParamRecord) -> DispatchResult;
}

/// A view sink with no UI behind it
///
/// Applies `MoveToCamera` to its stored camera and keeps a log of every
/// command it received, which is all a headless driver or a test needs.
#[derive(Debug)]
pub struct HeadlessView {
    id: i32,
    camera: Mat4,
    received: Vec<(String, String)>,
}

impl HeadlessView {
    /// Create a view with an identity camera
    #[must_use]
    pub fn new(id: i32) -> Self {
        Self {
            id,
            camera: Mat4::identity(),
            received: Vec::new(),
        }
    }

    /// Point the camera somewhere
    pub fn set_camera(&mut self, camera: Mat4) {
        self.camera = camera;
    }

    /// Commands received so far, as `(name, serialized payload)` pairs
    #[must_use]
    pub fn received(&self) -> &[(String, String)] {
        &self.received
    }
}

impl ViewSink for HeadlessView {
    fn view_id(&self) -> i32 {
        self.id
    }

    fn camera(&self) -> Mat4 {
        self.camera
    }

    fn handle(&mut self, command: &str, payload: &ParamRecord) -> DispatchResult {
        self.received.push((command.to_string(), payload.to_line()));
        if command == super::messages::MOVE_TO_CAMERA {
            if let Some(camera) = payload.matrix_of("camera") {
                self.camera = *camera;
            }
            return DispatchResult::handled_repaint();
        }
        DispatchResult::empty()
    }
}

/// Routes commands to documents by id
#[derive(Default)]
pub struct Dispatcher {
    documents: Vec<(i32, Document)>,
}

impl Dispatcher {
    /// Create a dispatcher with no documents
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under an id. A duplicate id replaces the old
    /// document.
    pub fn register_document(&mut self, id: i32, document: Document) {
        if let Some(slot) = self.documents.iter_mut().find(|(doc_id, _)| *doc_id == id) {
            warn!("replacing document {id}");
            slot.1 = document;
        } else {
            self.documents.push((id, document));
        }
    }

    /// Look up a registered document
    #[must_use]
    pub fn document(&self, id: i32) -> Option<&Document> {
        self.documents
            .iter()
            .find(|(doc_id, _)| *doc_id == id)
            .map(|(_, doc)| doc)
    }

    /// Look up a registered document mutably
    pub fn document_mut(&mut self, id: i32) -> Option<&mut Document> {
        self.documents
            .iter_mut()
            .find(|(doc_id, _)| *doc_id == id)
            .map(|(_, doc)| doc)
    }

    /// Route one command to the target document
    pub fn dispatch(
        &mut self,
        command: &str,
        target_doc: i32,
        payload: &ParamRecord,
    ) -> DispatchResult {
        let Some(document) = self.document_mut(target_doc) else {
            warn!("dispatch of {command:?} to unknown document {target_doc}");
            return DispatchResult::empty();
        };
        document.dispatch(command, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_flags() {
        assert!(!DispatchResult::empty().is_handled());
        assert!(DispatchResult::handled().is_handled());
        assert!(!DispatchResult::handled().needs_repaint());
        assert!(DispatchResult::handled_repaint().needs_repaint());

        let merged = DispatchResult::handled() | DispatchResult::NEED_REPAINT;
        assert_eq!(merged, DispatchResult::handled_repaint());
    }

    #[test]
    fn test_headless_view_tracks_camera() {
        use crate::foundation::math::{Mat4Ext, Vec3};
        use crate::params::ParamValue;

        let mut view = HeadlessView::new(0);
        let camera = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let payload = ParamRecord::new().with("camera", ParamValue::Matrix(camera));

        let result = view.handle(super::super::messages::MOVE_TO_CAMERA, &payload);
        assert!(result.is_handled());
        assert!(view.camera().approx_eq(&camera, 1e-6));
        assert_eq!(view.received().len(), 1);
    }

    #[test]
    fn test_dispatch_to_unknown_document_is_a_noop() {
        let mut dispatcher = Dispatcher::new();
        let result = dispatcher.dispatch("NewPage", 9, &ParamRecord::new());
        assert!(!result.is_handled());
    }
}
