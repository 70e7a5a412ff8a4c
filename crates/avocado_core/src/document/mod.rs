//! The document: element collection, pages, material states, dispatch
//!
//! A [`Document`] owns everything with document lifetime: the element
//! index, the id generator, the page list, material-state snapshots,
//! document parameters, the collaborator seams (scene graph and material
//! compiler), the element lifecycle manager, and the attached modules and
//! views. All mutation flows through [`Document::dispatch`].

pub mod dispatch;
pub mod io;
pub mod messages;

use crate::config::CoreConfig;
use crate::element::ElementMap;
use crate::foundation::ident::{ElementId, IdGenerator};
use crate::foundation::logging::warn;
use crate::foundation::math::Mat4;
use crate::lifecycle::LifecycleManager;
use crate::material::{MaterialCompiler, MaterialDescriptor, MaterialState, MATERIAL_CUSTOM};
use crate::params::ParamRecord;
use crate::scenegraph::SceneGraphService;
use crate::viewstate::{ViewState, ViewStateManager};

use dispatch::{DispatchResult, DocumentModule, ModuleContext, ViewSink};

/// Module name the built-in lifecycle manager registers under
pub const FILE_ELEMENTS_MODULE: &str = "fileElements";

/// One open document
pub struct Document {
    elements: ElementMap,
    ids: IdGenerator,
    pages: Vec<ViewState>,
    material_states: Vec<MaterialState>,
    doc_params: Vec<(String, String)>,
    config: CoreConfig,
    graph: Box<dyn SceneGraphService>,
    compiler: Box<dyn MaterialCompiler>,
    lifecycle: LifecycleManager,
    view_mgr: ViewStateManager,
    modules: Vec<Box<dyn DocumentModule>>,
    views: Vec<Box<dyn ViewSink>>,
}

impl Document {
    /// Create an empty document over the given collaborators.
    /// Page 0 always exists.
    #[must_use]
    pub fn new(
        graph: Box<dyn SceneGraphService>,
        compiler: Box<dyn MaterialCompiler>,
        config: CoreConfig,
    ) -> Self {
        Self {
            elements: ElementMap::new(),
            ids: IdGenerator::new(),
            pages: vec![ViewState::new(0)],
            material_states: Vec::new(),
            doc_params: Vec::new(),
            config,
            graph,
            compiler,
            lifecycle: LifecycleManager::new(FILE_ELEMENTS_MODULE),
            view_mgr: ViewStateManager::new(),
            modules: Vec::new(),
            views: Vec::new(),
        }
    }

    /// Register a plugin module at the end of the dispatch chain
    pub fn register_module(&mut self, module: Box<dyn DocumentModule>) {
        self.modules.push(module);
    }

    /// Attach a view to the end of the broadcast list
    pub fn attach_view(&mut self, view: Box<dyn ViewSink>) {
        self.views.push(view);
    }

    /// The element index
    #[must_use]
    pub fn elements(&self) -> &ElementMap {
        &self.elements
    }

    /// The page list; index 0 always exists
    #[must_use]
    pub fn pages(&self) -> &[ViewState] {
        &self.pages
    }

    /// Index of the current page
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.view_mgr.current_page()
    }

    /// Named material-state snapshots
    #[must_use]
    pub fn material_states(&self) -> &[MaterialState] {
        &self.material_states
    }

    /// Look up a document parameter
    #[must_use]
    pub fn doc_param(&self, key: &str) -> Option<&str> {
        self.doc_params
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// The element lifecycle manager
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Element created by the most recent create or group operation
    #[must_use]
    pub fn last_created(&self) -> Option<ElementId> {
        self.lifecycle.last_created()
    }

    /// The scene graph collaborator
    #[must_use]
    pub fn graph(&self) -> &dyn SceneGraphService {
        self.graph.as_ref()
    }

    /// The scene graph collaborator, mutably (driver layer: ticking and
    /// completing animations)
    pub fn graph_mut(&mut self) -> &mut dyn SceneGraphService {
        self.graph.as_mut()
    }

    /// An attached view
    #[must_use]
    pub fn view(&self, view_id: i32) -> Option<&dyn ViewSink> {
        self.views
            .iter()
            .find(|view| view.view_id() == view_id)
            .map(AsRef::as_ref)
    }

    /// Replace an element's transform, keeping its scene node in sync.
    /// This is the entry point for interactive manipulators, which do not
    /// go through the message surface.
    pub fn set_element_transform(&mut self, id: ElementId, transform: Mat4) -> bool {
        let Some(element) = self.elements.get_mut(id) else {
            warn!("transform change on unknown element {}", id.raw());
            return false;
        };
        element.transform = transform;
        if let Some(node) = self.lifecycle.outer_node(id) {
            self.graph.set_local_transform(node, transform);
        }
        true
    }

    /// Reset to a pristine empty document: elements, pages, material
    /// states, parameters, caches and the id counter all cleared
    pub fn new_document(&mut self) {
        self.elements.clear();
        self.ids.reset(0);
        self.pages = vec![ViewState::new(0)];
        self.material_states.clear();
        self.doc_params.clear();
        self.graph.clear();
        self.compiler.clear();
        self.lifecycle.clear();
        self.view_mgr.reset();
    }

    /// Route one command through the fixed chain: document built-ins,
    /// then modules in registration order, then broadcast to views
    pub fn dispatch(&mut self, command: &str, payload: &ParamRecord) -> DispatchResult {
        let (builtin, forward) = self.handle_builtin(command, payload);
        if builtin.is_handled() && !forward {
            return builtin;
        }

        let mut ctx = ModuleContext {
            elements: &mut self.elements,
            ids: &mut self.ids,
            graph: self.graph.as_mut(),
            compiler: self.compiler.as_mut(),
            config: &self.config,
        };
        let from_lifecycle = self.lifecycle.handle(&mut ctx, command, payload);
        if from_lifecycle.is_handled() {
            return builtin | from_lifecycle;
        }
        for module in &mut self.modules {
            let result = module.handle(&mut ctx, command, payload);
            if result.is_handled() {
                return builtin | result;
            }
        }

        if builtin.is_handled() {
            return builtin;
        }
        let mut broadcast = DispatchResult::empty();
        for view in &mut self.views {
            broadcast |= view.handle(command, payload);
        }
        broadcast
    }

    /// Built-in handlers. The bool asks dispatch to keep forwarding to
    /// modules even though the command was handled here.
    fn handle_builtin(&mut self, command: &str, payload: &ParamRecord) -> (DispatchResult, bool) {
        match command {
            messages::SET_DOC_PARAM => {
                let (Some(key), Some(value)) = (payload.str_of("key"), payload.str_of("value"))
                else {
                    warn!("{command} needs key and value");
                    return (DispatchResult::empty(), false);
                };
                if let Some(slot) = self
                    .doc_params
                    .iter_mut()
                    .find(|(existing, _)| existing == key)
                {
                    slot.1 = value.to_string();
                } else {
                    self.doc_params.push((key.to_string(), value.to_string()));
                }
                // Modules get to see the new parameter too.
                (DispatchResult::handled(), true)
            }
            messages::RENAME_ELEMENT => (self.rename_element(payload), false),
            messages::REGISTER_ATTACHMENT => (self.register_attachment(payload), false),
            messages::SAVE_MATERIAL_STATE => (self.save_material_state(payload), false),
            messages::SWITCH_TO_MATERIAL_STATE => (self.switch_to_material_state(payload), false),
            messages::NEW_PAGE => {
                let view_id = view_arg(payload);
                let Self {
                    view_mgr,
                    pages,
                    elements,
                    views,
                    ..
                } = self;
                (view_mgr.new_page(pages, elements, views, view_id), false)
            }
            messages::GO_TO_PAGE => {
                let view_id = view_arg(payload);
                let Some(target) = payload.int_of("page").and_then(|raw| usize::try_from(raw).ok())
                else {
                    warn!("{command} needs a page index");
                    return (DispatchResult::empty(), false);
                };
                let Self {
                    view_mgr,
                    pages,
                    elements,
                    lifecycle,
                    graph,
                    views,
                    config,
                    ..
                } = self;
                (
                    view_mgr.go_to_page(
                        pages,
                        elements,
                        lifecycle,
                        graph.as_mut(),
                        views,
                        config,
                        view_id,
                        target,
                    ),
                    false,
                )
            }
            messages::NEXT_PAGE => {
                let view_id = view_arg(payload);
                let Self {
                    view_mgr,
                    pages,
                    elements,
                    lifecycle,
                    graph,
                    views,
                    config,
                    ..
                } = self;
                (
                    view_mgr.next_page(
                        pages,
                        elements,
                        lifecycle,
                        graph.as_mut(),
                        views,
                        config,
                        view_id,
                    ),
                    false,
                )
            }
            messages::BACK_PAGE => {
                let view_id = view_arg(payload);
                let Self {
                    view_mgr,
                    pages,
                    elements,
                    lifecycle,
                    graph,
                    views,
                    config,
                    ..
                } = self;
                (
                    view_mgr.back_page(
                        pages,
                        elements,
                        lifecycle,
                        graph.as_mut(),
                        views,
                        config,
                        view_id,
                    ),
                    false,
                )
            }
            messages::ANIMATION_FINISHED => {
                let Self {
                    view_mgr,
                    elements,
                    graph,
                    views,
                    ..
                } = self;
                (
                    view_mgr.animation_finished(elements, graph.as_mut(), views),
                    false,
                )
            }
            _ => (DispatchResult::empty(), false),
        }
    }

    fn rename_element(&mut self, payload: &ParamRecord) -> DispatchResult {
        let Some(id) = element_arg(payload, "id") else {
            return DispatchResult::empty();
        };
        let Some(name) = payload.str_of("name") else {
            return DispatchResult::empty();
        };
        let Some(element) = self.elements.get_mut(id) else {
            warn!("rename of unknown element {}", id.raw());
            return DispatchResult::empty();
        };
        element.name = name.to_string();
        DispatchResult::handled()
    }

    fn register_attachment(&mut self, payload: &ParamRecord) -> DispatchResult {
        let (Some(target), Some(attachment)) = (
            element_arg(payload, "target"),
            element_arg(payload, "attachment"),
        ) else {
            return DispatchResult::empty();
        };
        if !self.elements.contains(attachment) {
            warn!("attachment {} does not exist", attachment.raw());
            return DispatchResult::empty();
        }
        let Some(element) = self.elements.get_mut(target) else {
            warn!("attachment target {} does not exist", target.raw());
            return DispatchResult::empty();
        };
        if !element.attachments.insert(attachment) {
            warn!(
                "attachment {} already registered on element {}",
                attachment.raw(),
                target.raw()
            );
        }
        DispatchResult::handled()
    }

    fn save_material_state(&mut self, payload: &ParamRecord) -> DispatchResult {
        let Some(name) = payload.str_of("name") else {
            warn!("SaveMaterialState needs a name");
            return DispatchResult::empty();
        };
        let mut entries = Vec::new();
        for id in self.elements.ids_sorted() {
            if let Some(element) = self.elements.get(id) {
                if !element.material_props.is_empty() {
                    entries.push((id, element.material_props.to_wire()));
                }
            }
        }
        let state = MaterialState {
            name: name.to_string(),
            entries,
        };
        if let Some(slot) = self
            .material_states
            .iter_mut()
            .find(|existing| existing.name == state.name)
        {
            *slot = state;
        } else {
            self.material_states.push(state);
        }
        DispatchResult::handled()
    }

    fn switch_to_material_state(&mut self, payload: &ParamRecord) -> DispatchResult {
        let Some(name) = payload.str_of("name") else {
            return DispatchResult::empty();
        };
        let Self {
            material_states,
            elements,
            lifecycle,
            graph,
            compiler,
            ..
        } = self;
        let Some(state) = material_states.iter().find(|state| state.name == name) else {
            warn!("no material state named {name:?}");
            return DispatchResult::empty();
        };
        let mut result = DispatchResult::handled();
        for (id, serialized) in &state.entries {
            let Some(element) = elements.get_mut(*id) else {
                warn!("material state names unknown element {}", id.raw());
                continue;
            };
            element.material_props = MaterialDescriptor::from_wire(serialized);
            element.material_id = MATERIAL_CUSTOM;
            if let Some(node) = lifecycle.outer_node(*id) {
                let stateset = compiler.compile_stateset(&element.material_props);
                graph.apply_stateset(node, stateset);
            }
            result |= DispatchResult::NEED_REPAINT;
        }
        result
    }
}

fn view_arg(payload: &ParamRecord) -> i32 {
    payload.int_of("view").map_or(0, |raw| raw as i32)
}

fn element_arg(payload: &ParamRecord, key: &str) -> Option<ElementId> {
    payload
        .handle_of(key)
        .or_else(|| payload.int_of(key).and_then(ElementId::from_wire))
}
