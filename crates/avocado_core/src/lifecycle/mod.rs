//! Element lifecycle manager
//!
//! The one component allowed to touch the scene graph on behalf of
//! elements: it creates file elements, extracts instances, groups and
//! splits, pushes materials, and cascades deletes. The rest of the system
//! addresses elements by id only; the node-handle bookkeeping lives in the
//! side tables here.
//!
//! Grouping preserves visual placement: the group's transform is the
//! translation to the selection's combined bounding center, and every
//! child's local matrix is premultiplied by the group's inverse, so world
//! transforms are unchanged. Split composes the group matrix back in.
//!
//! Unknown ids are warn-logged no-ops that report not-handled through the
//! dispatch result. Stale UI references must never bring the core down.

use std::collections::HashMap;

use crate::document::dispatch::{DispatchResult, DocumentModule, ModuleContext};
use crate::document::messages;
use crate::element::{GroupKind, SceneElement};
use crate::foundation::ident::ElementId;
use crate::foundation::logging::{debug, warn};
use crate::foundation::math::{invert_or_identity, Mat4, Mat4Ext, Vec3};
use crate::material::{MaterialDescriptor, MATERIAL_CUSTOM};
use crate::params::ParamRecord;
use crate::scenegraph::{NodeHandle, AABB};

/// Failed preconditions of lifecycle operations. The operation is abandoned
/// with no partial mutation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// A group was requested over an empty selection
    #[error("cannot group an empty selection")]
    EmptySelection,

    /// More than one existing group in a selection; the anchor is ambiguous
    #[error("more than one group in the selection")]
    AmbiguousAnchor,
}

/// Scene-graph nodes backing one element
#[derive(Debug, Clone, Copy)]
struct ElementNodes {
    /// Pivot-carrying transform node, the element's public handle
    outer: NodeHandle,
    /// Imported model root under `outer`; `None` for groups
    geometry: Option<NodeHandle>,
}

/// The document module that owns element create/group/split/instance/delete
pub struct LifecycleManager {
    name: String,
    nodes: HashMap<ElementId, ElementNodes>,
    /// Node-to-element side table, the back reference the scene graph
    /// itself never stores
    owners: HashMap<NodeHandle, ElementId>,
    /// Sub-drawable selected in the UI, consumed by `subGeometry=new`
    active_pick: Option<(ElementId, String)>,
    last_created: Option<ElementId>,
}

impl LifecycleManager {
    /// Create a manager registered under `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            owners: HashMap::new(),
            active_pick: None,
            last_created: None,
        }
    }

    /// Element created by the most recent create operation
    #[must_use]
    pub fn last_created(&self) -> Option<ElementId> {
        self.last_created
    }

    /// Public scene-graph node of an element
    #[must_use]
    pub fn outer_node(&self, id: ElementId) -> Option<NodeHandle> {
        self.nodes.get(&id).map(|nodes| nodes.outer)
    }

    /// Element owning a scene-graph node
    #[must_use]
    pub fn element_of_node(&self, node: NodeHandle) -> Option<ElementId> {
        self.owners.get(&node).copied()
    }

    /// Record the interactively picked sub-drawable of an element
    pub fn set_active_pick(&mut self, element: ElementId, sub_drawable: impl Into<String>) {
        self.active_pick = Some((element, sub_drawable.into()));
    }

    /// Drop all side-table state (new/close document)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.owners.clear();
        self.active_pick = None;
        self.last_created = None;
    }

    /// Wrap a geometry root in a pivot-carrying outer node so the element
    /// rotates and scales around its bounding center. Returns the outer
    /// node and the pivot.
    fn wrap_with_pivot(ctx: &mut ModuleContext<'_>, geometry: NodeHandle) -> (NodeHandle, Vec3) {
        let center = ctx.graph.subtree_bounds(geometry).center();
        let outer = ctx.graph.create_empty_node();
        ctx.graph.set_parent(geometry, Some(outer));
        ctx.graph
            .set_local_transform(geometry, Mat4::from_translation(-center));
        ctx.graph
            .set_local_transform(outer, Mat4::from_translation(center));
        (outer, center)
    }

    fn track(&mut self, id: ElementId, outer: NodeHandle, geometry: Option<NodeHandle>) {
        self.nodes.insert(id, ElementNodes { outer, geometry });
        self.owners.insert(outer, id);
    }

    /// Import a model and record it as a new file element
    pub fn create_file_element(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        path: &str,
        metadata: Vec<(String, String)>,
    ) -> ElementId {
        let geometry = ctx.graph.instantiate_model(path);
        let (outer, pivot) = Self::wrap_with_pivot(ctx, geometry);

        let id = ctx.ids.request();
        let mut element = SceneElement::new(id, path, self.name.clone());
        element.source_path = path.to_string();
        element.transform = Mat4::from_translation(pivot);
        element.last_saved_transform = element.transform;
        element.pivot_center = pivot;
        element.color = ctx.config.default_color;
        element.material_id = ctx.config.default_material_id;
        element.metadata = metadata;
        ctx.elements.insert(element);

        self.track(id, outer, Some(geometry));
        self.last_created = Some(id);
        debug!("created file element {} from {path:?}", id.raw());
        id
    }

    /// Extract one sub-drawable of `source` into a new reference element.
    ///
    /// `selector` is the sub-drawable name, or `"new"` to consume the
    /// active interactive pick. Returns `None` without mutating anything
    /// when no matching sub-drawable exists.
    pub fn create_instance(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        source: ElementId,
        selector: &str,
        metadata: Vec<(String, String)>,
    ) -> Option<ElementId> {
        let Some(source_element) = ctx.elements.get(source) else {
            warn!("instance request for unknown element {}", source.raw());
            return None;
        };
        if source_element.is_reference() {
            warn!(
                "element {} is itself a reference; instancing is one level deep",
                source.raw()
            );
            return None;
        }
        let Some(geometry) = self.nodes.get(&source).and_then(|n| n.geometry) else {
            warn!("element {} has no geometry to instance", source.raw());
            return None;
        };

        let part_name = if selector == "new" {
            match &self.active_pick {
                Some((picked, name)) if *picked == source => name.clone(),
                _ => {
                    warn!("no active sub-drawable pick on element {}", source.raw());
                    return None;
                }
            }
        } else {
            selector.to_string()
        };

        let Some(index) = ctx.graph.part_index(geometry, &part_name) else {
            warn!(
                "element {} has no sub-drawable {part_name:?}",
                source.raw()
            );
            return None;
        };
        let Ok(extracted) = ctx.graph.instantiate_part(geometry, index) else {
            warn!("could not instantiate sub-drawable {part_name:?}");
            return None;
        };
        if ctx.graph.remove_part(geometry, &part_name).is_err() {
            ctx.graph.remove_subtree(extracted);
            warn!("could not detach sub-drawable {part_name:?}");
            return None;
        }

        let (outer, pivot) = Self::wrap_with_pivot(ctx, extracted);

        let id = ctx.ids.request();
        let mut element = SceneElement::new(id, part_name.clone(), self.name.clone());
        element.referenced_element = Some(source);
        element.referenced_geometry = part_name.clone();
        element.referenced_drawable_index = index as i64;
        element.transform = Mat4::from_translation(pivot);
        element.last_saved_transform = element.transform;
        element.pivot_center = pivot;
        element.color = ctx.config.default_color;
        element.material_id = ctx.config.default_material_id;
        element.metadata = metadata;
        ctx.elements.insert(element);

        if let Some(source_element) = ctx.elements.get_mut(source) {
            if !source_element.removed_sub_nodes.contains(&part_name) {
                source_element.removed_sub_nodes.push(part_name);
            }
        }

        self.track(id, outer, Some(extracted));
        self.last_created = Some(id);
        Some(id)
    }

    /// Group a selection under one composite element, preserving every
    /// child's world transform.
    ///
    /// At most one existing group may appear in the selection; it becomes
    /// the anchor and absorbs the rest. With no anchor a fresh group
    /// element of `kind` is allocated at the selection's combined bounding
    /// center.
    pub fn group(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        selection: &[ElementId],
        kind: GroupKind,
    ) -> Result<ElementId, LifecycleError> {
        let mut members = Vec::new();
        for id in selection {
            match ctx.elements.get(*id) {
                Some(element) if element.parent_group.is_some() => {
                    warn!("element {} is already grouped, skipping", id.raw());
                }
                Some(_) => members.push(*id),
                None => warn!("group selection names unknown element {}", id.raw()),
            }
        }
        if members.is_empty() {
            return Err(LifecycleError::EmptySelection);
        }

        let anchors: Vec<ElementId> = members
            .iter()
            .copied()
            .filter(|id| ctx.elements.get(*id).is_some_and(SceneElement::is_group))
            .collect();
        if anchors.len() > 1 {
            return Err(LifecycleError::AmbiguousAnchor);
        }

        let (group_id, group_node) = if let Some(anchor) = anchors.first().copied() {
            let node = self.outer_node(anchor).unwrap_or_else(|| {
                // Self-heal a group that lost its node (partial load).
                warn!("group {} had no scene node", anchor.raw());
                let transform = ctx
                    .elements
                    .get(anchor)
                    .map_or_else(Mat4::identity, |element| element.transform);
                let node = ctx.graph.create_empty_node();
                ctx.graph.set_local_transform(node, transform);
                node
            });
            self.track(anchor, node, None);
            (anchor, node)
        } else {
            let bounds = members
                .iter()
                .filter_map(|id| self.outer_node(*id))
                .map(|node| ctx.graph.subtree_bounds(node))
                .reduce(|a, b| a.union(&b))
                .unwrap_or_else(|| AABB::new(Vec3::zeros(), Vec3::zeros()));
            let center = bounds.center();

            let node = ctx.graph.create_empty_node();
            ctx.graph
                .set_local_transform(node, Mat4::from_translation(center));

            let id = ctx.ids.request();
            let mut element = SceneElement::new(id, "group", self.name.clone());
            element.group = Some(kind);
            element.transform = Mat4::from_translation(center);
            element.last_saved_transform = element.transform;
            element.pivot_center = center;
            ctx.elements.insert(element);
            self.track(id, node, None);
            (id, node)
        };

        let group_inverse = invert_or_identity(&ctx.graph.local_transform(group_node));
        for id in members {
            if id == group_id {
                continue;
            }
            let Some(outer) = self.outer_node(id) else {
                continue;
            };
            let adjusted = group_inverse * ctx.graph.local_transform(outer);
            ctx.graph.set_parent(outer, Some(group_node));
            ctx.graph.set_local_transform(outer, adjusted);

            if let Some(element) = ctx.elements.get_mut(id) {
                element.transform = adjusted;
                element.parent_group = Some(group_id);
            }
            ctx.elements.demote(id);
            if let Some(group) = ctx.elements.get_mut(group_id) {
                group.children.push(id);
            }
        }
        self.last_created = Some(group_id);
        Ok(group_id)
    }

    /// Dissolve a group, returning children to the top level with their
    /// world transforms intact. The emptied group element stays live.
    pub fn split(&mut self, ctx: &mut ModuleContext<'_>, group_id: ElementId) -> bool {
        let Some(group) = ctx.elements.get(group_id) else {
            warn!("split of unknown element {}", group_id.raw());
            return false;
        };
        let Some(kind) = group.group else {
            warn!("split of non-group element {}", group_id.raw());
            return false;
        };
        let Some(group_node) = self.outer_node(group_id) else {
            warn!("group {} has no scene node", group_id.raw());
            return false;
        };

        let group_material = group.material_id;
        let group_color = group.color;
        let group_props = group.material_props.clone();
        let children = group.children.clone();
        let group_matrix = ctx.graph.local_transform(group_node);

        for child in children {
            let Some(outer) = self.outer_node(child) else {
                warn!("grouped element {} has no scene node", child.raw());
                continue;
            };
            let restored = group_matrix * ctx.graph.local_transform(outer);
            ctx.graph.set_parent(outer, None);
            ctx.graph.set_local_transform(outer, restored);

            let Some(element) = ctx.elements.get_mut(child) else {
                continue;
            };
            element.transform = restored;
            element.parent_group = None;
            if kind == GroupKind::Weld || element.inherit_material {
                element.material_id = group_material;
                element.color = group_color;
                element.material_props = group_props.clone();
                element.inherit_material = false;
                let stateset = ctx.compiler.compile_stateset(&stateset_descriptor(element));
                ctx.graph.apply_stateset(outer, stateset);
            }
            ctx.elements.promote(child);
        }

        if let Some(group) = ctx.elements.get_mut(group_id) {
            group.children.clear();
        }
        true
    }

    /// Assign a library material, recursing into group children.
    ///
    /// A child that already overrides its group's material is left alone
    /// unless `overwrite` is set.
    pub fn set_material(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        material_id: i64,
        overwrite: bool,
    ) -> bool {
        self.apply_material_edit(ctx, id, overwrite, true, &|element| {
            element.material_id = material_id;
        })
    }

    /// Set the flat display color, recursing like [`set_material`](Self::set_material)
    pub fn set_color(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        color: (u8, u8, u8),
        overwrite: bool,
    ) -> bool {
        self.apply_material_edit(ctx, id, overwrite, true, &|element| {
            element.color = color;
        })
    }

    /// Set one custom material property, recursing like
    /// [`set_material`](Self::set_material). Switches the element to the
    /// custom-material sentinel.
    pub fn set_material_property(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        key: &str,
        value: &str,
        overwrite: bool,
    ) -> bool {
        let key = key.to_string();
        let value = value.to_string();
        self.apply_material_edit(ctx, id, overwrite, true, &move |element| {
            element.material_props.set(key.clone(), value.clone());
            element.material_id = MATERIAL_CUSTOM;
        })
    }

    fn apply_material_edit(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        overwrite: bool,
        is_root: bool,
        edit: &dyn Fn(&mut SceneElement),
    ) -> bool {
        let Some(element) = ctx.elements.get_mut(id) else {
            warn!("material edit on unknown element {}", id.raw());
            return false;
        };
        if !is_root && !element.inherit_material && !overwrite {
            return false;
        }
        edit(element);
        element.inherit_material = !is_root;
        let descriptor = stateset_descriptor(element);
        let children = element.children.clone();

        if let Some(outer) = self.outer_node(id) {
            let stateset = ctx.compiler.compile_stateset(&descriptor);
            ctx.graph.apply_stateset(outer, stateset);
        }
        for child in children {
            self.apply_material_edit(ctx, child, overwrite, false, edit);
        }
        true
    }

    /// Show or hide an element. Returns whether anything changed, or
    /// `None` for an unknown id.
    pub fn set_visibility(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        visible: bool,
    ) -> Option<bool> {
        let Some(element) = ctx.elements.get_mut(id) else {
            warn!("visibility change on unknown element {}", id.raw());
            return None;
        };
        if element.visible == visible {
            return Some(false);
        }
        element.visible = visible;
        if let Some(outer) = self.outer_node(id) {
            ctx.graph.set_visible(outer, visible);
        }
        Some(true)
    }

    /// Show or hide an element in a single view, leaving the others
    /// untouched. Returns whether anything changed, or `None` for an
    /// unknown id.
    pub fn set_view_visibility(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
        view: i32,
        visible: bool,
    ) -> Option<bool> {
        let Some(element) = ctx.elements.get_mut(id) else {
            warn!("per-view visibility change on unknown element {}", id.raw());
            return None;
        };
        let changed = if visible {
            element.hidden_in_views.remove(&view)
        } else {
            element.hidden_in_views.insert(view)
        };
        if !changed {
            return Some(false);
        }
        if let Some(outer) = self.outer_node(id) {
            ctx.graph.set_hidden_in_view(outer, view, !visible);
        }
        Some(true)
    }

    /// Delete an element with full cascade: references into it first, then
    /// its group children, then the element itself.
    pub fn delete_element_and_children(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        id: ElementId,
    ) -> bool {
        if !ctx.elements.contains(id) {
            warn!("delete of unknown element {}", id.raw());
            return false;
        }

        let references: Vec<ElementId> = ctx
            .elements
            .iter()
            .filter(|element| element.referenced_element == Some(id))
            .map(|element| element.id)
            .collect();
        for reference in references {
            self.delete_element_and_children(ctx, reference);
        }

        let children = ctx
            .elements
            .get(id)
            .map(|element| element.children.clone())
            .unwrap_or_default();
        for child in children {
            self.delete_element_and_children(ctx, child);
        }

        let Some(element) = ctx.elements.remove(id) else {
            return false;
        };
        // A deleted reference leaves its sub-geometry permanently removed
        // from the still-live source.
        if let Some(source) = element.referenced_element {
            if let Some(source_element) = ctx.elements.get_mut(source) {
                if !source_element
                    .removed_sub_nodes
                    .contains(&element.referenced_geometry)
                {
                    source_element
                        .removed_sub_nodes
                        .push(element.referenced_geometry.clone());
                }
            }
        }
        if let Some(parent) = element.parent_group {
            if let Some(parent_element) = ctx.elements.get_mut(parent) {
                parent_element.children.retain(|child| *child != id);
            }
        }
        if let Some(nodes) = self.nodes.remove(&id) {
            self.owners.remove(&nodes.outer);
            ctx.graph.remove_subtree(nodes.outer);
        }
        debug!("deleted element {}", id.raw());
        true
    }

    /// Snap every element back to its last saved transform
    pub fn restore_default_transforms(&mut self, ctx: &mut ModuleContext<'_>) -> bool {
        let mut changed = false;
        for id in ctx.elements.ids_sorted() {
            let Some(element) = ctx.elements.get_mut(id) else {
                continue;
            };
            if element.transform.approx_eq(&element.last_saved_transform, 1e-6) {
                continue;
            }
            element.transform = element.last_saved_transform;
            let transform = element.transform;
            if let Some(outer) = self.outer_node(id) {
                ctx.graph.set_local_transform(outer, transform);
            }
            changed = true;
        }
        changed
    }

    /// Rebuild scene-graph chains for every loaded element.
    ///
    /// Runs after deserialization: imports geometry for file elements,
    /// re-extracts instanced sub-drawables by name, drops sub-drawables
    /// recorded as removed that no live reference claims, and restores the
    /// group hierarchy, visibility and materials.
    pub fn rematerialize(&mut self, ctx: &mut ModuleContext<'_>) {
        self.nodes.clear();
        self.owners.clear();
        let order = ctx.elements.ids_sorted();

        // Owned geometry and groups first.
        for id in &order {
            let Some(element) = ctx.elements.get(*id) else {
                continue;
            };
            if element.is_reference() {
                continue;
            }
            let transform = element.transform;
            let pivot = element.pivot_center;
            if element.is_group() {
                let node = ctx.graph.create_empty_node();
                ctx.graph.set_local_transform(node, transform);
                self.track(*id, node, None);
            } else {
                let path = element.source_path.clone();
                let geometry = ctx.graph.instantiate_model(&path);
                let outer = ctx.graph.create_empty_node();
                ctx.graph.set_parent(geometry, Some(outer));
                ctx.graph
                    .set_local_transform(geometry, Mat4::from_translation(-pivot));
                ctx.graph.set_local_transform(outer, transform);
                self.track(*id, outer, Some(geometry));
            }
        }

        // References re-extract their sub-drawables from the fresh source
        // geometry.
        let mut claimed: Vec<(ElementId, String)> = Vec::new();
        for id in &order {
            let Some(element) = ctx.elements.get(*id) else {
                continue;
            };
            let Some(source) = element.referenced_element else {
                continue;
            };
            let part_name = element.referenced_geometry.clone();
            let transform = element.transform;
            let pivot = element.pivot_center;
            let Some(geometry) = self.nodes.get(&source).and_then(|n| n.geometry) else {
                warn!(
                    "reference {} names element {} which has no geometry",
                    id.raw(),
                    source.raw()
                );
                continue;
            };
            let Some(index) = ctx.graph.part_index(geometry, &part_name) else {
                warn!(
                    "reference {} names missing sub-drawable {part_name:?}",
                    id.raw()
                );
                continue;
            };
            let Ok(extracted) = ctx.graph.instantiate_part(geometry, index) else {
                continue;
            };
            if ctx.graph.remove_part(geometry, &part_name).is_err() {
                ctx.graph.remove_subtree(extracted);
                continue;
            }
            let outer = ctx.graph.create_empty_node();
            ctx.graph.set_parent(extracted, Some(outer));
            ctx.graph
                .set_local_transform(extracted, Mat4::from_translation(-pivot));
            ctx.graph.set_local_transform(outer, transform);
            self.track(*id, outer, Some(extracted));
            claimed.push((source, part_name));
        }

        // Removed sub-drawables no reference claimed stay removed.
        for id in &order {
            let Some(element) = ctx.elements.get(*id) else {
                continue;
            };
            let removed = element.removed_sub_nodes.clone();
            let Some(geometry) = self.nodes.get(id).and_then(|n| n.geometry) else {
                continue;
            };
            for name in removed {
                if claimed
                    .iter()
                    .any(|(source, part)| source == id && *part == name)
                {
                    continue;
                }
                if ctx.graph.remove_part(geometry, &name).is_err() {
                    debug!(
                        "removed sub-drawable {name:?} of element {} already absent",
                        id.raw()
                    );
                }
            }
        }

        // Group hierarchy, visibility, per-view masks and materials.
        for id in &order {
            let Some(element) = ctx.elements.get(*id) else {
                continue;
            };
            let Some(outer) = self.outer_node(*id) else {
                continue;
            };
            for child in element.children.clone() {
                if let Some(child_outer) = self.outer_node(child) {
                    let local = ctx.graph.local_transform(child_outer);
                    ctx.graph.set_parent(child_outer, Some(outer));
                    ctx.graph.set_local_transform(child_outer, local);
                }
            }
            if !element.visible {
                ctx.graph.set_visible(outer, false);
            }
            for view in element.hidden_in_views.clone() {
                ctx.graph.set_hidden_in_view(outer, view, true);
            }
            let stateset = ctx.compiler.compile_stateset(&stateset_descriptor(element));
            ctx.graph.apply_stateset(outer, stateset);
        }
    }
}

/// Read the `metaCount`/`metaKey{n}`/`metaVal{n}` fields of a payload
#[must_use]
pub fn metadata_from(payload: &ParamRecord) -> Vec<(String, String)> {
    let count = payload.int_of("metaCount").unwrap_or(0).max(0) as usize;
    let mut metadata = Vec::with_capacity(count);
    for idx in 0..count {
        let key = payload.str_of(&format!("metaKey{idx}")).unwrap_or_default();
        let value = payload.str_of(&format!("metaVal{idx}")).unwrap_or_default();
        metadata.push((key.to_string(), value.to_string()));
    }
    metadata
}

/// Descriptor handed to the material compiler for an element: the custom
/// properties plus the library material id and display color, so plain
/// material/color assignments reach the renderer seam too.
fn stateset_descriptor(element: &SceneElement) -> MaterialDescriptor {
    let mut descriptor = element.material_props.clone();
    if element.material_id != MATERIAL_CUSTOM {
        descriptor.set("materialId", element.material_id.to_string());
    }
    let (r, g, b) = element.color;
    descriptor.set("displayColor", format!("{r} {g} {b}"));
    descriptor
}

fn id_arg(payload: &ParamRecord, key: &str) -> Option<ElementId> {
    payload
        .handle_of(key)
        .or_else(|| payload.int_of(key).and_then(ElementId::from_wire))
}

impl DocumentModule for LifecycleManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(
        &mut self,
        ctx: &mut ModuleContext<'_>,
        command: &str,
        payload: &ParamRecord,
    ) -> DispatchResult {
        match command {
            messages::ADD_DOC_FILE_ELEMENT => {
                let Some(path) = payload.str_of("path") else {
                    warn!("{command} without a path");
                    return DispatchResult::empty();
                };
                let path = path.to_string();
                self.create_file_element(ctx, &path, metadata_from(payload));
                DispatchResult::handled_repaint()
            }
            messages::ADD_DOC_INSTANCED_ELEMENT => {
                let Some(source) = id_arg(payload, "source") else {
                    return DispatchResult::empty();
                };
                let selector = payload.str_of("subGeometry").unwrap_or("new").to_string();
                match self.create_instance(ctx, source, &selector, metadata_from(payload)) {
                    Some(_) => DispatchResult::handled_repaint(),
                    None => DispatchResult::empty(),
                }
            }
            messages::ADD_TO_GROUP => {
                let count = payload.int_of("count").unwrap_or(0).max(0) as usize;
                let selection: Vec<ElementId> = (0..count)
                    .filter_map(|idx| id_arg(payload, &format!("child{idx}")))
                    .collect();
                let kind =
                    GroupKind::from_wire(payload.int_of("kind").unwrap_or(0)).unwrap_or(GroupKind::Kit);
                match self.group(ctx, &selection, kind) {
                    Ok(_) => DispatchResult::handled_repaint(),
                    Err(error) => {
                        warn!("group aborted: {error}");
                        DispatchResult::empty()
                    }
                }
            }
            messages::SPLIT_GROUP => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                if self.split(ctx, id) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::empty()
                }
            }
            messages::DELETE_DOC_ELEMENT | messages::DELETE_DOC_COMMON_ELEMENT => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                if self.delete_element_and_children(ctx, id) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::empty()
                }
            }
            messages::CHANGE_ELEMENT_MATERIAL => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let material = payload.int_of("materialId").unwrap_or(0);
                let overwrite = payload.bool_of("overwrite").unwrap_or(false);
                if self.set_material(ctx, id, material, overwrite) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::empty()
                }
            }
            messages::CHANGE_ELEMENT_COLOR => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let color = (
                    payload.int_of("colorR").unwrap_or(0).clamp(0, 255) as u8,
                    payload.int_of("colorG").unwrap_or(0).clamp(0, 255) as u8,
                    payload.int_of("colorB").unwrap_or(0).clamp(0, 255) as u8,
                );
                let overwrite = payload.bool_of("overwrite").unwrap_or(false);
                if self.set_color(ctx, id, color, overwrite) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::empty()
                }
            }
            messages::CHANGE_ELEMENT_MATERIAL_PROP_ALL => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let name = payload.str_of("propName").unwrap_or_default().to_string();
                let value = payload.str_of("propVal").unwrap_or_default().to_string();
                let overwrite = payload.bool_of("overwrite").unwrap_or(false);
                if name.is_empty() {
                    warn!("{command} without a property name");
                    return DispatchResult::empty();
                }
                if self.set_material_property(ctx, id, &name, &value, overwrite) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::empty()
                }
            }
            messages::SET_ELEMENT_VISIBILITY => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let visible = payload.bool_of("visible").unwrap_or(true);
                match self.set_visibility(ctx, id, visible) {
                    Some(true) => DispatchResult::handled_repaint(),
                    Some(false) => DispatchResult::handled(),
                    None => DispatchResult::empty(),
                }
            }
            messages::SET_ELEMENT_VIEW_VISIBILITY => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let Some(view) = payload.int_of("view") else {
                    warn!("{command} without a view id");
                    return DispatchResult::empty();
                };
                let visible = payload.bool_of("visible").unwrap_or(true);
                match self.set_view_visibility(ctx, id, view as i32, visible) {
                    Some(true) => DispatchResult::handled_repaint(),
                    Some(false) => DispatchResult::handled(),
                    None => DispatchResult::empty(),
                }
            }
            messages::SET_ACTIVE_SUB_DRAWABLE => {
                let Some(id) = id_arg(payload, "id") else {
                    return DispatchResult::empty();
                };
                let Some(name) = payload.str_of("name") else {
                    return DispatchResult::empty();
                };
                self.set_active_pick(id, name);
                DispatchResult::handled()
            }
            messages::RESTORE_DEFAULT_TRANSFORMS => {
                if self.restore_default_transforms(ctx) {
                    DispatchResult::handled_repaint()
                } else {
                    DispatchResult::handled()
                }
            }
            _ => DispatchResult::empty(),
        }
    }
}
