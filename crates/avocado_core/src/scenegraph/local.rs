//! In-process scene graph
//!
//! A self-contained [`SceneGraphService`] backend with no renderer behind
//! it. Geometry is synthesized from registered model descriptions, so tests
//! and headless tools can drive the full document core, including animated
//! transitions, deterministically.

use std::collections::{BTreeSet, HashMap};

use slotmap::SlotMap;

use crate::foundation::logging::warn;
use crate::foundation::math::Mat4;
use crate::material::StatesetHandle;

use super::{AnimationHandle, NodeHandle, SceneGraphError, SceneGraphService, AABB};

/// One named sub-drawable of a registered model
#[derive(Debug, Clone)]
pub struct PartSpec {
    /// Sub-drawable name, unique within the model
    pub name: String,
    /// Model-local bounds of the sub-drawable
    pub bounds: AABB,
}

impl PartSpec {
    /// Describe one sub-drawable
    #[must_use]
    pub fn new(name: impl Into<String>, bounds: AABB) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    local: Mat4,
    /// Own geometry bounds; `None` for empty (group/wrapper) nodes
    geometry: Option<AABB>,
    /// Set when this node carries one sub-drawable of a model
    part: Option<(String, usize)>,
    visible: bool,
    hidden_views: BTreeSet<i32>,
    stateset: Option<StatesetHandle>,
}

impl Node {
    fn empty() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            local: Mat4::identity(),
            geometry: None,
            part: None,
            visible: true,
            hidden_views: BTreeSet::new(),
            stateset: None,
        }
    }
}

#[derive(Debug)]
struct Animation {
    node: NodeHandle,
    target: Mat4,
}

/// Headless scene graph backend
#[derive(Debug, Default)]
pub struct LocalSceneGraph {
    nodes: SlotMap<NodeHandle, Node>,
    animations: SlotMap<AnimationHandle, Animation>,
    finished: Vec<AnimationHandle>,
    models: HashMap<String, Vec<PartSpec>>,
}

impl LocalSceneGraph {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sub-drawables a model path materializes into.
    /// Instantiating an unregistered path falls back to a single unit-cube
    /// drawable.
    pub fn register_model(&mut self, path: impl Into<String>, parts: Vec<PartSpec>) {
        self.models.insert(path.into(), parts);
    }

    /// Number of live nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of running animations
    #[must_use]
    pub fn running_animations(&self) -> usize {
        self.animations.len()
    }

    /// Fast-forward one running transition, leaving the rest in flight.
    /// Returns the finished handle, or `None` when nothing is running.
    pub fn complete_next_transition(&mut self) -> Option<AnimationHandle> {
        let handle = self.animations.keys().next()?;
        let animation = self.animations.remove(handle)?;
        if let Some(node) = self.nodes.get_mut(animation.node) {
            node.local = animation.target;
        }
        self.finished.push(handle);
        Some(handle)
    }

    fn detach(&mut self, node: NodeHandle) {
        if let Some(parent) = self.nodes.get(node).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|child| *child != node);
            }
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.parent = None;
        }
    }

    fn collect_subtree(&self, node: NodeHandle, out: &mut Vec<NodeHandle>) {
        out.push(node);
        if let Some(n) = self.nodes.get(node) {
            for child in &n.children {
                self.collect_subtree(*child, out);
            }
        }
    }

    fn bounds_into(&self, node: NodeHandle, world: &Mat4, acc: &mut Option<AABB>) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let world = world * n.local;
        if let Some(own) = n.geometry {
            let transformed = own.transformed(&world);
            *acc = Some(match acc {
                Some(existing) => existing.union(&transformed),
                None => transformed,
            });
        }
        for child in &n.children {
            self.bounds_into(*child, &world, acc);
        }
    }
}

impl SceneGraphService for LocalSceneGraph {
    fn instantiate_model(&mut self, path: &str) -> NodeHandle {
        let parts = self.models.get(path).cloned().unwrap_or_else(|| {
            warn!("no model registered for {path:?}, synthesizing one drawable");
            vec![PartSpec::new("body", AABB::unit())]
        });

        let root = self.nodes.insert(Node::empty());
        for (index, part) in parts.into_iter().enumerate() {
            let child = self.nodes.insert(Node {
                parent: Some(root),
                geometry: Some(part.bounds),
                part: Some((part.name, index)),
                ..Node::empty()
            });
            self.nodes[root].children.push(child);
        }
        root
    }

    fn create_empty_node(&mut self) -> NodeHandle {
        self.nodes.insert(Node::empty())
    }

    fn remove_subtree(&mut self, node: NodeHandle) {
        if !self.nodes.contains_key(node) {
            return;
        }
        self.detach(node);
        let mut doomed = Vec::new();
        self.collect_subtree(node, &mut doomed);
        for handle in doomed {
            self.nodes.remove(handle);
        }
        self.animations
            .retain(|_, animation| self.nodes.contains_key(animation.node));
    }

    fn set_parent(&mut self, node: NodeHandle, parent: Option<NodeHandle>) {
        if !self.nodes.contains_key(node) {
            return;
        }
        self.detach(node);
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.push(node);
                self.nodes[node].parent = Some(parent);
            }
        }
    }

    fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeHandle) -> Vec<NodeHandle> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn local_transform(&self, node: NodeHandle) -> Mat4 {
        self.nodes
            .get(node)
            .map_or_else(Mat4::identity, |n| n.local)
    }

    fn set_local_transform(&mut self, node: NodeHandle, transform: Mat4) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.local = transform;
        }
    }

    fn world_transform(&self, node: NodeHandle) -> Mat4 {
        let mut chain = Vec::new();
        let mut cursor = Some(node);
        while let Some(handle) = cursor {
            let Some(n) = self.nodes.get(handle) else {
                break;
            };
            chain.push(n.local);
            cursor = n.parent;
        }
        chain
            .into_iter()
            .rev()
            .fold(Mat4::identity(), |acc, local| acc * local)
    }

    fn subtree_bounds(&self, node: NodeHandle) -> AABB {
        let parent_world = self
            .nodes
            .get(node)
            .and_then(|n| n.parent)
            .map_or_else(Mat4::identity, |parent| self.world_transform(parent));
        let mut acc = None;
        self.bounds_into(node, &parent_world, &mut acc);
        acc.unwrap_or_else(|| {
            let origin = self.world_transform(node);
            let center = crate::foundation::math::Mat4Ext::translation_part(&origin);
            AABB::new(center, center)
        })
    }

    fn set_visible(&mut self, node: NodeHandle, visible: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.visible = visible;
        }
    }

    fn set_hidden_in_view(&mut self, node: NodeHandle, view: i32, hidden: bool) {
        if let Some(n) = self.nodes.get_mut(node) {
            if hidden {
                n.hidden_views.insert(view);
            } else {
                n.hidden_views.remove(&view);
            }
        }
    }

    fn is_visible(&self, node: NodeHandle) -> bool {
        self.nodes.get(node).is_some_and(|n| n.visible)
    }

    fn is_hidden_in_view(&self, node: NodeHandle, view: i32) -> bool {
        self.nodes
            .get(node)
            .is_some_and(|n| n.hidden_views.contains(&view))
    }

    fn apply_stateset(&mut self, node: NodeHandle, stateset: StatesetHandle) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.stateset = Some(stateset);
        }
    }

    fn stateset_of(&self, node: NodeHandle) -> Option<StatesetHandle> {
        self.nodes.get(node).and_then(|n| n.stateset)
    }

    fn part_names(&self, node: NodeHandle) -> Vec<String> {
        let Some(n) = self.nodes.get(node) else {
            return Vec::new();
        };
        n.children
            .iter()
            .filter_map(|child| self.nodes.get(*child))
            .filter_map(|child| child.part.as_ref().map(|(name, _)| name.clone()))
            .collect()
    }

    fn part_index(&self, node: NodeHandle, name: &str) -> Option<usize> {
        let n = self.nodes.get(node)?;
        n.children
            .iter()
            .filter_map(|child| self.nodes.get(*child))
            .filter_map(|child| child.part.as_ref())
            .find(|(part_name, _)| part_name == name)
            .map(|(_, index)| *index)
    }

    fn instantiate_part(
        &mut self,
        source: NodeHandle,
        index: usize,
    ) -> Result<NodeHandle, SceneGraphError> {
        let source_node = self.nodes.get(source).ok_or(SceneGraphError::DeadNode)?;
        let shared = source_node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(*child))
            .find(|child| child.part.as_ref().is_some_and(|(_, i)| *i == index))
            .map(|child| (child.part.clone(), child.geometry))
            .ok_or_else(|| SceneGraphError::UnknownPart(format!("#{index}")))?;

        let root = self.nodes.insert(Node::empty());
        let child = self.nodes.insert(Node {
            parent: Some(root),
            geometry: shared.1,
            part: shared.0,
            ..Node::empty()
        });
        self.nodes[root].children.push(child);
        Ok(root)
    }

    fn remove_part(&mut self, node: NodeHandle, name: &str) -> Result<(), SceneGraphError> {
        if !self.nodes.contains_key(node) {
            return Err(SceneGraphError::DeadNode);
        }
        let doomed = self
            .nodes
            .get(node)
            .and_then(|n| {
                n.children
                    .iter()
                    .copied()
                    .find(|child| {
                        self.nodes.get(*child).is_some_and(|c| {
                            c.part.as_ref().is_some_and(|(part_name, _)| part_name == name)
                        })
                    })
            })
            .ok_or_else(|| SceneGraphError::UnknownPart(name.to_string()))?;
        self.remove_subtree(doomed);
        Ok(())
    }

    fn begin_transition(
        &mut self,
        node: NodeHandle,
        target: Mat4,
        _duration_secs: f32,
    ) -> AnimationHandle {
        self.animations.insert(Animation { node, target })
    }

    fn cancel_transition(&mut self, animation: AnimationHandle) {
        self.animations.remove(animation);
    }

    fn complete_transitions(&mut self) {
        let running: Vec<_> = self.animations.keys().collect();
        for handle in running {
            if let Some(animation) = self.animations.remove(handle) {
                if let Some(node) = self.nodes.get_mut(animation.node) {
                    node.local = animation.target;
                }
                self.finished.push(handle);
            }
        }
    }

    fn drain_finished(&mut self) -> Vec<AnimationHandle> {
        std::mem::take(&mut self.finished)
    }

    fn is_live(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(node)
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.animations.clear();
        self.finished.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4Ext, Vec3};
    use approx::assert_relative_eq;

    fn graph_with_cart() -> (LocalSceneGraph, NodeHandle) {
        let mut graph = LocalSceneGraph::new();
        graph.register_model(
            "models/cart.obj",
            vec![
                PartSpec::new("frame", AABB::unit()),
                PartSpec::new(
                    "wheel",
                    AABB::from_center_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5)),
                ),
            ],
        );
        let root = graph.instantiate_model("models/cart.obj");
        (graph, root)
    }

    #[test]
    fn test_model_parts_are_indexed_in_order() {
        let (graph, root) = graph_with_cart();
        assert_eq!(graph.part_names(root), vec!["frame", "wheel"]);
        assert_eq!(graph.part_index(root, "wheel"), Some(1));
        assert_eq!(graph.part_index(root, "axle"), None);
    }

    #[test]
    fn test_world_transform_composes_through_parents() {
        let mut graph = LocalSceneGraph::new();
        let parent = graph.create_empty_node();
        let child = graph.create_empty_node();
        graph.set_parent(child, Some(parent));
        graph.set_local_transform(parent, Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        graph.set_local_transform(child, Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));

        let world = graph.world_transform(child);
        assert_relative_eq!(world.translation_part().x, 1.0);
        assert_relative_eq!(world.translation_part().y, 2.0);
    }

    #[test]
    fn test_subtree_bounds_span_all_parts() {
        let (graph, root) = graph_with_cart();
        let bounds = graph.subtree_bounds(root);
        assert_relative_eq!(bounds.min.x, -0.5);
        assert_relative_eq!(bounds.max.x, 2.5);
    }

    #[test]
    fn test_instanced_part_shares_geometry_description() {
        let (mut graph, root) = graph_with_cart();
        let instance = graph.instantiate_part(root, 1).unwrap();
        assert_eq!(graph.part_names(instance), vec!["wheel"]);
        assert!(graph.instantiate_part(root, 7).is_err());
    }

    #[test]
    fn test_remove_part_drops_only_named_drawable() {
        let (mut graph, root) = graph_with_cart();
        graph.remove_part(root, "wheel").unwrap();
        assert_eq!(graph.part_names(root), vec!["frame"]);
        assert!(graph.remove_part(root, "wheel").is_err());
    }

    #[test]
    fn test_transitions_finish_on_demand() {
        let mut graph = LocalSceneGraph::new();
        let node = graph.create_empty_node();
        let target = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let handle = graph.begin_transition(node, target, 0.5);
        assert_eq!(graph.running_animations(), 1);

        graph.complete_transitions();
        assert_eq!(graph.running_animations(), 0);
        assert_eq!(graph.drain_finished(), vec![handle]);
        assert!(graph.local_transform(node).approx_eq(&target, 1e-6));
        // The queue is drained exactly once.
        assert!(graph.drain_finished().is_empty());
    }

    #[test]
    fn test_remove_subtree_invalidates_children() {
        let (mut graph, root) = graph_with_cart();
        let children = graph.children(root);
        graph.remove_subtree(root);
        assert!(!graph.is_live(root));
        for child in children {
            assert!(!graph.is_live(child));
        }
        assert_eq!(graph.node_count(), 0);
    }
}
