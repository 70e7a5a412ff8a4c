//! Scene graph service trait
//!
//! The document core never renders. It talks to whatever spatial backend is
//! hosting the scene through [`SceneGraphService`], a pluggable seam that
//! covers node topology, transforms, bounds, per-view visibility and
//! transform animations. [`local::LocalSceneGraph`] is the in-crate
//! implementation used by tests and headless tools.

pub mod local;

use crate::foundation::math::{Mat4, Point3, Vec3};

slotmap::new_key_type! {
    /// Handle to one node owned by the scene graph backend
    pub struct NodeHandle;
    /// Handle to one running transform animation
    pub struct AnimationHandle;
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    #[must_use]
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Unit cube centered at the origin
    #[must_use]
    pub fn unit() -> Self {
        Self::from_center_extents(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5))
    }

    /// Get the center of the AABB
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    #[must_use]
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Smallest AABB enclosing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Vec3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vec3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Smallest AABB enclosing this box after a transform
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
        let mut max = -min;
        for corner in corners {
            let p = matrix.transform_point(&Point3::from(corner));
            min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Self { min, max }
    }
}

/// Errors reported by a scene graph backend
#[derive(Debug, thiserror::Error)]
pub enum SceneGraphError {
    /// A handle did not resolve to a live node
    #[error("scene graph node is no longer live")]
    DeadNode,

    /// A named sub-drawable was not found on a node
    #[error("no sub-drawable named {0:?}")]
    UnknownPart(String),
}

/// Spatial backend seam used by the document core
///
/// Implementations own node storage and invalidate handles on removal.
/// All transform arguments and results are parent-relative unless the
/// method name says world.
pub trait SceneGraphService: Send {
    /// Materialize a model's node tree and return its root. Each named
    /// sub-drawable of the model becomes a child node of the root.
    fn instantiate_model(&mut self, path: &str) -> NodeHandle;

    /// Create a node with no geometry, used for groups and animation
    /// wrappers
    fn create_empty_node(&mut self) -> NodeHandle;

    /// Remove a node and its entire subtree
    fn remove_subtree(&mut self, node: NodeHandle);

    /// Re-home a node under a new parent, or to the root when `None`.
    /// The node's local transform is left untouched.
    fn set_parent(&mut self, node: NodeHandle, parent: Option<NodeHandle>);

    /// Current parent of a node
    fn parent(&self, node: NodeHandle) -> Option<NodeHandle>;

    /// Direct children of a node, in attach order
    fn children(&self, node: NodeHandle) -> Vec<NodeHandle>;

    /// Parent-relative transform of a node
    fn local_transform(&self, node: NodeHandle) -> Mat4;

    /// Replace a node's parent-relative transform
    fn set_local_transform(&mut self, node: NodeHandle, transform: Mat4);

    /// Root-relative transform of a node
    fn world_transform(&self, node: NodeHandle) -> Mat4;

    /// World-space bounds of a node's subtree
    fn subtree_bounds(&self, node: NodeHandle) -> AABB;

    /// Show or hide a subtree in every view
    fn set_visible(&mut self, node: NodeHandle, visible: bool);

    /// Mask a subtree out of one view's traversal
    fn set_hidden_in_view(&mut self, node: NodeHandle, view: i32, hidden: bool);

    /// Whether a subtree is shown in every view
    fn is_visible(&self, node: NodeHandle) -> bool;

    /// Whether a subtree is masked out of one view's traversal
    fn is_hidden_in_view(&self, node: NodeHandle, view: i32) -> bool;

    /// Attach a compiled material stateset to a node's drawables
    fn apply_stateset(&mut self, node: NodeHandle, stateset: crate::material::StatesetHandle);

    /// Stateset currently attached to a node
    fn stateset_of(&self, node: NodeHandle) -> Option<crate::material::StatesetHandle>;

    /// Names of a node's sub-drawables, in model order
    fn part_names(&self, node: NodeHandle) -> Vec<String>;

    /// Resolve a sub-drawable name to its model index
    fn part_index(&self, node: NodeHandle, name: &str) -> Option<usize>;

    /// Create a node that shares one sub-drawable of `source` without
    /// copying geometry
    fn instantiate_part(
        &mut self,
        source: NodeHandle,
        index: usize,
    ) -> Result<NodeHandle, SceneGraphError>;

    /// Detach and drop one named sub-drawable from a node's geometry
    fn remove_part(&mut self, node: NodeHandle, name: &str) -> Result<(), SceneGraphError>;

    /// Start animating a node's local transform toward `target`
    fn begin_transition(
        &mut self,
        node: NodeHandle,
        target: Mat4,
        duration_secs: f32,
    ) -> AnimationHandle;

    /// Stop an animation without completing it
    fn cancel_transition(&mut self, animation: AnimationHandle);

    /// Fast-forward every running animation to its target transform and
    /// queue the handles for [`drain_finished`](Self::drain_finished)
    fn complete_transitions(&mut self);

    /// Take the handles of animations that completed since the last call
    fn drain_finished(&mut self) -> Vec<AnimationHandle>;

    /// Whether a handle refers to a live node
    fn is_live(&self, node: NodeHandle) -> bool;

    /// Drop every node and animation
    fn clear(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_union_and_center() {
        let a = AABB::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 1.0));
        let b = AABB::new(Vec3::new(0.0, -2.0, 0.0), Vec3::new(3.0, 0.0, 1.0));
        let u = a.union(&b);
        assert_eq!(u.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(u.max, Vec3::new(3.0, 2.0, 1.0));
        assert_relative_eq!(u.center().x, 1.0);
        assert_relative_eq!(u.center().y, 0.0);
    }

    #[test]
    fn test_aabb_translation() {
        let unit = AABB::unit();
        let moved = unit.transformed(&Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert_relative_eq!(moved.center().x, 2.0);
        assert_relative_eq!(moved.extents().x, 0.5);
    }
}
