//! Scene elements
//!
//! A [`SceneElement`] is one entry in the document's placed-object graph: a
//! file element that owns imported geometry, a group that arranges other
//! elements, or an instance reference that points at a single sub-drawable
//! of another element's geometry without copying it.
//!
//! Elements are pure data. All topology changes (grouping, instancing,
//! deletion) go through the lifecycle manager, which keeps the two-way
//! group/child pointers and the scene graph consistent.

use std::collections::{BTreeSet, HashMap};

use crate::foundation::ident::ElementId;
use crate::foundation::math::{Mat4, Vec3};
use crate::material::MaterialDescriptor;
use crate::params::{ParamRecord, ParamValue, RecordError};

/// How a group treats its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Organizational group; children keep their own materials on split
    Kit,
    /// Welded group; the group's material is pushed onto children on split
    Weld,
}

impl GroupKind {
    /// Wire encoding used in the element record (`-1` means "not a group")
    #[must_use]
    pub fn to_wire(kind: Option<Self>) -> i64 {
        match kind {
            None => -1,
            Some(Self::Kit) => 0,
            Some(Self::Weld) => 1,
        }
    }

    /// Decode the element-record int field
    #[must_use]
    pub fn from_wire(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Kit),
            1 => Some(Self::Weld),
            _ => None,
        }
    }
}

/// RGB display color, one byte per channel
pub type Color = (u8, u8, u8);

/// One placed object in the document
#[derive(Debug, Clone, PartialEq)]
pub struct SceneElement {
    /// Stable id, generator-assigned or restored from a save file
    pub id: ElementId,
    /// User-visible name
    pub name: String,
    /// Name of the lifecycle module that owns the element
    pub owner_module: String,
    /// Import path of the geometry source; empty for groups and references.
    /// Kept separate from `name` so renaming never rebinds geometry.
    pub source_path: String,

    /// Group this element is placed inside, if any
    pub parent_group: Option<ElementId>,
    /// `Some` when this element is a group
    pub group: Option<GroupKind>,
    /// Ordered children; only meaningful for groups
    pub children: Vec<ElementId>,

    /// Source element for an instance reference
    pub referenced_element: Option<ElementId>,
    /// Name of the referenced sub-drawable
    pub referenced_geometry: String,
    /// Index of the referenced sub-drawable inside the source geometry
    pub referenced_drawable_index: i64,

    /// Local transform (group-local when placed inside a group)
    pub transform: Mat4,
    /// Pivot point the transform rotates/scales around
    pub pivot_center: Vec3,
    /// Baseline used by "restore to default position"
    pub last_saved_transform: Mat4,

    /// Whether the element is shown at all
    pub visible: bool,
    /// Library material id, or [`crate::material::MATERIAL_CUSTOM`]
    pub material_id: i64,
    /// Whether the material came from the owning group
    pub inherit_material: bool,
    /// Opaque material properties, interpreted by the material subsystem
    pub material_props: MaterialDescriptor,
    /// Flat display color
    pub color: Color,

    /// Ordered user metadata pairs
    pub metadata: Vec<(String, String)>,
    /// Elements (annotations and the like) notified when this element moves
    pub attachments: BTreeSet<ElementId>,
    /// Geometry sub-parts stripped out after being split into instances;
    /// kept so re-serialization does not resurrect them
    pub removed_sub_nodes: Vec<String>,
    /// Views in which the element is masked out of traversal
    pub hidden_in_views: BTreeSet<i32>,
}

impl SceneElement {
    /// Create a plain element with defaulted presentation state
    #[must_use]
    pub fn new(id: ElementId, name: impl Into<String>, owner_module: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            owner_module: owner_module.into(),
            source_path: String::new(),
            parent_group: None,
            group: None,
            children: Vec::new(),
            referenced_element: None,
            referenced_geometry: String::new(),
            referenced_drawable_index: -1,
            transform: Mat4::identity(),
            pivot_center: Vec3::zeros(),
            last_saved_transform: Mat4::identity(),
            visible: true,
            material_id: 0,
            inherit_material: false,
            material_props: MaterialDescriptor::new(),
            color: (200, 200, 200),
            metadata: Vec::new(),
            attachments: BTreeSet::new(),
            removed_sub_nodes: Vec::new(),
            hidden_in_views: BTreeSet::new(),
        }
    }

    /// Whether this element is a group
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.group.is_some()
    }

    /// Whether this element is an instance reference
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.referenced_element.is_some()
    }

    /// Serialize into the fixed-order element record
    #[must_use]
    pub fn to_record(&self) -> ParamRecord {
        let mut record = ParamRecord::new()
            .with("id", ParamValue::Int(i64::from(self.id.raw())))
            .with("name", ParamValue::Str(self.name.clone()))
            .with("owner", ParamValue::Str(self.owner_module.clone()))
            .with("path", ParamValue::Str(self.source_path.clone()))
            .with("parent", ParamValue::Int(ElementId::to_wire(self.parent_group)))
            .with("group", ParamValue::Int(GroupKind::to_wire(self.group)))
            .with("refId", ParamValue::Int(ElementId::to_wire(self.referenced_element)))
            .with("refGeom", ParamValue::Str(self.referenced_geometry.clone()))
            .with("refIdx", ParamValue::Int(self.referenced_drawable_index))
            .with("transform", ParamValue::Matrix(self.transform))
            .with("pivotX", ParamValue::Float(f64::from(self.pivot_center.x)))
            .with("pivotY", ParamValue::Float(f64::from(self.pivot_center.y)))
            .with("pivotZ", ParamValue::Float(f64::from(self.pivot_center.z)))
            .with("lastSaved", ParamValue::Matrix(self.last_saved_transform))
            .with("visible", ParamValue::Bool(self.visible))
            .with("materialId", ParamValue::Int(self.material_id))
            .with("inheritMat", ParamValue::Bool(self.inherit_material))
            .with("matProps", ParamValue::Str(self.material_props.to_wire()))
            .with("colorR", ParamValue::Int(i64::from(self.color.0)))
            .with("colorG", ParamValue::Int(i64::from(self.color.1)))
            .with("colorB", ParamValue::Int(i64::from(self.color.2)));

        record.push("metaCount", ParamValue::Int(self.metadata.len() as i64));
        for (idx, (key, value)) in self.metadata.iter().enumerate() {
            record.push(format!("metaKey{idx}"), ParamValue::Str(key.clone()));
            record.push(format!("metaVal{idx}"), ParamValue::Str(value.clone()));
        }

        record.push("attachCount", ParamValue::Int(self.attachments.len() as i64));
        for (idx, id) in self.attachments.iter().enumerate() {
            record.push(format!("attach{idx}"), ParamValue::Int(i64::from(id.raw())));
        }

        record.push("childCount", ParamValue::Int(self.children.len() as i64));
        for (idx, id) in self.children.iter().enumerate() {
            record.push(format!("child{idx}"), ParamValue::Int(i64::from(id.raw())));
        }

        record.push(
            "removedCount",
            ParamValue::Int(self.removed_sub_nodes.len() as i64),
        );
        for (idx, name) in self.removed_sub_nodes.iter().enumerate() {
            record.push(format!("removed{idx}"), ParamValue::Str(name.clone()));
        }

        record.push(
            "hiddenCount",
            ParamValue::Int(self.hidden_in_views.len() as i64),
        );
        for (idx, view) in self.hidden_in_views.iter().enumerate() {
            record.push(format!("hidden{idx}"), ParamValue::Int(i64::from(*view)));
        }

        record
    }

    /// Rebuild an element from its record
    pub fn from_record(record: &ParamRecord) -> Result<Self, RecordError> {
        let id = record
            .int_of("id")
            .and_then(ElementId::from_wire)
            .ok_or(RecordError::MissingField("id"))?;
        let name = record
            .str_of("name")
            .ok_or(RecordError::MissingField("name"))?;
        let owner = record.str_of("owner").unwrap_or_default();

        let mut element = Self::new(id, name, owner);
        // Records written before the path field existed fall back to the
        // name, which was the import path until the element was renamed.
        element.source_path = record.str_of("path").unwrap_or(name).to_string();
        element.parent_group = ElementId::from_wire(record.int_of("parent").unwrap_or(-1));
        element.group = GroupKind::from_wire(record.int_of("group").unwrap_or(-1));
        element.referenced_element = ElementId::from_wire(record.int_of("refId").unwrap_or(-1));
        element.referenced_geometry = record.str_of("refGeom").unwrap_or_default().to_string();
        element.referenced_drawable_index = record.int_of("refIdx").unwrap_or(-1);
        element.transform = *record
            .matrix_of("transform")
            .ok_or(RecordError::MissingField("transform"))?;
        element.pivot_center = Vec3::new(
            record.float_of("pivotX").unwrap_or(0.0) as f32,
            record.float_of("pivotY").unwrap_or(0.0) as f32,
            record.float_of("pivotZ").unwrap_or(0.0) as f32,
        );
        element.last_saved_transform = record
            .matrix_of("lastSaved")
            .copied()
            .unwrap_or(element.transform);
        element.visible = record.bool_of("visible").unwrap_or(true);
        element.material_id = record.int_of("materialId").unwrap_or(0);
        element.inherit_material = record.bool_of("inheritMat").unwrap_or(false);
        element.material_props =
            MaterialDescriptor::from_wire(record.str_of("matProps").unwrap_or_default());
        element.color = (
            record.int_of("colorR").unwrap_or(200).clamp(0, 255) as u8,
            record.int_of("colorG").unwrap_or(200).clamp(0, 255) as u8,
            record.int_of("colorB").unwrap_or(200).clamp(0, 255) as u8,
        );

        let meta_count = record.int_of("metaCount").unwrap_or(0).max(0) as usize;
        for idx in 0..meta_count {
            let key = record
                .str_of(&format!("metaKey{idx}"))
                .ok_or(RecordError::MissingField("metaKey"))?;
            let value = record
                .str_of(&format!("metaVal{idx}"))
                .ok_or(RecordError::MissingField("metaVal"))?;
            element.metadata.push((key.to_string(), value.to_string()));
        }

        let attach_count = record.int_of("attachCount").unwrap_or(0).max(0) as usize;
        for idx in 0..attach_count {
            if let Some(id) = record
                .int_of(&format!("attach{idx}"))
                .and_then(ElementId::from_wire)
            {
                element.attachments.insert(id);
            }
        }

        let child_count = record.int_of("childCount").unwrap_or(0).max(0) as usize;
        for idx in 0..child_count {
            let child = record
                .int_of(&format!("child{idx}"))
                .and_then(ElementId::from_wire)
                .ok_or(RecordError::MissingField("child"))?;
            element.children.push(child);
        }

        let removed_count = record.int_of("removedCount").unwrap_or(0).max(0) as usize;
        for idx in 0..removed_count {
            let name = record
                .str_of(&format!("removed{idx}"))
                .ok_or(RecordError::MissingField("removed"))?;
            element.removed_sub_nodes.push(name.to_string());
        }

        let hidden_count = record.int_of("hiddenCount").unwrap_or(0).max(0) as usize;
        for idx in 0..hidden_count {
            if let Some(view) = record.int_of(&format!("hidden{idx}")) {
                element.hidden_in_views.insert(view as i32);
            }
        }

        Ok(element)
    }
}

/// The document's element index
///
/// Owns every element by id and keeps the ordered list of top-level elements
/// (those not placed inside a group). This map is mutated only by create and
/// delete operations; callers must not hold an id across a delete without
/// re-resolving it.
#[derive(Debug, Default)]
pub struct ElementMap {
    by_id: HashMap<ElementId, SceneElement>,
    top_level: Vec<ElementId>,
}

impl ElementMap {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the index holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Look up an element
    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<&SceneElement> {
        self.by_id.get(&id)
    }

    /// Look up an element mutably
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut SceneElement> {
        self.by_id.get_mut(&id)
    }

    /// Whether an element is live
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Insert an element. Top-level placement is tracked unless the element
    /// already names a parent group.
    pub fn insert(&mut self, element: SceneElement) {
        let id = element.id;
        let top_level = element.parent_group.is_none();
        self.by_id.insert(id, element);
        if top_level && !self.top_level.contains(&id) {
            self.top_level.push(id);
        }
    }

    /// Remove an element, returning it
    pub fn remove(&mut self, id: ElementId) -> Option<SceneElement> {
        self.top_level.retain(|existing| *existing != id);
        self.by_id.remove(&id)
    }

    /// Ordered ids of elements reachable from the document root
    #[must_use]
    pub fn top_level(&self) -> &[ElementId] {
        &self.top_level
    }

    /// Remove an id from the top-level list (it becomes reachable only
    /// through its group)
    pub fn demote(&mut self, id: ElementId) {
        self.top_level.retain(|existing| *existing != id);
    }

    /// Put an id back on the top-level list
    pub fn promote(&mut self, id: ElementId) {
        if self.by_id.contains_key(&id) && !self.top_level.contains(&id) {
            self.top_level.push(id);
        }
    }

    /// Iterate all live elements in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &SceneElement> {
        self.by_id.values()
    }

    /// Iterate all live ids in arbitrary order
    pub fn ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.by_id.keys().copied()
    }

    /// Ids sorted ascending, the order element blocks are written on save
    #[must_use]
    pub fn ids_sorted(&self) -> Vec<ElementId> {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.top_level.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4Ext;

    #[test]
    fn test_record_round_trip() {
        let mut element = SceneElement::new(ElementId::from_raw(7), "wheel", "fileElements");
        element.transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        element.pivot_center = Vec3::new(0.5, 0.5, 0.0);
        element.material_id = crate::material::MATERIAL_CUSTOM;
        element.material_props.set("diffuse", "1 0 0");
        element.color = (10, 20, 30);
        element.metadata.push(("partNo".into(), "A-113".into()));
        element.attachments.insert(ElementId::from_raw(9));
        element.removed_sub_nodes.push("bolt_03".into());
        element.hidden_in_views.insert(2);

        let record = element.to_record();
        let rebuilt = SceneElement::from_record(&record).unwrap();
        assert_eq!(rebuilt, element);
        // Re-serialization is byte-identical.
        assert_eq!(rebuilt.to_record().to_line(), record.to_line());
    }

    #[test]
    fn test_group_record_round_trip() {
        let mut group = SceneElement::new(ElementId::from_raw(2), "axle kit", "fileElements");
        group.group = Some(GroupKind::Weld);
        group.children = vec![ElementId::from_raw(0), ElementId::from_raw(1)];

        let rebuilt = SceneElement::from_record(&group.to_record()).unwrap();
        assert_eq!(rebuilt.group, Some(GroupKind::Weld));
        assert_eq!(rebuilt.children, group.children);
    }

    #[test]
    fn test_record_requires_identity_fields() {
        let record = ParamRecord::new().with("name", ParamValue::Str("x".into()));
        assert!(matches!(
            SceneElement::from_record(&record),
            Err(RecordError::MissingField("id"))
        ));
    }

    #[test]
    fn test_map_tracks_top_level() {
        let mut map = ElementMap::new();
        map.insert(SceneElement::new(ElementId::from_raw(0), "a", "m"));
        map.insert(SceneElement::new(ElementId::from_raw(1), "b", "m"));
        assert_eq!(map.top_level().len(), 2);

        map.demote(ElementId::from_raw(0));
        assert_eq!(map.top_level(), &[ElementId::from_raw(1)]);

        map.promote(ElementId::from_raw(0));
        assert_eq!(map.top_level().len(), 2);

        map.remove(ElementId::from_raw(1));
        assert_eq!(map.top_level(), &[ElementId::from_raw(0)]);
    }
}
