//! Command name constants
//!
//! The message surface is string-keyed for compatibility with UI and plugin
//! code; these constants pin the exact names and document each command's
//! payload shape. Field tags refer to [`crate::params::ParamValue`] variants.

/// Create a file element from an imported model.
/// Payload: `path=s`, `metaCount=i`, `metaKey{n}=s`, `metaVal{n}=s`.
pub const ADD_DOC_FILE_ELEMENT: &str = "AddDocFileElement";

/// Instance one sub-drawable of an existing element.
/// Payload: `source=i`, `subGeometry=s` (a name, or `new` for the active
/// pick), `metaCount=i`, `metaKey{n}=s`, `metaVal{n}=s`.
pub const ADD_DOC_INSTANCED_ELEMENT: &str = "AddDocInstancedElement";

/// Group a selection of elements.
/// Payload: `count=i`, `child{n}=i`, `kind=i` (0 kit, 1 weld).
pub const ADD_TO_GROUP: &str = "AddToGroup";

/// Dissolve a group, restoring children to the top level.
/// Payload: `id=i`.
pub const SPLIT_GROUP: &str = "SplitGroup";

/// Delete an element with full cascade (references, then group children).
/// Payload: `id=i`.
pub const DELETE_DOC_ELEMENT: &str = "DeleteDocElement";

/// Alias of [`DELETE_DOC_ELEMENT`] kept for UI compatibility.
/// Payload: `id=i`.
pub const DELETE_DOC_COMMON_ELEMENT: &str = "DeleteDocCommonElement";

/// Assign a library material.
/// Payload: `id=i`, `materialId=i`, `overwrite=b` (push onto children that
/// already override).
pub const CHANGE_ELEMENT_MATERIAL: &str = "ChangeElementMaterial";

/// Set the flat display color.
/// Payload: `id=i`, `colorR=i`, `colorG=i`, `colorB=i`, `overwrite=b`.
pub const CHANGE_ELEMENT_COLOR: &str = "ChangeElementColor";

/// Set one custom material property, recursing into group children.
/// Payload: `id=i`, `propName=s`, `propVal=s`, `overwrite=b`.
pub const CHANGE_ELEMENT_MATERIAL_PROP_ALL: &str = "ChangeElementMaterialPropAll";

/// Show or hide an element.
/// Payload: `id=i`, `visible=b`.
pub const SET_ELEMENT_VISIBILITY: &str = "SetElementVisibility";

/// Show or hide an element in one view only, leaving the others alone.
/// Payload: `id=i`, `view=i`, `visible=b`.
pub const SET_ELEMENT_VIEW_VISIBILITY: &str = "SetElementViewVisibility";

/// Record the interactively picked sub-drawable for a later
/// [`ADD_DOC_INSTANCED_ELEMENT`] with `subGeometry=new`.
/// Payload: `id=i`, `name=s`.
pub const SET_ACTIVE_SUB_DRAWABLE: &str = "SetActiveSubDrawable";

/// Snap every element back to its last saved transform. No payload.
pub const RESTORE_DEFAULT_TRANSFORMS: &str = "RestoreDefaultTransforms";

/// Rename an element.
/// Payload: `id=i`, `name=s`.
pub const RENAME_ELEMENT: &str = "RenameElement";

/// Attach an annotation element to a target element so it is re-notified
/// when the target moves. Duplicate registrations are ignored.
/// Payload: `target=i`, `attachment=i`.
pub const REGISTER_ATTACHMENT: &str = "RegisterAttachment";

/// Set a document-level parameter. Handled by the document and still
/// forwarded to modules afterwards.
/// Payload: `key=s`, `value=s`.
pub const SET_DOC_PARAM: &str = "SetDocParam";

/// Snapshot the current page and open a fresh one.
/// Payload: `view=i`.
pub const NEW_PAGE: &str = "NewPage";

/// Go to the page after the current one. Payload: `view=i`.
pub const NEXT_PAGE: &str = "NextPage";

/// Go to the page before the current one. Payload: `view=i`.
pub const BACK_PAGE: &str = "BackPage";

/// Go to a specific page.
/// Payload: `view=i`, `page=i`.
pub const GO_TO_PAGE: &str = "GoToPage";

/// External notification that page-transition animations completed.
/// Idempotent; no payload.
pub const ANIMATION_FINISHED: &str = "AnimationFinished";

/// Snapshot every element's material properties under a name.
/// Payload: `name=s`.
pub const SAVE_MATERIAL_STATE: &str = "SaveMaterialState";

/// Re-apply a named material snapshot.
/// Payload: `name=s`.
pub const SWITCH_TO_MATERIAL_STATE: &str = "SwitchToMaterialState";

/// View-bound camera jump, sent during page restoration.
/// Payload: `view=i`, `camera=m`.
pub const MOVE_TO_CAMERA: &str = "MoveToCamera";

/// Broadcast to views after a page transition bakes an element that
/// carries attachments, so each attachment can re-anchor to it.
/// Payload: `id=h` (the attachment), `element=h` (the element that moved).
pub const ATTACHMENT_MOVED: &str = "AttachmentMoved";
