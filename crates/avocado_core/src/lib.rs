//! # Avocado Core
//!
//! The document and element management core of a 3D scene authoring tool.
//!
//! ## Features
//!
//! - **Element Lifecycle**: Create, instance, group, and delete scene elements
//! - **Grouping**: Kit and weld groups with transform-preserving split
//! - **Pages**: Per-view snapshots of element placement with animated restore
//! - **Persistence**: Line-oriented text documents with byte-stable re-saves
//! - **Module Dispatch**: String-keyed commands routed to pluggable handlers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avocado_core::prelude::*;
//!
//! fn main() {
//!     let graph = Box::new(LocalSceneGraph::new());
//!     let compiler = Box::new(CachingCompiler::new());
//!     let mut document = Document::new(graph, compiler, CoreConfig::default());
//!
//!     let payload = ParamRecord::new().with("path", ParamValue::Str("chair.model".into()));
//!     let result = document.dispatch(messages::ADD_DOC_FILE_ELEMENT, &payload);
//!     assert!(result.is_handled());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod document;
pub mod element;
pub mod foundation;
pub mod lifecycle;
pub mod material;
pub mod params;
pub mod scenegraph;
pub mod viewstate;

pub use document::dispatch::{DispatchResult, DocumentModule, ModuleContext, ViewSink};
pub use document::{messages, Document};
pub use element::{ElementMap, GroupKind, SceneElement};
pub use foundation::ident::{ElementId, IdGenerator};
pub use params::{ParamRecord, ParamValue, RecordError};

/// Common imports for document users
pub mod prelude {
    pub use crate::{
        config::{Config, CoreConfig},
        document::dispatch::{DispatchResult, DocumentModule, ModuleContext, ViewSink},
        document::io::{load_from_file, save_to_file, DocumentIoError},
        document::{messages, Document},
        element::{ElementMap, GroupKind, SceneElement},
        foundation::ident::{ElementId, IdGenerator},
        foundation::math::{Mat4, Mat4Ext, Vec3},
        material::{CachingCompiler, MaterialCompiler, MaterialDescriptor, StatesetHandle},
        params::{ParamRecord, ParamValue},
        scenegraph::local::LocalSceneGraph,
        scenegraph::{NodeHandle, SceneGraphService, AABB},
        viewstate::ViewState,
    };
}
