//! Document serialization
//!
//! The wire format is line-oriented text:
//!
//! ```text
//! <AvocadoDocV1>
//! <document record: params, pages, material states, id counter>
//! <Element>
//! <one element record>
//! </Element>
//! </AvocadoDocV1>
//! ```
//!
//! Re-saving an unmodified document reproduces the file byte for byte;
//! element blocks are written in ascending id order and every record field
//! order is fixed.
//!
//! Loading is abortable mid-stream: a malformed element record, an
//! unterminated `<Element>` block, or a footer inside an open block stops
//! element ingestion but keeps everything ingested so far. Only a missing
//! header or an unreadable document record fails the load outright.

use std::path::Path;

use crate::config::CoreConfig;
use crate::element::SceneElement;
use crate::foundation::ident::ElementId;
use crate::foundation::logging::warn;
use crate::material::{MaterialCompiler, MaterialState};
use crate::params::{ParamRecord, ParamValue, RecordError};
use crate::scenegraph::SceneGraphService;
use crate::viewstate::ViewState;

use super::dispatch::ModuleContext;
use super::Document;

const HEADER: &str = "<AvocadoDocV1>";
const FOOTER: &str = "</AvocadoDocV1>";
const ELEMENT_OPEN: &str = "<Element>";
const ELEMENT_CLOSE: &str = "</Element>";

/// Errors that fail a save or load outright. Anything past the document
/// record degrades to partial success instead.
#[derive(Debug, thiserror::Error)]
pub enum DocumentIoError {
    /// Reading or writing the file failed
    #[error("document I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The document record did not parse
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The file does not start with the format header
    #[error("not a document file: missing {HEADER} header")]
    MissingHeader,

    /// The file ends before the document record
    #[error("document file ends before the document record")]
    Truncated,
}

fn document_record(document: &Document) -> ParamRecord {
    let mut record = ParamRecord::new();

    record.push(
        "paramCount",
        ParamValue::Int(document.doc_params.len() as i64),
    );
    for (idx, (key, value)) in document.doc_params.iter().enumerate() {
        record.push(format!("paramKey{idx}"), ParamValue::Str(key.clone()));
        record.push(format!("paramVal{idx}"), ParamValue::Str(value.clone()));
    }

    record.push("pageCount", ParamValue::Int(document.pages.len() as i64));
    for (idx, page) in document.pages.iter().enumerate() {
        page.write_into(&format!("p{idx}"), &mut record);
    }

    record.push(
        "msCount",
        ParamValue::Int(document.material_states.len() as i64),
    );
    for (idx, state) in document.material_states.iter().enumerate() {
        record.push(format!("ms{idx}Name"), ParamValue::Str(state.name.clone()));
        record.push(
            format!("ms{idx}EntryCount"),
            ParamValue::Int(state.entries.len() as i64),
        );
        for (entry_idx, (id, props)) in state.entries.iter().enumerate() {
            record.push(
                format!("ms{idx}E{entry_idx}Id"),
                ParamValue::Int(i64::from(id.raw())),
            );
            record.push(
                format!("ms{idx}E{entry_idx}Props"),
                ParamValue::Str(props.clone()),
            );
        }
    }

    record.push(
        "lastIdCount",
        ParamValue::Int(i64::from(document.ids.next_value())),
    );
    record
}

fn read_document_record(document: &mut Document, record: &ParamRecord) {
    let param_count = record.int_of("paramCount").unwrap_or(0).max(0) as usize;
    for idx in 0..param_count {
        let key = record.str_of(&format!("paramKey{idx}")).unwrap_or_default();
        let value = record.str_of(&format!("paramVal{idx}")).unwrap_or_default();
        document
            .doc_params
            .push((key.to_string(), value.to_string()));
    }

    let page_count = record.int_of("pageCount").unwrap_or(0).max(0) as usize;
    let mut pages = Vec::with_capacity(page_count.max(1));
    for idx in 0..page_count {
        pages.push(ViewState::read_from(record, &format!("p{idx}")));
    }
    if pages.is_empty() {
        pages.push(ViewState::new(0));
    }
    document.pages = pages;

    let state_count = record.int_of("msCount").unwrap_or(0).max(0) as usize;
    for idx in 0..state_count {
        let mut state = MaterialState {
            name: record
                .str_of(&format!("ms{idx}Name"))
                .unwrap_or_default()
                .to_string(),
            entries: Vec::new(),
        };
        let entry_count = record
            .int_of(&format!("ms{idx}EntryCount"))
            .unwrap_or(0)
            .max(0) as usize;
        for entry_idx in 0..entry_count {
            let id = record
                .int_of(&format!("ms{idx}E{entry_idx}Id"))
                .and_then(ElementId::from_wire);
            let props = record.str_of(&format!("ms{idx}E{entry_idx}Props"));
            if let (Some(id), Some(props)) = (id, props) {
                state.entries.push((id, props.to_string()));
            }
        }
        document.material_states.push(state);
    }
}

/// Serialize a document to its wire form
#[must_use]
pub fn save_to_string(document: &Document) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&document_record(document).to_line());
    out.push('\n');
    for id in document.elements.ids_sorted() {
        if let Some(element) = document.elements.get(id) {
            out.push_str(ELEMENT_OPEN);
            out.push('\n');
            out.push_str(&element.to_record().to_line());
            out.push('\n');
            out.push_str(ELEMENT_CLOSE);
            out.push('\n');
        }
    }
    out.push_str(FOOTER);
    out.push('\n');
    out
}

/// Write a document to a file
pub fn save_to_file(document: &Document, path: impl AsRef<Path>) -> Result<(), DocumentIoError> {
    std::fs::write(path, save_to_string(document))?;
    Ok(())
}

/// Rebuild a document from its wire form.
///
/// The collaborators are supplied by the caller so geometry sources can be
/// prepared before the load rematerializes scene-graph chains. The id
/// generator resumes past both the persisted counter and the highest
/// ingested id.
pub fn load_from_str(
    text: &str,
    graph: Box<dyn SceneGraphService>,
    compiler: Box<dyn MaterialCompiler>,
    config: CoreConfig,
) -> Result<Document, DocumentIoError> {
    let mut lines = text.lines();
    let header = lines.next().ok_or(DocumentIoError::MissingHeader)?;
    if header.trim() != HEADER {
        return Err(DocumentIoError::MissingHeader);
    }
    let record_line = lines.next().ok_or(DocumentIoError::Truncated)?;
    let record = ParamRecord::from_line(record_line)?;

    let mut document = Document::new(graph, compiler, config);
    read_document_record(&mut document, &record);
    let persisted_counter = record.int_of("lastIdCount").unwrap_or(0).max(0) as u32;

    loop {
        let Some(line) = lines.next() else {
            warn!("document file ends without {FOOTER}");
            break;
        };
        let line = line.trim();
        if line == FOOTER {
            break;
        }
        if line != ELEMENT_OPEN {
            warn!("skipping unrecognized line {line:?}");
            continue;
        }
        let Some(body) = lines.next() else {
            warn!("unterminated element block, stopping element ingestion");
            break;
        };
        let element = match ParamRecord::from_line(body)
            .and_then(|record| SceneElement::from_record(&record))
        {
            Ok(element) => element,
            Err(error) => {
                warn!("bad element record ({error}), stopping element ingestion");
                break;
            }
        };
        match lines.next().map(str::trim) {
            Some(ELEMENT_CLOSE) => document.elements.insert(element),
            _ => {
                warn!("unterminated element block, stopping element ingestion");
                break;
            }
        }
    }

    document.ids.reset(persisted_counter);
    let ingested: Vec<ElementId> = document.elements.ids().collect();
    for id in ingested {
        document.ids.reserve_past(id);
    }

    let mut ctx = ModuleContext {
        elements: &mut document.elements,
        ids: &mut document.ids,
        graph: document.graph.as_mut(),
        compiler: document.compiler.as_mut(),
        config: &document.config,
    };
    document.lifecycle.rematerialize(&mut ctx);
    Ok(document)
}

/// Read a document from a file
pub fn load_from_file(
    path: impl AsRef<Path>,
    graph: Box<dyn SceneGraphService>,
    compiler: Box<dyn MaterialCompiler>,
    config: CoreConfig,
) -> Result<Document, DocumentIoError> {
    let text = std::fs::read_to_string(path)?;
    load_from_str(&text, graph, compiler, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::dispatch::HeadlessView;
    use crate::document::messages;
    use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
    use crate::material::CachingCompiler;
    use crate::scenegraph::local::{LocalSceneGraph, PartSpec};
    use crate::scenegraph::AABB;

    fn test_graph() -> Box<dyn SceneGraphService> {
        let mut graph = LocalSceneGraph::new();
        graph.register_model(
            "a.model",
            vec![
                PartSpec::new("body", AABB::unit()),
                PartSpec::new(
                    "wing",
                    AABB::from_center_extents(Vec3::new(3.0, 0.0, 0.0), Vec3::new(1.0, 0.2, 1.0)),
                ),
            ],
        );
        Box::new(graph)
    }

    fn test_document() -> Document {
        let mut document = Document::new(
            test_graph(),
            Box::new(CachingCompiler::new()),
            CoreConfig::default(),
        );
        document.attach_view(Box::new(HeadlessView::new(0)));
        document
    }

    fn add_file_element(document: &mut Document, path: &str) -> ElementId {
        let payload = ParamRecord::new().with("path", ParamValue::Str(path.to_string()));
        document.dispatch(messages::ADD_DOC_FILE_ELEMENT, &payload);
        document.last_created().unwrap()
    }

    fn reload(saved: &str) -> Document {
        load_from_str(
            saved,
            test_graph(),
            Box::new(CachingCompiler::new()),
            CoreConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_file_element_survives_save_and_load() {
        let mut document = test_document();
        let id = add_file_element(&mut document, "a.model");
        document.set_element_transform(id, Mat4::from_translation(Vec3::new(2.0, 1.0, -3.0)));

        let saved = save_to_string(&document);
        let reloaded = reload(&saved);

        let element = reloaded.elements().get(id).unwrap();
        assert_eq!(element.id, ElementId::from_raw(0));
        assert_eq!(element.name, "a.model");
        assert!(element
            .transform
            .approx_eq(&Mat4::from_translation(Vec3::new(2.0, 1.0, -3.0)), 1e-6));
        let node = reloaded.lifecycle().outer_node(id).unwrap();
        assert!(reloaded
            .graph()
            .local_transform(node)
            .approx_eq(&element.transform, 1e-6));
    }

    #[test]
    fn test_rename_does_not_rebind_geometry_on_reload() {
        let mut document = test_document();
        let id = add_file_element(&mut document, "a.model");
        let rename = ParamRecord::new()
            .with("id", ParamValue::Int(i64::from(id.raw())))
            .with("name", ParamValue::Str("nice chair".into()));
        assert!(document
            .dispatch(messages::RENAME_ELEMENT, &rename)
            .is_handled());

        let reloaded = reload(&save_to_string(&document));
        let element = reloaded.elements().get(id).unwrap();
        assert_eq!(element.name, "nice chair");
        assert_eq!(element.source_path, "a.model");
        // The reloaded geometry is the real model, not a fallback.
        let outer = reloaded.lifecycle().outer_node(id).unwrap();
        let geometry = reloaded.graph().children(outer)[0];
        assert_eq!(reloaded.graph().part_names(geometry), vec!["body", "wing"]);
    }

    #[test]
    fn test_per_view_mask_survives_reload() {
        let mut document = test_document();
        let id = add_file_element(&mut document, "a.model");
        let hide = ParamRecord::new()
            .with("id", ParamValue::Int(i64::from(id.raw())))
            .with("view", ParamValue::Int(2))
            .with("visible", ParamValue::Bool(false));
        assert!(document
            .dispatch(messages::SET_ELEMENT_VIEW_VISIBILITY, &hide)
            .is_handled());

        let reloaded = reload(&save_to_string(&document));
        assert!(reloaded
            .elements()
            .get(id)
            .unwrap()
            .hidden_in_views
            .contains(&2));
        let node = reloaded.lifecycle().outer_node(id).unwrap();
        assert!(reloaded.graph().is_hidden_in_view(node, 2));
    }

    #[test]
    fn test_second_save_is_byte_identical() {
        let mut document = test_document();
        let id = add_file_element(&mut document, "a.model");
        document.set_element_transform(id, Mat4::from_translation(Vec3::new(0.125, -7.5, 3.25)));
        let payload = ParamRecord::new()
            .with("key", ParamValue::Str("author".into()))
            .with("value", ParamValue::Str("mb".into()));
        document.dispatch(messages::SET_DOC_PARAM, &payload);
        document.dispatch(
            messages::NEW_PAGE,
            &ParamRecord::new().with("view", ParamValue::Int(0)),
        );
        let prop = ParamRecord::new()
            .with("id", ParamValue::Int(i64::from(id.raw())))
            .with("propName", ParamValue::Str("diffuse".into()))
            .with("propVal", ParamValue::Str("0.5 0.5 0.5".into()));
        document.dispatch(messages::CHANGE_ELEMENT_MATERIAL_PROP_ALL, &prop);
        document.dispatch(
            messages::SAVE_MATERIAL_STATE,
            &ParamRecord::new().with("name", ParamValue::Str("grey".into())),
        );

        let first = save_to_string(&document);
        let second = save_to_string(&reload(&first));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ids_resume_past_everything_in_the_file() {
        let mut document = test_document();
        add_file_element(&mut document, "a.model");
        let second = add_file_element(&mut document, "a.model");
        // Delete the higher id; the persisted counter still protects it.
        document.dispatch(
            messages::DELETE_DOC_ELEMENT,
            &ParamRecord::new().with("id", ParamValue::Int(i64::from(second.raw()))),
        );

        let mut reloaded = reload(&save_to_string(&document));
        let fresh = add_file_element(&mut reloaded, "a.model");
        assert!(fresh.raw() > second.raw());
    }

    #[test]
    fn test_grouped_elements_reload_with_world_transforms() {
        let mut document = test_document();
        let first = add_file_element(&mut document, "a.model");
        let second = add_file_element(&mut document, "a.model");
        document.set_element_transform(first, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        document.set_element_transform(second, Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let payload = ParamRecord::new()
            .with("count", ParamValue::Int(2))
            .with("child0", ParamValue::Int(i64::from(first.raw())))
            .with("child1", ParamValue::Int(i64::from(second.raw())))
            .with("kind", ParamValue::Int(0));
        document.dispatch(messages::ADD_TO_GROUP, &payload);
        let group = document.last_created().unwrap();

        let world_before = {
            let node = document.lifecycle().outer_node(first).unwrap();
            document.graph().world_transform(node)
        };

        let reloaded = reload(&save_to_string(&document));
        assert_eq!(
            reloaded.elements().get(group).unwrap().children,
            vec![first, second]
        );
        let node = reloaded.lifecycle().outer_node(first).unwrap();
        assert!(reloaded
            .graph()
            .world_transform(node)
            .approx_eq(&world_before, 1e-5));
    }

    #[test]
    fn test_instance_reload_re_extracts_the_sub_drawable() {
        let mut document = test_document();
        let source = add_file_element(&mut document, "a.model");
        let payload = ParamRecord::new()
            .with("source", ParamValue::Int(i64::from(source.raw())))
            .with("subGeometry", ParamValue::Str("wing".into()));
        document.dispatch(messages::ADD_DOC_INSTANCED_ELEMENT, &payload);
        let instance = document.last_created().unwrap();

        let reloaded = reload(&save_to_string(&document));
        let element = reloaded.elements().get(instance).unwrap();
        assert_eq!(element.referenced_element, Some(source));
        assert_eq!(element.referenced_geometry, "wing");

        // The reloaded source geometry does not resurrect the part.
        let outer = reloaded.lifecycle().outer_node(source).unwrap();
        let geometry = reloaded.graph().children(outer)[0];
        assert_eq!(reloaded.graph().part_names(geometry), vec!["body"]);
        let instance_outer = reloaded.lifecycle().outer_node(instance).unwrap();
        let instance_geometry = reloaded.graph().children(instance_outer)[0];
        assert_eq!(reloaded.graph().part_names(instance_geometry), vec!["wing"]);
    }

    #[test]
    fn test_unterminated_element_block_keeps_prior_elements() {
        let mut document = test_document();
        add_file_element(&mut document, "a.model");
        add_file_element(&mut document, "a.model");
        let saved = save_to_string(&document);

        // Drop the second element's closing tag and everything after it.
        let cut = saved.rfind(ELEMENT_CLOSE).unwrap();
        let truncated = &saved[..cut];

        let reloaded = reload(truncated);
        assert_eq!(reloaded.elements().len(), 1);
        assert!(reloaded.elements().contains(ElementId::from_raw(0)));
    }

    #[test]
    fn test_footer_inside_element_block_stops_ingestion() {
        let text = format!(
            "{HEADER}\nparamCount=i:0,pageCount=i:0,msCount=i:0,lastIdCount=i:0\n{ELEMENT_OPEN}\n{FOOTER}\n"
        );
        let reloaded = reload(&text);
        assert!(reloaded.elements().is_empty());
        assert_eq!(reloaded.pages().len(), 1);
    }

    #[test]
    fn test_missing_header_fails_the_load() {
        let result = load_from_str(
            "not a document\n",
            test_graph(),
            Box::new(CachingCompiler::new()),
            CoreConfig::default(),
        );
        assert!(matches!(result, Err(DocumentIoError::MissingHeader)));
    }

    #[test]
    fn test_file_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.avodoc");

        let mut document = test_document();
        add_file_element(&mut document, "a.model");
        save_to_file(&document, &path).unwrap();

        let reloaded = load_from_file(
            &path,
            test_graph(),
            Box::new(CachingCompiler::new()),
            CoreConfig::default(),
        )
        .unwrap();
        assert_eq!(reloaded.elements().len(), 1);
    }
}
