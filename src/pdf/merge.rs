//! Page compositing using lopdf
//!
//! Each overlay becomes a Form XObject drawn after the page's own content. The
//! original content streams are left byte-for-byte intact: they are bracketed
//! by a prepended `q` stream and an appended `Q` stream so that any
//! transformation they leave behind cannot leak into the watermark.

use std::collections::HashMap;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{debug, trace};
use crate::error::{Error, Result};
use crate::font::StandardFont;
use crate::layout::{PageSize, Rect};
use super::overlay::OverlayArtifact;

/// Page tree depth after which inheritance lookups give up
const MAX_TREE_DEPTH: usize = 64;

/// Allowed mismatch between overlay canvas and page size, in points
const SIZE_TOLERANCE: f32 = 0.01;

/// Geometry attributes of a page, with page-tree inheritance resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub media_box: Rect,
    /// Value of /Rotate (degrees clockwise), 0 when absent
    pub rotation: i64,
}

impl PageGeometry {
    pub fn size(&self) -> PageSize {
        PageSize::new(self.media_box.width(), self.media_box.height())
    }
}

/// What merging did to one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub links_added: usize,
    /// Regions whose on-page area collapsed to zero
    pub links_dropped: usize,
}

/// Merges overlay artifacts onto the pages of one document
///
/// Fonts and Form XObjects are created once per document and shared by every
/// page that uses the same overlay.
pub struct PageCompositor<'a> {
    doc: &'a mut Document,
    fonts: HashMap<StandardFont, ObjectId>,
    forms: Vec<(OverlayArtifact, ObjectId)>,
}

impl<'a> PageCompositor<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self {
            doc,
            fonts: HashMap::new(),
            forms: Vec::new(),
        }
    }

    /// Geometry of a page in the document being composited
    pub fn geometry(&self, page_id: ObjectId) -> Option<PageGeometry> {
        page_geometry(self.doc, page_id)
    }

    /// Draw `overlays` over one page, in order, and attach their links
    ///
    /// `page_number` is only used for error context. The page's MediaBox and
    /// Rotate entries are never written.
    pub fn merge(&mut self, page_number: u32, page_id: ObjectId, overlays: &[OverlayArtifact]) -> Result<MergeOutcome> {
        let fail = |reason: String| Error::Composition {
            page: page_number,
            reason,
        };

        let geometry = page_geometry(self.doc, page_id)
            .ok_or_else(|| fail("missing or malformed MediaBox".to_string()))?;

        for overlay in overlays {
            let page = geometry.size();
            if (overlay.width - page.width).abs() > SIZE_TOLERANCE
                || (overlay.height - page.height).abs() > SIZE_TOLERANCE
            {
                return Err(fail(format!(
                    "overlay is {} x {} but page is {} x {}",
                    overlay.width, overlay.height, page.width, page.height
                )));
            }
        }

        if overlays.is_empty() {
            return Ok(MergeOutcome::default());
        }

        // 1. Register one Form XObject per overlay under fresh names
        let mut resources = inherited_resources(self.doc, page_id);
        let mut xobjects = match resources.get(b"XObject") {
            Ok(obj) => match resolve(self.doc, obj) {
                Some(Object::Dictionary(dict)) => dict.clone(),
                _ => return Err(fail("XObject resources are not a dictionary".to_string())),
            },
            Err(_) => Dictionary::new(),
        };

        let mut invocations = Vec::with_capacity(overlays.len());
        for overlay in overlays {
            let form_id = self.form_for(overlay).map_err(|e| fail(e.to_string()))?;
            let name = unused_name(&xobjects, "Wm");
            xobjects.set(name.clone(), Object::Reference(form_id));
            invocations.push(name);
        }
        resources.set("XObject", Object::Dictionary(xobjects));

        // 2. Isolate the original content, then draw the overlays on top
        let origin = (geometry.media_box.x0, geometry.media_box.y0);
        let contents = existing_contents(self.doc, page_id);
        let has_content = !contents.is_empty();
        let close_id = self.doc.add_object(Stream::new(
            Dictionary::new(),
            invocation_content(&invocations, origin, has_content).map_err(|e| fail(e.to_string()))?,
        ));
        let open_id = has_content
            .then(|| self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())));

        // 3. Link annotations for every clickable region
        let mut outcome = MergeOutcome::default();
        let mut annotation_ids = Vec::new();
        for overlay in overlays {
            for region in &overlay.regions {
                let rect = overlay
                    .region_in_page_space(region)
                    .translate(geometry.media_box.x0, geometry.media_box.y0);
                match rect.intersect(&geometry.media_box) {
                    Some(visible) => {
                        annotation_ids.push(self.doc.add_object(link_annotation(page_id, &visible, &region.url)));
                        outcome.links_added += 1;
                    }
                    None => {
                        trace!(page = page_number, ?rect, "dropping zero-area link region");
                        outcome.links_dropped += 1;
                    }
                }
            }
        }
        append_annotations(self.doc, page_id, annotation_ids).map_err(fail)?;

        let page_dict = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| fail(e.to_string()))?;

        let mut new_contents = Vec::with_capacity(contents.len() + 2);
        if let Some(open_id) = open_id {
            new_contents.push(Object::Reference(open_id));
            new_contents.extend(contents);
        }
        new_contents.push(Object::Reference(close_id));
        page_dict.set("Contents", Object::Array(new_contents));

        // Set the Resources directly on the page so inherited entries
        // stay visible alongside ours
        page_dict.set("Resources", Object::Dictionary(resources));

        debug!(
            page = page_number,
            overlays = overlays.len(),
            links = outcome.links_added,
            dropped = outcome.links_dropped,
            "merged page"
        );
        Ok(outcome)
    }

    /// Form XObject for an overlay, created on first use
    fn form_for(&mut self, overlay: &OverlayArtifact) -> Result<ObjectId> {
        if let Some((_, id)) = self.forms.iter().find(|(known, _)| known == overlay) {
            return Ok(*id);
        }

        let mut fonts = Dictionary::new();
        let mut font_names: HashMap<StandardFont, String> = HashMap::new();
        let mut states = Dictionary::new();
        let mut state_names: Vec<(u32, String)> = Vec::new();
        let mut operations = Vec::new();

        for run in &overlay.runs {
            let font_name = match font_names.get(&run.font) {
                Some(name) => name.clone(),
                None => {
                    let name = format!("F{}", font_names.len() + 1);
                    fonts.set(name.clone(), Object::Reference(self.font_id(run.font)));
                    font_names.insert(run.font, name.clone());
                    name
                }
            };

            let alpha_key = run.color.alpha.to_bits();
            let state_name = match state_names.iter().find(|(key, _)| *key == alpha_key) {
                Some((_, name)) => name.clone(),
                None => {
                    let name = format!("GS{}", state_names.len());
                    states.set(name.clone(), Object::Dictionary(transparency_state(run.color.alpha)));
                    state_names.push((alpha_key, name.clone()));
                    name
                }
            };

            let matrix = run.transform().to_array();
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new("gs", vec![Object::Name(state_name.into_bytes())]),
                Operation::new("rg", vec![run.color.r.into(), run.color.g.into(), run.color.b.into()]),
                Operation::new("cm", matrix.iter().map(|&v| v.into()).collect()),
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(font_name.into_bytes()), run.font_size.into()]),
                Operation::new("Td", vec![0.into(), 0.into()]),
                Operation::new("Tj", vec![Object::String(run.encoded.clone(), StringFormat::Literal)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ]);
        }

        let content = Content { operations }.encode()?;

        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));
        resources.set("ExtGState", Object::Dictionary(states));

        let mut form = Dictionary::new();
        form.set("Type", Object::Name(b"XObject".to_vec()));
        form.set("Subtype", Object::Name(b"Form".to_vec()));
        form.set("FormType", Object::Integer(1));
        form.set("BBox", Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(overlay.width),
            Object::Real(overlay.height),
        ]));
        form.set("Matrix", Object::Array(vec![
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(1),
            Object::Integer(0),
            Object::Integer(0),
        ]));
        form.set("Resources", Object::Dictionary(resources));

        let form_id = self.doc.add_object(Object::Stream(Stream::new(form, content)));
        self.forms.push((overlay.clone(), form_id));
        Ok(form_id)
    }

    /// Standard Type1 font dictionary, one per document
    fn font_id(&mut self, font: StandardFont) -> ObjectId {
        if let Some(id) = self.fonts.get(&font) {
            return *id;
        }

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"Font".to_vec()));
        dict.set("Subtype", Object::Name(b"Type1".to_vec()));
        dict.set("BaseFont", Object::Name(font.base_font().as_bytes().to_vec()));
        dict.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));

        let id = self.doc.add_object(Object::Dictionary(dict));
        self.fonts.insert(font, id);
        id
    }
}

/// Resolve MediaBox and Rotate for a page, walking up the page tree
pub fn page_geometry(doc: &Document, page_id: ObjectId) -> Option<PageGeometry> {
    let media_box = match inherited(doc, page_id, b"MediaBox")? {
        Object::Array(values) if values.len() == 4 => {
            let mut nums = [0.0_f32; 4];
            for (slot, value) in nums.iter_mut().zip(values) {
                *slot = resolve(doc, value)?.as_float().ok()?;
            }
            Rect::new(nums[0], nums[1], nums[2], nums[3])
        }
        _ => return None,
    };

    let rotation = inherited(doc, page_id, b"Rotate")
        .and_then(|r| r.as_i64().ok())
        .unwrap_or(0);

    Some(PageGeometry { media_box, rotation })
}

/// Follow a reference to the object it names; direct objects pass through
pub(crate) fn resolve<'d>(doc: &'d Document, object: &'d Object) -> Option<&'d Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up an inheritable page attribute on the page or its ancestors
fn inherited<'d>(doc: &'d Document, page_id: ObjectId, key: &[u8]) -> Option<&'d Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Copy of the page's effective Resources dictionary
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Current content stream references of a page, in drawing order
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let contents = match doc.get_dictionary(page_id).and_then(|page| page.get(b"Contents")) {
        Ok(contents) => contents,
        Err(_) => return Vec::new(),
    };

    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            // An indirect array of streams
            Ok(Object::Array(streams)) => streams.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Object::Array(streams) => streams.clone(),
        _ => Vec::new(),
    }
}

/// `Q` closing the original content (when there is any), then one `Do` per overlay
fn invocation_content(names: &[String], origin: (f32, f32), restore: bool) -> Result<Vec<u8>> {
    let mut operations = Vec::with_capacity(names.len() * 4 + 1);
    if restore {
        operations.push(Operation::new("Q", vec![]));
    }
    for name in names {
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new("cm", vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                origin.0.into(),
                origin.1.into(),
            ]),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
    }

    // Leading newline keeps the Q apart from an unterminated last operator
    let mut bytes = b"\n".to_vec();
    bytes.extend(Content { operations }.encode()?);
    Ok(bytes)
}

/// First `{prefix}{n}` not already used as a key
fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    (0..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|name| !dict.has(name.as_bytes()))
        .unwrap_or_else(|| prefix.to_string())
}

fn transparency_state(alpha: f32) -> Dictionary {
    let mut state = Dictionary::new();
    state.set("Type", Object::Name(b"ExtGState".to_vec()));
    state.set("ca", Object::Real(alpha));
    state.set("CA", Object::Real(alpha));
    state
}

fn link_annotation(page_id: ObjectId, rect: &Rect, url: &str) -> Dictionary {
    let mut action = Dictionary::new();
    action.set("Type", Object::Name(b"Action".to_vec()));
    action.set("S", Object::Name(b"URI".to_vec()));
    action.set("URI", Object::String(url.as_bytes().to_vec(), StringFormat::Literal));

    let mut annotation = Dictionary::new();
    annotation.set("Type", Object::Name(b"Annot".to_vec()));
    annotation.set("Subtype", Object::Name(b"Link".to_vec()));
    annotation.set("Rect", Object::Array(vec![
        Object::Real(rect.x0),
        Object::Real(rect.y0),
        Object::Real(rect.x1),
        Object::Real(rect.y1),
    ]));
    annotation.set("Border", Object::Array(vec![0.into(), 0.into(), 0.into()]));
    // Print flag
    annotation.set("F", Object::Integer(4));
    annotation.set("P", Object::Reference(page_id));
    annotation.set("A", Object::Dictionary(action));
    annotation
}

/// Add annotation references after any the page already has
fn append_annotations(doc: &mut Document, page_id: ObjectId, new_ids: Vec<ObjectId>) -> std::result::Result<(), String> {
    if new_ids.is_empty() {
        return Ok(());
    }
    let new_refs = new_ids.into_iter().map(Object::Reference);

    let existing = doc
        .get_dictionary(page_id)
        .map_err(|e| e.to_string())?
        .get(b"Annots")
        .ok()
        .cloned();

    match existing {
        Some(Object::Reference(array_id)) => {
            // The array may be shared with other pages; give this page its own copy
            let mut annots = match doc.get_object(array_id) {
                Ok(Object::Array(annots)) => annots.clone(),
                _ => return Err("Annots does not reference an array".to_string()),
            };
            annots.extend(new_refs);
            set_page_entry(doc, page_id, "Annots", Object::Array(annots))
        }
        Some(Object::Array(mut annots)) => {
            annots.extend(new_refs);
            set_page_entry(doc, page_id, "Annots", Object::Array(annots))
        }
        Some(_) => Err("Annots is not an array".to_string()),
        None => set_page_entry(doc, page_id, "Annots", Object::Array(new_refs.collect())),
    }
}

fn set_page_entry(doc: &mut Document, page_id: ObjectId, key: &str, value: Object) -> std::result::Result<(), String> {
    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| e.to_string())?;
    page.set(key, value);
    Ok(())
}
