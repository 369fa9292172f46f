//! PDF metadata extraction

use std::path::Path;
use lopdf::{Document, Object};
use crate::error::{Error, Result};
use super::merge::{page_geometry, resolve};

/// Per-page facts relevant to watermarking
#[derive(Debug, Clone, PartialEq)]
pub struct PageInfo {
    pub width: f32,
    pub height: f32,
    pub rotation: i64,
    /// Number of entries in /Annots
    pub annotation_count: usize,
    /// Target URIs of link annotations, in /Annots order
    pub link_uris: Vec<String>,
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Document producer (if present)
    pub producer: Option<String>,
    pub pages: Vec<PageInfo>,
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let metadata = document_metadata(&doc)?;

    if metadata.page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(metadata)
}

/// Metadata of an already loaded document
pub fn document_metadata(doc: &Document) -> Result<PdfMetadata> {
    let mut pages = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        let geometry = page_geometry(doc, page_id).ok_or_else(|| Error::Composition {
            page: page_number,
            reason: "missing or malformed MediaBox".to_string(),
        })?;
        let annotations = page_annotations(doc, page_id);
        pages.push(PageInfo {
            width: geometry.size().width,
            height: geometry.size().height,
            rotation: geometry.rotation,
            annotation_count: annotations.len(),
            link_uris: annotations.iter().filter_map(|a| link_uri(doc, a)).collect(),
        });
    }

    Ok(PdfMetadata {
        page_count: pages.len(),
        title: info_string(doc, b"Title"),
        author: info_string(doc, b"Author"),
        producer: info_string(doc, b"Producer"),
        pages,
    })
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = doc.get_pages().len();

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}

/// Annotation dictionaries (or references to them) attached to a page
fn page_annotations(doc: &Document, page_id: lopdf::ObjectId) -> Vec<Object> {
    doc.get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Annots").ok())
        .and_then(|annots| resolve(doc, annots))
        .and_then(|annots| annots.as_array().ok())
        .cloned()
        .unwrap_or_default()
}

/// URI of a /Link annotation with a /URI action
fn link_uri(doc: &Document, annotation: &Object) -> Option<String> {
    let dict = resolve(doc, annotation)?.as_dict().ok()?;
    if dict.get(b"Subtype").and_then(Object::as_name).ok()? != b"Link" {
        return None;
    }
    let action = resolve(doc, dict.get(b"A").ok()?)?.as_dict().ok()?;
    let uri = action.get(b"URI").and_then(Object::as_str).ok()?;
    String::from_utf8(uri.to_vec()).ok()
}

fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info = resolve(doc, doc.trailer.get(b"Info").ok()?)?.as_dict().ok()?;
    let bytes = info.get(key).and_then(Object::as_str).ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}
