//! Integration tests for the watermarking library

use lopdf::content::Content;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_watermark::batch::watermark_tree;
use pdf_watermark::config::WatermarkConfig;
use pdf_watermark::layout::Rect;
use pdf_watermark::pdf::{
    build_overlay, build_overlays, count_pages, document_metadata, page_geometry,
    watermark_document, PageCompositor,
};
use pdf_watermark::Error;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const URL: &str = "https://site.example";

/// One page of a generated test document
#[derive(Clone, Copy)]
struct FixturePage {
    media_box: [i64; 4],
    rotate: Option<i64>,
    with_note: bool,
}

impl FixturePage {
    fn letter() -> Self {
        Self {
            media_box: [0, 0, 612, 792],
            rotate: None,
            with_note: false,
        }
    }
}

/// Build a document whose pages each say "Hello original page N"
///
/// The font lives in the Pages node's Resources, so pages inherit it.
fn make_document(pages: &[FixturePage]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for (i, fixture) in pages.iter().enumerate() {
        let content = Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new("Tf", vec!["F1".into(), 24.into()]),
                lopdf::content::Operation::new("Td", vec![72.into(), 700.into()]),
                lopdf::content::Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Hello original page {}", i + 1))],
                ),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => fixture.media_box.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
            "Contents" => content_id,
        };
        if let Some(rotate) = fixture.rotate {
            page.set("Rotate", rotate);
        }
        if fixture.with_note {
            let note_id = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Text",
                "Rect" => vec![10.into(), 10.into(), 30.into(), 30.into()],
                "Contents" => Object::string_literal("existing note"),
            });
            page.set("Annots", vec![Object::Reference(note_id)]);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Quarterly Report"),
        "Author" => Object::string_literal("Finance"),
    });
    doc.trailer.set("Info", info_id);
    doc
}

fn write_document(path: &Path, pages: &[FixturePage]) {
    let mut doc = make_document(pages);
    doc.save(path).expect("Failed to save fixture");
}

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Strings shown with Tj anywhere in a page's own content streams
fn shown_strings(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let content = doc.get_page_content(page_id).expect("Failed to read page content");
    let content = Content::decode(&content).expect("Page content does not parse");
    content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| op.operands.first())
        .filter_map(|operand| operand.as_str().ok())
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .collect()
}

fn operator_count(doc: &Document, page_id: ObjectId, operator: &str) -> usize {
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content)
        .unwrap()
        .operations
        .iter()
        .filter(|op| op.operator == operator)
        .count()
}

/// Rect of every annotation on a page
fn annotation_rects(doc: &Document, page_id: ObjectId) -> Vec<Rect> {
    let page = doc.get_dictionary(page_id).unwrap();
    let annots = match page.get(b"Annots") {
        Ok(Object::Array(annots)) => annots.clone(),
        _ => return Vec::new(),
    };
    annots
        .iter()
        .map(|annot| {
            let dict = doc.get_dictionary(annot.as_reference().unwrap()).unwrap();
            let rect = dict.get(b"Rect").unwrap().as_array().unwrap();
            let v: Vec<f32> = rect.iter().map(|n| n.as_float().unwrap()).collect();
            Rect::new(v[0], v[1], v[2], v[3])
        })
        .collect()
}

#[test]
fn test_tiled_preserves_page_count_and_geometry() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");

    let pages = [
        FixturePage::letter(),
        FixturePage { rotate: Some(90), ..FixturePage::letter() },
        FixturePage { media_box: [0, 0, 595, 842], ..FixturePage::letter() },
        FixturePage::letter(),
    ];
    write_document(&input, &pages);

    let report = watermark_document(&input, &output, &WatermarkConfig::tiled("CONFIDENTIAL"))
        .expect("Failed to watermark");
    assert_eq!(report.pages, 4);
    assert_eq!(report.links_added, 0);

    assert_eq!(count_pages(&output).unwrap(), 4);

    let before = Document::load(&input).unwrap();
    let after = Document::load(&output).unwrap();
    for (old_id, new_id) in page_ids(&before).into_iter().zip(page_ids(&after)) {
        assert_eq!(page_geometry(&before, old_id), page_geometry(&after, new_id));
    }

    let metadata = document_metadata(&after).unwrap();
    assert_eq!(metadata.pages[1].rotation, 90);
    assert_eq!((metadata.pages[2].width, metadata.pages[2].height), (595.0, 842.0));
}

#[test]
fn test_original_content_still_present() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");
    write_document(&input, &[FixturePage::letter(), FixturePage::letter()]);

    watermark_document(&input, &output, &WatermarkConfig::tiled("CONFIDENTIAL")).unwrap();

    let doc = Document::load(&output).unwrap();
    for (i, page_id) in page_ids(&doc).into_iter().enumerate() {
        let strings = shown_strings(&doc, page_id);
        assert_eq!(strings, vec![format!("Hello original page {}", i + 1)]);

        // Original content is wrapped, overlay drawn once after it
        assert_eq!(operator_count(&doc, page_id, "q"), operator_count(&doc, page_id, "Q"));
        assert_eq!(operator_count(&doc, page_id, "Do"), 1);
    }
}

#[test]
fn test_original_streams_untouched() {
    let mut doc = make_document(&[FixturePage::letter()]);
    let page_id = page_ids(&doc)[0];
    let original_id = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"Contents")
        .unwrap()
        .as_reference()
        .unwrap();
    let original_bytes = doc.get_object(original_id).unwrap().as_stream().unwrap().content.clone();

    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::tiled("DRAFT")).unwrap();
    PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]).unwrap();

    let contents = doc.get_dictionary(page_id).unwrap().get(b"Contents").unwrap().as_array().unwrap().clone();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1], Object::Reference(original_id));
    let after = doc.get_object(original_id).unwrap().as_stream().unwrap().content.clone();
    assert_eq!(original_bytes, after);
}

#[test]
fn test_overlay_without_regions_keeps_annotations() {
    let mut doc = make_document(&[FixturePage { with_note: true, ..FixturePage::letter() }]);
    let page_id = page_ids(&doc)[0];
    let annots_before = doc.get_dictionary(page_id).unwrap().get(b"Annots").unwrap().clone();
    let note_id = annots_before.as_array().unwrap()[0].as_reference().unwrap();
    let note_before = doc.get_object(note_id).unwrap().clone();

    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::tiled("DRAFT")).unwrap();
    assert!(overlay.regions.is_empty());
    let outcome = PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]).unwrap();
    assert_eq!(outcome.links_added, 0);

    let annots_after = doc.get_dictionary(page_id).unwrap().get(b"Annots").unwrap().clone();
    assert_eq!(annots_before, annots_after);
    assert_eq!(&note_before, doc.get_object(note_id).unwrap());
}

#[test]
fn test_links_are_added_after_existing_annotations() {
    let mut doc = make_document(&[FixturePage { with_note: true, ..FixturePage::letter() }]);
    let page_id = page_ids(&doc)[0];

    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::centered_link("AB", URL)).unwrap();
    let outcome = PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]).unwrap();
    assert_eq!(outcome.links_added, 2);

    let metadata = document_metadata(&doc).unwrap();
    assert_eq!(metadata.pages[0].annotation_count, 3);
    assert_eq!(metadata.pages[0].link_uris, vec![URL.to_string(), URL.to_string()]);

    let first = annotation_rects(&doc, page_id)[0];
    assert_eq!(first, Rect::new(10.0, 10.0, 30.0, 30.0));
}

#[test]
fn test_geometry_idempotent_across_copies() {
    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::centered_link("site.example", URL)).unwrap();
    let fixture = [FixturePage { rotate: Some(270), ..FixturePage::letter() }];

    let mut geometries = Vec::new();
    for _ in 0..2 {
        let mut doc = make_document(&fixture);
        let page_id = page_ids(&doc)[0];
        PageCompositor::new(&mut doc)
            .merge(1, page_id, std::slice::from_ref(&overlay))
            .unwrap();
        geometries.push(page_geometry(&doc, page_id).unwrap());
    }

    assert_eq!(geometries[0], geometries[1]);
    assert_eq!(geometries[0].media_box, Rect::new(0.0, 0.0, 612.0, 792.0));
    assert_eq!(geometries[0].rotation, 270);
}

#[test]
fn test_end_to_end_centered_link() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");
    write_document(&input, &[FixturePage::letter()]);

    let config = WatermarkConfig::centered_link("site.example", URL);
    let report = watermark_document(&input, &output, &config).unwrap();
    assert_eq!(report.pages, 1);
    assert_eq!(report.links_added, "site.example".len());
    assert_eq!(report.links_dropped, 0);

    let doc = Document::load(&output).unwrap();
    let page_id = page_ids(&doc)[0];
    assert_eq!(shown_strings(&doc, page_id), vec!["Hello original page 1".to_string()]);

    let metadata = document_metadata(&doc).unwrap();
    assert_eq!(metadata.page_count, 1);
    assert_eq!(metadata.pages[0].link_uris.len(), 12);
    assert!(metadata.pages[0].link_uris.iter().all(|uri| uri == URL));

    let page_box = Rect::new(0.0, 0.0, 612.0, 792.0);
    for rect in annotation_rects(&doc, page_id) {
        assert!(rect.area() > 0.0);
        assert!(page_box.contains(&rect), "link {:?} outside the page", rect);
    }
}

#[test]
fn test_offset_media_box_links_stay_inside() {
    let mut doc = make_document(&[FixturePage { media_box: [100, 50, 712, 842], ..FixturePage::letter() }]);
    let page_id = page_ids(&doc)[0];

    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::centered_link("AB", URL)).unwrap();
    PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]).unwrap();

    let page_box = Rect::new(100.0, 50.0, 712.0, 842.0);
    let rects = annotation_rects(&doc, page_id);
    assert_eq!(rects.len(), 2);
    for rect in rects {
        assert!(page_box.contains(&rect));
        // Centered text sits near the middle of the shifted box
        assert!(rect.x0 > 300.0 && rect.x1 < 520.0);
    }
}

#[test]
fn test_off_page_glyph_regions_are_dropped() {
    let mut doc = make_document(&[FixturePage::letter()]);
    let page_id = page_ids(&doc)[0];

    let mut config = WatermarkConfig::centered_link("WWWWWWWWWW", URL);
    config.font_size_primary = 150.0;
    config.rotation_degrees = 0.0;
    let overlay = build_overlay(612.0, 792.0, &config).unwrap();
    assert_eq!(overlay.regions.len(), 10);

    let outcome = PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]).unwrap();
    // 10 glyphs of 141.6pt: the outer ones fall entirely off the page
    assert!(outcome.links_dropped > 0);
    assert_eq!(outcome.links_added + outcome.links_dropped, 10);

    let page_box = Rect::new(0.0, 0.0, 612.0, 792.0);
    let rects = annotation_rects(&doc, page_id);
    assert_eq!(rects.len(), outcome.links_added);
    assert!(rects.iter().all(|r| page_box.contains(r) && r.area() > 0.0));
}

#[test]
fn test_tiled_with_url_adds_one_label_link() {
    let mut doc = make_document(&[FixturePage::letter()]);
    let page_id = page_ids(&doc)[0];

    let mut config = WatermarkConfig::tiled("DRAFT");
    config.link_url = Some(URL.to_string());
    let overlays = build_overlays(612.0, 792.0, &config).unwrap();

    let outcome = PageCompositor::new(&mut doc).merge(1, page_id, &overlays).unwrap();
    assert_eq!(outcome.links_added, 1);
    assert_eq!(operator_count(&doc, page_id, "Do"), 2);
}

#[test]
fn test_overlays_shared_between_pages() {
    let mut doc = make_document(&[FixturePage::letter(), FixturePage::letter()]);
    let ids = page_ids(&doc);
    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::tiled("DRAFT")).unwrap();

    let mut compositor = PageCompositor::new(&mut doc);
    for (i, id) in ids.iter().enumerate() {
        compositor.merge(i as u32 + 1, *id, std::slice::from_ref(&overlay)).unwrap();
    }

    let form_of = |id: ObjectId| {
        let resources = doc.get_dictionary(id).unwrap().get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        xobjects.get(b"Wm0").unwrap().as_reference().unwrap()
    };
    assert_eq!(form_of(ids[0]), form_of(ids[1]));

    // Inherited font resource is still visible to the original content
    let resources = doc.get_dictionary(ids[0]).unwrap().get(b"Resources").unwrap().as_dict().unwrap();
    assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"F1"));
}

#[test]
fn test_mismatched_overlay_size_is_composition_failure() {
    let mut doc = make_document(&[FixturePage::letter()]);
    let page_id = page_ids(&doc)[0];
    let overlay = build_overlay(595.0, 842.0, &WatermarkConfig::tiled("DRAFT")).unwrap();

    let result = PageCompositor::new(&mut doc).merge(1, page_id, &[overlay]);
    assert!(matches!(result, Err(Error::Composition { page: 1, .. })));
}

#[test]
fn test_metadata_kept_and_stamped() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");
    write_document(&input, &[FixturePage::letter()]);

    watermark_document(&input, &output, &WatermarkConfig::tiled("DRAFT")).unwrap();

    let metadata = pdf_watermark::pdf::extract_metadata(&output).unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Quarterly Report"));
    assert_eq!(metadata.author.as_deref(), Some("Finance"));
    assert!(metadata.producer.unwrap().starts_with("pdf-watermark"));
}

#[test]
fn test_missing_media_box_leaves_no_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("broken.pdf");
    let output = temp_dir.path().join("output.pdf");

    let mut doc = make_document(&[FixturePage::letter(), FixturePage::letter()]);
    let second = page_ids(&doc)[1];
    doc.get_object_mut(second).unwrap().as_dict_mut().unwrap().remove(b"MediaBox");
    doc.save(&input).unwrap();

    let result = watermark_document(&input, &output, &WatermarkConfig::tiled("DRAFT"));
    assert!(matches!(result, Err(Error::Composition { page: 2, .. })), "got {:?}", result);
    assert!(!output.exists());
}

#[test]
fn test_corrupt_input_leaves_no_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("corrupt.pdf");
    let output = temp_dir.path().join("output.pdf");
    std::fs::write(&input, b"this is not a pdf").unwrap();

    let result = watermark_document(&input, &output, &WatermarkConfig::tiled("DRAFT"));
    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn test_unwritable_output_is_persist_failure() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("no-such-dir").join("output.pdf");
    write_document(&input, &[FixturePage::letter()]);

    let result = watermark_document(&input, &output, &WatermarkConfig::tiled("DRAFT"));
    assert!(matches!(result, Err(Error::Persist { .. })));
    assert!(!output.exists());
}

#[test]
fn test_batch_mirrors_tree_and_isolates_failures() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input_dir = temp_dir.path().join("originals");
    let output_dir = temp_dir.path().join("watermarked");
    std::fs::create_dir_all(input_dir.join("2024/q1")).unwrap();

    write_document(&input_dir.join("summary.pdf"), &[FixturePage::letter()]);
    write_document(
        &input_dir.join("2024/q1/report.PDF"),
        &[FixturePage::letter(), FixturePage { media_box: [0, 0, 595, 842], ..FixturePage::letter() }],
    );
    std::fs::write(input_dir.join("2024/broken.pdf"), b"garbage").unwrap();

    let report = watermark_tree(&input_dir, &output_dir, &WatermarkConfig::tiled("CONFIDENTIAL")).unwrap();
    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_success());

    match &report.failed[0] {
        Error::Document { path, .. } => assert!(path.ends_with("2024/broken.pdf")),
        other => panic!("unexpected error {:?}", other),
    }

    let mirrored: PathBuf = output_dir.join("2024/q1/report.PDF");
    assert_eq!(count_pages(&mirrored).unwrap(), 2);
    assert_eq!(count_pages(&output_dir.join("summary.pdf")).unwrap(), 1);
    assert!(!output_dir.join("2024/broken.pdf").exists());
}

#[test]
fn test_batch_rejects_invalid_config_up_front() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = WatermarkConfig::tiled("DRAFT");
    config.color_primary.alpha = 2.0;

    let result = watermark_tree(temp_dir.path(), &temp_dir.path().join("out"), &config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_out_of_range_alpha_leaves_no_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    let output = temp_dir.path().join("output.pdf");
    write_document(&input, &[FixturePage::letter()]);

    let mut config = WatermarkConfig::tiled("DRAFT");
    config.color_primary.alpha = 7.5;

    let result = watermark_document(&input, &output, &config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))), "got {:?}", result);
    assert!(!output.exists());
}

#[test]
fn test_shared_annotation_array_keeps_links_per_page() {
    let mut doc = make_document(&[FixturePage::letter(), FixturePage::letter()]);
    let ids = page_ids(&doc);
    let shared = doc.add_object(Object::Array(Vec::new()));
    for id in &ids {
        doc.get_object_mut(*id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Annots", Object::Reference(shared));
    }

    let overlay = build_overlay(612.0, 792.0, &WatermarkConfig::centered_link("AB", URL)).unwrap();
    let mut compositor = PageCompositor::new(&mut doc);
    for (i, id) in ids.iter().enumerate() {
        let outcome = compositor.merge(i as u32 + 1, *id, std::slice::from_ref(&overlay)).unwrap();
        assert_eq!(outcome.links_added, 2);
    }

    let metadata = document_metadata(&doc).unwrap();
    assert_eq!(metadata.pages[0].link_uris.len(), 2);
    assert_eq!(metadata.pages[1].link_uris.len(), 2);
    assert!(doc.get_object(shared).unwrap().as_array().unwrap().is_empty());
}
