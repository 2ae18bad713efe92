//! Builders for document fixtures and test configurations.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use docprofile::config::EngineConfig;
use docprofile::ProfileData;

/// Builds a PDF with one line of text per page.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for line in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

/// Builds a minimal DOCX with one paragraph per entry.
pub fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .expect("start docx entry");
    writer
        .write_all(document.as_bytes())
        .expect("write docx entry");
    writer.finish().expect("finish docx").into_inner()
}

/// A resume long enough to produce several chunks with the default chunker.
pub fn sample_resume() -> String {
    let mut text = String::from("Jane Doe\nSenior Rust Engineer\n\n");
    for i in 0..12 {
        text.push_str(&format!(
            "Project {}: built asynchronous services in Rust with Tokio, SQLite \
             and tracing, owning design reviews and on-call rotations.\n",
            i
        ));
    }
    text
}

/// The profile returned by the default fake extractor.
pub fn sample_profile() -> ProfileData {
    ProfileData {
        skills: vec!["Rust".to_string(), "Tokio".to_string()],
        summary: "Backend engineer focused on Rust services".to_string(),
        strengths: vec!["Systems design".to_string()],
        ..ProfileData::default()
    }
}

/// Engine config with short timeouts for tests.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.pool_size = 2;
    config.timeouts.extraction_ms = 5_000;
    config.timeouts.embedding_call_ms = 5_000;
    config.timeouts.embedding_deadline_ms = 10_000;
    config.timeouts.analysis_ms = 5_000;
    config.timeouts.vector_store_ms = 5_000;
    config
}
