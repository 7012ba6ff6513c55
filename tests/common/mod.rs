//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use lopdf::{dictionary, Document, Object};
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness (RUST_LOG to adjust)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A minimal PDF with one page and a title
pub fn pdf(title: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
        "Producer" => Object::string_literal("evidence-lens tests"),
    });
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// An untagged PNG of the given size
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Phase 1 answer with one claim per file
pub fn extraction_answer(files: &[(&str, &str)]) -> String {
    let entries: Vec<serde_json::Value> = files
        .iter()
        .map(|(name, claim)| {
            serde_json::json!({
                "fileName": name,
                "category": "document",
                "claims": [{"statement": claim, "timestamp": "2025-03-05T08:42:15Z"}],
                "entities": ["Michael Chen"],
            })
        })
        .collect();
    format!(
        "```json\n{}\n```",
        serde_json::json!({ "files": entries })
    )
}

/// Phase 2 answer with one critical contradiction between two sources
pub fn reasoning_answer(source_a: &str, source_b: &str, verdict: &str) -> String {
    serde_json::json!({
        "timeline": [
            {"timestamp": "2025-03-15", "description": "Interview claim of first knowledge", "sources": [source_a], "confidence": "high"},
            {"timestamp": "2025-03-05T08:42:15Z", "description": "Strategic session", "sources": [source_b], "confidence": "very_high"}
        ],
        "contradictions": [{
            "id": "C1",
            "severity": "critical",
            "claim_a": {"statement": "First heard on March 15", "source": source_a, "credibility": "low"},
            "claim_b": {"statement": "Meeting on March 5", "source": source_b, "credibility": "high"},
            "analysis": "Prior meeting contradicts the interview",
            "verdict": "The record is more credible",
            "confidence": 0.97
        }],
        "confidenceScores": {"overall": 0.95, "metadata": 0.98, "content": 0.92},
        "verdict": verdict,
        "reasoning": "Step 1: Order the timestamps.\nStep 2: Compare the claims."
    })
    .to_string()
}
