//! Offline end-to-end coverage of the ingestion and persistence pipeline:
//! extract, segment, persist, reload. Paths that need the embedding or
//! completion APIs are covered up to the point where a credential would be
//! required.

use std::sync::Arc;
use tempfile::TempDir;

use pagechat::chat;
use pagechat::config::Config;
use pagechat::extract;
use pagechat::segment;
use pagechat::session::SessionState;
use pagechat::store;

/// A minimal one-page PDF that yields `phrase` as extractable text.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let stream_content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", phrase);
    let mut pdf = String::new();
    pdf.push_str("%PDF-1.4\n");

    let mut offsets = Vec::new();
    let objects = [
        "1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_string(),
        "2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_string(),
        "3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>\nendobj\n"
            .to_string(),
        format!(
            "4 0 obj\n<< /Length {} >>\nstream\n{}\nendstream\nendobj\n",
            stream_content.len(),
            stream_content
        ),
        "5 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>\nendobj\n".to_string(),
    ];
    for obj in &objects {
        offsets.push(pdf.len());
        pdf.push_str(obj);
    }

    let xref_start = pdf.len();
    pdf.push_str("xref\n0 6\n0000000000 65535 f \n");
    for offset in &offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        xref_start
    ));
    pdf.into_bytes()
}

fn config_with_dir(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    config
}

#[test]
fn extract_then_segment_yields_page_records() {
    let pdf = minimal_pdf_with_phrase("the quarterly report covers revenue");
    let config = Config::default();

    let extracted = extract::extract_pdf(&pdf).expect("extraction failed");
    assert!(extracted.text.contains("quarterly report"));
    assert_eq!(extracted.page_count, 1);

    let pages = segment::segment(&extracted.text, extracted.page_count, &config.segmenter);
    assert_eq!(pages.len(), 1);
    assert!(pages[0].contains("quarterly report"));
}

#[test]
fn persisted_pages_survive_a_round_trip() {
    let tmp = TempDir::new().unwrap();
    let records = vec![
        store::PageRecord {
            page: 1,
            text: "first page".into(),
        },
        store::PageRecord {
            page: 2,
            text: "second page".into(),
        },
    ];
    store::save_pages(tmp.path(), &records).unwrap();
    store::save_document(tmp.path(), "first page second page").unwrap();

    let loaded = store::load_pages(tmp.path()).unwrap().unwrap();
    assert_eq!(loaded, records);
    let doc = store::load_document(tmp.path()).unwrap().unwrap();
    assert!(doc.contains("second page"));
}

#[test]
fn multi_page_text_with_form_feeds_segments_to_declared_count() {
    let config = Config::default();
    let text = "alpha section\u{0C}beta section\u{0C}gamma section";
    let pages = segment::segment(text, 3, &config.segmenter);
    assert_eq!(pages.len(), 3);
    assert!(pages[0].contains("alpha"));
    assert!(pages[2].contains("gamma"));
}

#[tokio::test]
async fn chat_without_an_uploaded_document_reports_not_found() {
    let tmp = TempDir::new().unwrap();
    let config = config_with_dir(tmp.path());
    let session = Arc::new(SessionState::new(&config.memory));

    let err = chat::stream_chat_turn(&config, session, "what is this about?")
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(err.to_string().contains("Vector store not found"));
}

#[test]
fn chat_events_serialize_as_ndjson_lines() {
    let events = [
        chat::ChatEvent::Sources { sources: vec![] },
        chat::ChatEvent::MessageStart,
        chat::ChatEvent::MessageChunk {
            content: "partial".into(),
        },
        chat::ChatEvent::MessageEnd,
    ];
    let ndjson: String = events
        .iter()
        .map(|e| serde_json::to_string(e).unwrap() + "\n")
        .collect();

    let lines: Vec<&str> = ndjson.lines().collect();
    assert_eq!(lines.len(), 4);
    for line in &lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("type").is_some());
    }
    assert!(lines[0].contains(r#""type":"sources""#));
    assert!(lines[3].contains(r#""type":"message_end""#));
}
