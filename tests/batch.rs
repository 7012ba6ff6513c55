//! Batch Processing Integration Tests
//!
//! Real files on disk through validation, metadata extraction and encoding.

mod common;

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{TimeZone, Utc};
use evidence_lens::domain::{Category, EvidenceInput, FileStatus};
use evidence_lens::error::FileErrorKind;
use evidence_lens::ingest::{EvidenceBatchProcessor, FileLimits, FileValidator};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn case_files(dir: &Path) -> Vec<EvidenceInput> {
    vec![
        EvidenceInput::from_path(write(dir, "minutes.pdf", &common::pdf("Board minutes")), "application/pdf"),
        EvidenceInput::from_path(write(dir, "access_log.png", &common::png(320, 200)), "image/png"),
        // Declared type missing: the extension identifies the document
        EvidenceInput::from_path(write(dir, "statement.pdf", &common::pdf("Brokerage statement")), "")
            .with_last_modified(Utc.with_ymd_and_hms(2025, 3, 6, 9, 0, 0).unwrap()),
    ]
}

#[tokio::test]
async fn test_files_on_disk_are_processed() {
    common::init_tracing();
    let temp = TempDir::new().unwrap();

    let result = EvidenceBatchProcessor::default()
        .process(case_files(temp.path()))
        .await;

    assert!(result.success);
    assert_eq!(result.failed_files, 0);
    assert!(result.errors.is_empty());

    let minutes = &result.files[0];
    assert_eq!(minutes.category, Category::Document);
    assert!(minutes.metadata_extracted);
    assert_eq!(minutes.metadata["title"], "Board minutes");
    assert_eq!(minutes.metadata["pageCount"], 1);
    assert!(minutes.sha256.as_deref().unwrap().starts_with("sha256:"));

    let log = &result.files[1];
    assert_eq!(log.category, Category::Image);
    assert_eq!(log.metadata["width"], 320);
    assert_eq!(log.metadata["height"], 200);
    assert!(log.metadata["make"].is_null());

    let statement = &result.files[2];
    assert_eq!(statement.category, Category::Document);
    let content = statement.content.as_ref().unwrap();
    assert_eq!(content.mime_type, "application/pdf");
    let decoded = BASE64.decode(&content.data).unwrap();
    assert_eq!(decoded.len() as u64, statement.size);
    assert!(decoded.starts_with(b"%PDF"));

    let payload = result.payload();
    assert_eq!(payload.len(), 3);
    assert_eq!(payload.metadata[2].last_modified, statement.last_modified);

    let summary = result.summary();
    assert_eq!(summary.categories[&Category::Document], 2);
    assert_eq!(summary.categories[&Category::Image], 1);
    assert_eq!(summary.metadata_percentage, 100.0);
}

#[tokio::test]
async fn test_processing_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let mut files = case_files(temp.path());
    files.push(EvidenceInput::from_bytes("notes.txt", "text/plain", b"hello".to_vec()));

    let processor = EvidenceBatchProcessor::default();
    let first = processor.process(files.clone()).await;
    let second = processor.process(files).await;

    let status = |r: &evidence_lens::BatchResult| -> Vec<(String, FileStatus)> {
        r.files.iter().map(|f| (f.file_name.clone(), f.status)).collect()
    };
    assert_eq!(status(&first), status(&second));
    assert_eq!(
        first.files.iter().map(|f| f.sha256.clone()).collect::<Vec<_>>(),
        second.files.iter().map(|f| f.sha256.clone()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_unsupported_type_never_extracted() {
    let files = vec![
        EvidenceInput::from_bytes("minutes.pdf", "application/pdf", common::pdf("x")),
        EvidenceInput::from_bytes("archive.zip", "application/zip", b"PK\x03\x04".to_vec()),
    ];

    let result = EvidenceBatchProcessor::default().process(files).await;

    assert!(!result.success);
    assert_eq!(result.failed_files, 1);
    let zip = &result.files[1];
    assert_eq!(zip.status, FileStatus::Failed);
    assert!(zip.metadata.is_empty());
    assert!(!zip.metadata_extracted);
    assert!(zip.content.is_none());
    assert_eq!(zip.error.as_ref().unwrap().kind, FileErrorKind::Validation);

    let incomplete = result.incomplete_error().unwrap();
    assert_eq!(incomplete.total, 2);
    assert_eq!(incomplete.errors[0].file_name, "archive.zip");
}

#[tokio::test]
async fn test_missing_file_is_encoding_failure() {
    let temp = TempDir::new().unwrap();
    let files = vec![
        EvidenceInput::from_path(temp.path().join("gone.pdf"), "application/pdf"),
        EvidenceInput::from_bytes("minutes.pdf", "application/pdf", common::pdf("x")),
    ];

    let result = EvidenceBatchProcessor::default().process(files).await;

    assert_eq!(result.failed_files, 1);
    assert_eq!(result.errors[0].file_name, "gone.pdf");
    assert_eq!(result.errors[0].kind, FileErrorKind::Encoding);
    assert!(result.files[1].is_ok());
}

#[tokio::test]
async fn test_custom_limits() {
    let limits = FileLimits {
        max_file_bytes: 1024,
        max_total_bytes: 4096,
        min_files: 2,
    };
    let processor = EvidenceBatchProcessor::new(limits);
    assert_eq!(processor.validator().limits().max_file_bytes, 1024);

    let files = vec![
        EvidenceInput::from_bytes("a.mp3", "audio/mpeg", vec![1u8; 512]),
        EvidenceInput::from_bytes("b.mp3", "audio/mpeg", vec![1u8; 2048]),
    ];
    let result = processor.process(files).await;

    // The unreadable audio header does not fail the small file
    assert!(result.files[0].is_ok());
    assert!(!result.files[0].metadata_extracted);
    assert!(result.files[0].metadata_error.is_some());
    assert_eq!(result.files[1].error.as_ref().unwrap().kind, FileErrorKind::Validation);
    assert!(result.errors[0].message.contains("b.mp3"));

    assert_eq!(FileValidator::new(limits).limits(), &limits);
}

/// A named pipe whose content shows up only once a writer opens it
#[cfg(unix)]
fn fifo(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let status = std::process::Command::new("mkfifo").arg(&path).status().unwrap();
    assert!(status.success());
    path
}

#[cfg(unix)]
fn feed(path: &Path, bytes: &[u8]) {
    use std::io::Write;
    let mut pipe = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    pipe.write_all(bytes).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_blocked_file_does_not_hold_up_siblings() {
    let temp = TempDir::new().unwrap();
    let first = fifo(temp.path(), "first.pdf");
    let second = fifo(temp.path(), "second.pdf");

    // The first file's content arrives only after the second has been
    // read, so the batch finishes only if both are read at the same time
    let writer = {
        let (first, second) = (first.clone(), second.clone());
        std::thread::spawn(move || {
            feed(&second, &common::pdf("Second"));
            feed(&first, &common::pdf("First"));
        })
    };

    let files = vec![
        EvidenceInput::from_path(&first, "application/pdf"),
        EvidenceInput::from_path(&second, "application/pdf"),
    ];
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        EvidenceBatchProcessor::default().process(files),
    )
    .await;

    let Ok(result) = outcome else {
        // Release the blocked read before failing
        feed(&first, b"");
        panic!("files were processed one after another");
    };
    writer.join().unwrap();

    assert!(result.success);
    assert_eq!(result.files[0].metadata["title"], "First");
    assert_eq!(result.files[1].metadata["title"], "Second");
}

#[cfg(unix)]
#[tokio::test]
async fn test_size_rechecked_after_reading() {
    let temp = TempDir::new().unwrap();
    // A pipe reports size 0 until its content is read
    let growing = fifo(temp.path(), "growing.pdf");
    let writer = {
        let growing = growing.clone();
        std::thread::spawn(move || feed(&growing, &[b'%'; 8192]))
    };

    let processor = EvidenceBatchProcessor::new(FileLimits {
        max_file_bytes: 2048,
        max_total_bytes: 16384,
        min_files: 2,
    });
    let result = processor
        .process(vec![
            EvidenceInput::from_path(&growing, "application/pdf"),
            EvidenceInput::from_bytes("ok.pdf", "application/pdf", common::pdf("ok")),
        ])
        .await;
    writer.join().unwrap();

    let rejected = &result.files[0];
    assert_eq!(rejected.status, FileStatus::Failed);
    assert_eq!(rejected.size, 8192);
    assert!(rejected.content.is_none());
    assert_eq!(rejected.error.as_ref().unwrap().kind, FileErrorKind::Validation);
    assert!(result.files[1].is_ok());
}
