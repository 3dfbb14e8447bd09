//! End-to-end document lifecycle through the library services: upload,
//! report, edit, recheck, rewrite, versions, export and delete.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

use paracheck::app::App;
use paracheck::blob::{BlobStore, FsBlobStore};
use paracheck::config::Config;
use paracheck::export::ExportMode;
use paracheck::extract::extract_paragraphs;
use paracheck::generation::{DisabledGenerator, Generation, TextGenerator};
use paracheck::migrate::run_migrations;
use paracheck::models::{DocumentStatus, NewVersion, ParagraphEdit};
use paracheck::rewrite::RewriteRequest;
use paracheck::versions::VersionRepository;
use paracheck::PcError;

/// Prefixes the input so the rewritten text is recognisable.
struct PrefixGenerator;

#[async_trait]
impl TextGenerator for PrefixGenerator {
    fn model_name(&self) -> &str {
        "prefix"
    }

    async fn generate(&self, _system_prompt: &str, user_text: &str) -> paracheck::PcResult<Generation> {
        Ok(Generation {
            text: format!("Reworded: {}", user_text),
            tokens_used: 12,
        })
    }
}

fn test_config(tmp: &TempDir) -> Config {
    toml::from_str(&format!(
        r#"[db]
path = "{root}/data/paracheck.sqlite"

[storage]
root = "{root}/data/uploads"
"#,
        root = tmp.path().display()
    ))
    .unwrap()
}

async fn setup_with(tmp: &TempDir, generator: Arc<dyn TextGenerator>) -> App {
    let config = test_config(tmp);
    run_migrations(&config).await.unwrap();
    App::with_generator(&config, generator).await.unwrap()
}

async fn setup(tmp: &TempDir) -> App {
    setup_with(tmp, Arc::new(PrefixGenerator)).await
}

fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| {
            if p.is_empty() {
                "<w:p/>".to_string()
            } else {
                format!(
                    "<w:p><w:pPr><w:pStyle w:val=\"Body\"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>{}</w:t></w:r></w:p>",
                    p
                )
            }
        })
        .collect();
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("word/document.xml", options).unwrap();
        write!(
            zip,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        )
        .unwrap();
        zip.start_file("word/styles.xml", options).unwrap();
        zip.write_all(b"<w:styles/>").unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

async fn row_count(app: &App, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(app.store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn exact_duplicates_score_one_hundred() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    let result = app
        .documents
        .upload(
            1,
            "dup.txt",
            b"The quick brown fox jumps.\n\nThe quick brown fox jumps.\n",
        )
        .await
        .unwrap();

    assert_eq!(result.paragraphs.len(), 2);
    assert_eq!(result.paragraphs[0].similarity, 100.0);
    assert_eq!(result.paragraphs[1].similarity, 100.0);
    assert_eq!(result.overall_similarity, 100.0);

    let report = app.documents.report(result.document_id).await.unwrap();
    assert_eq!(report.document.status, DocumentStatus::Checked);
    assert_eq!(report.high_risk.len(), 2);
    assert_eq!(
        report.paragraphs[0].similar_source.as_deref(),
        Some("paragraph:1")
    );
}

#[tokio::test]
async fn unrelated_random_strings_stay_below_high_duplication() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let texts: Vec<String> = (0..3)
        .map(|_| (0..16).map(|_| rng.gen_range(b'a'..=b'z') as char).collect())
        .collect();
    let body = texts.join("\n\n");

    let result = app
        .documents
        .upload(1, "random.txt", body.as_bytes())
        .await
        .unwrap();
    assert_eq!(result.paragraphs.len(), 3);
    assert!(result.overall_similarity < 90.0);
    for p in &result.paragraphs {
        assert!(p.similarity < 90.0, "paragraph {} scored {}", p.index, p.similarity);
    }
}

#[tokio::test]
async fn single_paragraph_document_scores_zero() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    let result = app
        .documents
        .upload(1, "one.md", b"Only one paragraph here.")
        .await
        .unwrap();
    assert_eq!(result.paragraphs[0].similarity, 0.0);
    assert_eq!(result.overall_similarity, 0.0);
}

#[tokio::test]
async fn versions_for_document_seven_number_one_two_three() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    sqlx::query(
        "INSERT INTO documents (id, owner_id, title, storage_locator, content_hash, status, \
         overall_similarity, created_at, updated_at) \
         VALUES (7, 1, 'seven.txt', 'x.txt', 'h', 'CHECKED', 0, 0, 0)",
    )
    .execute(app.store.pool())
    .await
    .unwrap();

    let mut numbers = Vec::new();
    for n in 1..=3 {
        let version = app
            .save_version(&NewVersion {
                document_id: 7,
                style: Some("FLUENCY".to_string()),
                content: format!("draft {}", n),
                remark: None,
                created_by: 1,
            })
            .await
            .unwrap();
        numbers.push(version.version_no);
    }
    assert_eq!(numbers, vec![1, 2, 3]);

    let listed: Vec<i64> = app
        .versions
        .list_versions(7)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_no)
        .collect();
    assert_eq!(listed, vec![3, 2, 1]);
    assert_eq!(app.store.max_version_no(7).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_number_densely() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    // Every save may lose the race to all the others.
    config.versions.max_save_attempts = 16;
    run_migrations(&config).await.unwrap();
    let app = Arc::new(
        App::with_generator(&config, Arc::new(PrefixGenerator))
            .await
            .unwrap(),
    );
    let doc = app
        .documents
        .upload(1, "race.txt", b"one\n\ntwo")
        .await
        .unwrap();

    const SAVES: usize = 8;
    let mut handles = Vec::new();
    for n in 0..SAVES {
        let app = app.clone();
        let document_id = doc.document_id;
        handles.push(tokio::spawn(async move {
            app.save_version(&NewVersion {
                document_id,
                style: None,
                content: format!("concurrent draft {}", n),
                remark: None,
                created_by: n as i64,
            })
            .await
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap().version_no);
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=SAVES as i64).collect::<Vec<_>>());
    assert_eq!(
        app.versions.list_versions(doc.document_id).await.unwrap().len(),
        SAVES
    );
}

#[tokio::test]
async fn saved_versions_never_change() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    let doc = app
        .documents
        .upload(1, "a.txt", b"alpha paragraph\n\nbeta paragraph")
        .await
        .unwrap();

    let first = app
        .save_version(&NewVersion {
            document_id: doc.document_id,
            style: None,
            content: "snapshot one".to_string(),
            remark: Some("before edits".to_string()),
            created_by: 1,
        })
        .await
        .unwrap();

    app.documents
        .update_paragraphs(
            1,
            doc.document_id,
            &[ParagraphEdit {
                index: 0,
                text: "gamma paragraph".to_string(),
            }],
        )
        .await
        .unwrap();
    app.documents.recheck(1, doc.document_id).await.unwrap();
    app.save_version(&NewVersion {
        document_id: doc.document_id,
        style: None,
        content: "snapshot two".to_string(),
        remark: None,
        created_by: 1,
    })
    .await
    .unwrap();

    assert_eq!(app.versions.get_version(first.id).await.unwrap(), first);
}

#[tokio::test]
async fn failed_paragraph_persist_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    sqlx::query(
        "CREATE TRIGGER fail_paragraphs BEFORE INSERT ON paragraphs \
         BEGIN SELECT RAISE(ABORT, 'simulated failure'); END",
    )
    .execute(app.store.pool())
    .await
    .unwrap();

    let err = app
        .documents
        .upload(1, "doomed.txt", b"first\n\nsecond")
        .await
        .unwrap_err();
    assert!(matches!(err, PcError::Database(_)));
    assert_eq!(row_count(&app, "documents").await, 0);
    assert_eq!(row_count(&app, "paragraphs").await, 0);

    // The stored upload is cleaned up as well.
    let uploads = tmp.path().join("data").join("uploads");
    let leftover = std::fs::read_dir(&uploads)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn invalid_uploads_are_rejected_without_rows() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    assert!(matches!(
        app.documents.upload(1, "empty.txt", b"").await,
        Err(PcError::Validation(_))
    ));
    assert!(matches!(
        app.documents.upload(1, "old.doc", b"binary").await,
        Err(PcError::Validation(_))
    ));
    assert!(matches!(
        app.documents.upload(1, "blank.txt", b" \n\n \n").await,
        Err(PcError::Parse(_))
    ));
    assert_eq!(row_count(&app, "documents").await, 0);
}

#[tokio::test]
async fn docx_export_reflects_edits_and_keeps_formatting() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    let original = docx(&["First paragraph text", "", "Second paragraph text"]);
    let doc = app
        .documents
        .upload(2, "paper.docx", &original)
        .await
        .unwrap();
    assert_eq!(doc.paragraphs.len(), 2);
    assert!(doc.storage_locator.ends_with(".docx"));

    app.documents
        .update_paragraphs(
            2,
            doc.document_id,
            &[ParagraphEdit {
                index: 1,
                text: "Second paragraph, rewritten".to_string(),
            }],
        )
        .await
        .unwrap();

    let exported = app.documents.export(2, doc.document_id).await.unwrap();
    assert_eq!(exported.mode, ExportMode::InPlace);
    assert_eq!(exported.filename, "paper.docx");
    assert_eq!(
        extract_paragraphs(&exported.bytes, "paper.docx").unwrap(),
        vec!["First paragraph text", "Second paragraph, rewritten"]
    );

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(exported.bytes.as_slice())).unwrap();
    assert!(archive.by_name("word/styles.xml").is_ok());
    let mut xml = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("word/document.xml").unwrap(), &mut xml)
        .unwrap();
    assert!(xml.contains("<w:pStyle w:val=\"Body\"/>"));
    assert!(xml.contains("<w:b/>"));
}

#[tokio::test]
async fn export_falls_back_when_original_is_gone() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;

    let doc = app
        .documents
        .upload(2, "paper.docx", &docx(&["one", "two"]))
        .await
        .unwrap();
    FsBlobStore::new(tmp.path().join("data").join("uploads"))
        .remove(&doc.storage_locator)
        .await
        .unwrap();

    let exported = app.documents.export(2, doc.document_id).await.unwrap();
    assert_eq!(exported.mode, ExportMode::Fresh);
    assert_eq!(
        extract_paragraphs(&exported.bytes, "paper.docx").unwrap(),
        vec!["one", "two"]
    );

    let log = app.audit.list_for_document(doc.document_id).await.unwrap();
    assert!(log.iter().any(|e| e.operation_type == "DOWNLOAD"));
}

#[tokio::test]
async fn rewrite_records_sensitive_hits_and_moves_status() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    app.words.add_word("forbidden", None, None).await.unwrap();

    let doc = app
        .documents
        .upload(4, "notes.txt", b"A forbidden topic.\n\nSomething else entirely.")
        .await
        .unwrap();

    let result = app
        .rewriter
        .rewrite(
            4,
            &RewriteRequest {
                document_id: Some(doc.document_id),
                paragraph_id: None,
                text: "A Forbidden topic.".to_string(),
                style: Some("academic".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.rewritten_text, "Reworded: A Forbidden topic.");
    assert_eq!(result.style.as_deref(), Some("academic"));
    assert_eq!(result.tokens_used, 12);

    let log = app.audit.list_for_document(doc.document_id).await.unwrap();
    let upload = log
        .iter()
        .find(|e| e.operation_type == "UPLOAD_AND_CHECK")
        .unwrap();
    assert!(upload.detail.contains("notes.txt"));
    assert!(upload.detail.contains("sensitive hits 1"));
    let rewrite = log.iter().find(|e| e.operation_type == "REWRITE").unwrap();
    assert_eq!(rewrite.user_id, 4);
    assert!(rewrite.detail.contains("sensitive=forbidden"));

    let report = app.documents.report(doc.document_id).await.unwrap();
    assert_eq!(report.document.status, DocumentStatus::Rewriting);
}

#[tokio::test]
async fn generator_failure_leaves_document_untouched() {
    let tmp = TempDir::new().unwrap();
    let app = setup_with(&tmp, Arc::new(DisabledGenerator)).await;
    let doc = app
        .documents
        .upload(1, "a.txt", b"some text")
        .await
        .unwrap();

    let err = app
        .rewriter
        .rewrite(
            1,
            &RewriteRequest {
                document_id: Some(doc.document_id),
                paragraph_id: None,
                text: "some text".to_string(),
                style: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PcError::ExternalService(_)));

    let report = app.documents.report(doc.document_id).await.unwrap();
    assert_eq!(report.document.status, DocumentStatus::Checked);
    let log = app.audit.list_for_document(doc.document_id).await.unwrap();
    assert!(log.iter().all(|e| e.operation_type != "REWRITE"));
}

#[tokio::test]
async fn blank_edits_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    let doc = app.documents.upload(1, "a.txt", b"x y z").await.unwrap();
    let err = app
        .documents
        .update_paragraphs(
            1,
            doc.document_id,
            &[ParagraphEdit {
                index: 0,
                text: "  ".to_string(),
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PcError::Validation(_)));
    assert!(matches!(
        app.documents.update_paragraphs(1, 999, &[]).await,
        Err(PcError::NotFound { .. })
    ));
}

#[tokio::test]
async fn recheck_updates_scores_after_edit() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    let doc = app
        .documents
        .upload(
            1,
            "dup.txt",
            b"The quick brown fox jumps.\n\nThe quick brown fox jumps.",
        )
        .await
        .unwrap();
    assert_eq!(doc.overall_similarity, 100.0);

    app.documents
        .update_paragraphs(
            1,
            doc.document_id,
            &[ParagraphEdit {
                index: 1,
                text: "Completely unrelated sentence about databases.".to_string(),
            }],
        )
        .await
        .unwrap();
    // Edits alone do not rescore.
    let before = app.documents.report(doc.document_id).await.unwrap();
    assert_eq!(before.document.overall_similarity, 100.0);

    let after = app.documents.recheck(1, doc.document_id).await.unwrap();
    assert!(after.document.overall_similarity < 100.0);
    assert_eq!(after.document.status, DocumentStatus::Checked);
    let mean = after
        .paragraphs
        .iter()
        .map(|p| p.similarity.unwrap_or(0.0))
        .sum::<f64>()
        / after.paragraphs.len() as f64;
    assert!((after.document.overall_similarity - mean).abs() < 1e-9);
}

#[tokio::test]
async fn delete_removes_everything() {
    let tmp = TempDir::new().unwrap();
    let app = setup(&tmp).await;
    let doc = app
        .documents
        .upload(1, "gone.txt", b"one\n\ntwo")
        .await
        .unwrap();
    app.save_version(&NewVersion {
        document_id: doc.document_id,
        style: None,
        content: "v".to_string(),
        remark: None,
        created_by: 1,
    })
    .await
    .unwrap();

    app.documents.delete(1, doc.document_id).await.unwrap();
    assert_eq!(row_count(&app, "documents").await, 0);
    assert_eq!(row_count(&app, "paragraphs").await, 0);
    assert_eq!(row_count(&app, "rewrite_versions").await, 0);

    let blobs = FsBlobStore::new(tmp.path().join("data").join("uploads"));
    assert_eq!(blobs.load(&doc.storage_locator).await.unwrap(), None);

    assert!(matches!(
        app.documents.delete(1, doc.document_id).await,
        Err(PcError::NotFound { .. })
    ));
}
