//! End-to-end batch tests against a canned HTTP stub standing in for the
//! Civitai API.

use civisync_core::{
    BatchOrchestrator, CivitaiClient, ImagePolicy, MissingRegistry, Mode, NoopRenderer,
    ProcessedLedger, RunConfig, RunOutcome, Source,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const VERSION_BODY: &str = r#"{"id": 7, "modelId": 42, "name": "v1",
    "updatedAt": "2024-03-01T00:00:00.000Z", "baseModel": "SDXL 1.0", "images": []}"#;
const MODEL_BODY: &str = r#"{"id": 42, "name": "Example", "type": "LORA", "nsfw": false}"#;

/// Minimal one-request-per-connection HTTP responder. `version_status`
/// controls the by-hash lookup; model lookups always succeed.
async fn spawn_stub_api(version_status: u16) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut total = 0;
                loop {
                    match socket.read(&mut buf[total..]).await {
                        Ok(0) => break,
                        Ok(n) => {
                            total += n;
                            if buf[..total].windows(4).any(|w| w == b"\r\n\r\n")
                                || total == buf.len()
                            {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }

                let request = String::from_utf8_lossy(&buf[..total]);
                let path = request.split_whitespace().nth(1).unwrap_or("/");
                let (status_line, body) = if path.contains("/model-versions/by-hash/") {
                    if version_status == 200 {
                        ("HTTP/1.1 200 OK", VERSION_BODY)
                    } else {
                        ("HTTP/1.1 404 Not Found", r#"{"error": "not found"}"#)
                    }
                } else if path.contains("/models/") {
                    ("HTTP/1.1 200 OK", MODEL_BODY)
                } else {
                    ("HTTP/1.1 404 Not Found", "")
                };

                let response = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Container file with a valid header carrying a hash hint.
fn write_hinted_container(path: &Path, digest_fill: char) {
    let digest: String = std::iter::repeat(digest_fill).take(64).collect();
    let header = format!(
        r#"{{"__metadata__": {{"modelspec.hash_sha256": "0x{}"}}, "w": {{"dtype": "F16"}}}}"#,
        digest
    );
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(b"tensor payload");
    std::fs::write(path, bytes).unwrap();
}

/// File with no parseable header; identity falls back to a full-file hash.
fn write_garbage_container(path: &Path, payload: &[u8]) {
    std::fs::write(path, payload).unwrap();
}

struct Fixture {
    _root: TempDir,
    source_dir: PathBuf,
    output_root: PathBuf,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let source_dir = root.path().join("models");
    let output_root = root.path().join("out");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::create_dir_all(&output_root).unwrap();
    Fixture {
        _root: root,
        source_dir,
        output_root,
    }
}

fn config(fix: &Fixture, mode: Mode) -> RunConfig {
    let mut config = RunConfig::new(
        Source::Directory(fix.source_dir.clone()),
        &fix.output_root,
    );
    config.mode = mode;
    config.images = ImagePolicy::None;
    config.pacing.enabled = false;
    config
}

async fn run(fix: &Fixture, mode: Mode, base_url: &str) -> civisync_core::RunSummary {
    let client = CivitaiClient::with_base_url(base_url, None).unwrap();
    let orchestrator =
        BatchOrchestrator::with_client(config(fix, mode), client, NoopRenderer).unwrap();
    match orchestrator.run().await.unwrap() {
        RunOutcome::Batch(summary) => summary,
        RunOutcome::Clean(_) => panic!("expected a batch run"),
    }
}

#[tokio::test]
async fn full_run_persists_artifacts_and_ledger() {
    let fix = fixture();
    let base_url = spawn_stub_api(200).await;

    write_hinted_container(&fix.source_dir.join("hinted.safetensors"), 'a');
    write_garbage_container(&fix.source_dir.join("legacy.safetensors"), b"raw weights");

    let summary = run(&fix, Mode::Full, &base_url).await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 0);

    for stem in ["hinted", "legacy"] {
        let dir = fix.output_root.join(stem);
        assert!(dir.join(format!("{stem}_hash.json")).exists());
        assert!(dir.join(format!("{stem}_civitai_model_version.json")).exists());
        assert!(dir.join(format!("{stem}_civitai_model.json")).exists());
    }
    // Only the parseable header produced a metadata sidecar
    assert!(fix.output_root.join("hinted/hinted_metadata.json").exists());
    assert!(!fix.output_root.join("legacy/legacy_metadata.json").exists());

    // The hint was used verbatim as the content identity
    let hash_json =
        std::fs::read_to_string(fix.output_root.join("hinted/hinted_hash.json")).unwrap();
    assert!(hash_json.contains(&"a".repeat(64)));

    let ledger = ProcessedLedger::load(&fix.output_root).unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.last_update().is_some());
    assert!(!fix.output_root.join("missing_from_civitai.txt").exists());
}

#[tokio::test]
async fn unchanged_remote_record_short_circuits() {
    let fix = fixture();
    let base_url = spawn_stub_api(200).await;
    write_hinted_container(&fix.source_dir.join("model.safetensors"), 'b');

    let first = run(&fix, Mode::Full, &base_url).await;
    assert_eq!(first.processed, 1);

    // Same updatedAt from the stub: nothing to re-persist
    let second = run(&fix, Mode::Full, &base_url).await;
    assert_eq!(second.processed, 0);
    assert_eq!(second.up_to_date, 1);
    assert_eq!(second.failed, 0);
}

#[tokio::test]
async fn only_new_appends_exactly_the_new_files() {
    let fix = fixture();
    let base_url = spawn_stub_api(200).await;

    for name in ["a", "b", "c", "d", "e"] {
        write_garbage_container(
            &fix.source_dir.join(format!("{name}.safetensors")),
            name.as_bytes(),
        );
    }

    // 3 of 5 already ledgered
    let mut ledger = ProcessedLedger::load(&fix.output_root).unwrap();
    for name in ["a", "b", "c"] {
        ledger.add_processed(&fix.source_dir.join(format!("{name}.safetensors")));
    }
    ledger.save().unwrap();

    let summary = run(&fix, Mode::OnlyNew, &base_url).await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.processed, 2);

    let ledger = ProcessedLedger::load(&fix.output_root).unwrap();
    assert_eq!(ledger.len(), 5);
    assert!(ledger.is_processed(&fix.source_dir.join("d.safetensors")));
    assert!(ledger.is_processed(&fix.source_dir.join("e.safetensors")));

    // Everything ledgered now: the next only-new workset is empty
    let summary = run(&fix, Mode::OnlyNew, &base_url).await;
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn unknown_files_are_recorded_as_missing() {
    let fix = fixture();
    let base_url = spawn_stub_api(404).await;
    write_garbage_container(&fix.source_dir.join("unknown.safetensors"), b"zzz");

    let summary = run(&fix, Mode::Full, &base_url).await;
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.processed, 0);

    let missing = MissingRegistry::load(&fix.output_root).unwrap();
    assert!(missing.contains("unknown.safetensors"));

    // Failed files are not ledgered; the next run picks them up again
    let ledger = ProcessedLedger::load(&fix.output_root).unwrap();
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn missing_record_is_cleared_once_resolved() {
    let fix = fixture();
    write_garbage_container(&fix.source_dir.join("flaky.safetensors"), b"qqq");

    let bad = spawn_stub_api(404).await;
    run(&fix, Mode::Full, &bad).await;
    assert!(fix.output_root.join("missing_from_civitai.txt").exists());

    let good = spawn_stub_api(200).await;
    let summary = run(&fix, Mode::Full, &good).await;
    assert_eq!(summary.processed, 1);
    assert!(!fix.output_root.join("missing_from_civitai.txt").exists());
}
