//! Integration tests for UpdateSupervisor
//!
//! The update source is an httpmock server speaking the GitHub commit and
//! tarball endpoints; snapshots are built in memory.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use cardgate_update::{
    CheckOutcome, SupervisorExit, UpdateConfig, UpdateError, UpdateSupervisor, VersionMarker,
    VersionStore, install_snapshot,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use httpmock::prelude::*;
use serde_json::json;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;
use tokio::sync::watch;

const COMMITS_PATH: &str = "/repos/acme/gate/commits/main";

/// Build a gzipped tarball with every file under `top/`.
fn snapshot(top: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

    let mut dir = Header::new_gnu();
    dir.set_entry_type(EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder
        .append_data(&mut dir, format!("{top}/"), std::io::empty())
        .unwrap();

    for (path, data) in files {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, format!("{top}/{path}"), *data)
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Poorly compressible bytes, so a truncated archive cuts into file data.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

struct Fixture {
    server: MockServer,
    root: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: MockServer::start_async().await,
            root: TempDir::new().unwrap(),
        }
    }

    fn install_dir(&self) -> PathBuf {
        self.root.path().join("app")
    }

    fn store(&self) -> VersionStore {
        VersionStore::new(self.install_dir().join(".version"))
    }

    fn config(&self, check_interval: Duration) -> UpdateConfig {
        UpdateConfig {
            repository: "acme/gate".to_string(),
            branch: "main".to_string(),
            api_base: self.server.base_url().parse().unwrap(),
            install_dir: self.install_dir(),
            marker_path: self.install_dir().join(".version"),
            check_interval,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn supervisor(&self) -> UpdateSupervisor {
        UpdateSupervisor::new(self.config(Duration::from_secs(3600))).unwrap()
    }

    fn seed_marker(&self, marker: &str) {
        self.store()
            .store(&VersionMarker::new(marker).unwrap())
            .unwrap();
    }

    async fn serve_head(&self, sha: &str) -> httpmock::Mock<'_> {
        let body = json!({ "sha": sha, "commit": { "message": "release" } });
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(COMMITS_PATH);
                then.status(200).json_body(body);
            })
            .await
    }

    async fn serve_tarball(&self, sha: &str, bytes: Vec<u8>) -> httpmock::Mock<'_> {
        let path = format!("/repos/acme/gate/tarball/{sha}");
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .header("content-type", "application/x-gzip")
                    .body(bytes);
            })
            .await
    }
}

fn marker(value: &str) -> VersionMarker {
    VersionMarker::new(value).unwrap()
}

/// First run: no marker on disk, so the head is installed and persisted
#[tokio::test]
async fn test_first_run_installs_snapshot() {
    let fixture = Fixture::new().await;
    fixture.serve_head("bbb222").await;
    let tarball = fixture
        .serve_tarball(
            "bbb222",
            snapshot(
                "acme-gate-bbb222",
                &[("README.md", b"new readme\n"), ("src/app.py", b"print('v2')\n")],
            ),
        )
        .await;

    let mut supervisor = fixture.supervisor();
    assert!(supervisor.current().is_none());

    let outcome = supervisor.check_once().await.unwrap();

    assert_eq!(
        outcome,
        CheckOutcome::Updated {
            from: None,
            to: marker("bbb222"),
        }
    );
    tarball.assert_async().await;
    let app = fixture.install_dir();
    assert_eq!(fs::read_to_string(app.join("README.md")).unwrap(), "new readme\n");
    assert_eq!(fs::read_to_string(app.join("src/app.py")).unwrap(), "print('v2')\n");
    assert_eq!(fixture.store().load().unwrap(), Some(marker("bbb222")));
    assert_eq!(supervisor.current(), Some(&marker("bbb222")));
}

/// Matching markers: nothing is downloaded
#[tokio::test]
async fn test_up_to_date_skips_download() {
    let fixture = Fixture::new().await;
    fixture.seed_marker("aaa111");
    let head = fixture.serve_head("aaa111").await;
    let tarball = fixture.serve_tarball("aaa111", Vec::new()).await;

    let mut supervisor = fixture.supervisor();
    assert_eq!(supervisor.current(), Some(&marker("aaa111")));

    assert_eq!(supervisor.check_once().await.unwrap(), CheckOutcome::UpToDate);
    head.assert_async().await;
    tarball.assert_hits_async(0).await;
}

/// Existing files are overwritten in place; files absent from the snapshot stay
#[tokio::test]
async fn test_update_overwrites_installed_files() {
    let fixture = Fixture::new().await;
    let app = fixture.install_dir();
    fs::create_dir_all(app.join("src")).unwrap();
    fs::write(app.join("src/app.py"), "print('v1')\n").unwrap();
    fs::write(app.join("local.cfg"), "keep me\n").unwrap();
    fixture.seed_marker("aaa111");

    fixture.serve_head("bbb222").await;
    fixture
        .serve_tarball(
            "bbb222",
            snapshot("acme-gate-bbb222", &[("src/app.py", b"print('v2')\n")]),
        )
        .await;

    let outcome = fixture.supervisor().check_once().await.unwrap();

    assert_eq!(
        outcome,
        CheckOutcome::Updated {
            from: Some(marker("aaa111")),
            to: marker("bbb222"),
        }
    );
    assert_eq!(fs::read_to_string(app.join("src/app.py")).unwrap(), "print('v2')\n");
    assert_eq!(fs::read_to_string(app.join("local.cfg")).unwrap(), "keep me\n");
}

/// A download that breaks partway leaves the marker untouched, and the next
/// check starts over and succeeds. Which files were already replaced is not
/// asserted.
#[tokio::test]
async fn test_failed_install_keeps_marker_and_retries() {
    let fixture = Fixture::new().await;
    fixture.seed_marker("aaa111");
    fixture.serve_head("bbb222").await;

    let noise = noise(64 * 1024);
    let full = snapshot(
        "acme-gate-bbb222",
        &[("README.md", b"new readme\n"), ("data.bin", &noise)],
    );
    let truncated = full[..full.len() / 2].to_vec();
    let mut broken = fixture.serve_tarball("bbb222", truncated).await;

    let mut supervisor = fixture.supervisor();
    let result = supervisor.check_once().await;

    assert!(result.is_err(), "truncated snapshot installed: {result:?}");
    assert_eq!(fixture.store().load().unwrap(), Some(marker("aaa111")));
    assert_eq!(supervisor.current(), Some(&marker("aaa111")));

    broken.delete_async().await;
    fixture.serve_tarball("bbb222", full).await;

    let outcome = supervisor.check_once().await.unwrap();
    assert!(matches!(outcome, CheckOutcome::Updated { .. }));
    assert_eq!(
        fs::read(fixture.install_dir().join("data.bin")).unwrap(),
        noise
    );
    assert_eq!(fixture.store().load().unwrap(), Some(marker("bbb222")));
}

/// Source errors surface as errors, never as a changed marker
#[tokio::test]
async fn test_source_errors() {
    let fixture = Fixture::new().await;
    fixture.seed_marker("aaa111");
    let mut missing = fixture
        .server
        .mock_async(|when, then| {
            when.method(GET).path(COMMITS_PATH);
            then.status(404);
        })
        .await;

    let mut supervisor = fixture.supervisor();
    assert!(matches!(
        supervisor.check_once().await,
        Err(UpdateError::Status { status: 404, .. })
    ));

    missing.delete_async().await;
    fixture
        .server
        .mock_async(|when, then| {
            when.method(GET).path(COMMITS_PATH);
            then.status(200).body("not json");
        })
        .await;

    assert!(matches!(
        supervisor.check_once().await,
        Err(UpdateError::InvalidResponse(_))
    ));
    assert_eq!(supervisor.current(), Some(&marker("aaa111")));
}

/// An archive entry escaping the install directory is rejected
#[tokio::test]
async fn test_rejects_escaping_entry() {
    let fixture = Fixture::new().await;

    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = Header::new_old();
    let name = b"acme-gate-bbb222/../../escape.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_entry_type(EntryType::Regular);
    header.set_size(4);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &b"evil"[..]).unwrap();
    let bytes = builder.into_inner().unwrap().finish().unwrap();

    let result = install_snapshot(&bytes, &fixture.install_dir());

    assert!(matches!(result, Err(UpdateError::UnsafePath(_))));
    assert!(!fixture.root.path().join("escape.txt").exists());
    assert!(!fixture.install_dir().join("escape.txt").exists());
}

/// The supervisor checks immediately on start and asks for a restart once new
/// code is installed
#[tokio::test]
async fn test_run_requests_restart_after_update() {
    let fixture = Fixture::new().await;
    fixture.seed_marker("aaa111");
    fixture.serve_head("bbb222").await;
    fixture
        .serve_tarball("bbb222", snapshot("acme-gate-bbb222", &[("README.md", b"v2\n")]))
        .await;

    let (_stop_tx, stop_rx) = watch::channel(false);
    let exit = tokio::time::timeout(Duration::from_secs(5), fixture.supervisor().run(stop_rx))
        .await
        .expect("first check did not run immediately");

    assert_eq!(exit, SupervisorExit::Restart(marker("bbb222")));
}

/// With nothing to install the supervisor keeps polling until shutdown
#[tokio::test]
async fn test_run_polls_until_shutdown() {
    let fixture = Fixture::new().await;
    fixture.seed_marker("aaa111");
    let head = fixture.serve_head("aaa111").await;

    let supervisor = UpdateSupervisor::new(fixture.config(Duration::from_millis(50))).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(supervisor.run(stop_rx));

    tokio::time::sleep(Duration::from_millis(180)).await;
    stop_tx.send(true).unwrap();

    assert_eq!(task.await.unwrap(), SupervisorExit::Shutdown);
    assert!(head.hits_async().await >= 2);
}
