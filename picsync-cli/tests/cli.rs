use std::fs;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn picsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("picsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn");
    cmd
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("addr")
        .port()
}

/// A `picsync serve` child process, killed on drop.
struct Daemon {
    child: Child,
    addr: String,
}

impl Daemon {
    fn start(home: &Path) -> Self {
        let port = free_port();
        let child = picsync_cmd(home)
            .args(["serve", "--host", "127.0.0.1", "--port", &port.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        let addr = format!("127.0.0.1:{port}");

        let deadline = Instant::now() + Duration::from_secs(10);
        while TcpStream::connect(&addr).is_err() {
            assert!(Instant::now() < deadline, "daemon never started listening");
            sleep(Duration::from_millis(50));
        }
        Self { child, addr }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn status_on_fresh_home_reports_no_records() {
    let home = TempDir::new().expect("home");
    picsync_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("no record"))
        .stdout(contains("server_progress.json"));
}

#[test]
fn status_json_reports_stale_daemon_checkpoint() {
    let home = TempDir::new().expect("home");
    let dir = home.path().join(".picsync");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(
        dir.join("server_progress.json"),
        r#"{"last_send_time": "2020-01-01 00:00:00"}"#,
    )
    .expect("write checkpoint");
    fs::write(dir.join("sync_progress.json"), "{broken").expect("write checkpoint");

    let output = picsync_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["daemon"]["state"], "ok");
    assert_eq!(report["daemon"]["last_activity"], "2020-01-01 00:00:00");
    assert_eq!(report["daemon"]["would_restart"], true);
    assert_eq!(report["sync"]["state"], "unreadable");
    assert_eq!(report["sync"]["would_restart"], false);
}

#[test]
fn serve_then_fetch_round_trips_a_file() {
    let home = TempDir::new().expect("home");
    let served = TempDir::new().expect("served");
    let dest = TempDir::new().expect("dest");
    let source = served.path().join("GROSS_0042.jpg");
    fs::write(&source, b"\xff\xd8jpeg bytes\xff\xd9").expect("write source");

    let daemon = Daemon::start(home.path());
    picsync_cmd(home.path())
        .args(["fetch", source.to_str().unwrap(), "--server", &daemon.addr, "--dest"])
        .arg(dest.path())
        .assert()
        .success()
        .stdout(contains("GROSS_0042.jpg"));

    assert_eq!(
        fs::read(dest.path().join("GROSS_0042.jpg")).expect("fetched"),
        b"\xff\xd8jpeg bytes\xff\xd9"
    );

    let checkpoint = home.path().join(".picsync").join("server_progress.json");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !checkpoint.exists() {
        assert!(Instant::now() < deadline, "daemon never wrote its checkpoint");
        sleep(Duration::from_millis(50));
    }
}

#[test]
fn fetch_of_missing_path_fails_without_creating_files() {
    let home = TempDir::new().expect("home");
    let dest = TempDir::new().expect("dest");
    let daemon = Daemon::start(home.path());

    picsync_cmd(home.path())
        .args(["fetch", "/definitely/not/here.jpg", "--server", &daemon.addr, "--dest"])
        .arg(dest.path())
        .assert()
        .failure()
        .stderr(contains("not found: /definitely/not/here.jpg"));

    assert_eq!(fs::read_dir(dest.path()).expect("read dest").count(), 0);
}

#[test]
fn sync_once_mirrors_item_paths() {
    let home = TempDir::new().expect("home");
    let served = TempDir::new().expect("served");
    let work = TempDir::new().expect("work");
    let mirror = TempDir::new().expect("mirror");

    let tare = served.path().join("TARE_7.jpg");
    fs::write(&tare, b"tare").expect("write source");
    let items = work.path().join("items.json");
    fs::write(
        &items,
        serde_json::json!([
            {"id": "7", "order_time": "2025-11-01 08:00:00", "paths": [tare.to_str().unwrap()]}
        ])
        .to_string(),
    )
    .expect("write items");

    let daemon = Daemon::start(home.path());
    picsync_cmd(home.path())
        .args(["sync", "--once", "--server", &daemon.addr, "--items"])
        .arg(&items)
        .arg("--local-root")
        .arg(mirror.path())
        .assert()
        .success()
        .stdout(contains("1 items: 1 downloaded"));

    let sync_checkpoint = home.path().join(".picsync").join("sync_progress.json");
    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(sync_checkpoint).expect("checkpoint"))
            .expect("json");
    assert_eq!(saved["last_task_id"], "7");
}

#[test]
fn sync_without_items_source_is_an_error() {
    let home = TempDir::new().expect("home");
    picsync_cmd(home.path())
        .args(["sync", "--once"])
        .assert()
        .failure()
        .stderr(contains("no work-item source configured"));
}

#[test]
fn serve_on_a_busy_port_exits_non_zero() {
    let home = TempDir::new().expect("home");
    let busy = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = busy.local_addr().expect("addr").port().to_string();

    picsync_cmd(home.path())
        .args(["serve", "--host", "127.0.0.1", "--port", &port])
        .assert()
        .failure()
        .stderr(contains("bind"));
}

#[test]
fn explicit_missing_config_is_rejected() {
    let home = TempDir::new().expect("home");
    picsync_cmd(home.path())
        .args(["--config", "/no/such/config.yaml", "status"])
        .assert()
        .failure()
        .stderr(contains("settings file not found"));
}
