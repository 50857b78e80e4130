use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn wait_for_service(base_url: &str, timeout: Duration) -> bool {
    let client = reqwest::blocking::Client::new();
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if client.get(format!("{base_url}/status")).send().is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}

fn write_seed(dir: &TempDir) -> std::path::PathBuf {
    let seed = serde_json::json!([
        {
            "path": "/content/foo",
            "resource_type": "nt:unstructured",
            "properties": {
                "sling:alias": ["f"],
                "sling:vanityPath": ["special"],
                "sling:redirect": true,
                "sling:redirectStatus": 302
            },
            "children": [],
            "synthetic": false
        },
        {
            "path": "/content/foo/bar",
            "resource_type": "nt:unstructured",
            "properties": {},
            "children": [],
            "synthetic": false
        }
    ]);
    let path = dir.path().join("seed.json");
    std::fs::write(&path, serde_json::to_string_pretty(&seed).unwrap()).unwrap();
    path
}

struct TestService {
    _process: std::process::Child,
    base_url: String,
}

impl TestService {
    fn start() -> (Self, TempDir) {
        let tmp = TempDir::new().unwrap();
        let seed_path = write_seed(&tmp);
        let port = free_port();
        let base_url = format!("http://127.0.0.1:{port}");

        let process = Command::new(env!("CARGO_BIN_EXE_rmap-service"))
            .args(["--port", &port.to_string(), "--seed"])
            .arg(&seed_path)
            .spawn()
            .expect("failed to start rmap-service");

        assert!(wait_for_service(&base_url, Duration::from_secs(5)), "service failed to start");
        (Self { _process: process, base_url }, tmp)
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self._process.kill().ok();
    }
}

#[test]
fn resolve_returns_real_resource() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp: serde_json::Value = client
        .post(format!("{}/resolve", svc.base_url))
        .json(&serde_json::json!({ "path": "/content/foo" }))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(resp["kind"], "resource");
    assert_eq!(resp["resource"]["path"], "/content/foo");
}

#[test]
fn resolve_follows_vanity_path_redirect() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp: serde_json::Value = client
        .post(format!("{}/resolve", svc.base_url))
        .json(&serde_json::json!({ "path": "/special" }))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(resp["kind"], "redirect");
    assert_eq!(resp["status"], 302);
    assert_eq!(resp["location"], "/content/foo.html");
}

#[test]
fn resolve_missing_path_is_not_found() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp: serde_json::Value = client
        .post(format!("{}/resolve", svc.base_url))
        .json(&serde_json::json!({ "path": "/nowhere" }))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(resp["kind"], "not_found");
}

#[test]
fn map_prefers_alias_over_canonical_path() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp: serde_json::Value = client
        .post(format!("{}/map", svc.base_url))
        .json(&serde_json::json!({ "resource_path": "/content/foo", "all": true }))
        .send()
        .unwrap()
        .json()
        .unwrap();

    let mappings: Vec<&str> = resp["mappings"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
    assert!(mappings.contains(&"/content/foo"));
    assert!(mappings.contains(&"/content/f"));
}

#[test]
fn status_reports_one_mounted_provider() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp: serde_json::Value =
        client.get(format!("{}/status", svc.base_url)).send().unwrap().json().unwrap();

    assert_eq!(resp["mounted_providers"], 1);
    assert_eq!(resp["state"], "Warm");
}

#[test]
fn metrics_endpoint_serves_counters() {
    let (svc, _tmp) = TestService::start();
    let client = reqwest::blocking::Client::new();

    let resp = client.get(format!("{}/metrics", svc.base_url)).send().unwrap();
    assert!(resp.status().is_success());
}
