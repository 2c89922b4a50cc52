use filetime::{set_file_mtime, FileTime};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const IDENTICAL: &str = "Deployed app is identical to proposed version";
const CHANGES: &str = "The following reflects the proposed changes to your app";

struct Fixture {
    app: TempDir,
    state: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            app: TempDir::new().expect("app dir"),
            state: TempDir::new().expect("state dir"),
        }
    }

    fn write_asset(&self, rel: &str, content: &str) {
        let path = self.app.path().join("hosting/files").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
    }

    fn write_metadata(&self, value: Value) {
        fs::write(
            self.app.path().join("hosting/metadata.json"),
            serde_json::to_string(&value).unwrap(),
        )
        .unwrap();
    }

    fn write_remote(&self, apps: Value) -> String {
        let path = self.state.path().join("remote.json");
        fs::write(&path, serde_json::to_string(&json!({ "apps": apps })).unwrap()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn cache_dir(&self) -> String {
        self.state.path().join("cache").to_str().unwrap().to_string()
    }

    fn run(&self, args: &[&str]) -> Output {
        let exe = env!("CARGO_BIN_EXE_hostdiff");
        let config_dir = self.state.path().join("config");
        Command::new(exe)
            .args(args)
            .env("XDG_CONFIG_HOME", &config_dir)
            .env("XDG_CACHE_HOME", self.state.path().join("xdg-cache"))
            .env("APPDATA", &config_dir)
            .env("LOCALAPPDATA", &config_dir)
            .env("HOME", &config_dir)
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run hostdiff")
    }

    fn diff(&self, remote: &str, extra: &[&str]) -> Output {
        let local = self.app.path().to_str().unwrap().to_string();
        let cache_dir = self.cache_dir();
        let mut args = vec![
            "diff",
            "--local",
            local.as_str(),
            "--remote",
            remote,
            "--cache-dir",
            cache_dir.as_str(),
        ];
        args.extend_from_slice(extra);
        self.run(&args)
    }
}

fn hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

fn asset(path: &str, content: &str) -> Value {
    json!({ "path": path, "size": content.len(), "hash": hash(content) })
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8(output.stdout.clone())
        .expect("stdout not utf-8")
        .lines()
        .map(str::to_string)
        .collect()
}

fn assert_exit(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "unexpected exit status\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn diff_reports_identical_app() {
    let fixture = Fixture::new();
    fixture.write_asset("index.html", "<html></html>");
    fixture.write_asset("js/app.js", "main()");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/index.html", "<html></html>"), asset("/js/app.js", "main()")]
    }]));

    let output = fixture.diff(&remote, &[]);
    assert_exit(&output, 0);
    assert_eq!(stdout_lines(&output), vec![IDENTICAL]);
}

#[test]
fn diff_lists_proposed_changes() {
    let fixture = Fixture::new();
    fixture.write_asset("index.html", "<html></html>");
    fixture.write_asset("new.js", "fresh()");
    fixture.write_asset("style.css", "body{}");
    fixture.write_metadata(json!([
        { "path": "/style.css", "attrs": [{ "name": "Content-Type", "value": "text/html" }] }
    ]));

    let mut style = asset("/style.css", "body{}");
    style["attrs"] = json!([{ "name": "Content-Type", "value": "text/css" }]);
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/index.html", "<html></html>"), asset("/old.js", "stale()"), style]
    }]));

    let output = fixture.diff(&remote, &["--app", "app-1", "--group", "g1"]);
    assert_exit(&output, 0);
    assert_eq!(
        stdout_lines(&output),
        vec![
            CHANGES,
            "+ new.js",
            "- old.js",
            "~ style.css",
            "    Content-Type: text/css -> text/html",
        ]
    );
}

#[test]
fn diff_json_lines() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    fixture.write_asset("b.txt", "beta");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/a.txt", "alpha"), asset("/c.txt", "gamma")]
    }]));

    let output = fixture.diff(&remote, &["--json", "--all"]);
    assert_exit(&output, 0);

    let rows: Vec<Value> = stdout_lines(&output)
        .iter()
        .map(|line| serde_json::from_str(line).expect("invalid json line"))
        .collect();
    let summary: Vec<(&str, &str)> = rows
        .iter()
        .map(|row| (row["path"].as_str().unwrap(), row["category"].as_str().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![("a.txt", "unchanged"), ("b.txt", "added"), ("c.txt", "removed")]
    );
    assert_eq!(rows[1]["local_fingerprint"], hash("beta"));
}

#[test]
fn cache_persists_between_runs() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    fixture.write_asset("b.txt", "beta");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/a.txt", "alpha"), asset("/b.txt", "beta")]
    }]));

    assert_exit(&fixture.diff(&remote, &[]), 0);
    let second = fixture.diff(&remote, &[]);
    assert_exit(&second, 0);
    assert_eq!(stdout_lines(&second), vec![IDENTICAL]);

    let cache_dir = fixture.cache_dir();
    let info = fixture.run(&["cache", "info", "--cache-dir", cache_dir.as_str(), "--json"]);
    assert_exit(&info, 0);
    let info: Value = serde_json::from_slice(&info.stdout).expect("invalid json");
    assert_eq!(info["exists"], true);
    assert_eq!(info["scopes"], json!([{ "app": "app-1", "entries": 2 }]));
    assert!(info["cache_file"]
        .as_str()
        .unwrap()
        .ends_with("hosting_assets.bin"));

    let clear = fixture.run(&["cache", "clear", "--cache-dir", cache_dir.as_str()]);
    assert_exit(&clear, 0);

    let info = fixture.run(&["cache", "info", "--cache-dir", cache_dir.as_str(), "--json"]);
    let info: Value = serde_json::from_slice(&info.stdout).expect("invalid json");
    assert_eq!(info["scopes"], json!([]));

    // An empty cache only costs time
    let third = fixture.diff(&remote, &[]);
    assert_exit(&third, 0);
    assert_eq!(stdout_lines(&third), vec![IDENTICAL]);
}

#[test]
fn profiles_use_separate_cache_files() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/a.txt", "alpha")]
    }]));

    assert_exit(&fixture.diff(&remote, &["--profile", "staging"]), 0);
    assert!(Path::new(&fixture.cache_dir())
        .join("staging/hosting_assets.bin")
        .exists());
    assert!(!Path::new(&fixture.cache_dir())
        .join("default/hosting_assets.bin")
        .exists());

    assert_exit(&fixture.diff(&remote, &["--profile", "../escape"]), 1);
}

#[test]
fn missing_hosting_directory_fails() {
    let fixture = Fixture::new();
    let remote = fixture.write_remote(json!([{ "group_id": "g1", "app_id": "app-1" }]));

    let output = fixture.diff(&remote, &[]);
    assert_exit(&output, 1);
    assert!(stdout_lines(&output).is_empty());
}

#[test]
fn malformed_remote_asset_fails() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [{ "path": "/../etc/passwd", "size": 1, "hash": hash("x") }]
    }]));

    let output = fixture.diff(&remote, &[]);
    assert_exit(&output, 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Malformed remote asset"));
}

#[test]
fn ambiguous_app_requires_flag() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    let remote = fixture.write_remote(json!([
        { "group_id": "g1", "app_id": "app-1", "hosting_assets": [asset("/a.txt", "alpha")] },
        { "group_id": "g1", "app_id": "app-2", "hosting_assets": [] }
    ]));

    let output = fixture.diff(&remote, &[]);
    assert_exit(&output, 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("--app"));

    let output = fixture.diff(&remote, &["--app", "app-2"]);
    assert_exit(&output, 0);
    assert_eq!(stdout_lines(&output), vec![CHANGES, "+ a.txt"]);
}

#[test]
fn unknown_app_is_reported() {
    let fixture = Fixture::new();
    fixture.write_asset("a.txt", "alpha");
    let remote = fixture.write_remote(json!([{ "group_id": "g1", "app_id": "app-1" }]));

    let output = fixture.diff(&remote, &["--app", "nope"]);
    assert_exit(&output, 1);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Remote service error"));
}

#[test]
fn exclude_patterns_hide_files() {
    let fixture = Fixture::new();
    fixture.write_asset("app.js", "main()");
    fixture.write_asset("app.js.map", "{}");
    fixture.write_asset("drafts/wip.html", "<p>");
    let remote = fixture.write_remote(json!([{
        "group_id": "g1",
        "app_id": "app-1",
        "hosting_assets": [asset("/app.js", "main()")]
    }]));

    let output = fixture.diff(&remote, &["--exclude", "*.map", "--exclude", "drafts/"]);
    assert_exit(&output, 0);
    assert_eq!(stdout_lines(&output), vec![IDENTICAL]);
}

#[test]
fn config_creates_default_file() {
    let fixture = Fixture::new();

    let output = fixture.run(&["config"]);
    assert_exit(&output, 0);
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    let path = Path::new(&lines[0]);
    assert!(path.ends_with("hostdiff.toml"));
    assert!(path.exists());

    let written = fs::read_to_string(path).unwrap();
    assert!(written.contains("profile = \"default\""));

    // An existing file is left alone
    fs::write(path, "profile = \"staging\"\n").unwrap();
    assert_exit(&fixture.run(&["config"]), 0);
    assert_eq!(fs::read_to_string(path).unwrap(), "profile = \"staging\"\n");
}

#[test]
fn help_lists_subcommands() {
    let output = assert_cmd::Command::cargo_bin("hostdiff")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    assert!(help.contains("diff"));
    assert!(help.contains("cache"));
    assert!(help.contains("config"));
}
