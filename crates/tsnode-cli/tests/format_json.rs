//! Integration tests for `tsnode format --json`.

use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "tsnode-cli", "--bin", "tsnode", "--"]);
    cmd
}

fn format_json(root: &std::path::Path, extra: &[&str], file: &str) -> serde_json::Value {
    let output = cargo_bin()
        .args(["--json", "--cwd"])
        .arg(root)
        .args(extra)
        .args(["format", file])
        .output()
        .expect("Failed to run format command");

    assert!(
        output.status.success(),
        "Command should succeed. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON")
}

#[test]
fn test_module_types_override_in_module_package() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("package.json"), r#"{"type": "module"}"#).unwrap();
    std::fs::create_dir_all(root.join("vendor")).unwrap();
    std::fs::write(root.join("vendor/legacy.js"), "module.exports = 1;").unwrap();
    std::fs::write(root.join("app.js"), "export default 1;").unwrap();
    let config = root.join("tsnode.json");
    std::fs::write(&config, r#"{"moduleTypes": {"vendor/**": "cjs"}}"#).unwrap();
    let config = config.display().to_string();
    let extra = ["--allow-js", "--config", config.as_str()];

    let json = format_json(&root, &extra, "vendor/legacy.js");
    assert_eq!(json["format"], "commonjs");
    assert_eq!(json["moduleType"], "cjs");
    assert_eq!(json["ignored"], false);

    let json = format_json(&root, &extra, "app.js");
    assert_eq!(json["format"], "module");
    assert_eq!(json["moduleType"], "package");
}

#[test]
fn test_ts_format_follows_package_type() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("package.json"), r#"{"type": "module"}"#).unwrap();
    std::fs::write(root.join("a.ts"), "").unwrap();
    std::fs::write(root.join("b.cts"), "").unwrap();

    assert_eq!(format_json(&root, &[], "a.ts")["format"], "module");
    assert_eq!(format_json(&root, &[], "b.cts")["format"], "commonjs");
}

#[test]
fn test_ignored_ts_fails_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("node_modules/dep")).unwrap();
    std::fs::write(root.join("node_modules/dep/index.ts"), "").unwrap();

    let output = cargo_bin()
        .arg("--cwd")
        .arg(&root)
        .args(["format", "node_modules/dep/index.ts"])
        .output()
        .expect("Failed to run format command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERR_UNKNOWN_FILE_EXTENSION"), "stderr: {stderr}");
    assert!(stderr.contains("skipIgnore"), "stderr: {stderr}");
}
