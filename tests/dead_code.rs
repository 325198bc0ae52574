use std::path::Path;
use std::process::Command;

fn sample_repo(root: &Path) {
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::write(
        root.join("app/main.py"),
        "from app import pipeline\n\ndef main():\n    pipeline.run_pipeline({})\n\nif __name__ == \"__main__\":\n    main()\n",
    )
    .unwrap();
    std::fs::write(
        root.join("app/pipeline.py"),
        "def run_pipeline(config):\n    save(config)\n\ndef save(data):\n    pass\n\ndef orphan():\n    pass\n",
    )
    .unwrap();
}

fn sightline(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sightline"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn dead_code_runs_without_an_embedding_provider() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());

    let output = sightline(dir.path(), &["dead-code", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = json["deadCode"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["name"].as_str())
        .collect();
    assert_eq!(names, vec!["orphan"]);
    // Nothing was written to the working tree.
    assert!(!dir.path().join(".sightline").exists());
}

#[test]
fn calls_reports_unknown_chunk() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());

    let output = sightline(dir.path(), &["calls", "app/pipeline.py#missing@python"]);
    assert!(!output.status.success());

    let output = sightline(dir.path(), &["calls", "app/pipeline.py#save@python", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["reachability"]["status"], "reachable");
    assert_eq!(json["callers"].as_array().unwrap().len(), 1);
}
