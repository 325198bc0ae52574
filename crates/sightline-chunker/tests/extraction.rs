//! Integration tests: walk → extract on temporary repositories and on this
//! crate's own sources.

use std::fs;
use std::path::{Path, PathBuf};

use sightline_chunker::{all_chunks, extract_repo, MODULE_SYMBOL};
use sightline_core::{CallForm, CancelSignal, ChunkKind, IndexConfig};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "app/main.py",
        r#"from app import pipeline

def main():
    config = load_config()
    pipeline.run_pipeline(config)

def load_config():
    return {}

if __name__ == "__main__":
    main()
"#,
    );
    write(
        root,
        "app/pipeline.py",
        r#"def run_pipeline(config):
    data = fetch_data(config)
    save_data(transform_data(data))

def fetch_data(config):
    return []

def transform_data(data):
    return data

def save_data(data):
    pass
"#,
    );
    write(
        root,
        "cmd/server/main.go",
        "package main\n\nfunc main() {\n\tserve()\n}\n\nfunc serve() {}\n",
    );
    write(root, "Legacy.kt", "fun legacy() = 1\n");
    write(root, "node_modules/lib/index.js", "function vendored() {}\n");
    dir
}

#[test]
fn extracts_every_language_in_a_repo() {
    let dir = sample_repo();
    let output = extract_repo(dir.path(), &IndexConfig::default(), &CancelSignal::new()).unwrap();

    let paths: Vec<PathBuf> = output.files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("Legacy.kt"),
            PathBuf::from("app/main.py"),
            PathBuf::from("app/pipeline.py"),
            PathBuf::from("cmd/server/main.go"),
        ]
    );
    assert!(output.failures.is_empty());

    let chunks = all_chunks(&output);
    let names: Vec<&str> = chunks.iter().map(|c| c.chunk.name.as_str()).collect();
    for expected in ["main", "load_config", "run_pipeline", "fetch_data", "serve"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }

    let legacy = chunks
        .iter()
        .find(|c| c.chunk.file_path == Path::new("Legacy.kt"))
        .unwrap();
    assert!(legacy.flags.opaque);
    assert_eq!(legacy.chunk.kind, ChunkKind::File);

    let module = chunks
        .iter()
        .find(|c| c.chunk.symbol_path == MODULE_SYMBOL)
        .unwrap();
    assert_eq!(module.chunk.file_path, Path::new("app/main.py"));

    let main = chunks
        .iter()
        .find(|c| c.chunk.name == "main" && c.chunk.language == "python")
        .unwrap();
    let run = main.calls.iter().find(|c| c.name == "run_pipeline").unwrap();
    assert_eq!(run.form, CallForm::Member);
    assert_eq!(run.qualifier.as_deref(), Some("pipeline"));
}

#[test]
fn ids_are_stable_and_hashes_track_edits() {
    let dir = sample_repo();
    let config = IndexConfig::default();
    let cancel = CancelSignal::new();

    let before = all_chunks(&extract_repo(dir.path(), &config, &cancel).unwrap());
    let again = all_chunks(&extract_repo(dir.path(), &config, &cancel).unwrap());
    assert_eq!(before, again);

    // Edit the last function so no other span moves.
    let path = dir.path().join("app/pipeline.py");
    let edited = fs::read_to_string(&path)
        .unwrap()
        .replace("def save_data(data):\n    pass", "def save_data(data):\n    print(data)");
    fs::write(&path, edited).unwrap();

    let after = all_chunks(&extract_repo(dir.path(), &config, &cancel).unwrap());
    assert_eq!(before.len(), after.len());

    let changed: Vec<&str> = before
        .iter()
        .zip(&after)
        .filter(|(b, a)| {
            assert_eq!(b.chunk.id, a.chunk.id);
            b.chunk.content_hash != a.chunk.content_hash
        })
        .map(|(b, _)| b.chunk.name.as_str())
        .collect();
    assert_eq!(changed, vec!["save_data"]);
}

#[test]
fn parse_failures_do_not_abort_the_run() {
    let dir = sample_repo();
    write(dir.path(), "src/broken.rs", "fn broken( {\n");

    let output = extract_repo(dir.path(), &IndexConfig::default(), &CancelSignal::new()).unwrap();
    assert_eq!(output.failures.file_failures(), 1);
    assert_eq!(output.files.len(), 4);
}

#[test]
fn extracts_this_crate() {
    let crate_root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let output = extract_repo(crate_root, &IndexConfig::default(), &CancelSignal::new()).unwrap();

    let chunks = all_chunks(&output);
    let walk_repo = chunks
        .iter()
        .find(|c| c.chunk.name == "walk_repo")
        .expect("walk_repo should be extracted");
    assert_eq!(walk_repo.chunk.kind, ChunkKind::Function);
    assert_eq!(walk_repo.chunk.language, "rust");
    assert!(walk_repo
        .chunk
        .signature
        .as_deref()
        .is_some_and(|s| s.starts_with("pub fn walk_repo")));
}
