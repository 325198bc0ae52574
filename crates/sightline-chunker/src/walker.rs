use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sightline_core::{content_hash, IndexConfig, SightlineError};
use tracing::debug;

/// Number of bytes to check for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// A source file discovered during repository walking.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use sightline_chunker::walker::{Language, SourceFile};
///
/// let file = SourceFile::new(PathBuf::from("src/main.rs"), Language::Rust, "fn main() {}");
/// assert_eq!(file.language, Language::Rust);
/// assert_eq!(file.hash.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Detected programming language.
    pub language: Language,
    /// Full file content.
    pub content: String,
    /// SHA-256 of `content`, for incremental indexing.
    pub hash: String,
}

impl SourceFile {
    pub fn new(path: PathBuf, language: Language, content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = content_hash(&content);
        Self {
            path,
            language,
            content,
            hash,
        }
    }
}

/// Programming language detected from file extension.
///
/// Languages without a tree-sitter grammar here are still indexed through the
/// line-based fallback adapter.
///
/// # Examples
///
/// ```
/// use sightline_chunker::walker::Language;
///
/// assert_eq!(Language::from_extension("rs"), Language::Rust);
/// assert_eq!(Language::from_extension("tsx"), Language::Tsx);
/// assert_eq!(Language::from_extension("kt"), Language::Kotlin);
/// assert_eq!(Language::from_extension("txt"), Language::Unknown);
/// assert_eq!(Language::Tsx.as_str(), "typescript");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Php,
    Kotlin,
    Swift,
    CSharp,
    Scala,
    Unknown,
}

impl Language {
    /// Every detectable language, in declaration order.
    pub const ALL: &'static [Language] = &[
        Language::Rust,
        Language::Python,
        Language::TypeScript,
        Language::Tsx,
        Language::JavaScript,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Ruby,
        Language::Php,
        Language::Kotlin,
        Language::Swift,
        Language::CSharp,
        Language::Scala,
    ];

    /// Detect language from a file extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "cs" => Language::CSharp,
            "scala" | "sc" => Language::Scala,
            _ => Language::Unknown,
        }
    }

    /// Language tag stored on chunks. TSX shares the TypeScript tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::TypeScript | Language::Tsx => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::CSharp => "csharp",
            Language::Scala => "scala",
            Language::Unknown => "unknown",
        }
    }

    /// Get the tree-sitter language grammar for this language.
    ///
    /// Returns `None` for languages handled by the fallback adapter.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Kotlin
            | Language::Swift
            | Language::CSharp
            | Language::Scala
            | Language::Unknown => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filters applied while walking a repository.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    max_file_size: u64,
}

impl WalkOptions {
    /// Build walk options from the `[index]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] for an invalid glob.
    pub fn from_config(config: &IndexConfig) -> Result<Self, SightlineError> {
        Ok(Self {
            include: compile_globs(&config.include)?,
            exclude: compile_globs(&config.exclude)?,
            max_file_size: config.max_file_size,
        })
    }

    fn accepts(&self, relative: &Path) -> bool {
        let opts = glob::MatchOptions::new();
        if self.exclude.iter().any(|p| p.matches_path_with(relative, opts)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches_path_with(relative, opts))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>, SightlineError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| SightlineError::Config(format!("invalid glob pattern '{p}': {e}")))
        })
        .collect()
}

/// Walk a repository, respecting `.gitignore`, returning indexable source files.
///
/// Skips binary files, files over the configured size, files with unknown
/// extensions, and paths rejected by the include/exclude globs. Returned
/// paths are relative to `root` and sorted.
///
/// # Errors
///
/// Returns [`SightlineError::FileNotFound`] if `root` does not exist.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use sightline_chunker::walker::{walk_repo, WalkOptions};
/// use sightline_core::IndexConfig;
///
/// let options = WalkOptions::from_config(&IndexConfig::default()).unwrap();
/// let files = walk_repo(Path::new("."), &options).unwrap();
/// for f in &files {
///     println!("{}: {}", f.path.display(), f.language);
/// }
/// ```
pub fn walk_repo(root: &Path, options: &WalkOptions) -> Result<Vec<SourceFile>, SightlineError> {
    if !root.exists() {
        return Err(SightlineError::FileNotFound(root.to_path_buf()));
    }
    let max_file_size = if options.max_file_size == 0 {
        u64::MAX
    } else {
        options.max_file_size
    };

    let walker = ignore::WalkBuilder::new(root).build();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        if !options.accepts(&relative) {
            continue;
        }

        let Ok(metadata) = std::fs::metadata(path) else {
            continue;
        };
        if metadata.len() > max_file_size {
            debug!(file = %relative.display(), size = metadata.len(), "skipping large file");
            continue;
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let language = Language::from_extension(ext);
        if language == Language::Unknown {
            continue;
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };

        // Null bytes in the first 8KB mean binary.
        let check_len = content.len().min(BINARY_CHECK_SIZE);
        if content.as_bytes()[..check_len].contains(&0) {
            continue;
        }

        files.push(SourceFile::new(relative, language, content));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options() -> WalkOptions {
        WalkOptions::from_config(&IndexConfig::default()).unwrap()
    }

    fn make_temp_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("src/lib.py"), "def hello(): pass").unwrap();
        fs::write(root.join("src/app.ts"), "function run() {}").unwrap();
        fs::write(root.join("src/util.js"), "const x = 1;").unwrap();
        fs::write(root.join("src/main.go"), "package main").unwrap();
        fs::write(root.join("src/Main.kt"), "fun main() {}").unwrap();
        fs::write(root.join("README.md"), "# Hello").unwrap();

        dir
    }

    #[test]
    fn walk_finds_known_language_files_sorted() {
        let dir = make_temp_repo();
        let files = walk_repo(dir.path(), &options()).unwrap();

        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(files.len(), 6);
        assert!(files.iter().any(|f| f.language == Language::Kotlin));
    }

    #[test]
    fn walk_respects_gitignore() {
        let dir = make_temp_repo();
        let root = dir.path();

        // The ignore crate needs a .git dir to recognize .gitignore files
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("build/output.rs"), "fn ignored() {}").unwrap();
        fs::write(root.join(".gitignore"), "build/\n").unwrap();

        let files = walk_repo(root, &options()).unwrap();
        assert!(files.iter().all(|f| !f.path.starts_with("build")));
    }

    #[test]
    fn walk_skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut binary_content = b"fn main() { ".to_vec();
        binary_content.push(0);
        binary_content.extend_from_slice(b" }");
        fs::write(root.join("binary.rs"), &binary_content).unwrap();
        fs::write(root.join("normal.rs"), "fn normal() {}").unwrap();

        let files = walk_repo(root, &options()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("normal.rs"));
    }

    #[test]
    fn walk_honors_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("huge.rs"), "x".repeat(2_000)).unwrap();
        fs::write(root.join("ok.rs"), "fn ok() {}").unwrap();

        let config = IndexConfig {
            max_file_size: 1_000,
            ..IndexConfig::default()
        };
        let files = walk_repo(root, &WalkOptions::from_config(&config).unwrap()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("ok.rs"));
    }

    #[test]
    fn walk_applies_include_and_exclude_globs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/gen")).unwrap();
        fs::create_dir_all(root.join("scripts")).unwrap();
        fs::write(root.join("src/a.rs"), "fn a() {}").unwrap();
        fs::write(root.join("src/gen/b.rs"), "fn b() {}").unwrap();
        fs::write(root.join("scripts/c.py"), "def c(): pass").unwrap();

        let config = IndexConfig {
            include: vec!["src/**".into()],
            exclude: vec!["src/gen/**".into()],
            ..IndexConfig::default()
        };
        let files = walk_repo(root, &WalkOptions::from_config(&config).unwrap()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("src/a.rs"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let result = walk_repo(Path::new("/definitely/not/here"), &options());
        assert!(matches!(result, Err(SightlineError::FileNotFound(_))));
    }
}
