use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 of `content` as lowercase hex.
///
/// Used for file change detection and as the basis of chunk content hashes.
///
/// # Examples
///
/// ```
/// use sightline_core::content_hash;
///
/// assert_eq!(content_hash("abc"), content_hash("abc"));
/// assert_ne!(content_hash("abc"), content_hash("abd"));
/// assert_eq!(content_hash("").len(), 64);
/// ```
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable identifier of a chunk: file path, symbol path and language.
///
/// Rendered as `path#symbol@language`, e.g. `src/config.rs#Config::load@rust`.
/// Ordering is plain string ordering, which is what reachability uses for its
/// stable visitation order.
///
/// # Examples
///
/// ```
/// use sightline_core::ChunkId;
/// use std::path::Path;
///
/// let id = ChunkId::new(Path::new("src/config.rs"), "Config::load", "rust");
/// assert_eq!(id.as_str(), "src/config.rs#Config::load@rust");
/// assert!(ChunkId::from("a#x@go") < ChunkId::from("b#x@go"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(file_path: &Path, symbol_path: &str, language: &str) -> Self {
        let path = file_path.to_string_lossy().replace('\\', "/");
        Self(format!("{path}#{symbol_path}@{language}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChunkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Symbol path of the synthetic chunk holding a file's top-level statements.
pub const MODULE_SYMBOL: &str = "<module>";

/// What kind of code unit a chunk is.
///
/// # Examples
///
/// ```
/// use sightline_core::ChunkKind;
///
/// let kind: ChunkKind = "method".parse().unwrap();
/// assert_eq!(kind, ChunkKind::Method);
/// assert_eq!(ChunkKind::Class.to_string(), "class");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Free function.
    Function,
    /// Function owned by a class, struct, impl or module.
    Method,
    /// Class, struct, enum, trait or interface.
    Class,
    /// Module or top-level block of a script.
    Module,
    /// Line-based block produced when no grammar is available.
    Block,
    /// Whole small file produced when no grammar is available.
    File,
    /// Anything else worth indexing.
    Other,
}

impl ChunkKind {
    /// Whether this kind can be the target of a call.
    pub fn is_callable(self) -> bool {
        matches!(self, ChunkKind::Function | ChunkKind::Method)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Module => "module",
            ChunkKind::Block => "block",
            ChunkKind::File => "file",
            ChunkKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "function" | "fn" => Ok(ChunkKind::Function),
            "method" => Ok(ChunkKind::Method),
            "class" | "struct" | "enum" | "trait" | "interface" => Ok(ChunkKind::Class),
            "module" => Ok(ChunkKind::Module),
            "block" => Ok(ChunkKind::Block),
            "file" => Ok(ChunkKind::File),
            "other" => Ok(ChunkKind::Other),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

/// Declared visibility of a symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    #[default]
    Unknown,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Byte and line extent of a chunk. Lines are 1-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: u32,
    pub end_line: u32,
}

/// A named unit of code produced by a language adapter.
///
/// # Examples
///
/// ```
/// use sightline_core::{Chunk, ChunkKind, Span};
/// use std::path::Path;
///
/// let span = Span { start_byte: 0, end_byte: 12, start_line: 1, end_line: 1 };
/// let chunk = Chunk::new(Path::new("src/main.rs"), "rust", "main", ChunkKind::Function, span, "fn main() {}");
/// assert_eq!(chunk.id.as_str(), "src/main.rs#main@rust");
/// assert_eq!(chunk.name, "main");
/// assert!(chunk.parent.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: ChunkId,
    pub kind: ChunkKind,
    pub span: Span,
    /// Raw source text of the chunk.
    pub text: String,
    /// Declared name (last segment of `symbol_path`).
    pub name: String,
    /// Scope-qualified name, segments joined by `::`.
    pub symbol_path: String,
    pub visibility: Visibility,
    /// Owning chunk, if this chunk is nested inside another one.
    pub parent: Option<ChunkId>,
    pub language: String,
    /// Path relative to the project root.
    pub file_path: PathBuf,
    /// Declaration line(s) up to the body, whitespace-collapsed.
    pub signature: Option<String>,
    /// Changes iff `text` changes; moving a chunk keeps its hash.
    pub content_hash: String,
}

impl Chunk {
    pub fn new(
        file_path: &Path,
        language: &str,
        symbol_path: &str,
        kind: ChunkKind,
        span: Span,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let name = symbol_path
            .rsplit("::")
            .next()
            .unwrap_or(symbol_path)
            .to_string();
        let content_hash = content_hash(&text);
        Self {
            id: ChunkId::new(file_path, symbol_path, language),
            kind,
            span,
            text,
            name,
            symbol_path: symbol_path.to_string(),
            visibility: Visibility::Unknown,
            parent: None,
            language: language.to_string(),
            file_path: file_path.to_path_buf(),
            signature: None,
            content_hash,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        let signature = signature.into();
        self.signature = (!signature.is_empty()).then_some(signature);
        self
    }

    /// The enclosing scope of this chunk's symbol path, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use sightline_core::{Chunk, ChunkKind, Span};
    /// use std::path::Path;
    ///
    /// let span = Span { start_byte: 0, end_byte: 1, start_line: 1, end_line: 1 };
    /// let m = Chunk::new(Path::new("a.py"), "python", "Loader::load", ChunkKind::Method, span, "x");
    /// assert_eq!(m.scope(), Some("Loader"));
    /// ```
    pub fn scope(&self) -> Option<&str> {
        self.symbol_path.rsplit_once("::").map(|(scope, _)| scope)
    }

    /// Directory containing the chunk's file, used as its module/package.
    pub fn module_dir(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Context header prepended to the text before embedding.
    pub fn context_header(&self) -> String {
        let mut header = format!(
            "# File: {}\n# Type: {}\n# Name: {}",
            self.file_path.display(),
            self.kind,
            self.name,
        );
        if let Some(scope) = self.scope() {
            header.push_str(&format!("\n# Scope: {scope}"));
        }
        if let Some(signature) = &self.signature {
            header.push_str(&format!("\n# Signature: {signature}"));
        }
        header
    }

    /// Full text sent to an embedding provider.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.context_header(), self.text)
    }
}

/// Syntactic shape of a call site, used to pick a resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallForm {
    /// `name()`
    Plain,
    /// `self.name()`, `this.name()`, `Self::name()`
    SelfCall,
    /// `Type::name()`, `module.name()` where the qualifier names a static target.
    Qualified,
    /// `value.name()` on a receiver whose type is unknown.
    Member,
    /// A call through an expression with no usable name (`handlers[k]()`, `f()()`).
    Dynamic,
}

/// A callee token found in a chunk's body, unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCall {
    /// Called name, or the raw expression for [`CallForm::Dynamic`].
    pub name: String,
    /// Receiver or path qualifier, e.g. `Config` in `Config::load()`.
    pub qualifier: Option<String>,
    pub form: CallForm,
    /// 1-indexed line of the call site.
    pub line: u32,
}

impl RawCall {
    pub fn plain(name: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            form: CallForm::Plain,
            line,
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            qualifier: Some(qualifier.into()),
            form: CallForm::Qualified,
            line,
        }
    }
}

/// Extraction facts that affect reachability but not identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFlags {
    /// Runs when its owning type is instantiated (`__init__`, `constructor`, ...).
    #[serde(default)]
    pub constructor: bool,
    /// Implements an interface or runtime hook (trait impls, `@Override`,
    /// dunder methods); only reachable through dynamic dispatch.
    #[serde(default)]
    pub dispatched: bool,
    /// Produced without a grammar, so its calls are unknown.
    #[serde(default)]
    pub opaque: bool,
    /// Marked as a test by an attribute or annotation (`#[test]`, `@Test`).
    #[serde(default)]
    pub test: bool,
}

/// A chunk together with the raw callees found in its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedChunk {
    pub chunk: Chunk,
    pub calls: Vec<RawCall>,
    #[serde(default)]
    pub flags: ChunkFlags,
}

impl ExtractedChunk {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            calls: Vec::new(),
            flags: ChunkFlags::default(),
        }
    }
}

/// A single ranked search hit.
///
/// Carries the raw vector and keyword scores, their fused score and the
/// optional rerank score so callers can see how the final rank was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub file_path: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
    pub name: String,
    pub kind: ChunkKind,
    pub language: String,
    /// Code snippet (full chunk text).
    pub snippet: String,
    /// Vector similarity; higher is closer regardless of metric. 0 when the
    /// query was not embedded.
    pub similarity: f64,
    /// Normalized BM25 score in `[0, 1)`, if the chunk matched the keywords.
    pub keyword_score: Option<f64>,
    /// Retrieval score the candidates were ordered by before reranking.
    pub score: f64,
    pub rerank_score: Option<f64>,
    /// 1-based final rank.
    pub rank: usize,
}

/// Output format for CLI results.
///
/// # Examples
///
/// ```
/// use sightline_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start_line: u32, end_line: u32) -> Span {
        Span {
            start_byte: 0,
            end_byte: 10,
            start_line,
            end_line,
        }
    }

    #[test]
    fn chunk_id_uses_forward_slashes() {
        let id = ChunkId::new(Path::new("src\\util\\io.rs"), "read", "rust");
        assert_eq!(id.as_str(), "src/util/io.rs#read@rust");
    }

    #[test]
    fn chunk_name_is_last_symbol_segment() {
        let chunk = Chunk::new(
            Path::new("lib.rs"),
            "rust",
            "outer::Config::load",
            ChunkKind::Method,
            span(1, 3),
            "fn load() {}",
        );
        assert_eq!(chunk.name, "load");
        assert_eq!(chunk.scope(), Some("outer::Config"));
    }

    #[test]
    fn content_hash_tracks_text() {
        let a = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(1, 2), "func Run() {}");
        let b = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(1, 2), "func Run() { x() }");
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn content_hash_ignores_position() {
        let a = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(1, 2), "func Run() {}");
        let moved = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(4, 5), "func Run() {}");
        assert_eq!(a.content_hash, moved.content_hash);
        assert_ne!(a.span, moved.span);
    }

    #[test]
    fn content_hash_is_stable() {
        let a = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(1, 2), "func Run() {}");
        let b = Chunk::new(Path::new("a.go"), "go", "Run", ChunkKind::Function, span(1, 2), "func Run() {}");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn context_header_includes_scope_and_signature() {
        let chunk = Chunk::new(
            Path::new("src/auth.rs"),
            "rust",
            "AuthService::validate",
            ChunkKind::Method,
            span(3, 5),
            "fn validate(&self) -> bool { true }",
        )
        .with_signature("fn validate(&self) -> bool");
        let header = chunk.context_header();
        assert!(header.contains("# File: src/auth.rs"));
        assert!(header.contains("# Type: method"));
        assert!(header.contains("# Scope: AuthService"));
        assert!(header.contains("# Signature: fn validate(&self) -> bool"));
        assert!(chunk.embedding_text().ends_with("fn validate(&self) -> bool { true }"));
    }

    #[test]
    fn empty_signature_is_dropped() {
        let chunk = Chunk::new(Path::new("x.c"), "c", "f", ChunkKind::Function, span(1, 1), "f")
            .with_signature("");
        assert!(chunk.signature.is_none());
    }

    #[test]
    fn chunk_kind_parses_aliases() {
        assert_eq!("struct".parse::<ChunkKind>().unwrap(), ChunkKind::Class);
        assert_eq!("FUNCTION".parse::<ChunkKind>().unwrap(), ChunkKind::Function);
        assert!("lambda".parse::<ChunkKind>().is_err());
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn chunk_serializes_camel_case() {
        let chunk = Chunk::new(Path::new("m.py"), "python", "main", ChunkKind::Function, span(1, 2), "def main(): pass");
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"symbolPath\":\"main\""));
        assert!(json.contains("\"contentHash\""));
        assert!(json.contains("\"id\":\"m.py#main@python\""));
    }
}
