//! Line-based chunking for languages without a grammar.
//!
//! Splits on blank lines, definition-looking lines and a size cap. Chunks
//! produced here carry no calls and are flagged opaque, so reachability
//! never reports them dead.

use sightline_core::{Chunk, ChunkFlags, ChunkKind, ExtractedChunk, SightlineError, Span};

use crate::adapter::LanguageAdapter;
use crate::walker::SourceFile;

/// Chunk size cap in tokens.
pub const DEFAULT_MAX_TOKENS: usize = 2000;
/// Blocks shorter than this many bytes are dropped.
pub const DEFAULT_MIN_CHARS: usize = 100;
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct LineAdapter {
    max_chars: usize,
    min_chars: usize,
}

impl Default for LineAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS, DEFAULT_MIN_CHARS)
    }
}

impl LineAdapter {
    pub fn new(max_tokens: usize, min_chars: usize) -> Self {
        Self {
            max_chars: max_tokens.max(1) * CHARS_PER_TOKEN,
            min_chars,
        }
    }
}

struct Block {
    start_line: u32,
    start_byte: usize,
    end_byte: usize,
    chars: usize,
}

impl LanguageAdapter for LineAdapter {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn extract(&self, file: &SourceFile) -> Result<Vec<ExtractedChunk>, SightlineError> {
        let content = file.content.as_str();
        if content.is_empty() {
            return Ok(Vec::new());
        }
        let language = file.language.as_str();

        let mut blocks: Vec<(Block, u32)> = Vec::new();
        let mut current: Option<Block> = None;
        let mut offset = 0usize;
        let mut last_line = 0u32;

        for (i, line) in content.split('\n').enumerate() {
            let line_no = i as u32 + 1;
            let len = line.len();
            let chars = current.as_ref().map_or(0, |b| b.chars);

            let split = (line.trim().is_empty() && chars > self.min_chars)
                || (chars + len > self.max_chars && chars > 0)
                || (chars > self.min_chars && looks_like_definition(line, language));

            if split {
                if let Some(block) = current.take() {
                    blocks.push((block, line_no - 1));
                }
            }

            let block = current.get_or_insert(Block {
                start_line: line_no,
                start_byte: offset,
                end_byte: offset,
                chars: 0,
            });
            block.end_byte = offset + len;
            block.chars += len + 1;

            offset += len + 1;
            last_line = line_no;
        }
        if let Some(block) = current.take() {
            blocks.push((block, last_line));
        }

        let mut chunks: Vec<ExtractedChunk> = blocks
            .into_iter()
            .filter(|(block, _)| block.chars >= self.min_chars)
            .map(|(block, end_line)| {
                let span = Span {
                    start_byte: block.start_byte,
                    end_byte: block.end_byte,
                    start_line: block.start_line,
                    end_line,
                };
                let symbol = format!("L{}-{}", block.start_line, end_line);
                let text = &content[block.start_byte..block.end_byte];
                opaque(Chunk::new(&file.path, language, &symbol, ChunkKind::Block, span, text))
            })
            .collect();

        if chunks.is_empty() {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file.path.display().to_string());
            let span = Span {
                start_byte: 0,
                end_byte: content.len(),
                start_line: 1,
                end_line: last_line,
            };
            chunks.push(opaque(Chunk::new(
                &file.path,
                language,
                &name,
                ChunkKind::File,
                span,
                content,
            )));
        }

        Ok(chunks)
    }
}

fn opaque(chunk: Chunk) -> ExtractedChunk {
    ExtractedChunk {
        chunk,
        calls: Vec::new(),
        flags: ChunkFlags {
            opaque: true,
            ..ChunkFlags::default()
        },
    }
}

fn looks_like_definition(line: &str, language: &str) -> bool {
    let t = line.trim();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| t.starts_with(p));
    let not_control = !starts(&["if", "for", "while", "switch", "return"]);

    match language {
        "go" => starts(&["func ", "type "]),
        "python" => starts(&["def ", "class ", "async def "]),
        "javascript" | "typescript" => {
            starts(&[
                "function ",
                "class ",
                "export function ",
                "export class ",
                "export default function ",
            ]) || (t.starts_with("const ") && (t.contains("= function") || t.contains("=>")))
        }
        "rust" => starts(&[
            "fn ",
            "pub fn ",
            "impl ",
            "struct ",
            "pub struct ",
            "enum ",
            "pub enum ",
        ]),
        "java" | "csharp" => {
            t.contains("class ")
                || t.contains("interface ")
                || (t.contains('(') && t.contains('{') && not_control)
        }
        "c" | "cpp" => t.contains('(') && t.ends_with('{') && not_control,
        "kotlin" => starts(&["fun ", "class ", "object ", "interface ", "data class "])
            || t.contains(" fun "),
        "swift" => starts(&["func ", "class ", "struct ", "protocol ", "extension "])
            || t.contains(" func "),
        "scala" => starts(&["def ", "class ", "object ", "trait ", "case class "]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::Language;
    use std::path::PathBuf;

    fn kotlin_file(content: &str) -> SourceFile {
        SourceFile::new(PathBuf::from("app/Main.kt"), Language::Kotlin, content)
    }

    #[test]
    fn small_file_becomes_one_file_chunk() {
        let file = kotlin_file("fun main() {\n    println(\"hi\")\n}\n");
        let chunks = LineAdapter::default().extract(&file).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.kind, ChunkKind::File);
        assert_eq!(chunks[0].chunk.name, "Main.kt");
        assert!(chunks[0].flags.opaque);
        assert!(chunks[0].calls.is_empty());
    }

    #[test]
    fn splits_at_definitions_once_past_minimum() {
        let body = "    val x = compute(1, 2, 3) + compute(4, 5, 6) + compute(7, 8, 9) // padding\n";
        let content = format!("fun first() {{\n{body}{body}}}\nfun second() {{\n{body}{body}}}\n");
        let chunks = LineAdapter::default().extract(&kotlin_file(&content)).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk.kind, ChunkKind::Block);
        assert!(chunks[0].chunk.text.starts_with("fun first"));
        assert!(chunks[1].chunk.text.starts_with("fun second"));
        assert_eq!(chunks[0].chunk.symbol_path, "L1-4");
        assert_eq!(chunks[1].chunk.span.start_line, 5);
        assert_eq!(
            &content[chunks[1].chunk.span.start_byte..chunks[1].chunk.span.end_byte],
            chunks[1].chunk.text
        );
    }

    #[test]
    fn size_cap_forces_split() {
        let line = "x".repeat(60);
        let content = vec![line.as_str(); 20].join("\n");
        let adapter = LineAdapter::new(100, 10);
        let chunks = adapter.extract(&kotlin_file(&content)).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk.text.len() <= 400));
    }

    #[test]
    fn empty_file_has_no_chunks() {
        assert!(LineAdapter::default().extract(&kotlin_file("")).unwrap().is_empty());
    }
}
