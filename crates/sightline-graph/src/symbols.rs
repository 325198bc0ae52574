//! Project-wide symbol table and call-site resolution.
//!
//! Resolution is a name/scope heuristic, uniform across languages: a call is
//! matched against symbols of the caller's language by name, then narrowed
//! by scope, file, and module directory. Anything still ambiguous stays
//! unresolved instead of being guessed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sightline_core::{CallForm, ChunkFlags, ChunkId, ChunkKind, ExtractedChunk, RawCall, Visibility};

/// Graph-side view of a chunk: everything resolution and reachability need,
/// without the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: ChunkId,
    pub name: String,
    pub symbol_path: String,
    pub kind: ChunkKind,
    pub visibility: Visibility,
    pub language: String,
    pub file_path: PathBuf,
    pub parent: Option<ChunkId>,
    pub flags: ChunkFlags,
    pub start_line: u32,
    pub end_line: u32,
    pub content_hash: String,
}

impl Symbol {
    /// Enclosing scope segments joined by `::`, empty at top level.
    pub fn scope(&self) -> &str {
        self.symbol_path
            .rsplit_once("::")
            .map_or("", |(scope, _)| scope)
    }

    pub fn module_dir(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new(""))
    }

    fn file_stem(&self) -> Option<&str> {
        self.file_path.file_stem().and_then(|s| s.to_str())
    }

    fn dir_name(&self) -> Option<&str> {
        self.module_dir().file_name().and_then(|s| s.to_str())
    }

    /// Scopes visible from inside this symbol, innermost first.
    fn scope_chain(&self) -> Vec<&str> {
        let mut chain = vec![self.symbol_path.as_str()];
        let mut current = self.symbol_path.as_str();
        while let Some((outer, _)) = current.rsplit_once("::") {
            chain.push(outer);
            current = outer;
        }
        chain
    }
}

impl From<&ExtractedChunk> for Symbol {
    fn from(extracted: &ExtractedChunk) -> Self {
        let chunk = &extracted.chunk;
        Self {
            id: chunk.id.clone(),
            name: chunk.name.clone(),
            symbol_path: chunk.symbol_path.clone(),
            kind: chunk.kind,
            visibility: chunk.visibility,
            language: chunk.language.clone(),
            file_path: chunk.file_path.clone(),
            parent: chunk.parent.clone(),
            flags: extracted.flags,
            start_line: chunk.span.start_line,
            end_line: chunk.span.end_line,
            content_hash: chunk.content_hash.clone(),
        }
    }
}

/// How a call site was bound to its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Bound to exactly one symbol in the caller's file.
    ResolvedLocal,
    /// Bound to exactly one symbol in another file.
    ResolvedCrossFile,
    /// No unique match: external, or ambiguous between the listed targets.
    Unresolved,
    /// Runtime dispatch; targets are the possible implementations.
    Dynamic,
}

impl Resolution {
    pub fn is_static(self) -> bool {
        matches!(self, Resolution::ResolvedLocal | Resolution::ResolvedCrossFile)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::ResolvedLocal => "resolved-local",
            Resolution::ResolvedCrossFile => "resolved-cross-file",
            Resolution::Unresolved => "unresolved",
            Resolution::Dynamic => "dynamic",
        };
        f.write_str(s)
    }
}

/// Symbols of one project snapshot, sorted by id.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_id: HashMap<ChunkId, usize>,
    by_name: HashMap<(String, String), Vec<usize>>,
}

impl SymbolTable {
    /// Build a table from extracted chunks. Duplicate ids keep the first chunk.
    pub fn build<'a>(chunks: impl IntoIterator<Item = &'a ExtractedChunk>) -> Self {
        let mut symbols: Vec<Symbol> = chunks.into_iter().map(Symbol::from).collect();
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        symbols.dedup_by(|a, b| a.id == b.id);

        let mut by_id = HashMap::with_capacity(symbols.len());
        let mut by_name: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (idx, symbol) in symbols.iter().enumerate() {
            by_id.insert(symbol.id.clone(), idx);
            if matches!(symbol.kind, ChunkKind::Block | ChunkKind::File) {
                continue;
            }
            by_name
                .entry((symbol.language.clone(), symbol.name.clone()))
                .or_default()
                .push(idx);
        }

        Self {
            symbols,
            by_id,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn get(&self, idx: usize) -> &Symbol {
        &self.symbols[idx]
    }

    pub fn index_of(&self, id: &ChunkId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    fn named(&self, language: &str, name: &str) -> &[usize] {
        self.by_name
            .get(&(language.to_string(), name.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Bind one raw call made from `caller` to target symbol indices.
    pub fn resolve(&self, caller: usize, call: &RawCall) -> (Resolution, Vec<usize>) {
        let from = &self.symbols[caller];
        match call.form {
            CallForm::Plain => self.resolve_plain(from, &call.name),
            CallForm::SelfCall => self.resolve_self(from, &call.name),
            CallForm::Qualified => {
                let qualifier = call.qualifier.as_deref().unwrap_or("");
                match self.resolve_qualified(from, qualifier, &call.name) {
                    Some(resolved) => resolved,
                    None => (Resolution::Unresolved, Vec::new()),
                }
            }
            CallForm::Member => {
                let qualifier = call.qualifier.as_deref().unwrap_or("");
                if let Some(resolved) = self.resolve_qualified(from, qualifier, &call.name) {
                    return resolved;
                }
                let implementations: Vec<usize> = self
                    .named(&from.language, &call.name)
                    .iter()
                    .copied()
                    .filter(|&i| self.symbols[i].kind.is_callable())
                    .collect();
                if implementations.is_empty() {
                    (Resolution::Unresolved, Vec::new())
                } else {
                    (Resolution::Dynamic, implementations)
                }
            }
            CallForm::Dynamic => (Resolution::Dynamic, Vec::new()),
        }
    }

    fn resolve_plain(&self, from: &Symbol, name: &str) -> (Resolution, Vec<usize>) {
        let chain = from.scope_chain();
        // A bare name reaches free functions and types anywhere, and methods
        // only through an enclosing scope (implicit `this`).
        let candidates: Vec<usize> = self
            .named(&from.language, name)
            .iter()
            .copied()
            .filter(|&i| {
                let s = &self.symbols[i];
                s.kind != ChunkKind::Method || chain.contains(&s.scope())
            })
            .collect();
        let candidates = self.drop_owners_of_members(candidates);
        if candidates.is_empty() {
            return (Resolution::Unresolved, Vec::new());
        }

        for scope in &chain {
            let in_scope: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| {
                    let s = &self.symbols[i];
                    s.file_path == from.file_path && s.scope() == *scope
                })
                .collect();
            if !in_scope.is_empty() {
                return self.bind(from, in_scope);
            }
        }
        self.bind(from, self.narrow(from, candidates))
    }

    fn resolve_self(&self, from: &Symbol, name: &str) -> (Resolution, Vec<usize>) {
        let methods: Vec<usize> = self
            .named(&from.language, name)
            .iter()
            .copied()
            .filter(|&i| self.symbols[i].kind.is_callable())
            .collect();

        for scope in from.scope_chain().into_iter().skip(1) {
            let in_scope: Vec<usize> = methods
                .iter()
                .copied()
                .filter(|&i| self.symbols[i].scope() == scope)
                .collect();
            if !in_scope.is_empty() {
                return self.bind(from, self.narrow(from, in_scope));
            }
        }

        if methods.is_empty() {
            (Resolution::Unresolved, Vec::new())
        } else {
            // Inherited or mixed-in: any same-named method may run.
            (Resolution::Dynamic, methods)
        }
    }

    /// Match `qualifier::name` / `qualifier.name` against an owning type,
    /// file or directory called `qualifier`. `None` if nothing matches.
    fn resolve_qualified(
        &self,
        from: &Symbol,
        qualifier: &str,
        name: &str,
    ) -> Option<(Resolution, Vec<usize>)> {
        let owner = last_segment(qualifier);
        if matches!(owner, "" | "crate" | "super" | "self") {
            let resolved = self.resolve_plain(from, name);
            return (!resolved.1.is_empty()).then_some(resolved);
        }

        let candidates: Vec<usize> = self
            .named(&from.language, name)
            .iter()
            .copied()
            .filter(|&i| {
                let s = &self.symbols[i];
                last_segment(s.scope()) == owner
                    || (s.scope().is_empty()
                        && (s.file_stem() == Some(owner) || s.dir_name() == Some(owner)))
            })
            .collect();
        let candidates = self.drop_owners_of_members(candidates);
        if candidates.is_empty() {
            return None;
        }
        Some(self.bind(from, self.narrow(from, candidates)))
    }

    /// A type and its own member both named like the call (`new Foo()` with a
    /// `Foo::Foo` constructor): keep the member.
    fn drop_owners_of_members(&self, candidates: Vec<usize>) -> Vec<usize> {
        let owners: Vec<&ChunkId> = candidates
            .iter()
            .filter_map(|&i| self.symbols[i].parent.as_ref())
            .collect();
        candidates
            .into_iter()
            .filter(|&i| !owners.contains(&&self.symbols[i].id))
            .collect()
    }

    /// Prefer same file, then same module directory, then project-wide.
    fn narrow(&self, from: &Symbol, candidates: Vec<usize>) -> Vec<usize> {
        if candidates.len() <= 1 {
            return candidates;
        }
        let same_file: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| self.symbols[i].file_path == from.file_path)
            .collect();
        if !same_file.is_empty() {
            return same_file;
        }
        let same_module: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| self.symbols[i].module_dir() == from.module_dir())
            .collect();
        if !same_module.is_empty() {
            return same_module;
        }
        candidates
    }

    fn bind(&self, from: &Symbol, targets: Vec<usize>) -> (Resolution, Vec<usize>) {
        match targets.as_slice() {
            [] => (Resolution::Unresolved, targets),
            [only] if self.symbols[*only].file_path == from.file_path => {
                (Resolution::ResolvedLocal, targets)
            }
            [_] => (Resolution::ResolvedCrossFile, targets),
            _ => (Resolution::Unresolved, targets),
        }
    }
}

fn last_segment(qualifier: &str) -> &str {
    qualifier
        .rsplit(|c| c == ':' || c == '.' || c == '\\')
        .next()
        .unwrap_or(qualifier)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::{Chunk, Span};

    fn chunk(file: &str, language: &str, path: &str, kind: ChunkKind) -> ExtractedChunk {
        let span = Span {
            start_byte: 0,
            end_byte: 1,
            start_line: 1,
            end_line: 1,
        };
        ExtractedChunk::new(Chunk::new(Path::new(file), language, path, kind, span, path))
    }

    fn with_parent(mut c: ExtractedChunk, parent: &ExtractedChunk) -> ExtractedChunk {
        c.chunk.parent = Some(parent.chunk.id.clone());
        c
    }

    fn targets(table: &SymbolTable, resolved: &(Resolution, Vec<usize>)) -> Vec<String> {
        resolved
            .1
            .iter()
            .map(|&i| table.get(i).id.to_string())
            .collect()
    }

    fn caller(table: &SymbolTable, id: &str) -> usize {
        table.index_of(&ChunkId::from(id)).unwrap()
    }

    #[test]
    fn plain_prefers_same_file_then_module() {
        let chunks = vec![
            chunk("pkg/a.py", "python", "main", ChunkKind::Function),
            chunk("pkg/a.py", "python", "helper", ChunkKind::Function),
            chunk("pkg/b.py", "python", "helper", ChunkKind::Function),
            chunk("pkg/b.py", "python", "shared", ChunkKind::Function),
            chunk("other/c.py", "python", "shared", ChunkKind::Function),
            chunk("x/d.py", "python", "twin", ChunkKind::Function),
            chunk("y/e.py", "python", "twin", ChunkKind::Function),
        ];
        let table = SymbolTable::build(&chunks);
        let main = caller(&table, "pkg/a.py#main@python");

        let local = table.resolve(main, &RawCall::plain("helper", 1));
        assert_eq!(local.0, Resolution::ResolvedLocal);
        assert_eq!(targets(&table, &local), vec!["pkg/a.py#helper@python"]);

        let module = table.resolve(main, &RawCall::plain("shared", 1));
        assert_eq!(module.0, Resolution::ResolvedCrossFile);
        assert_eq!(targets(&table, &module), vec!["pkg/b.py#shared@python"]);

        let ambiguous = table.resolve(main, &RawCall::plain("twin", 1));
        assert_eq!(ambiguous.0, Resolution::Unresolved);
        assert_eq!(ambiguous.1.len(), 2);

        let external = table.resolve(main, &RawCall::plain("print", 1));
        assert_eq!(external, (Resolution::Unresolved, vec![]));
    }

    #[test]
    fn plain_call_does_not_reach_foreign_methods() {
        let chunks = vec![
            chunk("a.py", "python", "main", ChunkKind::Function),
            chunk("a.py", "python", "Loader", ChunkKind::Class),
            chunk("a.py", "python", "Loader::load", ChunkKind::Method),
        ];
        let table = SymbolTable::build(&chunks);
        let resolved = table.resolve(caller(&table, "a.py#main@python"), &RawCall::plain("load", 1));
        assert_eq!(resolved, (Resolution::Unresolved, vec![]));
    }

    #[test]
    fn languages_do_not_mix() {
        let chunks = vec![
            chunk("a.py", "python", "main", ChunkKind::Function),
            chunk("b.go", "go", "helper", ChunkKind::Function),
        ];
        let table = SymbolTable::build(&chunks);
        let resolved = table.resolve(caller(&table, "a.py#main@python"), &RawCall::plain("helper", 1));
        assert_eq!(resolved.0, Resolution::Unresolved);
    }

    #[test]
    fn self_calls_bind_within_the_enclosing_type() {
        let class = chunk("a.py", "python", "Loader", ChunkKind::Class);
        let load = with_parent(chunk("a.py", "python", "Loader::load", ChunkKind::Method), &class);
        let read = with_parent(chunk("a.py", "python", "Loader::_read", ChunkKind::Method), &class);
        let other = chunk("b.py", "python", "Writer::_read", ChunkKind::Method);
        let table = SymbolTable::build(&[class, load, read, other]);

        let call = RawCall {
            name: "_read".into(),
            qualifier: Some("self".into()),
            form: CallForm::SelfCall,
            line: 3,
        };
        let resolved = table.resolve(caller(&table, "a.py#Loader::load@python"), &call);
        assert_eq!(resolved.0, Resolution::ResolvedLocal);
        assert_eq!(targets(&table, &resolved), vec!["a.py#Loader::_read@python"]);

        let inherited = RawCall {
            name: "_read".into(),
            ..call
        };
        let table = SymbolTable::build(&[
            chunk("c.py", "python", "Child::run", ChunkKind::Method),
            chunk("b.py", "python", "Writer::_read", ChunkKind::Method),
        ]);
        let resolved = table.resolve(caller(&table, "c.py#Child::run@python"), &inherited);
        assert_eq!(resolved.0, Resolution::Dynamic);
        assert_eq!(targets(&table, &resolved), vec!["b.py#Writer::_read@python"]);
    }

    #[test]
    fn qualified_calls_match_owner_or_module() {
        let chunks = vec![
            chunk("src/main.rs", "rust", "main", ChunkKind::Function),
            chunk("src/config.rs", "rust", "Config", ChunkKind::Class),
            chunk("src/config.rs", "rust", "Config::load", ChunkKind::Method),
            chunk("src/cache.rs", "rust", "Cache::load", ChunkKind::Method),
            chunk("src/util.rs", "rust", "slug", ChunkKind::Function),
        ];
        let table = SymbolTable::build(&chunks);
        let main = caller(&table, "src/main.rs#main@rust");

        let resolved = table.resolve(main, &RawCall::qualified("crate::config::Config", "load", 2));
        assert_eq!(resolved.0, Resolution::ResolvedCrossFile);
        assert_eq!(targets(&table, &resolved), vec!["src/config.rs#Config::load@rust"]);

        let module = table.resolve(main, &RawCall::qualified("util", "slug", 3));
        assert_eq!(targets(&table, &module), vec!["src/util.rs#slug@rust"]);

        let external = table.resolve(main, &RawCall::qualified("std::fs", "read", 4));
        assert_eq!(external, (Resolution::Unresolved, vec![]));
    }

    #[test]
    fn member_calls_fall_back_to_dynamic() {
        let chunks = vec![
            chunk("app.ts", "typescript", "start", ChunkKind::Function),
            chunk("a.ts", "typescript", "A::run", ChunkKind::Method),
            chunk("b.ts", "typescript", "B::run", ChunkKind::Method),
        ];
        let table = SymbolTable::build(&chunks);
        let call = RawCall {
            name: "run".into(),
            qualifier: Some("svc".into()),
            form: CallForm::Member,
            line: 1,
        };
        let resolved = table.resolve(caller(&table, "app.ts#start@typescript"), &call);
        assert_eq!(resolved.0, Resolution::Dynamic);
        assert_eq!(resolved.1.len(), 2);

        let module_member = RawCall {
            name: "run".into(),
            qualifier: Some("A".into()),
            form: CallForm::Member,
            line: 2,
        };
        let resolved = table.resolve(caller(&table, "app.ts#start@typescript"), &module_member);
        assert_eq!(resolved.0, Resolution::ResolvedCrossFile);
    }

    #[test]
    fn constructor_call_prefers_member_over_type() {
        let class = chunk("G.java", "java", "Greeter", ChunkKind::Class);
        let ctor = with_parent(
            chunk("G.java", "java", "Greeter::Greeter", ChunkKind::Method),
            &class,
        );
        let main = chunk("G.java", "java", "Greeter::main", ChunkKind::Method);
        let table = SymbolTable::build(&[class, ctor, main]);
        let resolved = table.resolve(
            caller(&table, "G.java#Greeter::main@java"),
            &RawCall::plain("Greeter", 4),
        );
        assert_eq!(targets(&table, &resolved), vec!["G.java#Greeter::Greeter@java"]);
    }

    #[test]
    fn scope_chain_lists_enclosing_scopes() {
        let table = SymbolTable::build(&[chunk("a.rs", "rust", "m::T::f", ChunkKind::Method)]);
        assert_eq!(table.get(0).scope_chain(), vec!["m::T::f", "m::T", "m"]);
        assert_eq!(table.get(0).scope(), "m::T");
    }
}
