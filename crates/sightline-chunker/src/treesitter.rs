//! Grammar-driven chunk extraction using tree-sitter.
//!
//! One adapter type serves every language with a grammar; the per-language
//! differences come from the static tables in [`crate::grammar`].

use std::collections::HashMap;

use sightline_core::{
    CallForm, Chunk, ChunkFlags, ChunkKind, ExtractedChunk, RawCall, SightlineError, Span,
    Visibility, MODULE_SYMBOL,
};
use tree_sitter::{Node, Parser};

use crate::adapter::LanguageAdapter;
use crate::grammar::{grammar_for, Grammar, Role, VisibilityRule};
use crate::walker::{Language, SourceFile};

/// Longest raw expression kept for a dynamic call.
const MAX_DYNAMIC_EXPR: usize = 80;

/// Extracts chunks and raw calls for one tree-sitter language.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use sightline_chunker::{LanguageAdapter, TreeSitterAdapter};
/// use sightline_chunker::walker::{Language, SourceFile};
///
/// let adapter = TreeSitterAdapter::new(Language::Python).unwrap();
/// let file = SourceFile::new(
///     PathBuf::from("app.py"),
///     Language::Python,
///     "def main():\n    run()\n\ndef run():\n    pass\n",
/// );
/// let chunks = adapter.extract(&file).unwrap();
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].chunk.name, "main");
/// assert_eq!(chunks[0].calls[0].name, "run");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TreeSitterAdapter {
    language: Language,
    grammar: &'static Grammar,
}

impl TreeSitterAdapter {
    /// Adapter for `language`, or `None` if it has no grammar.
    pub fn new(language: Language) -> Option<Self> {
        grammar_for(language).map(|grammar| Self { language, grammar })
    }
}

impl LanguageAdapter for TreeSitterAdapter {
    fn name(&self) -> &'static str {
        self.language.as_str()
    }

    fn extract(&self, file: &SourceFile) -> Result<Vec<ExtractedChunk>, SightlineError> {
        let Some(ts_language) = self.language.tree_sitter_language() else {
            return Err(parse_error(file, "no grammar available"));
        };

        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| parse_error(file, format!("failed to set language: {e}")))?;

        let Some(tree) = parser.parse(&file.content, None) else {
            return Err(parse_error(file, "parser produced no tree"));
        };

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            return Err(parse_error(file, format!("syntax error near line {line}")));
        }

        let mut collector = Collector::new(file, self.language, self.grammar);
        let scope = Scope::default();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            let top = Scope {
                top_level: Some(child.id()),
                ..scope.clone()
            };
            collector.visit(child, &top);
        }
        Ok(collector.finish())
    }
}

fn parse_error(file: &SourceFile, message: impl Into<String>) -> SightlineError {
    SightlineError::Parse {
        path: file.path.clone(),
        message: message.into(),
    }
}

fn first_error_line(node: Node) -> Option<u32> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row as u32 + 1);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() {
            if let Some(line) = first_error_line(child) {
                return Some(line);
            }
        }
    }
    None
}

/// Lexical context while walking the tree.
#[derive(Debug, Clone, Default)]
struct Scope {
    /// Symbol path segments of the enclosing definitions.
    path: Vec<String>,
    /// Index of the chunk that owns calls found here.
    owner: Option<usize>,
    /// Functions defined here are methods.
    in_type: bool,
    /// Functions defined here implement a trait or interface.
    dispatched: bool,
    type_name: Option<String>,
    /// Go receiver variable of the enclosing method.
    receiver: Option<String>,
    /// Id of the root-level statement being walked.
    top_level: Option<usize>,
}

struct Pending {
    extracted: ExtractedChunk,
    parent_path: Option<String>,
}

struct Collector<'a> {
    file: &'a SourceFile,
    source: &'a [u8],
    language: Language,
    grammar: &'static Grammar,
    chunks: Vec<Pending>,
    seen_paths: HashMap<String, usize>,
    module_calls: Vec<RawCall>,
    /// Root-level statements that contain unowned calls.
    module_statements: Vec<Span>,
    last_statement: Option<usize>,
}

impl<'a> Collector<'a> {
    fn new(file: &'a SourceFile, language: Language, grammar: &'static Grammar) -> Self {
        Self {
            file,
            source: file.content.as_bytes(),
            language,
            grammar,
            chunks: Vec::new(),
            seen_paths: HashMap::new(),
            module_calls: Vec::new(),
            module_statements: Vec::new(),
            last_statement: None,
        }
    }

    fn visit(&mut self, node: Node, scope: &Scope) {
        if let Some(role) = self.grammar.role(node.kind()) {
            if let Some(inner) = self.enter(node, role, scope) {
                self.visit_children(node, &inner);
                return;
            }
        }

        if self.grammar.is_call(node.kind()) {
            if let Some(call) = self.classify_call(node, scope) {
                self.record_call(call, node, scope);
            }
        } else if self.grammar.macro_calls && node.kind() == "token_tree" {
            for call in self.scan_token_tree(node, scope) {
                self.record_call(call, node, scope);
            }
        }

        self.visit_children(node, scope);
    }

    fn visit_children(&mut self, node: Node, scope: &Scope) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn enter(&mut self, node: Node, role: Role, scope: &Scope) -> Option<Scope> {
        match role {
            Role::Namespace => {
                let name = self.definition_name(node)?;
                let mut inner = scope.clone();
                inner.path.push(name);
                inner.in_type = false;
                Some(inner)
            }
            Role::Impl => {
                let name = node
                    .child_by_field_name("type")
                    .map(|t| strip_generics(&self.text(t)))?;
                let mut inner = scope.clone();
                inner.path.push(name.clone());
                inner.in_type = true;
                inner.dispatched = node.child_by_field_name("trait").is_some();
                inner.type_name = Some(name);
                Some(inner)
            }
            Role::Type(kind) => {
                if node.kind().ends_with("_specifier") && node.child_by_field_name("body").is_none()
                {
                    return None;
                }
                let name = self.definition_name(node)?;
                let flags = ChunkFlags {
                    dispatched: self.has_framework_annotation(node),
                    ..ChunkFlags::default()
                };
                let idx = self.push_chunk(node, &scope.path, &name, kind, flags);
                let mut inner = scope.clone();
                inner.path.push(name.clone());
                inner.owner = Some(idx);
                inner.in_type = true;
                inner.dispatched = node.kind().contains("trait") || node.kind().contains("interface");
                inner.type_name = Some(name);
                inner.receiver = None;
                Some(inner)
            }
            Role::Function => {
                if node.kind() == "variable_declarator" && !is_function_value(node) {
                    return None;
                }
                let (name, qualifier) = self.function_name(node)?;
                let mut path = scope.path.clone();
                if let Some(q) = &qualifier {
                    path.push(q.clone());
                }
                let is_method = scope.in_type || qualifier.is_some();
                let kind = if is_method {
                    ChunkKind::Method
                } else {
                    ChunkKind::Function
                };

                let owner_type = qualifier.as_deref().or(scope.type_name.as_deref());
                let constructor = self.grammar.constructors.contains(&name.as_str())
                    || node.kind() == "constructor_declaration"
                    || (self.language == Language::Cpp && owner_type == Some(name.as_str()));
                let annotations = self.annotations(node);
                let test = annotations.iter().any(|a| is_test_annotation(a));
                let dispatched = !constructor
                    && (scope.dispatched
                        || is_override(node, &self.text(node))
                        || (self.language == Language::Python && is_dunder(&name))
                        || annotations.iter().any(|a| !test && is_framework_annotation(a)));

                let flags = ChunkFlags {
                    constructor,
                    dispatched,
                    test,
                    opaque: false,
                };
                let idx = self.push_chunk(node, &path, &name, kind, flags);
                path.push(name);
                Some(Scope {
                    path,
                    owner: Some(idx),
                    in_type: false,
                    dispatched: false,
                    type_name: None,
                    receiver: self.go_receiver_name(node),
                    top_level: scope.top_level,
                })
            }
        }
    }

    fn push_chunk(
        &mut self,
        node: Node,
        scope_path: &[String],
        name: &str,
        kind: ChunkKind,
        flags: ChunkFlags,
    ) -> usize {
        let mut symbol_path = scope_path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(name))
            .collect::<Vec<_>>()
            .join("::");
        let seen = self.seen_paths.entry(symbol_path.clone()).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            symbol_path = format!("{symbol_path}#{seen}");
        }

        let visibility = self.visibility(node, name, scope_path.is_empty());
        let mut chunk = Chunk::new(
            &self.file.path,
            self.language.as_str(),
            &symbol_path,
            kind,
            node_span(node),
            self.text(node),
        )
        .with_visibility(visibility)
        .with_signature(extract_signature(&self.text(node)));
        chunk.name = name.to_string();

        self.chunks.push(Pending {
            extracted: ExtractedChunk {
                chunk,
                calls: Vec::new(),
                flags,
            },
            parent_path: (!scope_path.is_empty()).then(|| scope_path.join("::")),
        });
        self.chunks.len() - 1
    }

    fn record_call(&mut self, call: RawCall, node: Node, scope: &Scope) {
        if let Some(owner) = scope.owner {
            self.chunks[owner].extracted.calls.push(call);
            return;
        }
        self.module_calls.push(call);
        let Some(statement_id) = scope.top_level else {
            return;
        };
        if self.last_statement == Some(statement_id) {
            return;
        }
        let mut statement = node;
        while let Some(parent) = statement.parent() {
            if parent.parent().is_none() {
                break;
            }
            statement = parent;
        }
        self.module_statements.push(node_span(statement));
        self.last_statement = Some(statement_id);
    }

    fn finish(mut self) -> Vec<ExtractedChunk> {
        if !self.module_calls.is_empty() && !self.module_statements.is_empty() {
            let first = self.module_statements[0];
            let last = self.module_statements[self.module_statements.len() - 1];
            let text = self
                .module_statements
                .iter()
                .map(|s| String::from_utf8_lossy(&self.source[s.start_byte..s.end_byte]))
                .collect::<Vec<_>>()
                .join("\n");
            let span = Span {
                start_byte: first.start_byte,
                end_byte: last.end_byte,
                start_line: first.start_line,
                end_line: last.end_line,
            };
            let chunk = Chunk::new(
                &self.file.path,
                self.language.as_str(),
                MODULE_SYMBOL,
                ChunkKind::Module,
                span,
                text,
            );
            self.chunks.push(Pending {
                extracted: ExtractedChunk {
                    chunk,
                    calls: std::mem::take(&mut self.module_calls),
                    flags: ChunkFlags::default(),
                },
                parent_path: None,
            });
        }

        let ids: HashMap<String, _> = self
            .chunks
            .iter()
            .rev()
            .map(|p| (p.extracted.chunk.symbol_path.clone(), p.extracted.chunk.id.clone()))
            .collect();

        self.chunks
            .into_iter()
            .map(|pending| {
                let mut extracted = pending.extracted;
                extracted.chunk.parent = pending.parent_path.and_then(|p| ids.get(&p).cloned());
                extracted
            })
            .collect()
    }

    // --- names -----------------------------------------------------------

    fn definition_name(&self, node: Node) -> Option<String> {
        if let Some(name) = node.child_by_field_name("name") {
            let text = self.text(name);
            if !text.is_empty() {
                return Some(strip_generics(&text));
            }
        }
        // Go `type_spec` and friends always have a name field; anything else
        // unnamed (anonymous classes, `struct { ... } x;`) is not a chunk.
        None
    }

    /// Function name plus an out-of-line owner (Go receiver type, `Foo::bar` in C++).
    fn function_name(&self, node: Node) -> Option<(String, Option<String>)> {
        if node.kind() == "method_declaration" && self.language == Language::Go {
            let name = self.definition_name(node)?;
            return Some((name, self.go_receiver_type(node)));
        }
        if matches!(self.language, Language::C | Language::Cpp) {
            let mut declarator = node.child_by_field_name("declarator")?;
            loop {
                match declarator.kind() {
                    "identifier" | "field_identifier" | "destructor_name" | "operator_name" => {
                        return Some((self.text(declarator), None));
                    }
                    "qualified_identifier" => {
                        let text = self.text(declarator);
                        let (qualifier, name) = text.rsplit_once("::")?;
                        return Some((name.to_string(), Some(strip_generics(qualifier))));
                    }
                    _ => declarator = declarator.child_by_field_name("declarator")?,
                }
            }
        }
        self.definition_name(node).map(|name| (name, None))
    }

    fn go_receiver_type(&self, node: Node) -> Option<String> {
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        let ty = self.text(param.child_by_field_name("type")?);
        let ty = ty.trim_start_matches('*');
        Some(ty.split('[').next().unwrap_or(ty).trim().to_string())
    }

    fn go_receiver_name(&self, node: Node) -> Option<String> {
        if self.language != Language::Go || node.kind() != "method_declaration" {
            return None;
        }
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        param.child_by_field_name("name").map(|n| self.text(n))
    }

    // --- calls -----------------------------------------------------------

    fn classify_call(&self, node: Node, scope: &Scope) -> Option<RawCall> {
        let line = node.start_position().row as u32 + 1;

        if matches!(node.kind(), "new_expression" | "object_creation_expression") {
            let target = node
                .child_by_field_name("constructor")
                .or_else(|| node.child_by_field_name("type"))
                .or_else(|| node.named_child(0))?;
            let name = last_segment(&strip_generics(&self.text(target)));
            return is_identifier(&name).then(|| RawCall::plain(name, line));
        }

        if let Some(name_node) = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("method"))
        {
            let name = self.text(name_node);
            let receiver = node
                .child_by_field_name("object")
                .or_else(|| node.child_by_field_name("receiver"))
                .or_else(|| node.child_by_field_name("scope"));
            return Some(match receiver {
                None => RawCall::plain(name, line),
                Some(r) => self.receiver_call(
                    &self.text(r),
                    name,
                    node.kind() == "scoped_call_expression",
                    scope,
                    line,
                ),
            });
        }

        let callee = node.child_by_field_name("function")?;
        Some(self.classify_callee(callee, scope, line))
    }

    fn classify_callee(&self, expr: Node, scope: &Scope, line: u32) -> RawCall {
        match expr.kind() {
            "identifier" | "name" | "constant" => RawCall::plain(self.text(expr), line),
            "scoped_identifier" | "qualified_identifier" | "qualified_name" | "scope_resolution" => {
                let text = strip_generics(&self.text(expr));
                match split_path(&text) {
                    Some((qualifier, name)) => {
                        self.receiver_call(qualifier, name.to_string(), true, scope, line)
                    }
                    None => RawCall::plain(text, line),
                }
            }
            "field_expression" | "attribute" | "member_expression" | "selector_expression" => {
                let count = expr.named_child_count();
                let (Some(receiver), Some(name)) = (
                    expr.named_child(0),
                    count.checked_sub(1).and_then(|i| expr.named_child(i)),
                ) else {
                    return self.dynamic_call(expr, line);
                };
                if count < 2 {
                    return self.dynamic_call(expr, line);
                }
                self.receiver_call(&self.text(receiver), self.text(name), false, scope, line)
            }
            "generic_function" | "template_function" => {
                match expr
                    .child_by_field_name("function")
                    .or_else(|| expr.child_by_field_name("name"))
                {
                    Some(inner) => self.classify_callee(inner, scope, line),
                    None => self.dynamic_call(expr, line),
                }
            }
            _ => self.dynamic_call(expr, line),
        }
    }

    fn receiver_call(
        &self,
        receiver: &str,
        name: String,
        is_static: bool,
        scope: &Scope,
        line: u32,
    ) -> RawCall {
        let receiver = receiver.trim();
        let form = if self.grammar.self_names.contains(&receiver)
            || scope.receiver.as_deref() == Some(receiver)
        {
            CallForm::SelfCall
        } else if is_static {
            CallForm::Qualified
        } else {
            CallForm::Member
        };
        RawCall {
            name,
            qualifier: Some(receiver.to_string()),
            form,
            line,
        }
    }

    fn dynamic_call(&self, expr: Node, line: u32) -> RawCall {
        let text = self.text(expr);
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let name = match collapsed.char_indices().nth(MAX_DYNAMIC_EXPR) {
            Some((idx, _)) => collapsed[..idx].to_string(),
            None => collapsed,
        };
        RawCall {
            name,
            qualifier: None,
            form: CallForm::Dynamic,
            line,
        }
    }

    /// Find `name(...)`, `a::name(...)` and `x.name(...)` inside a macro body.
    fn scan_token_tree(&self, node: Node, scope: &Scope) -> Vec<RawCall> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        let mut calls = Vec::new();
        for (i, child) in children.iter().enumerate() {
            if child.kind() != "identifier" {
                continue;
            }
            let Some(next) = children.get(i + 1) else {
                continue;
            };
            if next.kind() != "token_tree" || !self.text(*next).starts_with('(') {
                continue;
            }
            let name = self.text(*child);
            let line = child.start_position().row as u32 + 1;
            let call = match (i.checked_sub(2).map(|j| children[j]), i.checked_sub(1).map(|j| children[j])) {
                (Some(recv), Some(sep)) if recv.kind() == "identifier" || recv.kind() == "self" => {
                    match self.text(sep).as_str() {
                        "::" => self.receiver_call(&self.text(recv), name, true, scope, line),
                        "." => self.receiver_call(&self.text(recv), name, false, scope, line),
                        _ => RawCall::plain(name, line),
                    }
                }
                _ => RawCall::plain(name, line),
            };
            calls.push(call);
        }
        calls
    }

    // --- visibility and annotations -------------------------------------

    fn visibility(&self, node: Node, name: &str, top_level: bool) -> Visibility {
        match self.grammar.visibility {
            VisibilityRule::Rust => match find_child(node, "visibility_modifier") {
                Some(m) if self.text(m) == "pub" => Visibility::Public,
                Some(_) => Visibility::Protected,
                None => Visibility::Private,
            },
            VisibilityRule::Underscore => {
                if is_dunder(name) || !name.starts_with('_') {
                    Visibility::Public
                } else {
                    Visibility::Private
                }
            }
            VisibilityRule::Capitalized => {
                if name.chars().next().is_some_and(char::is_uppercase) {
                    Visibility::Public
                } else {
                    Visibility::Private
                }
            }
            VisibilityRule::Modifiers => {
                let modifiers = find_child(node, "modifiers")
                    .or_else(|| find_child(node, "visibility_modifier"))
                    .map(|m| self.text(m))
                    .unwrap_or_default();
                modifier_visibility(&modifiers)
            }
            VisibilityRule::JavaScript => {
                if name.starts_with('#') {
                    return Visibility::Private;
                }
                if let Some(m) = find_child(node, "accessibility_modifier") {
                    return modifier_visibility(&self.text(m));
                }
                let exported = std::iter::successors(node.parent(), |n| n.parent())
                    .take(2)
                    .any(|n| n.kind() == "export_statement");
                if exported || !top_level {
                    Visibility::Public
                } else {
                    Visibility::Private
                }
            }
            VisibilityRule::StorageClass => {
                let is_static = find_child(node, "storage_class_specifier")
                    .is_some_and(|c| self.text(c) == "static");
                if is_static && top_level {
                    Visibility::Private
                } else if top_level {
                    Visibility::Public
                } else {
                    Visibility::Unknown
                }
            }
            VisibilityRule::None => Visibility::Unknown,
        }
    }

    /// Attributes, decorators and annotations attached to a definition.
    fn annotations(&self, node: Node) -> Vec<String> {
        let mut found = Vec::new();

        // Rust: `#[...]` items directly above.
        let mut prev = node.prev_named_sibling();
        while let Some(p) = prev {
            if p.kind() != "attribute_item" {
                break;
            }
            found.push(self.text(p));
            prev = p.prev_named_sibling();
        }

        // Python/TypeScript: decorators on the wrapper or the node itself.
        if let Some(parent) = node.parent() {
            if parent.kind() == "decorated_definition" {
                collect_kind(parent, "decorator", |n| found.push(self.text(n)));
            }
        }
        collect_kind(node, "decorator", |n| found.push(self.text(n)));

        // Java: annotations inside `modifiers`.
        if let Some(modifiers) = find_child(node, "modifiers") {
            collect_kind(modifiers, "marker_annotation", |n| found.push(self.text(n)));
            collect_kind(modifiers, "annotation", |n| found.push(self.text(n)));
        }

        found
    }

    fn has_framework_annotation(&self, node: Node) -> bool {
        self.annotations(node)
            .iter()
            .any(|a| is_framework_annotation(a) && !is_test_annotation(a))
    }

    fn text(&self, node: Node) -> String {
        node_text(&node, self.source)
    }
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

fn node_span(node: Node) -> Span {
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    }
}

fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn collect_kind<'t>(node: Node<'t>, kind: &str, mut f: impl FnMut(Node<'t>)) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            f(child);
        }
    }
}

/// JS/TS `const f = () => ...` and `const f = function () {}`.
fn is_function_value(declarator: Node) -> bool {
    declarator.child_by_field_name("value").is_some_and(|v| {
        matches!(
            v.kind(),
            "arrow_function" | "function_expression" | "function" | "generator_function"
        )
    })
}

fn is_override(node: Node, text: &str) -> bool {
    let head = extract_signature(text);
    head.contains("@Override")
        || head.starts_with("virtual ")
        || head.ends_with(" override")
        || (node.kind() == "function_definition" && head.contains(") override"))
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_test_annotation(annotation: &str) -> bool {
    let lower = annotation.to_lowercase();
    lower.contains("test") && !lower.contains("cfg(not(test")
}

/// Decorators that hand the definition to a framework (routes, handlers,
/// fixtures), as opposed to ones that only tweak it.
fn is_framework_annotation(annotation: &str) -> bool {
    const BENIGN: &[&str] = &[
        "#[inline",
        "#[must_use",
        "#[allow",
        "#[deny",
        "#[warn",
        "#[doc",
        "#[cfg",
        "#[deprecated",
        "#[derive",
        "#[track_caller",
        "@staticmethod",
        "@classmethod",
        "@functools.",
        "@Deprecated",
        "@SuppressWarnings",
        "@Nullable",
        "@NonNull",
    ];
    !BENIGN.iter().any(|b| annotation.starts_with(b))
}

fn modifier_visibility(modifiers: &str) -> Visibility {
    let words: Vec<&str> = modifiers.split_whitespace().collect();
    if words.contains(&"public") {
        Visibility::Public
    } else if words.contains(&"private") {
        Visibility::Private
    } else if words.contains(&"protected") {
        Visibility::Protected
    } else {
        Visibility::Unknown
    }
}

/// Declaration head: first line up to the body opener, whitespace-collapsed.
fn extract_signature(text: &str) -> String {
    let first = text.lines().next().unwrap_or("");
    let head = match first.find('{') {
        Some(pos) => &first[..pos],
        None => first,
    };
    let head = head.trim_end().trim_end_matches(':');
    head.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_generics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn split_path(text: &str) -> Option<(&str, &str)> {
    text.rsplit_once("::").or_else(|| text.rsplit_once('\\'))
}

fn last_segment(text: &str) -> String {
    let tail = split_path(text).map_or(text, |(_, name)| name);
    tail.rsplit('.').next().unwrap_or(tail).trim().to_string()
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
