//! Static node-kind tables describing each tree-sitter grammar.
//!
//! The tree-sitter adapter is generic; everything language specific that it
//! needs to know lives in one [`Grammar`] value per language.

use sightline_core::ChunkKind;

use crate::walker::Language;

/// What a definition node contributes to the chunk hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// Produces a function chunk; a method when nested in a type.
    Function,
    /// Produces a chunk of the given kind and opens a scope for its members.
    Type(ChunkKind),
    /// Opens a type scope without producing a chunk (Rust `impl`).
    Impl,
    /// Opens a naming scope only (`mod`, `namespace`).
    Namespace,
}

/// How declared visibility is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisibilityRule {
    /// `pub` / `pub(crate)` / nothing.
    Rust,
    /// Leading underscore means private.
    Underscore,
    /// Capitalised names are exported.
    Capitalized,
    /// `public` / `private` / `protected` modifiers.
    Modifiers,
    /// `export` statements, `#private` names, TS accessibility modifiers.
    JavaScript,
    /// `static` means file-local.
    StorageClass,
    /// No reliable syntax.
    None,
}

#[derive(Debug)]
pub(crate) struct Grammar {
    pub definitions: &'static [(&'static str, Role)],
    pub calls: &'static [&'static str],
    /// Receiver spellings that refer to the current object or type.
    pub self_names: &'static [&'static str],
    /// Method names run on instantiation.
    pub constructors: &'static [&'static str],
    pub visibility: VisibilityRule,
    /// Scan macro token trees for `name(...)` patterns.
    pub macro_calls: bool,
}

impl Grammar {
    pub fn role(&self, kind: &str) -> Option<Role> {
        self.definitions
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, role)| *role)
    }

    pub fn is_call(&self, kind: &str) -> bool {
        self.calls.contains(&kind)
    }
}

static RUST: Grammar = Grammar {
    definitions: &[
        ("function_item", Role::Function),
        ("struct_item", Role::Type(ChunkKind::Class)),
        ("enum_item", Role::Type(ChunkKind::Class)),
        ("union_item", Role::Type(ChunkKind::Class)),
        ("trait_item", Role::Type(ChunkKind::Class)),
        ("impl_item", Role::Impl),
        ("mod_item", Role::Namespace),
    ],
    calls: &["call_expression"],
    self_names: &["self", "Self"],
    constructors: &[],
    visibility: VisibilityRule::Rust,
    macro_calls: true,
};

static PYTHON: Grammar = Grammar {
    definitions: &[
        ("function_definition", Role::Function),
        ("class_definition", Role::Type(ChunkKind::Class)),
    ],
    calls: &["call"],
    self_names: &["self", "cls"],
    constructors: &["__init__", "__new__"],
    visibility: VisibilityRule::Underscore,
    macro_calls: false,
};

static JAVASCRIPT: Grammar = Grammar {
    definitions: &[
        ("function_declaration", Role::Function),
        ("generator_function_declaration", Role::Function),
        ("method_definition", Role::Function),
        ("variable_declarator", Role::Function),
        ("class_declaration", Role::Type(ChunkKind::Class)),
    ],
    calls: &["call_expression", "new_expression"],
    self_names: &["this"],
    constructors: &["constructor"],
    visibility: VisibilityRule::JavaScript,
    macro_calls: false,
};

static TYPESCRIPT: Grammar = Grammar {
    definitions: &[
        ("function_declaration", Role::Function),
        ("generator_function_declaration", Role::Function),
        ("method_definition", Role::Function),
        ("variable_declarator", Role::Function),
        ("class_declaration", Role::Type(ChunkKind::Class)),
        ("abstract_class_declaration", Role::Type(ChunkKind::Class)),
        ("interface_declaration", Role::Type(ChunkKind::Class)),
        ("internal_module", Role::Namespace),
    ],
    calls: &["call_expression", "new_expression"],
    self_names: &["this"],
    constructors: &["constructor"],
    visibility: VisibilityRule::JavaScript,
    macro_calls: false,
};

static GO: Grammar = Grammar {
    definitions: &[
        ("function_declaration", Role::Function),
        ("method_declaration", Role::Function),
        ("type_spec", Role::Type(ChunkKind::Class)),
    ],
    calls: &["call_expression"],
    self_names: &[],
    constructors: &[],
    visibility: VisibilityRule::Capitalized,
    macro_calls: false,
};

static JAVA: Grammar = Grammar {
    definitions: &[
        ("method_declaration", Role::Function),
        ("constructor_declaration", Role::Function),
        ("class_declaration", Role::Type(ChunkKind::Class)),
        ("interface_declaration", Role::Type(ChunkKind::Class)),
        ("enum_declaration", Role::Type(ChunkKind::Class)),
        ("record_declaration", Role::Type(ChunkKind::Class)),
    ],
    calls: &["method_invocation", "object_creation_expression"],
    self_names: &["this"],
    constructors: &[],
    visibility: VisibilityRule::Modifiers,
    macro_calls: false,
};

static C: Grammar = Grammar {
    definitions: &[
        ("function_definition", Role::Function),
        ("struct_specifier", Role::Type(ChunkKind::Class)),
    ],
    calls: &["call_expression"],
    self_names: &[],
    constructors: &[],
    visibility: VisibilityRule::StorageClass,
    macro_calls: false,
};

static CPP: Grammar = Grammar {
    definitions: &[
        ("function_definition", Role::Function),
        ("class_specifier", Role::Type(ChunkKind::Class)),
        ("struct_specifier", Role::Type(ChunkKind::Class)),
        ("namespace_definition", Role::Namespace),
    ],
    calls: &["call_expression", "new_expression"],
    self_names: &["this"],
    constructors: &[],
    visibility: VisibilityRule::StorageClass,
    macro_calls: false,
};

static RUBY: Grammar = Grammar {
    definitions: &[
        ("method", Role::Function),
        ("singleton_method", Role::Function),
        ("class", Role::Type(ChunkKind::Class)),
        ("module", Role::Type(ChunkKind::Module)),
    ],
    calls: &["call"],
    self_names: &["self"],
    constructors: &["initialize"],
    visibility: VisibilityRule::None,
    macro_calls: false,
};

static PHP: Grammar = Grammar {
    definitions: &[
        ("function_definition", Role::Function),
        ("method_declaration", Role::Function),
        ("class_declaration", Role::Type(ChunkKind::Class)),
        ("interface_declaration", Role::Type(ChunkKind::Class)),
        ("trait_declaration", Role::Type(ChunkKind::Class)),
        ("namespace_definition", Role::Namespace),
    ],
    calls: &[
        "function_call_expression",
        "member_call_expression",
        "nullsafe_member_call_expression",
        "scoped_call_expression",
        "object_creation_expression",
    ],
    self_names: &["$this", "self", "static"],
    constructors: &["__construct"],
    visibility: VisibilityRule::Modifiers,
    macro_calls: false,
};

/// Grammar table for `language`, or `None` if it has no tree-sitter grammar.
pub(crate) fn grammar_for(language: Language) -> Option<&'static Grammar> {
    match language {
        Language::Rust => Some(&RUST),
        Language::Python => Some(&PYTHON),
        Language::JavaScript => Some(&JAVASCRIPT),
        Language::TypeScript | Language::Tsx => Some(&TYPESCRIPT),
        Language::Go => Some(&GO),
        Language::Java => Some(&JAVA),
        Language::C => Some(&C),
        Language::Cpp => Some(&CPP),
        Language::Ruby => Some(&RUBY),
        Language::Php => Some(&PHP),
        Language::Kotlin
        | Language::Swift
        | Language::CSharp
        | Language::Scala
        | Language::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_grammar_language_has_a_table() {
        for language in [
            Language::Rust,
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Tsx,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Ruby,
            Language::Php,
        ] {
            assert!(language.tree_sitter_language().is_some());
            assert!(grammar_for(language).is_some(), "no table for {language}");
        }
        assert!(grammar_for(Language::Kotlin).is_none());
    }

    #[test]
    fn role_lookup() {
        assert_eq!(RUST.role("impl_item"), Some(Role::Impl));
        assert_eq!(PYTHON.role("class_definition"), Some(Role::Type(ChunkKind::Class)));
        assert_eq!(GO.role("call_expression"), None);
        assert!(JAVA.is_call("method_invocation"));
    }
}
