//! Entry-point policy: which chunks are always live.
//!
//! Combines explicit configuration with per-language conventions (program
//! entry names, test functions and files, framework handler names) and the
//! optional "public API is live" rule.

use std::collections::HashMap;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use sightline_core::{ChunkKind, ReachabilityConfig, SightlineError, Visibility, MODULE_SYMBOL};

use crate::symbols::Symbol;

/// Why a chunk seeds reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    /// Named in `[reachability] entry_points` or a language `entry_patterns`.
    Configured,
    /// Program entry or framework callback by naming convention.
    Convention,
    /// Test function or code in a test file.
    Test,
    /// Top-level code that runs when the file is loaded.
    ModuleCode,
    /// Exported symbol while `public_api_is_live` is set.
    PublicApi,
}

/// How one language spells entry points, tests and exports.
#[derive(Debug, Clone)]
struct LanguageRules {
    conventions: Vec<Pattern>,
    entry_patterns: Vec<Pattern>,
    test_patterns: Vec<Pattern>,
    /// Methods may implement an interface even without a visible marker.
    interface_candidates: bool,
}

const UNIVERSAL_ENTRIES: &[&str] = &["main", "init", "__init__", "__main__", "ServeHTTP", "ServeHTTPS"];
const UNIVERSAL_TESTS: &[&str] = &["Test*", "test_*", "Benchmark*", "Example*"];
const TEST_PATH_MARKERS: &[&str] = &["_test.", "/test/", "/tests/", "/testing/", ".test.js", ".test.ts", ".spec.ts"];

/// Built-in conventions for one language tag.
struct Builtin {
    language: &'static str,
    entries: &'static [&'static str],
    tests: &'static [&'static str],
    interface_candidates: bool,
}

const BUILTINS: &[Builtin] = &[
    Builtin {
        language: "go",
        entries: &["main", "init", "ServeHTTP"],
        tests: &["Test*", "Benchmark*", "Example*", "Fuzz*"],
        interface_candidates: true,
    },
    Builtin {
        language: "python",
        entries: &["main", "__main__", "__init__"],
        tests: &["test_*", "Test*"],
        interface_candidates: false,
    },
    Builtin {
        language: "javascript",
        entries: &["main", "default"],
        tests: &["test*", "it", "describe", "Test*"],
        interface_candidates: false,
    },
    Builtin {
        language: "typescript",
        entries: &["main", "default"],
        tests: &["test*", "it", "describe", "Test*"],
        interface_candidates: true,
    },
    Builtin {
        language: "java",
        entries: &["main"],
        tests: &["test*", "Test*"],
        interface_candidates: true,
    },
    Builtin {
        language: "rust",
        entries: &["main"],
        tests: &["test_*"],
        interface_candidates: true,
    },
    Builtin {
        language: "csharp",
        entries: &["Main"],
        tests: &["Test*"],
        interface_candidates: true,
    },
];

/// Decides which symbols are entry points.
///
/// # Examples
///
/// ```
/// use sightline_core::ReachabilityConfig;
/// use sightline_graph::EntryPolicy;
///
/// let mut config = ReachabilityConfig::default();
/// config.entry_points.push("run_server".into());
/// let policy = EntryPolicy::from_config(&config).unwrap();
/// assert!(!policy.public_api_is_live());
/// ```
#[derive(Debug, Clone)]
pub struct EntryPolicy {
    public_api_is_live: bool,
    explicit: Vec<Pattern>,
    languages: HashMap<String, LanguageRules>,
    universal_tests: Vec<Pattern>,
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self::from_config(&ReachabilityConfig::default()).unwrap_or_else(|_| Self {
            public_api_is_live: false,
            explicit: Vec::new(),
            languages: HashMap::new(),
            universal_tests: Vec::new(),
        })
    }
}

impl EntryPolicy {
    /// Build the policy from configuration plus built-in conventions.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Config`] if a configured pattern is not a valid glob.
    pub fn from_config(config: &ReachabilityConfig) -> Result<Self, SightlineError> {
        let mut languages = HashMap::new();
        for builtin in BUILTINS {
            languages.insert(
                builtin.language.to_string(),
                LanguageRules {
                    conventions: compile(builtin.entries.iter().copied())?,
                    entry_patterns: Vec::new(),
                    test_patterns: compile(builtin.tests.iter().copied())?,
                    interface_candidates: builtin.interface_candidates,
                },
            );
        }
        for (language, policy) in &config.languages {
            let rules = languages
                .entry(language.clone())
                .or_insert_with(|| LanguageRules {
                    conventions: Vec::new(),
                    entry_patterns: Vec::new(),
                    test_patterns: Vec::new(),
                    interface_candidates: false,
                });
            rules
                .entry_patterns
                .extend(compile(policy.entry_patterns.iter().map(String::as_str))?);
            rules
                .test_patterns
                .extend(compile(policy.test_patterns.iter().map(String::as_str))?);
        }

        Ok(Self {
            public_api_is_live: config.public_api_is_live,
            explicit: compile(config.entry_points.iter().map(String::as_str))?,
            languages,
            universal_tests: compile(UNIVERSAL_TESTS.iter().copied())?,
        })
    }

    pub fn public_api_is_live(&self) -> bool {
        self.public_api_is_live
    }

    /// Why `symbol` is an entry point, or `None` if it is not one.
    pub fn entry_reason(&self, symbol: &Symbol) -> Option<EntryReason> {
        let rules = self.languages.get(&symbol.language);

        if self
            .explicit
            .iter()
            .any(|p| p.matches(&symbol.name) || p.matches(&symbol.symbol_path) || p.matches(symbol.id.as_str()))
            || rules.is_some_and(|r| r.entry_patterns.iter().any(|p| p.matches(&symbol.name)))
        {
            return Some(EntryReason::Configured);
        }
        // Container modules (`mod x {}`, Ruby `module Util`) are owners,
        // live only through their members.
        if symbol.kind == ChunkKind::Module && symbol.symbol_path == MODULE_SYMBOL {
            return Some(EntryReason::ModuleCode);
        }
        if self.is_test(symbol) {
            return Some(EntryReason::Test);
        }
        if UNIVERSAL_ENTRIES.contains(&symbol.name.as_str())
            || is_handler_name(&symbol.name)
            || rules.is_some_and(|r| r.conventions.iter().any(|p| p.matches(&symbol.name)))
        {
            return Some(EntryReason::Convention);
        }
        if self.public_api_is_live && self.is_exported(symbol) {
            return Some(EntryReason::PublicApi);
        }
        None
    }

    /// Test function by attribute, name pattern, or file location.
    pub fn is_test(&self, symbol: &Symbol) -> bool {
        if symbol.flags.test {
            return true;
        }
        let by_name = |patterns: &[Pattern]| patterns.iter().any(|p| p.matches(&symbol.name));
        if symbol.kind.is_callable()
            && (by_name(&self.universal_tests)
                || self
                    .languages
                    .get(&symbol.language)
                    .is_some_and(|r| by_name(&r.test_patterns)))
        {
            return true;
        }
        is_test_path(&symbol.file_path.to_string_lossy())
    }

    /// Exported from its module by the language's own rules.
    pub fn is_exported(&self, symbol: &Symbol) -> bool {
        let first_upper = symbol.name.chars().next().is_some_and(char::is_uppercase);
        match symbol.language.as_str() {
            "go" => first_upper,
            "python" => !symbol.name.starts_with('_') || is_dunder(&symbol.name),
            "javascript" | "typescript" => {
                matches!(symbol.visibility, Visibility::Public | Visibility::Unknown)
            }
            "java" | "rust" | "csharp" => symbol.visibility == Visibility::Public,
            _ => symbol.visibility == Visibility::Public || first_upper,
        }
    }

    /// Methods in this language may implement interfaces implicitly.
    pub fn methods_are_interface_candidates(&self, language: &str) -> bool {
        self.languages
            .get(language)
            .is_some_and(|r| r.interface_candidates)
    }
}

fn compile<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<Vec<Pattern>, SightlineError> {
    patterns
        .into_iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| SightlineError::Config(format!("invalid entry pattern '{p}': {e}")))
        })
        .collect()
}

fn is_handler_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("handle") || lower.ends_with("handler")
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_test_path(path: &str) -> bool {
    let path = format!("/{}", path.replace('\\', "/").to_lowercase());
    if TEST_PATH_MARKERS.iter().any(|m| path.contains(m)) {
        return true;
    }
    let file = path.rsplit('/').next().unwrap_or("");
    file.starts_with("test_") && file.ends_with(".py")
}
