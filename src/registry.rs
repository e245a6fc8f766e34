//! Language query registry: file extension -> declarative capture patterns.
//!
//! Each supported language registers a [`LanguageQueryDefinition`]: a
//! tree-sitter grammar plus a set of capture patterns, where every pattern
//! maps one syntax-node shape to one [`SymbolKind`]. Adding a language is
//! an additive registration in this file - the extractor never grows
//! per-language code paths.
//!
//! # Pattern format
//!
//! Patterns use tree-sitter's query syntax with two captures:
//! - `@name` - the identifier node that names the symbol
//! - `@def`  - the entire definition node (its span becomes the symbol's
//!   body span)
//!
//! Patterns compile lazily, once per process. A pattern that fails to
//! compile against the active grammar version is logged and skipped so the
//! remaining patterns for that language still run - grammar/query skew
//! degrades extraction instead of breaking it.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tree_sitter::{Language, Query};

use crate::types::SymbolKind;

/// One declarative capture pattern: a node shape mapped to a symbol kind.
pub struct CapturePattern {
    /// Stable identifier for logging, e.g. "rust.function"
    pub id: &'static str,
    /// Symbol kind produced by matches of this pattern
    pub kind: SymbolKind,
    /// Tree-sitter query source with `@name` and `@def` captures
    pub query: &'static str,
}

/// Raw, data-only definition of a language's extraction rules.
struct LanguageSpec {
    language_id: &'static str,
    extensions: &'static [&'static str],
    grammar: fn() -> Language,
    patterns: &'static [CapturePattern],
}

/// A pattern compiled against its grammar, ready to execute.
pub struct CompiledPattern {
    pub id: &'static str,
    pub kind: SymbolKind,
    pub query: Query,
    pub name_index: u32,
    pub def_index: u32,
}

/// A language's compiled extraction rules.
///
/// `patterns` holds only the patterns that compiled successfully; the
/// registry may register a language with fewer patterns than its spec
/// declares when the linked grammar version has drifted.
pub struct LanguageQueryDefinition {
    pub language_id: &'static str,
    pub language: Language,
    pub patterns: Vec<CompiledPattern>,
}

macro_rules! pattern {
    ($id:literal, $kind:ident, $query:literal) => {
        CapturePattern {
            id: $id,
            kind: SymbolKind::$kind,
            query: $query,
        }
    };
}

const RUST_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "rust.function",
        Function,
        "(source_file (function_item name: (identifier) @name) @def)"
    ),
    pattern!(
        "rust.method",
        Method,
        "(impl_item body: (declaration_list (function_item name: (identifier) @name) @def))"
    ),
    pattern!(
        "rust.struct",
        Struct,
        "(struct_item name: (type_identifier) @name) @def"
    ),
    pattern!(
        "rust.enum",
        Enum,
        "(enum_item name: (type_identifier) @name) @def"
    ),
    pattern!(
        "rust.trait",
        Trait,
        "(trait_item name: (type_identifier) @name) @def"
    ),
    pattern!(
        "rust.module",
        Module,
        "(mod_item name: (identifier) @name) @def"
    ),
    pattern!(
        "rust.const",
        Constant,
        "(const_item name: (identifier) @name) @def"
    ),
    pattern!(
        "rust.static",
        Variable,
        "(static_item name: (identifier) @name) @def"
    ),
    pattern!(
        "rust.type_alias",
        TypeAlias,
        "(type_item name: (type_identifier) @name) @def"
    ),
];

const PYTHON_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "python.class",
        Class,
        "(class_definition name: (identifier) @name) @def"
    ),
    pattern!(
        "python.function",
        Function,
        "(module (function_definition name: (identifier) @name) @def)"
    ),
    pattern!(
        "python.function.decorated",
        Function,
        "(module (decorated_definition definition: (function_definition name: (identifier) @name) @def))"
    ),
    pattern!(
        "python.method",
        Method,
        "(class_definition body: (block (function_definition name: (identifier) @name) @def))"
    ),
    pattern!(
        "python.method.decorated",
        Method,
        "(class_definition body: (block (decorated_definition definition: (function_definition name: (identifier) @name) @def)))"
    ),
    pattern!(
        "python.assignment",
        Variable,
        "(module (expression_statement (assignment left: (identifier) @name) @def))"
    ),
];

const JAVASCRIPT_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "javascript.class",
        Class,
        "(class_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "javascript.function",
        Function,
        "(function_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "javascript.method",
        Method,
        "(method_definition name: (property_identifier) @name) @def"
    ),
    pattern!(
        "javascript.arrow",
        Function,
        "(variable_declarator name: (identifier) @name value: [(arrow_function) (function_expression)]) @def"
    ),
];

const TYPESCRIPT_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "typescript.class",
        Class,
        "(class_declaration name: (type_identifier) @name) @def"
    ),
    pattern!(
        "typescript.function",
        Function,
        "(function_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "typescript.method",
        Method,
        "(method_definition name: (property_identifier) @name) @def"
    ),
    pattern!(
        "typescript.arrow",
        Function,
        "(variable_declarator name: (identifier) @name value: [(arrow_function) (function_expression)]) @def"
    ),
    pattern!(
        "typescript.interface",
        Interface,
        "(interface_declaration name: (type_identifier) @name) @def"
    ),
    pattern!(
        "typescript.type_alias",
        TypeAlias,
        "(type_alias_declaration name: (type_identifier) @name) @def"
    ),
    pattern!(
        "typescript.enum",
        Enum,
        "(enum_declaration name: (identifier) @name) @def"
    ),
];

const GO_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "go.function",
        Function,
        "(function_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "go.method",
        Method,
        "(method_declaration name: (field_identifier) @name) @def"
    ),
    pattern!(
        "go.struct",
        Struct,
        "(type_declaration (type_spec name: (type_identifier) @name type: (struct_type)) @def)"
    ),
    pattern!(
        "go.interface",
        Interface,
        "(type_declaration (type_spec name: (type_identifier) @name type: (interface_type)) @def)"
    ),
    pattern!(
        "go.const",
        Constant,
        "(const_declaration (const_spec name: (identifier) @name) @def)"
    ),
    pattern!(
        "go.var",
        Variable,
        "(var_declaration (var_spec name: (identifier) @name) @def)"
    ),
];

const JAVA_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "java.class",
        Class,
        "(class_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "java.interface",
        Interface,
        "(interface_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "java.enum",
        Enum,
        "(enum_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "java.method",
        Method,
        "(method_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "java.constructor",
        Method,
        "(constructor_declaration name: (identifier) @name) @def"
    ),
    pattern!(
        "java.field",
        Variable,
        "(field_declaration declarator: (variable_declarator name: (identifier) @name)) @def"
    ),
];

const C_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "c.function",
        Function,
        "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @def"
    ),
    pattern!(
        "c.struct",
        Struct,
        "(struct_specifier name: (type_identifier) @name body: (field_declaration_list)) @def"
    ),
    pattern!(
        "c.enum",
        Enum,
        "(enum_specifier name: (type_identifier) @name body: (enumerator_list)) @def"
    ),
    pattern!(
        "c.typedef",
        TypeAlias,
        "(type_definition declarator: (type_identifier) @name) @def"
    ),
];

const CPP_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "cpp.function",
        Function,
        "(function_definition declarator: (function_declarator declarator: (identifier) @name)) @def"
    ),
    pattern!(
        "cpp.method",
        Method,
        "(field_declaration_list (function_definition declarator: (function_declarator declarator: (field_identifier) @name)) @def)"
    ),
    pattern!(
        "cpp.class",
        Class,
        "(class_specifier name: (type_identifier) @name body: (field_declaration_list)) @def"
    ),
    pattern!(
        "cpp.struct",
        Struct,
        "(struct_specifier name: (type_identifier) @name body: (field_declaration_list)) @def"
    ),
    pattern!(
        "cpp.enum",
        Enum,
        "(enum_specifier name: (type_identifier) @name body: (enumerator_list)) @def"
    ),
    pattern!(
        "cpp.typedef",
        TypeAlias,
        "(type_definition declarator: (type_identifier) @name) @def"
    ),
];

const RUBY_PATTERNS: &[CapturePattern] = &[
    pattern!(
        "ruby.class",
        Class,
        "(class name: (constant) @name) @def"
    ),
    pattern!(
        "ruby.module",
        Module,
        "(module name: (constant) @name) @def"
    ),
    pattern!(
        "ruby.method",
        Method,
        "(method name: (identifier) @name) @def"
    ),
    pattern!(
        "ruby.singleton_method",
        Method,
        "(singleton_method name: (identifier) @name) @def"
    ),
];

/// All registered languages. Adding a language means adding a row here.
const LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        language_id: "rust",
        extensions: &["rs"],
        grammar: || tree_sitter_rust::LANGUAGE.into(),
        patterns: RUST_PATTERNS,
    },
    LanguageSpec {
        language_id: "python",
        extensions: &["py", "pyi", "pyw"],
        grammar: || tree_sitter_python::LANGUAGE.into(),
        patterns: PYTHON_PATTERNS,
    },
    LanguageSpec {
        language_id: "javascript",
        extensions: &["js", "mjs", "cjs", "jsx"],
        grammar: || tree_sitter_javascript::LANGUAGE.into(),
        patterns: JAVASCRIPT_PATTERNS,
    },
    LanguageSpec {
        language_id: "typescript",
        extensions: &["ts", "mts", "cts"],
        grammar: || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        patterns: TYPESCRIPT_PATTERNS,
    },
    LanguageSpec {
        language_id: "tsx",
        extensions: &["tsx"],
        grammar: || tree_sitter_typescript::LANGUAGE_TSX.into(),
        patterns: TYPESCRIPT_PATTERNS,
    },
    LanguageSpec {
        language_id: "go",
        extensions: &["go"],
        grammar: || tree_sitter_go::LANGUAGE.into(),
        patterns: GO_PATTERNS,
    },
    LanguageSpec {
        language_id: "java",
        extensions: &["java"],
        grammar: || tree_sitter_java::LANGUAGE.into(),
        patterns: JAVA_PATTERNS,
    },
    LanguageSpec {
        language_id: "c",
        extensions: &["c", "h"],
        grammar: || tree_sitter_c::LANGUAGE.into(),
        patterns: C_PATTERNS,
    },
    LanguageSpec {
        language_id: "cpp",
        extensions: &["cpp", "cc", "cxx", "hpp", "hxx", "hh"],
        grammar: || tree_sitter_cpp::LANGUAGE.into(),
        patterns: CPP_PATTERNS,
    },
    LanguageSpec {
        language_id: "ruby",
        extensions: &["rb", "rake", "gemspec"],
        grammar: || tree_sitter_ruby::LANGUAGE.into(),
        patterns: RUBY_PATTERNS,
    },
];

/// Compiled registry, built once on first use.
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::build);

struct Registry {
    by_extension: HashMap<&'static str, usize>,
    definitions: Vec<LanguageQueryDefinition>,
}

impl Registry {
    fn build() -> Self {
        let mut by_extension = HashMap::new();
        let mut definitions = Vec::with_capacity(LANGUAGE_SPECS.len());

        for spec in LANGUAGE_SPECS {
            let language = (spec.grammar)();
            let mut patterns = Vec::with_capacity(spec.patterns.len());

            for raw in spec.patterns {
                match compile_pattern(&language, raw) {
                    Ok(compiled) => patterns.push(compiled),
                    Err(err) => {
                        // One bad pattern never poisons the language.
                        tracing::warn!(
                            target: "symdex::registry",
                            language = spec.language_id,
                            pattern = raw.id,
                            error = %err,
                            "skipping capture pattern that failed to compile"
                        );
                    }
                }
            }

            let idx = definitions.len();
            definitions.push(LanguageQueryDefinition {
                language_id: spec.language_id,
                language,
                patterns,
            });
            for ext in spec.extensions {
                by_extension.insert(*ext, idx);
            }
        }

        Self {
            by_extension,
            definitions,
        }
    }
}

fn compile_pattern(
    language: &Language,
    raw: &CapturePattern,
) -> crate::error::Result<CompiledPattern> {
    let query = Query::new(language, raw.query).map_err(|e| {
        crate::error::SymdexError::QueryCompile {
            language: raw.id.split('.').next().unwrap_or(raw.id),
            pattern: raw.id,
            message: e.to_string(),
        }
    })?;

    let name_index = query.capture_index_for_name("name");
    let def_index = query.capture_index_for_name("def");
    let (Some(name_index), Some(def_index)) = (name_index, def_index) else {
        return Err(crate::error::SymdexError::QueryCompile {
            language: raw.id.split('.').next().unwrap_or(raw.id),
            pattern: raw.id,
            message: "pattern must capture both @name and @def".into(),
        });
    };

    Ok(CompiledPattern {
        id: raw.id,
        kind: raw.kind,
        query,
        name_index,
        def_index,
    })
}

/// Look up the extraction rules for a file extension.
///
/// Pure, read-only, O(1). Unregistered extensions are not an error -
/// callers treat `None` as "extraction yields an empty list".
pub fn lookup(extension: &str) -> Option<&'static LanguageQueryDefinition> {
    let ext = extension.to_ascii_lowercase();
    let idx = *REGISTRY.by_extension.get(ext.as_str())?;
    Some(&REGISTRY.definitions[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_extensions() {
        assert_eq!(lookup("rs").unwrap().language_id, "rust");
        assert_eq!(lookup("py").unwrap().language_id, "python");
        assert_eq!(lookup("tsx").unwrap().language_id, "tsx");
        assert_eq!(lookup("go").unwrap().language_id, "go");
        assert_eq!(lookup("hpp").unwrap().language_id, "cpp");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup("RS").is_some());
        assert!(lookup("Py").is_some());
    }

    #[test]
    fn test_lookup_unknown_extension() {
        assert!(lookup("xyz").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_patterns_compile() {
        // Every registered language should keep at least one working
        // pattern against the grammar versions we link.
        for ext in ["rs", "py", "js", "ts", "go", "java", "c", "cpp", "rb"] {
            let def = lookup(ext).unwrap();
            assert!(
                !def.patterns.is_empty(),
                "no patterns compiled for {}",
                def.language_id
            );
        }
    }
}
