//! Query-driven symbol extraction from source bytes.
//!
//! Given a file extension and raw content, the extractor resolves the
//! language's capture patterns from the registry, parses the content into
//! a syntax tree once, and runs every pattern against that tree. Each
//! pattern executes independently and folds into a best-effort aggregate:
//! a pattern that fails leaves the others untouched.
//!
//! Results are deduplicated by `(name, kind, start_line, end_line)` with
//! first-seen order preserved - the common case being a general definition
//! pattern and a language-specific refinement both matching the same node -
//! and finally ordered by ascending `start_line`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, QueryCursor};

use crate::error::{Result, SymdexError};
use crate::registry::{self, CompiledPattern};
use crate::types::Symbol;

/// Longest snippet we keep per symbol. Snippets are the first line of the
/// definition; anything longer is machine-generated noise.
const MAX_SNIPPET_CHARS: usize = 200;

/// Reusable extractor holding one tree-sitter parser.
///
/// Tree-sitter parsers are not thread-safe; callers that extract in
/// parallel keep one extractor per worker (see the thread-local in
/// `extraction::extract`).
pub struct SymbolExtractor {
    parser: Parser,
}

impl SymbolExtractor {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Extract symbols from `content`, treated as a file with the given
    /// extension.
    ///
    /// - Unregistered extension: `Ok(vec![])` - not an error.
    /// - Content that is not valid UTF-8: `Err(NonUtf8)` - the caller
    ///   yields empty symbols and must not cache the result.
    /// - A pattern that fails during execution is logged and skipped; the
    ///   remaining patterns still contribute.
    pub fn extract(
        &mut self,
        extension: &str,
        rel_fname: &str,
        content: &[u8],
    ) -> Result<Vec<Symbol>> {
        let Some(definition) = registry::lookup(extension) else {
            return Ok(Vec::new());
        };

        let source = std::str::from_utf8(content).map_err(|_| SymdexError::NonUtf8 {
            path: PathBuf::from(rel_fname),
        })?;

        if self.parser.set_language(&definition.language).is_err() {
            tracing::warn!(
                target: "symdex::extraction",
                language = definition.language_id,
                "grammar rejected by parser (version skew); yielding no symbols"
            );
            return Ok(Vec::new());
        }

        let Some(tree) = self.parser.parse(source, None) else {
            tracing::debug!(
                target: "symdex::extraction",
                file = rel_fname,
                "parser produced no tree"
            );
            return Ok(Vec::new());
        };

        let rel: Arc<str> = Arc::from(rel_fname);
        let mut symbols = Vec::new();

        for pattern in &definition.patterns {
            match run_pattern(pattern, tree.root_node(), source, &rel) {
                Ok(matches) => symbols.extend(matches),
                Err(err) => {
                    tracing::warn!(
                        target: "symdex::extraction",
                        pattern = pattern.id,
                        file = rel_fname,
                        error = %err,
                        "capture pattern failed; continuing with remaining patterns"
                    );
                }
            }
        }

        dedup_and_order(&mut symbols);
        Ok(symbols)
    }
}

impl Default for SymbolExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute one compiled pattern against the parsed tree.
fn run_pattern(
    pattern: &CompiledPattern,
    root: Node<'_>,
    source: &str,
    rel: &Arc<str>,
) -> Result<Vec<Symbol>> {
    let mut out = Vec::new();
    let mut cursor = QueryCursor::new();
    let bytes = source.as_bytes();

    let mut matches = cursor.matches(&pattern.query, root, bytes);
    while let Some(m) = matches.next() {
        let Some(name_node) = m.nodes_for_capture_index(pattern.name_index).next() else {
            continue;
        };
        let Some(def_node) = m.nodes_for_capture_index(pattern.def_index).next() else {
            continue;
        };

        let name = name_node.utf8_text(bytes).unwrap_or("");
        // Skip empty or single-symbol noise names
        if name.is_empty()
            || (name.len() == 1 && !name.chars().next().is_some_and(|c| c.is_alphabetic()))
        {
            continue;
        }

        let (start_line, end_line) = body_span(&def_node);
        let snippet = snippet_of(def_node.utf8_text(bytes).unwrap_or(""));

        out.push(Symbol {
            name: Arc::from(name),
            kind: pattern.kind,
            start_line,
            end_line,
            snippet: Arc::from(snippet.as_str()),
            rel_fname: rel.clone(),
        });
    }

    Ok(out)
}

/// Convert a node's byte/row span to the 1-indexed, end-inclusive line
/// convention used throughout symdex.
///
/// Tree-sitter end positions point one past the node's last byte; a node
/// whose text ends with a newline therefore reports an end row on the
/// following line, which we pull back so `end_line` is the last line the
/// body actually occupies.
fn body_span(node: &Node<'_>) -> (u32, u32) {
    let start = node.start_position().row as u32 + 1;
    let end_pos = node.end_position();
    let mut end = end_pos.row as u32 + 1;
    if end_pos.column == 0 && end > start {
        end -= 1;
    }
    (start, end.max(start))
}

/// First line of the definition's text, trimmed and capped.
fn snippet_of(text: &str) -> String {
    let first = text.lines().next().unwrap_or("");
    first.trim().chars().take(MAX_SNIPPET_CHARS).collect()
}

/// Dedup by `(name, kind, start_line, end_line)` preserving first-seen
/// order, then sort ascending by `start_line` (stable, so first-seen order
/// survives among symbols starting on the same line).
fn dedup_and_order(symbols: &mut Vec<Symbol>) {
    let mut seen = HashSet::with_capacity(symbols.len());
    symbols.retain(|s| seen.insert(s.identity()));
    symbols.sort_by_key(|s| s.start_line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn extract(ext: &str, code: &str) -> Vec<Symbol> {
        let mut extractor = SymbolExtractor::new();
        extractor.extract(ext, "test_file", code.as_bytes()).unwrap()
    }

    #[test]
    fn test_rust_extraction() {
        let code = "\
pub struct Config {
    pub retries: u32,
}

impl Config {
    pub fn new() -> Self {
        Self { retries: 3 }
    }
}

fn standalone() {
    println!(\"hi\");
}
";
        let symbols = extract("rs", code);

        let config = symbols
            .iter()
            .find(|s| s.name.as_ref() == "Config" && s.kind == SymbolKind::Struct)
            .expect("struct Config");
        assert_eq!(config.start_line, 1);
        assert_eq!(config.end_line, 3);

        let new_fn = symbols
            .iter()
            .find(|s| s.name.as_ref() == "new")
            .expect("method new");
        assert_eq!(new_fn.kind, SymbolKind::Method);
        assert_eq!(new_fn.start_line, 6);
        assert_eq!(new_fn.end_line, 8);

        let standalone = symbols
            .iter()
            .find(|s| s.name.as_ref() == "standalone")
            .expect("fn standalone");
        assert_eq!(standalone.kind, SymbolKind::Function);
        assert!(standalone.snippet.as_ref().starts_with("fn standalone"));
    }

    #[test]
    fn test_python_extraction() {
        let code = "\
class Greeter:
    def hello(self):
        return 'hi'

def main():
    pass
";
        let symbols = extract("py", code);

        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "Greeter" && s.kind == SymbolKind::Class));
        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "hello" && s.kind == SymbolKind::Method));
        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "main" && s.kind == SymbolKind::Function));
    }

    #[test]
    fn test_typescript_extraction() {
        let code = "\
export interface Shape {
    area(): number;
}

export class Circle {
    radius: number;
    area() { return 3.14 * this.radius * this.radius; }
}
";
        let symbols = extract("ts", code);

        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "Shape" && s.kind == SymbolKind::Interface));
        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "Circle" && s.kind == SymbolKind::Class));
        assert!(symbols
            .iter()
            .any(|s| s.name.as_ref() == "area" && s.kind == SymbolKind::Method));
    }

    #[test]
    fn test_ordering_is_ascending_by_start_line() {
        let code = "\
fn zeta() {}

fn alpha() {}

struct Mid;
";
        let symbols = extract("rs", code);
        let lines: Vec<u32> = symbols.iter().map(|s| s.start_line).collect();
        let mut sorted = lines.clone();
        sorted.sort_unstable();
        assert_eq!(lines, sorted);
    }

    #[test]
    fn test_no_duplicate_identities() {
        // Python decorated + plain method patterns both walk class bodies;
        // whatever overlaps, identities must stay unique.
        let code = "\
class C:
    @property
    def value(self):
        return 1

    def plain(self):
        return 2
";
        let symbols = extract("py", code);
        let mut seen = std::collections::HashSet::new();
        for s in &symbols {
            assert!(seen.insert(s.identity()), "duplicate symbol: {:?}", s);
        }
    }

    #[test]
    fn test_unregistered_extension_yields_empty() {
        assert!(extract("xyz", "whatever content").is_empty());
    }

    #[test]
    fn test_non_utf8_content_is_an_error() {
        let mut extractor = SymbolExtractor::new();
        let result = extractor.extract("rs", "bad.rs", &[0xff, 0xfe, 0x00, 0x01]);
        assert!(matches!(result, Err(SymdexError::NonUtf8 { .. })));
    }

    #[test]
    fn test_snippet_is_first_line_trimmed() {
        assert_eq!(snippet_of("  fn foo() {\n    body\n}"), "fn foo() {");
        assert_eq!(snippet_of(""), "");
        let long = "x".repeat(500);
        assert_eq!(snippet_of(&long).len(), MAX_SNIPPET_CHARS);
    }

    #[test]
    fn test_dedup_preserves_first_seen() {
        let mk = |name: &str, start: u32| Symbol {
            name: name.into(),
            kind: SymbolKind::Function,
            start_line: start,
            end_line: start,
            snippet: "".into(),
            rel_fname: "f.rs".into(),
        };
        let mut symbols = vec![mk("b", 2), mk("a", 1), mk("b", 2), mk("c", 1)];
        dedup_and_order(&mut symbols);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_ref()).collect();
        // "a" was seen before "c" at line 1; duplicate "b" collapsed
        assert_eq!(names, vec!["a", "c", "b"]);
    }
}
