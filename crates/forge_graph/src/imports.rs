//! Import statement extraction.
//!
//! Each language gets a small hand-written scanner rather than a full parser:
//! comments are blanked out first so commented-out imports do not create
//! edges, then the import forms the grapher cares about are matched. Anything
//! that is not an import form is ignored.

use crate::language::SourceLanguage;

/// How an import specifier should be resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportStyle {
    /// A file path, resolved against the importing file's directory.
    Path,
    /// A bare package name or URL. Always an external leaf.
    Package,
    /// A dotted, package-qualified type name (`com.example.Util`), resolved
    /// to `com/example/Util.<ext>` under any source root.
    Qualified,
    /// A module name the platform SDK provides (`import UIKit`, `using System;`).
    Module,
}

/// One import found in a source file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportRef {
    /// The specifier as written.
    pub specifier: String,
    /// How to resolve it.
    pub style: ImportStyle,
}

impl ImportRef {
    fn new(specifier: impl Into<String>, style: ImportStyle) -> Self {
        Self {
            specifier: specifier.into(),
            style,
        }
    }
}

/// Extracts the imports of a source file, in order of appearance, without
/// duplicates.
pub fn parse_imports(language: SourceLanguage, source: &str) -> Vec<ImportRef> {
    let refs = match language {
        SourceLanguage::Script => script_imports(&strip_comments(source, true)),
        SourceLanguage::Style => style_imports(&strip_comments(source, false)),
        SourceLanguage::Html => html_imports(&strip_html_comments(source)),
        SourceLanguage::Poh => poh_imports(source),
        SourceLanguage::Java | SourceLanguage::Kotlin => {
            jvm_imports(&strip_comments(source, true))
        }
        SourceLanguage::Swift => swift_imports(&strip_comments(source, true)),
        SourceLanguage::CSharp => csharp_imports(&strip_comments(source, true)),
    };

    let mut seen = std::collections::HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.clone())).collect()
}

/// Classifies a script specifier: relative or absolute paths are files,
/// everything else is a package.
fn script_style(spec: &str) -> ImportStyle {
    if spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec == "."
        || spec == ".."
    {
        ImportStyle::Path
    } else {
        ImportStyle::Package
    }
}

/// Classifies a document specifier (HTML, CSS): anything with a scheme is a
/// package, everything else is a path.
fn document_style(spec: &str) -> ImportStyle {
    if spec.contains(':') || spec.starts_with("//") {
        ImportStyle::Package
    } else {
        ImportStyle::Path
    }
}

fn script_imports(source: &str) -> Vec<ImportRef> {
    let mut refs = Vec::new();
    for (start, literal) in string_literals(source) {
        let before = source[..start].trim_end();
        let is_import = if let Some(call) = before.strip_suffix('(') {
            let call = call.trim_end();
            ends_with_word(call, "require") || ends_with_word(call, "import")
        } else {
            ends_with_word(before, "from") || ends_with_word(before, "import")
        };
        if is_import && !literal.is_empty() {
            refs.push(ImportRef::new(literal, script_style(literal)));
        }
    }
    refs
}

fn style_imports(source: &str) -> Vec<ImportRef> {
    let mut refs = Vec::new();
    let mut rest = source;
    while let Some(pos) = rest.find("@import") {
        rest = &rest[pos + "@import".len()..];
        let mut clause = rest.trim_start();
        // One `@import` may list several sheets separated by commas.
        loop {
            let (spec, remaining) = if let Some(after) = clause.strip_prefix("url(") {
                match after.find(')') {
                    Some(end) => (
                        after[..end]
                            .trim()
                            .trim_matches(|c: char| c == '"' || c == '\''),
                        &after[end + 1..],
                    ),
                    None => break,
                }
            } else if let Some(quote) = clause.chars().next().filter(|c| *c == '"' || *c == '\'') {
                match clause[1..].find(quote) {
                    Some(end) => (&clause[1..1 + end], &clause[end + 2..]),
                    None => break,
                }
            } else {
                break;
            };
            if !spec.is_empty() {
                refs.push(ImportRef::new(spec, document_style(spec)));
            }
            match remaining.trim_start().strip_prefix(',') {
                Some(next) => clause = next.trim_start(),
                None => break,
            }
        }
    }
    refs
}

fn html_imports(source: &str) -> Vec<ImportRef> {
    let lower = source.to_ascii_lowercase();
    let mut refs = Vec::new();
    for (tag, attr) in [("<script", "src"), ("<link", "href")] {
        let mut offset = 0;
        while let Some(pos) = lower[offset..].find(tag) {
            let tag_start = offset + pos + tag.len();
            let tag_end = lower[tag_start..]
                .find('>')
                .map_or(lower.len(), |e| tag_start + e);
            let body = &source[tag_start..tag_end];
            if let Some(value) = attribute_value(body, &lower[tag_start..tag_end], attr) {
                if !value.is_empty() && !value.starts_with('#') {
                    refs.push(ImportRef::new(value, document_style(value)));
                }
            }
            offset = tag_end;
        }
    }
    refs
}

/// Finds `name=value` inside a tag body. `lower` is the ASCII-lowercased body.
fn attribute_value<'a>(body: &'a str, lower: &str, name: &str) -> Option<&'a str> {
    let mut offset = 0;
    while let Some(pos) = lower[offset..].find(name) {
        let start = offset + pos;
        let end = start + name.len();
        offset = end;
        let preceded_by_space = lower[..start].ends_with(|c: char| c.is_ascii_whitespace());
        let rest = lower[end..].trim_start();
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }
        let value_start = lower.len() - rest.len() + 1;
        let raw = body[value_start..].trim_start();
        let value = match raw.chars().next() {
            Some(q @ ('"' | '\'')) => raw[1..].split(q).next().unwrap_or(""),
            _ => raw
                .split(|c: char| c.is_ascii_whitespace() || c == '>')
                .next()
                .unwrap_or(""),
        };
        return Some(value.trim());
    }
    None
}

fn poh_imports(source: &str) -> Vec<ImportRef> {
    source
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("Import"))
        .filter_map(|rest| {
            let rest = rest.trim_start();
            let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let inner = &rest[1..];
            inner.find(quote).map(|end| &inner[..end])
        })
        .filter(|spec| !spec.is_empty())
        .map(|spec| ImportRef::new(spec, document_style(spec)))
        .collect()
}

fn jvm_imports(source: &str) -> Vec<ImportRef> {
    source
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("import "))
        .filter_map(|rest| {
            let rest = rest.trim_start();
            let rest = rest.strip_prefix("static ").unwrap_or(rest).trim_start();
            let name = rest
                .split(|c: char| c == ';' || c.is_whitespace())
                .next()
                .unwrap_or("");
            (!name.is_empty()).then_some(name)
        })
        .map(|name| match name.strip_suffix(".*") {
            Some(package) => ImportRef::new(package, ImportStyle::Module),
            None => ImportRef::new(name, ImportStyle::Qualified),
        })
        .collect()
}

fn swift_imports(source: &str) -> Vec<ImportRef> {
    const KINDS: &[&str] = &[
        "typealias", "struct", "class", "enum", "protocol", "let", "var", "func",
    ];
    source
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let line = line.strip_prefix("@testable ").unwrap_or(line);
            line.strip_prefix("import ")
        })
        .filter_map(|rest| {
            let mut words = rest.split_whitespace();
            let mut word = words.next()?;
            if KINDS.contains(&word) {
                word = words.next()?;
            }
            word.split('.').next().filter(|m| !m.is_empty())
        })
        .map(|module| ImportRef::new(module, ImportStyle::Module))
        .collect()
}

fn csharp_imports(source: &str) -> Vec<ImportRef> {
    source
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let line = line.strip_prefix("global ").unwrap_or(line);
            let rest = line.strip_prefix("using ")?.strip_suffix(';')?;
            if rest.contains('(') {
                return None;
            }
            let rest = rest.trim();
            let rest = rest.strip_prefix("static ").unwrap_or(rest);
            let name = rest.rsplit('=').next().unwrap_or(rest).trim();
            (!name.is_empty() && !name.starts_with("var ")).then_some(name)
        })
        .map(|name| ImportRef::new(name, ImportStyle::Module))
        .collect()
}

/// Returns `true` if `text` ends with `word` as a whole identifier.
fn ends_with_word(text: &str, word: &str) -> bool {
    text.strip_suffix(word).is_some_and(|head| {
        !head
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
    })
}

/// Yields `(opening_quote_offset, contents)` for every quoted literal.
fn string_literals(source: &str) -> Vec<(usize, &str)> {
    let bytes = source.as_bytes();
    let mut literals = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let quote = bytes[i];
        if quote == b'"' || quote == b'\'' || quote == b'`' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != quote {
                if bytes[i] == b'\\' {
                    i += 1;
                } else if bytes[i] == b'\n' && quote != b'`' {
                    break;
                }
                i += 1;
            }
            let end = i.min(bytes.len());
            let content = &source[start + 1..end];
            if quote != b'`' || !content.contains("${") {
                literals.push((start, content));
            }
        }
        i += 1;
    }
    literals
}

/// Blanks out `/* */` comments (and `//` comments when `line_comments` is
/// set) while leaving string literals and line structure intact.
fn strip_comments(source: &str, line_comments: bool) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' | b'`' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len()
                    && bytes[i] != quote
                    && (quote == b'`' || bytes[i] != b'\n')
                {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = source[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |e| i + 2 + e + 2);
                blank(&mut out[i..end]);
                i = end;
            }
            b'/' if line_comments && bytes.get(i + 1) == Some(&b'/') => {
                let end = source[i..].find('\n').map_or(bytes.len(), |e| i + e);
                blank(&mut out[i..end]);
                i = end;
            }
            _ => i += 1,
        }
    }
    // Comment ranges start and end on ASCII bytes, so multi-byte sequences
    // are blanked whole and the result stays valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn strip_html_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Replaces every byte except newlines with a space.
fn blank(bytes: &mut [u8]) {
    for b in bytes.iter_mut().filter(|b| **b != b'\n') {
        *b = b' ';
    }
}
