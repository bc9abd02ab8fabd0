//! Source language detection by file extension.

use std::path::Path;

/// A source language whose imports the grapher understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    /// JavaScript and TypeScript (`.js`, `.jsx`, `.mjs`, `.cjs`, `.ts`, `.tsx`).
    Script,
    /// Stylesheets (`.css`, `.scss`).
    Style,
    /// HTML documents (`.html`, `.htm`).
    Html,
    /// PohLang (`.poh`).
    Poh,
    /// Java (`.java`).
    Java,
    /// Kotlin (`.kt`, `.kts`).
    Kotlin,
    /// Swift (`.swift`).
    Swift,
    /// C# (`.cs`).
    CSharp,
}

const SCRIPT_EXTS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx"];
const STYLE_EXTS: &[&str] = &["css", "scss"];
const POH_EXTS: &[&str] = &["poh"];
const JVM_EXTS: &[&str] = &["java", "kt"];

impl SourceLanguage {
    /// Detects the language from a file's extension.
    ///
    /// Returns `None` for unrecognized extensions.
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" => Some(Self::Script),
            "css" | "scss" => Some(Self::Style),
            "html" | "htm" => Some(Self::Html),
            "poh" => Some(Self::Poh),
            "java" => Some(Self::Java),
            "kt" | "kts" => Some(Self::Kotlin),
            "swift" => Some(Self::Swift),
            "cs" => Some(Self::CSharp),
            _ => None,
        }
    }

    /// Extensions probed when an import omits one.
    pub fn probe_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Script => SCRIPT_EXTS,
            Self::Style => STYLE_EXTS,
            Self::Poh => POH_EXTS,
            Self::Java | Self::Kotlin => JVM_EXTS,
            Self::Html | Self::Swift | Self::CSharp => &[],
        }
    }

    /// Whether a specifier without a leading `./` or `../` is still a path.
    ///
    /// HTML and stylesheets resolve `app.js` next to the document; scripts
    /// treat it as a package name.
    pub fn bare_specifiers_are_paths(self) -> bool {
        matches!(self, Self::Html | Self::Style | Self::Poh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_known_extensions() {
        assert_eq!(SourceLanguage::detect(Path::new("a.tsx")), Some(SourceLanguage::Script));
        assert_eq!(SourceLanguage::detect(Path::new("a.mjs")), Some(SourceLanguage::Script));
        assert_eq!(SourceLanguage::detect(Path::new("a.scss")), Some(SourceLanguage::Style));
        assert_eq!(SourceLanguage::detect(Path::new("index.html")), Some(SourceLanguage::Html));
        assert_eq!(SourceLanguage::detect(Path::new("main.poh")), Some(SourceLanguage::Poh));
        assert_eq!(SourceLanguage::detect(Path::new("Main.java")), Some(SourceLanguage::Java));
        assert_eq!(SourceLanguage::detect(Path::new("Main.kt")), Some(SourceLanguage::Kotlin));
        assert_eq!(SourceLanguage::detect(Path::new("App.swift")), Some(SourceLanguage::Swift));
        assert_eq!(SourceLanguage::detect(Path::new("App.cs")), Some(SourceLanguage::CSharp));
    }

    #[test]
    fn detect_unknown() {
        assert_eq!(SourceLanguage::detect(Path::new("README.md")), None);
        assert_eq!(SourceLanguage::detect(Path::new("Makefile")), None);
    }

    #[test]
    fn probe_extensions_per_family() {
        assert!(SourceLanguage::Script.probe_extensions().contains(&"ts"));
        assert!(SourceLanguage::Style.probe_extensions().contains(&"scss"));
        assert!(SourceLanguage::Html.probe_extensions().is_empty());
    }
}
