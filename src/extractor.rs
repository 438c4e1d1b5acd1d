//! Lexical declaration extraction.
//!
//! These are deliberately coarse, false-positive-tolerant regex matches, not a
//! parser: keyword-shaped text in comments or preprocessor-disabled blocks can
//! over- or under-match, and no correction pass is performed.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Line-anchored declaration match: optional access qualifier, optional
/// modifier keywords, a type keyword, then the name token up to an
/// inheritance colon, open brace, where clause, or generic open bracket.
fn type_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:public|internal|private|protected)?\s*(?:static\s+|abstract\s+|sealed\s+|partial\s+)*(?:class|struct|interface|enum)\s+([A-Za-z_][A-Za-z0-9_<>,\s]*?)\s*(?::|\{|where|<)",
        )
        .unwrap()
    })
}

/// Unanchored variant used for enclosing-declaration lookup, where the
/// declaration of interest may share a line with the previous block's close.
fn enclosing_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:\b(?:public|internal|private|protected)\s+)?(?:(?:static|abstract|sealed|partial)\s+)*\b(?:class|struct|interface|enum)\s+([A-Za-z_][A-Za-z0-9_<>,\s]*?)\s*(?::|\{|where|<)",
        )
        .unwrap()
    })
}

/// Strip generic parameters (everything from the first `<`) from a captured
/// declaration name and trim it.
fn strip_generics(raw: &str) -> &str {
    raw.split('<').next().unwrap_or("").trim()
}

/// Extract the set of declared type base names from file content.
///
/// Generic suffixes and multi-declaration artifacts (anything from the first
/// `,`) are stripped; duplicates collapse.
pub fn extract_type_names(content: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for cap in type_decl_re().captures_iter(content) {
        let raw = cap[1].trim();
        let base = strip_generics(raw);
        let base = base.split(',').next().unwrap_or("").trim();
        if !base.is_empty() {
            found.insert(base.to_string());
        }
    }
    found
}

/// Return the name of the nearest declaration strictly preceding `offset`.
///
/// This is a backward nearest-neighbor search over the text before `offset`,
/// not a scope-aware one: brace balance is not verified, so a reference
/// sitting between one type's closing brace and the next declaration is
/// attributed to the prior type. Name capture here keeps commas (nested
/// generic constraints are common at this depth); only the generic suffix is
/// stripped.
pub fn find_enclosing_declaration(content: &str, offset: usize) -> Option<String> {
    let mut end = offset.min(content.len());
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let head = &content[..end];

    let mut nearest: Option<String> = None;
    for cap in enclosing_decl_re().captures_iter(head) {
        let base = strip_generics(cap[1].trim());
        if !base.is_empty() {
            nearest = Some(base.to_string());
        }
    }
    nearest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_class_declaration_yields_base_name() {
        let names = extract_type_names("public class Foo<T> : Base {");
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["Foo".to_string()]);
    }

    #[test]
    fn all_four_type_kinds_are_extracted() {
        let src = r#"
namespace Acme.Things
{
    public sealed class Widget : IWidget
    {
    }

    internal struct Point { public int X; }

    interface IWidget
    {
    }

    public enum Mode : byte
    {
        On,
        Off,
    }
}
"#;
        let names: Vec<String> = extract_type_names(src).into_iter().collect();
        assert_eq!(names, vec!["IWidget", "Mode", "Point", "Widget"]);
    }

    #[test]
    fn duplicates_collapse_and_partials_count_once() {
        let src = "partial class Split {\n}\npublic partial class Split {\n}\n";
        let names = extract_type_names(src);
        assert_eq!(names.len(), 1);
        assert!(names.contains("Split"));
    }

    #[test]
    fn indented_and_modifier_heavy_declarations_match() {
        let src = "    public static abstract partial class Helper where T : new() {";
        let names = extract_type_names(src);
        assert!(names.contains("Helper"), "got: {names:?}");
    }

    #[test]
    fn non_declaration_usages_do_not_match() {
        let src = "var x = new Widget();\n// class in a comment only counts when keyword-shaped\nreturn typeof(Widget);\n";
        let names = extract_type_names(src);
        assert!(!names.contains("Widget"));
    }

    #[test]
    fn enclosing_declaration_is_nearest_preceding() {
        let text = "class A {\n void X() {}\n} class B { void M(){ \"usp_X\" } }";
        let offset = text.find("usp_X").unwrap();
        assert_eq!(find_enclosing_declaration(text, offset).as_deref(), Some("B"));
    }

    #[test]
    fn enclosing_declaration_before_any_type_is_none() {
        let text = "using System;\n// \"usp_Orphan\" referenced before any declaration\nclass Later {}";
        let offset = text.find("usp_Orphan").unwrap();
        assert_eq!(find_enclosing_declaration(text, offset), None);
    }

    #[test]
    fn enclosing_declaration_strips_generics_only() {
        let text = "public class Repo<TKey, TValue> : Base<TKey> {\n    void Load() { Exec(\"usp_Load\"); }\n}";
        let offset = text.find("usp_Load").unwrap();
        assert_eq!(find_enclosing_declaration(text, offset).as_deref(), Some("Repo"));
    }
}
