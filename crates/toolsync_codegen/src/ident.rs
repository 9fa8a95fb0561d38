//! Identifier derivation and collision resolution.

use std::collections::HashSet;

/// Words that cannot be used as TypeScript binding names
const RESERVED_WORDS: &[&str] = &[
    "any", "as", "async", "await", "boolean", "break", "case", "catch", "class", "const",
    "constructor", "continue", "debugger", "declare", "default", "delete", "do", "else", "enum",
    "export", "extends", "false", "finally", "for", "from", "function", "get", "if",
    "implements", "import", "in", "instanceof", "interface", "let", "module", "namespace", "new",
    "null", "number", "of", "package", "private", "protected", "public", "require", "return",
    "set", "static", "string", "super", "switch", "symbol", "this", "throw", "true", "try",
    "type", "typeof", "undefined", "var", "void", "while", "with", "yield",
];

/// Whether `word` is reserved in TypeScript
#[must_use]
pub fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// camelCase identifier for an operation name.
///
/// Non-alphanumeric runs become word boundaries. The first word is lowercased
/// at its first character; later words are capitalised at theirs. Leading
/// digits get a `_` prefix, reserved words a trailing `_`, and an empty
/// result becomes `operation`.
#[must_use]
pub fn base_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if out.is_empty() {
                out.push(first.to_ascii_lowercase());
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.extend(chars);
        }
    }

    if out.is_empty() {
        return "operation".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if is_reserved(&out) {
        out.push('_');
    }
    out
}

/// PascalCase form of an identifier, for type names
#[must_use]
pub fn pascal_case(ident: &str) -> String {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Hands out unique identifiers within one service.
///
/// Uniqueness is checked case-insensitively because each identifier also
/// names a file. Repeated runs over the same input order produce the same
/// identifiers.
#[derive(Debug, Clone, Default)]
pub struct IdentifierAllocator {
    used: HashSet<String>,
}

impl IdentifierAllocator {
    /// Empty allocator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the identifier for `name`, suffixing `__2`, `__3`, ... on collision
    pub fn allocate(&mut self, name: &str) -> String {
        let base = base_identifier(name);
        let mut candidate = base.clone();
        let mut n = 2usize;
        while !self.used.insert(candidate.to_ascii_lowercase()) {
            candidate = format!("{}__{}", base, n);
            n += 1;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base_identifier() {
        assert_eq!(base_identifier("get-user"), "getUser");
        assert_eq!(base_identifier("get_user"), "getUser");
        assert_eq!(base_identifier("GetUser"), "getUser");
        assert_eq!(base_identifier("list_PRs"), "listPRs");
        assert_eq!(base_identifier("search.repos/v2"), "searchReposV2");
        assert_eq!(base_identifier("2fa-check"), "_2faCheck");
        assert_eq!(base_identifier("delete"), "delete_");
        assert_eq!(base_identifier("---"), "operation");
    }

    #[test]
    fn test_collisions_get_numeric_suffix() {
        let mut alloc = IdentifierAllocator::new();
        assert_eq!(alloc.allocate("get-user"), "getUser");
        assert_eq!(alloc.allocate("get_user"), "getUser__2");
        assert_eq!(alloc.allocate("get user"), "getUser__3");
        assert_eq!(alloc.allocate("getuser"), "getuser__2");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("getUser__2"), "GetUser__2");
        assert_eq!(pascal_case("_2fa"), "_2fa");
    }

    proptest! {
        #[test]
        fn prop_allocations_are_unique_and_stable(
            names in prop::collection::vec("[a-zA-Z_ -]{0,8}", 0..20)
        ) {
            let mut first = IdentifierAllocator::new();
            let a: Vec<String> = names.iter().map(|n| first.allocate(n)).collect();
            let mut second = IdentifierAllocator::new();
            let b: Vec<String> = names.iter().map(|n| second.allocate(n)).collect();
            prop_assert_eq!(&a, &b);

            let lowered: HashSet<String> = a.iter().map(|s| s.to_ascii_lowercase()).collect();
            prop_assert_eq!(lowered.len(), a.len());
        }
    }
}
