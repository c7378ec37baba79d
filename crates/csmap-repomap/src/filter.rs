//! Lexical heuristics that separate real type names from grammar noise.
//!
//! The C# grammar does not distinguish a type name from an arbitrary
//! identifier in error-recovery positions, so extracted names are vetted by
//! the predicates below. Each predicate is public so its false-positive rate
//! can be measured on its own.

/// Words never accepted as type names, compared case-insensitively.
const RESERVED: &[&str] = &[
    "class", "struct", "interface", "enum", "namespace", "using", "public", "private",
    "protected", "internal", "abstract", "sealed", "static", "partial", "readonly", "virtual",
    "override", "new", "void", "int", "string", "bool", "float", "double", "object", "var",
    "dynamic", "async", "await", "return", "if", "else", "for", "foreach", "while", "do",
    "switch", "case", "break", "continue", "throw", "try", "catch", "finally", "null", "true",
    "false",
];

/// Names shorter than this are rejected unless they are acronyms.
const MIN_TYPE_NAME_LEN: usize = 4;

/// Vowel-less names longer than this are treated as truncated tokens.
const MAX_VOWELLESS_LEN: usize = 5;

/// `[A-Za-z_][A-Za-z0-9_]*`
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::is_identifier;
///
/// assert!(is_identifier("_Pool2"));
/// assert!(!is_identifier("2D"));
/// assert!(!is_identifier("List<T>"));
/// ```
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether `name` is in the reserved-word set, ignoring case.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::is_reserved_word;
///
/// assert!(is_reserved_word("Object"));
/// assert!(!is_reserved_word("GameObject"));
/// ```
pub fn is_reserved_word(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    RESERVED.contains(&lower.as_str())
}

/// Field naming convention: `m_`, `s_`, or `c_` followed by anything.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::has_field_prefix;
///
/// assert!(has_field_prefix("m_Health"));
/// assert!(has_field_prefix("s_instance"));
/// assert!(!has_field_prefix("M_Health"));
/// ```
pub fn has_field_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && matches!(bytes[0], b'm' | b's' | b'c') && bytes[1] == b'_'
}

/// Starts with an uppercase letter or an underscore.
///
/// Interface names (`I` + uppercase) are covered by the uppercase rule.
pub fn has_type_initial(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || c == '_')
}

/// At least one letter and no lowercase letters, e.g. `UI`, `IO`, `HUD2`.
pub fn is_acronym(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic()) && !name.chars().any(|c| c.is_ascii_lowercase())
}

/// Long enough to be a real type name, or an acronym.
pub fn meets_min_length(name: &str) -> bool {
    name.len() >= MIN_TYPE_NAME_LEN || is_acronym(name)
}

/// Longer than five characters without a single vowel.
///
/// Upstream tree traversal over broken input can yield partial tokens such as
/// `PlyrCtrl`; those rarely contain vowels while real names almost always do.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::looks_truncated;
///
/// assert!(looks_truncated("PlyrCtrl"));
/// assert!(!looks_truncated("HTTP"));
/// assert!(!looks_truncated("Player"));
/// ```
pub fn looks_truncated(name: &str) -> bool {
    name.len() > MAX_VOWELLESS_LEN && !name.chars().any(|c| "aeiouAEIOU".contains(c))
}

/// Accept `name` as a type name only if every heuristic passes.
///
/// Applied identically to tree-based and lexical extraction.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::is_valid_type_name;
///
/// assert!(is_valid_type_name("PlayerController"));
/// assert!(is_valid_type_name("IDamageable"));
/// assert!(is_valid_type_name("UI"));
/// assert!(!is_valid_type_name("playerController"));
/// assert!(!is_valid_type_name("m_Player"));
/// assert!(!is_valid_type_name("Foo"));
/// assert!(!is_valid_type_name("String"));
/// ```
pub fn is_valid_type_name(name: &str) -> bool {
    is_identifier(name)
        && !is_reserved_word(name)
        && !has_field_prefix(name)
        && has_type_initial(name)
        && meets_min_length(name)
        && !looks_truncated(name)
}

/// `I` followed by an uppercase letter.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::is_interface_name;
///
/// assert!(is_interface_name("IRepository<T>"));
/// assert!(!is_interface_name("Inventory"));
/// ```
pub fn is_interface_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0] == b'I' && bytes[1].is_ascii_uppercase()
}

/// Shape check for a normalized base-list entry: identifier characters plus
/// `.` for qualified names and `<`/`>` for the generic placeholder.
pub fn is_valid_base_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '<' | '>' | '.'))
}

/// Replace every generic argument list with the placeholder `<T>`.
///
/// Nested brackets are consumed as a whole, so `Dictionary<string, List<int>>`
/// becomes `Dictionary<T>`. An unterminated list is cut off.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::normalize_generics;
///
/// assert_eq!(normalize_generics("Repository<User, Guid>"), "Repository<T>");
/// assert_eq!(normalize_generics("Outer<A>.Inner<B, C>"), "Outer<T>.Inner<T>");
/// assert_eq!(normalize_generics("MonoBehaviour"), "MonoBehaviour");
/// ```
pub fn normalize_generics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '<' => {
                if depth == 0 {
                    out.push_str("<T>");
                }
                depth += 1;
            }
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Split a base clause on commas that are not inside angle brackets, then
/// normalize each entry's generic arguments.
///
/// # Examples
///
/// ```
/// use csmap_repomap::filter::split_base_clause;
///
/// let parts = split_base_clause("Repository<User, Guid>, IDisposable");
/// assert_eq!(parts, vec!["Repository<T>", "IDisposable"]);
/// ```
pub fn split_base_clause(clause: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;

    for c in clause.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth <= 0 => {
                push_part(&mut parts, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    push_part(&mut parts, &current);
    parts
}

fn push_part(parts: &mut Vec<String>, raw: &str) {
    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if !collapsed.is_empty() {
        parts.push(normalize_generics(&collapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reserved_word_is_rejected_in_any_case() {
        for word in RESERVED {
            assert!(!is_valid_type_name(word), "{word} accepted");
            let mut capitalized = word.to_string();
            capitalized[..1].make_ascii_uppercase();
            assert!(!is_valid_type_name(&capitalized), "{capitalized} accepted");
            assert!(!is_valid_type_name(&word.to_ascii_uppercase()));
        }
    }

    #[test]
    fn field_prefixes_are_rejected_regardless_of_remainder() {
        for name in ["m_x", "s_x", "c_x", "m_Player", "s_INSTANCE", "c_maxCount"] {
            assert!(has_field_prefix(name));
            assert!(!is_valid_type_name(name), "{name} accepted");
        }
    }

    #[test]
    fn lowercase_initial_names_are_variable_like() {
        assert!(!is_valid_type_name("player"));
        assert!(!is_valid_type_name("iEnumerator"));
        assert!(is_valid_type_name("_Internal"));
    }

    #[test]
    fn short_names_need_to_be_acronyms() {
        assert!(is_valid_type_name("UI"));
        assert!(is_valid_type_name("IO"));
        assert!(is_valid_type_name("HUD"));
        assert!(!is_valid_type_name("Abc"));
        assert!(is_valid_type_name("Item"));
    }

    #[test]
    fn vowelless_heuristic_only_applies_above_five_chars() {
        assert!(!looks_truncated("Vctr"));
        assert!(!looks_truncated("XYZWQ"));
        assert!(looks_truncated("XYZWQR"));
        assert!(!is_valid_type_name("PlyrCtrl"));
        // Acronyms longer than five characters without vowels are rejected too.
        assert!(!is_valid_type_name("HTTPRSP"));
    }

    #[test]
    fn non_identifiers_are_rejected() {
        assert!(!is_valid_type_name(""));
        assert!(!is_valid_type_name("Player Controller"));
        assert!(!is_valid_type_name("Läufer"));
        assert!(!is_valid_type_name("List<T>"));
    }

    #[test]
    fn base_names_allow_qualification_and_placeholder() {
        assert!(is_valid_base_name("UnityEngine.MonoBehaviour"));
        assert!(is_valid_base_name("Repository<T>"));
        assert!(!is_valid_base_name("new()"));
        assert!(!is_valid_base_name("global::System.Object"));
    }

    #[test]
    fn split_handles_nested_generics_and_whitespace() {
        let parts = split_base_clause(" Dictionary<string, List<int>> ,\n  IEnumerable<KeyValuePair<A, B>> ");
        assert_eq!(parts, vec!["Dictionary<T>", "IEnumerable<T>"]);
    }

    #[test]
    fn split_generic_base_has_no_extra_entries() {
        let parts = split_base_clause("Repository<User,Guid>");
        assert_eq!(parts, vec!["Repository<T>"]);
        assert!(!parts.iter().any(|p| is_interface_name(p)));
    }
}
