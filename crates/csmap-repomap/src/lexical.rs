//! Regex-based extraction used when no syntax tree is available.
//!
//! Only type headers are recognised; members are not extracted.

use std::sync::LazyLock;

use regex::Regex;

use crate::filter::{is_valid_base_name, is_valid_type_name, split_base_clause};
use crate::parser::{classify_bases, type_signature, Extraction, Modifier, Symbol, SymbolKind};

static TYPE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(public|internal)\s+((?:(?:abstract|sealed|static|partial|readonly|ref)\s+)*)(record\s+(?:struct|class)|class|struct|interface|enum|record)\s+(\w+)(?:\s*<[^>{]*>)?(?:\s*\([^)]*\))?(?:\s*:\s*([^{;]+))?(?:\s*\bwhere\b[^{;]*)?\s*[{;]",
    )
    .expect("type header pattern is valid")
});

static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bnamespace\s+([\w.]+)\s*[{;]").expect("namespace pattern is valid")
});

static WHERE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bwhere\b").expect("where pattern is valid"));

/// Scan raw `text` for public or internal type headers.
///
/// # Examples
///
/// ```
/// use csmap_repomap::lexical;
///
/// let extraction = lexical::extract(
///     "namespace Shop { public class UserRepository : Repository<User, Guid> { } }",
///     "Data/UserRepository.cs",
/// );
/// let repo = &extraction.symbols[0];
/// assert_eq!(repo.namespace, "Shop");
/// assert_eq!(repo.base_type, "Repository<T>");
/// assert!(repo.interfaces.is_empty());
/// ```
pub fn extract(text: &str, file: &str) -> Extraction {
    let namespace = NAMESPACE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let mut extraction = Extraction::default();
    for caps in TYPE_HEADER.captures_iter(text) {
        let (Some(visibility), Some(keyword), Some(name)) = (caps.get(1), caps.get(3), caps.get(4))
        else {
            continue;
        };
        let name = name.as_str();
        if !is_valid_type_name(name) {
            continue;
        }
        // `record struct` and `record class` are both records
        let keyword = keyword.as_str().split_whitespace().next().unwrap_or_default();
        let Some(kind) = SymbolKind::from_type_keyword(keyword) else {
            continue;
        };

        let mut modifiers: Vec<Modifier> = visibility.as_str().parse().into_iter().collect();
        if let Some(extra) = caps.get(2) {
            modifiers.extend(extra.as_str().split_whitespace().filter_map(|m| m.parse::<Modifier>().ok()));
        }

        let bases = match (kind, caps.get(5)) {
            // `enum Flags : byte` names the underlying type, not a base.
            (SymbolKind::Enum, _) | (_, None) => Vec::new(),
            (_, Some(clause)) => split_base_clause(cut_where(clause.as_str()))
                .into_iter()
                .filter(|b| is_valid_base_name(b))
                .collect(),
        };
        let (base_type, interfaces) = classify_bases(bases);

        let line = text[..caps.get(0).map_or(0, |m| m.start())].matches('\n').count() as u32 + 1;
        let mut symbol = Symbol::new(name, kind, file, line);
        symbol.namespace = namespace.clone();
        symbol.base_type = base_type;
        symbol.interfaces = interfaces;
        symbol.modifiers = modifiers;
        symbol.signature = type_signature(&symbol);
        extraction.push_type(symbol);
    }
    extraction
}

fn cut_where(clause: &str) -> &str {
    match WHERE_CLAUSE.find(clause) {
        Some(m) => &clause[..m.start()],
        None => clause,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RefType;

    #[test]
    fn generic_base_has_no_interfaces() {
        let extraction = extract(
            "public class UserStore : Repository<User,Guid> { }",
            "Data/UserStore.cs",
        );
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].base_type, "Repository<T>");
        assert!(extraction.symbols[0].interfaces.is_empty());
        assert_eq!(extraction.references.len(), 1);
        assert_eq!(extraction.references[0].ref_type, RefType::Inherits);
    }

    #[test]
    fn where_clause_is_not_a_base() {
        let extraction = extract(
            "public abstract class Pool<TItem> : IPool<TItem>, IDisposable where TItem : new() { }",
            "Core/Pool.cs",
        );
        let pool = &extraction.symbols[0];
        assert_eq!(pool.name, "Pool");
        assert_eq!(pool.interfaces, vec!["IPool<T>", "IDisposable"]);
        assert!(pool.base_type.is_empty());
        assert_eq!(pool.modifiers, vec![Modifier::Public, Modifier::Abstract]);
        assert_eq!(pool.signature, "public abstract class Pool : IPool<T>, IDisposable");
    }

    #[test]
    fn private_types_and_invalid_names_are_skipped() {
        let text = r#"
namespace Tanks.UI
{
    class HiddenHelper { }
    public class hud { }
    internal sealed class ScorePanel : BasePanel
    {
    }
    public enum Layer : byte { Ground }
}
"#;
        let extraction = extract(text, "UI/Score.cs");
        let names: Vec<&str> = extraction.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ScorePanel", "Layer"]);

        let panel = &extraction.symbols[0];
        assert_eq!(panel.namespace, "Tanks.UI");
        assert_eq!(panel.line, 6);
        assert_eq!(panel.base_type, "BasePanel");

        let layer = &extraction.symbols[1];
        assert_eq!(layer.kind, SymbolKind::Enum);
        assert!(layer.base_type.is_empty());
    }

    #[test]
    fn where_clause_without_bases() {
        let extraction = extract(
            "public class Repository<TItem> where TItem : class { }",
            "Data/Repository.cs",
        );
        assert_eq!(extraction.symbols.len(), 1);
        let repo = &extraction.symbols[0];
        assert_eq!(repo.name, "Repository");
        assert!(repo.base_type.is_empty());
        assert!(repo.interfaces.is_empty());
        assert!(extraction.references.is_empty());
        assert_eq!(repo.signature, "public class Repository");
    }

    #[test]
    fn record_structs_and_readonly_structs() {
        let text = "public record struct PointData(int X, int Y);\npublic readonly struct Vector2Int { }\n";
        let extraction = extract(text, "Core/Math.cs");
        let names: Vec<&str> = extraction.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["PointData", "Vector2Int"]);

        assert_eq!(extraction.symbols[0].kind, SymbolKind::Record);
        assert_eq!(extraction.symbols[0].line, 1);

        let vector = &extraction.symbols[1];
        assert_eq!(vector.kind, SymbolKind::Struct);
        assert_eq!(vector.line, 2);
        assert_eq!(vector.modifiers, vec![Modifier::Public, Modifier::Readonly]);
        assert_eq!(vector.signature, "public readonly struct Vector2Int");
    }

    #[test]
    fn record_class_with_base_list() {
        let extraction = extract(
            "public sealed record class PlayerSnapshot(string Name) : Snapshot, IComparable<PlayerSnapshot>;",
            "Data/Snapshot.cs",
        );
        let snap = &extraction.symbols[0];
        assert_eq!(snap.name, "PlayerSnapshot");
        assert_eq!(snap.kind, SymbolKind::Record);
        assert_eq!(snap.base_type, "Snapshot");
        assert_eq!(snap.interfaces, vec!["IComparable<T>"]);
    }

    #[test]
    fn no_headers_means_empty_extraction() {
        let extraction = extract("// nothing here\nusing System;\n", "Empty.cs");
        assert!(extraction.symbols.is_empty());
        assert!(extraction.references.is_empty());
    }
}
