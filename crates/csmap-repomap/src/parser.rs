use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Once;

use csmap_core::CsmapError;
use tree_sitter::{Language, Node, Parser};

use crate::decode::decode_text;
use crate::filter::{
    is_interface_name, is_valid_base_name, is_valid_type_name, normalize_generics,
};
use crate::lexical;
use crate::walker::SourceUnit;

/// A declared type or public type member.
///
/// Identity is `(name, file, line)`; the same name may be declared in
/// several files.
///
/// # Examples
///
/// ```
/// use csmap_repomap::parser::{Symbol, SymbolKind};
///
/// let sym = Symbol::new("PlayerController", SymbolKind::Class, "Game/Player.cs", 12);
/// assert!(sym.kind.is_type());
/// assert_eq!(sym.module(), "Game");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Path relative to the scan root, `/`-separated.
    pub file: String,
    /// 1-indexed declaration line.
    pub line: u32,
    pub signature: String,
    /// Dotted namespace, empty when the file declares none.
    pub namespace: String,
    /// Directly enclosing type, empty for top-level types.
    pub enclosing_type: String,
    pub base_type: String,
    pub interfaces: Vec<String>,
    pub modifiers: Vec<Modifier>,
}

impl Symbol {
    /// A symbol with every optional part empty.
    pub fn new(name: &str, kind: SymbolKind, file: &str, line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            file: file.into(),
            line,
            signature: String::new(),
            namespace: String::new(),
            enclosing_type: String::new(),
            base_type: String::new(),
            interfaces: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    /// First path segment of the declaring file.
    pub fn module(&self) -> &str {
        crate::modules::module_of(&self.file)
    }
}

/// Classification of extracted symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Struct,
    Interface,
    Enum,
    Record,
    Method,
    Property,
    Field,
}

impl SymbolKind {
    /// Type declarations take part in the graph; members do not.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Enum
                | SymbolKind::Record
        )
    }

    /// C# keyword used when rendering a type signature.
    pub fn keyword(self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Record => "record",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
        }
    }

    /// Map a type keyword (`class`, `record`, ...) back to a kind.
    pub fn from_type_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "class" => Some(SymbolKind::Class),
            "struct" => Some(SymbolKind::Struct),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "record" => Some(SymbolKind::Record),
            _ => None,
        }
    }

    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "class_declaration" => Some(SymbolKind::Class),
            "struct_declaration" => Some(SymbolKind::Struct),
            "interface_declaration" => Some(SymbolKind::Interface),
            "enum_declaration" => Some(SymbolKind::Enum),
            "record_declaration" | "record_struct_declaration" => Some(SymbolKind::Record),
            _ => None,
        }
    }
}

/// Declaration modifiers that are kept on symbols.
///
/// # Examples
///
/// ```
/// use csmap_repomap::parser::Modifier;
///
/// let m: Modifier = "sealed".parse().unwrap();
/// assert_eq!(m, Modifier::Sealed);
/// assert!("async".parse::<Modifier>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Public,
    Private,
    Protected,
    Internal,
    Abstract,
    Sealed,
    Static,
    Partial,
    Readonly,
    Virtual,
    Override,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Private => "private",
            Modifier::Protected => "protected",
            Modifier::Internal => "internal",
            Modifier::Abstract => "abstract",
            Modifier::Sealed => "sealed",
            Modifier::Static => "static",
            Modifier::Partial => "partial",
            Modifier::Readonly => "readonly",
            Modifier::Virtual => "virtual",
            Modifier::Override => "override",
        }
    }
}

impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Modifier::Public),
            "private" => Ok(Modifier::Private),
            "protected" => Ok(Modifier::Protected),
            "internal" => Ok(Modifier::Internal),
            "abstract" => Ok(Modifier::Abstract),
            "sealed" => Ok(Modifier::Sealed),
            "static" => Ok(Modifier::Static),
            "partial" => Ok(Modifier::Partial),
            "readonly" => Ok(Modifier::Readonly),
            "virtual" => Ok(Modifier::Virtual),
            "override" => Ok(Modifier::Override),
            other => Err(format!("unsupported modifier: {other}")),
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of relationship carried by a [`Reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    Inherits,
    Implements,
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefType::Inherits => write!(f, "inherits"),
            RefType::Implements => write!(f, "implements"),
        }
    }
}

/// A directed relationship between two symbol names.
///
/// `to_symbol` may name a type that was never declared in the scanned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub ref_type: RefType,
    pub from_symbol: String,
    pub to_symbol: String,
    /// File in which the reference was observed.
    pub source_file: String,
}

/// Symbols and references produced from one unit, or merged across units.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
}

impl Extraction {
    /// Append `other`, keeping order.
    pub fn merge(&mut self, other: Extraction) {
        self.symbols.extend(other.symbols);
        self.references.extend(other.references);
    }

    /// Record a type symbol together with its inheritance references.
    pub(crate) fn push_type(&mut self, symbol: Symbol) {
        if !symbol.base_type.is_empty() {
            self.references.push(Reference {
                ref_type: RefType::Inherits,
                from_symbol: symbol.name.clone(),
                to_symbol: symbol.base_type.clone(),
                source_file: symbol.file.clone(),
            });
        }
        for iface in &symbol.interfaces {
            self.references.push(Reference {
                ref_type: RefType::Implements,
                from_symbol: symbol.name.clone(),
                to_symbol: iface.clone(),
                source_file: symbol.file.clone(),
            });
        }
        self.symbols.push(symbol);
    }
}

/// Per-unit symbol extractor.
///
/// Holds the C# grammar when syntax-tree parsing is enabled and loadable;
/// otherwise every unit goes through the lexical scanner.
///
/// # Examples
///
/// ```
/// use csmap_repomap::parser::{Extractor, SymbolKind};
/// use csmap_repomap::walker::SourceUnit;
///
/// let unit = SourceUnit::new("Game/Player.cs", "public class Player : MonoBehaviour {}");
/// let extraction = Extractor::new(true).extract(&unit);
/// assert_eq!(extraction.symbols[0].name, "Player");
/// assert_eq!(extraction.symbols[0].kind, SymbolKind::Class);
/// assert_eq!(extraction.references[0].to_symbol, "MonoBehaviour");
/// ```
#[derive(Debug, Clone)]
pub struct Extractor {
    language: Option<Language>,
}

impl Extractor {
    /// Build an extractor. With `use_syntax_tree` false, or when the grammar
    /// fails to load, extraction is lexical only.
    pub fn new(use_syntax_tree: bool) -> Self {
        if !use_syntax_tree {
            return Self { language: None };
        }
        let language: Language = tree_sitter_c_sharp::LANGUAGE.into();
        match syntax_parser(&language) {
            Ok(_) => Self {
                language: Some(language),
            },
            Err(e) => {
                tracing::warn!("C# grammar unavailable, using lexical extraction: {e}");
                Self { language: None }
            }
        }
    }

    /// Whether units are parsed into syntax trees.
    pub fn uses_syntax_tree(&self) -> bool {
        self.language.is_some()
    }

    /// Extract symbols and references from one unit. Never fails.
    pub fn extract(&self, unit: &SourceUnit) -> Extraction {
        let decoded = decode_text(&unit.content);
        if decoded.encoding != "UTF-8" {
            tracing::debug!(file = %unit.path, encoding = decoded.encoding, "decoded");
        }

        let Some(language) = &self.language else {
            return lexical::extract(&decoded.text, &unit.path);
        };

        let mut parser = match syntax_parser(language) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(file = %unit.path, "{e}");
                return lexical::extract(&decoded.text, &unit.path);
            }
        };
        let Some(tree) = parser.parse(decoded.text.as_bytes(), None) else {
            tracing::warn!(file = %unit.path, "parse aborted, using lexical extraction");
            return lexical::extract(&decoded.text, &unit.path);
        };

        let mut extraction = Extraction::default();
        let source = decoded.text.as_bytes();
        guarded_walk(&unit.path, &mut extraction, |out| {
            collect_declarations(tree.root_node(), source, &unit.path, out);
        });
        extraction
    }
}

thread_local! {
    static IN_GUARDED_WALK: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Wrap the process panic hook so panics raised inside [`guarded_walk`] are
/// logged at debug level instead of being reported as crashes.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_GUARDED_WALK.with(Cell::get) {
                tracing::debug!("contained panic: {info}");
                return;
            }
            previous(info);
        }));
    });
}

/// Run `walk` against `out`, keeping whatever it pushed before a panic.
fn guarded_walk(file: &str, out: &mut Extraction, walk: impl FnOnce(&mut Extraction)) {
    install_quiet_hook();
    IN_GUARDED_WALK.with(|flag| flag.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| walk(out)));
    IN_GUARDED_WALK.with(|flag| flag.set(false));

    if let Err(payload) = result {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown".into());
        tracing::warn!(
            file,
            kept = out.symbols.len(),
            %reason,
            "extraction panicked, keeping partial results"
        );
    }
}

fn syntax_parser(language: &Language) -> Result<Parser, CsmapError> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| CsmapError::Parse(format!("C# grammar rejected: {e}")))?;
    Ok(parser)
}

/// Walk type declarations with an explicit stack. Each entry carries the
/// name of the type that encloses it.
fn collect_declarations(root: Node, source: &[u8], file: &str, out: &mut Extraction) {
    let namespace = file_namespace(&root, source);
    let mut stack: Vec<(Node, String)> = Vec::new();
    push_children(&mut stack, &root, "");

    while let Some((node, enclosing)) = stack.pop() {
        let kind = node.kind();
        if let Some(symbol_kind) = SymbolKind::from_node_kind(kind) {
            let Some(mut symbol) = read_type(&node, symbol_kind, source, file) else {
                continue;
            };
            symbol.namespace = namespace.clone();
            symbol.enclosing_type = enclosing;
            let name = symbol.name.clone();
            out.push_type(symbol);

            if let Some(body) = find_child(&node, "declaration_list") {
                collect_members(&body, &name, &namespace, source, file, out);
            }
            push_children(&mut stack, &node, &name);
        } else if matches!(
            kind,
            "namespace_declaration"
                | "file_scoped_namespace_declaration"
                | "declaration_list"
                | "ERROR"
        ) {
            push_children(&mut stack, &node, &enclosing);
        }
    }
}

fn push_children<'tree>(stack: &mut Vec<(Node<'tree>, String)>, node: &Node<'tree>, enclosing: &str) {
    let mut cursor = node.walk();
    let children: Vec<Node<'tree>> = node.children(&mut cursor).collect();
    for child in children.into_iter().rev() {
        stack.push((child, enclosing.to_string()));
    }
}

/// Namespace of the first root-level namespace declaration.
fn file_namespace(root: &Node, source: &[u8]) -> String {
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if matches!(
            child.kind(),
            "namespace_declaration" | "file_scoped_namespace_declaration"
        ) {
            let name = child
                .child_by_field_name("name")
                .map(|n| node_text(&n, source))
                .or_else(|| find_child_text(&child, "qualified_name", source))
                .or_else(|| find_child_text(&child, "identifier", source));
            if let Some(name) = name {
                return name;
            }
        }
    }
    String::new()
}

fn read_type(node: &Node, kind: SymbolKind, source: &[u8], file: &str) -> Option<Symbol> {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(&n, source))
        .or_else(|| find_child_text(node, "identifier", source))?;
    if !is_valid_type_name(&name) {
        tracing::trace!(file, name = %name, "rejected type name");
        return None;
    }

    let modifiers = read_modifiers(node, source)
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let (base_type, interfaces) = find_child(node, "base_list")
        .map(|list| classify_bases(read_base_list(&list, source)))
        .unwrap_or_default();

    let mut symbol = Symbol::new(&name, kind, file, line_of(node));
    symbol.base_type = base_type;
    symbol.interfaces = interfaces;
    symbol.modifiers = modifiers;
    symbol.signature = type_signature(&symbol);
    Some(symbol)
}

fn read_base_list(list: &Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = list.walk();
    for child in list.named_children(&mut cursor) {
        let type_node = match child.kind() {
            "primary_constructor_base_type" => child
                .child_by_field_name("type")
                .or_else(|| child.named_child(0)),
            "identifier" | "generic_name" | "qualified_name" | "alias_qualified_name" => {
                Some(child)
            }
            _ => None,
        };
        let Some(type_node) = type_node else {
            continue;
        };
        let text = node_text(&type_node, source);
        let collapsed = text.split_whitespace().collect::<String>();
        let normalized = normalize_generics(&collapsed);
        if is_valid_base_name(&normalized) {
            names.push(normalized);
        }
    }
    names
}

/// Interfaces are `I<Upper>` names; the first other name is the base type
/// and any further ones are dropped.
pub(crate) fn classify_bases(names: Vec<String>) -> (String, Vec<String>) {
    let mut base_type = String::new();
    let mut interfaces = Vec::new();
    for name in names {
        if is_interface_name(&name) {
            interfaces.push(name);
        } else if base_type.is_empty() {
            base_type = name;
        }
    }
    (base_type, interfaces)
}

fn collect_members(
    body: &Node,
    type_name: &str,
    namespace: &str,
    source: &[u8],
    file: &str,
    out: &mut Extraction,
) {
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        let kind = member.kind();
        if !matches!(
            kind,
            "method_declaration" | "property_declaration" | "field_declaration"
        ) {
            continue;
        }
        let raw_modifiers = read_modifiers(&member, source);
        if !raw_modifiers.iter().any(|m| m == "public") {
            continue;
        }
        let modifiers: Vec<Modifier> = raw_modifiers.iter().filter_map(|m| m.parse().ok()).collect();

        let members = match kind {
            "method_declaration" => read_method(&member, source, file).into_iter().collect(),
            "property_declaration" => read_property(&member, source, file).into_iter().collect(),
            _ => read_fields(&member, source, file),
        };
        for mut symbol in members {
            symbol.namespace = namespace.to_string();
            symbol.enclosing_type = type_name.to_string();
            symbol.modifiers = modifiers.clone();
            out.symbols.push(symbol);
        }
    }
}

fn read_method(node: &Node, source: &[u8], file: &str) -> Option<Symbol> {
    let name = field_text(node, "name", source)
        .or_else(|| find_child_text(node, "identifier", source))?;
    let return_type = field_text(node, "returns", source)
        .or_else(|| field_text(node, "type", source))
        .unwrap_or_default();
    let params = node
        .child_by_field_name("parameters")
        .or_else(|| find_child(node, "parameter_list"))
        .map(|list| render_parameters(&list, source))
        .unwrap_or_default();

    let mut symbol = Symbol::new(&name, SymbolKind::Method, file, line_of(node));
    symbol.signature = method_signature(&return_type, &name, &params);
    Some(symbol)
}

fn read_property(node: &Node, source: &[u8], file: &str) -> Option<Symbol> {
    let name = field_text(node, "name", source)
        .or_else(|| find_child_text(node, "identifier", source))?;
    let prop_type = field_text(node, "type", source).unwrap_or_default();

    let mut symbol = Symbol::new(&name, SymbolKind::Property, file, line_of(node));
    symbol.signature = format!("{} {name} {{ get; set; }}", collapse(&prop_type))
        .trim_start()
        .to_string();
    Some(symbol)
}

fn read_fields(node: &Node, source: &[u8], file: &str) -> Vec<Symbol> {
    let Some(declaration) = find_child(node, "variable_declaration") else {
        return Vec::new();
    };
    let field_type = field_text(&declaration, "type", source).unwrap_or_default();

    let mut fields = Vec::new();
    let mut cursor = declaration.walk();
    for declarator in declaration.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name) = field_text(&declarator, "name", source)
            .or_else(|| find_child_text(&declarator, "identifier", source))
        else {
            continue;
        };
        let mut symbol = Symbol::new(&name, SymbolKind::Field, file, line_of(&declarator));
        symbol.signature = format!("{} {name}", collapse(&field_type))
            .trim_start()
            .to_string();
        fields.push(symbol);
    }
    fields
}

fn render_parameters(list: &Node, source: &[u8]) -> String {
    let mut rendered = Vec::new();
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        if param.kind() != "parameter" {
            continue;
        }
        let text = render_parameter(&node_text(&param, source));
        if !text.is_empty() {
            rendered.push(text);
        }
    }
    rendered.join(", ")
}

/// Keep the last two significant tokens of a parameter (type and name) after
/// dropping any default value.
///
/// # Examples
///
/// ```
/// use csmap_repomap::parser::render_parameter;
///
/// assert_eq!(render_parameter("ref int count"), "int count");
/// assert_eq!(render_parameter("float speed = 1.5f"), "float speed");
/// assert_eq!(render_parameter("Dictionary<string, int> lookup"), "Dictionary<string, int> lookup");
/// assert_eq!(render_parameter("[FromQuery(Name = \"id\")] int userId"), "int userId");
/// ```
pub fn render_parameter(text: &str) -> String {
    let tokens = significant_tokens(strip_default(text));
    let start = tokens.len().saturating_sub(2);
    tokens[start..].join(" ")
}

/// Text before the first `=` outside brackets.
fn strip_default(text: &str) -> &str {
    let mut depth = 0i32;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => depth -= 1,
            '=' if depth <= 0 => return &text[..i],
            _ => {}
        }
    }
    text
}

/// Split on whitespace outside angle, square, and round brackets.
fn significant_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in text.chars() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => depth -= 1,
            _ => {}
        }
        if c.is_whitespace() && depth <= 0 {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else if c.is_whitespace() {
            if !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `{modifiers} {keyword} {name} : {bases}`, omitting empty parts.
pub(crate) fn type_signature(symbol: &Symbol) -> String {
    let mut parts: Vec<&str> = symbol.modifiers.iter().map(|m| m.as_str()).collect();
    parts.push(symbol.kind.keyword());
    parts.push(&symbol.name);
    let mut signature = parts.join(" ");

    let bases: Vec<&str> = std::iter::once(symbol.base_type.as_str())
        .filter(|b| !b.is_empty())
        .chain(symbol.interfaces.iter().map(String::as_str))
        .collect();
    if !bases.is_empty() {
        signature.push_str(" : ");
        signature.push_str(&bases.join(", "));
    }
    signature
}

fn method_signature(return_type: &str, name: &str, params: &str) -> String {
    let return_type = collapse(return_type);
    if return_type.is_empty() {
        format!("{name}({params})")
    } else {
        format!("{return_type} {name}({params})")
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn read_modifiers(node: &Node, source: &[u8]) -> Vec<String> {
    let mut modifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "modifier" {
            modifiers.push(node_text(&child, source).trim().to_string());
        }
    }
    modifiers
}

fn line_of(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start > end || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

fn field_text(node: &Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(&n, source))
        .filter(|t| !t.is_empty())
}

fn find_child<'tree>(node: &Node<'tree>, kind: &str) -> Option<Node<'tree>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn find_child_text(node: &Node, kind: &str, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kind {
            let text = node_text(&child, source);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}
