use csmap_core::TokenizerKind;

/// Measures text size in model tokens.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    /// Short name recorded in logs.
    fn label(&self) -> &'static str;
}

/// Four characters per token.
///
/// # Examples
///
/// ```
/// use csmap_repomap::budget::{ApproxCounter, TokenCounter};
///
/// assert_eq!(ApproxCounter.count("public class Player {}"), 5);
/// assert_eq!(ApproxCounter.count(""), 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxCounter;

impl TokenCounter for ApproxCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / 4
    }

    fn label(&self) -> &'static str {
        "approx"
    }
}

/// BPE token count with a tiktoken encoding.
#[cfg(feature = "tiktoken")]
pub struct BpeCounter {
    bpe: tiktoken_rs::CoreBPE,
}

#[cfg(feature = "tiktoken")]
impl BpeCounter {
    /// Load `cl100k_base` or `o200k_base`. Returns `None` for unknown names
    /// or when the encoder fails to initialize.
    pub fn new(encoding: &str) -> Option<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base().ok()?,
            "o200k_base" => tiktoken_rs::o200k_base().ok()?,
            _ => return None,
        };
        Some(Self { bpe })
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for BpeCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn label(&self) -> &'static str {
        "bpe"
    }
}

/// Pick a counter for `kind`. An exact counter that cannot be built (feature
/// disabled, unknown encoding) degrades to [`ApproxCounter`] with a warning.
pub fn token_counter(kind: TokenizerKind, encoding: &str) -> Box<dyn TokenCounter> {
    match kind {
        TokenizerKind::Approx => Box::new(ApproxCounter),
        TokenizerKind::Exact => exact_counter(encoding).unwrap_or_else(|| {
            tracing::warn!(encoding, "exact tokenizer unavailable, approximating at 4 chars/token");
            Box::new(ApproxCounter)
        }),
    }
}

#[cfg(feature = "tiktoken")]
fn exact_counter(encoding: &str) -> Option<Box<dyn TokenCounter>> {
    BpeCounter::new(encoding).map(|c| Box::new(c) as Box<dyn TokenCounter>)
}

#[cfg(not(feature = "tiktoken"))]
fn exact_counter(_encoding: &str) -> Option<Box<dyn TokenCounter>> {
    None
}

fn fits(lines: &[String], counter: &dyn TokenCounter, max_tokens: usize) -> bool {
    counter.count(&lines.join("\n")) <= max_tokens
}

/// Remove the second-to-last line until the document fits, keeping at least
/// `keep_head` leading lines plus the final line.
pub fn trim_keep_last(
    lines: &mut Vec<String>,
    keep_head: usize,
    counter: &dyn TokenCounter,
    max_tokens: usize,
) {
    while !fits(lines, counter, max_tokens) && lines.len() > keep_head + 1 {
        let idx = lines.len() - 2;
        lines.remove(idx);
    }
}

/// Delete whole `## ` sections from the end until the document fits. The
/// lines before the first section are never removed.
pub fn trim_sections(lines: &mut Vec<String>, counter: &dyn TokenCounter, max_tokens: usize) {
    while !fits(lines, counter, max_tokens) {
        let Some(start) = lines.iter().rposition(|l| l.starts_with("## ")) else {
            break;
        };
        if start == 0 {
            break;
        }
        lines.truncate(start);
    }
}

/// Drop trailing lines until the document fits, keeping `keep_head` lines.
pub fn trim_tail(
    lines: &mut Vec<String>,
    keep_head: usize,
    counter: &dyn TokenCounter,
    max_tokens: usize,
) {
    while !fits(lines, counter, max_tokens) && lines.len() > keep_head {
        lines.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn approx_counts_chars_not_bytes() {
        assert_eq!(ApproxCounter.count("玩家控制器类"), 1);
        assert_eq!(ApproxCounter.count("abcdefgh"), 2);
    }

    #[test]
    fn approx_selection_never_warns_into_exact() {
        let counter = token_counter(TokenizerKind::Approx, "cl100k_base");
        assert_eq!(counter.label(), "approx");
    }

    #[cfg(not(feature = "tiktoken"))]
    #[test]
    fn exact_without_feature_degrades() {
        let counter = token_counter(TokenizerKind::Exact, "cl100k_base");
        assert_eq!(counter.label(), "approx");
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn exact_with_feature_uses_bpe() {
        let counter = token_counter(TokenizerKind::Exact, "cl100k_base");
        assert_eq!(counter.label(), "bpe");
        assert!(counter.count("public class PlayerController : MonoBehaviour") > 0);
        let unknown = token_counter(TokenizerKind::Exact, "gpt9_base");
        assert_eq!(unknown.label(), "approx");
    }

    #[test]
    fn keep_last_removes_second_to_last() {
        let mut lines = doc(&["head-one", "head-two", "aaaaaaaa", "bbbbbbbb", "cccccccc", "tail-end"]);
        // 4 + 4 lines of 8 chars plus separators; budget forces removals.
        trim_keep_last(&mut lines, 2, &ApproxCounter, 10);
        assert_eq!(lines.first().map(String::as_str), Some("head-one"));
        assert_eq!(lines.last().map(String::as_str), Some("tail-end"));
        assert!(ApproxCounter.count(&lines.join("\n")) <= 10);
        assert!(!lines.contains(&"cccccccc".to_string()));
    }

    #[test]
    fn keep_last_stops_at_minimum() {
        let mut lines = doc(&["a long header line", "another long header", "x", "final line here"]);
        trim_keep_last(&mut lines, 2, &ApproxCounter, 1);
        assert_eq!(
            lines,
            doc(&["a long header line", "another long header", "final line here"])
        );
    }

    #[test]
    fn sections_are_removed_whole() {
        let mut lines = doc(&[
            "# Title",
            "",
            "## First",
            "first body",
            "## Second",
            "second body that is long",
            "more second body",
        ]);
        trim_sections(&mut lines, &ApproxCounter, 8);
        assert_eq!(lines, doc(&["# Title", "", "## First", "first body"]));
    }

    #[test]
    fn sections_never_remove_title() {
        let mut lines = doc(&["# A very long title that exceeds everything", "", "## Only", "body"]);
        trim_sections(&mut lines, &ApproxCounter, 1);
        assert_eq!(lines, doc(&["# A very long title that exceeds everything", ""]));
    }

    #[test]
    fn tail_trim_keeps_header() {
        let mut lines = doc(&["# Title", "", "## Graph", "", "Alpha", "Bravo", "Charlie"]);
        trim_tail(&mut lines, 4, &ApproxCounter, 0);
        assert_eq!(lines.len(), 4);

        let mut fits_already = doc(&["short"]);
        trim_tail(&mut fits_already, 0, &ApproxCounter, 100);
        assert_eq!(fits_already, doc(&["short"]));
    }
}
