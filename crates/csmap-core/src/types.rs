use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How report sizes are measured.
///
/// `Exact` uses a BPE encoder when the binary was built with the `tiktoken`
/// feature; otherwise it degrades to the approximation.
///
/// # Examples
///
/// ```
/// use csmap_core::TokenizerKind;
///
/// let kind: TokenizerKind = "approx".parse().unwrap();
/// assert_eq!(kind, TokenizerKind::Approx);
/// assert_eq!(TokenizerKind::default(), TokenizerKind::Exact);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// BPE token count.
    #[default]
    Exact,
    /// Four characters per token.
    Approx,
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerKind::Exact => write!(f, "exact"),
            TokenizerKind::Approx => write!(f, "approx"),
        }
    }
}

impl FromStr for TokenizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" | "tiktoken" => Ok(TokenizerKind::Exact),
            "approx" | "approximate" | "estimate" => Ok(TokenizerKind::Approx),
            other => Err(format!("unknown tokenizer: {other}")),
        }
    }
}

/// One of the three generated report views.
///
/// # Examples
///
/// ```
/// use csmap_core::Tier;
///
/// assert_eq!(Tier::Signatures.label(), "L2");
/// assert_eq!(Tier::ALL.len(), 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Module overview.
    Skeleton,
    /// Class signatures.
    Signatures,
    /// Reference relations.
    Relations,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Skeleton, Tier::Signatures, Tier::Relations];

    /// Short level label used in report titles.
    pub fn label(self) -> &'static str {
        match self {
            Tier::Skeleton => "L1",
            Tier::Signatures => "L2",
            Tier::Relations => "L3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Skeleton => write!(f, "skeleton"),
            Tier::Signatures => write!(f, "signatures"),
            Tier::Relations => write!(f, "relations"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_kind_from_str() {
        assert_eq!("exact".parse::<TokenizerKind>().unwrap(), TokenizerKind::Exact);
        assert_eq!("TIKTOKEN".parse::<TokenizerKind>().unwrap(), TokenizerKind::Exact);
        assert_eq!("estimate".parse::<TokenizerKind>().unwrap(), TokenizerKind::Approx);
        assert!("bpe".parse::<TokenizerKind>().is_err());
    }

    #[test]
    fn tokenizer_kind_display_matches_serde() {
        for kind in [TokenizerKind::Exact, TokenizerKind::Approx] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }

    #[test]
    fn tier_labels() {
        let labels: Vec<&str> = Tier::ALL.iter().map(|t| t.label()).collect();
        assert_eq!(labels, vec!["L1", "L2", "L3"]);
        assert_eq!(Tier::Relations.to_string(), "relations");
    }
}
