//! Byte-salvaging text decoding for source units.

use std::borrow::Cow;

use encoding_rs::{Encoding, GBK, UTF_8, WINDOWS_1252};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decoded unit text and the label of the encoding that accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

/// Decode `bytes`, trying strict UTF-8 (BOM stripped), then GBK, then
/// Windows-1252. Never fails: if every candidate rejects the input, the
/// UTF-8 decode is repeated with replacement characters.
///
/// # Examples
///
/// ```
/// use csmap_repomap::decode::decode_text;
///
/// let decoded = decode_text(b"\xEF\xBB\xBFpublic class Player {}");
/// assert_eq!(decoded.text, "public class Player {}");
/// assert_eq!(decoded.encoding, "UTF-8");
/// ```
pub fn decode_text(bytes: &[u8]) -> Decoded {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    for encoding in [UTF_8, GBK, WINDOWS_1252] {
        if let Some(text) = strict_decode(encoding, body) {
            return Decoded {
                text: text.into_owned(),
                encoding: encoding.name(),
            };
        }
    }

    Decoded {
        text: String::from_utf8_lossy(body).into_owned(),
        encoding: "UTF-8 (lossy)",
    }
}

fn strict_decode<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    encoding.decode_without_bom_handling_and_without_replacement(bytes)
}
