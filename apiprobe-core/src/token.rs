//! Bearer token helpers.
//!
//! Tokens are treated as opaque `header.payload.signature` strings. Nothing
//! here verifies a signature; the header is decoded for display only, and the
//! corruption helpers produce deliberately broken credentials for negative
//! scenarios.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use serde_json::Value;
use std::fmt;

/// Appended by [`append_invalid_symbol`]. Outside the base64url alphabet.
pub const INVALID_SYMBOL: char = '*';

/// Accepts unpadded input and non-canonical trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A bearer token as issued by the user endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Token {
        Token(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decoded JOSE header, if the token has one.
    pub fn header(&self) -> Option<Value> {
        decode_header_segment(&self.0)
    }

    /// Decoded payload text. For nested tokens this is the inner token.
    pub fn payload_text(&self) -> Option<String> {
        let mut segments = self.0.split('.');
        segments.next()?;
        decode_segment(segments.next()?)
    }

    /// A copy of this token broken in the given way.
    pub fn corrupt(&self, corruption: Corruption) -> Token {
        let raw = match corruption {
            Corruption::FlipLastChar => flip_last_char(&self.0),
            Corruption::InvalidSymbol => append_invalid_symbol(&self.0),
            Corruption::Truncate => truncate_segments(&self.0),
        };
        Token(raw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Token {
    fn from(raw: String) -> Token {
        Token(raw)
    }
}

/// Ways a valid token gets broken for negative scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Corruption {
    /// Signature corruption: flip the last character.
    FlipLastChar,
    /// Append a character outside the base64url alphabet.
    InvalidSymbol,
    /// Keep only `header.payload`.
    Truncate,
}

/// Swap the last character between `a` and `b`. Any other last character
/// becomes `a`. Inputs shorter than two characters are returned unchanged.
pub fn flip_last_char(token: &str) -> String {
    let mut chars = token.chars();
    let Some(last) = chars.next_back() else {
        return token.to_string();
    };
    if chars.as_str().is_empty() {
        return token.to_string();
    }

    let flipped = if last == 'a' { 'b' } else { 'a' };
    format!("{}{flipped}", chars.as_str())
}

pub fn append_invalid_symbol(token: &str) -> String {
    format!("{token}{INVALID_SYMBOL}")
}

/// Keep the first two dot-separated segments.
pub fn truncate_segments(token: &str) -> String {
    token.split('.').take(2).collect::<Vec<_>>().join(".")
}

/// Decode the first segment of `token` as a JSON value.
///
/// Returns `None` when the token has fewer than two segments, or when the
/// segment is not base64url, not UTF-8, or not JSON.
pub fn decode_header_segment(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let header = segments.next()?;
    segments.next()?;

    let text = decode_segment(header)?;
    serde_json::from_str(&text).ok()
}

/// base64url-decode a single segment into UTF-8 text.
pub fn decode_segment(segment: &str) -> Option<String> {
    let standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let bytes = LENIENT.decode(standard).ok()?;
    String::from_utf8(bytes).ok()
}
