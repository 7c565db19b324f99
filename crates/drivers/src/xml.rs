//! XML body hygiene
//!
//! Some registries (npm especially) ship RSS bodies containing invalid
//! UTF-8 or codepoints outside the XML character range inside CDATA,
//! which XML decoders reject outright. Every RSS body is passed through
//! [`sanitize_xml`] before decoding: invalid UTF-8 sequences and the
//! Unicode replacement character are dropped, and runes outside the XML
//! range are replaced with U+25A1.

/// Substituted for codepoints the XML 1.0 character range excludes.
const REPLACEMENT: char = '\u{25A1}';

/// Returns true iff `c` is in the XML 1.0 character range
/// (https://www.w3.org/TR/xml/#charsets).
fn in_xml_range(c: char) -> bool {
    matches!(c,
        '\u{09}' | '\u{0A}' | '\u{0D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Converts a raw response body into a string safe to hand to an XML
/// decoder.
pub fn sanitize_xml(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        // Invalid UTF-8 sequences surface as U+FFFD after the lossy
        // conversion; genuine U+FFFD in the input is dropped the same
        // way for consistency with what the decoders downstream expect.
        .filter(|&c| c != '\u{FFFD}')
        .map(|c| if in_xml_range(c) { c } else { REPLACEMENT })
        .collect()
}
