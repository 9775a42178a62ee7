//! Byte-to-text decoding for indexed files.
//!
//! Files on NAS shares are frequently legacy-encoded. A byte order mark
//! wins outright; otherwise strict UTF-8, EUC-KR and Shift_JIS are tried in
//! that order and the first clean decode is returned.

use encoding_rs::{Encoding, EUC_KR, SHIFT_JIS, UTF_8};

use crate::error::{Error, Result};

const FALLBACKS: [&Encoding; 3] = [UTF_8, EUC_KR, SHIFT_JIS];

/// Decode `bytes` into a `String`. `label` names the source in the error.
pub fn decode_text(bytes: &[u8], label: &str) -> Result<String> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return encoding
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            .map(|text| text.into_owned())
            .ok_or_else(|| Error::Decode(label.to_string()));
    }

    FALLBACKS
        .iter()
        .find_map(|encoding| encoding.decode_without_bom_handling_and_without_replacement(bytes))
        .map(|text| text.into_owned())
        .ok_or_else(|| Error::Decode(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        assert_eq!(decode_text("héllo".as_bytes(), "a.txt").unwrap(), "héllo");
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"notes");
        assert_eq!(decode_text(&bytes, "a.txt").unwrap(), "notes");

        let utf16le = [0xFF, 0xFE, b'h', 0x00, b'i', 0x00];
        assert_eq!(decode_text(&utf16le, "a.txt").unwrap(), "hi");
    }

    #[test]
    fn test_euc_kr_fallback() {
        let (bytes, _, had_errors) = EUC_KR.encode("안녕하세요");
        assert!(!had_errors);
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_text(&bytes, "ko.txt").unwrap(), "안녕하세요");
    }

    #[test]
    fn test_shift_jis_fallback() {
        // A lone half-width katakana byte is a truncated EUC-KR sequence.
        let bytes = [b'A', 0xB1];
        assert_eq!(decode_text(&bytes, "ja.txt").unwrap(), "A\u{FF71}");
    }

    #[test]
    fn test_undecodable_bytes() {
        let err = decode_text(b"abc\xff\xff", "bin.dat").unwrap_err();
        assert!(matches!(err, Error::Decode(ref label) if label == "bin.dat"));
    }
}
