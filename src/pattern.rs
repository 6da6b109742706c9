use std::{fmt, str::FromStr};

use itertools::Itertools;

use crate::{scan::Scanner, Error, Result};

/// How a pattern string is turned into bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PatchType {
    /// Comma or space separated hex bytes, `??` / `0x??` for wildcards.
    #[default]
    Binary,
    StringAscii,
    StringUtf8,
    StringShiftJis,
}

impl PatchType {
    pub const ALL: [PatchType; 4] = [
        PatchType::Binary,
        PatchType::StringAscii,
        PatchType::StringUtf8,
        PatchType::StringShiftJis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatchType::Binary => "Binary",
            PatchType::StringAscii => "StringASCII",
            PatchType::StringUtf8 => "StringUTF8",
            PatchType::StringShiftJis => "StringShiftJIS",
        }
    }

    /// Text patches may be shorter than what they replace, the rest is zeroed.
    pub fn is_string(&self) -> bool {
        !matches!(self, PatchType::Binary)
    }
}

impl FromStr for PatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnsupportedEncoding(s.to_owned()))
    }
}

impl fmt::Display for PatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A contiguous run of either literal or wildcard bytes inside a pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal { start: usize, len: usize },
    Mask { start: usize, len: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<u8>,
    wildcards: Vec<bool>,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Builds a pattern from raw bytes and the indices that match any byte.
    /// Indices past the end of `bytes` are ignored.
    pub fn from_bytes(bytes: &[u8], wildcard_positions: &[usize]) -> Self {
        let mut wildcards = vec![false; bytes.len()];
        for &pos in wildcard_positions {
            if let Some(slot) = wildcards.get_mut(pos) {
                *slot = true;
            }
        }

        let segments = wildcards
            .iter()
            .enumerate()
            .group_by(|(_, masked)| **masked)
            .into_iter()
            .map(|(masked, mut group)| {
                let (start, _) = group.next().unwrap_or((0, &false));
                let len = 1 + group.count();
                match masked {
                    true => Segment::Mask { start, len },
                    false => Segment::Literal { start, len },
                }
            })
            .collect();

        Self {
            bytes: bytes.to_vec(),
            wildcards,
            segments,
        }
    }

    pub fn parse(str: &str, kind: PatchType) -> Result<Self> {
        match kind {
            PatchType::Binary => Self::from_hex(str),
            PatchType::StringAscii => Ok(Self::from_bytes(&encode_ascii(str), &[])),
            PatchType::StringUtf8 => Ok(Self::from_bytes(str.as_bytes(), &[])),
            PatchType::StringShiftJis => Ok(Self::from_bytes(&encode_shift_jis(str), &[])),
        }
    }

    /// Parses `0x48,0x8B,0x??` / `48 8B ??` style patterns. Every single comma
    /// or space separates a token, so doubled separators are rejected.
    pub fn from_hex(str: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut wildcards = Vec::new();

        for (position, token) in str.split([',', ' ']).enumerate() {
            match token {
                "??" | "0x??" => {
                    bytes.push(0);
                    wildcards.push(position);
                }
                _ => bytes.push(parse_hex_byte(token).ok_or_else(|| {
                    Error::InvalidPatternSyntax {
                        token: token.to_owned(),
                        position,
                    }
                })?),
            }
        }

        Ok(Self::from_bytes(&bytes, &wildcards))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_wildcard(&self, pos: usize) -> bool {
        self.wildcards.get(pos).copied().unwrap_or(false)
    }

    pub fn wildcard_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.wildcards
            .iter()
            .enumerate()
            .filter_map(|(pos, masked)| masked.then_some(pos))
    }

    /// The byte a scan anchors on, `None` when the pattern can't be searched for.
    pub fn anchor(&self) -> Option<u8> {
        match self.wildcards.first() {
            Some(false) => Some(self.bytes[0]),
            _ => None,
        }
    }

    /// Index of the first literal byte that differs from `view`.
    ///
    /// `view` must be at least as long as the pattern.
    pub fn first_mismatch(&self, view: &[u8]) -> Option<usize> {
        self.segments.iter().find_map(|segment| match *segment {
            Segment::Literal { start, len } => {
                let want = &self.bytes[start..start + len];
                let got = &view[start..start + len];
                (want != got)
                    .then(|| want.iter().zip(got).position(|(a, b)| a != b))
                    .flatten()
                    .map(|k| start + k)
            }
            Segment::Mask { .. } => None,
        })
    }

    pub fn is_matching(&self, view: &[u8]) -> bool {
        view.len() >= self.len() && self.first_mismatch(view).is_none()
    }

    pub fn scan<'a>(&self, bytes: &'a [u8]) -> Scanner<'a> {
        Scanner::new(self.clone(), bytes)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .bytes
            .iter()
            .enumerate()
            .map(|(pos, b)| match self.is_wildcard(pos) {
                true => "0x??".to_owned(),
                false => format!("0x{:02X}", b),
            })
            .join(" ");
        f.write_str(&rendered)
    }
}

fn parse_hex_byte(token: &str) -> Option<u8> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    match digits.len() {
        1 | 2 if digits.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u8::from_str_radix(digits, 16).ok()
        }
        _ => None,
    }
}

fn encode_ascii(str: &str) -> Vec<u8> {
    let bytes: Vec<u8> = str
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect();
    if !str.is_ascii() {
        log::warn!("{:?} has non-ASCII characters, replaced with '?'", str);
    }
    bytes
}

/// Characters without a Shift-JIS mapping become `?`, like in [`encode_ascii`].
fn encode_shift_jis(str: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(str.len());
    let mut replaced = false;
    let mut buf = [0u8; 4];
    for c in str.chars() {
        let (encoded, _, had_errors) = encoding_rs::SHIFT_JIS.encode(c.encode_utf8(&mut buf));
        match had_errors {
            true => {
                replaced = true;
                bytes.push(b'?');
            }
            false => bytes.extend_from_slice(&encoded),
        }
    }
    if replaced {
        log::warn!("{:?} has characters without a Shift-JIS mapping, replaced with '?'", str);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        let pat = Pattern::from_hex("0x11,0x22,0x33").unwrap();
        assert_eq!(&[0x11, 0x22, 0x33], pat.bytes());
        assert_eq!(0, pat.wildcard_positions().count());

        let pat = Pattern::from_hex("48 8b 0D f").unwrap();
        assert_eq!(&[0x48, 0x8B, 0x0D, 0x0F], pat.bytes());

        let pat = Pattern::from_hex("0X4A").unwrap();
        assert_eq!(&[0x4A], pat.bytes());
    }

    #[test]
    fn test_masked_hex() {
        let pat = Pattern::from_hex("0x11,0x??,??,0x22 ?? 0x33").unwrap();
        assert_eq!(&[0x11, 0x00, 0x00, 0x22, 0x00, 0x33], pat.bytes());
        assert_eq!(
            vec![1, 2, 4],
            pat.wildcard_positions().collect::<Vec<_>>()
        );
        assert!(pat.is_wildcard(2));
        assert!(!pat.is_wildcard(3));
        assert!(!pat.is_wildcard(100));
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            Pattern::from_hex("zz"),
            Err(Error::InvalidPatternSyntax { position: 0, .. })
        ));
        assert!(matches!(
            Pattern::from_hex("0x01,"),
            Err(Error::InvalidPatternSyntax { position: 1, ref token }) if token.is_empty()
        ));
        // ", " is two separators, leaving an empty token between them
        assert!(Pattern::from_hex("0x01, 0x02").is_err());
        assert!(Pattern::from_hex("").is_err());
        assert!(Pattern::from_hex("0x123").is_err());
        assert!(Pattern::from_hex("+F").is_err());
        assert!(Pattern::from_hex("?").is_err());
        assert!(Pattern::from_hex("0x?").is_err());
    }

    #[test]
    fn test_segments() {
        let pat = Pattern::from_bytes(&[0x11, 0x0, 0x0, 0x22, 0x33, 0x0], &[1, 2, 5]);
        assert_eq!(
            &[
                Segment::Literal { start: 0, len: 1 },
                Segment::Mask { start: 1, len: 2 },
                Segment::Literal { start: 3, len: 2 },
                Segment::Mask { start: 5, len: 1 },
            ],
            pat.segments()
        );
        assert!(Pattern::from_bytes(&[], &[]).segments().is_empty());
    }

    #[test]
    fn test_out_of_range_wildcards_ignored() {
        let pat = Pattern::from_bytes(&[0x11, 0x22], &[1, 7]);
        assert_eq!(vec![1], pat.wildcard_positions().collect::<Vec<_>>());
    }

    #[test]
    fn test_strings() {
        let pat = Pattern::parse("Hello", PatchType::StringAscii).unwrap();
        assert_eq!(b"Hello", pat.bytes());
        assert_eq!(None, pat.wildcard_positions().next());

        assert_eq!(
            b"caf?",
            Pattern::parse("café", PatchType::StringAscii).unwrap().bytes()
        );
        assert_eq!(
            "café".as_bytes(),
            Pattern::parse("café", PatchType::StringUtf8).unwrap().bytes()
        );
        assert_eq!(
            &[0x83, 0x65, 0x83, 0x58, 0x83, 0x67],
            Pattern::parse("テスト", PatchType::StringShiftJis)
                .unwrap()
                .bytes()
        );
        assert_eq!(
            b"A?B",
            Pattern::parse("A\u{1F600}B", PatchType::StringShiftJis)
                .unwrap()
                .bytes()
        );
        assert_eq!(
            &[0x83, 0x65, b'?', 0x83, 0x67],
            Pattern::parse("テ\u{1F600}ト", PatchType::StringShiftJis)
                .unwrap()
                .bytes()
        );
        // wildcard syntax is plain text outside binary mode
        let pat = Pattern::parse("??", PatchType::StringUtf8).unwrap();
        assert_eq!(b"??", pat.bytes());
        assert!(!pat.is_wildcard(0));
    }

    #[test]
    fn test_patch_type() {
        assert_eq!(PatchType::Binary, "Binary".parse().unwrap());
        assert_eq!(PatchType::StringShiftJis, "StringShiftJIS".parse().unwrap());
        assert_eq!(PatchType::StringAscii, " stringascii ".parse().unwrap());
        assert!(matches!(
            "StringUTF16".parse::<PatchType>(),
            Err(Error::UnsupportedEncoding(_))
        ));
        assert!(PatchType::StringUtf8.is_string());
        assert!(!PatchType::Binary.is_string());
    }

    #[test]
    fn test_matching() {
        let pat = Pattern::from_hex("AA ?? CC").unwrap();
        assert!(pat.is_matching(&[0xAA, 0x00, 0xCC]));
        assert!(pat.is_matching(&[0xAA, 0xFF, 0xCC]));
        assert!(!pat.is_matching(&[0xAA, 0xFF, 0xCD]));
        assert!(!pat.is_matching(&[0xAA, 0xFF]));
        assert_eq!(Some(2), pat.first_mismatch(&[0xAA, 0xFF, 0xCD]));
        assert_eq!(Some(0), pat.first_mismatch(&[0xAB, 0xFF, 0xCC]));

        let pat = Pattern::from_hex("11 22 33 44 ?? 66").unwrap();
        assert_eq!(Some(2), pat.first_mismatch(&[0x11, 0x22, 0x00, 0x44, 0x55, 0x66]));
    }

    #[test]
    fn test_anchor() {
        assert_eq!(Some(0xAA), Pattern::from_hex("AA ??").unwrap().anchor());
        assert_eq!(None, Pattern::from_hex("?? AA").unwrap().anchor());
        assert_eq!(None, Pattern::from_bytes(&[], &[]).anchor());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            "0x11 0x?? 0x0A",
            Pattern::from_hex("11,??,a").unwrap().to_string()
        );
    }
}
