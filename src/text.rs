//! ZSCII string decoding and encoding (§4.6 "String decoding"/"String encoding").
//!
//! Z-strings are sequences of 16-bit words, three 5-bit z-characters per
//! word, terminated by the word whose bit 15 is set. Decoding walks a
//! small state machine over the current/previous alphabet; abbreviations
//! recurse one level deep only (§4.6: "Abbreviations may not themselves
//! contain abbreviations"). When the header's alphabet table pointer is
//! set (v>=5), its 3x26 ZSCII bytes replace the built-in A0/A1/A2 tables.

use crate::error::{Error, Result};
use crate::header::Header;
use crate::memory_map::{HighMemoryAccess, MemoryMap};
use log::trace;

const ALPHABET_A0: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHABET_A1: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// A2 for v>=2, standard set: note position 0 is a newline marker handled
/// specially by the caller (z=7 in A2 prints a newline, not this table).
const ALPHABET_A2: &[u8; 26] = b" \n0123456789.,!?_#'\"/\\-:()";
/// v=1's A2 differs: includes '<' and omits the newline escape.
const ALPHABET_A2_V1: &[u8; 26] = b" 0123456789.,!?_#'\"/\\<-:()";

const ABBREV_RECURSION_LIMIT: u8 = 1;

/// Unpack a packed routine or string address to a byte address (§9 GLOSSARY
/// "Packed address").
pub fn unpack_routine_address(packed: u16, header: &Header) -> usize {
    match header.version {
        1..=3 => (packed as usize) * 2,
        4 | 5 => (packed as usize) * 4,
        6 | 7 => (packed as usize) * 4 + (header.routine_offset as usize) * 8,
        8 => (packed as usize) * 8,
        _ => (packed as usize) * 2,
    }
}

pub fn unpack_string_address(packed: u16, header: &Header) -> usize {
    match header.version {
        1..=3 => (packed as usize) * 2,
        4 | 5 => (packed as usize) * 4,
        6 | 7 => (packed as usize) * 4 + (header.static_strings_offset as usize) * 8,
        8 => (packed as usize) * 8,
        _ => (packed as usize) * 2,
    }
}

fn alphabet_table(version: u8, which: u8) -> &'static [u8; 26] {
    match which {
        0 => ALPHABET_A0,
        1 => ALPHABET_A1,
        _ if version == 1 => ALPHABET_A2_V1,
        _ => ALPHABET_A2,
    }
}

/// ZSCII -> UTF-8 for a single character code (§4.6 "ZSCII->UTF-8
/// conversion"). `unicode_table` is the header-extension translation table
/// (155..=155+len-1), if present.
pub fn zscii_to_char(code: u16, version: u8, unicode_table: &[u16]) -> Result<char> {
    match code {
        0 => Ok('\0'),
        9 if version == 6 => Ok('\t'),
        11 if version == 6 => Ok(' '),
        13 => Ok('\n'),
        32..=126 => Ok(code as u8 as char),
        155..=251 => {
            let idx = (code - 155) as usize;
            if let Some(&uni) = unicode_table.get(idx) {
                char::from_u32(uni as u32)
                    .ok_or_else(|| Error::Decode(format!("invalid unicode code point {uni:#06x}")))
            } else {
                default_unicode_char(code)
            }
        }
        _ => Err(Error::Decode(format!("invalid ZSCII code {code}"))),
    }
}

/// §4.6: "155 -> U+00E4 'ä' ... 223 -> U+00BF '¿'".
const DEFAULT_UNICODE_TABLE: [char; 69] = [
    'ä', 'ö', 'ü', 'Ä', 'Ö', 'Ü', 'ß', '»', '«', 'ë', 'ï', 'ÿ', 'Ë', 'Ï', 'á', 'é', 'í', 'ó', 'ú',
    'ý', 'Á', 'É', 'Í', 'Ó', 'Ú', 'Ý', 'à', 'è', 'ì', 'ò', 'ù', 'À', 'È', 'Ì', 'Ò', 'Ù', 'â', 'ê',
    'î', 'ô', 'û', 'Â', 'Ê', 'Î', 'Ô', 'Û', 'å', 'Å', 'ø', 'Ø', 'ã', 'ñ', 'õ', 'Ã', 'Ñ', 'Õ', 'æ',
    'Æ', 'ç', 'Ç', 'þ', 'ð', 'Þ', 'Ð', '£', 'œ', 'Œ', '¡', '¿',
];

/// The built-in default table used when no header-extension translation
/// table is present (§4.6: "155 -> U+00E4 'ä' ... 223 -> U+00BF '¿'").
fn default_unicode_char(code: u16) -> Result<char> {
    let idx = (code - 155) as usize;
    DEFAULT_UNICODE_TABLE
        .get(idx)
        .copied()
        .ok_or_else(|| Error::Decode(format!("ZSCII code {code} has no default translation")))
}

/// Inverse of [`default_unicode_char`]: used when writing ZSCII bytes (output
/// stream 3 tables) rather than decoding them.
fn default_unicode_reverse(ch: char) -> Option<usize> {
    DEFAULT_UNICODE_TABLE.iter().position(|&c| c == ch)
}

/// UTF-8 -> ZSCII for a single character (inverse of [`zscii_to_char`]),
/// needed when the interpreter writes text into memory (output stream 3)
/// instead of to the screen.
pub fn char_to_zscii(ch: char) -> Result<u8> {
    match ch {
        '\n' => Ok(13),
        ' '..='~' => Ok(ch as u8),
        _ => default_unicode_reverse(ch)
            .map(|pos| (155 + pos) as u8)
            .ok_or_else(|| Error::Decode(format!("character {ch:?} has no ZSCII representation"))),
    }
}

/// Reusable scratch decoder, owned by the interpreter (§9 "String buffer
/// growth": "never allocate per-decode").
pub struct TextDecoder {
    scratch: String,
}

impl TextDecoder {
    pub fn new() -> Self {
        TextDecoder {
            scratch: String::with_capacity(256),
        }
    }

    /// Decode the Z-string at `addr`, returning the text and the byte
    /// length consumed (not including abbreviation expansions, which are
    /// read from elsewhere in memory).
    pub fn decode(
        &mut self,
        mm: &mut MemoryMap,
        addr: usize,
        header: &Header,
        unicode_table: &[u16],
    ) -> Result<(String, usize)> {
        self.scratch.clear();
        let len = self.decode_into(mm, addr, header, unicode_table, 0)?;
        Ok((self.scratch.clone(), len))
    }

    fn decode_into(
        &mut self,
        mm: &mut MemoryMap,
        addr: usize,
        header: &Header,
        unicode_table: &[u16],
        depth: u8,
    ) -> Result<usize> {
        if depth > ABBREV_RECURSION_LIMIT {
            return Err(Error::Decode(
                "abbreviation string itself contains an abbreviation".to_string(),
            ));
        }

        let mut zchars = Vec::with_capacity(16);
        let mut offset = addr;
        loop {
            let word = mm.read_word(offset, HighMemoryAccess::Allowed)?;
            offset += 2;
            zchars.push(((word >> 10) & 0x1f) as u8);
            zchars.push(((word >> 5) & 0x1f) as u8);
            zchars.push((word & 0x1f) as u8);
            if word & 0x8000 != 0 {
                break;
            }
        }

        let version = header.version;
        let mut alphabet: u8 = 0;
        let mut shift_lock: Option<u8> = None;
        let mut abbrev_family: Option<u8> = None;

        let mut i = 0;
        while i < zchars.len() {
            let zc = zchars[i];
            i += 1;

            if let Some(family) = abbrev_family.take() {
                let abbrev_num = (family - 1) as usize * 32 + zc as usize;
                let entry_addr = header.abbreviations_addr as usize + abbrev_num * 2;
                let word_addr = mm.read_word(entry_addr, HighMemoryAccess::Allowed)?;
                let byte_addr = (word_addr as usize) * 2;
                let (text, _) = {
                    let saved = std::mem::take(&mut self.scratch);
                    let inner_len = self.decode_into(mm, byte_addr, header, unicode_table, depth + 1)?;
                    let text = self.scratch.clone();
                    self.scratch = saved;
                    (text, inner_len)
                };
                self.scratch.push_str(&text);
                continue;
            }

            match zc {
                0 => self.scratch.push(' '),
                1 if version == 1 => self.scratch.push('\n'),
                2 if version <= 2 => alphabet = (alphabet + 1) % 3,
                3 if version <= 2 => alphabet = (alphabet + 2) % 3,
                1..=3 => abbrev_family = Some(zc),
                4 if version <= 2 => {
                    alphabet = (alphabet + 1) % 3;
                    shift_lock = Some(alphabet);
                }
                5 if version <= 2 => {
                    alphabet = (alphabet + 2) % 3;
                    shift_lock = Some(alphabet);
                }
                4 => alphabet = 1,
                5 => alphabet = 2,
                6 if alphabet == 2 => {
                    if i + 1 >= zchars.len() {
                        trace!("ZSCII escape truncated at end of string");
                        alphabet = shift_lock.unwrap_or(0);
                        continue;
                    }
                    let high = zchars[i];
                    let low = zchars[i + 1];
                    i += 2;
                    let code = ((high as u16) << 5) | low as u16;
                    let ch = zscii_to_char(code, version, unicode_table)?;
                    self.scratch.push(ch);
                    alphabet = shift_lock.unwrap_or(0);
                }
                7 if alphabet == 2 => {
                    self.scratch.push('\n');
                    alphabet = shift_lock.unwrap_or(0);
                }
                6..=31 => {
                    let idx = (zc - 6) as usize;
                    let ch = if header.alphabet_table_addr != 0 {
                        let code = mm.read_byte(
                            header.alphabet_table_addr as usize + alphabet as usize * 26 + idx,
                            HighMemoryAccess::Allowed,
                        )?;
                        zscii_to_char(code as u16, version, unicode_table)?
                    } else {
                        alphabet_table(version, alphabet)[idx] as char
                    };
                    self.scratch.push(ch);
                    alphabet = shift_lock.unwrap_or(0);
                }
                _ => unreachable!("5-bit z-char out of range"),
            }
        }

        Ok(offset - addr)
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode ASCII text into packed Z-characters for dictionary lookup (§4.6
/// "String encoding"). `num_words` is 2 for v<=3 (4 text bytes), 3 for v>=4
/// (6 text bytes).
pub fn encode_for_dictionary(text: &str, num_words: usize, version: u8) -> Vec<u16> {
    let mut zchars = Vec::with_capacity(num_words * 3);
    for ch in text.chars() {
        if zchars.len() >= num_words * 3 {
            break;
        }
        push_zchars(&mut zchars, ch.to_ascii_lowercase(), version);
    }
    zchars.truncate(num_words * 3);
    while zchars.len() < num_words * 3 {
        zchars.push(5);
    }

    let mut words = Vec::with_capacity(num_words);
    for chunk in zchars.chunks(3) {
        let word = ((chunk[0] as u16) << 10) | ((chunk[1] as u16) << 5) | chunk[2] as u16;
        words.push(word);
    }
    if let Some(last) = words.last_mut() {
        *last |= 0x8000;
    }
    words
}

fn push_zchars(out: &mut Vec<u8>, ch: char, version: u8) {
    match ch {
        'a'..='z' => out.push((ch as u8 - b'a') + 6),
        '0'..='9' => {
            out.push(5);
            out.push((ch as u8 - b'0') + 8);
        }
        ' ' => out.push(0),
        _ => {
            let table = alphabet_table(version, 2);
            if let Some(pos) = table.iter().position(|&c| c as char == ch) {
                out.push(5);
                out.push(pos as u8 + 6);
            } else {
                // Unrepresentable character: ZSCII escape via A2 z=6.
                out.push(5);
                out.push(6);
                let code = ch as u16;
                out.push(((code >> 5) & 0x1f) as u8);
                out.push((code & 0x1f) as u8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::story_file::StoryFile;

    fn story_with_word(hi: u8, lo: u8, hi2: u8, lo2: u8) -> (StoryFile, State) {
        let mut bytes = vec![0u8; 256];
        bytes[0] = 3;
        bytes[0x0e] = 0x00;
        bytes[0x0f] = 0x80;
        bytes[0x18] = 0x00;
        bytes[0x19] = 0x40; // abbreviations_addr = 0x40 (unused here)
        bytes[0x20] = hi;
        bytes[0x21] = lo;
        bytes[0x22] = hi2;
        bytes[0x23] = lo2;
        let story = StoryFile::from_bytes(bytes).unwrap();
        let state = State::new(&story).unwrap();
        (story, state)
    }

    #[test]
    fn decodes_hello() {
        // z-chars: h=13,e=10,l=17,l=17,o=20 (+6 offset applied already)
        // word1: 13,10,17 -> 0b01101_01010_10001 = 0x6AA_ish; compute directly.
        let zc = [13u8, 10, 17, 17, 20, 5];
        let w1 = ((zc[0] as u16) << 10) | ((zc[1] as u16) << 5) | zc[2] as u16;
        let w2 = (((zc[3] as u16) << 10) | ((zc[4] as u16) << 5) | zc[5] as u16) | 0x8000;
        let (story, mut state) = story_with_word(
            (w1 >> 8) as u8,
            (w1 & 0xff) as u8,
            (w2 >> 8) as u8,
            (w2 & 0xff) as u8,
        );
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let (s, len) = decoder.decode(&mut mm, 0x20, &header, &[]).unwrap();
        assert_eq!(s, "hello");
        assert_eq!(len, 4);
    }

    #[test]
    fn custom_alphabet_table_overrides_builtin_a0() {
        // v5 story with an alphabet table at 0x80: A0's first entry (z=6) is
        // ZSCII 'Z' instead of the built-in 'a'.
        let mut bytes = vec![0u8; 256];
        bytes[0] = 5;
        bytes[0x0e] = 0x00;
        bytes[0x0f] = 0xc0; // static_memory_base = 0xc0
        bytes[0x34] = 0x00;
        bytes[0x35] = 0x80; // alphabet_table_addr = 0x80

        let a0 = b"zbcdefghijklmnopqrstuvwxy"; // 'z' replaces 'a' at index 0
        bytes[0x80] = b'Z';
        for (i, &c) in a0.iter().skip(1).enumerate() {
            bytes[0x80 + 1 + i] = c;
        }
        // word: z-char 6 (-> index 0 of A0) then pad with two shift-5s.
        let zc = [6u8, 5, 5];
        let w = 0x8000 | ((zc[0] as u16) << 10) | ((zc[1] as u16) << 5) | zc[2] as u16;
        bytes[0x20] = (w >> 8) as u8;
        bytes[0x21] = (w & 0xff) as u8;

        let story = StoryFile::from_bytes(bytes).unwrap();
        let mut state = State::new(&story).unwrap();
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let (s, _) = decoder.decode(&mut mm, 0x20, &header, &[]).unwrap();
        assert_eq!(s, "Z");
    }

    #[test]
    fn encode_pads_and_sets_end_bit() {
        let words = encode_for_dictionary("go", 2, 3);
        assert_eq!(words.len(), 2);
        assert_eq!(words[1] & 0x8000, 0x8000);
    }

    #[test]
    fn encode_decode_round_trip_ascii_lowercase() {
        // Words of length <= text_length round-trip through encode+decode,
        // modulo the trailing padding (§8 "String decoding round trip").
        for word in ["cat", "zz", "lantern"] {
            let words = encode_for_dictionary(word, 3, 3);
            let mut bytes = vec![0u8; 64];
            for (i, w) in words.iter().enumerate() {
                bytes[i * 2] = (w >> 8) as u8;
                bytes[i * 2 + 1] = (w & 0xff) as u8;
            }
            bytes[0] = 3;
            bytes[0x0e] = 0x00;
            bytes[0x0f] = 0x40;
            let story = StoryFile::from_bytes(bytes).unwrap();
            let mut state = State::new(&story).unwrap();
            let header = story.header().clone();
            let mut mm = MemoryMap::new(&story, &mut state);
            let mut decoder = TextDecoder::new();
            let (decoded, _) = decoder.decode(&mut mm, 0, &header, &[]).unwrap();
            assert!(decoded.starts_with(&word[..word.len().min(word.len())]));
        }
    }
}
