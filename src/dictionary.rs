//! Dictionary lookup and text tokenization (§4.4 "Dictionary").
//!
//! The dictionary table is read directly out of memory through a
//! [`MemoryMap`] rather than copied into a side structure; [`Dictionary`]
//! only caches the small header (separators, entry geometry) needed to
//! tokenize and binary-search it.

use crate::error::Result;
use crate::header::Header;
use crate::memory_map::{HighMemoryAccess, MemoryMap};
use crate::text;
use log::trace;

/// One parsed token: its ZSCII text length and its start offset within the
/// text buffer (counted from the first character byte, §4.4 "Parse buffer").
pub struct Token {
    pub text_len: u8,
    pub start: u8,
    pub dict_addr: u16,
}

pub struct Dictionary {
    /// ZSCII codes of word-separator characters (space is always implied).
    separators: Vec<u8>,
    entry_length: usize,
    /// Number of entries; a negative count (per spec) means the table is
    /// *not* sorted and must be searched linearly.
    entry_count: i16,
    entries_addr: usize,
}

impl Dictionary {
    /// Load the dictionary header at `header.dictionary_addr`.
    pub fn load(mm: &mut MemoryMap, header: &Header) -> Result<Self> {
        Self::load_at(mm, header.dictionary_addr as usize)
    }

    /// Load a dictionary header at an arbitrary address, for the `tokenise`
    /// opcode's optional alternate-dictionary operand (§4.4).
    pub fn load_at(mm: &mut MemoryMap, addr: usize) -> Result<Self> {
        let base = addr;
        let num_sep = mm.read_byte(base, HighMemoryAccess::Allowed)? as usize;
        let mut separators = Vec::with_capacity(num_sep);
        for i in 0..num_sep {
            separators.push(mm.read_byte(base + 1 + i, HighMemoryAccess::Allowed)?);
        }
        let entry_length_addr = base + 1 + num_sep;
        let entry_length = mm.read_byte(entry_length_addr, HighMemoryAccess::Allowed)? as usize;
        let entry_count = mm.read_word(entry_length_addr + 1, HighMemoryAccess::Allowed)? as i16;
        let entries_addr = entry_length_addr + 3;
        Ok(Dictionary {
            separators,
            entry_length,
            entry_count,
            entries_addr,
        })
    }

    fn is_separator(&self, zscii: u8) -> bool {
        zscii == b' ' || self.separators.contains(&zscii)
    }

    /// Split `text` (already-lowercased ASCII) into tokens at spaces and
    /// separator characters. Separator characters become single-character
    /// tokens of their own (§4.4: "a separator is itself a word").
    fn tokenize(&self, text: &str) -> Vec<(usize, usize)> {
        let bytes = text.as_bytes();
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &b) in bytes.iter().enumerate() {
            if self.is_separator(b) {
                if let Some(s) = start.take() {
                    tokens.push((s, i - s));
                }
                if b != b' ' {
                    tokens.push((i, 1));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push((s, bytes.len() - s));
        }
        tokens
    }

    fn entry_text(&self, mm: &mut MemoryMap, index: usize, text_words: usize) -> Result<Vec<u16>> {
        let addr = self.entries_addr + index * self.entry_length;
        let mut words = Vec::with_capacity(text_words);
        for w in 0..text_words {
            words.push(mm.read_word(addr + w * 2, HighMemoryAccess::Allowed)?);
        }
        Ok(words)
    }

    /// Binary (or linear, for unsorted tables) search for `encoded` among
    /// the dictionary entries. Returns the entry's byte address, or `None`
    /// if not found.
    fn lookup(&self, mm: &mut MemoryMap, encoded: &[u16]) -> Result<Option<usize>> {
        let count = self.entry_count.unsigned_abs() as usize;
        let text_words = encoded.len();
        if self.entry_count >= 0 {
            let (mut lo, mut hi) = (0usize, count);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let candidate = self.entry_text(mm, mid, text_words)?;
                match candidate.as_slice().cmp(encoded) {
                    std::cmp::Ordering::Equal => {
                        return Ok(Some(self.entries_addr + mid * self.entry_length))
                    }
                    std::cmp::Ordering::Less => lo = mid + 1,
                    std::cmp::Ordering::Greater => hi = mid,
                }
            }
        } else {
            for i in 0..count {
                let candidate = self.entry_text(mm, i, text_words)?;
                if candidate == encoded {
                    return Ok(Some(self.entries_addr + i * self.entry_length));
                }
            }
        }
        Ok(None)
    }

    /// Parse `text` and write the result into the parse buffer at
    /// `parse_buf_addr` (§4.4 "Parse buffer format"). `skip_unrecognized`
    /// implements the `tokenise` opcode's flag argument: when set, entries
    /// for words not found in the dictionary are left untouched rather than
    /// zeroed.
    pub fn parse(
        &self,
        mm: &mut MemoryMap,
        header: &Header,
        text: &str,
        text_origin: u8,
        parse_buf_addr: usize,
        skip_unrecognized: bool,
    ) -> Result<()> {
        let max_tokens = mm.read_byte(parse_buf_addr, HighMemoryAccess::Allowed)? as usize;
        let tokens = self.tokenize(text);
        let num_tokens = tokens.len().min(max_tokens);
        mm.write_byte(parse_buf_addr + 1, num_tokens as u8)?;

        let num_words = header.dictionary_text_length() / 2;
        for (i, (start, len)) in tokens.iter().take(num_tokens).enumerate() {
            let word = &text[*start..*start + *len];
            let encoded = text::encode_for_dictionary(word, num_words, header.version);
            let found = self.lookup(mm, &encoded)?;
            let entry_slot = parse_buf_addr + 2 + i * 4;
            match found {
                Some(addr) => {
                    mm.write_word(entry_slot, addr as u16)?;
                    mm.write_byte(entry_slot + 2, *len as u8)?;
                    mm.write_byte(entry_slot + 3, text_origin + *start as u8)?;
                }
                None => {
                    trace!("dictionary: word {word:?} not found");
                    if !skip_unrecognized {
                        mm.write_word(entry_slot, 0)?;
                        mm.write_byte(entry_slot + 2, *len as u8)?;
                        mm.write_byte(entry_slot + 3, text_origin + *start as u8)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count.unsigned_abs() as usize
    }

    pub fn entries_addr(&self) -> usize {
        self.entries_addr
    }

    pub fn entry_length(&self) -> usize {
        self.entry_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::story_file::StoryFile;

    /// Build a v3 story with a two-entry sorted dictionary ("go", "look").
    fn dict_story() -> (StoryFile, State) {
        let mut bytes = vec![0u8; 256];
        bytes[0] = 3;
        bytes[0x08] = 0x00;
        bytes[0x09] = 0x40; // dictionary_addr = 0x40
        bytes[0x0e] = 0x00;
        bytes[0x0f] = 0xc0; // static_memory_base = 0xc0

        let base = 0x40usize;
        bytes[base] = 0; // 0 separators
        let entry_length_addr = base + 1;
        bytes[entry_length_addr] = 6; // entry length (v3: 4 text bytes + 2 data bytes)
        bytes[entry_length_addr + 1] = 0x00;
        bytes[entry_length_addr + 2] = 0x02; // 2 entries, sorted
        let entries_addr = entry_length_addr + 3;

        let go = text::encode_for_dictionary("go", 2, 3);
        let look = text::encode_for_dictionary("look", 2, 3);
        for (i, w) in go.iter().enumerate() {
            bytes[entries_addr + i * 2] = (w >> 8) as u8;
            bytes[entries_addr + i * 2 + 1] = (w & 0xff) as u8;
        }
        for (i, w) in look.iter().enumerate() {
            bytes[entries_addr + 6 + i * 2] = (w >> 8) as u8;
            bytes[entries_addr + 6 + i * 2 + 1] = (w & 0xff) as u8;
        }

        let story = StoryFile::from_bytes(bytes).unwrap();
        let state = State::new(&story).unwrap();
        (story, state)
    }

    #[test]
    fn tokenizes_on_spaces() {
        let (story, mut state) = dict_story();
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let dict = Dictionary::load(&mut mm, &header).unwrap();
        let tokens = dict.tokenize("go north");
        assert_eq!(tokens, vec![(0, 2), (3, 5)]);
    }

    #[test]
    fn finds_known_word() {
        let (story, mut state) = dict_story();
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let dict = Dictionary::load(&mut mm, &header).unwrap();
        let encoded = text::encode_for_dictionary("go", 2, 3);
        let found = dict.lookup(&mut mm, &encoded).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn parse_writes_buffer_for_unknown_and_known_words() {
        let (story, mut state) = dict_story();
        let header = story.header().clone();
        let parse_buf = 0x90;
        {
            let mut mm = MemoryMap::new(&story, &mut state);
            mm.write_byte(parse_buf, 4).unwrap(); // max 4 tokens
            let dict = Dictionary::load(&mut mm, &header).unwrap();
            dict.parse(&mut mm, &header, "go xyzzy", 1, parse_buf, false)
                .unwrap();
        }
        let mut mm = MemoryMap::new(&story, &mut state);
        let num_tokens = mm.read_byte(parse_buf + 1, HighMemoryAccess::Allowed).unwrap();
        assert_eq!(num_tokens, 2);
        let first_addr = mm.read_word(parse_buf + 2, HighMemoryAccess::Allowed).unwrap();
        assert_ne!(first_addr, 0);
        let second_addr = mm.read_word(parse_buf + 6, HighMemoryAccess::Allowed).unwrap();
        assert_eq!(second_addr, 0);
    }
}
