//! Cross-module dictionary parsing: header parse, tokenizer, binary search,
//! and parse-buffer writeback, all driven through the public API only.

use gruesome::dictionary::Dictionary;
use gruesome::memory_map::{HighMemoryAccess, MemoryMap};
use gruesome::state::State;
use gruesome::story_file::StoryFile;
use gruesome::text;

/// A v3 story with a two-entry sorted dictionary ("go", "look").
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
    bytes[entry_length_addr] = 6; // v3 entry: 4 text bytes + 2 data bytes
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
fn parse_fills_buffer_with_known_and_unknown_words() {
    let (story, mut state) = dict_story();
    let header = story.header().clone();
    let parse_buf = 0x90;
    {
        let mut mm = MemoryMap::new(&story, &mut state);
        mm.write_byte(parse_buf, 4).unwrap();
        let dict = Dictionary::load(&mut mm, &header).unwrap();
        dict.parse(&mut mm, &header, "look at xyzzy", 1, parse_buf, false)
            .unwrap();
    }
    let mut mm = MemoryMap::new(&story, &mut state);
    let num_tokens = mm
        .read_byte(parse_buf + 1, HighMemoryAccess::Allowed)
        .unwrap();
    assert_eq!(num_tokens, 2);

    let look_addr = mm
        .read_word(parse_buf + 2, HighMemoryAccess::Allowed)
        .unwrap();
    assert_ne!(look_addr, 0, "known word 'look' should resolve");

    let xyzzy_addr = mm
        .read_word(parse_buf + 6, HighMemoryAccess::Allowed)
        .unwrap();
    assert_eq!(xyzzy_addr, 0, "unknown word should resolve to 0");
}

/// A v3 story with one word-separator ('.') and an empty (0-entry) dictionary.
fn dict_story_with_period_separator() -> (StoryFile, State) {
    let mut bytes = vec![0u8; 256];
    bytes[0] = 3;
    bytes[0x08] = 0x00;
    bytes[0x09] = 0x40; // dictionary_addr = 0x40
    bytes[0x0e] = 0x00;
    bytes[0x0f] = 0xc0; // static_memory_base = 0xc0

    let base = 0x40usize;
    bytes[base] = 1; // 1 separator
    bytes[base + 1] = b'.';
    let entry_length_addr = base + 2;
    bytes[entry_length_addr] = 6;
    bytes[entry_length_addr + 1] = 0x00;
    bytes[entry_length_addr + 2] = 0x00; // 0 entries

    let story = StoryFile::from_bytes(bytes).unwrap();
    let state = State::new(&story).unwrap();
    (story, state)
}

#[test]
fn drop_book_period_tokenizes_into_three_entries() {
    let (story, mut state) = dict_story_with_period_separator();
    let header = story.header().clone();
    let parse_buf = 0x90;
    {
        let mut mm = MemoryMap::new(&story, &mut state);
        mm.write_byte(parse_buf, 4).unwrap();
        let dict = Dictionary::load(&mut mm, &header).unwrap();
        dict.parse(&mut mm, &header, "drop book.", 1, parse_buf, false)
            .unwrap();
    }
    let mut mm = MemoryMap::new(&story, &mut state);
    let num_tokens = mm
        .read_byte(parse_buf + 1, HighMemoryAccess::Allowed)
        .unwrap();
    assert_eq!(num_tokens, 3);

    let entry = |slot: usize| {
        let len = mm
            .read_byte(parse_buf + 2 + slot * 4 + 2, HighMemoryAccess::Allowed)
            .unwrap();
        let pos = mm
            .read_byte(parse_buf + 2 + slot * 4 + 3, HighMemoryAccess::Allowed)
            .unwrap();
        (len, pos)
    };
    assert_eq!(entry(0), (4, 1)); // "drop"
    assert_eq!(entry(1), (4, 6)); // "book"
    assert_eq!(entry(2), (1, 10)); // "."
}

#[test]
fn entry_geometry_matches_v3_layout() {
    let (story, mut state) = dict_story();
    let header = story.header().clone();
    let mut mm = MemoryMap::new(&story, &mut state);
    let dict = Dictionary::load(&mut mm, &header).unwrap();
    assert_eq!(dict.entry_count(), 2);
    assert_eq!(dict.entry_length(), 6);
}
