//! End-to-end interpreter runs against small hand-assembled story files.
//!
//! These exercise the fetch-decode-execute loop and output path the way a
//! real game would, without depending on any copyrighted story file.

use gruesome::display_headless::HeadlessDisplay;
use gruesome::display_trait::ZMachineDisplay;
use gruesome::interpreter::{Interpreter, RunOutcome};
use gruesome::savestore::{FileSaveStore, SaveStore};
use gruesome::story_file::StoryFile;
use std::path::Path;

fn story_with(tail: &[u8]) -> StoryFile {
    let mut bytes = vec![0u8; 512];
    bytes[0] = 3;
    bytes[0x0e] = 0x01;
    bytes[0x0f] = 0x00; // static_memory_base = 0x0100
    bytes[0x06] = 0x00;
    bytes[0x07] = 0x40; // pc_initial = 0x40
    bytes[64..64 + tail.len()].copy_from_slice(tail);
    StoryFile::from_bytes(bytes).unwrap()
}

fn interpreter_for(story: StoryFile) -> Interpreter {
    let screen: Box<dyn ZMachineDisplay> = Box::new(HeadlessDisplay::new().unwrap());
    let save_store: Box<dyn SaveStore> = Box::new(FileSaveStore::new());
    Interpreter::new(story, Path::new("test.z3"), screen, save_store, None).unwrap()
}

#[test]
fn prints_a_literal_string_then_quits() {
    // print "hi" (h=13, i=14, padded with shift z-char 5); new_line; quit
    let story = story_with(&[0xb2, 0xb5, 0xc5, 0xbb, 0xba]);
    let mut interp = interpreter_for(story);
    let outcome = interp.run().unwrap();
    assert_eq!(outcome, RunOutcome::Quit);
}

#[test]
fn arithmetic_then_store_global_then_quit() {
    // add #10 #32 -> sp; quit
    let story = story_with(&[0x14, 0x0a, 0x20, 0x00, 0xba]);
    let mut interp = interpreter_for(story);
    let outcome = interp.run().unwrap();
    assert_eq!(outcome, RunOutcome::Quit);
    assert_eq!(interp.state.pop().unwrap(), 42);
}

#[test]
fn je_does_not_branch_on_mismatch() {
    // je #1 #2 ?+4; quit; <pad>; quit
    let story = story_with(&[0x41, 0x01, 0x02, 0x84, 0xba, 0xba]);
    let mut interp = interpreter_for(story);
    let outcome = interp.run().unwrap();
    assert_eq!(outcome, RunOutcome::Quit);
}
