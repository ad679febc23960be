//! Quetzal save/restore round trip through a real temp file: dynamic memory,
//! program counter, and the call-frame stack must all come back unchanged.

use gruesome::memory_map::MemoryMap;
use gruesome::quetzal::{RestoreGame, SaveGame};
use gruesome::state::State;
use gruesome::story_file::StoryFile;

fn story() -> StoryFile {
    let mut bytes = vec![0u8; 512];
    bytes[0] = 3;
    bytes[0x02] = 0x12; // release number high byte
    bytes[0x03] = 0x34;
    bytes[0x0e] = 0x01;
    bytes[0x0f] = 0x00; // static_memory_base = 0x0100
    StoryFile::from_bytes(bytes).unwrap()
}

#[test]
fn save_then_restore_preserves_memory_pc_and_stack() {
    let story = story();
    let mut state = State::new(&story).unwrap();

    {
        let mut mm = MemoryMap::new(&story, &mut state);
        mm.write_word(0x40, 0xbeef).unwrap();
        mm.write_byte(0x41, 0x42).unwrap();
    }
    state.pc = 0x200;
    state.push(0xaaaa).unwrap();
    state
        .push_frame(0x300, &[7, 8, 9], false, Some(16), 0b011)
        .unwrap();
    state.push(0x5555).unwrap();

    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "gruesome-roundtrip-test-{}.qzl",
        std::process::id()
    ));

    SaveGame::save(&story, &state, &path).unwrap();

    let mut restored_state = State::new(&story).unwrap();
    RestoreGame::restore(&story, &mut restored_state, &path).unwrap();

    std::fs::remove_file(&path).ok();

    assert_eq!(restored_state.pc, state.pc);
    assert_eq!(restored_state.pop().unwrap(), 0x5555);
    let frame = restored_state.pop_frame().unwrap();
    assert_eq!(frame.result_var, Some(16));

    let mut mm = MemoryMap::new(&story, &mut restored_state);
    assert_eq!(
        mm.read_word(0x40, gruesome::memory_map::HighMemoryAccess::Allowed)
            .unwrap(),
        0xbeef
    );
}

#[test]
fn restore_rejects_save_from_a_different_release() {
    let story_a = story();
    let mut bytes_b = vec![0u8; 512];
    bytes_b[0] = 3;
    bytes_b[0x02] = 0x99; // different release number
    bytes_b[0x03] = 0x99;
    bytes_b[0x0e] = 0x01;
    bytes_b[0x0f] = 0x00;
    let story_b = StoryFile::from_bytes(bytes_b).unwrap();

    let state_a = State::new(&story_a).unwrap();
    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "gruesome-roundtrip-mismatch-{}.qzl",
        std::process::id()
    ));
    SaveGame::save(&story_a, &state_a, &path).unwrap();

    let mut state_b = State::new(&story_b).unwrap();
    let result = RestoreGame::restore(&story_b, &mut state_b, &path);
    std::fs::remove_file(&path).ok();

    assert!(result.is_err());
}
