//! Object tree surgery and property access exercised end to end on a v3
//! object table built by hand, matching the Z-Machine's two-byte family
//! links and variable-length property lists.

use gruesome::memory_map::MemoryMap;
use gruesome::object::{
    child, clear_attr, get_next_prop, get_prop, insert_obj, parent, remove_obj, set_attr,
    sibling, test_attr,
};
use gruesome::state::State;
use gruesome::story_file::StoryFile;

/// Three objects: 1 and 2 are unlinked, 3 will become a container.
fn three_object_story() -> StoryFile {
    let mut bytes = vec![0u8; 512];
    bytes[0] = 3;
    bytes[0x0a] = 0x01;
    bytes[0x0b] = 0x00; // object_table_addr = 0x0100
    bytes[0x0e] = 0x01;
    bytes[0x0f] = 0xf0; // static_memory_base = 0x01f0

    let obj_table = 0x0100usize;
    let entry_size = 9;
    let props_table_size = 31 * 2;
    let entries_addr = obj_table + props_table_size;

    for (i, props_addr) in [(0usize, 0x0180u16), (1, 0x0190), (2, 0x01a0)] {
        let obj = entries_addr + i * entry_size;
        bytes[obj + 7] = (props_addr >> 8) as u8;
        bytes[obj + 8] = (props_addr & 0xff) as u8;
    }

    // Minimal property header (text-length 0, no properties) for each object.
    for addr in [0x0180usize, 0x0190, 0x01a0] {
        bytes[addr] = 0;
        bytes[addr + 1] = 0;
    }

    StoryFile::from_bytes(bytes).unwrap()
}

#[test]
fn nesting_two_objects_into_a_container_updates_the_tree() {
    let story = three_object_story();
    let mut state = State::new(&story).unwrap();
    let header = story.header().clone();
    let mut mm = MemoryMap::new(&story, &mut state);

    insert_obj(&mut mm, &header, 1, 3).unwrap();
    insert_obj(&mut mm, &header, 2, 3).unwrap();

    assert_eq!(parent(&mut mm, &header, 1).unwrap(), 3);
    assert_eq!(parent(&mut mm, &header, 2).unwrap(), 3);
    // Most recently inserted object becomes the first child.
    assert_eq!(child(&mut mm, &header, 3).unwrap(), 2);
    assert_eq!(sibling(&mut mm, &header, 2).unwrap(), 1);

    remove_obj(&mut mm, &header, 2).unwrap();
    assert_eq!(parent(&mut mm, &header, 2).unwrap(), 0);
    assert_eq!(child(&mut mm, &header, 3).unwrap(), 1);
}

#[test]
fn attribute_flags_are_independent_per_object() {
    let story = three_object_story();
    let mut state = State::new(&story).unwrap();
    let header = story.header().clone();
    let mut mm = MemoryMap::new(&story, &mut state);

    set_attr(&mut mm, &header, 1, 4).unwrap();
    assert!(test_attr(&mut mm, &header, 1, 4).unwrap());
    assert!(!test_attr(&mut mm, &header, 2, 4).unwrap());

    clear_attr(&mut mm, &header, 1, 4).unwrap();
    assert!(!test_attr(&mut mm, &header, 1, 4).unwrap());
}

#[test]
fn objects_with_no_properties_fall_back_to_defaults() {
    let story = three_object_story();
    let mut state = State::new(&story).unwrap();
    let header = story.header().clone();
    let mut mm = MemoryMap::new(&story, &mut state);

    mm.write_word(header.object_table_addr as usize + (12 - 1) * 2, 0x77aa)
        .unwrap();
    assert_eq!(get_prop(&mut mm, &header, 1, 12).unwrap(), 0x77aa);
    assert_eq!(get_next_prop(&mut mm, &header, 1, 0).unwrap(), 0);
}
