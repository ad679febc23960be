//! Writing a Quetzal save file (§4.8 "save").

use crate::error::Result;
use crate::quetzal::chunks::{IfhdChunk, StksChunk};
use crate::quetzal::compressed_memory::CMemChunk;
use crate::quetzal::iff::IffFile;
use crate::state::State;
use crate::story_file::StoryFile;
use std::path::Path;

pub struct SaveGame;

impl SaveGame {
    /// Write the current machine state to `path` as a Quetzal `.qzl`/`.sav` file.
    pub fn save(story: &StoryFile, state: &State, path: &Path) -> Result<()> {
        let header = story.header();
        let original = &story.bytes()[..state.dyn_size()];

        let ifhd = IfhdChunk::from_header(header, state.pc);
        let cmem = CMemChunk::from_memory(&state.dynamic_memory, original);
        let stks = StksChunk::from_state(state);

        let mut iff = IffFile::new();
        iff.add_chunk(*b"IFhd", ifhd.to_bytes());
        iff.add_chunk(*b"CMem", cmem.to_bytes());
        iff.add_chunk(*b"Stks", stks.to_bytes());

        iff.write_to_file(path)
    }
}
