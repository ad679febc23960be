//! Reading a Quetzal save file (§4.8 "restore").

use crate::error::{Error, Result};
use crate::quetzal::chunks::{IfhdChunk, StksChunk};
use crate::quetzal::compressed_memory::decompress_memory;
use crate::quetzal::iff::IffFile;
use crate::state::{RestoredFrame, State};
use crate::story_file::StoryFile;
use std::path::Path;

pub struct RestoreGame;

impl RestoreGame {
    /// Read `path` and apply it to `state`, which must belong to `story`.
    /// Refuses to restore a save made against a different game or release
    /// (§4.8: "restore must refuse a save file whose IFhd does not match").
    pub fn restore(story: &StoryFile, state: &mut State, path: &Path) -> Result<()> {
        let iff = IffFile::read_from_file(path)?;

        if &iff.form_type != b"IFZS" {
            return Err(Error::Format("save file is not a Quetzal (IFZS) file".to_string()));
        }

        let ifhd_data = iff
            .find_chunk(b"IFhd")
            .ok_or_else(|| Error::Format("save file has no IFhd chunk".to_string()))?;
        let ifhd = IfhdChunk::from_bytes(&ifhd_data.data)?;
        if !ifhd.matches(story.header()) {
            return Err(Error::Format(
                "save file does not match this story file (release/serial/checksum mismatch)"
                    .to_string(),
            ));
        }

        let original = &story.bytes()[..state.dyn_size()];
        let dynamic_memory = if let Some(cmem) = iff.find_chunk(b"CMem") {
            decompress_memory(&cmem.data, original)?
        } else if let Some(umem) = iff.find_chunk(b"UMem") {
            if umem.data.len() != original.len() {
                return Err(Error::Format(format!(
                    "UMem chunk is {} bytes, expected {}",
                    umem.data.len(),
                    original.len()
                )));
            }
            umem.data.clone()
        } else {
            return Err(Error::Format(
                "save file has neither a CMem nor a UMem chunk".to_string(),
            ));
        };

        let stks_data = iff
            .find_chunk(b"Stks")
            .ok_or_else(|| Error::Format("save file has no Stks chunk".to_string()))?;
        let stks = StksChunk::from_bytes(&stks_data.data)?;
        let restored: Vec<RestoredFrame> = stks
            .frames
            .into_iter()
            .map(|f| RestoredFrame {
                return_pc: f.return_pc as usize,
                result_var: f.result_var,
                args_supplied: f.args_supplied,
                locals: f.locals,
                eval_stack: f.eval_stack,
            })
            .collect();

        state.restore_from_frames(dynamic_memory, ifhd.initial_pc as usize, restored)
    }
}
