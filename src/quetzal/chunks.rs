//! `IFhd` (save-file identity) and `Stks` (call-frame stack) chunk codecs
//! (§4.8 "Quetzal chunks").

use crate::error::{Error, Result};
use crate::header::Header;
use crate::state::State;

/// `IFhd`: identifies which story file a save belongs to, so `restore` can
/// refuse a save made against a different game or release.
pub struct IfhdChunk {
    pub release_number: u16,
    pub serial: [u8; 6],
    pub checksum: u16,
    pub initial_pc: u32,
}

impl IfhdChunk {
    pub fn from_header(header: &Header, pc: usize) -> Self {
        let mut serial = [0u8; 6];
        for (i, b) in header.serial.bytes().take(6).enumerate() {
            serial[i] = b;
        }
        IfhdChunk {
            release_number: header.release,
            serial,
            checksum: header.checksum_file,
            initial_pc: pc as u32,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13);
        out.extend_from_slice(&self.release_number.to_be_bytes());
        out.extend_from_slice(&self.serial);
        out.extend_from_slice(&self.checksum.to_be_bytes());
        out.push(((self.initial_pc >> 16) & 0xff) as u8);
        out.push(((self.initial_pc >> 8) & 0xff) as u8);
        out.push((self.initial_pc & 0xff) as u8);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 13 {
            return Err(Error::Format(format!(
                "IFhd chunk is {} bytes, need at least 13",
                data.len()
            )));
        }
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&data[2..8]);
        Ok(IfhdChunk {
            release_number: u16::from_be_bytes([data[0], data[1]]),
            serial,
            checksum: u16::from_be_bytes([data[8], data[9]]),
            initial_pc: ((data[10] as u32) << 16) | ((data[11] as u32) << 8) | data[12] as u32,
        })
    }

    /// Whether this chunk's identity matches a freshly loaded story file's
    /// header (§4.8: restore must refuse a mismatched save).
    pub fn matches(&self, header: &Header) -> bool {
        let serial_matches = header
            .serial
            .bytes()
            .take(6)
            .eq(self.serial.iter().copied());
        self.release_number == header.release && self.checksum == header.checksum_file && serial_matches
    }
}

/// One call frame as written in a `Stks` chunk.
pub struct StackFrame {
    pub return_pc: u32,
    pub result_var: Option<u8>,
    pub args_supplied: u8,
    pub locals: Vec<u16>,
    pub eval_stack: Vec<u16>,
}

pub struct StksChunk {
    pub frames: Vec<StackFrame>,
}

impl StksChunk {
    /// Build from live state, skipping the implicit dummy root frame (§4.2
    /// "the dummy frame is never popped"; Quetzal stores only real calls).
    pub fn from_state(state: &State) -> Self {
        let frames = state.frames();
        let stack = state.stack();
        let mut out = Vec::with_capacity(frames.len().saturating_sub(1));
        for (i, frame) in frames.iter().enumerate().skip(1) {
            let stack_end = frames
                .get(i + 1)
                .map(|f| f.stack_base)
                .unwrap_or(stack.len());
            let eval_stack = stack[frame.stack_base..stack_end].to_vec();
            out.push(StackFrame {
                return_pc: frame.return_pc as u32,
                result_var: frame.result_var,
                args_supplied: frame.args_supplied,
                locals: frame.locals[..frame.num_locals as usize].to_vec(),
                eval_stack,
            });
        }
        StksChunk { frames: out }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in &self.frames {
            out.push(((frame.return_pc >> 16) & 0xff) as u8);
            out.push(((frame.return_pc >> 8) & 0xff) as u8);
            out.push((frame.return_pc & 0xff) as u8);

            let discard_flag = if frame.result_var.is_none() { 0x10 } else { 0x00 };
            out.push(discard_flag | (frame.locals.len() as u8 & 0x0f));
            out.push(frame.result_var.unwrap_or(0));
            out.push(frame.args_supplied);
            out.extend_from_slice(&(frame.eval_stack.len() as u16).to_be_bytes());
            for local in &frame.locals {
                out.extend_from_slice(&local.to_be_bytes());
            }
            for word in &frame.eval_stack {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut frames = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if i + 6 > data.len() {
                return Err(Error::Format("Stks chunk truncated mid-frame".to_string()));
            }
            let return_pc =
                ((data[i] as u32) << 16) | ((data[i + 1] as u32) << 8) | data[i + 2] as u32;
            let flags = data[i + 3];
            let result_byte = data[i + 4];
            let args_supplied = data[i + 5];
            let num_locals = (flags & 0x0f) as usize;
            let discarded = flags & 0x10 != 0;
            i += 6;

            if i + 2 > data.len() {
                return Err(Error::Format("Stks chunk truncated before stack count".to_string()));
            }
            let eval_count = u16::from_be_bytes([data[i], data[i + 1]]) as usize;
            i += 2;

            let mut locals = Vec::with_capacity(num_locals);
            for _ in 0..num_locals {
                if i + 2 > data.len() {
                    return Err(Error::Format("Stks chunk truncated in locals".to_string()));
                }
                locals.push(u16::from_be_bytes([data[i], data[i + 1]]));
                i += 2;
            }

            let mut eval_stack = Vec::with_capacity(eval_count);
            for _ in 0..eval_count {
                if i + 2 > data.len() {
                    return Err(Error::Format("Stks chunk truncated in eval stack".to_string()));
                }
                eval_stack.push(u16::from_be_bytes([data[i], data[i + 1]]));
                i += 2;
            }

            frames.push(StackFrame {
                return_pc,
                result_var: if discarded { None } else { Some(result_byte) },
                args_supplied,
                locals,
                eval_stack,
            });
        }
        Ok(StksChunk { frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifhd_round_trips() {
        let chunk = IfhdChunk {
            release_number: 42,
            serial: *b"123456",
            checksum: 0xbeef,
            initial_pc: 0x01_2345,
        };
        let bytes = chunk.to_bytes();
        let back = IfhdChunk::from_bytes(&bytes).unwrap();
        assert_eq!(back.release_number, 42);
        assert_eq!(&back.serial, b"123456");
        assert_eq!(back.checksum, 0xbeef);
        assert_eq!(back.initial_pc, 0x01_2345);
    }

    #[test]
    fn stks_round_trips_one_frame() {
        let chunk = StksChunk {
            frames: vec![StackFrame {
                return_pc: 0x1000,
                result_var: Some(5),
                args_supplied: 0b011,
                locals: vec![1, 2, 3],
                eval_stack: vec![10, 20],
            }],
        };
        let bytes = chunk.to_bytes();
        let back = StksChunk::from_bytes(&bytes).unwrap();
        assert_eq!(back.frames.len(), 1);
        assert_eq!(back.frames[0].return_pc, 0x1000);
        assert_eq!(back.frames[0].locals, vec![1, 2, 3]);
        assert_eq!(back.frames[0].eval_stack, vec![10, 20]);
    }

    #[test]
    fn stks_discarded_result_round_trips() {
        let chunk = StksChunk {
            frames: vec![StackFrame {
                return_pc: 0,
                result_var: None,
                args_supplied: 0,
                locals: vec![],
                eval_stack: vec![],
            }],
        };
        let back = StksChunk::from_bytes(&chunk.to_bytes()).unwrap();
        assert_eq!(back.frames[0].result_var, None);
    }
}
