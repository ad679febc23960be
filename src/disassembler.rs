//! Static disassembly (§4.9 "Disassembler"): decode a run of instructions
//! without executing them, for `--disassemble`/debugging tooling.

use crate::error::Result;
use crate::header::Header;
use crate::instruction::{BranchTarget, Instruction, Operand};
use crate::memory_map::MemoryMap;
use crate::text::{self, TextDecoder};
use std::fmt::Write as _;

pub struct Disassembler {
    text_decoder: TextDecoder,
}

impl Disassembler {
    pub fn new() -> Self {
        Disassembler {
            text_decoder: TextDecoder::new(),
        }
    }

    /// Decode up to `count` instructions starting at `start_pc`, stopping
    /// early if `byte_limit` bytes have been consumed.
    pub fn disassemble(
        &mut self,
        mm: &mut MemoryMap,
        header: &Header,
        unicode_table: &[u16],
        start_pc: usize,
        count: usize,
        byte_limit: Option<usize>,
    ) -> Result<Vec<Instruction>> {
        let mut out = Vec::with_capacity(count);
        let mut pc = start_pc;
        let mut consumed = 0usize;
        for _ in 0..count {
            if let Some(limit) = byte_limit {
                if consumed >= limit {
                    break;
                }
            }
            let instr =
                Instruction::decode(mm, pc, header, &mut self.text_decoder, unicode_table)?;
            pc += instr.size;
            consumed += instr.size;
            out.push(instr);
        }
        Ok(out)
    }

    /// Disassemble a routine given its packed address: the routine header
    /// (locals count plus, for v3-4, default local values) followed by its
    /// instructions up to the first unconditional return-ish dead end is not
    /// attempted here; callers supply `count`/`byte_limit` to bound the scan
    /// since static control flow can't always be proven acyclic.
    pub fn disassemble_routine(
        &mut self,
        mm: &mut MemoryMap,
        header: &Header,
        unicode_table: &[u16],
        packed_addr: u16,
        count: usize,
    ) -> Result<(usize, u8, Vec<Instruction>)> {
        let routine_addr = text::unpack_routine_address(packed_addr, header);
        let num_locals = mm.read_byte(routine_addr, crate::memory_map::HighMemoryAccess::Allowed)?;
        let mut first_instr_addr = routine_addr + 1;
        if header.version <= 4 {
            first_instr_addr += num_locals as usize * 2;
        }
        let instrs = self.disassemble(mm, header, unicode_table, first_instr_addr, count, None)?;
        Ok((routine_addr, num_locals, instrs))
    }
}

impl Default for Disassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one decoded instruction the way `gruedasm`-style tools print it:
/// `addr: name operands [-> store] [?(not)branch target]`.
pub fn format_instruction(instr: &Instruction) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:06x}: {}", instr.addr, instr.name());
    for op in &instr.operands {
        let _ = write!(out, " {}", format_operand(*op));
    }
    if let Some(store) = instr.store_var {
        let _ = write!(out, " -> {}", format_variable(store));
    }
    if let Some(branch) = instr.branch {
        let cond = if branch.on_true { "" } else { "not " };
        match branch.target {
            BranchTarget::ReturnFalse => {
                let _ = write!(out, " ?{cond}rfalse");
            }
            BranchTarget::ReturnTrue => {
                let _ = write!(out, " ?{cond}rtrue");
            }
            BranchTarget::Offset(offset) => {
                let _ = write!(out, " ?{cond}{offset:+}");
            }
        }
    }
    if let Some(text) = &instr.text {
        let _ = write!(out, " {text:?}");
    }
    out
}

fn format_operand(op: Operand) -> String {
    match op {
        Operand::Constant(v) => format!("#{v:#06x}"),
        Operand::Variable(v) => format_variable(v),
    }
}

fn format_variable(var: u8) -> String {
    match var {
        0 => "sp".to_string(),
        1..=15 => format!("L{:02x}", var - 1),
        _ => format!("G{:02x}", var - 16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::story_file::StoryFile;

    fn story_with(bytes_tail: &[u8]) -> (StoryFile, State) {
        let mut bytes = vec![0u8; 256];
        bytes[0] = 3;
        bytes[0x0e] = 0x00;
        bytes[0x0f] = 0x80;
        bytes[64..64 + bytes_tail.len()].copy_from_slice(bytes_tail);
        let story = StoryFile::from_bytes(bytes).unwrap();
        let state = State::new(&story).unwrap();
        (story, state)
    }

    #[test]
    fn disassembles_a_short_run() {
        // add #2 #3 -> sp; rtrue
        let (story, mut state) = story_with(&[0x14, 0x02, 0x03, 0x00, 0xb0]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut disasm = Disassembler::new();
        let instrs = disasm.disassemble(&mut mm, &header, &[], 64, 2, None).unwrap();
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0].size, 4);
        assert_eq!(instrs[1].size, 1);
    }

    #[test]
    fn formats_an_instruction_with_store() {
        let (story, mut state) = story_with(&[0x14, 0x02, 0x03, 0x00]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut disasm = Disassembler::new();
        let instrs = disasm.disassemble(&mut mm, &header, &[], 64, 1, None).unwrap();
        let text = format_instruction(&instrs[0]);
        assert!(text.contains("add"));
        assert!(text.contains("-> sp"));
    }
}
