//! Instruction decoding (§4.5 "Instruction decoding").
//!
//! An [`Instruction`] is a fully-decoded, self-contained view of one opcode:
//! its operands (tagged as constants or variable references, never raw
//! unions), optional store target, optional branch, optional inline string,
//! and total byte size. Decoding never mutates interpreter state; it only
//! reads through a [`MemoryMap`] at [`HighMemoryAccess::Allowed`] (code and
//! embedded strings may live in high memory).

use crate::error::{Error, Result};
use crate::header::Header;
use crate::memory_map::{HighMemoryAccess, MemoryMap};
use crate::opcode_tables::{self, Opcode};
use crate::text::TextDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
    Omitted,
}

impl OperandType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    Long,
    Short,
    Variable,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCountKind {
    Op0,
    Op1,
    Op2,
    Var,
}

/// A decoded operand: either an immediate value or a reference to a
/// variable (local, global, or stack-top) to be resolved at execution time.
/// Kept as a tagged sum rather than a raw union (§9 "Operand representation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Constant(u16),
    Variable(u8),
}

impl Operand {
    /// Read this operand's value, resolving a variable reference through
    /// `mm`'s owning [`crate::state::State`].
    pub fn value(self, mm: &mut MemoryMap) -> Result<u16> {
        match self {
            Operand::Constant(v) => Ok(v),
            Operand::Variable(var) => mm.read_variable(var),
        }
    }

    /// Treat this operand as a variable *number* rather than a value, for
    /// opcodes whose first operand names a variable to mutate (`inc`, `dec`,
    /// `load`, `store`, `inc_chk`, `dec_chk`) (§4.5 "Reference operands").
    pub fn as_variable_number(self) -> Result<u8> {
        match self {
            Operand::Constant(v) => Ok(v as u8),
            Operand::Variable(var) => Err(Error::Decode(format!(
                "operand encoded as a variable reference (var {var}) where a \
                 variable number was expected; use its resolved value"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchTarget {
    ReturnFalse,
    ReturnTrue,
    Offset(i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    /// Branch is taken when the opcode's truth value equals this.
    pub on_true: bool,
    pub target: BranchTarget,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: usize,
    pub opcode: Opcode,
    pub form: Form,
    pub operand_count: OperandCountKind,
    pub operands: Vec<Operand>,
    pub store_var: Option<u8>,
    pub branch: Option<Branch>,
    pub text: Option<String>,
    pub size: usize,
}

fn read_byte(mm: &mut MemoryMap, cursor: &mut usize) -> Result<u8> {
    let b = mm.read_byte(*cursor, HighMemoryAccess::Allowed)?;
    *cursor += 1;
    Ok(b)
}

fn push_operand_types(out: &mut Vec<OperandType>, type_byte: u8) {
    for shift in [6, 4, 2, 0] {
        let bits = (type_byte >> shift) & 0x03;
        let t = OperandType::from_bits(bits);
        if t == OperandType::Omitted {
            break;
        }
        out.push(t);
    }
}

impl Instruction {
    /// Decode the instruction at `addr`. `text_decoder`/`unicode_table` are
    /// only consulted for opcodes that embed a literal Z-string (`print`,
    /// `print_ret`).
    pub fn decode(
        mm: &mut MemoryMap,
        addr: usize,
        header: &Header,
        text_decoder: &mut TextDecoder,
        unicode_table: &[u16],
    ) -> Result<Instruction> {
        let version = header.version;
        let mut cursor = addr;

        let opcode_byte = read_byte(mm, &mut cursor)?;

        let (form, operand_count_bits, ext_opcode) = if opcode_byte == 0xbe && version >= 5 {
            let ext = read_byte(mm, &mut cursor)?;
            (Form::Extended, 0u8, Some(ext))
        } else {
            match opcode_byte >> 6 {
                0b11 => (Form::Variable, opcode_byte & 0x3f, None),
                0b10 => (Form::Short, opcode_byte & 0x0f, None),
                _ => (Form::Long, opcode_byte & 0x1f, None),
            }
        };

        let mut operand_types: Vec<OperandType> = Vec::with_capacity(4);
        let operand_count;

        match form {
            Form::Long => {
                operand_count = OperandCountKind::Op2;
                let t1 = if opcode_byte & 0x40 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                };
                let t2 = if opcode_byte & 0x20 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                };
                operand_types.push(t1);
                operand_types.push(t2);
            }
            Form::Short => {
                let t = OperandType::from_bits((opcode_byte >> 4) & 0x03);
                operand_count = if t == OperandType::Omitted {
                    OperandCountKind::Op0
                } else {
                    OperandCountKind::Op1
                };
                if operand_count == OperandCountKind::Op1 {
                    operand_types.push(t);
                }
            }
            Form::Variable => {
                let is_var_form = opcode_byte & 0x20 != 0;
                operand_count = if is_var_form {
                    OperandCountKind::Var
                } else {
                    OperandCountKind::Op2
                };
                let two_type_bytes = is_var_form && matches!(opcode_byte & 0x1f, 0x0c | 0x1a);
                let type_byte1 = read_byte(mm, &mut cursor)?;
                push_operand_types(&mut operand_types, type_byte1);
                if two_type_bytes {
                    let type_byte2 = read_byte(mm, &mut cursor)?;
                    push_operand_types(&mut operand_types, type_byte2);
                }
            }
            Form::Extended => {
                operand_count = OperandCountKind::Var;
                let type_byte = read_byte(mm, &mut cursor)?;
                push_operand_types(&mut operand_types, type_byte);
            }
        }

        let mut operands = Vec::with_capacity(operand_types.len());
        for ot in &operand_types {
            match ot {
                OperandType::LargeConstant => {
                    let hi = read_byte(mm, &mut cursor)?;
                    let lo = read_byte(mm, &mut cursor)?;
                    operands.push(Operand::Constant(((hi as u16) << 8) | lo as u16));
                }
                OperandType::SmallConstant => {
                    let b = read_byte(mm, &mut cursor)?;
                    operands.push(Operand::Constant(b as u16));
                }
                OperandType::Variable => {
                    let b = read_byte(mm, &mut cursor)?;
                    operands.push(Operand::Variable(b));
                }
                OperandType::Omitted => {}
            }
        }

        let opcode =
            opcode_tables::resolve(form, operand_count, operand_count_bits, ext_opcode, version);
        let opshape = opcode_tables::shape_of(opcode, version);

        let store_var = if opshape.stores_result {
            Some(read_byte(mm, &mut cursor)?)
        } else {
            None
        };

        let branch = if opshape.has_branch {
            let b1 = read_byte(mm, &mut cursor)?;
            let on_true = b1 & 0x80 != 0;
            let offset = if b1 & 0x40 != 0 {
                (b1 & 0x3f) as i16
            } else {
                let b2 = read_byte(mm, &mut cursor)?;
                let raw = (((b1 & 0x3f) as u16) << 8) | b2 as u16;
                if raw & 0x2000 != 0 {
                    (raw | 0xc000) as i16
                } else {
                    raw as i16
                }
            };
            let target = match offset {
                0 => BranchTarget::ReturnFalse,
                1 => BranchTarget::ReturnTrue,
                other => BranchTarget::Offset(other),
            };
            Some(Branch { on_true, target })
        } else {
            None
        };

        let text = if opshape.has_text {
            let (s, len) = text_decoder.decode(mm, cursor, header, unicode_table)?;
            cursor += len;
            Some(s)
        } else {
            None
        };

        Ok(Instruction {
            addr,
            opcode,
            form,
            operand_count,
            operands,
            store_var,
            branch,
            text,
            size: cursor - addr,
        })
    }

    pub fn name(&self) -> &'static str {
        opcode_tables::name_of(self.opcode)
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
    fn decodes_long_form_add() {
        // add (2OP:0x14) with two small constants: 0x14 0x02 0x03 <store 0x00>
        let (story, mut state) = story_with(&[0x14, 0x02, 0x03, 0x00]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let instr = Instruction::decode(&mut mm, 64, &header, &mut decoder, &[]).unwrap();
        assert_eq!(instr.opcode, Opcode::Add);
        assert_eq!(instr.operands, vec![Operand::Constant(2), Operand::Constant(3)]);
        assert_eq!(instr.store_var, Some(0));
        assert_eq!(instr.size, 4);
    }

    #[test]
    fn decodes_short_form_jz_with_branch() {
        // jz (1OP:0x00) on small constant 0, branch-on-true offset 5 in one byte.
        let (story, mut state) = story_with(&[0x90, 0x00, 0xc5]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let instr = Instruction::decode(&mut mm, 64, &header, &mut decoder, &[]).unwrap();
        assert_eq!(instr.opcode, Opcode::Jz);
        let branch = instr.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.target, BranchTarget::Offset(5));
        assert_eq!(instr.size, 3);
    }

    #[test]
    fn decodes_0op_rtrue() {
        let (story, mut state) = story_with(&[0xb0]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let instr = Instruction::decode(&mut mm, 64, &header, &mut decoder, &[]).unwrap();
        assert_eq!(instr.opcode, Opcode::Rtrue);
        assert_eq!(instr.size, 1);
    }

    #[test]
    fn decodes_var_form_call_with_two_large_constants() {
        // call (VAR:0x00) with two large constants 0x1234, 0x5678, store var 0x01
        let (story, mut state) = story_with(&[0xe0, 0x0f, 0x12, 0x34, 0x56, 0x78, 0x01]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let instr = Instruction::decode(&mut mm, 64, &header, &mut decoder, &[]).unwrap();
        assert_eq!(instr.opcode, Opcode::Call);
        assert_eq!(
            instr.operands,
            vec![Operand::Constant(0x1234), Operand::Constant(0x5678)]
        );
        assert_eq!(instr.store_var, Some(0x01));
        assert_eq!(instr.size, 7);
    }

    #[test]
    fn long_form_branch_offset_14bit_sign_extends() {
        // je (2OP:0x01), two small constants, branch-on-false 2-byte offset -10.
        let offset: u16 = (-10i16 as u16) & 0x3fff;
        let b1 = ((offset >> 8) as u8) & 0x3f; // on_true bit clear
        let b2 = (offset & 0xff) as u8;
        let (story, mut state) = story_with(&[0x01, 0x01, 0x02, b1, b2]);
        let header = story.header().clone();
        let mut mm = MemoryMap::new(&story, &mut state);
        let mut decoder = TextDecoder::new();
        let instr = Instruction::decode(&mut mm, 64, &header, &mut decoder, &[]).unwrap();
        let branch = instr.branch.unwrap();
        assert!(!branch.on_true);
        assert_eq!(branch.target, BranchTarget::Offset(-10));
    }
}
