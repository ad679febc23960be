//! The opcode dispatcher: fetch-decode-execute over a [`StoryFile`] +
//! [`State`] pair, driving a [`ZMachineDisplay`] and a [`SaveStore`] (§4.7
//! "Interpreter").
//!
//! [`Interpreter::run`] loops until a `quit` opcode or an unrecoverable
//! error; [`Interpreter::step`] decodes and executes exactly one
//! instruction, which is what the single-step tracer (`-D`) drives.

use crate::config::Config;
use crate::dictionary::Dictionary;
use crate::display_trait::ZMachineDisplay;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::instruction::{Branch, BranchTarget, Instruction, Operand};
use crate::memory_map::{HighMemoryAccess, MemoryMap};
use crate::object;
use crate::opcode_tables::Opcode;
use crate::quetzal::{RestoreGame, SaveGame};
use crate::savestore::SaveStore;
use crate::state::State;
use crate::story_file::StoryFile;
use crate::text::{self, TextDecoder};
use crate::tracer::Tracer;
use crate::zrand::ZRand;
use log::warn;
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

const STREAM_SCREEN: u8 = 0b0001;
const STREAM_TRANSCRIPT: u8 = 0b0010;

/// One slot of a stream-3 redirection (§4.7 "Output streams"): ZSCII bytes
/// are written to `addr + 2 + written`, and `addr` holds the running count
/// once the table is popped.
struct Stream3Entry {
    addr: u16,
    written: u16,
}

/// What happened at the end of [`Interpreter::run`] (§4.7 "Termination").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Quit,
}

/// Ties together every collaborator the opcode dispatcher needs: the
/// read-only story, the mutable machine state, the dictionary, the display
/// and save-file backends, and the handful of small pieces of session state
/// (output stream routing, current font, input script) that don't belong to
/// any of them.
pub struct Interpreter {
    story: StoryFile,
    state: State,
    dictionary: Dictionary,
    screen: Box<dyn ZMachineDisplay>,
    save_store: Box<dyn SaveStore>,
    default_save_path: PathBuf,
    rand: ZRand,
    text_decoder: TextDecoder,
    unicode_table: Vec<u16>,
    tracer: Option<Tracer>,
    output_mask: u8,
    stream3_stack: Vec<Stream3Entry>,
    transcript: Option<File>,
    command_script: Option<File>,
    current_font: u16,
    current_window: u8,
}

impl Interpreter {
    /// Build an interpreter ready to run `story`. `story_path` is only used
    /// to derive the default save-file name; `transcript_path`, if given,
    /// opens stream 2 immediately rather than waiting on `output_stream 2`.
    pub fn new(
        story: StoryFile,
        story_path: &Path,
        screen: Box<dyn ZMachineDisplay>,
        save_store: Box<dyn SaveStore>,
        transcript_path: Option<&Path>,
    ) -> Result<Self> {
        if story.version() == 6 {
            return Err(Error::Unsupported(
                "version 6 (graphical, picture-window games) is not supported".to_string(),
            ));
        }

        let mut state = State::new(&story)?;
        let header = story.header().clone();
        let unicode_table = load_unicode_table(&story, &header)?;
        let dictionary = {
            let mut mm = MemoryMap::new(&story, &mut state);
            Dictionary::load(&mut mm, &header)?
        };

        let transcript = match transcript_path {
            Some(p) => Some(File::create(p).map_err(|e| Error::Io(format!("{}: {e}", p.display())))?),
            None => None,
        };

        let default_save_path = story_path.with_extension("sav");

        Ok(Interpreter {
            story,
            state,
            dictionary,
            screen,
            save_store,
            default_save_path,
            rand: ZRand::new_uniform(),
            text_decoder: TextDecoder::new(),
            unicode_table,
            tracer: None,
            output_mask: STREAM_SCREEN,
            stream3_stack: Vec::new(),
            transcript,
            command_script: None,
            current_font: 1,
            current_window: 0,
        })
    }

    /// Apply the loaded config's screen dimensions to the display backend.
    /// Kept separate from `new` so callers choosing between headless and
    /// interactive backends don't need to know about [`Config`] at all.
    pub fn configure_display(&mut self, config: &Config) {
        self.screen.handle_resize(config.screen.columns, config.screen.lines);
    }

    pub fn enable_tracing(&mut self) {
        self.tracer = Some(Tracer::new());
    }

    /// Record player input into a transcript-of-commands file (stream 4),
    /// one line per `sread`/`aread`.
    pub fn enable_command_script(&mut self, path: &Path) -> Result<()> {
        self.command_script =
            Some(File::create(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?);
        Ok(())
    }

    pub fn header(&self) -> &Header {
        self.story.header()
    }

    fn mm(&mut self) -> MemoryMap<'_> {
        MemoryMap::new(&self.story, &mut self.state)
    }

    /// Run to completion: either `quit` or a terminal error.
    pub fn run(&mut self) -> Result<RunOutcome> {
        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Decode and execute exactly one instruction. Returns `Some(outcome)`
    /// once the game has ended (`quit`), else `None`.
    pub fn step(&mut self) -> Result<Option<RunOutcome>> {
        let header = self.story.header().clone();
        let pc = self.state.pc;
        let instr = {
            let mut mm = self.mm();
            Instruction::decode(&mut mm, pc, &header, &mut self.text_decoder, &self.unicode_table)?
        };
        self.state.pc = pc + instr.size;

        if let Some(tracer) = &mut self.tracer {
            tracer.on_instruction(&instr, self.state.frame_count());
        }

        self.execute(&instr, &header)
    }

    // -- small helpers shared by many opcodes --------------------------------

    /// Write an opcode's result. Variable 0 means "push", handled via
    /// [`State::store_to_variable0`] so the usual "discard-then-push" store
    /// semantics apply even though the instruction never popped first.
    fn write_var(&mut self, var: u8, value: u16) -> Result<()> {
        if var == 0 {
            self.state.store_to_variable0(value)
        } else {
            self.state.write_variable(var, value)
        }
    }

    fn read_var(&mut self, var: u8) -> Result<u16> {
        self.state.read_variable(var, false)
    }

    fn operand_value(&mut self, op: Operand) -> Result<u16> {
        let mut mm = self.mm();
        op.value(&mut mm)
    }

    fn operand_values(&mut self, instr: &Instruction) -> Result<Vec<u16>> {
        instr.operands.iter().map(|&op| self.operand_value(op)).collect()
    }

    fn take_branch(&mut self, branch: Option<Branch>, condition: bool) -> Result<()> {
        let Some(b) = branch else { return Ok(()) };
        if condition == b.on_true {
            match b.target {
                BranchTarget::ReturnFalse => self.do_return(0)?,
                BranchTarget::ReturnTrue => self.do_return(1)?,
                BranchTarget::Offset(offset) => {
                    self.state.pc = (self.state.pc as i64 + offset as i64 - 2) as usize;
                }
            }
        }
        Ok(())
    }

    fn do_return(&mut self, value: u16) -> Result<()> {
        let frame = self.state.pop_frame()?;
        if let Some(var) = frame.result_var {
            self.write_var(var, value)?;
        }
        Ok(())
    }

    /// Decode the Z-string embedded at `addr`, without consuming it as an
    /// instruction (used by `print_addr`/`print_paddr`/`print_obj`).
    fn decode_string_at(&mut self, addr: usize) -> Result<String> {
        let header = self.story.header().clone();
        let mut mm = self.mm();
        let (s, _) = self.text_decoder.decode(&mut mm, addr, &header, &self.unicode_table)?;
        Ok(s)
    }

    /// Route text to whichever output streams are currently active (§4.7
    /// "Output streams"). Stream 3 (memory table) takes exclusive priority
    /// over screen/transcript: while stream 3 is selected, no other stream
    /// receives output.
    fn output_text(&mut self, text: &str) -> Result<()> {
        if let Some(entry) = self.stream3_stack.last_mut() {
            let base = entry.addr as usize + 2 + entry.written as usize;
            let mut written = 0u16;
            {
                let mut mm = self.mm();
                for (i, ch) in text.chars().enumerate() {
                    let byte = text::char_to_zscii(ch)?;
                    mm.write_byte(base + i, byte)?;
                    written += 1;
                }
            }
            self.stream3_stack.last_mut().unwrap().written += written;
            return Ok(());
        }
        if self.output_mask & STREAM_SCREEN != 0 {
            self.screen
                .print(text)
                .map_err(|e| Error::Io(format!("display: {e}")))?;
        }
        if self.output_mask & STREAM_TRANSCRIPT != 0 {
            if let Some(f) = &mut self.transcript {
                f.write_all(text.as_bytes())?;
            }
        }
        Ok(())
    }

    fn output_char(&mut self, ch: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.output_text(ch.encode_utf8(&mut buf))
    }

    // -- calls / returns ------------------------------------------------------

    /// `call`/`call_1n`/`call_2s`/`call_2n`/`call_vs2`/`call_vn`/`call_vn2`:
    /// address 0 returns false without pushing a frame (§4.7 "call").
    fn call_routine(
        &mut self,
        packed_addr: u16,
        args: &[u16],
        discard_result: bool,
        result_var: Option<u8>,
    ) -> Result<()> {
        if packed_addr == 0 {
            if !discard_result {
                if let Some(var) = result_var {
                    self.write_var(var, 0)?;
                }
            }
            return Ok(());
        }
        let header = self.story.header().clone();
        let routine_addr = text::unpack_routine_address(packed_addr, &header);
        let mut locals;
        let first_instr_addr;
        {
            let mut mm = self.mm();
            let num_locals = mm.read_byte(routine_addr, HighMemoryAccess::Allowed)? as usize;
            locals = vec![0u16; num_locals];
            let mut cursor = routine_addr + 1;
            if header.version <= 4 {
                for local in locals.iter_mut() {
                    *local = mm.read_word(cursor, HighMemoryAccess::Allowed)?;
                    cursor += 2;
                }
            }
            first_instr_addr = cursor;
        }
        for (i, local) in locals.iter_mut().enumerate() {
            if let Some(&value) = args.get(i) {
                *local = value;
            }
        }
        let args_supplied = if args.is_empty() {
            0
        } else {
            let n = args.len().min(locals.len()).min(8);
            (1u16 << n) as u8 - 1
        };
        self.state
            .push_frame(first_instr_addr, &locals, discard_result, result_var, args_supplied)
    }

    // -- the dispatcher -------------------------------------------------------

    fn execute(&mut self, instr: &Instruction, header: &Header) -> Result<Option<RunOutcome>> {
        use Opcode::*;
        match instr.opcode {
            // -- 2OP arithmetic/comparison --------------------------------
            Je => {
                let vals = self.operand_values(instr)?;
                let cond = vals.len() > 1 && vals[1..].iter().any(|&v| v == vals[0]);
                self.take_branch(instr.branch, cond)?;
            }
            Jl => {
                let vals = self.operand_values(instr)?;
                let cond = (vals[0] as i16) < (vals[1] as i16);
                self.take_branch(instr.branch, cond)?;
            }
            Jg => {
                let vals = self.operand_values(instr)?;
                let cond = (vals[0] as i16) > (vals[1] as i16);
                self.take_branch(instr.branch, cond)?;
            }
            DecChk => {
                let var = instr.operands[0].as_variable_number()?;
                let compare = self.operand_value(instr.operands[1])?;
                let value = (self.read_var(var)? as i16).wrapping_sub(1);
                self.write_var(var, value as u16)?;
                self.take_branch(instr.branch, value < compare as i16)?;
            }
            IncChk => {
                let var = instr.operands[0].as_variable_number()?;
                let compare = self.operand_value(instr.operands[1])?;
                let value = (self.read_var(var)? as i16).wrapping_add(1);
                self.write_var(var, value as u16)?;
                self.take_branch(instr.branch, value > compare as i16)?;
            }
            Jin => {
                let vals = self.operand_values(instr)?;
                let parent = object::parent(&mut self.mm(), header, vals[0])?;
                self.take_branch(instr.branch, parent == vals[1])?;
            }
            Test => {
                let vals = self.operand_values(instr)?;
                self.take_branch(instr.branch, vals[0] & vals[1] == vals[1])?;
            }
            Or => {
                let vals = self.operand_values(instr)?;
                self.write_var(instr.store_var.unwrap(), vals[0] | vals[1])?;
            }
            And => {
                let vals = self.operand_values(instr)?;
                self.write_var(instr.store_var.unwrap(), vals[0] & vals[1])?;
            }
            TestAttr => {
                let vals = self.operand_values(instr)?;
                let set = object::test_attr(&mut self.mm(), header, vals[0], vals[1])?;
                self.take_branch(instr.branch, set)?;
            }
            SetAttr => {
                let vals = self.operand_values(instr)?;
                object::set_attr(&mut self.mm(), header, vals[0], vals[1])?;
            }
            ClearAttr => {
                let vals = self.operand_values(instr)?;
                object::clear_attr(&mut self.mm(), header, vals[0], vals[1])?;
            }
            Store => {
                let var = instr.operands[0].as_variable_number()?;
                let value = self.operand_value(instr.operands[1])?;
                self.write_var(var, value)?;
            }
            InsertObj => {
                let vals = self.operand_values(instr)?;
                object::insert_obj(&mut self.mm(), header, vals[0], vals[1])?;
            }
            Loadw => {
                let vals = self.operand_values(instr)?;
                let addr = vals[0] as usize + 2 * vals[1] as usize;
                let value = self.mm().read_word(addr, HighMemoryAccess::Denied)?;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            Loadb => {
                let vals = self.operand_values(instr)?;
                let addr = vals[0] as usize + vals[1] as usize;
                let value = self.mm().read_byte(addr, HighMemoryAccess::Denied)? as u16;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            GetProp => {
                let vals = self.operand_values(instr)?;
                let value = object::get_prop(&mut self.mm(), header, vals[0], vals[1])?;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            GetPropAddr => {
                let vals = self.operand_values(instr)?;
                let value = object::get_prop_addr(&mut self.mm(), header, vals[0], vals[1])?;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            GetNextProp => {
                let vals = self.operand_values(instr)?;
                let value = object::get_next_prop(&mut self.mm(), header, vals[0], vals[1])?;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            Add => {
                let vals = self.operand_values(instr)?;
                let value = (vals[0] as i16).wrapping_add(vals[1] as i16);
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            Sub => {
                let vals = self.operand_values(instr)?;
                let value = (vals[0] as i16).wrapping_sub(vals[1] as i16);
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            Mul => {
                let vals = self.operand_values(instr)?;
                let value = (vals[0] as i16).wrapping_mul(vals[1] as i16);
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            Div => {
                let vals = self.operand_values(instr)?;
                if vals[1] == 0 {
                    return Err(Error::Decode("division by zero".to_string()));
                }
                let value = (vals[0] as i16).wrapping_div(vals[1] as i16);
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            Mod => {
                let vals = self.operand_values(instr)?;
                if vals[1] == 0 {
                    return Err(Error::Decode("division by zero".to_string()));
                }
                let value = (vals[0] as i16).wrapping_rem(vals[1] as i16);
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            Call2s => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], false, instr.store_var)?;
            }
            Call2n => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], true, None)?;
            }
            SetColour => {
                let vals = self.operand_values(instr)?;
                self.screen
                    .set_colour(vals[0] as i16, vals[1] as i16)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            Throw => {
                let vals = self.operand_values(instr)?;
                let value = vals[0];
                let frame_id = vals[1];
                if frame_id == 0 {
                    return Err(Error::Decode("throw to frame 0 is not a live frame".to_string()));
                }
                let frame = self.state.unwind_to(frame_id as usize - 1)?;
                if let Some(var) = frame.result_var {
                    self.write_var(var, value)?;
                }
            }

            // -- 1OP --------------------------------------------------------
            Jz => {
                let v = self.operand_value(instr.operands[0])?;
                self.take_branch(instr.branch, v == 0)?;
            }
            GetSibling => {
                let obj = self.operand_value(instr.operands[0])?;
                let sib = object::sibling(&mut self.mm(), header, obj)?;
                self.write_var(instr.store_var.unwrap(), sib)?;
                self.take_branch(instr.branch, sib != 0)?;
            }
            GetChild => {
                let obj = self.operand_value(instr.operands[0])?;
                let child = object::child(&mut self.mm(), header, obj)?;
                self.write_var(instr.store_var.unwrap(), child)?;
                self.take_branch(instr.branch, child != 0)?;
            }
            GetParent => {
                let obj = self.operand_value(instr.operands[0])?;
                let parent = object::parent(&mut self.mm(), header, obj)?;
                self.write_var(instr.store_var.unwrap(), parent)?;
            }
            GetPropLen => {
                let addr = self.operand_value(instr.operands[0])?;
                let len = object::get_prop_len(&mut self.mm(), header, addr)?;
                self.write_var(instr.store_var.unwrap(), len)?;
            }
            Inc => {
                let var = instr.operands[0].as_variable_number()?;
                let value = (self.read_var(var)? as i16).wrapping_add(1);
                self.write_var(var, value as u16)?;
            }
            Dec => {
                let var = instr.operands[0].as_variable_number()?;
                let value = (self.read_var(var)? as i16).wrapping_sub(1);
                self.write_var(var, value as u16)?;
            }
            PrintAddr => {
                let addr = self.operand_value(instr.operands[0])? as usize;
                let text = self.decode_string_at(addr)?;
                self.output_text(&text)?;
            }
            Call1s => {
                let addr = self.operand_value(instr.operands[0])?;
                self.call_routine(addr, &[], false, instr.store_var)?;
            }
            RemoveObj => {
                let obj = self.operand_value(instr.operands[0])?;
                object::remove_obj(&mut self.mm(), header, obj)?;
            }
            PrintObj => {
                let obj = self.operand_value(instr.operands[0])?;
                let text = self.decode_object_short_name(obj)?;
                self.output_text(&text)?;
            }
            Ret => {
                let v = self.operand_value(instr.operands[0])?;
                self.do_return(v)?;
            }
            Jump => {
                let offset = self.operand_value(instr.operands[0])? as i16;
                self.state.pc = (self.state.pc as i64 + offset as i64 - 2) as usize;
            }
            PrintPaddr => {
                let packed = self.operand_value(instr.operands[0])?;
                let addr = text::unpack_string_address(packed, header);
                let text = self.decode_string_at(addr)?;
                self.output_text(&text)?;
            }
            Load => {
                let var = instr.operands[0].as_variable_number()?;
                let value = self.state.read_variable(var, true)?;
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            Not1Op => {
                let v = self.operand_value(instr.operands[0])?;
                self.write_var(instr.store_var.unwrap(), !v)?;
            }
            Call1n => {
                let addr = self.operand_value(instr.operands[0])?;
                self.call_routine(addr, &[], true, None)?;
            }

            // -- 0OP ----------------------------------------------------------
            Rtrue => self.do_return(1)?,
            Rfalse => self.do_return(0)?,
            Print => {
                let text = instr.text.clone().unwrap_or_default();
                self.output_text(&text)?;
            }
            PrintRet => {
                let text = instr.text.clone().unwrap_or_default();
                self.output_text(&text)?;
                self.output_char('\n')?;
                self.do_return(1)?;
            }
            Nop => {}
            Save0 => {
                let path = self.default_save_path.clone();
                let result = SaveGame::save(&self.story, &self.state, &path);
                if let Err(e) = &result {
                    warn!("save failed: {e}");
                }
                match header.version {
                    v if v <= 3 => self.take_branch(instr.branch, result.is_ok())?,
                    _ => self.write_var(instr.store_var.unwrap(), result.is_ok() as u16)?,
                }
            }
            Restore0 => {
                let path = self.default_save_path.clone();
                let result = RestoreGame::restore(&self.story, &mut self.state, &path);
                let ok = result.is_ok();
                if let Err(e) = &result {
                    warn!("restore failed: {e}");
                }
                match header.version {
                    v if v <= 3 => self.take_branch(instr.branch, ok)?,
                    _ => {
                        let value = if ok { 2 } else { 0 };
                        self.write_var(instr.store_var.unwrap(), value)?;
                    }
                }
            }
            Restart => {
                self.state.restart(&self.story)?;
                self.stream3_stack.clear();
                self.output_mask = STREAM_SCREEN;
            }
            RetPopped => {
                let v = self.state.pop()?;
                self.do_return(v)?;
            }
            PopStack => {
                self.state.pop()?;
            }
            Catch => {
                self.write_var(instr.store_var.unwrap(), self.state.frame_count() as u16)?;
            }
            Quit => return Ok(Some(RunOutcome::Quit)),
            NewLine => self.output_char('\n')?,
            ShowStatus => self.show_status(header)?,
            Verify => {
                let ok = self.verify_checksum(header)?;
                self.take_branch(instr.branch, ok)?;
            }
            Piracy => self.take_branch(instr.branch, true)?,

            // -- VAR ----------------------------------------------------------
            Call => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], false, instr.store_var)?;
            }
            Storew => {
                let vals = self.operand_values(instr)?;
                let addr = vals[0] as usize + 2 * vals[1] as usize;
                self.mm().write_word(addr, vals[2])?;
            }
            Storeb => {
                let vals = self.operand_values(instr)?;
                let addr = vals[0] as usize + vals[1] as usize;
                self.mm().write_byte(addr, vals[2] as u8)?;
            }
            PutProp => {
                let vals = self.operand_values(instr)?;
                object::put_prop(&mut self.mm(), header, vals[0], vals[1], vals[2])?;
            }
            Sread => self.sread(instr, header)?,
            Aread => self.aread(instr, header)?,
            PrintChar => {
                let v = self.operand_value(instr.operands[0])?;
                let ch = text::zscii_to_char(v, header.version, &self.unicode_table)?;
                self.output_char(ch)?;
            }
            PrintNum => {
                let v = self.operand_value(instr.operands[0])? as i16;
                self.output_text(&v.to_string())?;
            }
            Random => {
                let range = self.operand_value(instr.operands[0])? as i16;
                let value = if range > 0 {
                    self.rand.gen_range_inclusive(range as u16)
                } else {
                    if range == 0 {
                        self.rand.reseed_random();
                    } else {
                        self.rand.reseed_predictable((-range) as u64);
                    }
                    0
                };
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            Push => {
                let v = self.operand_value(instr.operands[0])?;
                self.state.push(v)?;
            }
            Pull => {
                let var = instr.operands[0].as_variable_number()?;
                let v = self.state.pop()?;
                self.state.pull_to_variable(var, v)?;
            }
            SplitWindow => {
                let lines = self.operand_value(instr.operands[0])?;
                self.screen
                    .split_window(lines)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            SetWindow => {
                let window = self.operand_value(instr.operands[0])? as u8;
                self.current_window = window;
                self.screen
                    .set_window(window)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            CallVs2 => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], false, instr.store_var)?;
            }
            EraseWindow => {
                let window = self.operand_value(instr.operands[0])? as i16;
                self.screen
                    .erase_window(window)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            EraseLine => {
                self.screen.erase_line().map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            SetCursor => {
                let vals = self.operand_values(instr)?;
                self.screen
                    .set_cursor(vals[0], vals[1])
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            GetCursor => {
                let addr = self.operand_value(instr.operands[0])? as usize;
                let (line, col) = self.screen.get_cursor().map_err(|e| Error::Io(format!("display: {e}")))?;
                let mut mm = self.mm();
                mm.write_word(addr, line)?;
                mm.write_word(addr + 2, col)?;
            }
            SetTextStyle => {
                let style = self.operand_value(instr.operands[0])?;
                self.screen
                    .set_text_style(style)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            BufferMode => {
                let v = self.operand_value(instr.operands[0])?;
                self.screen
                    .set_buffer_mode(v != 0)
                    .map_err(|e| Error::Io(format!("display: {e}")))?;
            }
            OutputStream => self.output_stream(instr)?,
            InputStream => { /* only one input stream (keyboard) is supported */ }
            SoundEffect => { /* sound effects are out of scope */ }
            ReadChar => self.read_char_opcode(instr)?,
            ScanTable => self.scan_table(instr)?,
            NotVar => {
                let v = self.operand_value(instr.operands[0])?;
                self.write_var(instr.store_var.unwrap(), !v)?;
            }
            CallVn => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], true, None)?;
            }
            CallVn2 => {
                let vals = self.operand_values(instr)?;
                self.call_routine(vals[0], &vals[1..], true, None)?;
            }
            Tokenise => self.tokenise(instr, header)?,
            EncodeText => self.encode_text(instr, header)?,
            CopyTable => self.copy_table(instr)?,
            PrintTable => self.print_table(instr)?,
            CheckArgCount => {
                let n = self.operand_value(instr.operands[0])?;
                let supplied = self.state.current_frame().args_supplied;
                self.take_branch(instr.branch, n >= 1 && n <= 8 && (supplied & (1 << (n - 1))) != 0)?;
            }

            // -- EXT ------------------------------------------------------
            LogShift => {
                let vals = self.operand_values(instr)?;
                let places = vals[1] as i16;
                let value = if places >= 0 {
                    (vals[0]).wrapping_shl(places as u32)
                } else {
                    (vals[0]).wrapping_shr((-places) as u32)
                };
                self.write_var(instr.store_var.unwrap(), value)?;
            }
            ArtShift => {
                let vals = self.operand_values(instr)?;
                let places = vals[1] as i16;
                let value = if places >= 0 {
                    (vals[0] as i16).wrapping_shl(places as u32)
                } else {
                    (vals[0] as i16).wrapping_shr((-places) as u32)
                };
                self.write_var(instr.store_var.unwrap(), value as u16)?;
            }
            SetFont => {
                let font = self.operand_value(instr.operands[0])?;
                let previous = self.current_font;
                let supported = matches!(font, 1 | 4);
                if supported {
                    self.current_font = font;
                }
                self.write_var(instr.store_var.unwrap(), if supported { previous } else { 0 })?;
            }
            SaveUndo => {
                let path = self.save_store.new_undo_path()?;
                let result = SaveGame::save(&self.story, &self.state, &path);
                if let Err(e) = &result {
                    warn!("save_undo failed: {e}");
                }
                self.write_var(instr.store_var.unwrap(), result.is_ok() as u16)?;
            }
            RestoreUndo => {
                let path = self.save_store.current_undo_path().map(|p| p.to_path_buf());
                let result = match path {
                    Some(p) => RestoreGame::restore(&self.story, &mut self.state, &p),
                    None => Err(Error::Format("no undo save available".to_string())),
                };
                match result {
                    Ok(()) => {
                        // `state.pc` now points just past the original
                        // `save_undo` instruction; its store-var byte is the
                        // last byte of that instruction (no branch/text in
                        // its shape), so it sits one byte before the new pc.
                        let store_byte_addr = self.state.pc - 1;
                        let var = self.mm().read_byte(store_byte_addr, HighMemoryAccess::Allowed)?;
                        self.write_var(var, 2)?;
                    }
                    Err(e) => {
                        warn!("restore_undo failed: {e}");
                        self.write_var(instr.store_var.unwrap(), 0)?;
                    }
                }
            }
            PrintUnicode => {
                let code = self.operand_value(instr.operands[0])?;
                if let Some(ch) = char::from_u32(code as u32) {
                    self.output_char(ch)?;
                }
            }
            CheckUnicode => {
                let code = self.operand_value(instr.operands[0])?;
                // Conservative capability bitmask: bit 0 (can print) is set
                // for anything that maps to a valid `char`; bit 1 (can read
                // from the keyboard) is never set since terminal input is
                // limited to the host's own character set.
                let can_print = char::from_u32(code as u32).is_some();
                self.write_var(instr.store_var.unwrap(), if can_print { 1 } else { 0 })?;
            }
            SetTrueColour => {
                // True-colour values are accepted and silently ignored; the
                // terminal backends only support the 2-255 ANSI palette.
            }

            Unsupported6(n) => {
                return Err(Error::Unsupported(format!(
                    "version-6-only opcode {n:#04x} is not supported"
                )));
            }
            Unknown(n) => {
                return Err(Error::Decode(format!("unknown opcode byte {n:#04x}")));
            }
        }
        Ok(None)
    }

    // -- larger opcode bodies, broken out for readability --------------------

    fn show_status(&mut self, header: &Header) -> Result<()> {
        if header.version > 3 {
            return Ok(());
        }
        let global0 = self.state.read_global(16)?;
        let location = self.decode_object_short_name(global0)?;
        let flags1 = self.mm().read_byte(0x01, HighMemoryAccess::Denied)?;
        let score_format = flags1 & 0x02 == 0;
        let g1 = self.state.read_global(17)? as i16;
        let g2 = self.state.read_global(18)?;
        if score_format {
            self.screen
                .show_status(&location, g1, g2)
                .map_err(|e| Error::Io(format!("display: {e}")))?;
        } else {
            self.screen
                .show_status(&location, 0, (g1 as u16) * 60 + g2)
                .map_err(|e| Error::Io(format!("display: {e}")))?;
        }
        Ok(())
    }

    fn decode_object_short_name(&mut self, obj: u16) -> Result<String> {
        if obj == 0 {
            return Ok(String::new());
        }
        let header = self.story.header().clone();
        let props_addr = object::properties_header_addr(&mut self.mm(), &header, obj)?;
        self.decode_string_at(props_addr + 1)
    }

    /// `verify` (§4.7): compare the file's declared checksum against the sum
    /// of every byte from offset 0x40 to the end of the file, modulo
    /// 0x10000. The checksum is a whole-file property fixed at load time, so
    /// this reads the immutable story bytes rather than `self.state`.
    fn verify_checksum(&self, header: &Header) -> Result<bool> {
        if header.checksum_file == 0 {
            return Ok(true);
        }
        let bytes = self.story.bytes();
        let end = header.len_file.min(bytes.len());
        if end <= 0x40 {
            return Ok(false);
        }
        let sum: u32 = bytes[0x40..end].iter().map(|&b| b as u32).sum();
        Ok((sum & 0xffff) as u16 == header.checksum_file)
    }

    fn output_stream(&mut self, instr: &Instruction) -> Result<()> {
        let stream = self.operand_value(instr.operands[0])? as i16;
        match stream.unsigned_abs() {
            1 => {
                if stream > 0 {
                    self.output_mask |= STREAM_SCREEN;
                } else {
                    self.output_mask &= !STREAM_SCREEN;
                }
            }
            2 => {
                if stream > 0 {
                    self.output_mask |= STREAM_TRANSCRIPT;
                } else {
                    self.output_mask &= !STREAM_TRANSCRIPT;
                }
            }
            3 => {
                if stream > 0 {
                    let addr = self.operand_value(instr.operands[1])?;
                    self.mm().write_word(addr as usize, 0)?;
                    self.stream3_stack.push(Stream3Entry { addr, written: 0 });
                } else if let Some(entry) = self.stream3_stack.pop() {
                    self.mm().write_word(entry.addr as usize, entry.written)?;
                }
            }
            4 => { /* handled by enable_command_script/sread/aread directly */ }
            _ => {
                return Err(Error::Decode(format!("invalid output stream {stream}")));
            }
        }
        Ok(())
    }

    fn scan_table(&mut self, instr: &Instruction) -> Result<()> {
        let vals = self.operand_values(instr)?;
        let x = vals[0];
        let table = vals[1] as usize;
        let len = vals[2];
        let form = vals.get(3).copied().unwrap_or(0x82);
        let field_len = (form & 0x7f) as usize;
        let words = form & 0x80 != 0;
        let mut found = 0u16;
        for i in 0..len {
            let addr = table + i as usize * field_len;
            let candidate = if words {
                self.mm().read_word(addr, HighMemoryAccess::Denied)?
            } else {
                self.mm().read_byte(addr, HighMemoryAccess::Denied)? as u16
            };
            if candidate == x {
                found = addr as u16;
                break;
            }
        }
        self.write_var(instr.store_var.unwrap(), found)?;
        self.take_branch(instr.branch, found != 0)
    }

    fn copy_table(&mut self, instr: &Instruction) -> Result<()> {
        let vals = self.operand_values(instr)?;
        let first = vals[0] as usize;
        let second = vals[1] as usize;
        let size = vals[2] as i16;
        if second == 0 {
            for i in 0..size.unsigned_abs() as usize {
                self.mm().write_byte(first + i, 0)?;
            }
            return Ok(());
        }
        let len = size.unsigned_abs() as usize;
        let mut bytes = Vec::with_capacity(len);
        for i in 0..len {
            bytes.push(self.mm().read_byte(first + i, HighMemoryAccess::Denied)?);
        }
        if size >= 0 && second > first && second < first + len {
            // Overlapping forward copy: go backward so source bytes aren't
            // clobbered before they're read (§4.7 "copy_table").
            for i in (0..len).rev() {
                self.mm().write_byte(second + i, bytes[i])?;
            }
        } else {
            for (i, &b) in bytes.iter().enumerate() {
                self.mm().write_byte(second + i, b)?;
            }
        }
        Ok(())
    }

    fn print_table(&mut self, instr: &Instruction) -> Result<()> {
        let vals = self.operand_values(instr)?;
        let table = vals[0] as usize;
        let width = vals[1] as usize;
        let height = vals.get(2).copied().unwrap_or(1) as usize;
        let skip = vals.get(3).copied().unwrap_or(0) as usize;
        for row in 0..height {
            if row > 0 {
                self.output_char('\n')?;
            }
            let row_addr = table + row * (width + skip);
            for col in 0..width {
                let byte = self.mm().read_byte(row_addr + col, HighMemoryAccess::Denied)?;
                let ch = text::zscii_to_char(byte as u16, self.story.header().version, &self.unicode_table)?;
                self.output_char(ch)?;
            }
        }
        Ok(())
    }

    fn encode_text(&mut self, instr: &Instruction, header: &Header) -> Result<()> {
        let vals = self.operand_values(instr)?;
        let zscii_table = vals[0] as usize;
        let length = vals[1] as usize;
        let from = vals[2] as usize;
        let coded_buf = vals[3] as usize;
        let mut text = String::with_capacity(length);
        for i in 0..length {
            let byte = self.mm().read_byte(zscii_table + from + i, HighMemoryAccess::Denied)?;
            text.push(byte as char);
        }
        let num_words = header.dictionary_text_length() / 2;
        let words = text::encode_for_dictionary(&text, num_words, header.version);
        let mut mm = self.mm();
        for (i, w) in words.iter().enumerate() {
            mm.write_word(coded_buf + i * 2, *w)?;
        }
        Ok(())
    }

    fn tokenise(&mut self, instr: &Instruction, header: &Header) -> Result<()> {
        let text_buf = self.operand_value(instr.operands[0])? as usize;
        let parse_buf = self.operand_value(instr.operands[1])? as usize;
        let dict_addr = match instr.operands.get(2) {
            Some(&op) => Some(self.operand_value(op)? as usize),
            None => None,
        };
        let skip_unrecognized = match instr.operands.get(3) {
            Some(&op) => self.operand_value(op)? != 0,
            None => false,
        };

        let text_origin: u8 = if header.version >= 5 { 2 } else { 1 };
        let count_addr = if header.version >= 5 { text_buf + 1 } else { text_buf };
        let count = self.mm().read_byte(count_addr, HighMemoryAccess::Denied)? as usize;
        let mut text = String::with_capacity(count);
        for i in 0..count {
            let b = self
                .mm()
                .read_byte(text_buf + text_origin as usize + i, HighMemoryAccess::Denied)?;
            text.push((b as char).to_ascii_lowercase());
        }

        let mut mm = self.mm();
        match dict_addr {
            Some(addr) => {
                let dict = Dictionary::load_at(&mut mm, addr)?;
                dict.parse(&mut mm, header, &text, text_origin, parse_buf, skip_unrecognized)?;
            }
            None => {
                self.dictionary
                    .parse(&mut mm, header, &text, text_origin, parse_buf, skip_unrecognized)?;
            }
        }
        Ok(())
    }

    fn read_char_opcode(&mut self, instr: &Instruction) -> Result<()> {
        loop {
            match self
                .screen
                .read_char(0)
                .map_err(|e| Error::Io(format!("display: {e}")))?
            {
                Some(ch) => {
                    let code = if ch == '\n' || ch == '\r' { 13 } else { (ch as u32).min(255) as u16 };
                    self.write_var(instr.store_var.unwrap(), code)?;
                    return Ok(());
                }
                None => std::thread::sleep(std::time::Duration::from_millis(10)),
            }
        }
    }

    /// `sread`/`aread`'s shared input loop: poll the display for characters,
    /// echoing printable ones and handling backspace, until Enter.
    fn read_line(&mut self, max_len: usize, mut existing: String) -> Result<String> {
        loop {
            match self
                .screen
                .read_char(0)
                .map_err(|e| Error::Io(format!("display: {e}")))?
            {
                Some('\n') | Some('\r') => return Ok(existing),
                Some(ch) if ch == '\u{8}' || ch == '\u{7f}' => {
                    if existing.pop().is_some() {
                        self.screen
                            .print_input_echo("\u{8} \u{8}")
                            .map_err(|e| Error::Io(format!("display: {e}")))?;
                    }
                }
                Some(ch) if ch.is_ascii_graphic() || ch == ' ' => {
                    if existing.len() < max_len {
                        let lower = ch.to_ascii_lowercase();
                        existing.push(lower);
                        let mut buf = [0u8; 4];
                        self.screen
                            .print_input_echo(lower.encode_utf8(&mut buf))
                            .map_err(|e| Error::Io(format!("display: {e}")))?;
                    }
                }
                Some(_) => {}
                None => std::thread::sleep(std::time::Duration::from_millis(10)),
            }
        }
    }

    fn sread(&mut self, instr: &Instruction, header: &Header) -> Result<()> {
        let text_buf = self.operand_value(instr.operands[0])? as usize;
        let parse_buf = self.operand_value(instr.operands[1])? as usize;
        let max_len = self.mm().read_byte(text_buf, HighMemoryAccess::Denied)? as usize;

        let line = self.read_line(max_len, String::new())?;
        if let Some(script) = &mut self.command_script {
            let _ = writeln!(script, "{line}");
        }

        let mut mm = self.mm();
        for (i, b) in line.bytes().enumerate() {
            mm.write_byte(text_buf + 1 + i, b)?;
        }
        mm.write_byte(text_buf + 1 + line.len(), 0)?;
        self.dictionary.parse(&mut mm, header, &line, 1, parse_buf, false)
    }

    fn aread(&mut self, instr: &Instruction, header: &Header) -> Result<()> {
        let text_buf = self.operand_value(instr.operands[0])? as usize;
        let parse_buf = match instr.operands.get(1) {
            Some(&op) => Some(self.operand_value(op)? as usize),
            None => None,
        };
        let max_len = self.mm().read_byte(text_buf, HighMemoryAccess::Denied)? as usize;
        let existing_len = self.mm().read_byte(text_buf + 1, HighMemoryAccess::Denied)? as usize;
        let mut existing = String::with_capacity(existing_len);
        for i in 0..existing_len {
            let b = self.mm().read_byte(text_buf + 2 + i, HighMemoryAccess::Denied)?;
            existing.push(b as char);
        }

        let line = self.read_line(max_len, existing)?;
        if let Some(script) = &mut self.command_script {
            let _ = writeln!(script, "{line}");
        }

        {
            let mut mm = self.mm();
            mm.write_byte(text_buf + 1, line.len() as u8)?;
            for (i, b) in line.bytes().enumerate() {
                mm.write_byte(text_buf + 2 + i, b)?;
            }
            if let Some(parse_buf) = parse_buf {
                self.dictionary.parse(&mut mm, header, &line, 2, parse_buf, false)?;
            }
        }
        if let Some(var) = instr.store_var {
            self.write_var(var, 13)?;
        }
        Ok(())
    }
}

/// Load the header-extension Unicode translation table, if the story
/// declares one (v5+, §4.6 "translation table").
fn load_unicode_table(story: &StoryFile, header: &Header) -> Result<Vec<u16>> {
    if header.version < 5 || header.header_extension_addr == 0 {
        return Ok(Vec::new());
    }
    let ext_addr = header.header_extension_addr as usize;
    let ext_len = story.word(ext_addr)? as usize;
    if ext_len < 3 {
        return Ok(Vec::new());
    }
    let unicode_table_addr = story.word(ext_addr + 3 * 2)? as usize;
    if unicode_table_addr == 0 {
        return Ok(Vec::new());
    }
    let count = story.byte(unicode_table_addr)? as usize;
    let mut table = Vec::with_capacity(count);
    for i in 0..count {
        table.push(story.word(unicode_table_addr + 1 + i * 2)?);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_headless::HeadlessDisplay;
    use crate::savestore::FileSaveStore;

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
    fn rejects_v6() {
        let mut bytes = vec![0u8; 512];
        bytes[0] = 6;
        let story = StoryFile::from_bytes(bytes).unwrap();
        let screen: Box<dyn ZMachineDisplay> = Box::new(HeadlessDisplay::new().unwrap());
        let save_store: Box<dyn SaveStore> = Box::new(FileSaveStore::new());
        assert!(Interpreter::new(story, Path::new("x.z6"), screen, save_store, None).is_err());
    }

    #[test]
    fn add_and_store_then_quit() {
        // add #2 #3 -> sp; quit
        let story = story_with(&[0x14, 0x02, 0x03, 0x00, 0xba]);
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
        assert_eq!(interp.state.pop().unwrap(), 5);
    }

    #[test]
    fn jz_branches_on_zero() {
        // jz #0 ?+5; quit; <pad>; quit
        let story = story_with(&[0x90, 0x00, 0xc5, 0xba, 0x00, 0xba]);
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
    }

    #[test]
    fn calling_packed_address_zero_returns_false() {
        // call #0 -> sp; quit
        let story = story_with(&[0xe0, 0x3f, 0x00, 0x00, 0x00, 0xba]);
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
        assert_eq!(interp.state.pop().unwrap(), 0);
    }

    #[test]
    fn inc_chk_branches_past_compare_value() {
        // inc_chk local L00, #4 ?+4; quit; <pad>; quit
        // Long form 2OP 0x05 (inc_chk), operand types: variable, small const.
        let story = story_with(&[0x45, 0x01, 0x04, 0x84, 0xba, 0xba]);
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
    }

    #[test]
    fn add_wraps_on_signed_overflow() {
        // add 0x7fff #1 -> sp; quit
        // Variable-form 2OP (opcode 0x14), operand types large/small const.
        let story = story_with(&[0xd4, 0x1f, 0x7f, 0xff, 0x01, 0x00, 0xba]);
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
        assert_eq!(interp.state.pop().unwrap(), 0x8000);
    }

    #[test]
    fn div_by_zero_is_an_interpreter_error() {
        // div #5 #0 -> g0; quit
        let story = story_with(&[0x17, 0x05, 0x00, 0x10, 0xba]);
        let mut interp = interpreter_for(story);
        assert!(matches!(interp.run(), Err(Error::Decode(_))));
    }

    #[test]
    fn returning_true_via_branch_stores_one_in_caller() {
        // Main: call routine at 0x100 -> g5; quit.
        // Routine (0 locals): jz #0 ?(offset=1, i.e. "return true").
        let mut bytes = vec![0u8; 512];
        bytes[0] = 3;
        bytes[0x0e] = 0x02;
        bytes[0x0f] = 0x00; // static_memory_base = 0x0200
        bytes[0x06] = 0x00;
        bytes[0x07] = 0x40; // pc_initial = 0x40

        bytes[0x40..0x46].copy_from_slice(&[0xe0, 0x3f, 0x00, 0x80, 0x15, 0xba]);
        bytes[0x100] = 0x00; // 0 locals
        bytes[0x101..0x104].copy_from_slice(&[0x90, 0x00, 0xc1]);

        let story = StoryFile::from_bytes(bytes).unwrap();
        let mut interp = interpreter_for(story);
        let outcome = interp.run().unwrap();
        assert_eq!(outcome, RunOutcome::Quit);
        assert_eq!(interp.state.read_global(0x15).unwrap(), 1);
    }
}
