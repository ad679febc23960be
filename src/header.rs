//! Parsed view of the 64-byte story file header (§3).

use crate::error::{Error, Result};
use std::fmt::{self, Display, Formatter};

fn word(bytes: &[u8], addr: usize) -> Result<u16> {
    let hi = *bytes
        .get(addr)
        .ok_or_else(|| Error::Format(format!("header truncated at {addr:#04x}")))?;
    let lo = *bytes
        .get(addr + 1)
        .ok_or_else(|| Error::Format(format!("header truncated at {:#04x}", addr + 1)))?;
    Ok(((hi as u16) << 8) | lo as u16)
}

/// Fields of the story file header, offsets as in §3.
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub release: u16,
    pub serial: String,
    pub high_memory_mark: u16,
    pub static_memory_base: u16,
    pub pc_initial: u16,
    pub dictionary_addr: u16,
    pub object_table_addr: u16,
    pub globals_addr: u16,
    pub abbreviations_addr: u16,
    pub checksum_file: u16,
    pub standard_revision_number: u16,
    pub interpreter_number_and_version: u16,
    pub len_file: usize,
    /// v≥5 only; 0 if absent.
    pub alphabet_table_addr: u16,
    /// v≥5 only; 0 if absent.
    pub header_extension_addr: u16,
    /// v6-8; routine packed-address offset (word 8, ×8 bytes).
    pub routine_offset: u16,
    /// v6-8; string packed-address offset (word 8, ×8 bytes).
    pub static_strings_offset: u16,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 64 {
            return Err(Error::Format("header shorter than 64 bytes".to_string()));
        }
        let version = bytes[0];
        let mut serial = String::with_capacity(6);
        for b in &bytes[0x12..0x18] {
            serial.push(*b as char);
        }
        let (alphabet_table_addr, header_extension_addr, routine_offset, static_strings_offset) =
            if version >= 5 {
                (
                    word(bytes, 0x34)?,
                    word(bytes, 0x36)?,
                    word(bytes, 0x28)?,
                    word(bytes, 0x2a)?,
                )
            } else {
                (0, 0, 0, 0)
            };
        Ok(Header {
            version,
            release: word(bytes, 0x02)?,
            serial,
            high_memory_mark: word(bytes, 0x04)?,
            pc_initial: word(bytes, 0x06)?,
            dictionary_addr: word(bytes, 0x08)?,
            object_table_addr: word(bytes, 0x0a)?,
            globals_addr: word(bytes, 0x0c)?,
            static_memory_base: word(bytes, 0x0e)?,
            abbreviations_addr: word(bytes, 0x18)?,
            len_file: word(bytes, 0x1a)? as usize * 2,
            checksum_file: word(bytes, 0x1c)?,
            interpreter_number_and_version: word(bytes, 0x1e)?,
            standard_revision_number: word(bytes, 0x32)?,
            alphabet_table_addr,
            header_extension_addr,
            routine_offset,
            static_strings_offset,
        })
    }

    /// Bitmask of attribute/object-table geometry driven entirely by version.
    pub fn object_entry_size(&self) -> usize {
        if self.version <= 3 {
            9
        } else {
            14
        }
    }

    pub fn property_defaults_count(&self) -> usize {
        if self.version <= 3 {
            31
        } else {
            63
        }
    }

    pub fn dictionary_text_length(&self) -> usize {
        if self.version <= 3 {
            4
        } else {
            6
        }
    }

    /// Bits of Flags2 byte (offset 0x10) that are writable, per §4.3.
    pub fn writable_flags2_mask(&self) -> u8 {
        match self.version {
            v if v < 3 => 0b0000_0001,
            6 => 0b0000_0111,
            _ => 0b0000_0011,
        }
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "
Z-code version:           {}
Release number:           {}
Serial number:            {}
High memory mark:         {:#06x}
Static memory base:       {:#06x}
Initial PC:               {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Abbreviations address:    {:#06x}
File size:                {:#06x}
Checksum:                 {:#06x}
",
            self.version,
            self.release,
            self.serial,
            self.high_memory_mark,
            self.static_memory_base,
            self.pc_initial,
            self.dictionary_addr,
            self.object_table_addr,
            self.globals_addr,
            self.abbreviations_addr,
            self.len_file,
            self.checksum_file,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(version: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[0] = version;
        bytes[0x04] = 0x04;
        bytes[0x05] = 0x00; // high_memory_mark = 0x0400
        bytes[0x06] = 0x04;
        bytes[0x07] = 0x10; // pc_initial = 0x0410
        bytes[0x0e] = 0x03;
        bytes[0x0f] = 0x00; // static_memory_base = 0x0300
        bytes
    }

    #[test]
    fn parses_basic_fields() {
        let h = Header::parse(&fixture(3)).unwrap();
        assert_eq!(h.version, 3);
        assert_eq!(h.high_memory_mark, 0x0400);
        assert_eq!(h.pc_initial, 0x0410);
        assert_eq!(h.static_memory_base, 0x0300);
        assert_eq!(h.object_entry_size(), 9);
        assert_eq!(h.property_defaults_count(), 31);
    }

    #[test]
    fn v5_fields_default_to_zero_when_absent() {
        let mut bytes = fixture(3);
        bytes[0x34] = 0xff;
        let h = Header::parse(&bytes).unwrap();
        assert_eq!(h.alphabet_table_addr, 0);
    }

    #[test]
    fn v5_parses_extension_fields() {
        let mut bytes = fixture(5);
        bytes[0x34] = 0x01;
        bytes[0x35] = 0x00;
        let h = Header::parse(&bytes).unwrap();
        assert_eq!(h.alphabet_table_addr, 0x0100);
        assert_eq!(h.object_entry_size(), 14);
        assert_eq!(h.property_defaults_count(), 63);
        assert_eq!(h.dictionary_text_length(), 6);
    }
}
