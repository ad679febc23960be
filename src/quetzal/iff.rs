//! IFF (Interchange File Format) chunk container for Quetzal save files
//! (§4.8 "Quetzal container format").

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// An IFF file: a `FORM` header plus an ordered list of typed chunks.
pub struct IffFile {
    /// Form type - "IFZS" for Quetzal.
    pub form_type: [u8; 4],
    pub chunks: Vec<IffChunk>,
}

pub struct IffChunk {
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
}

impl IffFile {
    pub fn new() -> Self {
        IffFile {
            form_type: *b"IFZS",
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, chunk_type: [u8; 4], data: Vec<u8>) {
        self.chunks.push(IffChunk { chunk_type, data });
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        let total_size = 4
            + self
                .chunks
                .iter()
                .map(|c| 8 + c.data.len() + (c.data.len() % 2))
                .sum::<usize>();

        file.write_all(b"FORM")?;
        file.write_all(&(total_size as u32).to_be_bytes())?;
        file.write_all(&self.form_type)?;

        for chunk in &self.chunks {
            file.write_all(&chunk.chunk_type)?;
            file.write_all(&(chunk.data.len() as u32).to_be_bytes())?;
            file.write_all(&chunk.data)?;
            if chunk.data.len() % 2 == 1 {
                file.write_all(&[0])?;
            }
        }

        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut header = [0u8; 4];
        file.read_exact(&mut header)?;
        if &header != b"FORM" {
            return Err(Error::Format("not an IFF file (missing FORM header)".to_string()));
        }

        let mut size_bytes = [0u8; 4];
        file.read_exact(&mut size_bytes)?;
        let _total_size = u32::from_be_bytes(size_bytes);

        let mut form_type = [0u8; 4];
        file.read_exact(&mut form_type)?;

        let mut iff = IffFile {
            form_type,
            chunks: Vec::new(),
        };

        loop {
            let mut chunk_type = [0u8; 4];
            if file.read_exact(&mut chunk_type).is_err() {
                break;
            }

            let mut size_bytes = [0u8; 4];
            file.read_exact(&mut size_bytes)?;
            let chunk_size = u32::from_be_bytes(size_bytes) as usize;

            let mut data = vec![0u8; chunk_size];
            file.read_exact(&mut data)?;

            iff.chunks.push(IffChunk { chunk_type, data });

            if chunk_size % 2 == 1 {
                let mut padding = [0u8; 1];
                let _ = file.read_exact(&mut padding);
            }
        }

        Ok(iff)
    }

    pub fn find_chunk(&self, chunk_type: &[u8; 4]) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.chunk_type == chunk_type)
    }
}

impl Default for IffFile {
    fn default() -> Self {
        Self::new()
    }
}
