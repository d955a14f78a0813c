//! The 64K word memory image and its on-disk form.
//!
//! A persisted image is nothing but big-endian 16-bit words for a contiguous range of
//! addresses. There is no header, so the reader has to be told where the words belong.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    ops::RangeInclusive,
    path::Path,
};

use crate::error::ImageError;

/// LC3 can address 64K words.
pub const MEMORY_SIZE: usize = 0x10000;

/// Flat word-addressed memory, zeroed on creation.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Box<[u16]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            cells: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Copy of the words in `range`.
    pub fn words(&self, range: RangeInclusive<u16>) -> Vec<u16> {
        let (start, end) = (*range.start() as usize, *range.end() as usize);
        if start > end {
            return Vec::new();
        }
        self.cells[start..=end].to_vec()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    // 64K zeroes are not worth printing
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.cells.iter().filter(|&&cell| cell != 0).count();
        f.debug_struct("Memory").field("nonzero", &used).finish()
    }
}

/// Serialize the inclusive range `start..=end`, one word per cell. Returns the number of words
/// written; an empty range (`start > end`) writes nothing.
pub fn write_image<W: Write>(
    memory: &Memory,
    start: u16,
    end: u16,
    mut out: W,
) -> Result<usize, ImageError> {
    let words = memory.words(start..=end);
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(words.len())
}

/// Replay words from `input` into memory at increasing addresses from `start`, until the end of
/// the stream. Memory is left untouched if the image is malformed or too long.
pub fn read_into<R: Read>(memory: &mut Memory, start: u16, mut input: R) -> Result<usize, ImageError> {
    let mut buffer = Vec::new();
    input.read_to_end(&mut buffer)?;

    if buffer.len() % 2 != 0 {
        return Err(ImageError::Misaligned(buffer.len()));
    }
    let words = buffer.len() / 2;
    if start as usize + words > MEMORY_SIZE {
        return Err(ImageError::Overflow { start, words });
    }

    for (offset, pair) in buffer.chunks_exact(2).enumerate() {
        let word = u16::from_be_bytes([pair[0], pair[1]]);
        memory.write(start.wrapping_add(offset as u16), word);
    }
    Ok(words)
}

/// [`write_image`] into a freshly created file.
pub fn save(path: &Path, memory: &Memory, start: u16, end: u16) -> Result<usize, ImageError> {
    let file = File::create(path)?;
    let words = write_image(memory, start, end, BufWriter::new(file))?;
    log::debug!("wrote {words} words to {}", path.display());
    Ok(words)
}

/// [`read_into`] from a file.
pub fn load(path: &Path, memory: &mut Memory, start: u16) -> Result<usize, ImageError> {
    let file = File::open(path)?;
    let words = read_into(memory, start, file)?;
    log::debug!("read {words} words from {} at x{start:04X}", path.display());
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let memory = Memory::new();
        assert_eq!(memory.as_slice().len(), MEMORY_SIZE);
        assert!(memory.as_slice().iter().all(|&cell| cell == 0));
        assert_eq!(memory.read(0xFFFF), 0);
    }

    #[test]
    fn read_write() {
        let mut memory = Memory::new();
        memory.write(0x3000, 0xF025);
        memory.write(0xFFFF, 1);
        assert_eq!(memory.read(0x3000), 0xF025);
        assert_eq!(memory.words(0x2FFF..=0x3001), [0, 0xF025, 0]);
        assert_ne!(memory, Memory::new());
    }

    #[test]
    fn writes_big_endian_inclusive_range() {
        let mut memory = Memory::new();
        memory.write(0x3000, 0x5260);
        memory.write(0x3001, 0x1265);
        memory.write(0x3002, 0xF025);

        let mut out = Vec::new();
        let words = write_image(&memory, 0x3000, 0x3002, &mut out).unwrap();
        assert_eq!(words, 3);
        assert_eq!(out, [0x52, 0x60, 0x12, 0x65, 0xF0, 0x25]);
    }

    #[test]
    fn empty_range() {
        let mut out = Vec::new();
        assert_eq!(write_image(&Memory::new(), 0x3001, 0x3000, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn reads_until_end_of_stream() {
        let mut memory = Memory::new();
        let bytes: &[u8] = &[0x12, 0x34, 0xAB, 0xCD];
        assert_eq!(read_into(&mut memory, 0x4000, bytes).unwrap(), 2);
        assert_eq!(memory.read(0x4000), 0x1234);
        assert_eq!(memory.read(0x4001), 0xABCD);
        assert_eq!(memory.read(0x4002), 0);
    }

    #[test]
    fn write_then_read_elsewhere() {
        let mut memory = Memory::new();
        for (i, addr) in (0x3000..=0x300F).enumerate() {
            memory.write(addr, i as u16 * 3);
        }
        let mut out = Vec::new();
        write_image(&memory, 0x3000, 0x300F, &mut out).unwrap();

        let mut copy = Memory::new();
        read_into(&mut copy, 0x5000, out.as_slice()).unwrap();
        assert_eq!(copy.words(0x5000..=0x500F), memory.words(0x3000..=0x300F));
    }

    #[test]
    fn rejects_odd_length() {
        let mut memory = Memory::new();
        let bytes: &[u8] = &[0x12, 0x34, 0xAB];
        assert!(matches!(
            read_into(&mut memory, 0x3000, bytes),
            Err(ImageError::Misaligned(3))
        ));
        assert_eq!(memory.read(0x3000), 0);
    }

    #[test]
    fn rejects_overflow() {
        let mut memory = Memory::new();
        let bytes: &[u8] = &[0, 1, 0, 2];
        assert!(matches!(
            read_into(&mut memory, 0xFFFF, bytes),
            Err(ImageError::Overflow {
                start: 0xFFFF,
                words: 2
            })
        ));
        assert_eq!(memory.read(0xFFFF), 0);
        // Exactly fits
        assert_eq!(read_into(&mut memory, 0xFFFE, bytes).unwrap(), 2);
        assert_eq!(memory.read(0xFFFF), 2);
    }
}
