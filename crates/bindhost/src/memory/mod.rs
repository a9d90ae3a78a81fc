//! Typed windows over the module's linear memory.
//!
//! Views are borrowed from the store for the duration of one access, so a
//! view can never outlive a call that might grow memory. The [`ViewCache`]
//! tracks the byte length the last views were built for and records a new
//! generation whenever growth (or a fresh instantiation) invalidated them.

use std::ops::Range;

use tracing::trace;

use crate::error::BoundaryError;

#[derive(Debug, Default)]
pub struct ViewCache {
    byte_len: Option<usize>,
    generation: u64,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revalidates against the current memory size.
    ///
    /// Returns `true` if the views had to be rebuilt: nothing cached yet, the
    /// cached views cover zero bytes, or memory grew since.
    pub fn refresh(&mut self, current_len: usize) -> bool {
        match self.byte_len {
            Some(len) if len == current_len && len != 0 => false,
            previous => {
                self.generation += 1;
                trace!(
                    previous = ?previous,
                    current = current_len,
                    generation = self.generation,
                    "rebuilding memory views"
                );
                self.byte_len = Some(current_len);
                true
            }
        }
    }

    /// Drops the cached views; the next access rebuilds them.
    pub fn invalidate(&mut self) {
        self.byte_len = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.byte_len
    }
}

/// Bounds-checks `ptr..ptr+len` against a memory of `size` bytes.
pub fn range(ptr: u32, len: u32, size: usize) -> Result<Range<usize>, BoundaryError> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .filter(|end| *end <= size)
        .ok_or(BoundaryError::OutOfBounds { ptr, len, size })?;
    Ok(start..end)
}

pub fn slice(memory: &[u8], ptr: u32, len: u32) -> Result<&[u8], BoundaryError> {
    Ok(&memory[range(ptr, len, memory.len())?])
}

pub fn slice_mut(memory: &mut [u8], ptr: u32, len: u32) -> Result<&mut [u8], BoundaryError> {
    let range = range(ptr, len, memory.len())?;
    Ok(&mut memory[range])
}

/// Little-endian 32-bit words, indexed by word (byte address / 4).
pub struct Words32<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Words32<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Words32 { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<i32, BoundaryError> {
        let range = self.word(index, 4)?;
        let mut buf = [0; 4];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(i32::from_le_bytes(buf))
    }

    pub fn set(&mut self, index: usize, value: i32) -> Result<(), BoundaryError> {
        let range = self.word(index, 4)?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn word(&self, index: usize, width: usize) -> Result<Range<usize>, BoundaryError> {
        word_range(index, width, self.bytes.len())
    }
}

/// Little-endian 64-bit floats, indexed by element (byte address / 8).
pub struct Floats64<'a> {
    bytes: &'a mut [u8],
}

impl<'a> Floats64<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Floats64 { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<f64, BoundaryError> {
        let range = word_range(index, 8, self.bytes.len())?;
        let mut buf = [0; 8];
        buf.copy_from_slice(&self.bytes[range]);
        Ok(f64::from_le_bytes(buf))
    }

    pub fn set(&mut self, index: usize, value: f64) -> Result<(), BoundaryError> {
        let range = word_range(index, 8, self.bytes.len())?;
        self.bytes[range].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

fn word_range(index: usize, width: usize, size: usize) -> Result<Range<usize>, BoundaryError> {
    let start = index.saturating_mul(width);
    let end = start.saturating_add(width);
    if end > size {
        return Err(BoundaryError::OutOfBounds {
            ptr: start.min(u32::MAX as usize) as u32,
            len: width as u32,
            size,
        });
    }
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_rebuilds_only_on_size_change() {
        let mut cache = ViewCache::new();
        assert!(cache.refresh(65536));
        assert!(!cache.refresh(65536));
        assert_eq!(cache.generation(), 1);

        assert!(cache.refresh(131072));
        assert_eq!(cache.generation(), 2);

        cache.invalidate();
        assert!(cache.refresh(131072));
        assert_eq!(cache.generation(), 3);
    }

    #[test]
    fn zero_length_views_are_always_rebuilt() {
        let mut cache = ViewCache::new();
        assert!(cache.refresh(0));
        assert!(cache.refresh(0));
    }

    #[test]
    fn range_rejects_overflow_and_out_of_bounds() {
        assert_eq!(range(4, 4, 8).unwrap(), 4..8);
        assert!(range(5, 4, 8).is_err());
        assert!(range(u32::MAX, 2, 1 << 20).is_err());
        assert!(range(8, 0, 8).is_ok());
    }

    #[test]
    fn typed_views_are_little_endian() {
        let mut mem = vec![0u8; 16];
        Words32::new(&mut mem).set(1, 0x0102_0304).unwrap();
        assert_eq!(&mem[4..8], &[4, 3, 2, 1]);

        let mut floats = Floats64::new(&mut mem);
        floats.set(1, 2.5).unwrap();
        assert_eq!(floats.get(1).unwrap(), 2.5);
        assert!(floats.get(2).is_err());
    }
}
