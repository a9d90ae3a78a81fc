//! String and byte transfer across the boundary.
//!
//! Module-to-host strings are decoded strictly as UTF-8. Host-to-module
//! strings are written with a single allocation sized for the all-ASCII
//! case, switching to a `realloc` with a worst-case bound only when the first
//! non-ASCII character shows up.

use crate::error::{BoundaryError, Fault};
use crate::memory::{self, Words32};
use crate::value::utf16_len;

/// Worst-case UTF-8 bytes per UTF-16 code unit.
const MAX_UTF8_PER_UNIT: u32 = 3;

/// What the codec needs from the module side.
pub trait Guest {
    fn memory(&mut self) -> Result<&mut [u8], BoundaryError>;

    fn malloc(&mut self, len: u32, align: u32) -> Result<u32, Fault>;

    fn realloc(&mut self, ptr: u32, old_len: u32, new_len: u32, align: u32) -> Result<u32, Fault>;

    /// Whether the module exports a reallocator.
    fn can_realloc(&self) -> bool;
}

/// Decodes `len` bytes at `ptr` as UTF-8.
pub fn decode_str(memory: &[u8], ptr: u32, len: u32) -> Result<&str, BoundaryError> {
    let bytes = memory::slice(memory, ptr, len)?;
    std::str::from_utf8(bytes).map_err(|_| BoundaryError::InvalidUtf8 { ptr, len })
}

/// Copies `data` into a fresh module allocation.
pub fn pass_bytes<G: Guest + ?Sized>(guest: &mut G, data: &[u8], align: u32) -> Result<(u32, u32), Fault> {
    let len = data.len() as u32;
    let ptr = guest.malloc(len, align)?;
    memory::slice_mut(guest.memory()?, ptr, len)?.copy_from_slice(data);
    Ok((ptr, len))
}

/// Encodes `text` into module memory, returning `(ptr, byte_len)`.
pub fn encode_str<G: Guest + ?Sized>(guest: &mut G, text: &str) -> Result<(u32, u32), Fault> {
    if !guest.can_realloc() {
        return pass_bytes(guest, text.as_bytes(), 1);
    }

    let units = utf16_len(text) as u32;
    let mut ptr = guest.malloc(units, 1)?;
    let ascii = {
        let dst = memory::slice_mut(guest.memory()?, ptr, units)?;
        let ascii = text.bytes().take_while(u8::is_ascii).count();
        dst[..ascii].copy_from_slice(&text.as_bytes()[..ascii]);
        ascii
    };
    if ascii == text.len() {
        return Ok((ptr, units));
    }

    let rest = &text[ascii..];
    let bound = ascii as u32 + (units - ascii as u32) * MAX_UTF8_PER_UNIT;
    ptr = guest.realloc(ptr, units, bound, 1)?;
    let written = rest.len() as u32;
    memory::slice_mut(guest.memory()?, ptr + ascii as u32, written)?.copy_from_slice(rest.as_bytes());
    Ok((ptr, ascii as u32 + written))
}

/// Writes an optional `(ptr, len)` pair to the out-parameter at `out`.
///
/// Absent values are written as a null pointer with zero length.
pub fn write_pair(words: &mut Words32<'_>, out: u32, pair: Option<(u32, u32)>) -> Result<(), BoundaryError> {
    let (ptr, len) = pair.unwrap_or((0, 0));
    let base = out as usize / 4;
    words.set(base, ptr as i32)?;
    words.set(base + 1, len as i32)
}
