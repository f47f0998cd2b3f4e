//! Fixed little-endian wire types for the gather/scatter protocol.
//!
//! All multi-byte integers are **little-endian** on the wire; floats travel
//! as the little-endian encoding of their IEEE-754 bit pattern. Decoders
//! validate byte lengths and return a plain message on mismatch; callers
//! wrap it with the peer rank.

use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Count of following records.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }

    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Header of a per-worker gather block: element count plus the originating
/// worker id.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireBlockHeader {
    pub count_le: u32,
    pub worker_le: u32,
}

impl WireBlockHeader {
    pub fn new(count: usize, worker: usize) -> Self {
        Self {
            count_le: (count as u32).to_le(),
            worker_le: (worker as u32).to_le(),
        }
    }

    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }

    pub fn worker(&self) -> usize {
        u32::from_le(self.worker_le) as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        cast_slice(std::slice::from_ref(self)).to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        expect_exact_len(bytes.len(), size_of::<WireBlockHeader>())?;
        let mut hdr = WireBlockHeader::zeroed();
        bytemuck::bytes_of_mut(&mut hdr).copy_from_slice(bytes);
        Ok(hdr)
    }
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

pub fn encode_count(n: usize) -> Vec<u8> {
    cast_slice(std::slice::from_ref(&WireCount::new(n))).to_vec()
}

pub fn decode_count(bytes: &[u8]) -> Result<usize, String> {
    expect_exact_len(bytes.len(), size_of::<WireCount>())?;
    let mut cnt = WireCount::zeroed();
    bytemuck::bytes_of_mut(&mut cnt).copy_from_slice(bytes);
    Ok(cnt.get())
}

pub fn encode_f64s(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for v in values {
        out.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    out
}

/// Decode exactly `expected` scalars; a length mismatch here is the
/// declared-size-vs-payload consistency violation the gather aborts on.
pub fn decode_f64s(bytes: &[u8], expected: usize) -> Result<Vec<f64>, String> {
    expect_exact_len(bytes.len(), expected * 8)?;
    let mut out = Vec::with_capacity(expected);
    for chunk in bytes.chunks_exact(8) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        out.push(f64::from_bits(u64::from_le_bytes(raw)));
    }
    Ok(out)
}

pub fn encode_u32s(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn decode_u32s(bytes: &[u8], expected: usize) -> Result<Vec<u32>, String> {
    expect_exact_len(bytes.len(), expected * 4)?;
    let mut out = Vec::with_capacity(expected);
    for chunk in bytes.chunks_exact(4) {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(chunk);
        out.push(u32::from_le_bytes(raw));
    }
    Ok(out)
}

pub fn encode_f64(value: f64) -> Vec<u8> {
    value.to_bits().to_le_bytes().to_vec()
}

pub fn decode_f64(bytes: &[u8]) -> Result<f64, String> {
    expect_exact_len(bytes.len(), 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(f64::from_bits(u64::from_le_bytes(raw)))
}

// Compile-time sanity checks.
const _: () = {
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireBlockHeader>() == 8);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = WireBlockHeader::new(42, 3);
        let decoded = WireBlockHeader::decode(&hdr.encode()).unwrap();
        assert_eq!(decoded.count(), 42);
        assert_eq!(decoded.worker(), 3);
    }

    #[test]
    fn f64_roundtrip_preserves_bits() {
        let values = [0.0, -0.0, 1.5, f64::MIN_POSITIVE, -9.99e99];
        let decoded = decode_f64s(&encode_f64s(&values), values.len()).unwrap();
        for (a, b) in values.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(decode_f64s(&[0u8; 12], 2).is_err());
        assert!(decode_u32s(&[0u8; 6], 2).is_err());
        assert!(decode_count(&[0u8; 3]).is_err());
    }

    #[test]
    fn u32_roundtrip() {
        let values = [0u32, 1, u32::MAX, 12345];
        assert_eq!(decode_u32s(&encode_u32s(&values), 4).unwrap(), values);
    }
}
