//! The binary partition-save codec.
//!
//! Layout (all integers and floats little-endian):
//!
//! ```text
//! magic "RPFS" | version u16 | sequence length i32 | scaling f64
//! model fingerprint (16 bytes)
//! six table bands, n² f64 each, in table order v, w, wmb, wl, wmbl, wcoax,
//!   each band traversed by increasing i, then j within [i, i+n-1]
//! w5 (n+1 f64) | w3 (n+1 f64)
//! forced-unpaired flags (n bytes) | forced-paired flags (n bytes)
//! ```
//!
//! Reading is the exact inverse and is bit-faithful for every float; no
//! recomputation happens on load.

use super::traits::SaveFile;
use std::io::{self, Read, Write};
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"RPFS";
pub const FORMAT_VERSION: u16 = 1;

/// Number of pair tables in the persisted state.
pub const TABLE_COUNT: usize = 6;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Not a partition save file (bad magic)")]
    BadMagic,
    #[error("Unsupported save format version {found} (this build reads {expected})")]
    Version { found: u16, expected: u16 },
    #[error("Corrupt save file: {0}")]
    Corrupt(&'static str),
    #[error("Sequence length mismatch: file holds {found}, caller expects {expected}")]
    LengthMismatch { found: usize, expected: usize },
    #[error("Model fingerprint mismatch: the save was produced with a different parameter set")]
    FingerprintMismatch,
}

/// The plain data image of one persisted fold.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSaveData {
    pub sequence_length: usize,
    pub scaling: f64,
    pub fingerprint: [u8; 16],
    /// The six band payloads in persistence order, `n²` cells each.
    pub tables: [Vec<f64>; 6],
    pub w5: Vec<f64>,
    pub w3: Vec<f64>,
    pub forced_unpaired: Vec<bool>,
    pub forced_paired: Vec<bool>,
}

impl PartitionSaveData {
    /// Internal shape invariants, checked before writing and after reading.
    fn validate(&self) -> Result<(), SaveError> {
        let n = self.sequence_length;
        if n == 0 {
            return Err(SaveError::Corrupt("zero sequence length"));
        }
        if self.tables.iter().any(|t| t.len() != n * n) {
            return Err(SaveError::Corrupt("table band size mismatch"));
        }
        if self.w5.len() != n + 1 || self.w3.len() != n + 1 {
            return Err(SaveError::Corrupt("accumulator length mismatch"));
        }
        if self.forced_unpaired.len() != n || self.forced_paired.len() != n {
            return Err(SaveError::Corrupt("constraint flag length mismatch"));
        }
        Ok(())
    }
}

pub struct PartitionSaveFile;

impl SaveFile for PartitionSaveFile {
    type Data = PartitionSaveData;
    type Error = SaveError;

    fn read_from(reader: &mut impl Read) -> Result<PartitionSaveData, SaveError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(SaveError::BadMagic);
        }
        let version = read_u16(reader)?;
        if version != FORMAT_VERSION {
            return Err(SaveError::Version {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let length = read_i32(reader)?;
        if length <= 0 {
            return Err(SaveError::Corrupt("non-positive sequence length"));
        }
        let n = length as usize;
        let scaling = read_f64(reader)?;
        let mut fingerprint = [0u8; 16];
        reader.read_exact(&mut fingerprint)?;

        let mut tables: [Vec<f64>; TABLE_COUNT] = Default::default();
        for table in &mut tables {
            *table = read_f64_vec(reader, n * n)?;
        }
        let w5 = read_f64_vec(reader, n + 1)?;
        let w3 = read_f64_vec(reader, n + 1)?;
        let forced_unpaired = read_bool_vec(reader, n)?;
        let forced_paired = read_bool_vec(reader, n)?;

        let data = PartitionSaveData {
            sequence_length: n,
            scaling,
            fingerprint,
            tables,
            w5,
            w3,
            forced_unpaired,
            forced_paired,
        };
        data.validate()?;
        Ok(data)
    }

    fn write_to(data: &PartitionSaveData, writer: &mut impl Write) -> Result<(), SaveError> {
        data.validate()?;
        writer.write_all(&MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&(data.sequence_length as i32).to_le_bytes())?;
        writer.write_all(&data.scaling.to_le_bytes())?;
        writer.write_all(&data.fingerprint)?;
        for table in &data.tables {
            for &cell in table {
                writer.write_all(&cell.to_le_bytes())?;
            }
        }
        for &value in data.w5.iter().chain(data.w3.iter()) {
            writer.write_all(&value.to_le_bytes())?;
        }
        for &flag in data.forced_unpaired.iter().chain(data.forced_paired.iter()) {
            writer.write_all(&[u8::from(flag)])?;
        }
        Ok(())
    }
}

fn read_u16(reader: &mut impl Read) -> Result<u16, SaveError> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_i32(reader: &mut impl Read) -> Result<i32, SaveError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> Result<f64, SaveError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_f64_vec(reader: &mut impl Read, count: usize) -> Result<Vec<f64>, SaveError> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_f64(reader)?);
    }
    Ok(out)
}

fn read_bool_vec(reader: &mut impl Read, count: usize) -> Result<Vec<bool>, SaveError> {
    let mut buf = vec![0u8; count];
    reader.read_exact(&mut buf)?;
    Ok(buf.into_iter().map(|b| b != 0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::traits::SaveFile;
    use tempfile::tempdir;

    fn sample(n: usize) -> PartitionSaveData {
        let band: Vec<f64> = (0..n * n).map(|k| k as f64 * 0.5 - 1.0).collect();
        let tables: [Vec<f64>; 6] = std::array::from_fn(|t| {
            band.iter().map(|v| v + t as f64).collect()
        });
        PartitionSaveData {
            sequence_length: n,
            scaling: 0.6218,
            fingerprint: *b"0123456789abcdef",
            tables,
            w5: (0..=n).map(|k| (k as f64).exp2()).collect(),
            w3: (0..=n).map(|k| 1.0 / (k + 1) as f64).collect(),
            forced_unpaired: (0..n).map(|k| k % 3 == 0).collect(),
            forced_paired: (0..n).map(|k| k % 4 == 1).collect(),
        }
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let data = sample(7);
        let mut buffer = Vec::new();
        PartitionSaveFile::write_to(&data, &mut buffer).unwrap();
        let loaded = PartitionSaveFile::read_from(&mut buffer.as_slice()).unwrap();
        assert_eq!(loaded, data);
        assert_eq!(loaded.scaling.to_bits(), data.scaling.to_bits());
    }

    #[test]
    fn path_round_trip_preserves_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fold.rpfs");
        let data = sample(4);
        PartitionSaveFile::write_to_path(&data, &path).unwrap();
        let loaded = PartitionSaveFile::read_from_path(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buffer = Vec::new();
        PartitionSaveFile::write_to(&sample(3), &mut buffer).unwrap();
        buffer[0] = b'X';
        let result = PartitionSaveFile::read_from(&mut buffer.as_slice());
        assert!(matches!(result, Err(SaveError::BadMagic)));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buffer = Vec::new();
        PartitionSaveFile::write_to(&sample(3), &mut buffer).unwrap();
        buffer[4] = 0xFF;
        let result = PartitionSaveFile::read_from(&mut buffer.as_slice());
        assert!(matches!(result, Err(SaveError::Version { .. })));
    }

    #[test]
    fn truncated_stream_is_an_io_error() {
        let mut buffer = Vec::new();
        PartitionSaveFile::write_to(&sample(3), &mut buffer).unwrap();
        buffer.truncate(buffer.len() - 5);
        let result = PartitionSaveFile::read_from(&mut buffer.as_slice());
        assert!(matches!(result, Err(SaveError::Io(_))));
    }

    #[test]
    fn write_rejects_malformed_state() {
        let mut data = sample(3);
        data.w5.pop();
        let mut buffer = Vec::new();
        let result = PartitionSaveFile::write_to(&data, &mut buffer);
        assert!(matches!(
            result,
            Err(SaveError::Corrupt("accumulator length mismatch"))
        ));
        assert!(buffer.is_empty());
    }
}
