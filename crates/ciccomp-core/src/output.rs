//! Tap persistence.
//!
//! The artifact format is a flat sequence of little-endian IEEE-754 doubles,
//! one per tap in time order, with no header. The spectrum-analysis tooling
//! downstream loads it directly (`numpy.fromfile(..., dtype=np.float64)`),
//! zero-pads, and plots the transform against the ideal curve.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Write a coefficient vector to `path` as raw little-endian `f64` values.
pub fn write_taps<P: AsRef<Path>>(path: P, taps: &[f64]) -> io::Result<()> {
    let mut file = File::create(path)?;
    let mut buf = Vec::with_capacity(taps.len() * 8);
    for &t in taps {
        buf.extend_from_slice(&t.to_le_bytes());
    }
    file.write_all(&buf)
}

/// Read a coefficient vector previously written by [`write_taps`]. Fails if
/// the file length is not a multiple of 8 bytes.
pub fn read_taps<P: AsRef<Path>>(path: P) -> io::Result<Vec<f64>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() % 8 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("tap file length {} is not a multiple of 8", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().expect("chunk is 8 bytes")))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("ciccomp_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let path = scratch_path("roundtrip.dat");
        let taps = vec![0.125, -0.5, 1.0e-17, 0.999999999999, -0.0];
        write_taps(&path, &taps).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.len(), taps.len() as u64 * 8);

        let back = read_taps(&path).unwrap();
        assert_eq!(back.len(), taps.len());
        for (a, b) in taps.iter().zip(&back) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let path = scratch_path("truncated.dat");
        std::fs::write(&path, [0u8; 12]).unwrap();
        assert!(read_taps(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
