//! Quantising chunk codec.
//!
//! Values are quantised to `round(x · scalefactor)` as little-endian `i32`
//! and zstd-compressed per chunk. NaN maps to an `i32::MIN` sentinel. The
//! quantisation error is bounded by `0.5 / scalefactor`.

use crate::error::{Result, StoreError};

/// NaN sentinel in the quantised integer stream.
const NAN_SENTINEL: i32 = i32::MIN;

/// Zstd level; low levels keep ingest CPU-bound on decoding, not packing.
const ZSTD_LEVEL: i32 = 3;

/// Quantise and compress one chunk of values.
pub fn compress_chunk(values: &[f32], scalefactor: f32) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for &v in values {
        let q = if v.is_nan() {
            NAN_SENTINEL
        } else {
            // Clamp above the sentinel so extreme values stay values.
            (v * scalefactor).round().max((i32::MIN + 1) as f32) as i32
        };
        bytes.extend_from_slice(&q.to_le_bytes());
    }
    Ok(zstd::bulk::compress(&bytes, ZSTD_LEVEL)?)
}

/// Decompress and dequantise one chunk of `n_values` values.
pub fn decompress_chunk(data: &[u8], scalefactor: f32, n_values: usize) -> Result<Vec<f32>> {
    let bytes = zstd::bulk::decompress(data, n_values * 4)?;
    if bytes.len() != n_values * 4 {
        return Err(StoreError::ShapeMismatch {
            expected: n_values * 4,
            actual: bytes.len() / 4,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| {
            let q = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            if q == NAN_SENTINEL {
                f32::NAN
            } else {
                q as f32 / scalefactor
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_error_bound() {
        let scalefactor = 20.0;
        let values: Vec<f32> = (0..1000).map(|i| 250.0 + i as f32 * 0.013).collect();

        let compressed = compress_chunk(&values, scalefactor).unwrap();
        let restored = decompress_chunk(&compressed, scalefactor, values.len()).unwrap();

        for (orig, rest) in values.iter().zip(&restored) {
            assert!(
                (orig - rest).abs() <= 0.5 / scalefactor + f32::EPSILON,
                "{} vs {}",
                orig,
                rest
            );
        }
    }

    #[test]
    fn test_nan_survives() {
        let values = vec![1.0, f32::NAN, -3.5];
        let compressed = compress_chunk(&values, 10.0).unwrap();
        let restored = decompress_chunk(&compressed, 10.0, 3).unwrap();

        assert_eq!(restored[0], 1.0);
        assert!(restored[1].is_nan());
        assert_eq!(restored[2], -3.5);
    }

    #[test]
    fn test_deterministic() {
        let values: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
        let a = compress_chunk(&values, 100.0).unwrap();
        let b = compress_chunk(&values, 100.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let compressed = compress_chunk(&[1.0, 2.0], 1.0).unwrap();
        assert!(decompress_chunk(&compressed, 1.0, 3).is_err());
    }
}
