//! GRIB2 message decoding.
//!
//! A ranged GET against the byte range of one index record yields exactly
//! one GRIB2 message. The `grib` crate handles section parsing and
//! bit-unpacking; this module just adapts the result into a dense frame.

use std::io::Cursor;

use grid::Array2D;

use crate::error::{GribIndexError, Result};

/// Decode a single GRIB2 message into an `(ny, nx)` frame.
pub fn decode_message(data: &[u8], nx: usize, ny: usize) -> Result<Array2D> {
    let cursor = Cursor::new(data);
    let grib2 =
        grib::from_reader(cursor).map_err(|e| GribIndexError::Decode(format!("{:?}", e)))?;

    let (_, submessage) = grib2
        .iter()
        .next()
        .ok_or_else(|| GribIndexError::Decode("message contains no submessage".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| GribIndexError::Decode(format!("{:?}", e)))?;
    let values: Vec<f32> = decoder
        .dispatch()
        .map_err(|e| GribIndexError::Decode(format!("{:?}", e)))?
        .collect();

    if values.len() != nx * ny {
        return Err(GribIndexError::ShapeMismatch {
            expected: nx * ny,
            actual: values.len(),
        });
    }

    Ok(Array2D::new(values, nx, ny))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_is_rejected() {
        let result = decode_message(b"definitely not GRIB2 data", 10, 10);
        assert!(matches!(result, Err(GribIndexError::Decode(_))));
    }
}
