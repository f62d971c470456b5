//! Per-hour space files (`.fpg`).
//!
//! A space file stages one decoded, normalised frame for one
//! (variable, forecast hour, member) until the transposer folds it into
//! the time-oriented store. Shape is `(1, nx·ny)` chunked
//! `(1, n_locations_per_chunk)` so the transposer can pull one location
//! chunk at a time.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"FPG1";

/// File name of a space frame: `<name>_<hour>.fpg`, with a member suffix
/// for ensembles (`<name>_<hour>_<member>.fpg`).
pub fn space_file_name(om_file_name: &str, forecast_step: u32, member: Option<u32>) -> String {
    match member {
        Some(m) => format!("{}_{}_{}.fpg", om_file_name, forecast_step, m),
        None => format!("{}_{}.fpg", om_file_name, forecast_step),
    }
}

/// Quantise, compress and write one frame, overwriting any existing file.
///
/// Returns an open read handle on the freshly written file.
pub fn write_space_frame(
    path: &Path,
    frame: &[f32],
    scalefactor: f32,
    n_locations_per_chunk: usize,
) -> Result<FpgReader> {
    if n_locations_per_chunk == 0 {
        return Err(StoreError::InvalidLayout(
            "n_locations_per_chunk must be > 0".to_string(),
        ));
    }

    let blocks: Vec<Vec<u8>> = frame
        .chunks(n_locations_per_chunk)
        .map(|chunk| codec::compress_chunk(chunk, scalefactor))
        .collect::<Result<_>>()?;

    let mut header = Vec::new();
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&(frame.len() as u64).to_le_bytes());
    header.extend_from_slice(&(n_locations_per_chunk as u64).to_le_bytes());
    header.extend_from_slice(&scalefactor.to_le_bytes());
    header.extend_from_slice(&(blocks.len() as u64).to_le_bytes());
    for block in &blocks {
        header.extend_from_slice(&(block.len() as u64).to_le_bytes());
    }

    // Write to a sibling temp file and rename, so readers never observe a
    // partially written frame.
    let tmp_path = path.with_extension("fpg.partial");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&header)?;
        for block in &blocks {
            file.write_all(block)?;
        }
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    FpgReader::open(path)
}

/// Read handle on a space file with per-location-chunk access.
#[derive(Debug)]
pub struct FpgReader {
    file: File,
    path: PathBuf,
    n_locations: usize,
    n_locations_per_chunk: usize,
    scalefactor: f32,
    /// Byte offset and length of each compressed block.
    blocks: Vec<(u64, u64)>,
    /// Last decompressed chunk, kept for sequential location reads.
    cached_chunk: Option<(usize, Vec<f32>)>,
}

impl FpgReader {
    /// Open a space file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let corrupt = |reason: &str| StoreError::CorruptFile {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }

        let n_locations = read_u64(&mut file)? as usize;
        let n_locations_per_chunk = read_u64(&mut file)? as usize;
        let scalefactor = read_f32(&mut file)?;
        let n_blocks = read_u64(&mut file)? as usize;

        if n_locations_per_chunk == 0
            || n_blocks != n_locations.div_ceil(n_locations_per_chunk)
        {
            return Err(corrupt("inconsistent chunking"));
        }

        let mut blocks = Vec::with_capacity(n_blocks);
        let mut offset = (4 + 8 + 8 + 4 + 8 + 8 * n_blocks) as u64;
        for _ in 0..n_blocks {
            let len = read_u64(&mut file)?;
            blocks.push((offset, len));
            offset += len;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            n_locations,
            n_locations_per_chunk,
            scalefactor,
            blocks,
            cached_chunk: None,
        })
    }

    /// Total number of locations in the frame.
    pub fn n_locations(&self) -> usize {
        self.n_locations
    }

    /// Number of location chunks.
    pub fn n_chunks(&self) -> usize {
        self.blocks.len()
    }

    /// Path this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decompress one location chunk. The last chunk may be shorter.
    pub fn read_location_chunk(&mut self, chunk: usize) -> Result<Vec<f32>> {
        let (offset, len) = *self.blocks.get(chunk).ok_or_else(|| StoreError::CorruptFile {
            path: self.path.display().to_string(),
            reason: format!("chunk {} out of range", chunk),
        })?;

        let n_values = self
            .n_locations_per_chunk
            .min(self.n_locations - chunk * self.n_locations_per_chunk);

        let mut data = vec![0u8; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;
        codec::decompress_chunk(&data, self.scalefactor, n_values)
    }

    /// Value at one location, decompressing at most one chunk. Sequential
    /// location reads hit the chunk cache.
    pub fn read_location(&mut self, location: usize) -> Result<f32> {
        let chunk = location / self.n_locations_per_chunk;
        if self.cached_chunk.as_ref().map(|(c, _)| *c) != Some(chunk) {
            let data = self.read_location_chunk(chunk)?;
            self.cached_chunk = Some((chunk, data));
        }
        let (_, data) = self.cached_chunk.as_ref().unwrap();
        Ok(data[location % self.n_locations_per_chunk])
    }
}

fn read_u64(file: &mut File) -> Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f32(file: &mut File) -> Result<f32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_file_name() {
        assert_eq!(space_file_name("temperature_2m", 6, None), "temperature_2m_6.fpg");
        assert_eq!(
            space_file_name("precipitation", 12, Some(3)),
            "precipitation_12_3.fpg"
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2m_0.fpg");
        let frame: Vec<f32> = (0..100).map(|i| i as f32 * 0.5).collect();

        let mut reader = write_space_frame(&path, &frame, 20.0, 8).unwrap();
        assert_eq!(reader.n_locations(), 100);
        assert_eq!(reader.n_chunks(), 13);

        let chunk0 = reader.read_location_chunk(0).unwrap();
        assert_eq!(chunk0.len(), 8);
        assert!((chunk0[3] - 1.5).abs() < 0.5 / 20.0);

        // Last chunk is short: 100 = 12 * 8 + 4.
        let last = reader.read_location_chunk(12).unwrap();
        assert_eq!(last.len(), 4);
        assert!((last[3] - 49.5).abs() < 0.5 / 20.0);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2m_0.fpg");

        write_space_frame(&path, &[1.0; 16], 10.0, 4).unwrap();
        let mut reader = write_space_frame(&path, &[2.0; 16], 10.0, 4).unwrap();
        assert_eq!(reader.read_location_chunk(0).unwrap(), vec![2.0; 4]);
    }

    #[test]
    fn test_nan_cells_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_0.fpg");
        let frame = vec![f32::NAN, 1.0, f32::NAN, 2.0];

        let mut reader = write_space_frame(&path, &frame, 2.0, 4).unwrap();
        let chunk = reader.read_location_chunk(0).unwrap();
        assert!(chunk[0].is_nan());
        assert_eq!(chunk[1], 1.0);
    }

    #[test]
    fn test_read_location_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_0.fpg");
        let frame: Vec<f32> = (0..50).map(|i| i as f32).collect();

        let mut reader = write_space_frame(&path, &frame, 2.0, 8).unwrap();
        for (i, &expected) in frame.iter().enumerate() {
            assert_eq!(reader.read_location(i).unwrap(), expected);
        }
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.fpg");
        std::fs::write(&path, b"not a space file").unwrap();
        assert!(matches!(
            FpgReader::open(&path),
            Err(StoreError::CorruptFile { .. })
        ));
    }
}
