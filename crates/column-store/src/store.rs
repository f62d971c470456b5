//! Time-oriented chunked om store.
//!
//! For each variable the store is a 2-axis array `(row, time)` where a row
//! is one location for deterministic products and one
//! `(location, member)` pair for ensembles (member minor, so a whole
//! member fan shares a chunk). The time axis is absolute: slot
//! `time_index = unix_seconds / dt_seconds`, split into files of
//! `n_time_per_chunk` slots named `<om_file_name>_<file_index>.om`.
//!
//! Updates splice a contiguous time range into the affected files.
//! Existing values survive unless overwritten by a non-NaN cell, so a
//! later run extends or overwrites earlier runs slot by slot.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec;
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"OMF1";

/// Chunking parameters of one variable's store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    /// Base name of the om files.
    pub om_file_name: String,
    /// Quantisation scale factor.
    pub scalefactor: f32,
    /// Total rows: grid points times ensemble members.
    pub n_rows: usize,
    /// Rows per compressed chunk; equals the member count for ensembles.
    pub n_rows_per_chunk: usize,
    /// Time slots per om file.
    pub n_time_per_chunk: usize,
}

impl StoreLayout {
    /// Number of row chunks.
    pub fn n_chunks(&self) -> usize {
        self.n_rows.div_ceil(self.n_rows_per_chunk)
    }

    /// Rows covered by chunk `chunk`.
    pub fn chunk_rows(&self, chunk: usize) -> Range<usize> {
        let start = chunk * self.n_rows_per_chunk;
        start..(start + self.n_rows_per_chunk).min(self.n_rows)
    }

    fn validate(&self) -> Result<()> {
        if self.n_rows == 0 || self.n_rows_per_chunk == 0 || self.n_time_per_chunk == 0 {
            return Err(StoreError::InvalidLayout(format!(
                "degenerate layout for {}",
                self.om_file_name
            )));
        }
        Ok(())
    }
}

/// Produces time-oriented data for one row chunk: called with a row range
/// and an absolute time-index range, returns `rows × times` values
/// (row-major, time minor). NaN cells leave the stored value untouched.
pub type ChunkProducer<'a> = dyn FnMut(Range<usize>, Range<i64>) -> Result<Vec<f32>> + 'a;

/// The on-disk column store rooted at one directory per domain.
#[derive(Debug, Clone)]
pub struct OmStore {
    root: PathBuf,
}

impl OmStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of one time-chunk file.
    pub fn om_file_path(&self, layout: &StoreLayout, file_index: i64) -> PathBuf {
        self.root
            .join(format!("{}_{}.om", layout.om_file_name, file_index))
    }

    /// Splice a contiguous time range into the store.
    ///
    /// The first `skip_first` slots of `time_indices` are left untouched
    /// (hour-0 slots of variables that skip hour 0). The producer is
    /// invoked once per (row chunk, affected file) with the intersected
    /// time range. Files are rewritten via a temp file and rename.
    pub fn update_from_time_oriented_streaming(
        &self,
        layout: &StoreLayout,
        time_indices: Range<i64>,
        skip_first: usize,
        producer: &mut ChunkProducer<'_>,
    ) -> Result<()> {
        layout.validate()?;
        let start = time_indices.start + skip_first as i64;
        if start >= time_indices.end {
            return Ok(());
        }

        std::fs::create_dir_all(&self.root)?;

        let ntpc = layout.n_time_per_chunk as i64;
        let first_file = start.div_euclid(ntpc);
        let last_file = (time_indices.end - 1).div_euclid(ntpc);

        for file_index in first_file..=last_file {
            let window = file_index * ntpc..(file_index + 1) * ntpc;
            let overlap = window.start.max(start)..window.end.min(time_indices.end);
            self.splice_file(layout, file_index, window, overlap, producer)?;
        }

        Ok(())
    }

    /// Rewrite one om file with `overlap` spliced in.
    fn splice_file(
        &self,
        layout: &StoreLayout,
        file_index: i64,
        window: Range<i64>,
        overlap: Range<i64>,
        producer: &mut ChunkProducer<'_>,
    ) -> Result<()> {
        let path = self.om_file_path(layout, file_index);
        let mut existing = OmFileReader::open_if_present(&path, layout)?;

        let ntpc = layout.n_time_per_chunk;
        let overlap_len = (overlap.end - overlap.start) as usize;
        let time_offset = (overlap.start - window.start) as usize;

        let mut blocks: Vec<Vec<u8>> = Vec::with_capacity(layout.n_chunks());
        for chunk in 0..layout.n_chunks() {
            let rows = layout.chunk_rows(chunk);
            let mut block = match &mut existing {
                Some(reader) => reader.read_block(chunk)?,
                None => vec![f32::NAN; rows.len() * ntpc],
            };

            let produced = producer(rows.clone(), overlap.clone())?;
            if produced.len() != rows.len() * overlap_len {
                return Err(StoreError::ShapeMismatch {
                    expected: rows.len() * overlap_len,
                    actual: produced.len(),
                });
            }

            for r in 0..rows.len() {
                for t in 0..overlap_len {
                    let value = produced[r * overlap_len + t];
                    if !value.is_nan() {
                        block[r * ntpc + time_offset + t] = value;
                    }
                }
            }

            blocks.push(codec::compress_chunk(&block, layout.scalefactor)?);
        }
        drop(existing);

        debug!(
            file = %path.display(),
            time_start = overlap.start,
            time_end = overlap.end,
            "Writing om file"
        );

        let tmp_path = path.with_extension("om.partial");
        {
            let mut file = File::create(&tmp_path)?;
            let mut header = Vec::new();
            header.extend_from_slice(MAGIC);
            header.extend_from_slice(&(layout.n_rows as u64).to_le_bytes());
            header.extend_from_slice(&(layout.n_rows_per_chunk as u64).to_le_bytes());
            header.extend_from_slice(&(layout.n_time_per_chunk as u64).to_le_bytes());
            header.extend_from_slice(&layout.scalefactor.to_le_bytes());
            header.extend_from_slice(&(blocks.len() as u64).to_le_bytes());
            for block in &blocks {
                header.extend_from_slice(&(block.len() as u64).to_le_bytes());
            }
            file.write_all(&header)?;
            for block in &blocks {
                file.write_all(block)?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &path)?;

        Ok(())
    }

    /// Time series for one row over an absolute time-index range. Slots
    /// not on disk come back as NaN.
    pub fn read_location(
        &self,
        layout: &StoreLayout,
        row: usize,
        time_indices: Range<i64>,
    ) -> Result<Vec<f32>> {
        layout.validate()?;
        if row >= layout.n_rows {
            return Err(StoreError::InvalidLayout(format!(
                "row {} out of range for {}",
                row, layout.om_file_name
            )));
        }

        let ntpc = layout.n_time_per_chunk as i64;
        let chunk = row / layout.n_rows_per_chunk;
        let row_local = row % layout.n_rows_per_chunk;

        let mut out = Vec::with_capacity((time_indices.end - time_indices.start) as usize);
        let first_file = time_indices.start.div_euclid(ntpc);
        let last_file = (time_indices.end - 1).div_euclid(ntpc);

        for file_index in first_file..=last_file {
            let window = file_index * ntpc..(file_index + 1) * ntpc;
            let overlap =
                window.start.max(time_indices.start)..window.end.min(time_indices.end);
            let path = self.om_file_path(layout, file_index);

            match OmFileReader::open_if_present(&path, layout)? {
                Some(mut reader) => {
                    let block = reader.read_block(chunk)?;
                    let base = row_local * layout.n_time_per_chunk;
                    for t in overlap {
                        out.push(block[base + (t - window.start) as usize]);
                    }
                }
                None => out.extend(std::iter::repeat(f32::NAN).take(overlap.count())),
            }
        }

        Ok(out)
    }
}

/// Reader over one om file's compressed blocks.
struct OmFileReader {
    file: File,
    path: PathBuf,
    n_rows: usize,
    n_rows_per_chunk: usize,
    n_time_per_chunk: usize,
    scalefactor: f32,
    blocks: Vec<(u64, u64)>,
}

impl OmFileReader {
    /// Open `path` if it exists and check it matches `layout`.
    fn open_if_present(path: &Path, layout: &StoreLayout) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let corrupt = |reason: String| StoreError::CorruptFile {
            path: path.display().to_string(),
            reason,
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }

        let n_rows = read_u64(&mut file)? as usize;
        let n_rows_per_chunk = read_u64(&mut file)? as usize;
        let n_time_per_chunk = read_u64(&mut file)? as usize;
        let scalefactor = read_f32(&mut file)?;
        let n_blocks = read_u64(&mut file)? as usize;

        if n_rows != layout.n_rows
            || n_rows_per_chunk != layout.n_rows_per_chunk
            || n_time_per_chunk != layout.n_time_per_chunk
        {
            return Err(corrupt(format!(
                "layout mismatch: file has rows={} rows/chunk={} time/chunk={}",
                n_rows, n_rows_per_chunk, n_time_per_chunk
            )));
        }
        if n_blocks != layout.n_chunks() {
            return Err(corrupt("inconsistent block count".to_string()));
        }

        let mut blocks = Vec::with_capacity(n_blocks);
        let mut offset = (4 + 8 + 8 + 8 + 4 + 8 + 8 * n_blocks) as u64;
        for _ in 0..n_blocks {
            let len = read_u64(&mut file)?;
            blocks.push((offset, len));
            offset += len;
        }

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
            n_rows,
            n_rows_per_chunk,
            n_time_per_chunk,
            scalefactor,
            blocks,
        }))
    }

    /// Decompress one row-chunk block: `rows_in_chunk × n_time_per_chunk`
    /// values.
    fn read_block(&mut self, chunk: usize) -> Result<Vec<f32>> {
        let (offset, len) = *self.blocks.get(chunk).ok_or_else(|| StoreError::CorruptFile {
            path: self.path.display().to_string(),
            reason: format!("chunk {} out of range", chunk),
        })?;

        let rows = self
            .n_rows_per_chunk
            .min(self.n_rows - chunk * self.n_rows_per_chunk);

        let mut data = vec![0u8; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut data)?;
        codec::decompress_chunk(&data, self.scalefactor, rows * self.n_time_per_chunk)
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

    fn test_layout() -> StoreLayout {
        StoreLayout {
            om_file_name: "temperature_2m".to_string(),
            scalefactor: 20.0,
            n_rows: 24,
            n_rows_per_chunk: 8,
            n_time_per_chunk: 16,
        }
    }

    /// Producer yielding `row + time_index / 10` everywhere.
    fn fill_producer(rows: Range<usize>, times: Range<i64>) -> Result<Vec<f32>> {
        let mut out = Vec::new();
        for r in rows {
            for t in times.clone() {
                out.push(r as f32 + t as f32 / 10.0);
            }
        }
        Ok(out)
    }

    #[test]
    fn test_update_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        store
            .update_from_time_oriented_streaming(&layout, 4..12, 0, &mut fill_producer)
            .unwrap();

        let series = store.read_location(&layout, 5, 4..12).unwrap();
        assert_eq!(series.len(), 8);
        for (i, v) in series.iter().enumerate() {
            let expected = 5.0 + (4 + i) as f32 / 10.0;
            assert!((v - expected).abs() <= 0.5 / 20.0, "slot {}: {}", i, v);
        }

        // Slots outside the written range are NaN.
        let before = store.read_location(&layout, 5, 0..4).unwrap();
        assert!(before.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_update_crosses_file_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        // 16 slots per file; range 12..20 touches files 0 and 1.
        store
            .update_from_time_oriented_streaming(&layout, 12..20, 0, &mut fill_producer)
            .unwrap();

        assert!(store.om_file_path(&layout, 0).exists());
        assert!(store.om_file_path(&layout, 1).exists());

        let series = store.read_location(&layout, 3, 12..20).unwrap();
        assert_eq!(series.len(), 8);
        assert!(series.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_nan_does_not_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        store
            .update_from_time_oriented_streaming(&layout, 0..8, 0, &mut fill_producer)
            .unwrap();
        store
            .update_from_time_oriented_streaming(&layout, 0..8, 0, &mut |rows, times| {
                Ok(vec![f32::NAN; rows.len() * (times.end - times.start) as usize])
            })
            .unwrap();

        let series = store.read_location(&layout, 2, 0..8).unwrap();
        assert!(series.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_skip_first_leaves_slot_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        store
            .update_from_time_oriented_streaming(&layout, 0..8, 1, &mut fill_producer)
            .unwrap();

        let series = store.read_location(&layout, 0, 0..8).unwrap();
        assert!(series[0].is_nan());
        assert!(!series[1].is_nan());
    }

    #[test]
    fn test_repeat_update_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        store
            .update_from_time_oriented_streaming(&layout, 0..16, 0, &mut fill_producer)
            .unwrap();
        let first = std::fs::read(store.om_file_path(&layout, 0)).unwrap();

        store
            .update_from_time_oriented_streaming(&layout, 0..16, 0, &mut fill_producer)
            .unwrap();
        let second = std::fs::read(store.om_file_path(&layout, 0)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_layout_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path());
        let layout = test_layout();

        store
            .update_from_time_oriented_streaming(&layout, 0..4, 0, &mut fill_producer)
            .unwrap();

        let mut other = layout.clone();
        other.n_rows_per_chunk = 4;
        assert!(matches!(
            store.read_location(&other, 0, 0..4),
            Err(StoreError::CorruptFile { .. })
        ));
    }
}
