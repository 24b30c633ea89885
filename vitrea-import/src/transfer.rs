//! Pixel plane linearization and transfer
//!
//! Maps (z, c, t) coordinates to a linear plane index and drives the
//! sequential read-then-write copy of raw planes between a source pixel set
//! and a newly created destination. The iteration order of the read loop and
//! the write loop must match the linearization weighting exactly, or planes
//! are silently transposed across channels and timepoints.

use crate::error::{ImportError, ImportResult};
use crate::store::{PixelReader, PixelWriter, RemoteStore};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vitrea_common::events::ImportSize;
use vitrea_common::{EntityId, Error, Result};

/// Linear plane index for (z, c, t): `size_z*size_c*t + size_z*c + z`.
///
/// z and c are bounds-checked; t is intentionally unchecked, its bounds
/// belong to the caller's loop structure.
pub fn linearize(z: i32, c: i32, t: i32, size_z: i32, size_c: i32) -> Result<usize> {
    Error::check_range("z", z as i64, size_z as i64)?;
    Error::check_range("c", c as i64, size_c as i64)?;
    Ok((size_z * size_c * t + size_z * c + z) as usize)
}

/// Outcome of a completed plane transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferStats {
    pub planes: usize,
    pub bytes: u64,
}

/// Copy every plane of `source` into `dest`, committing with a single save.
///
/// Read phase: one plane per (c, z, t) — c outer, z middle, t inner, matching
/// the linearization weighting — collected into a map keyed by linear index.
/// The read handle closes on all exit paths before the write handle opens.
/// Write phase replays the same iteration, then issues exactly one `save()`.
/// Any plane failure aborts the whole transfer with zero saves; the explicit
/// save is the only commit point.
///
/// Cancellation is cooperative, checked between plane operations; the open
/// handle is released before the cancellation propagates.
pub fn transfer_planes(
    store: &dyn RemoteStore,
    source: EntityId,
    dest: EntityId,
    cancel: &CancellationToken,
) -> ImportResult<TransferStats> {
    let mut reader = store.open_pixel_reader(source)?;
    let size = reader.dimensions();

    let read_result = read_all_planes(reader.as_mut(), size, cancel);
    let close_result = reader.close();
    let planes = read_result?;
    close_result?;

    let mut writer = store.open_pixel_writer(dest)?;
    let dest_size = writer.dimensions();
    if dest_size != size {
        // Fail fast before writing anything.
        let _ = writer.close();
        return Err(ImportError::DimensionMismatch {
            expected: size,
            actual: dest_size,
        });
    }

    let write_result = write_all_planes(writer.as_mut(), size, &planes, cancel);
    let close_result = writer.close();
    let stats = write_result?;
    close_result?;

    debug!(planes = stats.planes, bytes = stats.bytes, "Plane transfer complete");
    Ok(stats)
}

fn read_all_planes(
    reader: &mut dyn PixelReader,
    size: ImportSize,
    cancel: &CancellationToken,
) -> ImportResult<HashMap<usize, Vec<u8>>> {
    let mut planes = HashMap::new();
    for c in 0..size.size_c {
        for z in 0..size.size_z {
            for t in 0..size.size_t {
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                let plane = reader.read_plane(z, c, t)?;
                planes.insert(linearize(z, c, t, size.size_z, size.size_c)?, plane);
            }
        }
    }
    Ok(planes)
}

fn write_all_planes(
    writer: &mut dyn PixelWriter,
    size: ImportSize,
    planes: &HashMap<usize, Vec<u8>>,
    cancel: &CancellationToken,
) -> ImportResult<TransferStats> {
    let mut written = 0usize;
    let mut bytes = 0u64;
    for c in 0..size.size_c {
        for z in 0..size.size_z {
            for t in 0..size.size_t {
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                let index = linearize(z, c, t, size.size_z, size.size_c)?;
                let plane = planes
                    .get(&index)
                    .ok_or_else(|| Error::Remote(format!("plane {} missing from read phase", index)))?;
                writer.write_plane(plane, z, c, t)?;
                written += 1;
                bytes += plane.len() as u64;
            }
        }
    }
    writer.save()?;
    Ok(TransferStats {
        planes: written,
        bytes,
    })
}
