//! Circular-buffer addressing for a single archive's ring (spec.md §4.4).
//!
//! An archive has no header of its own: slot 0 anchors the ring (its
//! timestamp is the "base interval"), and every other slot's position is
//! derived from it by modular arithmetic. A `timestamp == 0` in slot 0
//! means the archive has never been written.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;
use crate::whisper::header::ArchiveInfo;
use crate::whisper::point::{Point, POINT_SIZE};

/// Euclidean modulo: always returns a non-negative residue, unlike Rust's
/// `%` which follows the sign of the dividend. Load-bearing because
/// `byte_distance` below can be negative when addressing a point earlier
/// than the archive's base interval.
pub fn modulo(a: i64, b: i64) -> i64 {
    ((a % b) + b) % b
}

/// Reads slot 0 of `archive`, which anchors all other addressing in it.
/// Returns `Point { timestamp: 0, .. }` for a never-written archive.
pub fn read_base_point(file: &mut File, archive: &ArchiveInfo) -> Result<Point> {
    file.seek(SeekFrom::Start(archive.offset))?;
    let mut buf = [0u8; POINT_SIZE];
    file.read_exact(&mut buf)?;
    Point::from_bytes(&buf)
}

/// Byte offset (absolute, within the file) of the slot that would hold
/// `timestamp`, given the archive's current base interval. Callers must
/// already have confirmed the archive is non-empty (`base_interval != 0`).
pub fn slot_byte_offset(archive: &ArchiveInfo, base_interval: u64, timestamp: u64) -> u64 {
    let time_distance = timestamp as i64 - base_interval as i64;
    let point_distance = time_distance / archive.seconds_per_point as i64;
    let byte_distance = point_distance * POINT_SIZE as i64;
    let wrapped = modulo(byte_distance, archive.size() as i64);
    archive.offset + wrapped as u64
}

/// Writes a single point into `archive`, choosing the first slot if the
/// archive is empty (spec.md §4.5 step 5) or the addressed slot otherwise.
pub fn write_point(file: &mut File, archive: &ArchiveInfo, point: &Point) -> Result<()> {
    let base = read_base_point(file, archive)?;
    let offset = if base.is_empty() {
        archive.offset
    } else {
        slot_byte_offset(archive, base.timestamp, point.timestamp)
    };
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&point.to_bytes())?;
    Ok(())
}

/// Reads a contiguous (in ring-order, possibly wrapping) run of `count`
/// points starting at the slot addressed by `from_timestamp`. The
/// returned vector's index 0 is the slot at `from_timestamp`, per spec.md
/// §4.4's "combine them into a single logical buffer" requirement.
///
/// `base_interval == 0` (empty archive) is not handled here — callers
/// check that first since the read has no meaningful base to address
/// from.
pub fn read_ring(
    file: &mut File,
    archive: &ArchiveInfo,
    base_interval: u64,
    from_timestamp: u64,
    count: usize,
) -> Result<Vec<Point>> {
    let start = slot_byte_offset(archive, base_interval, from_timestamp);
    read_at(file, archive, start, count)
}

/// Reads `count` points (wrapping the ring if necessary) starting at the
/// absolute byte offset `start_offset`, which must already lie within
/// `[archive.offset, archive.offset + archive.size())`.
pub fn read_at(file: &mut File, archive: &ArchiveInfo, start_offset: u64, count: usize) -> Result<Vec<Point>> {
    let bytes_needed = count as u64 * POINT_SIZE as u64;
    let archive_end = archive.offset + archive.size();
    let end = start_offset + bytes_needed;

    let mut raw = Vec::with_capacity(bytes_needed as usize);
    if end <= archive_end {
        raw.resize(bytes_needed as usize, 0);
        file.seek(SeekFrom::Start(start_offset))?;
        file.read_exact(&mut raw)?;
    } else {
        let first_len = (archive_end - start_offset) as usize;
        let second_len = bytes_needed as usize - first_len;

        let mut first = vec![0u8; first_len];
        file.seek(SeekFrom::Start(start_offset))?;
        file.read_exact(&mut first)?;

        let mut second = vec![0u8; second_len];
        file.seek(SeekFrom::Start(archive.offset))?;
        file.read_exact(&mut second)?;

        raw.extend_from_slice(&first);
        raw.extend_from_slice(&second);
    }

    crate::whisper::point::decode_points(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whisper::header::ArchiveInfo;
    use std::io::Write as _;

    fn build_archive_file(points: &[Point]) -> (File, ArchiveInfo) {
        let mut file = tempfile::tempfile().unwrap();
        for p in points {
            file.write_all(&p.to_bytes()).unwrap();
        }
        let archive = ArchiveInfo {
            offset: 0,
            seconds_per_point: 2,
            points: points.len() as u64,
        };
        (file, archive)
    }

    #[test]
    fn modulo_is_always_non_negative() {
        for a in -20..20i64 {
            for b in [3i64, 7, 36] {
                let r = modulo(a, b);
                assert!(r >= 0 && r < b);
                assert_eq!(((a - r) % b), 0);
            }
        }
    }

    #[test]
    fn addresses_aligned_slots_in_order() {
        let points = vec![
            Point::new(1_440_392_088, 100.0),
            Point::new(1_440_392_090, 100.0),
            Point::new(1_440_392_092, 100.0),
        ];
        let (mut file, archive) = build_archive_file(&points);
        let base = 1_440_392_088;

        assert_eq!(slot_byte_offset(&archive, base, 1_440_392_088), 0);
        assert_eq!(slot_byte_offset(&archive, base, 1_440_392_090), POINT_SIZE as u64);
        assert_eq!(slot_byte_offset(&archive, base, 1_440_392_092), 2 * POINT_SIZE as u64);

        // wrap down
        assert_eq!(slot_byte_offset(&archive, base, 1_440_392_086), 2 * POINT_SIZE as u64);
        // wrap up past the end
        assert_eq!(slot_byte_offset(&archive, base, 1_440_392_094), 0);

        let read = read_ring(&mut file, &archive, base, base, 3).unwrap();
        assert_eq!(read, points);
    }

    #[test]
    fn reads_wrap_around_the_ring() {
        let points = vec![
            Point::new(1_440_392_088, 100.0),
            Point::new(1_440_392_090, 200.0),
            Point::new(1_440_392_092, 300.0),
        ];
        let (mut file, archive) = build_archive_file(&points);
        let base = 1_440_392_088;

        // starting from the middle slot, reading 3 should wrap to slot 0
        let read = read_ring(&mut file, &archive, base, 1_440_392_090, 3).unwrap();
        assert_eq!(
            read,
            vec![Point::new(1_440_392_090, 200.0), Point::new(1_440_392_092, 300.0), Point::new(1_440_392_088, 100.0)]
        );
    }

    #[test]
    fn write_point_lands_on_addressed_slot() {
        let points = vec![
            Point::new(1_440_392_088, 100.0),
            Point::new(1_440_392_090, 100.0),
            Point::new(1_440_392_092, 100.0),
        ];
        let (mut file, archive) = build_archive_file(&points);

        write_point(&mut file, &archive, &Point::new(1_440_392_090, 8.0)).unwrap();

        let base = read_base_point(&mut file, &archive).unwrap();
        let read = read_ring(&mut file, &archive, base.timestamp, 1_440_392_090, 1).unwrap();
        assert_eq!(read[0].value, 8.0);
    }

    #[test]
    fn write_point_into_empty_archive_seeds_slot_zero() {
        let points = vec![Point::empty(), Point::empty(), Point::empty()];
        let (mut file, archive) = build_archive_file(&points);

        write_point(&mut file, &archive, &Point::new(1_440_392_090, 42.0)).unwrap();

        let base = read_base_point(&mut file, &archive).unwrap();
        assert_eq!(base, Point::new(1_440_392_090, 42.0));
    }
}
