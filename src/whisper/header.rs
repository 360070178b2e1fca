use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, WhisperError};
use crate::whisper::aggregation::AggregationType;
use crate::whisper::archive_list::ArchiveSpec;
use crate::whisper::point::POINT_SIZE;

pub const METADATA_SIZE: usize = 32;
pub const ARCHIVE_INFO_SIZE: usize = 24;

/// One archive's position and shape, as recorded in the on-disk index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub offset: u64,
    pub seconds_per_point: u64,
    pub points: u64,
}

impl ArchiveInfo {
    pub fn retention(&self) -> u64 {
        self.seconds_per_point * self.points
    }

    pub fn size(&self) -> u64 {
        self.points * POINT_SIZE as u64
    }
}

/// The fixed metadata block plus the parsed archive index. Immutable for
/// the lifetime of the file (§3 Lifecycle) — created once, never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub aggregation_type: AggregationType,
    pub max_retention: u64,
    pub x_files_factor: f64,
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Lays out a fresh header for a validated, already-sorted archive
    /// list, computing offsets per spec.md §4.2 step 4.
    pub fn new(archives: &[ArchiveSpec], x_files_factor: f64, aggregation_type: AggregationType) -> Header {
        let max_retention = archives.iter().map(ArchiveSpec::retention).max().unwrap_or(0);

        let mut offset = archives_start(archives.len());
        let archive_infos = archives
            .iter()
            .map(|spec| {
                let info = ArchiveInfo {
                    offset,
                    seconds_per_point: spec.seconds_per_point,
                    points: spec.points,
                };
                offset += info.size();
                info
            })
            .collect();

        Header {
            aggregation_type,
            max_retention,
            x_files_factor,
            archives: archive_infos,
        }
    }

    pub fn archive_count(&self) -> usize {
        self.archives.len()
    }

    /// Total on-disk size of the archive data region (excludes metadata
    /// and the archive index itself).
    pub fn total_archive_bytes(&self) -> u64 {
        self.archives.iter().map(ArchiveInfo::size).sum()
    }
}

/// `Header::archives_start` counterpart: byte offset where the archive
/// data region begins for a file with `archive_count` archives.
pub fn archives_start(archive_count: usize) -> u64 {
    METADATA_SIZE as u64 + (ARCHIVE_INFO_SIZE * archive_count) as u64
}

/// Reads metadata + archive index from the current position (callers
/// seek to 0 first) of an already-open file handle. Raises
/// `CorruptWhisperFile` naming `path` on any short read or malformed
/// field, per spec.md §4.3.
pub fn read_header<R: Read + Seek>(path: &Path, reader: &mut R) -> Result<Header> {
    reader.seek(SeekFrom::Start(0))?;

    let aggregation_value = read_u64_field(path, reader, "aggregationType")?;
    let aggregation_type = AggregationType::from_u64(aggregation_value).map_err(|_| {
        WhisperError::corrupt(
            path,
            format!("unrecognized aggregationType discriminant {}", aggregation_value),
        )
    })?;
    let max_retention = read_u64_field(path, reader, "maxRetention")?;
    let x_files_factor = read_f64_field(path, reader, "xFilesFactor")?;
    let archive_count_raw = read_u64_field(path, reader, "archiveCount")?;

    // archiveCount comes straight off disk; a corrupt file can claim an
    // absurd count. Bound it against the file's actual length before
    // trusting it as a Vec capacity or loop bound, per spec.md §4.3/§7 —
    // malformed input must surface as CorruptWhisperFile, not a panic.
    let file_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(METADATA_SIZE as u64))?;

    let archive_index_bytes = archive_count_raw.checked_mul(ARCHIVE_INFO_SIZE as u64).ok_or_else(|| {
        WhisperError::corrupt(path, format!("archiveCount {} overflows the archive index size", archive_count_raw))
    })?;
    let archives_start = (METADATA_SIZE as u64).checked_add(archive_index_bytes).ok_or_else(|| {
        WhisperError::corrupt(path, format!("archiveCount {} overflows the header layout", archive_count_raw))
    })?;
    if archives_start > file_len {
        return Err(WhisperError::corrupt(
            path,
            format!(
                "archiveCount {} implies an archive index larger than the file ({} bytes)",
                archive_count_raw, file_len
            ),
        ));
    }

    let archive_count = archive_count_raw as usize;
    let mut archives = Vec::with_capacity(archive_count);
    for index in 0..archive_count {
        let offset = read_u64_field(path, reader, &format!("archives[{}].offset", index))?;
        let seconds_per_point = read_u64_field(path, reader, &format!("archives[{}].secondsPerPoint", index))?;
        let points = read_u64_field(path, reader, &format!("archives[{}].points", index))?;
        archives.push(ArchiveInfo { offset, seconds_per_point, points });
    }

    Ok(Header { aggregation_type, max_retention, x_files_factor, archives })
}

/// Serializes metadata + archive index to the current position (callers
/// seek to 0 first). Used only by the creator.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<()> {
    writer.write_u64::<BigEndian>(header.aggregation_type.to_u64())?;
    writer.write_u64::<BigEndian>(header.max_retention)?;
    writer.write_f64::<BigEndian>(header.x_files_factor)?;
    writer.write_u64::<BigEndian>(header.archives.len() as u64)?;

    for archive in &header.archives {
        writer.write_u64::<BigEndian>(archive.offset)?;
        writer.write_u64::<BigEndian>(archive.seconds_per_point)?;
        writer.write_u64::<BigEndian>(archive.points)?;
    }

    Ok(())
}

fn read_u64_field<R: Read>(path: &Path, reader: &mut R, field: &str) -> Result<u64> {
    reader.read_u64::<BigEndian>().map_err(|e| {
        WhisperError::CorruptWhisperFile {
            path: path.to_path_buf(),
            message: format!("short read or malformed field {}", field),
            source: Some(Box::new(e)),
        }
    })
}

fn read_f64_field<R: Read>(path: &Path, reader: &mut R, field: &str) -> Result<f64> {
    reader.read_f64::<BigEndian>().map_err(|e| {
        WhisperError::CorruptWhisperFile {
            path: path.to_path_buf(),
            message: format!("short read or malformed field {}", field),
            source: Some(Box::new(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Header {
        let archives = vec![ArchiveSpec::new(1, 60), ArchiveSpec::new(60, 60)];
        Header::new(&archives, 0.5, AggregationType::Average)
    }

    #[test]
    fn layout_matches_spec_example() {
        // spec.md §8 scenario 4: two archives (1,60),(60,60) -> offsets 80, 1040
        let header = sample_header();
        assert_eq!(header.max_retention, 3600);
        assert_eq!(header.archives[0].offset, 80);
        assert_eq!(header.archives[1].offset, 80 + 960);
    }

    #[test]
    fn round_trips_through_bytes() {
        let header = sample_header();
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_header(Path::new("<memory>"), &mut cursor).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_truncated_header() {
        let buf = vec![0u8; METADATA_SIZE - 1];
        let mut cursor = Cursor::new(buf);
        assert!(read_header(Path::new("<memory>"), &mut cursor).is_err());
    }

    #[test]
    fn rejects_bogus_archive_count_without_panicking() {
        // A well-formed metadata block (valid aggregationType) claiming an
        // archiveCount that is obviously larger than the rest of the file.
        let mut buf = Vec::new();
        buf.write_u64::<BigEndian>(AggregationType::Average.to_u64()).unwrap();
        buf.write_u64::<BigEndian>(3600).unwrap();
        buf.write_f64::<BigEndian>(0.5).unwrap();
        buf.write_u64::<BigEndian>(u64::MAX / 2).unwrap();

        let mut cursor = Cursor::new(buf);
        let err = read_header(Path::new("<memory>"), &mut cursor).unwrap_err();
        assert!(matches!(err, WhisperError::CorruptWhisperFile { .. }));
    }

    #[test]
    fn archives_start_accounts_for_index_size() {
        assert_eq!(archives_start(0), METADATA_SIZE as u64);
        assert_eq!(archives_start(2), METADATA_SIZE as u64 + 2 * ARCHIVE_INFO_SIZE as u64);
    }
}
