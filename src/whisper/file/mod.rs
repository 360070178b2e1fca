//! Stateless file operations: `create`, `info`, `fetch`, `update`,
//! `update_many`. Each opens the file fresh, does bounded I/O, and closes
//! it — there is no long-lived handle in the public API (spec.md §2, §5).

pub mod archive;

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info, trace, warn};

use crate::config;
use crate::error::{Result, WhisperError};
use crate::whisper::aggregation::{aggregate, AggregationType};
use crate::whisper::archive_list::{validate_archive_list, ArchiveSpec};
use crate::whisper::cache;
use crate::whisper::header::{read_header, write_header, ArchiveInfo, Header};
use crate::whisper::point::Point;

use self::archive::{read_at, read_base_point, read_ring, write_point};

/// The aligned window a fetch covers and its resolution. `from_interval`
/// and `until_interval` mark bucket *ends*, not starts — see spec.md
/// §4.6 step 5 and §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    pub from_interval: u64,
    pub until_interval: u64,
    pub step: u64,
}

/// The result of a `fetch`. `values` is sparse (only occupied slots) once
/// the archive has been written at least once; it is a dense run of
/// placeholder empty points when the archive has never been written at
/// all (spec.md §4.6 step 6).
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveFetch {
    pub time_info: TimeInfo,
    pub values: Vec<Point>,
}

fn current_time() -> u64 {
    time::OffsetDateTime::now_utc().unix_timestamp() as u64
}

fn read_header_for(path: &Path, file: &mut File) -> Result<Header> {
    if config::cache_headers() {
        if let Some(cached) = cache::get(path) {
            trace!("header cache hit for {}", path.display());
            return Ok(cached);
        }
    }
    let header = read_header(path, file)?;
    if config::cache_headers() {
        cache::insert(path, header.clone());
    }
    Ok(header)
}

/// Lays out a new file: header, archive index, and a zero-filled data
/// region. Fails if `path` already exists (spec.md §4.2 step 1).
pub fn create(
    path: &Path,
    archives: Vec<ArchiveSpec>,
    x_files_factor: f64,
    aggregation_type: AggregationType,
    sparse: bool,
) -> Result<()> {
    let mut archives = archives;
    validate_archive_list(&mut archives)?;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                WhisperError::invalid_configuration(format!("{} already exists", path.display()))
            } else {
                WhisperError::Io(e)
            }
        })?;

    let header = Header::new(&archives, x_files_factor, aggregation_type);
    write_header(&mut file, &header)?;

    let total_data_bytes = header.total_archive_bytes();
    if sparse {
        if total_data_bytes > 0 {
            file.seek(SeekFrom::Start(header.archives[0].offset + total_data_bytes - 1))?;
            file.write_all(&[0u8])?;
        }
    } else {
        const ZERO_BUF_SIZE: usize = 16 * 1024;
        let zeros = [0u8; ZERO_BUF_SIZE];
        let mut remaining = total_data_bytes;
        while remaining > 0 {
            let chunk = std::cmp::min(remaining, ZERO_BUF_SIZE as u64) as usize;
            file.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }
    }

    if config::auto_flush() {
        file.sync_all()?;
    }

    info!(
        "created whisper file {} with {} archives, max retention {}s",
        path.display(),
        header.archive_count(),
        header.max_retention
    );
    Ok(())
}

/// Reads and returns the header (metadata + archive index) of an
/// existing file.
pub fn info(path: &Path) -> Result<Header> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    read_header_for(path, &mut file)
}

/// Assembles a dense time window from `from_time` to `until_time` (or
/// `now`), selecting the finest archive that covers the whole window
/// (spec.md §4.6).
pub fn fetch(path: &Path, from_time: u64, until_time: Option<u64>, now: Option<u64>) -> Result<Option<ArchiveFetch>> {
    let now = now.unwrap_or_else(current_time);
    let until_time = until_time.unwrap_or(now);

    if from_time > until_time {
        return Err(WhisperError::InvalidTimeInterval {
            message: format!("fromTime {} is after untilTime {}", from_time, until_time),
        });
    }

    let mut file = OpenOptions::new().read(true).open(path)?;
    let header = read_header_for(path, &mut file)?;

    let oldest_time = now.saturating_sub(header.max_retention);

    if from_time > now || until_time < oldest_time {
        debug!("fetch {}: window entirely outside retention, returning None", path.display());
        return Ok(None);
    }

    let from_time = from_time.max(oldest_time);
    let until_time = until_time.min(now);

    let diff = now - from_time;
    let archive = match header.archives.iter().find(|a| a.retention() >= diff) {
        Some(a) => *a,
        None => return Ok(None),
    };

    let step = archive.seconds_per_point;
    let from_interval = from_time - (from_time % step) + step;
    let until_interval = until_time - (until_time % step) + step;
    let time_info = TimeInfo { from_interval, until_interval, step };
    let count = ((until_interval - from_interval) / step) as usize;

    let base = read_base_point(&mut file, &archive)?;
    if base.is_empty() {
        trace!("fetch {}: archive at {}s/point has never been written", path.display(), step);
        return Ok(Some(ArchiveFetch { time_info, values: Vec::new() }));
    }

    let points = read_ring(&mut file, &archive, base.timestamp, from_interval, count)?;
    let values: Vec<Point> = points.into_iter().filter(|p| !p.is_empty()).collect();

    Ok(Some(ArchiveFetch { time_info, values }))
}

/// Writes a single point into the finest covering archive, then cascades
/// the aggregate into every coarser archive that still accepts it
/// (spec.md §4.5).
pub fn update(path: &Path, value: f64, timestamp: Option<u64>, now: Option<u64>) -> Result<()> {
    let now = now.unwrap_or_else(current_time);
    let timestamp = timestamp.unwrap_or(now);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let header = read_header_for(path, &mut file)?;

    let diff = now as i64 - timestamp as i64;
    if diff < 0 || diff as u64 >= header.max_retention {
        return Err(WhisperError::TimestampNotCovered { timestamp, now, max_retention: header.max_retention });
    }
    let diff = diff as u64;

    let higher_index = header
        .archives
        .iter()
        .position(|a| a.retention() >= diff)
        .expect("maxRetention invariant guarantees some archive covers diff");

    let higher = header.archives[higher_index];
    let my_interval = timestamp - (timestamp % higher.seconds_per_point);

    write_point(&mut file, &higher, &Point::new(my_interval, value))?;
    trace!("update {}: wrote point at interval {} into {}s/point archive", path.display(), my_interval, higher.seconds_per_point);

    let mut current_higher = higher;
    for lower_index in (higher_index + 1)..header.archives.len() {
        let lower = header.archives[lower_index];
        let propagated = propagate(&mut file, &current_higher, &lower, my_interval, header.aggregation_type, header.x_files_factor)?;
        if !propagated {
            break;
        }
        current_higher = lower;
    }

    if config::auto_flush() {
        file.sync_all()?;
    }
    Ok(())
}

/// Downsamples `higher`'s points covering `timestamp`'s bucket in `lower`
/// into a single aggregate, writing it if enough of `higher`'s points are
/// known (spec.md §4.5 "Propagate"). Returns whether a write happened.
fn propagate(
    file: &mut File,
    higher: &ArchiveInfo,
    lower: &ArchiveInfo,
    timestamp: u64,
    aggregation_type: AggregationType,
    x_files_factor: f64,
) -> Result<bool> {
    let lower_interval_start = timestamp - (timestamp % lower.seconds_per_point);
    let higher_points_count = (lower.seconds_per_point / higher.seconds_per_point) as usize;

    let higher_base = read_base_point(file, higher)?;
    let candidates = if higher_base.is_empty() {
        read_at(file, higher, higher.offset, higher_points_count)?
    } else {
        read_ring(file, higher, higher_base.timestamp, lower_interval_start, higher_points_count)?
    };

    let known: Vec<f64> = candidates.iter().filter(|p| !p.is_empty()).map(|p| p.value).collect();
    if known.is_empty() {
        return Ok(false);
    }

    let known_fraction = known.len() as f64 / higher_points_count as f64;
    if known_fraction < x_files_factor {
        return Ok(false);
    }

    let value = aggregate(aggregation_type, &known);
    write_point(file, lower, &Point::new(lower_interval_start, value))?;
    Ok(true)
}

/// Writes many points in one pass: groups them by the finest archive
/// each covers, writes every point, then propagates once per distinct
/// (archive, aligned interval) pair actually touched (SPEC_FULL.md §4.10
/// — this is the batch path spec.md §9 names but leaves unimplemented).
pub fn update_many(path: &Path, points: &[(u64, f64)], now: Option<u64>) -> Result<()> {
    if points.is_empty() {
        return Ok(());
    }
    let now = now.unwrap_or_else(current_time);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let header = read_header_for(path, &mut file)?;

    let mut by_archive: Vec<Vec<(u64, f64)>> = vec![Vec::new(); header.archives.len()];
    for &(timestamp, value) in points {
        let diff = now as i64 - timestamp as i64;
        if diff < 0 || diff as u64 >= header.max_retention {
            warn!("update_many {}: skipping timestamp {} outside retention window", path.display(), timestamp);
            continue;
        }
        let diff = diff as u64;
        let archive_index = header
            .archives
            .iter()
            .position(|a| a.retention() >= diff)
            .expect("maxRetention invariant guarantees coverage");
        by_archive[archive_index].push((timestamp, value));
    }

    let mut propagated_pairs: HashSet<(usize, u64)> = HashSet::new();

    for (archive_index, group) in by_archive.into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let archive = header.archives[archive_index];

        let mut touched: BTreeSet<u64> = BTreeSet::new();
        for (timestamp, value) in group {
            let my_interval = timestamp - (timestamp % archive.seconds_per_point);
            write_point(&mut file, &archive, &Point::new(my_interval, value))?;
            touched.insert(my_interval);
        }

        for my_interval in touched {
            let mut current_higher = archive;
            for lower_index in (archive_index + 1)..header.archives.len() {
                let lower = header.archives[lower_index];
                let lower_interval = my_interval - (my_interval % lower.seconds_per_point);
                let key = (lower_index, lower_interval);

                if propagated_pairs.contains(&key) {
                    current_higher = lower;
                    continue;
                }
                propagated_pairs.insert(key);

                let propagated = propagate(&mut file, &current_higher, &lower, my_interval, header.aggregation_type, header.x_files_factor)?;
                if !propagated {
                    break;
                }
                current_higher = lower;
            }
        }
    }

    if config::auto_flush() {
        file.sync_all()?;
    }
    Ok(())
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "aggregation method: {}", self.aggregation_type)?;
        writeln!(f, "max retention: {}", self.max_retention)?;
        writeln!(f, "xFilesFactor: {}", self.x_files_factor)?;
        for (index, archive) in self.archives.iter().enumerate() {
            writeln!(
                f,
                "archive {}: offset={} secondsPerPoint={} points={} retention={}",
                index, archive.offset, archive.seconds_per_point, archive.points, archive.retention()
            )?;
        }
        Ok(())
    }
}
