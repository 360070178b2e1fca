use regex::Regex;

use crate::error::{Result, WhisperError};
use crate::whisper::point::POINT_SIZE;

/// One entry of a requested archive list: a resolution and a retention,
/// before it has been laid out on disk (no `offset` yet — see
/// `header::ArchiveInfo` for the on-disk counterpart).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpec {
    pub seconds_per_point: u64,
    pub points: u64,
}

impl ArchiveSpec {
    pub fn new(seconds_per_point: u64, points: u64) -> ArchiveSpec {
        ArchiveSpec { seconds_per_point, points }
    }

    pub fn retention(&self) -> u64 {
        self.seconds_per_point * self.points
    }

    pub fn size_on_disk(&self) -> u64 {
        self.points * POINT_SIZE as u64
    }
}

/// Validates and sorts (ascending by `seconds_per_point`) a requested
/// archive list, per the rules in spec.md §4.1. Mutates `archives` in
/// place so callers (Creator) lay out the file in the same order.
pub fn validate_archive_list(archives: &mut Vec<ArchiveSpec>) -> Result<()> {
    if archives.is_empty() {
        return Err(WhisperError::invalid_configuration("archive list must not be empty"));
    }

    archives.sort_by_key(|a| a.seconds_per_point);

    for i in 0..archives.len().saturating_sub(1) {
        let lo = archives[i];
        let hi = archives[i + 1];

        if hi.seconds_per_point <= lo.seconds_per_point {
            return Err(WhisperError::invalid_configuration(format!(
                "a Whisper database may not be configured having two archives with the same precision (archive {} and {} both claim {} seconds per point after sorting)",
                i, i + 1, lo.seconds_per_point
            )));
        }

        if hi.seconds_per_point % lo.seconds_per_point != 0 {
            return Err(WhisperError::invalid_configuration(format!(
                "higher precision archives' precision must evenly divide lower precision archives' precision (archive {}'s precision {} is not divisible by archive {}'s precision {})",
                i + 1, hi.seconds_per_point, i, lo.seconds_per_point
            )));
        }

        if hi.retention() <= lo.retention() {
            return Err(WhisperError::invalid_configuration(format!(
                "lower precision archives must cover larger time intervals than higher precision archives (archive {} retention {} is not greater than archive {} retention {})",
                i + 1, hi.retention(), i, lo.retention()
            )));
        }

        let points_needed_to_consolidate = hi.seconds_per_point / lo.seconds_per_point;
        if lo.points < points_needed_to_consolidate {
            return Err(WhisperError::invalid_configuration(format!(
                "archive {} must have at least {} points to consolidate to archive {}'s resolution, but has only {}",
                i, points_needed_to_consolidate, i + 1, lo.points
            )));
        }
    }

    Ok(())
}

/// Parses a comma-separated list of `secondsPerPoint:points` pairs, the
/// form the CLI accepts, e.g. `"1:60,60:60,3600:24,86400:365"`.
pub fn parse_archive_list(spec: &str) -> Result<Vec<ArchiveSpec>> {
    let pair_re = Regex::new(r"^(\d+):(\d+)$").expect("static regex is valid");

    spec.split(',')
        .map(str::trim)
        .map(|part| {
            let caps = pair_re.captures(part).ok_or_else(|| {
                WhisperError::invalid_configuration(format!(
                    "archive spec {:?} is not of the form secondsPerPoint:points",
                    part
                ))
            })?;
            let seconds_per_point: u64 = caps[1].parse().expect("regex guarantees digits");
            let points: u64 = caps[2].parse().expect("regex guarantees digits");
            Ok(ArchiveSpec::new(seconds_per_point, points))
        })
        .collect()
}
