use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, WhisperError};

/// A single (timestamp, value) sample. `timestamp == 0` denotes an
/// unwritten slot in an archive's ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: u64,
    pub value: f64,
}

pub const POINT_SIZE: usize = 16;

impl Point {
    pub fn new(timestamp: u64, value: f64) -> Point {
        Point { timestamp, value }
    }

    pub fn empty() -> Point {
        Point { timestamp: 0, value: 0.0 }
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp == 0
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_u64::<BigEndian>(self.timestamp)?;
        w.write_f64::<BigEndian>(self.value)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Point> {
        let timestamp = r.read_u64::<BigEndian>()?;
        let value = r.read_f64::<BigEndian>()?;
        Ok(Point { timestamp, value })
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Point> {
        if buf.len() != POINT_SIZE {
            return Err(WhisperError::corrupt(
                "<point>",
                format!("malformed point of size {}, expected {}", buf.len(), POINT_SIZE),
            ));
        }
        let mut cursor = Cursor::new(buf);
        Point::read_from(&mut cursor)
    }

    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        let mut buf = [0u8; POINT_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            // Infallible: writing to an in-memory fixed buffer of the right size.
            self.write_to(&mut cursor).expect("write to fixed-size buffer cannot fail");
        }
        buf
    }
}

/// Decode a byte slice known to hold `points` contiguous, densely packed
/// points into a `Vec<Point>`.
pub fn decode_points(data: &[u8]) -> Result<Vec<Point>> {
    if data.len() % POINT_SIZE != 0 {
        return Err(WhisperError::corrupt(
            "<archive>",
            format!("archive slice of {} bytes is not a multiple of point size {}", data.len(), POINT_SIZE),
        ));
    }
    data.chunks(POINT_SIZE).map(Point::from_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let p = Point::new(1_440_392_088, 100.5);
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), POINT_SIZE);
        let back = Point::from_bytes(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn empty_point_has_zero_timestamp() {
        assert!(Point::empty().is_empty());
        assert!(!Point::new(1, 0.0).is_empty());
    }

    #[test]
    fn decode_points_rejects_misaligned_slice() {
        let buf = [0u8; POINT_SIZE + 1];
        assert!(decode_points(&buf).is_err());
    }

    #[test]
    fn decode_points_splits_contiguous_bytes() {
        let a = Point::new(10, 1.0);
        let b = Point::new(20, 2.0);
        let mut buf = Vec::new();
        buf.extend_from_slice(&a.to_bytes());
        buf.extend_from_slice(&b.to_bytes());
        let points = decode_points(&buf).unwrap();
        assert_eq!(points, vec![a, b]);
    }
}
