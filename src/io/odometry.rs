//! Timestamped odometry poses from CSV.
//!
//! One pose per line: `timestamp,x,y,z,qw,qx,qy,qz`, timestamp in seconds,
//! quaternion w-first. Lines starting with `#` are comments.

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use nalgebra::Vector3;

use crate::geometry::SE3;

#[derive(Debug, Clone)]
pub struct OdometryEntry {
    pub timestamp: f64,
    /// Absolute robot-to-world pose reported by odometry.
    pub pose: SE3,
}

pub fn load_odometry(csv_path: &Path) -> Result<Vec<OdometryEntry>> {
    let file = std::fs::File::open(csv_path).with_context(|| format!("Failed to open {}", csv_path.display()))?;
    read_odometry(file).with_context(|| format!("Failed to parse {}", csv_path.display()))
}

pub fn read_odometry<R: Read>(reader: R) -> Result<Vec<OdometryEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries: Vec<OdometryEntry> = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() < 8 {
            bail!("Record {} has {} fields, expected 8", line + 1, rec.len());
        }
        let timestamp: f64 = rec[0].parse()?;
        let position = Vector3::new(rec[1].parse()?, rec[2].parse()?, rec[3].parse()?);
        let qw: f64 = rec[4].parse()?;
        let qx: f64 = rec[5].parse()?;
        let qy: f64 = rec[6].parse()?;
        let qz: f64 = rec[7].parse()?;

        if let Some(last) = entries.last() {
            if timestamp < last.timestamp {
                bail!("Record {} goes back in time ({} < {})", line + 1, timestamp, last.timestamp);
            }
        }

        entries.push(OdometryEntry {
            timestamp,
            pose: SE3::from_quaternion(qw, qx, qy, qz, position),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_read_odometry() {
        let data = "# timestamp,x,y,z,qw,qx,qy,qz\n\
                    0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0\n\
                    0.1, 0.5, 0.0, 0.0, 0.7071067811865476, 0.0, 0.0, 0.7071067811865476\n";
        let entries = read_odometry(data.as_bytes()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_relative_eq!(entries[1].timestamp, 0.1);
        assert_relative_eq!(entries[1].pose.translation, Vector3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(
            entries[1].pose.rotation_angle(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_rejects_short_record() {
        let data = "0.0,1.0,2.0\n";
        assert!(read_odometry(data.as_bytes()).is_err());
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let data = "0.2,0,0,0,1,0,0,0\n0.1,0,0,0,1,0,0,0\n";
        assert!(read_odometry(data.as_bytes()).is_err());
    }
}
