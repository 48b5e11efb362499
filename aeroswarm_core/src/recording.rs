//! Tab-separated flight log, one row per vehicle per recorded tick.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::clock::TimePoint;
use crate::error::SimError;
use crate::geom::Kinematics;

/// Writes the recording file: a header row, then
/// `TimeStamp POS_X POS_Y POS_Z Q_W Q_X Q_Y Q_Z VehicleName ImageFile`
/// per vehicle per recorded tick. Images are written separately and
/// referenced by name; a headless run leaves the column empty.
pub struct Recorder {
    writer: BufWriter<File>,
    path: PathBuf,
    record_interval_ns: u64,
    last_record: Option<TimePoint>,
    rows_written: u64,
}

impl Recorder {
    pub fn create(folder: &Path, record_interval_sec: f64) -> Result<Self, SimError> {
        fs::create_dir_all(folder)
            .map_err(|err| SimError::config(format!("cannot create recording folder: {err}")))?;
        let path = folder.join("airlog.txt");
        let file = File::create(&path)
            .map_err(|err| SimError::config(format!("cannot create recording file: {err}")))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "TimeStamp\tPOS_X\tPOS_Y\tPOS_Z\tQ_W\tQ_X\tQ_Y\tQ_Z\tVehicleName\tImageFile"
        )
        .map_err(|err| SimError::config(format!("cannot write recording header: {err}")))?;
        Ok(Self {
            writer,
            path,
            record_interval_ns: (record_interval_sec.max(0.0) * 1e9) as u64,
            last_record: None,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Whether the interval since the last recorded tick has elapsed.
    pub fn is_due(&self, now: TimePoint) -> bool {
        match self.last_record {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.record_interval_ns,
        }
    }

    /// Records one tick. `rows` pairs each vehicle name with its kinematics
    /// and the image file captured this tick, if any.
    pub fn record_tick(
        &mut self,
        now: TimePoint,
        rows: &[(String, Kinematics, Option<String>)],
    ) -> Result<(), SimError> {
        self.last_record = Some(now);
        for (name, kinematics, image_file) in rows {
            let p = kinematics.pose.position;
            let q = kinematics.pose.orientation;
            writeln!(
                self.writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                now,
                p.x,
                p.y,
                p.z,
                q.w,
                q.i,
                q.j,
                q.k,
                name,
                image_file.as_deref().unwrap_or("")
            )
            .map_err(|err| SimError::internal(format!("recording write failed: {err}")))?;
            self.rows_written += 1;
        }
        self.writer
            .flush()
            .map_err(|err| SimError::internal(format!("recording flush failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Pose, Quaternionr, Vector3r};

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::create(dir.path(), 0.0).unwrap();

        let kinematics = Kinematics::at_pose(Pose::new(
            Vector3r::new(1.0, 2.0, -3.0),
            Quaternionr::identity(),
        ));
        recorder
            .record_tick(
                5_000_000,
                &[("drone0".to_string(), kinematics, None)],
            )
            .unwrap();

        let content = std::fs::read_to_string(recorder.path()).unwrap();
        let mut lines = content.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("TimeStamp\tPOS_X"));
        let row = lines.next().unwrap();
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields[0], "5000000");
        assert_eq!(fields[1], "1");
        assert_eq!(fields[3], "-3");
        assert_eq!(fields[4], "1");
        assert_eq!(fields[8], "drone0");
        assert_eq!(recorder.rows_written(), 1);
    }

    #[test]
    fn test_interval_gates_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::create(dir.path(), 0.05).unwrap();
        assert!(recorder.is_due(0));
        recorder.record_tick(0, &[]).unwrap();
        assert!(!recorder.is_due(10_000_000));
        assert!(recorder.is_due(50_000_000));
    }
}
