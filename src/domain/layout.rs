//! On-disk layout of the recording area
//!
//! Segments live in `<videos_dir>/rec_YYYY_MM_DD/HH_MM_SS_<camera>.<ext>`,
//! snapshots in `<videos_dir>/snapshots/<camera>_<timestamp>.jpg`. Day
//! directory names are parsed strictly; anything that does not match the
//! layout is invisible to retention.

use crate::constants::{COMPACT_TIME_FORMAT, DAY_DIR_FORMAT, SEGMENT_TIME_FORMAT};
use chrono::{DateTime, Local, NaiveDate};

/// Directory name for the day the given point in time falls into
pub fn day_dir_name(at: &DateTime<Local>) -> String {
    at.format(DAY_DIR_FORMAT).to_string()
}

/// Date encoded in a day directory name, `None` for anything else
pub fn parse_day_dir(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DAY_DIR_FORMAT).ok()
}

/// File name of a segment started at the given point in time
pub fn segment_file_name(start: &DateTime<Local>, camera: &str, extension: &str) -> String {
    format!(
        "{}{}.{}",
        start.format(SEGMENT_TIME_FORMAT),
        camera,
        extension
    )
}

/// File name of a snapshot taken at the given point in time
pub fn snapshot_file_name(camera: &str, at: &DateTime<Local>) -> String {
    format!("{}_{}.jpg", camera, at.format(COMPACT_TIME_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_dirs_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 7, 13, 5, 59).unwrap();

        assert_eq!(day_dir_name(&at), "rec_2024_03_07");
        assert_eq!(parse_day_dir("rec_2024_03_07"), Some(date));
    }

    #[test]
    fn day_dir_parsing_is_strict() {
        assert_eq!(parse_day_dir("rec_2024_03_07.bak"), None);
        assert_eq!(parse_day_dir("snapshots"), None);
        assert_eq!(parse_day_dir("rec_2024-03-07"), None);
        assert_eq!(parse_day_dir(""), None);
    }

    #[test]
    fn segment_names_carry_time_camera_and_extension() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 4, 5).unwrap();
        assert_eq!(segment_file_name(&at, "porch", "mp4"), "09_04_05_porch.mp4");
    }

    #[test]
    fn snapshot_names_carry_camera_and_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 4, 5).unwrap();
        assert_eq!(
            snapshot_file_name("porch", &at),
            "porch_2024_03_07_09_04_05.jpg"
        );
    }
}
