//! On-disk sizes and their human readable form

use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::path::Path;
use walkdir::WalkDir;

const KB: f64 = 1_000.0;
const MB: f64 = 1_000_000.0;
const GB: f64 = 1_000_000_000.0;

/// Byte count plus its display form. `formatted` always matches `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeOnDisk {
    pub amount: i64,
    pub formatted: String,
}

impl SizeOnDisk {
    pub fn from_bytes(amount: i64) -> Self {
        Self {
            amount,
            formatted: format_bytes(amount),
        }
    }

    pub fn zero() -> Self {
        Self::from_bytes(0)
    }
}

impl Add for SizeOnDisk {
    type Output = SizeOnDisk;

    fn add(self, rhs: SizeOnDisk) -> SizeOnDisk {
        SizeOnDisk::from_bytes(self.amount + rhs.amount)
    }
}

impl Sum for SizeOnDisk {
    fn sum<I: Iterator<Item = SizeOnDisk>>(iter: I) -> SizeOnDisk {
        iter.fold(SizeOnDisk::zero(), Add::add)
    }
}

impl Sub for SizeOnDisk {
    type Output = SizeOnDisk;

    fn sub(self, rhs: SizeOnDisk) -> SizeOnDisk {
        SizeOnDisk::from_bytes(self.amount - rhs.amount)
    }
}

/// Format a byte count with decimal units.
///
/// A value that rounds up to 1000 of one unit is shown in the next unit, and
/// trailing zero decimals are dropped.
///
/// - 0 -> "Zero KB"
/// - 512 -> "512 bytes"
/// - 908_000 -> "908 KB"
/// - 999_950 -> "1 MB"
/// - 12_345_678 -> "12.3 MB"
/// - 1_500_000_000 -> "1.5 GB"
pub fn format_bytes(amount: i64) -> String {
    if amount == 0 {
        return "Zero KB".to_string();
    }
    if amount < 0 {
        return format!("-{}", format_bytes(amount.saturating_abs()));
    }
    if amount < KB as i64 {
        return format!("{} bytes", amount);
    }

    let bytes = amount as f64;
    for (size, unit, decimals) in [(KB, "KB", 0), (MB, "MB", 1)] {
        let value = round_to(bytes / size, decimals);
        if value < 1_000.0 {
            return with_unit(value, decimals, unit);
        }
    }
    with_unit(round_to(bytes / GB, 2), 2, "GB")
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn with_unit(value: f64, decimals: i32, unit: &str) -> String {
    let text = format!("{:.*}", decimals as usize, value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text.as_str()
    };
    format!("{} {}", text, unit)
}

/// Allocated size of everything under `path`, subfolders included
pub fn app_size_on_disk(path: &Path) -> Result<SizeOnDisk, walkdir::Error> {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter(|entry| !entry.as_ref().is_ok_and(|e| e.file_type().is_dir()))
        .map(|entry| -> Result<SizeOnDisk, walkdir::Error> {
            let metadata = entry?.metadata()?;
            Ok(SizeOnDisk::from_bytes(allocated_size(&metadata) as i64))
        })
        .sum()
}

#[cfg(unix)]
fn allocated_size(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    // st_blocks is always in 512-byte units
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_size(metadata: &std::fs::Metadata) -> u64 {
    metadata.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        let zero = SizeOnDisk::zero();
        assert_eq!(zero.amount, 0);
        assert_eq!(zero.formatted, "Zero KB");
    }

    #[test]
    fn test_difference_with_itself_is_zero() {
        let size = SizeOnDisk::from_bytes(9_000_000);
        assert_eq!(size.clone() - size, SizeOnDisk::zero());
    }

    #[test]
    fn test_delta_formatting() {
        let delta = SizeOnDisk::from_bytes(9_908_000) - SizeOnDisk::from_bytes(9_000_000);
        assert_eq!(delta.amount, 908_000);
        assert_eq!(delta.formatted, "908 KB");
    }

    #[test]
    fn test_addition() {
        let sum = SizeOnDisk::from_bytes(400) + SizeOnDisk::from_bytes(600);
        assert_eq!(sum.amount, 1000);
        assert_eq!(sum.formatted, "1 KB");
        assert_eq!(SizeOnDisk::from_bytes(5) + SizeOnDisk::zero(), SizeOnDisk::from_bytes(5));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1_499), "1 KB");
        assert_eq!(format_bytes(12_345_678), "12.3 MB");
        assert_eq!(format_bytes(1_500_000_000), "1.5 GB");
        assert_eq!(format_bytes(2_345_678_901), "2.35 GB");
    }

    #[test]
    fn test_rounding_rolls_over_to_next_unit() {
        assert_eq!(format_bytes(999), "999 bytes");
        assert_eq!(format_bytes(999_499), "999 KB");
        assert_eq!(format_bytes(999_950), "1 MB");
        assert_eq!(format_bytes(1_000_000), "1 MB");
        assert_eq!(format_bytes(999_960_000), "1 GB");
    }

    #[test]
    fn test_sum_of_sizes() {
        let sizes = vec![SizeOnDisk::from_bytes(400), SizeOnDisk::from_bytes(600)];
        assert_eq!(sizes.into_iter().sum::<SizeOnDisk>(), SizeOnDisk::from_bytes(1_000));
        assert_eq!(
            Vec::<SizeOnDisk>::new().into_iter().sum::<SizeOnDisk>(),
            SizeOnDisk::zero()
        );
    }

    #[test]
    fn test_negative_delta_is_not_clamped() {
        let delta = SizeOnDisk::from_bytes(1_000_000) - SizeOnDisk::from_bytes(1_250_000);
        assert_eq!(delta.amount, -250_000);
        assert_eq!(delta.formatted, "-250 KB");
    }

    #[test]
    fn test_app_size_on_disk_walks_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("Empty.app");
        std::fs::create_dir_all(app.join("Frameworks")).unwrap();
        std::fs::write(app.join("Empty"), vec![1u8; 10_000]).unwrap();
        std::fs::write(app.join("Frameworks").join("Lib"), vec![1u8; 20_000]).unwrap();

        let total = app_size_on_disk(&app).unwrap();
        let frameworks = app_size_on_disk(&app.join("Frameworks")).unwrap();
        assert!(total.amount > 0);
        assert!(total.amount >= frameworks.amount);
        assert_eq!(total.formatted, format_bytes(total.amount));
    }

    #[test]
    fn test_app_size_on_disk_missing_path() {
        assert!(app_size_on_disk(Path::new("/nonexistent/App.app")).is_err());
    }
}
