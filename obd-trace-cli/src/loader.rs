//! OBD2 CSV loading
//!
//! Exports are semicolon-delimited with one sample per row:
//!
//! ```text
//! SECONDS;PID;VALUE;UNITS
//! 0.12;Engine RPM;812;rpm
//! 0.15;Vehicle speed;0;km/h
//! ```
//!
//! Rows are grouped by PID into channels (in order of first appearance) and
//! each channel is sorted by time. PIDs are sanitized into identifiers so
//! they can be bound to expression inputs.

use anyhow::{Context, Result};
use obd_trace::ChannelData;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Columns every export must have
pub const REQUIRED_COLUMNS: [&str; 4] = ["SECONDS", "PID", "VALUE", "UNITS"];

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("No numeric samples found")]
    NoSamples,
}

/// Load every channel from an OBD2 CSV export
pub fn load_csv(path: &Path) -> Result<Vec<ChannelData>> {
    log::info!("Loading recording: {:?}", path);
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let channels = read_channels(file).with_context(|| format!("Failed to parse CSV file: {:?}", path))?;
    log::info!("Loaded {} channels from {:?}", channels.len(), path);
    Ok(channels)
}

/// Parse channels from any reader
pub fn read_channels<R: Read>(reader: R) -> Result<Vec<ChannelData>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or(LoadError::MissingColumn(name))
    };
    let indices = REQUIRED_COLUMNS
        .iter()
        .map(|name| column(*name))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let (secs_idx, pid_idx, value_idx, units_idx) = (indices[0], indices[1], indices[2], indices[3]);

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (String, Vec<(f64, f64)>)> = HashMap::new();
    // Raw PID -> channel name, so distinct PIDs never share a channel
    let mut names: HashMap<String, String> = HashMap::new();
    let mut skipped = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV row {}", row + 2))?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let (Ok(t), Ok(v)) = (field(secs_idx).parse::<f64>(), field(value_idx).parse::<f64>()) else {
            log::debug!("Skipping row {}: non-numeric SECONDS or VALUE", row + 2);
            skipped += 1;
            continue;
        };
        if !t.is_finite() {
            skipped += 1;
            continue;
        }

        let pid = field(pid_idx);
        let name = match names.get(pid).cloned() {
            Some(name) => name,
            None => {
                let sanitized = sanitize_channel_name(pid);
                if sanitized.is_empty() {
                    skipped += 1;
                    continue;
                }
                let name = unique_name(&sanitized, &groups);
                if name != sanitized {
                    log::warn!(
                        "PID '{}' sanitizes to '{}', which is already taken; loading it as '{}'",
                        pid,
                        sanitized,
                        name
                    );
                }
                names.insert(pid.to_string(), name.clone());
                order.push(name.clone());
                groups.insert(name.clone(), (field(units_idx).to_string(), Vec::new()));
                name
            }
        };

        if let Some((_, samples)) = groups.get_mut(&name) {
            samples.push((t, v));
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {} unusable rows", skipped);
    }
    if groups.is_empty() {
        return Err(LoadError::NoSamples.into());
    }

    let channels = order
        .into_iter()
        .filter_map(|name| {
            let (unit, mut samples) = groups.remove(&name)?;
            samples.sort_by(|a, b| a.0.total_cmp(&b.0));
            Some(ChannelData::from_samples(name, unit, &samples))
        })
        .collect();
    Ok(channels)
}

/// `base`, or `base_2`, `base_3`, ... when already in use
fn unique_name<V>(base: &str, taken: &HashMap<String, V>) -> String {
    if !taken.contains_key(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Replace characters that cannot appear in an identifier with '_'
pub fn sanitize_channel_name(pid: &str) -> String {
    pid.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EXPORT: &str = "SECONDS;PID;VALUE;UNITS\n\
        0.5;Engine RPM;900;rpm\n\
        0.2;Vehicle speed;12;km/h\n\
        0.1;Engine RPM;850;rpm\n\
        0.9;Engine RPM;n/a;rpm\n\
        1.1;Vehicle speed;15.5;km/h\n";

    #[test]
    fn test_grouping_and_sorting() {
        let channels = read_channels(EXPORT.as_bytes()).unwrap();
        assert_eq!(channels.len(), 2);

        assert_eq!(channels[0].name, "Engine_RPM");
        assert_eq!(channels[0].unit, "rpm");
        assert_eq!(channels[0].times, vec![0.1, 0.5]);
        assert_eq!(channels[0].values, vec![850.0, 900.0]);

        assert_eq!(channels[1].name, "Vehicle_speed");
        assert_eq!(channels[1].values, vec![12.0, 15.5]);
    }

    #[test]
    fn test_missing_column() {
        let err = read_channels("SECONDS;PID;VALUE\n1;a;2\n".as_bytes()).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoadError>(), Some(LoadError::MissingColumn("UNITS"))));
    }

    #[test]
    fn test_no_samples() {
        let err = read_channels("SECONDS;PID;VALUE;UNITS\nx;a;y;z\n".as_bytes()).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoadError>(), Some(LoadError::NoSamples)));
    }

    #[test]
    fn test_colliding_pids_stay_separate() {
        let export = "SECONDS;PID;VALUE;UNITS\n\
            0.1;Engine RPM;800;rpm\n\
            0.2;Engine-RPM;3;x\n\
            0.3;Engine RPM;810;rpm\n\
            0.4;Engine.RPM;4;y\n\
            0.5;Engine-RPM;5;x\n";
        let channels = read_channels(export.as_bytes()).unwrap();
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Engine_RPM", "Engine_RPM_2", "Engine_RPM_3"]);
        assert_eq!(channels[0].values, vec![800.0, 810.0]);
        assert_eq!(channels[1].values, vec![3.0, 5.0]);
        assert_eq!(channels[1].unit, "x");
        assert_eq!(channels[2].unit, "y");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_channel_name(" Fuel Rail Pressure (gauge) "), "Fuel_Rail_Pressure__gauge");
        assert_eq!(sanitize_channel_name("O2-B1S1"), "O2_B1S1");
        assert_eq!(sanitize_channel_name("---"), "");
    }

    #[test]
    fn test_load_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();
        let channels = load_csv(file.path()).unwrap();
        assert_eq!(channels.len(), 2);
        assert!(load_csv(Path::new("/nonexistent.csv")).is_err());
    }
}
