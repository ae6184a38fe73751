//! Render reports
//!
//! A report is the JSON hand-off to a plotting frontend: every channel of
//! every recording, decimated to the point budget over one base-time window,
//! with filtered stretches embedded as `null` gaps.

use anyhow::{Context, Result};
use obd_trace::{ChannelStatistics, RecordingId, RenderedSeries, Snapshot, TimeWindow};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub tool_version: &'static str,
    /// Full base-time extent of the loaded data
    pub time_range: Option<TimeWindow>,
    /// Rendered window, absent when each channel was rendered whole
    pub window: Option<TimeWindow>,
    pub point_budget: usize,
    pub recordings: Vec<RecordingReport>,
}

#[derive(Debug, Serialize)]
pub struct RecordingReport {
    pub id: RecordingId,
    pub name: String,
    pub offset: f64,
    pub is_base: bool,
    pub channels: Vec<ChannelReport>,
}

#[derive(Debug, Serialize)]
pub struct ChannelReport {
    #[serde(flatten)]
    pub series: RenderedSeries,
    pub statistics: ChannelStatistics,
}

/// Render every channel over `window` (`None` = each channel's full range)
pub fn build_report(snapshot: &Snapshot, window: Option<TimeWindow>, budget: usize) -> Result<Report> {
    let mut recordings = Vec::with_capacity(snapshot.recordings().len());

    for recording in snapshot.recordings() {
        let id = recording.id();
        let channels = recording
            .channels()
            .par_iter()
            .map(|channel| {
                let series = snapshot.render_with_budget(id, channel.name(), window, budget)?;
                Ok(ChannelReport {
                    series,
                    statistics: channel.statistics(),
                })
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to render recording '{}'", recording.name()))?;

        log::debug!("Rendered {} channels of '{}'", channels.len(), recording.name());
        recordings.push(RecordingReport {
            id,
            name: recording.name().to_string(),
            offset: recording.offset(),
            is_base: recording.is_base(),
            channels,
        });
    }

    Ok(Report {
        generated_at: chrono::Utc::now().to_rfc3339(),
        tool_version: env!("CARGO_PKG_VERSION"),
        time_range: snapshot.time_range(),
        window,
        point_budget: budget,
        recordings,
    })
}

/// Write the report as pretty JSON to `output`, or stdout
pub fn write_json(report: &Report, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.flush()?;
            log::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Plain-text channel inventory with statistics
pub fn summary(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for recording in snapshot.recordings() {
        let _ = writeln!(
            out,
            "{} {}{} (offset {:+.3}s, {} channels)",
            recording.id(),
            recording.name(),
            if recording.is_base() { " [base]" } else { "" },
            recording.offset(),
            recording.channels().len()
        );
        for channel in recording.channels() {
            let stats = channel.statistics();
            let unit = if channel.unit().is_empty() { "-" } else { channel.unit() };
            let _ = writeln!(
                out,
                "  {:<32} {:>8} {:>8} samples  min {:>10.3}  max {:>10.3}  mean {:>10.3}",
                channel.name(),
                unit,
                stats.count,
                stats.min,
                stats.max,
                stats.mean
            );
        }
    }
    out
}
