//! OBD Trace CLI Application
//!
//! Command-line front end for the obd-trace library. It adds:
//! - OBD2 CSV loading
//! - TOML project files (recordings, offsets, math channels, filters, view)
//! - JSON render reports and text summaries
//! - Expression checking for editor integrations

use anyhow::{bail, Context, Result};
use clap::Parser;
use obd_trace::{Expression, InputLabel, PipelineConfig, RecordingId, ResultKind, Session, TimeWindow};
use std::path::{Path, PathBuf};

mod config;
mod loader;
mod report;

/// OBD Trace - Align, derive, filter and decimate OBD2 recordings
#[derive(Parser, Debug)]
#[command(name = "obd-trace-cli")]
#[command(about = "Align, derive, filter and decimate OBD2 recordings", long_about = None)]
#[command(version)]
struct Args {
    /// Path to project file (project.toml)
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// OBD2 CSV export to load (can be repeated; the first is the base)
    #[arg(long, value_name = "FILE")]
    csv: Vec<PathBuf>,

    /// Time offset in seconds for the 2nd, 3rd, ... --csv recording
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    offset: Vec<f64>,

    /// Output file for the JSON report
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write the JSON report to stdout instead of a summary
    #[arg(long, conflicts_with = "output")]
    json: bool,

    /// Start of the rendered window (base time, seconds)
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    start: Option<f64>,

    /// End of the rendered window (base time, seconds)
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    end: Option<f64>,

    /// Maximum points per rendered channel
    #[arg(long, value_name = "COUNT")]
    points: Option<usize>,

    /// Validate an expression and print its result kind
    #[arg(long, value_name = "EXPR")]
    check_expression: Option<String>,

    /// Input labels bound for --check-expression (default: A)
    #[arg(long, value_name = "LABELS", value_delimiter = ',')]
    inputs: Vec<InputLabel>,

    /// Require --check-expression to be boolean (filter expressions)
    #[arg(long)]
    boolean: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("OBD Trace CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using obd-trace library v{}", obd_trace::VERSION);

    if let Some(source) = &args.check_expression {
        check_expression_mode(source, &args)?;
    } else if let Some(project_path) = &args.project {
        project_mode(project_path, &args)?;
    } else if !args.csv.is_empty() {
        quick_mode(&args)?;
    } else {
        println!("OBD Trace - No input specified");
        println!("\nQuick Start:");
        println!("  obd-trace-cli --csv morning.csv --csv evening.csv --offset 12.5");
        println!("  obd-trace-cli --check-expression \"A > 2 & B < 900\" --inputs A,B --boolean");
        println!("\nFull pipeline:");
        println!("  obd-trace-cli --project project.toml --output render.json");
        println!("\nUse --help for more options");
    }

    Ok(())
}

/// Validate one expression the way an editor does on each keystroke
fn check_expression_mode(source: &str, args: &Args) -> Result<()> {
    let bound = if args.inputs.is_empty() {
        vec![InputLabel::A]
    } else {
        args.inputs.clone()
    };

    let checked = if args.boolean {
        Expression::compile(source, &bound, ResultKind::Boolean).map(|e| e.kind())
    } else {
        Expression::check(source, &bound)
    };

    match checked {
        Ok(kind) => {
            println!("✓ {} expression", kind);
            Ok(())
        }
        Err(e) => {
            println!("✗ {}", e);
            println!("  functions: {}", obd_trace::expression::FUNCTIONS.join(", "));
            Err(e.into())
        }
    }
}

/// Quick mode - load CSV recordings and print an inventory
fn quick_mode(args: &Args) -> Result<()> {
    if args.offset.len() >= args.csv.len() && !args.offset.is_empty() {
        bail!(
            "{} offsets given for {} recordings (offsets apply to the 2nd recording onwards)",
            args.offset.len(),
            args.csv.len()
        );
    }

    let mut session = Session::new(PipelineConfig::default());
    for (index, path) in args.csv.iter().enumerate() {
        let name = file_label(path);
        let id = add_csv(&mut session, path, &name, args.quiet || args.json)?;
        if let Some(&offset) = index.checked_sub(1).and_then(|i| args.offset.get(i)) {
            session
                .set_offset(id, offset)
                .with_context(|| format!("Invalid offset for {:?}", path))?;
        }
    }

    let snapshot = session.compute();
    let budget = args.points.unwrap_or(session.config().point_budget);
    let window = cli_window(args, None, snapshot.time_range());
    emit(&snapshot, window, budget, args)
}

/// Project mode - run the full pipeline described by a project file
fn project_mode(project_path: &Path, args: &Args) -> Result<()> {
    if !args.quiet && !args.json {
        println!("═══════════════════════════════════════════════");
        println!("  OBD Trace - Project Mode");
        println!("═══════════════════════════════════════════════\n");
    }

    log::info!("Loading project from: {:?}", project_path);
    let project = config::load_config(project_path)?;
    let base_dir = project_path.parent().unwrap_or_else(|| Path::new("."));
    let limits = project.pipeline.buffer_limits();

    let mut session = Session::new(project.pipeline.clone());
    for (index, recording) in project.recordings.iter().enumerate() {
        let path = recording.resolve_path(base_dir);
        let id = add_csv(&mut session, &path, &recording.display_name(), args.quiet || args.json)?;
        if index == 0 {
            if recording.offset != 0.0 {
                log::warn!(
                    "Ignoring offset {}s on base recording '{}'",
                    recording.offset,
                    recording.display_name()
                );
            }
        } else {
            session
                .set_offset(id, recording.offset)
                .with_context(|| format!("Invalid offset for '{}'", recording.display_name()))?;
        }
    }

    for math in &project.math_channels {
        session.add_math_channel(math.to_definition()?)?;
    }
    for filter in &project.filters {
        session.add_filter(filter.to_definition(limits)?)?;
    }
    log::debug!(
        "Session ready: {} recordings, {} math channels, {} filters",
        session.recordings().len(),
        session.math_channels().len(),
        session.filters().len()
    );

    let snapshot = session.compute();
    let budget = args
        .points
        .or(project.view.point_budget)
        .unwrap_or(project.pipeline.point_budget);
    let window = cli_window(args, project.view.window(snapshot.time_range()), snapshot.time_range());
    emit(&snapshot, window, budget, args)
}

fn add_csv(session: &mut Session, path: &Path, name: &str, silent: bool) -> Result<RecordingId> {
    use std::io::{self, Write};

    if !silent {
        print!("Loading CSV: {:?} ... ", path);
        io::stdout().flush()?;
    }
    match loader::load_csv(path).and_then(|channels| Ok(session.add_recording(name, channels)?)) {
        Ok(id) => {
            if !silent {
                println!("✓");
            }
            Ok(id)
        }
        Err(e) => {
            if !silent {
                println!("✗");
            }
            Err(e.context(format!("Failed to load recording '{}'", name)))
        }
    }
}

/// Combine --start/--end with a window from the project view
fn cli_window(args: &Args, view: Option<TimeWindow>, full: Option<TimeWindow>) -> Option<TimeWindow> {
    if args.start.is_none() && args.end.is_none() {
        return view;
    }
    let fallback = view.or(full)?;
    Some(TimeWindow::new(
        args.start.unwrap_or(fallback.start),
        args.end.unwrap_or(fallback.end),
    ))
}

/// Print a summary and/or write the JSON report
fn emit(snapshot: &obd_trace::Snapshot, window: Option<TimeWindow>, budget: usize, args: &Args) -> Result<()> {
    if args.json {
        let report = report::build_report(snapshot, window, budget)?;
        return report::write_json(&report, None);
    }

    if !args.quiet {
        println!("\n📊 Channels:");
        print!("{}", report::summary(snapshot));
        if let Some(range) = snapshot.time_range() {
            println!("\nTime range: {:.3}s .. {:.3}s ({:.3}s)", range.start, range.end, range.duration());
        }
    }

    if let Some(output) = &args.output {
        let report = report::build_report(snapshot, window, budget)?;
        report::write_json(&report, Some(output))?;
        if !args.quiet {
            println!("\n✓ Report written: {:?}", output);
        }
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "[{} {}] {}", record.level(), record.target(), record.args()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("obd-trace-cli").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_inputs_and_offsets() {
        let parsed = args(&["--check-expression", "A > B", "--inputs", "A,B", "--boolean"]);
        assert_eq!(parsed.inputs, vec![InputLabel::A, InputLabel::B]);
        assert!(parsed.boolean);

        let parsed = args(&["--csv", "a.csv", "--csv", "b.csv", "--offset", "-2.5", "-vv"]);
        assert_eq!(parsed.csv.len(), 2);
        assert_eq!(parsed.offset, vec![-2.5]);
        assert_eq!(parsed.verbose, 2);

        assert!(Args::try_parse_from(["obd-trace-cli", "--inputs", "Q"]).is_err());
        assert!(Args::try_parse_from(["obd-trace-cli", "--json", "-o", "x.json"]).is_err());
    }

    #[test]
    fn test_check_expression_mode() {
        let numeric = args(&["--check-expression", "A * 2", "--inputs", "A"]);
        assert!(check_expression_mode("A * 2", &numeric).is_ok());

        let boolean = args(&["--check-expression", "A * 2", "--boolean"]);
        assert!(check_expression_mode("A * 2", &boolean).is_err());
        assert!(check_expression_mode("A + C", &numeric).is_err());
    }

    #[test]
    fn test_cli_window() {
        let full = Some(TimeWindow::new(0.0, 100.0));
        assert_eq!(cli_window(&args(&[]), None, full), None);
        assert_eq!(
            cli_window(&args(&["--start", "20"]), None, full),
            Some(TimeWindow::new(20.0, 100.0))
        );
        assert_eq!(
            cli_window(&args(&["--end", "50"]), Some(TimeWindow::new(10.0, 90.0)), full),
            Some(TimeWindow::new(10.0, 50.0))
        );
    }

    #[test]
    fn test_project_mode_writes_report() {
        use std::fs;

        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("trip.csv"),
            "SECONDS;PID;VALUE;UNITS\n0;Vehicle speed;0;km/h\n1;Vehicle speed;36;km/h\n2;Vehicle speed;72;km/h\n",
        )
        .unwrap();
        let project = dir.path().join("project.toml");
        fs::write(
            &project,
            r#"
            [[recordings]]
            path = "trip.csv"

            [[math_channels]]
            name = "speed_mps"
            unit = "m/s"
            expression = "A / 3.6"
            inputs = { A = "Vehicle_speed" }

            [[filters]]
            name = "stopped"
            expression = "A < 1"
            inputs = { A = "Vehicle_speed" }
            mode = "hide"
            "#,
        )
        .unwrap();

        let output = dir.path().join("render.json");
        let parsed = args(&[
            "--project",
            project.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--quiet",
        ]);
        project_mode(&project, &parsed).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let channels = json["recordings"][0]["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1]["name"], "speed_mps");
        assert_eq!(channels[1]["source"], "derived");
        assert_eq!(channels[1]["points"][0]["v"], 10.0);
    }
}
