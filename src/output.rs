use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DownloadResult, ProgressEvent, ProgressSink, RunOutcome, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines to stderr and summaries to stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_report(report: &RunReport) {
        let green = "\x1b[32m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        match report.outcome {
            RunOutcome::Completed => println!(
                "{green}{} ({}) finished {} stage(s){reset}",
                report.dataset_id,
                report.data_type,
                report.stages_run.len()
            ),
            RunOutcome::AlreadyComplete => println!(
                "{green}{} ({}) is already complete{reset}",
                report.dataset_id, report.data_type
            ),
        }
        if let Some(topology) = report.topology {
            println!("{cyan}   reads: {topology}-end{reset}");
        }
        println!("{cyan}   workspace: {}{reset}", report.workspace);
    }

    pub fn print_download(result: &DownloadResult) {
        for report in &result.runs {
            Self::print_report(report);
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stderr, "{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}
