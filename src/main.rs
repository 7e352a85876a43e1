mod cli;

use anyhow::{Context, Result, anyhow};
use blkprobe::{
    OpenMode, ProbeError, ProbeOptions, ProbeResults, ProbeStatus, Session, WipeRegion, logging,
};
use clap::Parser;
use cli::{Cli, ProbeMode};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

// blkid exit codes
const EXIT_NOT_FOUND: u8 = 2;
const EXIT_ERROR: u8 = 4;
const EXIT_AMBIGUOUS: u8 = 8;

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    Found,
    NotFound,
    Ambiguous,
}

#[derive(Debug, Serialize)]
struct DeviceReport {
    device: PathBuf,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conflicts: Vec<String>,
    results: ProbeResults,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    wiped: Vec<WipeRegion>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("blkprobe: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let base = match &cli.config {
        Some(path) => ProbeOptions::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProbeOptions::default(),
    };
    let options = cli.apply_to(base).map_err(|e| anyhow!(e))?;

    let reports: Vec<Result<DeviceReport>> = cli
        .devices
        .par_iter()
        .map(|device| {
            probe_device(device, cli, &options)
                .with_context(|| format!("probing {}", device.display()))
        })
        .collect();

    let mut failed = false;
    let mut ok = Vec::with_capacity(reports.len());
    for report in reports {
        match report {
            Ok(report) => ok.push(report),
            Err(err) => {
                eprintln!("blkprobe: {err:#}");
                failed = true;
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&ok)?);
    } else {
        print_export(&ok);
    }

    let code = if failed {
        EXIT_ERROR
    } else if ok.iter().any(|r| matches!(r.outcome, Outcome::Ambiguous)) {
        EXIT_AMBIGUOUS
    } else if ok.iter().all(|r| matches!(r.outcome, Outcome::NotFound)) {
        EXIT_NOT_FOUND
    } else {
        0
    };
    Ok(ExitCode::from(code))
}

fn probe_device(device: &Path, cli: &Cli, options: &ProbeOptions) -> Result<DeviceReport> {
    let mode = if cli.wipe && !cli.dry_run {
        OpenMode::ReadWrite
    } else {
        OpenMode::ReadOnly
    };
    let mut session = Session::open_path_with_options(device, mode, options)?;

    let (outcome, conflicts, wiped) = if cli.wipe {
        let wiped = wipe_all(&mut session, cli.dry_run)?;
        let outcome = if wiped.is_empty() {
            Outcome::NotFound
        } else {
            Outcome::Found
        };
        (outcome, Vec::new(), wiped)
    } else {
        let status = match cli.mode {
            ProbeMode::Safe => session.do_safeprobe(),
            ProbeMode::Full => session.do_fullprobe(),
            ProbeMode::Normal => session.do_probe(),
        };
        match status {
            Ok(ProbeStatus::Matched) => (Outcome::Found, Vec::new(), Vec::new()),
            Ok(ProbeStatus::NothingFound) => (Outcome::NotFound, Vec::new(), Vec::new()),
            Err(ProbeError::Ambiguous { types }) => (Outcome::Ambiguous, types, Vec::new()),
            Err(err) => return Err(err.into()),
        }
    };

    let results = session.probe_results()?;
    session.close()?;

    Ok(DeviceReport {
        device: device.to_path_buf(),
        outcome,
        conflicts,
        results,
        wiped,
    })
}

/// Steps through every signature, erasing each as it is found.
fn wipe_all(session: &mut Session, dry_run: bool) -> Result<Vec<WipeRegion>> {
    let mut wiped = Vec::new();
    while session.do_probe()? == ProbeStatus::Matched {
        let region = session.do_wipe(dry_run)?;
        tracing::info!(
            type_name = region.type_name,
            offset = region.offset,
            length = region.length,
            dry_run,
            "erasing signature"
        );
        wiped.push(region);
    }
    Ok(wiped)
}

fn print_export(reports: &[DeviceReport]) {
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("DEVNAME={}", report.device.display());
        if !report.conflicts.is_empty() {
            println!("AMBIVALENT={}", report.conflicts.join(","));
        }
        for region in &report.wiped {
            println!(
                "WIPE={}:{}+{}{}",
                region.type_name,
                region.offset,
                region.length,
                if region.dry_run { " (dry-run)" } else { "" }
            );
        }
        for (name, value) in report.results.iter() {
            println!("{name}={value}");
        }
    }
}
