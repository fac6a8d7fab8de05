use anyhow::{Context, Result};
use clap::Parser;
use rtfcarve::cli::Args;
use rtfcarve::{CollectSink, ExtractReport, RtfExtractor, Verdict};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// JSON output for one processed file.
#[derive(Serialize)]
struct FileSummary<'a> {
    path: String,
    report: &'a ExtractReport,
    /// sha256 of each extracted object, in report order
    sha256: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the verbose flag
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("rtfcarve=debug")
    } else {
        EnvFilter::new("rtfcarve=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("logging initialized (verbose={})", args.verbose);

    // status info never goes to stdout
    eprintln!("RTFCARVE v{}", env!("CARGO_PKG_VERSION"));

    let extractor = RtfExtractor::with_config(args.config())?;
    let mut detected = false;

    for path in &args.paths {
        let mut sink = CollectSink::new();
        let report = extractor
            .extract_file(path, &mut sink)
            .with_context(|| format!("failed to process {}", path.display()))?;
        if !report.verdict.is_clean() {
            detected = true;
        }

        let digests: Vec<String> = sink
            .objects
            .iter()
            .map(|obj| {
                let mut hasher = Sha256::new();
                hasher.update(&obj.data);
                format!("{:x}", hasher.finalize())
            })
            .collect();

        if args.json {
            let summary = FileSummary {
                path: path.display().to_string(),
                report: &report,
                sha256: digests,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_report(path, &report, &digests);
        }
    }

    if detected {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(path: &Path, report: &ExtractReport, digests: &[String]) {
    println!(
        "{}: {} embedded object(s), {} group(s), max depth {}",
        path.display(),
        report.objects.len(),
        report.groups,
        report.max_depth
    );
    for (i, obj) in report.objects.iter().enumerate() {
        let desc = obj.description.as_deref().unwrap_or("-");
        print!(
            "  [{}] {:?}, {} bytes, description: {}",
            i, obj.flavour, obj.size, desc
        );
        if let Some(digest) = digests.get(i) {
            print!(", sha256: {digest}");
        }
        if obj.truncated {
            print!(" (truncated)");
        }
        println!();
        if let Some(kept) = &obj.path {
            println!("      kept at {}", kept.display());
        }
    }
    if report.discarded > 0 {
        println!("  {} object(s) skipped by limits", report.discarded);
    }
    if let Verdict::Detected(sig) = &report.verdict {
        println!("  DETECTED: {sig}");
    }
    if let Some(dir) = &report.tmp_dir {
        println!("  temp files kept under {}", dir.display());
    }
}
