use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use nmr_contour::config::{self, Config, DEFAULT_CONFIG_NAME};
use nmr_contour::data::nmrpipe_format::NmrPipeReader;
use nmr_contour::log::run_log::RunLog;
use nmr_contour::pipeline::overlay;
use nmr_contour::viewer;

#[derive(Parser)]
#[command(name = "nmr-contour", version, about = "Contour overlays of NMRPipe spectra")]
struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a template configuration, backing up any existing file
    New {
        #[arg(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },
    /// Render the overlay described by a configuration file
    Plot {
        config: PathBuf,
        /// Open a preview window after saving
        #[arg(long)]
        show: bool,
        /// Write a run log (JSON, or text for .txt/.log)
        #[arg(long, value_name = "PATH")]
        log: Option<PathBuf>,
    },
    /// Dump a spectrum as a table with ppm columns
    Table {
        path: PathBuf,
        #[arg(long)]
        pseudo_dim: Option<usize>,
        /// CSV destination; stdout when omitted
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let result = match cli.command {
        Command::New { path } => new_config(&path),
        Command::Plot { config, show, log } => plot(&config, show, log.as_deref()),
        Command::Table { path, pseudo_dim, out } => table(&path, pseudo_dim, out.as_deref()),
    };
    if let Err(e) = result {
        let shown = e.to_string();
        log::error!("{}", shown);
        let mut source = e.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !shown.contains(&text) {
                log::error!("  caused by: {}", text);
            }
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn new_config(path: &Path) -> Result<(), Box<dyn Error>> {
    config::scaffold(path)?;
    log::info!("Edit {} and run `nmr-contour plot {}`", path.display(), path.display());
    Ok(())
}

fn plot(
    config_path: &Path,
    show: bool,
    log_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let request = Config::load(config_path)?.into_request()?;
    let (figure, rendered, outputs) = overlay::render(&request, &NmrPipeReader)?;

    if let Some(log_path) = log_path {
        let mut run_log = RunLog::new(config_path);
        for entry in &rendered {
            run_log.record(entry);
        }
        for path in &outputs {
            run_log.record_output(path);
        }
        run_log.save(log_path)?;
        log::info!("Run log written to {}", log_path.display());
    }

    if show {
        let title = request.output.fname.clone();
        viewer::show(&figure, request.output.width, request.output.height, &title)?;
    }
    Ok(())
}

fn table(
    path: &Path,
    pseudo_dim: Option<usize>,
    out: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let table = overlay::load_table(&NmrPipeReader, path, pseudo_dim)?;
    log::info!("{}: {} rows, rank {}", path.display(), table.len(), table.rank());
    match out {
        Some(out) => {
            let mut w = BufWriter::new(File::create(out)?);
            table.write_csv(&mut w)?;
            w.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut w = BufWriter::new(stdout.lock());
            table.write_csv(&mut w)?;
            w.flush()?;
        }
    }
    Ok(())
}
