extern crate dhsim;

use anyhow::Context;
use clap::Parser;
use dhsim::output::FileOutput;
use dhsim::read_weather_file::weather_data_from_try;
use dhsim::run_project;
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct DhsArgs {
    /// project input (JSON)
    input_file: String,
    /// DWD test reference year file, overrides the weather given in the input
    #[arg(long, short = 'w')]
    try_weather_file: Option<String>,
    /// directory for the result files, defaults to the directory of the input file
    #[arg(long, short)]
    output_dir: Option<PathBuf>,
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = DhsArgs::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Could not install the log subscriber")?;

    let input_path = Path::new(args.input_file.as_str());
    let input_file_stem = input_path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("project");
    let input_directory = input_path.parent().filter(|dir| !dir.as_os_str().is_empty());
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| input_directory.map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let weather = args
        .try_weather_file
        .as_deref()
        .map(|file| {
            File::open(file)
                .with_context(|| format!("Could not open weather file {file}"))
                .and_then(weather_data_from_try)
        })
        .transpose()?;

    let output = FileOutput::new(output_dir.clone(), format!("{input_file_stem}_{{}}"));
    let summary = run_project(
        BufReader::new(
            File::open(input_path)
                .with_context(|| format!("Could not open input file {}", args.input_file))?,
        ),
        &output,
        input_directory,
        weather,
    )?;

    println!(
        "Annual demand {:.1} MWh (peak {:.1} kW), levelized cost of heat {:.2} EUR/MWh, {:.3} t CO2/MWh",
        summary.demand.annual_mwh,
        summary.demand.peak_kw,
        summary.dispatch.levelized_cost,
        summary.dispatch.specific_co2
    );
    println!("Results written to {}", output_dir.display());

    Ok(())
}
