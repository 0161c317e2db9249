use std::path::PathBuf;

use chunkflow::{
    optimal_chunk_size, read_parquet_table, system_info, ChunkedRun, ChunkflowError,
    MemoryProbe, ProcessMemoryProbe, RunConfig,
};
use chunkflow_common::ram_threshold_exceeded;
use chunkflow_execution::DEFAULT_TARGET_FRACTION;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    match args.first().map(|a| a.as_str()) {
        None | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("sysinfo") => run_sysinfo(&args),
        Some("advise") => run_advise(parse_advise_opts(&args)?),
        Some("run") => run_chunked(parse_run_opts(&args)?),
        Some(other) => Err(format!("unknown command: {other}").into()),
    }
}

#[derive(Debug, Clone)]
struct AdviseOpts {
    data_mb: f64,
    rows: usize,
    max_ram_mb: f64,
    target_fraction: f64,
}

#[derive(Debug, Clone)]
struct RunOpts {
    parquet: PathBuf,
    config: RunConfig,
}

fn run_sysinfo(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut max_ram_mb = None;
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--max-ram-mb" => {
                i += 1;
                max_ram_mb = Some(parse_value::<f64>(args, i, "--max-ram-mb")?);
            }
            other => return Err(format!("unknown argument for sysinfo: {other}").into()),
        }
        i += 1;
    }

    let info = system_info();
    println!("total_ram_mb:     {:.1}", info.total_ram_mb);
    println!("available_ram_mb: {:.1}", info.available_ram_mb);
    println!("used_ram_mb:      {:.1}", info.used_ram_mb);
    if let Some(max) = max_ram_mb {
        let probe = ProcessMemoryProbe::new();
        let over = ram_threshold_exceeded(&probe, max);
        println!(
            "over_budget:      {over} (usage {:.1} MB, budget {max:.1} MB)",
            probe.current_usage_mb()
        );
    }
    Ok(())
}

fn parse_advise_opts(args: &[String]) -> Result<AdviseOpts, Box<dyn std::error::Error>> {
    let mut data_mb = None;
    let mut rows = None;
    let mut max_ram_mb = None;
    let mut target_fraction = DEFAULT_TARGET_FRACTION;

    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--data-mb" => {
                i += 1;
                data_mb = Some(parse_value::<f64>(args, i, "--data-mb")?);
            }
            "--rows" => {
                i += 1;
                rows = Some(parse_value::<usize>(args, i, "--rows")?);
            }
            "--max-ram-mb" => {
                i += 1;
                max_ram_mb = Some(parse_value::<f64>(args, i, "--max-ram-mb")?);
            }
            "--target-fraction" => {
                i += 1;
                target_fraction = parse_value::<f64>(args, i, "--target-fraction")?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument for advise: {other}").into()),
        }
        i += 1;
    }

    Ok(AdviseOpts {
        data_mb: data_mb.ok_or("missing --data-mb")?,
        rows: rows.ok_or("missing --rows")?,
        max_ram_mb: max_ram_mb.ok_or("missing --max-ram-mb")?,
        target_fraction,
    })
}

fn run_advise(opts: AdviseOpts) -> Result<(), Box<dyn std::error::Error>> {
    let size = optimal_chunk_size(
        opts.data_mb,
        opts.rows,
        opts.max_ram_mb,
        opts.target_fraction,
    );
    println!("{size}");
    Ok(())
}

fn parse_run_opts(args: &[String]) -> Result<RunOpts, Box<dyn std::error::Error>> {
    // Environment first, flags override.
    let mut config = RunConfig::from_env();
    let mut parquet = None;

    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--parquet" => {
                i += 1;
                parquet = Some(PathBuf::from(
                    args.get(i).ok_or("missing value for --parquet")?,
                ));
            }
            "--max-ram-mb" => {
                i += 1;
                config.max_ram_mb = parse_value::<f64>(args, i, "--max-ram-mb")?;
            }
            "--chunk-size" => {
                i += 1;
                config.chunk_size = Some(parse_value::<usize>(args, i, "--chunk-size")?);
            }
            "--scratch-dir" => {
                i += 1;
                config.scratch_dir = Some(PathBuf::from(
                    args.get(i).ok_or("missing value for --scratch-dir")?,
                ));
            }
            "--batch-limit" => {
                i += 1;
                config.batch_limit = parse_value::<usize>(args, i, "--batch-limit")?;
            }
            "--verbose" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument for run: {other}").into()),
        }
        i += 1;
    }

    Ok(RunOpts {
        parquet: parquet.ok_or("missing --parquet")?,
        config,
    })
}

fn run_chunked(opts: RunOpts) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = read_parquet_table(&opts.parquet)?;
    let input_rows = dataset.len();

    let out = ChunkedRun::new(opts.config).execute(&dataset, |chunk| {
        Ok::<_, ChunkflowError>(chunk.data)
    })?;
    let output_rows = out.result.as_ref().map_or(0, |d| d.len());

    println!("run_id:           {}", out.run_id);
    println!("rows:             {input_rows}");
    println!("chunk_size:       {}", out.chunk_size);
    println!("chunks:           {}", out.chunks);
    println!("segments_written: {}", out.segments_written);
    if output_rows != input_rows {
        return Err(format!(
            "row count changed during chunked pass: {input_rows} in, {output_rows} out"
        )
        .into());
    }
    println!("OK: {output_rows} rows");
    Ok(())
}

fn parse_value<T>(args: &[String], i: usize, flag: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = args
        .get(i)
        .ok_or_else(|| format!("missing value for {flag}"))?;
    raw.parse::<T>()
        .map_err(|e| format!("invalid value for {flag}: {raw} ({e})").into())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  chunkflow sysinfo [--max-ram-mb M]");
    eprintln!("  chunkflow advise --data-mb X --rows N --max-ram-mb M [--target-fraction F]");
    eprintln!(
        "  chunkflow run --parquet PATH [--max-ram-mb M] [--chunk-size C] [--scratch-dir DIR] [--batch-limit B] [--verbose]"
    );
}
