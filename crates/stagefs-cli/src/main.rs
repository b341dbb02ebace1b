use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use stagefs_core::{
    CompressionAlgo, FileSystem, FsConfig, PipelineSnapshot, ReadOptions, Stage, WriteOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stagefs",
    version,
    about = "stagefs pipeline CLI",
    long_about = "Store and load files through the stagefs storage and codec workers."
)]
struct Cli {
    /// Capacity of each stage's submission queue.
    #[arg(long, global = true, default_value_t = stagefs_core::config::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Codec used for compressed writes.
    #[arg(long, global = true, value_enum, default_value_t = CodecArg::Lz4)]
    codec: CodecArg,

    /// Largest decompressed size accepted from a frame (supports suffixes K/M/G).
    #[arg(long, global = true, default_value = "256M", value_parser = parse_size)]
    max_decompressed: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a local file into the pipeline's storage.
    Put {
        /// Source file to read.
        source: PathBuf,

        /// Destination path written by the storage worker.
        destination: String,

        /// Compress through the codec worker before storing.
        #[arg(long, default_value_t = false)]
        compress: bool,
    },
    /// Load a file through the pipeline.
    Get {
        /// Path read by the storage worker.
        path: String,

        /// Output file (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The stored file is a compressed frame.
        #[arg(long, default_value_t = false)]
        decompress: bool,
    },
    /// Write then read a batch of files and report throughput.
    Bench {
        /// Number of files per phase.
        #[arg(long, default_value_t = 64)]
        jobs: usize,

        /// Size of each file (supports suffixes K/M/G).
        #[arg(long, default_value = "1M", value_parser = parse_size)]
        size: usize,

        /// Route both phases through the codec worker.
        #[arg(long, default_value_t = false)]
        compress: bool,

        /// Scratch directory (defaults to a folder under the system temp dir).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CodecArg {
    Lz4,
    Deflate,
}

impl From<CodecArg> for CompressionAlgo {
    fn from(value: CodecArg) -> Self {
        match value {
            CodecArg::Lz4 => CompressionAlgo::Lz4,
            CodecArg::Deflate => CompressionAlgo::Deflate,
        }
    }
}

fn main() {
    init_tracing();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = FsConfig::default()
        .with_queue_capacity(cli.queue_capacity)
        .with_compression(cli.codec.into())
        .with_max_decompressed_size(cli.max_decompressed);
    let store = FileSystem::new(config).context("failed to start filesystem")?;

    match cli.command {
        Commands::Put {
            source,
            destination,
            compress,
        } => put_command(&store, &source, &destination, compress)?,
        Commands::Get {
            path,
            output,
            decompress,
        } => get_command(&store, &path, output.as_deref(), decompress)?,
        Commands::Bench {
            jobs,
            size,
            compress,
            dir,
        } => {
            let dir = dir.unwrap_or_else(|| std::env::temp_dir().join("stagefs-bench"));
            bench_command(&store, &dir, jobs, size, compress)?
        }
    }

    store.shutdown().context("filesystem did not shut down cleanly")?;
    Ok(())
}

fn put_command(
    store: &FileSystem,
    source: &Path,
    destination: &str,
    compress: bool,
) -> anyhow::Result<()> {
    let data = fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
    let input_bytes = data.len() as u64;
    let started = Instant::now();

    let completion = store
        .write(destination, data, WriteOptions::new().compressed(compress))
        .with_context(|| format!("failed to store {destination}"))?;
    let elapsed = started.elapsed();

    println!(
        "stored {} -> {destination}: {} in, {} on disk in {}",
        source.display(),
        format_bytes(input_bytes),
        format_bytes(completion.size() as u64),
        format_duration(elapsed)
    );
    Ok(())
}

fn get_command(
    store: &FileSystem,
    path: &str,
    output: Option<&Path>,
    decompress: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let completion = store
        .read(path, ReadOptions::new().compressed(decompress))
        .with_context(|| format!("failed to load {path}"))?;
    let elapsed = started.elapsed();

    match output {
        Some(output) => {
            fs::write(output, completion.data())
                .with_context(|| format!("failed to write {}", output.display()))?;
            eprintln!(
                "loaded {path} -> {}: {} in {}",
                output.display(),
                format_bytes(completion.size() as u64),
                format_duration(elapsed)
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(completion.data())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn bench_command(
    store: &FileSystem,
    dir: &Path,
    jobs: usize,
    size: usize,
    compress: bool,
) -> anyhow::Result<()> {
    if jobs == 0 {
        bail!("--jobs must be at least 1");
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let paths = (0..jobs)
        .map(|i| {
            dir.join(format!("bench-{i:05}.bin"))
                .to_str()
                .map(str::to_owned)
                .context("bench directory is not valid UTF-8")
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let payload = bench_payload(size);

    let started = Instant::now();
    let writes = paths
        .iter()
        .map(|path| {
            store.submit_write(
                path,
                payload.clone(),
                WriteOptions::new().compressed(compress),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut stored_bytes = 0u64;
    for item in writes {
        stored_bytes += item.into_result()?.size() as u64;
    }
    let write_elapsed = started.elapsed();

    let started = Instant::now();
    let reads = paths
        .iter()
        .map(|path| store.submit_read(path, ReadOptions::new().compressed(compress)))
        .collect::<Result<Vec<_>, _>>()?;
    for item in reads {
        let completion = item.into_result()?;
        if completion.size() != size {
            bail!(
                "{} read back {} bytes, expected {size}",
                completion.path(),
                completion.size()
            );
        }
    }
    let read_elapsed = started.elapsed();

    for path in &paths {
        let _ = fs::remove_file(path);
    }

    let logical = (jobs * size) as u64;
    println!("Bench summary");
    println!("  jobs:          {jobs} x {}", format_bytes(size as u64));
    println!("  compressed:    {compress}");
    println!(
        "  stored:        {} ({:.2}x)",
        format_bytes(stored_bytes),
        logical as f64 / stored_bytes.max(1) as f64
    );
    println!(
        "  write:         {} ({}/s)",
        format_duration(write_elapsed),
        format_rate(logical as f64 / write_elapsed.as_secs_f64())
    );
    println!(
        "  read:          {} ({}/s)",
        format_duration(read_elapsed),
        format_rate(logical as f64 / read_elapsed.as_secs_f64())
    );
    print_stage_summary(&store.runtime_snapshot());
    Ok(())
}

fn print_stage_summary(snapshot: &PipelineSnapshot) {
    println!(
        "  jobs:          {} submitted, {} failed",
        snapshot.submitted, snapshot.failed
    );
    for stage in [Stage::Storage, Stage::Codec] {
        if let Some(stats) = snapshot.stage(stage) {
            println!(
                "  {:<14} {} processed, {} handed off, busy {} ({:.1}%)",
                format!("{stage}:"),
                stats.processed,
                stats.handed_off,
                format_duration(stats.busy),
                stats.utilization * 100.0
            );
        }
    }
}

fn bench_payload(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut i = 0u32;
    while data.len() < size {
        data.extend_from_slice(b"stagefs bench block ");
        data.extend_from_slice(&i.to_le_bytes());
        i = i.wrapping_add(1);
    }
    data.truncate(size);
    data
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1024usize,
        "m" | "mb" => 1024usize * 1024usize,
        "g" | "gb" => 1024usize * 1024usize * 1024usize,
        other => {
            return Err(format!("invalid size suffix '{other}' in '{value}'"));
        }
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_suffixes() {
        assert_eq!(parse_size("64"), Ok(64));
        assert_eq!(parse_size("4K"), Ok(4096));
        assert_eq!(parse_size("2mb"), Ok(2 * 1024 * 1024));
        assert!(parse_size("").is_err());
        assert!(parse_size("12Q").is_err());
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
