use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use memtally::{ArrayLayout, ConfigWarning, DimRange, Domain, MemoryContext};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "memtally", about = "Allocation tracking and array layout tools")]
struct Cli {
    /// Log library events at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an allocation script through the instrumented facade.
    Replay {
        /// Script file, one call per line.
        script: PathBuf,
        #[command(flatten)]
        flags: MemFlags,
    },
    /// Print the strided layout of a domain.
    Layout {
        /// Dimensions as `lo:hi` or `lo:hi:stride`, outermost first.
        #[arg(required = true, allow_hyphen_values = true, value_parser = parse_dim)]
        dims: Vec<DimRange>,
        /// Bytes per element.
        #[arg(long, default_value_t = 8)]
        elem_size: usize,
        /// Index to translate into a linear offset, comma separated.
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        index: Option<Vec<i64>>,
    },
}

/// Memory instrumentation flags, as the runtime's launcher accepts them.
#[derive(Args, Debug)]
struct MemFlags {
    /// Keep live/peak byte statistics (implies --memtrack).
    #[arg(long)]
    memstat: bool,
    /// Track every live allocation.
    #[arg(long)]
    memtrack: bool,
    /// Trace allocate/resize calls to PATH, or stdout with `-` or no value.
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = "-")]
    memtrace: Option<String>,
    /// Skip trace lines for calls smaller than N bytes.
    #[arg(long, value_name = "N")]
    memthreshold: Option<usize>,
    /// Fail once more than N bytes are live (implies --memstat).
    #[arg(long, value_name = "N")]
    memmax: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Replay { script, flags } => run_replay(script, flags)?,
        Commands::Layout {
            dims,
            elem_size,
            index,
        } => run_layout(dims, elem_size, index)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Apply the memory flags. Setup warnings are already logged by the context
/// and do not stop the run; the number skipped is returned.
fn configure(ctx: &mut MemoryContext, flags: &MemFlags) -> usize {
    let mut results: Vec<Result<(), ConfigWarning>> = Vec::new();
    if flags.memstat {
        results.push(ctx.set_stat());
    }
    if flags.memtrack {
        results.push(ctx.set_track());
    }
    match flags.memtrace.as_deref() {
        Some("-") => results.push(ctx.set_trace_writer(Box::new(io::stdout()))),
        Some(path) => results.push(ctx.set_trace(Path::new(path))),
        None => {}
    }
    if let Some(bytes) = flags.memthreshold {
        results.push(ctx.set_trace_threshold(bytes));
    }
    if let Some(bytes) = flags.memmax {
        results.push(ctx.set_byte_limit(bytes));
    }
    results.iter().filter(|result| result.is_err()).count()
}

fn run_replay(script: PathBuf, flags: MemFlags) -> Result<()> {
    let mut ctx = MemoryContext::system();
    let skipped = configure(&mut ctx, &flags);
    if skipped > 0 {
        debug!(skipped, "memory settings skipped");
    }
    ctx.start_tracking();

    let reader = BufReader::new(
        File::open(&script)
            .with_context(|| format!("failed to open script {}", script.display()))?,
    );

    let mut blocks: HashMap<String, NonNull<u8>> = HashMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        replay_line(&mut ctx, &mut blocks, line)
            .with_context(|| format!("line {}: {}", line_no + 1, line))?;
    }

    ctx.flush_trace().context("failed to flush trace log")?;
    ctx.print_final_summary()?;
    Ok(())
}

fn replay_line(
    ctx: &mut MemoryContext,
    blocks: &mut HashMap<String, NonNull<u8>>,
    line: &str,
) -> Result<()> {
    let mut fields = line.split_whitespace();
    let Some(op) = fields.next() else {
        return Ok(());
    };

    match op {
        "malloc" | "calloc" | "realloc" => {
            let name = fields
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing block name"))?;
            let count: usize = next_number(&mut fields, "count")?;
            let size: usize = next_number(&mut fields, "size")?;
            let tag = fields.collect::<Vec<_>>().join(" ");

            match op {
                "malloc" => {
                    let ptr = ctx.allocate(count, size, &tag)?;
                    blocks.insert(name.to_owned(), ptr);
                }
                "calloc" => {
                    let ptr = ctx.allocate_zeroed(count, size, &tag)?;
                    blocks.insert(name.to_owned(), ptr);
                }
                _ => {
                    let old = blocks.remove(name);
                    // SAFETY: every pointer in `blocks` came from this context
                    // and is dropped from the map once resized or released.
                    if let Some(ptr) = unsafe { ctx.resize(old, count, size, &tag)? } {
                        blocks.insert(name.to_owned(), ptr);
                    }
                }
            }
        }
        "free" => {
            let name = fields
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing block name"))?;
            let ptr = blocks
                .remove(name)
                .ok_or_else(|| anyhow::anyhow!("unknown block '{name}'"))?;
            // SAFETY: see above.
            unsafe { ctx.release(ptr)? };
        }
        "table" => {
            let min_bytes = optional_number(&mut fields, "threshold")?.unwrap_or(0);
            ctx.print_table(min_bytes)?;
        }
        "stat" => ctx.print_summary()?,
        other => bail!("unknown operation '{other}'"),
    }
    Ok(())
}

fn next_number<'a, T, I>(fields: &mut I, what: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    I: Iterator<Item = &'a str>,
{
    let raw = fields
        .next()
        .ok_or_else(|| anyhow::anyhow!("missing {what}"))?;
    raw.parse()
        .with_context(|| format!("invalid {what} '{raw}'"))
}

fn optional_number<'a, T, I>(fields: &mut I, what: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    I: Iterator<Item = &'a str>,
{
    fields
        .next()
        .map(|raw| {
            raw.parse()
                .with_context(|| format!("invalid {what} '{raw}'"))
        })
        .transpose()
}

fn run_layout(dims: Vec<DimRange>, elem_size: usize, index: Option<Vec<i64>>) -> Result<()> {
    let domain = Domain::new(dims);
    let layout = ArrayLayout::new(&domain, elem_size).context("invalid domain")?;

    println!("dim\tlo\thi\tstride\textent\toffset\tblock");
    for (d, (range, dim)) in domain.dims().iter().zip(layout.dims()).enumerate() {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            d,
            range.lo,
            range.hi,
            range.stride,
            range.extent().unwrap_or(0),
            dim.offset,
            dim.block
        );
    }
    println!(
        "elements={}\tbytes={}",
        layout.element_count(),
        layout.byte_len()
    );

    if let Some(index) = index {
        if index.len() != layout.rank() {
            bail!(
                "index has {} components but the domain has rank {}",
                index.len(),
                layout.rank()
            );
        }
        let in_domain = if domain.contains(&index) { "" } else { "\t(outside domain)" };
        println!("offset={}{}", layout.offset_of(&index), in_domain);
    }

    Ok(())
}

fn parse_dim(raw: &str) -> Result<DimRange, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let number = |s: &str| {
        s.trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid bound '{s}' in '{raw}': {e}"))
    };
    match parts.as_slice() {
        [lo, hi] => Ok(DimRange::unit(number(lo)?, number(hi)?)),
        [lo, hi, stride] => Ok(DimRange::new(number(lo)?, number(hi)?, number(stride)?)),
        _ => Err(format!("expected lo:hi or lo:hi:stride, got '{raw}'")),
    }
}
