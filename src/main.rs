use std::{
    fs,
    io::{self, BufRead},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use hexpatch::{parse_offset, Error, PatchType, Pattern, ScanStrategy, Script, Session};

#[derive(Parser, Debug)]
#[command(name = "hexpatch")]
#[command(version)]
#[command(about = "Find and patch byte patterns in binary files", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    silent: bool,

    /// Resume a scan after the matched prefix of a failed candidate instead
    /// of the next byte. Faster, but can miss a hit starting inside that prefix.
    #[arg(long, global = true)]
    prefix_skip: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Patch a single instance at a known offset
    Single(SingleArgs),
    /// Patch every instance of the original data
    Multi(MultiArgs),
    /// Apply every section of a patch script
    Script(ScriptArgs),
    /// Print the offsets of every instance of some data
    Find(FindArgs),
}

#[derive(Parser, Debug)]
struct SingleArgs {
    /// Type of the patch data (Binary, StringASCII, StringUTF8, StringShiftJIS)
    #[arg(short = 't', long = "type", default_value = "Binary")]
    kind: PatchType,

    input: PathBuf,

    output: PathBuf,

    /// The offset to patch (0x12345678)
    offset: String,

    /// The data to patch (0x00,0x01,0x02...), wildcards as 0x??
    patch: String,

    /// The original data (0x00,0x01,0x02...), wildcards as 0x??
    original: Option<String>,
}

#[derive(Parser, Debug)]
struct MultiArgs {
    #[arg(short = 't', long = "type", default_value = "Binary")]
    kind: PatchType,

    /// Maximum hits, 0 for all
    #[arg(short = 'm', long, default_value_t = 0)]
    maximum_hits: usize,

    input: PathBuf,

    output: PathBuf,

    /// The original data (0x00,0x01,0x02...), wildcards as 0x??
    original: String,

    /// The data to patch (0x00,0x01,0x02...), wildcards as 0x??
    patch: String,
}

#[derive(Parser, Debug)]
struct ScriptArgs {
    /// Continue with the next section when one fails
    #[arg(short = 'c', long)]
    continue_on_error: bool,

    /// Wait for enter after each section
    #[arg(short = 'p', long)]
    pause: bool,

    input: PathBuf,

    output: PathBuf,

    script: PathBuf,
}

#[derive(Parser, Debug)]
struct FindArgs {
    #[arg(short = 't', long = "type", default_value = "Binary")]
    kind: PatchType,

    /// Maximum hits, 0 for all
    #[arg(short = 'm', long, default_value_t = 0)]
    maximum_hits: usize,

    input: PathBuf,

    /// The data to find (0x00,0x01,0x02...), wildcards as 0x??
    pattern: String,
}

/// A missing input or script file.
#[derive(Debug, thiserror::Error)]
#[error("File not found: {}", .0.display())]
struct NotFound(PathBuf);

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(&args);

    let strategy = match args.prefix_skip {
        true => ScanStrategy::PrefixSkip,
        false => ScanStrategy::Stepwise,
    };

    let result = match args.command {
        Command::Single(args) => run_single(args, strategy),
        Command::Multi(args) => run_multi(args, strategy),
        Command::Script(args) => run_script(args, strategy),
        Command::Find(args) => run_find(args, strategy),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn setup_logging(args: &Args) {
    let level = match (args.verbose, args.silent) {
        (true, _) => log::LevelFilter::Debug,
        (_, true) => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<NotFound>().is_some() {
        return 2;
    }
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidOffset(_)) => 3,
        Some(Error::InvalidPatternSyntax { .. } | Error::UnsupportedEncoding(_)) => 4,
        Some(Error::NoMatchFound) => 5,
        Some(
            Error::Rejected { .. }
            | Error::OffsetOutOfRange { .. }
            | Error::Section { .. }
            | Error::Script { .. },
        ) => 6,
        _ => 1,
    }
}

fn load(path: &Path) -> anyhow::Result<Vec<u8>> {
    if !path.is_file() {
        return Err(NotFound(path.to_owned()).into());
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn save(path: &Path, session: Session) -> anyhow::Result<()> {
    log::info!("Saving to: {}", path.display());
    fs::write(path, session.into_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn max_hits(value: usize) -> Option<usize> {
    (value > 0).then_some(value)
}

fn run_single(args: SingleArgs, strategy: ScanStrategy) -> anyhow::Result<()> {
    let mut session = Session::new(load(&args.input)?).with_strategy(strategy);

    let offset = parse_offset(&args.offset)?;
    let patch = Pattern::parse(&args.patch, args.kind).context("Failed to parse patch string")?;
    let original = args
        .original
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| Pattern::parse(s, args.kind))
        .transpose()
        .context("Failed to parse original string")?;

    session.patch_at(offset, &patch, original.as_ref(), args.kind.is_string())?;
    save(&args.output, session)
}

fn run_multi(args: MultiArgs, strategy: ScanStrategy) -> anyhow::Result<()> {
    let mut session = Session::new(load(&args.input)?).with_strategy(strategy);

    let patch = Pattern::parse(&args.patch, args.kind).context("Failed to parse patch string")?;
    let original =
        Pattern::parse(&args.original, args.kind).context("Failed to parse original string")?;

    session.patch_all(
        &original,
        &patch,
        max_hits(args.maximum_hits),
        args.kind.is_string(),
    )?;
    save(&args.output, session)
}

fn run_script(args: ScriptArgs, strategy: ScanStrategy) -> anyhow::Result<()> {
    let mut session = Session::new(load(&args.input)?).with_strategy(strategy);

    let src = load(&args.script)?;
    let src = String::from_utf8(src)
        .with_context(|| format!("{} is not valid UTF-8", args.script.display()))?;
    let script = Script::parse(&src)?;

    let report = script.run_with(&mut session, args.continue_on_error, |_| {
        if args.pause {
            println!("Press enter to continue...");
            if let Err(err) = io::stdin().lock().read_line(&mut String::new()) {
                log::warn!("Failed to read from stdin: {}", err);
            }
        }
    })?;

    for (name, err) in &report.failed {
        log::warn!("Skipped {}: {}", name, err);
    }
    log::info!(
        "{} applied, {} disabled, {} failed",
        report.applied.len(),
        report.disabled.len(),
        report.failed.len()
    );

    save(&args.output, session)
}

fn run_find(args: FindArgs, strategy: ScanStrategy) -> anyhow::Result<()> {
    let session = Session::new(load(&args.input)?).with_strategy(strategy);
    let pattern =
        Pattern::parse(&args.pattern, args.kind).context("Failed to parse search string")?;

    let offsets = session.find(&pattern, max_hits(args.maximum_hits));
    if offsets.is_empty() {
        return Err(Error::NoMatchFound.into());
    }
    for offset in offsets {
        println!("0x{:X}", offset);
    }
    Ok(())
}
