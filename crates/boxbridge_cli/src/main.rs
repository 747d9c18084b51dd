use std::path::{Path, PathBuf};
use std::process;

use boxbridge_core::enumerate::DiscoveryMode;
use boxbridge_core::library::{LibrarySearch, ProviderLibrary, resolve_library};
use boxbridge_core::model::Coordinate;
use boxbridge_core::mutate::{Acknowledgement, Origin};
use boxbridge_core::report::ReadOptions;
use boxbridge_core::{CoreError, CoreErrorCode, Engine, require_source};
use boxbridge_render::{
    JsonStyle, TextRenderOptions, TextStyle, render_acknowledgement, render_json,
    render_text_with_options,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV_VAR: &str = "BOXBRIDGE_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";
const QUARANTINE_BOX: usize = 17;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the party and every occupied box slot.
    Read {
        #[arg(value_name = "SAVE")]
        path: PathBuf,
        #[arg(long, value_name = "PATH")]
        library: Option<PathBuf>,
        /// Only enumerate this box.
        #[arg(long = "box", value_name = "N")]
        only_box: Option<usize>,
        #[arg(
            long,
            value_name = "auto|prop|m0|m1|m2",
            default_value = "auto",
            value_parser = parse_mode
        )]
        mode: DiscoveryMode,
        #[arg(long)]
        json: bool,
        /// Include stat spreads and moves in the text listing.
        #[arg(long, conflicts_with = "json")]
        verbose: bool,
    },
    /// Move a record out of a box into the first free slot of the same save.
    Relocate {
        #[arg(long, value_name = "SAVE")]
        src: PathBuf,
        #[arg(long = "box", value_name = "N", default_value_t = QUARANTINE_BOX)]
        from_box: usize,
        #[arg(long, value_name = "N")]
        slot: usize,
        #[arg(long, value_name = "PATH")]
        library: Option<PathBuf>,
    },
    /// Move a record from one save into the first free slot of another.
    Transfer {
        #[arg(long, value_name = "SAVE")]
        src: PathBuf,
        #[arg(long, value_name = "SAVE")]
        dst: PathBuf,
        #[arg(long, value_enum)]
        kind: OriginKind,
        #[arg(long = "box", value_name = "N", default_value_t = 0)]
        from_box: usize,
        #[arg(long, value_name = "N")]
        slot: usize,
        #[arg(long, value_name = "PATH")]
        library: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OriginKind {
    Party,
    Box,
}

fn transfer_origin(kind: OriginKind, from_box: usize, slot: usize) -> Result<Origin, CoreError> {
    match kind {
        OriginKind::Party => Ok(Origin::Roster(slot)),
        OriginKind::Box => {
            Coordinate::try_slot(from_box, slot)?;
            Ok(Origin::Container {
                container: from_box,
                position: slot,
            })
        }
    }
}

fn parse_mode(raw: &str) -> Result<DiscoveryMode, String> {
    raw.parse()
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let outcome = match cli.command {
        Command::Read {
            path,
            library,
            only_box,
            mode,
            json,
            verbose,
        } => run_read(
            &path,
            library,
            ReadOptions {
                mode,
                only_container: only_box,
            },
            json,
            TextRenderOptions { verbose },
        ),
        Command::Relocate {
            src,
            from_box,
            slot,
            library,
        } => Coordinate::try_slot(from_box, slot)
            .and_then(|from| run_relocate(&src, from, library)),
        Command::Transfer {
            src,
            dst,
            kind,
            from_box,
            slot,
            library,
        } => {
            transfer_origin(kind, from_box, slot)
                .and_then(|origin| run_transfer(&src, &dst, origin, library))
        }
    };

    if let Err(e) = outcome {
        debug!(code = ?e.code, "command failed");
        eprintln!("Error: {}", e.message);
        process::exit(exit_code(e.code));
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_engine(library: Option<PathBuf>) -> Result<Engine, CoreError> {
    let search = LibrarySearch::from_process(library);
    let path = resolve_library(&search)?;
    Ok(Engine::new(ProviderLibrary::load(&path)?))
}

fn run_read(
    path: &Path,
    library: Option<PathBuf>,
    options: ReadOptions,
    json: bool,
    text_options: TextRenderOptions,
) -> Result<(), CoreError> {
    require_source(path)?;
    let engine = load_engine(library)?;
    let session = engine.open(path)?;
    engine.check_schema(&session)?;
    let report = engine.report(&session, &options);

    if json {
        let value = render_json(&report, JsonStyle::CanonicalV1);
        let rendered = serde_json::to_string_pretty(&value).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("could not render JSON output: {e}"),
            )
        })?;
        println!("{rendered}");
    } else {
        print!(
            "{}",
            render_text_with_options(&report, TextStyle::Listing, text_options)
        );
    }
    Ok(())
}

fn run_relocate(
    src: &Path,
    from: Coordinate,
    library: Option<PathBuf>,
) -> Result<(), CoreError> {
    require_source(src)?;
    let engine = load_engine(library)?;
    let mut session = engine.open(src)?;
    let ack = engine.relocate(&mut session, from)?;
    print_acknowledgement(&ack)
}

fn run_transfer(
    src: &Path,
    dst: &Path,
    origin: Origin,
    library: Option<PathBuf>,
) -> Result<(), CoreError> {
    require_source(src)?;
    require_source(dst)?;
    let engine = load_engine(library)?;
    let mut src_session = engine.open(src)?;
    let mut dst_session = engine.open(dst)?;
    let ack = engine.transfer(&mut src_session, &mut dst_session, origin)?;
    print_acknowledgement(&ack)
}

fn print_acknowledgement(ack: &Acknowledgement) -> Result<(), CoreError> {
    let rendered = render_acknowledgement(ack).map_err(|e| {
        CoreError::new(
            CoreErrorCode::Io,
            format!("could not render acknowledgement: {e}"),
        )
    })?;
    println!("{rendered}");
    Ok(())
}

fn exit_code(code: CoreErrorCode) -> i32 {
    match code {
        CoreErrorCode::Io => 1,
        CoreErrorCode::InvalidArgument | CoreErrorCode::UnsupportedOperation => 2,
        CoreErrorCode::SourceMissing => 3,
        CoreErrorCode::LibraryNotFound | CoreErrorCode::LibraryLoad => 5,
        CoreErrorCode::ModelLoad => 6,
        CoreErrorCode::UnsupportedSchema => 7,
        CoreErrorCode::NoAccessor => 10,
        CoreErrorCode::EmptySource => 11,
        CoreErrorCode::NoFreeDestination => 12,
        CoreErrorCode::PersistenceFailed => 13,
    }
}
