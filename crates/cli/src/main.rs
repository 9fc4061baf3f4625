use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use entryfix::commands::{
    add_entry_command, fix_delay_slots_command, history_command, import_symbols_command,
    init_project_command, lookup_command, project_info_command, repair_command,
    scan_calls_command, validate_command, SymbolFormat,
};
use entryfix::init_logging;
use entryfix_core::services::RepairOverrides;
use entryfix_core::symbols::DEFAULT_LAST_SIZE;

/// Function boundary reconstruction and repair for statically recompiled MIPS binaries.
///
/// This CLI is a thin wrapper around `entryfix-core`. All substantive logic
/// lives in the library so it can be tested and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "entryfix",
    version,
    about = "Reconstruct and repair the function table of a recompiled MIPS binary",
    long_about = None
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new project at the given root.
    ///
    /// Creates `.entryfix/`, writes `.entryfix/project.json` and the database.
    InitProject {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,

        /// Input ELF image, relative to the root.
        #[arg(long)]
        binary: Option<String>,

        /// Function table path, relative to the root (`.yaml`/`.yml` selects YAML).
        #[arg(long)]
        table: Option<String>,
    },

    /// Show configuration, resolved paths and table statistics.
    ProjectInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Build the function table from a symbol source.
    ImportSymbols {
        #[arg(long, default_value = ".")]
        root: String,

        /// Symbol file: an ELF with a symbol table, or `Name = 0xADDR; // type:func` lines.
        #[arg(long)]
        source: String,

        #[arg(long, value_enum, default_value_t = SymbolFormat::Auto)]
        format: SymbolFormat,

        /// Size given to the last function.
        #[arg(long, default_value_t = DEFAULT_LAST_SIZE)]
        last_size: u32,

        /// Replace an existing table.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Make an address an entry point by splitting its function.
    AddEntry {
        #[arg(long, default_value = ".")]
        root: String,

        /// Address (0x-prefixed hex or decimal).
        address: String,
    },

    /// Print the function containing an address.
    Lookup {
        #[arg(long, default_value = ".")]
        root: String,

        address: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Check that the table is sorted, aligned, non-overlapping and gapless.
    Validate {
        #[arg(long, default_value = ".")]
        root: String,
    },

    /// Report call return addresses that are not entry points.
    ScanCalls {
        #[arg(long, default_value = ".")]
        root: String,

        /// Split at every missing target and persist.
        #[arg(long, default_value_t = false)]
        apply: bool,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Move boundaries that separate a branch from its delay slot.
    FixDelaySlots {
        #[arg(long, default_value = ".")]
        root: String,

        /// Rewrite the project's table in place.
        #[arg(long, default_value_t = false)]
        apply: bool,

        /// Write the corrected table to this path instead.
        #[arg(long)]
        output: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run the oracle-driven repair loop.
    ///
    /// Exit codes: 0 converged (or dry run), 2 stalled, 3 aborted.
    Repair {
        #[arg(long, default_value = ".")]
        root: String,

        /// Modify and persist the table; without it one invocation is made and nothing is written.
        #[arg(long, default_value_t = false)]
        apply: bool,

        #[arg(long)]
        max_iterations: Option<usize>,

        /// Wall-clock budget per run of the translated binary.
        #[arg(long)]
        timeout_seconds: Option<u64>,

        #[arg(long)]
        stall_threshold: Option<usize>,
    },

    /// List recorded repair runs.
    History {
        #[arg(long, default_value = ".")]
        root: String,

        /// Show the iterations of one run.
        #[arg(long)]
        run: Option<i64>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn run(command: Command) -> Result<u8> {
    match command {
        Command::InitProject { root, name, binary, table } => {
            init_project_command(&root, name, binary, table)?
        }
        Command::ProjectInfo { root, json } => project_info_command(&root, json)?,
        Command::ImportSymbols { root, source, format, last_size, force } => {
            import_symbols_command(&root, &source, format, last_size, force)?
        }
        Command::AddEntry { root, address } => add_entry_command(&root, &address)?,
        Command::Lookup { root, address, json } => lookup_command(&root, &address, json)?,
        Command::Validate { root } => {
            validate_command(&root)?;
        }
        Command::ScanCalls { root, apply, json } => {
            scan_calls_command(&root, apply, json)?;
        }
        Command::FixDelaySlots { root, apply, output, json } => {
            fix_delay_slots_command(&root, apply, output, json)?;
        }
        Command::Repair { root, apply, max_iterations, timeout_seconds, stall_threshold } => {
            let overrides = RepairOverrides { max_iterations, stall_threshold, timeout_seconds };
            return Ok(repair_command(&root, apply, overrides)?.exit_code());
        }
        Command::History { root, run, json } => {
            history_command(&root, run, json)?;
        }
    }
    Ok(0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
