use clap::{Parser, Subcommand};
use scummpack::archive::{self, PackOptions};
use scummpack::grammar::GrammarId;
use scummpack::index::{ROOM_DISK, ROOM_FILE, ROOM_OFFSET};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "scummpack", about = "Unpack SCUMM resource files into an editable tree and pack them back")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an index file and its data files into a directory tree
    Unpack {
        /// Grammar: v4, v5, v6, v7
        #[arg(short, long)]
        grammar: GrammarId,
        /// Index file (000.LFL, <game>.000, <game>.LA0)
        input: PathBuf,
        /// Output directory; must not exist or be empty
        output: PathBuf,
    },
    /// Encode a directory tree back into game files
    Pack {
        /// Grammar override; defaults to the one recorded in the manifest
        #[arg(short, long)]
        grammar: Option<GrammarId>,
        /// Base file name override, e.g. MONKEY2
        #[arg(short, long)]
        name: Option<String>,
        /// Tree produced by `unpack`
        input: PathBuf,
        /// Directory to write the game files into
        output: PathBuf,
    },
    /// Decode only the index file and summarise what it maps
    Info {
        #[arg(short, long)]
        grammar: GrammarId,
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { grammar, input, output } => {
            let report = archive::unpack(grammar, &input, &output)?;
            println!("Unpacked {} data file(s) to: {}", report.disks, report.output.display());
            if report.unresolved > 0 {
                println!("  {} block(s) kept under synthetic numbers", report.unresolved);
            }
        }

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { grammar, name, input, output } => {
            let opts = PackOptions { grammar, base_name: name };
            let report = archive::pack(&input, &output, &opts)?;
            for f in &report.files {
                println!("  wrote   {}", f.display());
            }
            match report.identical {
                Some(true)  => println!("Output is byte-identical to the unpacked source"),
                Some(false) => println!("Output differs from the unpacked source"),
                None        => println!("No manifest; nothing to compare against"),
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { grammar, input } => {
            let (root, map) = archive::read_index(grammar, &input)?;

            println!("── Index file ───────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Grammar        {}", grammar);
            println!("  Blocks         {}", root.len());
            for name in map.names() {
                if name == ROOM_FILE || name == ROOM_OFFSET {
                    continue;
                }
                println!("  {:<14} {} entries", name, map.len(name));
            }
            println!("  Rooms:");
            for (room, disk) in map.items(ROOM_DISK) {
                println!("    room {:>3}  disk {}", room.major, disk);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}
