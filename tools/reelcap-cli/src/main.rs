//! reelcap CLI: turn one video into a captioned short.
//!
//! Usage:
//!   reelcap init <NAME>              Create a new project
//!   reelcap import <PATH> <VIDEO>    Attach a source video to a project
//!   reelcap transcribe <PATH>        Recognize speech and rebuild captions
//!   reelcap captions <PATH>          List captions
//!   reelcap edit <PATH> <ACTION>     Edit caption text, timing, style, framing
//!   reelcap subtitles <PATH>         Write captions as SRT or VTT
//!   reelcap preview <PATH>           Render one composited frame
//!   reelcap export <PATH>            Export the captioned clip
//!   reelcap info <PATH>              Show project information
//!   reelcap check                    Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::edit::EditAction;

#[derive(Parser)]
#[command(
    name = "reelcap",
    about = "Burned-in captions for short vertical and horizontal clips",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new empty project
    Init {
        /// Project name
        name: String,

        /// Parent directory (defaults to the configured projects directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source video to attach right away
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Attach a source video (drops existing captions)
    Import {
        /// Path to the project directory
        path: PathBuf,

        /// Source video file
        video: PathBuf,
    },

    /// Recognize speech in the source and rebuild captions
    Transcribe {
        /// Path to the project directory
        path: PathBuf,

        /// Maximum words per caption
        #[arg(long, default_value = "4")]
        max_words: usize,

        /// Read recognizer output JSON from a file instead of running the recognizer
        #[arg(long)]
        from_json: Option<PathBuf>,
    },

    /// List captions
    Captions {
        /// Path to the project directory
        path: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit captions, style, or framing
    Edit {
        /// Path to the project directory
        path: PathBuf,

        #[command(subcommand)]
        action: EditAction,
    },

    /// Write captions as a subtitle file (.srt or .vtt)
    Subtitles {
        /// Path to the project directory
        path: PathBuf,

        /// Output file; the extension picks the format
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render a single composited frame
    Preview {
        /// Path to the project directory
        path: PathBuf,

        /// Playback time in seconds
        #[arg(short, long, default_value = "0.0")]
        time: f64,

        /// Output PNG path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render at export resolution instead of preview resolution
        #[arg(long)]
        full_size: bool,

        /// Print the draw operations as JSON instead of writing a PNG
        #[arg(long)]
        display_list: bool,
    },

    /// Export the captioned clip
    Export {
        /// Path to the project directory
        path: PathBuf,

        /// Output file path (extension follows the produced container)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Capture as fast as possible instead of in real time
        #[arg(long)]
        unpaced: bool,
    },

    /// Show project information
    Info {
        /// Path to the project directory
        path: PathBuf,
    },

    /// Check system capabilities
    Check {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = reelcap_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    reelcap_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Init {
            name,
            output,
            source,
        } => commands::init::run(&config, name, output, source),
        Commands::Import { path, video } => commands::import::run(path, video),
        Commands::Transcribe {
            path,
            max_words,
            from_json,
        } => commands::transcribe::run(&config, path, max_words, from_json).await,
        Commands::Captions { path, json } => commands::captions::run(path, json),
        Commands::Edit { path, action } => commands::edit::run(path, action),
        Commands::Subtitles { path, output } => commands::subtitles::run(path, output),
        Commands::Preview {
            path,
            time,
            output,
            full_size,
            display_list,
        } => commands::preview::run(&config, path, time, output, full_size, display_list),
        Commands::Export {
            path,
            output,
            fps,
            unpaced,
        } => commands::export::run(&config, path, output, fps, unpaced).await,
        Commands::Info { path } => commands::info::run(path),
        Commands::Check { init_config } => commands::check::run(&config, init_config),
    }
}
