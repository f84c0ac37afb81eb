use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use maia_serve::{Backend, session::Mode, shakmaty::Color};

#[derive(Parser)]
#[command(name = "maia-serve")]
#[command(about = "Maia2 move predictions: HTTP API, interactive session, model download.")]
pub(crate) struct Cli {
    /// TOML config file; flags override its values.
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Directory holding maia_rapid.onnx / maia_blitz.onnx.
    #[arg(long, global = true)]
    pub(crate) model_dir: Option<PathBuf>,

    /// ONNX backend used to run the network.
    #[arg(long, global = true, value_enum)]
    pub(crate) backend: Option<BackendArg>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum BackendArg {
    Tract,
    Candle,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Tract => Backend::Tract,
            BackendArg::Candle => Backend::Candle,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ModeArg {
    /// Print suggestions only.
    Assist,
    /// Maia2 plays one side.
    Play,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Assist => Mode::Assist,
            ModeArg::Play => Mode::Play,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ColorArg {
    White,
    Black,
}

impl From<ColorArg> for Color {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::White => Color::White,
            ColorArg::Black => Color::Black,
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve /analyze, /health and the /api/* routes.
    Serve {
        /// Listen address (default from config: 0.0.0.0:5000)
        #[arg(long)]
        bind: Option<String>,

        /// Variant used when a request does not name one (rapid or blitz)
        #[arg(long)]
        model_type: Option<String>,

        /// cpu or gpu
        #[arg(long)]
        device: Option<String>,

        /// Load the default variant before accepting requests
        #[arg(long)]
        preload: bool,
    },
    /// Interactive session in the terminal.
    Play {
        #[arg(long, value_enum, default_value_t = ModeArg::Assist)]
        mode: ModeArg,

        /// Side played by Maia2 in play mode
        #[arg(long, value_enum, default_value_t = ColorArg::Black)]
        ai_color: ColorArg,

        #[arg(long, default_value_t = 1500, allow_negative_numbers = true)]
        white_elo: i64,

        #[arg(long, default_value_t = 1500, allow_negative_numbers = true)]
        black_elo: i64,

        /// rapid or blitz
        #[arg(long)]
        model_type: Option<String>,

        /// cpu or gpu
        #[arg(long)]
        device: Option<String>,

        /// Number of suggestions shown
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        top_k: i64,
    },
    /// Download a variant's ONNX artifact into the model directory.
    Fetch {
        /// rapid or blitz
        #[arg(long, default_value = "rapid")]
        model_type: String,

        /// Override the download URL
        #[arg(long)]
        url: Option<String>,

        /// Download even if the file exists
        #[arg(long)]
        force: bool,
    },
}
