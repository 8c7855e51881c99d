use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use humantime_serde::re::humantime;

#[derive(Parser)]
#[command(name = "framefetch")]
#[command(
    version,
    about = "Framefetch - Download the document linked from a page's rendered sub-frame",
    long_about = "Framefetch\n\nRenders each page URL in headless Chromium (Playwright), waits for client-side scripts, reads the named sub-frame, extracts the document-preview link and downloads it.\n\nOutput is {\"success\":true,\"data\":{\"base64\",\"size\",\"pdfUrl\"}} or {\"success\":false,\"error\"} per page."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for frame name, timeouts and browser settings; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract and download the document behind one or more pages
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(
        long = "page-url",
        value_name = "URL",
        required = true,
        help = "Page to render (repeat for a batch)"
    )]
    pub page_urls: Vec<String>,

    #[arg(long, help = "Name attribute of the sub-frame holding the link [default: mainFrame]")]
    pub frame_name: Option<String>,

    #[arg(long, value_parser = parse_duration, help = "Wait after the load event before reading frames [default: 5s]")]
    pub settle_delay: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help = "Max wait for the frame's load event (non-fatal) [default: 10s]")]
    pub frame_timeout: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help = "Hard bound for the document download [default: 30s]")]
    pub download_timeout: Option<Duration>,

    #[arg(long, value_parser = parse_duration, help = "Navigation timeout for the page itself [default: 30s]")]
    pub nav_timeout: Option<Duration>,

    #[arg(long, value_name = "N", help = "Maximum browsers alive at once [default: 1]")]
    pub max_concurrent: Option<usize>,

    #[arg(long, help = "Show the browser window")]
    pub headed: bool,

    #[arg(long, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, short, help = "Output file path (stdout if omitted)")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Also write each downloaded document to PATH/document-<n>.pdf"
    )]
    pub save_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

pub fn parse() -> Cli {
    Cli::parse()
}
