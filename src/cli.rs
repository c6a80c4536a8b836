use clap::Parser;

#[derive(Parser)]
#[command(
    name = "glyph-smoke",
    about = "End-to-end signup smoke test for the Glyph unified-ID widget"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Override the page hosting the signup widget
    #[arg(long)]
    pub base_url: Option<String>,

    /// Mailbox strategy: webmail or api
    #[arg(long)]
    pub mailbox: Option<String>,

    /// Override the OTP poll attempt budget
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Override the OTP poll interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Run with a visible browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for failure screenshots
    #[arg(long)]
    pub artifact_dir: Option<String>,
}
