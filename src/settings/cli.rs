use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Idempotent payments and rotating refresh sessions")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
}
