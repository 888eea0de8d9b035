use clap::Parser;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "oe", version, long_about = None)]
#[command(about = "Enter a per-project development sandbox on LXD")]
#[command(
    after_help = "With no COMMAND an interactive login shell is started in the current directory."
)]
pub struct Opts {
    /// Create the instance before entering it
    #[arg(long)]
    pub launch: bool,

    /// Override the configured system, e.g. noble or 24.04
    #[arg(short, long, value_name = "SYSTEM")]
    pub system: Option<String>,

    /// Log debug output to the terminal
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run in the instance instead of an interactive shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub params: Vec<String>,
}
