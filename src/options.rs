use std::path::PathBuf;
use structopt::{clap::arg_enum, StructOpt};

arg_enum! {
    #[derive(Debug)]
    pub enum LogFormat {
        Text,
        Compact,
        Json
    }
}

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Always-on video surveillance supervisor for single-host deployments.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Options {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        default_value = "info,hyper=warn,warp=warn,reqwest=warn",
        env = "RUST_LOG",
        value_name = "level"
    )]
    pub log: String,

    /// Formatting style for log outputs
    #[structopt(long, env, possible_values = &LogFormat::variants(), case_insensitive = true, default_value = "Compact")]
    pub log_format: LogFormat,

    /// Path of the YAML configuration document
    #[structopt(long, env = "CONFIG", default_value = "./config.yaml")]
    pub config: PathBuf,

    /// Path of the persisted key/value store
    #[structopt(long, env = "DB", default_value = "./vigilantpi.db.json")]
    pub db: PathBuf,

    /// Log file surfaced by the admin page and the notification surface
    #[structopt(long, env = "LOG")]
    pub log_file: Option<PathBuf>,
}
