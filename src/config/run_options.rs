use std::{env, path::PathBuf};

use getopts::Options;
use tracing::warn;

use crate::config::CONFIG_FILE;

#[derive(Clone, Debug, Default)]
pub struct Args {
    pub cfg_file: PathBuf,
}

pub fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options] [config_file]", program);
    print!("{}", opts.usage(&brief));
}

/// CLI front-end: a missing or unparseable flag set is never fatal here
/// (only a malformed *config file* is, at `Config::load` time) — it just
/// falls back to the default config path with a warning.
pub fn get_args() -> Args {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let opts = Options::new();

    let default_args = Args { cfg_file: default_cfg_file() };

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            warn!("error parsing arguments: {f}");
            warn!("proceeding with defaults");
            print_usage(&program, opts);
            return default_args;
        }
    };

    match matches.free.first() {
        Some(path) => Args { cfg_file: PathBuf::from(path) },
        None => default_args,
    }
}

pub fn default_cfg_file() -> PathBuf {
    std::env::current_dir().unwrap_or_default().join(CONFIG_FILE.trim_start_matches("./"))
}
