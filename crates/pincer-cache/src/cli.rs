#![cfg(feature = "clap")]

use std::io;
use std::path::PathBuf;

use clap::Parser;

use crate::{Cache, user_cache_dir};

#[derive(Parser, Debug, Clone)]
pub struct CacheArgs {
    /// Avoid reading from or writing to the cache.
    #[arg(global = true, long, short, env = "PINCER_NO_CACHE", value_parser = clap::builder::BoolishValueParser::new())]
    pub no_cache: bool,

    /// Path to the cache directory.
    #[arg(global = true, long, env = "PINCER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl TryFrom<CacheArgs> for Cache {
    type Error = io::Error;

    /// Prefer, in order:
    /// 1. A temporary cache directory, if the user requested `--no-cache`.
    /// 2. The specific cache directory specified by the user via `--cache-dir` or `PINCER_CACHE_DIR`.
    /// 3. The system-appropriate cache directory.
    /// 4. A `.pincer_cache` directory in the current working directory.
    ///
    /// Returns an absolute cache dir.
    fn try_from(value: CacheArgs) -> Result<Self, Self::Error> {
        if value.no_cache {
            Self::temp()
        } else if let Some(cache_dir) = value.cache_dir {
            Self::from_path(cache_dir)
        } else if let Some(cache_dir) = user_cache_dir() {
            Self::from_path(cache_dir)
        } else {
            Self::from_path(".pincer_cache")
        }
    }
}
