//! Command line and environment configuration for the server.

use clap::Parser;
use gradeview_common::cache::MemoryCache;
use gradeview_common::collector::Collector;
use gradeview_common::file_store::FileStore;
use gradeview_common::pipeline::{Pipeline, Stage};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1", env = "GRADEVIEW_ADDRESS")]
    pub address: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3000, env = "GRADEVIEW_PORT")]
    pub port: u16,

    /// Directory holding the `analysis/` and `grades/` folders
    #[arg(long, default_value = ".", env = "GRADEVIEW_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Directory of static assets served alongside the dashboard
    #[arg(long, default_value = "public", env = "GRADEVIEW_STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Student to show when a request does not name one
    #[arg(long, env = "GRADEVIEW_DEFAULT_STUNO")]
    pub default_stuno: Option<String>,

    /// Hide the per-semester rank panel on the dashboard
    #[arg(long, env = "GRADEVIEW_HIDE_RANKS")]
    pub hide_ranks: bool,

    /// Command that scrapes a student's grades (the student number is appended)
    #[arg(long, default_value = "node index.js", env = "GRADEVIEW_COLLECT_COMMAND")]
    pub collect_command: String,

    /// Command that analyses the scraped grades (the student number is appended)
    #[arg(long, default_value = "node analyze.js", env = "GRADEVIEW_ANALYZE_COMMAND")]
    pub analyze_command: String,

    /// Working directory for the collection commands (defaults to the data directory)
    #[arg(long, env = "GRADEVIEW_SCRIPTS_DIR")]
    pub scripts_dir: Option<PathBuf>,

    /// Give up on a collection command after this many seconds (0 waits forever)
    #[arg(long, default_value_t = 600, env = "GRADEVIEW_STAGE_TIMEOUT")]
    pub stage_timeout: u64,

    /// Number of students whose analysis is kept in memory
    #[arg(long, default_value_t = 256, env = "GRADEVIEW_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Drop cached analysis after this many seconds (0 keeps it until evicted)
    #[arg(long, default_value_t = 0, env = "GRADEVIEW_CACHE_TTL")]
    pub cache_ttl: u64,
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl Cli {
    pub fn pipeline(&self) -> Result<Pipeline, String> {
        let collect = Stage::from_command_line("collection", &self.collect_command)
            .ok_or("collect command must not be empty")?;
        let analyze = Stage::from_command_line("analysis", &self.analyze_command)
            .ok_or("analyze command must not be empty")?;
        let working_dir = self
            .scripts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone());
        Ok(Pipeline::new(
            vec![collect, analyze],
            working_dir,
            seconds(self.stage_timeout),
        ))
    }

    pub fn collector(&self) -> Result<Collector, String> {
        Ok(Collector::new(
            FileStore::new(&self.data_dir),
            Box::new(MemoryCache::new(self.cache_capacity, seconds(self.cache_ttl))),
            self.pipeline()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["gradeview"]);
        assert_eq!(cli.port, 3000);
        assert!(cli.default_stuno.is_none());
        assert!(!cli.hide_ranks);

        let pipeline = cli.pipeline().unwrap();
        let stages = pipeline.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "collection");
        assert_eq!(stages[0].program, "node");
        assert_eq!(stages[0].args, vec!["index.js"]);
        assert_eq!(stages[1].args, vec!["analyze.js"]);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let cli = Cli::parse_from(["gradeview", "--collect-command", " "]);
        assert!(cli.pipeline().is_err());
    }

    #[test]
    fn test_zero_means_no_limit() {
        assert_eq!(seconds(0), None);
        assert_eq!(seconds(30), Some(Duration::from_secs(30)));
    }
}
