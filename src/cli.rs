//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use crawler_core::{DEFAULT_CACHE_DIR, DEFAULT_QPS};

/// Fetch a batch of pages through the crawler's cache and rate limiter.
///
/// Prints a JSON object mapping each URL to its page body (or null when the
/// page could not be fetched).
#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Folder where downloaded pages are cached. Delete it to drop the cache.
    #[arg(long = "cache", value_name = "DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Do not read or write the page cache
    #[arg(long, conflicts_with = "cache_dir")]
    pub no_cache: bool,

    /// Maximum requests per second, also the in-flight request limit (1-1000)
    #[arg(long, default_value_t = DEFAULT_QPS, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub qps: u32,

    /// Give up on a page after this many HTTP 429 retries (default: never give up)
    #[arg(long, value_name = "N")]
    pub max_throttle_retries: Option<u32>,

    /// URLs to fetch (reads one per line from stdin when omitted)
    pub urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["crawler"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.cache_dir, PathBuf::from("cache"));
        assert!(!args.no_cache);
        assert_eq!(args.qps, 10);
        assert_eq!(args.max_throttle_retries, None);
        assert!(args.urls.is_empty());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["crawler", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["crawler", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["crawler", "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_cache_dir_flag() {
        let args = Args::try_parse_from(["crawler", "--cache", "/tmp/pages"]).unwrap();
        assert_eq!(args.cache_dir, PathBuf::from("/tmp/pages"));
    }

    #[test]
    fn test_cli_no_cache_conflicts_with_cache_dir() {
        let result = Args::try_parse_from(["crawler", "--no-cache", "--cache", "x"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn test_cli_qps_range_enforced() {
        assert!(Args::try_parse_from(["crawler", "--qps", "0"]).is_err());
        assert!(Args::try_parse_from(["crawler", "--qps", "1001"]).is_err());
        let args = Args::try_parse_from(["crawler", "--qps", "1"]).unwrap();
        assert_eq!(args.qps, 1);
    }

    #[test]
    fn test_cli_positional_urls() {
        let args =
            Args::try_parse_from(["crawler", "https://a.org/1", "https://a.org/2"]).unwrap();
        assert_eq!(args.urls, vec!["https://a.org/1", "https://a.org/2"]);
    }

    #[test]
    fn test_cli_max_throttle_retries() {
        let args = Args::try_parse_from(["crawler", "--max-throttle-retries", "5"]).unwrap();
        assert_eq!(args.max_throttle_retries, Some(5));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["crawler", "--help"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
