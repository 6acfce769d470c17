use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "grocery-price-monitor",
    about = "Competitive price monitoring across grocery quick-commerce sites"
)]
pub struct Cli {
    /// Path to the secrets/config JSON file
    #[arg(long, default_value = "configs/secrets.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape/extract Blinkit
    Blinkit(SiteArgs),
    /// Scrape/extract Zepto
    Zepto(SiteArgs),
    /// Scrape/extract Swiggy Instamart
    Swiggy(SiteArgs),
    /// Scrape/extract Dmart
    Dmart(SiteArgs),
    /// Merge, check, and package the extracted spreadsheets
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    /// Scrape product pages into raw JSON dumps
    #[arg(short = 's', long)]
    pub scrape: bool,

    /// Extract dumps into per-location xlsx files
    #[arg(short = 'e', long)]
    pub extract: bool,

    /// Ignore existing dumps and re-scrape everything
    #[arg(short = 'f', long)]
    pub force_scrape: bool,

    /// Close the browser when the batch is done
    #[arg(short = 'c', long)]
    pub close_browser_after_done: bool,

    /// Run date (YYYY-MM-DD), defaults to today
    #[arg(short = 'd', long)]
    pub date: Option<String>,
}

impl SiteArgs {
    pub fn validate(&self) -> Result<()> {
        if !(self.scrape || self.extract) {
            anyhow::bail!("No valid argument: `-s` for scrape or `-e` for extract.");
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Merge per-site outputs into the daily workbook
    #[arg(short = 'm', long)]
    pub merge: bool,

    /// Check the daily workbook for missing/invalid cells
    #[arg(short = 'k', long)]
    pub check: bool,

    /// Package the past week of daily workbooks
    #[arg(short = 'p', long)]
    pub package: bool,

    /// Run date (YYYY-MM-DD), defaults to today
    #[arg(short = 'd', long)]
    pub date: Option<String>,

    /// Days rolled into one package
    #[arg(long, default_value_t = 7)]
    pub past_days: u32,
}

impl ReportArgs {
    pub fn validate(&self) -> Result<()> {
        if !(self.merge || self.check || self.package) {
            anyhow::bail!(
                "No valid argument: `-m` for merge, `-k` for check, or `-p` for package."
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_args_parse() {
        let cli = Cli::parse_from(["gpm", "zepto", "-s", "-e", "-d", "2026-08-06"]);
        match cli.command {
            Command::Zepto(args) => {
                assert!(args.scrape);
                assert!(args.extract);
                assert!(!args.force_scrape);
                assert_eq!(args.date.as_deref(), Some("2026-08-06"));
                assert!(args.validate().is_ok());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_site_args_require_an_action() {
        let cli = Cli::parse_from(["gpm", "blinkit"]);
        match cli.command {
            Command::Blinkit(args) => assert!(args.validate().is_err()),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_report_args_parse() {
        let cli = Cli::parse_from(["gpm", "report", "-m", "-k"]);
        match cli.command {
            Command::Report(args) => {
                assert!(args.merge);
                assert!(args.check);
                assert!(!args.package);
                assert_eq!(args.past_days, 7);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
