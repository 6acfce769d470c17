use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

mod batch;
mod browser;
mod cli;
mod config;
mod dump;
mod error;
mod excel;
mod models;
mod sites;
mod utils;

use crate::batch::{make_driver, ExtractBatcher, ScrapeBatcher};
use crate::cli::{Cli, Command, ReportArgs, SiteArgs};
use crate::config::Config;
use crate::excel::{DailyMerger, ExcelChecker, SkuWorkbook, WeeklyPackager};
use crate::models::Site;
use crate::utils::dates::{date_str, resolve_date};
use crate::utils::retry::Retrier;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grocery_price_monitor=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match &cli.command {
        Command::Blinkit(args) => run_site(Site::Blinkit, args, &config).await,
        Command::Zepto(args) => run_site(Site::Zepto, args, &config).await,
        Command::Swiggy(args) => run_site(Site::Swiggy, args, &config).await,
        Command::Dmart(args) => run_site(Site::Dmart, args, &config).await,
        Command::Report(args) => run_report(args, &config),
    }
}

async fn run_site(site: Site, args: &SiteArgs, config: &Config) -> Result<()> {
    args.validate()?;
    let date = date_str(resolve_date(args.date.as_deref())?);
    let sku = SkuWorkbook::load(&config.sku_workbook)?;
    let links = sku.product_links(site);

    if args.scrape {
        info!("Scraping {} ({} links)", site.key(), links.len());
        let retrier = Retrier::new(
            config.batch.outer_retries,
            Duration::from_secs(config.batch.outer_interval_secs),
        );
        retrier
            .run(|| run_scrape_batch(site, args, config, &date, &links))
            .await?;
    }

    if args.extract {
        info!("Extracting {} dumps for {}", site.key(), date);
        ExtractBatcher::new(config, site, &date).run(&sku)?;
    }
    Ok(())
}

/// One full scrape pass. On failure the browser tabs are torn down before the
/// error reaches the outer retrier, which restarts the (idempotent) batch.
async fn run_scrape_batch(
    site: Site,
    args: &SiteArgs,
    config: &Config,
    date: &str,
    links: &[Option<String>],
) -> Result<()> {
    let driver = make_driver(site, config)?;
    let mut batcher = ScrapeBatcher::new(
        config,
        driver,
        date,
        !args.force_scrape,
        args.close_browser_after_done,
    )?;
    match batcher.run(links).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Scrape batch failed: {}", e);
            warn!("Closing tabs ...");
            sleep(Duration::from_secs(5)).await;
            batcher.close().await;
            Err(e)
        }
    }
}

fn run_report(args: &ReportArgs, config: &Config) -> Result<()> {
    args.validate()?;
    let date = resolve_date(args.date.as_deref())?;

    if args.merge {
        let merger = DailyMerger::new(config, date);
        let path = merger.merge()?;
        info!("Merged daily workbook: {}", path.display());
    }

    if args.check {
        let checker = ExcelChecker::new(config, date);
        let issues = checker.check()?;
        if !issues.is_empty() {
            warn!("{} issues found, see the check log", issues.len());
        }
    }

    if args.package {
        let packager = WeeklyPackager::new(config, date, args.past_days);
        let path = packager.package()?;
        info!("Packaged weekly workbook: {}", path.display());
    }
    Ok(())
}
