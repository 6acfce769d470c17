pub mod extract;
pub mod scrape;

pub use extract::{ExtractBatcher, RefMrpLoader};
pub use scrape::ScrapeBatcher;

use anyhow::Result;

use crate::config::Config;
use crate::models::Site;
use crate::sites::{BlinkitDriver, DmartDriver, SiteDriver, SwiggyDriver, ZeptoDriver};

pub fn make_driver(site: Site, config: &Config) -> Result<Box<dyn SiteDriver>> {
    let browser = config.browser.clone();
    let settings = config.site(site)?.clone();
    Ok(match site {
        Site::Blinkit => Box::new(BlinkitDriver::new(browser, settings)),
        Site::Zepto => Box::new(ZeptoDriver::new(browser, settings)),
        Site::Swiggy => Box::new(SwiggyDriver::new(browser, settings)),
        Site::Dmart => Box::new(DmartDriver::new(browser, settings)),
    })
}
