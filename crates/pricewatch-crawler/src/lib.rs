mod config;
mod crawler;
mod request;
mod scrapable;
mod sitemap;

pub use config::{CrawlerConfig, OnError};
pub use crawler::{crawl_site, CrawlStats};
pub use request::RequestProfile;
pub use scrapable::{CrawlingContext, Scrapable, ScrapingContext};
pub use sitemap::{filter_sitemap, parse_sitemap, Sitemap, SitemapDocument, SitemapError};

pub use anyhow;
