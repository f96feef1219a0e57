mod filter;
mod scraper;
pub mod writer;

pub use filter::VariantFilter;
pub use scraper::{AppleScraper, AppleScraperConfig, AppleSettings, ProductUrlRecord};

pub use pricewatch_crawler;
