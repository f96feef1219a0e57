use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use pricewatch_crawler::{
    filter_sitemap, CrawlingContext, RequestProfile, Scrapable, ScrapingContext, Sitemap,
    SitemapError,
};
use serde::{Deserialize, Serialize};

use crate::filter::VariantFilter;

/// The only record emitted for a product page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUrlRecord {
    pub product_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleSettings {
    #[serde(default = "default_brand")]
    pub brand: String,
    #[serde(default = "default_sitemap_url")]
    pub sitemap_url: String,
    #[serde(default)]
    pub filter: VariantFilter,
    #[serde(default = "default_request")]
    pub request: RequestProfile,
}

impl Default for AppleSettings {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            sitemap_url: default_sitemap_url(),
            filter: VariantFilter::default(),
            request: default_request(),
        }
    }
}

fn default_brand() -> String {
    String::from("Apple")
}

fn default_sitemap_url() -> String {
    String::from("https://www.apple.com/shop/sitemaps/sitemap-buy.xml")
}

fn default_request() -> RequestProfile {
    let headers = [
        ("authority", "www.apple.com"),
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
        ("accept-language", "en-US"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("upgrade-insecure-requests", "1"),
    ];
    let cookies = [("geo", "US")];

    RequestProfile {
        headers: to_map(&headers),
        cookies: to_map(&cookies),
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl AppleSettings {
    /// Only variant pages listed directly in a urlset are kept
    pub fn accept(&self, url: &str, ctx: &CrawlingContext) -> bool {
        match ctx.sitemap() {
            Sitemap::Urlset => self.filter.is_variant_page(url),
            Sitemap::Index => {
                log::debug!("Not following nested sitemap {url}");
                false
            }
        }
    }

    /// Variant pages listed in a sitemap document
    pub fn sitemap_urls(&self, xml: &str) -> Result<Vec<String>, SitemapError> {
        filter_sitemap(xml, &self.sitemap_url, |url, ctx| self.accept(url, ctx))
    }
}

#[derive(Debug, Clone)]
pub struct AppleScraperConfig {
    pub settings: AppleSettings,
    pub tx_record: Sender<ProductUrlRecord>,
}

pub struct AppleScraper {
    settings: AppleSettings,
    tx_record: Sender<ProductUrlRecord>,
}

impl Scrapable for AppleScraper {
    type Config = AppleScraperConfig;

    fn new(config: &AppleScraperConfig) -> anyhow::Result<Self> {
        Ok(Self {
            settings: config.settings.clone(),
            tx_record: config.tx_record.clone(),
        })
    }

    fn sitemap(&self) -> &str {
        &self.settings.sitemap_url
    }

    fn request_profile(&self) -> RequestProfile {
        self.settings.request.clone()
    }

    fn accept(&self, url: &str, ctx: &CrawlingContext) -> bool {
        self.settings.accept(url, ctx)
    }

    // TODO: extract model, capacity, color and price from the product page
    fn scrap(&mut self, _page: String, ctx: ScrapingContext) -> anyhow::Result<()> {
        let record = ProductUrlRecord {
            product_url: ctx.url().to_string(),
        };
        self.tx_record
            .send(record)
            .map_err(|e| anyhow::anyhow!("Couldn't send record {:?}: writer is closed", e.0))
    }
}
