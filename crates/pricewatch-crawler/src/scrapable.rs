use crate::request::RequestProfile;
use crate::sitemap::Sitemap;

pub trait Scrapable {
    type Config: Clone + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// The sitemap the crawl starts from
    fn sitemap(&self) -> &str;

    /// Headers and cookies sent along with every page request
    fn request_profile(&self) -> RequestProfile {
        RequestProfile::default()
    }

    fn accept(&self, url: &str, ctx: &CrawlingContext) -> bool;

    fn scrap(&mut self, page: String, ctx: ScrapingContext) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct CrawlingContext {
    sitemap: Sitemap,
    sitemap_url: String,
}

impl CrawlingContext {
    pub fn new(sitemap: Sitemap, sitemap_url: impl Into<String>) -> Self {
        Self {
            sitemap,
            sitemap_url: sitemap_url.into(),
        }
    }

    pub fn sitemap(&self) -> Sitemap {
        self.sitemap
    }

    pub fn sitemap_url(&self) -> &str {
        &self.sitemap_url
    }
}

#[derive(Debug, Clone)]
pub struct ScrapingContext {
    url: String,
}

impl ScrapingContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Final URL of the page, after redirects
    pub fn url(&self) -> &str {
        &self.url
    }
}
