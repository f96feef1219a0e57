use std::io::Write;

use crossbeam_channel::{unbounded, Sender};
use flate2::write::GzEncoder;
use flate2::Compression;
use pricewatch_crawler::{
    crawl_site, CrawlStats, CrawlerConfig, CrawlingContext, OnError, RequestProfile, Scrapable,
    ScrapingContext, Sitemap,
};

#[derive(Clone)]
struct DummyConfig {
    sitemap_url: String,
    prefix: String,
    fail_scrap: bool,
    tx_url: Sender<String>,
}

struct DummyScraper {
    config: DummyConfig,
}

impl Scrapable for DummyScraper {
    type Config = DummyConfig;

    fn new(config: &Self::Config) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
        })
    }

    fn sitemap(&self) -> &str {
        &self.config.sitemap_url
    }

    fn request_profile(&self) -> RequestProfile {
        let mut profile = RequestProfile::default();
        profile.headers.insert("pragma".into(), "no-cache".into());
        profile.cookies.insert("geo".into(), "US".into());
        profile
    }

    fn accept(&self, url: &str, ctx: &CrawlingContext) -> bool {
        ctx.sitemap() == Sitemap::Urlset
            && url.starts_with(&self.config.prefix)
            && url.split('/').count() >= 7
    }

    fn scrap(&mut self, _page: String, ctx: ScrapingContext) -> anyhow::Result<()> {
        if self.config.fail_scrap {
            anyhow::bail!("Couldn't find a price");
        }
        self.config.tx_url.send(ctx.url().to_string())?;
        Ok(())
    }
}

fn crawler_conf() -> CrawlerConfig {
    CrawlerConfig {
        num_workers: 2,
        handle_sigint: false,
        ..Default::default()
    }
}

fn urlset(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{base}/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked</loc></url>
  <url><loc>{base}/shop/buy-iphone</loc></url>
  <url><loc>{base}/shop/buy-mac/macbook-air/13-inch-midnight-m2</loc></url>
</urlset>"#
    )
}

#[tokio::test]
async fn crawl_only_accepted_pages() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let sitemap = server
        .mock("GET", "/sitemap.xml")
        .with_header("content-type", "application/xml")
        .with_body(urlset(&base))
        .create_async()
        .await;
    let variant = server
        .mock(
            "GET",
            "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked",
        )
        .match_header("cookie", "geo=US")
        .match_header("pragma", "no-cache")
        .match_header("user-agent", "PricewatchBot")
        .with_body("<html></html>")
        .expect(1)
        .create_async()
        .await;
    let category = server
        .mock("GET", "/shop/buy-iphone")
        .expect(0)
        .create_async()
        .await;
    let other = server
        .mock("GET", "/shop/buy-mac/macbook-air/13-inch-midnight-m2")
        .expect(0)
        .create_async()
        .await;

    let (tx_url, rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    drop(scraper_conf);

    assert_eq!(
        CrawlStats {
            queued: 1,
            downloaded: 1,
            scrapped: 1
        },
        stats
    );
    assert_eq!(
        vec![format!(
            "{base}/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked"
        )],
        rx_url.iter().collect::<Vec<_>>()
    );

    sitemap.assert_async().await;
    variant.assert_async().await;
    category.assert_async().await;
    other.assert_async().await;
}

#[tokio::test]
async fn redirected_page_records_final_url() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let target = format!("{base}/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight");

    server
        .mock("GET", "/sitemap.xml")
        .with_body(urlset(&base))
        .create_async()
        .await;
    let moved = server
        .mock(
            "GET",
            "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked",
        )
        .with_status(301)
        .with_header("location", &target)
        .expect(1)
        .create_async()
        .await;
    let landing = server
        .mock("GET", "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight")
        .with_body("<html></html>")
        .expect(1)
        .create_async()
        .await;

    let (tx_url, rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    drop(scraper_conf);

    assert_eq!(1, stats.scrapped);
    assert_eq!(vec![target], rx_url.iter().collect::<Vec<_>>());
    moved.assert_async().await;
    landing.assert_async().await;
}

#[tokio::test]
async fn crawl_gzipped_sitemap() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(urlset(&base).as_bytes()).unwrap();
    let compressed = gz.finish().unwrap();

    server
        .mock("GET", "/sitemap.xml.gz")
        .with_header("content-type", "application/x-gzip")
        .with_body(compressed)
        .create_async()
        .await;
    let variant = server
        .mock(
            "GET",
            "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked",
        )
        .with_body("<html></html>")
        .expect(1)
        .create_async()
        .await;

    let (tx_url, _rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml.gz"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();

    assert_eq!(1, stats.scrapped);
    variant.assert_async().await;
}

#[tokio::test]
async fn malformed_sitemap_is_skipped() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/sitemap.xml")
        .with_body("<not-xml")
        .create_async()
        .await;

    let (tx_url, _rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    assert_eq!(CrawlStats::default(), stats);

    let crawler_conf = CrawlerConfig {
        on_xml_error: OnError::Fail,
        ..crawler_conf()
    };
    let res = crawl_site::<DummyScraper>(&crawler_conf, &scraper_conf).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn missing_sitemap() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/sitemap.xml")
        .with_status(404)
        .create_async()
        .await;

    let (tx_url, _rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    assert_eq!(CrawlStats::default(), stats);

    let crawler_conf = CrawlerConfig {
        on_dl_error: OnError::Fail,
        ..crawler_conf()
    };
    let res = crawl_site::<DummyScraper>(&crawler_conf, &scraper_conf).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn failed_page_download_is_skipped() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/sitemap.xml")
        .with_body(urlset(&base))
        .create_async()
        .await;
    server
        .mock(
            "GET",
            "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked",
        )
        .with_status(503)
        .create_async()
        .await;

    let (tx_url, rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: false,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    drop(scraper_conf);

    assert_eq!(
        CrawlStats {
            queued: 1,
            downloaded: 0,
            scrapped: 0
        },
        stats
    );
    assert_eq!(0, rx_url.iter().count());
}

#[tokio::test]
async fn scrap_errors_follow_policy() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();

    server
        .mock("GET", "/sitemap.xml")
        .with_body(urlset(&base))
        .expect_at_least(1)
        .create_async()
        .await;
    server
        .mock(
            "GET",
            "/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked",
        )
        .with_body("<html></html>")
        .expect_at_least(1)
        .create_async()
        .await;

    let (tx_url, _rx_url) = unbounded();
    let scraper_conf = DummyConfig {
        sitemap_url: format!("{base}/sitemap.xml"),
        prefix: format!("{base}/shop/buy-iphone"),
        fail_scrap: true,
        tx_url,
    };

    let stats = crawl_site::<DummyScraper>(&crawler_conf(), &scraper_conf)
        .await
        .unwrap();
    assert_eq!(1, stats.downloaded);
    assert_eq!(0, stats.scrapped);

    let crawler_conf = CrawlerConfig {
        on_scrap_error: OnError::Fail,
        ..crawler_conf()
    };
    let res = crawl_site::<DummyScraper>(&crawler_conf, &scraper_conf).await;
    assert!(res.is_err());
}
