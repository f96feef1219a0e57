use std::future::Future;
use std::io::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Error, Result};
use flate2::read::GzDecoder;
use futures::{future, try_join, StreamExt};
use lazy_static::lazy_static;
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::config::{CrawlerConfig, OnError};
use crate::scrapable::{Scrapable, ScrapingContext};
use crate::sitemap::filter_sitemap;

lazy_static! {
    static ref HTTP_CLI: reqwest::Client = reqwest::ClientBuilder::new()
        .gzip(true)
        .deflate(true)
        .build()
        .unwrap();
}

/// Counters of a finished crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Pages retained from the sitemap
    pub queued: usize,
    pub downloaded: usize,
    pub scrapped: usize,
}

async fn gather_urls<T>(
    config: &CrawlerConfig,
    scraper: &T,
    sitemap_url: &str,
) -> Result<Vec<String>>
where
    T: Scrapable,
{
    let Page {
        page: sitemap_xml, ..
    } = match download(config, sitemap_url, &HeaderMap::new()).await {
        Ok(page) => page,
        Err(e) => match config.on_dl_error {
            OnError::SkipAndLog => {
                log::error!("Skipping sitemap: {sitemap_url} got: {e:#}");
                return Ok(vec![]);
            }
            OnError::Fail => return Err(e),
        },
    };

    match filter_sitemap(&sitemap_xml, sitemap_url, |url, ctx| scraper.accept(url, ctx)) {
        Ok(urls) => Ok(urls),
        Err(e) => match config.on_xml_error {
            OnError::SkipAndLog => {
                log::error!("{e}");
                log::error!("Skipping XML: {sitemap_url}, no sitemap data found");
                Ok(vec![])
            }
            OnError::Fail => Err(anyhow!("Couldn't process {sitemap_url} got: {e}")),
        },
    }
}

#[derive(Debug, Clone)]
struct Page {
    page: String,
    url: String,
}

async fn download(config: &CrawlerConfig, url: &str, headers: &HeaderMap) -> Result<Page> {
    let resp = HTTP_CLI
        .get(url)
        .header(USER_AGENT, &config.user_agent)
        .headers(headers.clone())
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .with_context(|| format!("Couldn't download {url}"))?;

    let url = resp.url().to_string();
    let page = match resp.headers().get(CONTENT_TYPE) {
        Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
            let compressed = resp.bytes().await?;
            let mut gz = GzDecoder::new(&compressed[..]);
            let mut page = String::new();
            gz.read_to_string(&mut page)?;
            page
        }
        _ => resp.text().await?,
    };

    Ok(Page { page, url })
}

fn until_err<T, E>(
    err: &mut &mut Result<(), E>,
    item: Result<T, E>,
) -> impl Future<Output = Option<T>> {
    match item {
        Ok(item) => future::ready(Some(item)),
        Err(e) => {
            **err = Err(e);
            future::ready(None)
        }
    }
}

pub async fn crawl_site<T>(
    crawler_conf: &CrawlerConfig,
    scraper_conf: &T::Config,
) -> anyhow::Result<CrawlStats>
where
    T: Scrapable + 'static,
{
    let queued = Arc::new(AtomicUsize::new(0));
    let downloaded = Arc::new(AtomicUsize::new(0));
    let scrapped = Arc::new(AtomicUsize::new(0));

    let scraper = <T as Scrapable>::new(scraper_conf)?;
    let headers = scraper.request_profile().header_map()?;

    let (tx_url, rx_url) = mpsc::unbounded_channel::<String>();
    let (tx_page, rx_page) = crossbeam_channel::bounded::<Page>(crawler_conf.page_buffer);

    // Workers

    let mut workers = vec![];
    for id in 0..crawler_conf.num_workers.max(1) {
        let rx_page = rx_page.clone();
        let scrapped = scrapped.clone();
        let scraper_conf = scraper_conf.clone();
        let on_scrap_error = crawler_conf.on_scrap_error;
        let worker = thread::Builder::new()
            .name(format!("scraper-{id}"))
            .spawn(move || {
                let mut scraper = <T as Scrapable>::new(&scraper_conf)?;
                for Page { page, url } in rx_page.into_iter() {
                    match scraper.scrap(page, ScrapingContext::new(url.as_str())) {
                        Ok(()) => {
                            scrapped.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => match on_scrap_error {
                            OnError::SkipAndLog => {
                                log::error!("Skipping scrap for page {url} got: {e}");
                            }
                            OnError::Fail => {
                                return Err(e.context(format!("Couldn't scrap {url}")));
                            }
                        },
                    }
                }
                Ok::<(), Error>(())
            })?;
        workers.push(worker);
    }
    drop(rx_page);

    let workers = async move {
        tokio::task::spawn_blocking(move || {
            for w in workers {
                w.join().map_err(|_| anyhow!("Scraper worker panicked"))??;
            }
            Ok::<(), Error>(())
        })
        .await?
    };

    // Downloader

    let downloaded_c = downloaded.clone();
    let downloader = async move {
        let headers = &headers;
        let downloaded = &downloaded_c;
        let stream = UnboundedReceiverStream::new(rx_url)
            .map(|url| async move { download(crawler_conf, &url, headers).await })
            .buffer_unordered(crawler_conf.concurrent_downloads.max(1))
            .inspect(|dl| {
                if dl.is_ok() {
                    downloaded.fetch_add(1, Ordering::SeqCst);
                }
            });

        match crawler_conf.on_dl_error {
            OnError::Fail => {
                let mut err = Ok::<(), Error>(());
                stream
                    .scan(&mut err, until_err)
                    .map(|page| tx_page.send(page).ok())
                    .collect::<Vec<_>>()
                    .await;
                err
            }
            OnError::SkipAndLog => {
                stream
                    .filter_map(|dl| async move {
                        dl.map_err(|e| log::error!("Skipping URL: {e:#}")).ok()
                    })
                    .map(|page| tx_page.send(page).ok())
                    .collect::<Vec<_>>()
                    .await;
                Ok(())
            }
        }
    };

    // Crawler

    let queued_c = queued.clone();
    let crawler = async move {
        let sitemap_url = scraper.sitemap().to_string();
        log::info!("Fetching sitemap {sitemap_url}");
        let urls = gather_urls(crawler_conf, &scraper, &sitemap_url).await?;
        log::info!("Fetching {} pages from {sitemap_url}", urls.len());
        for url in urls {
            match tx_url.send(url) {
                Ok(()) => {
                    queued_c.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => log::error!("Couldn't queue URL: {e}"),
            }
        }
        drop(tx_url);
        Ok::<(), Error>(())
    };

    // Run all tasks

    let run = async move { try_join!(workers, downloader, crawler) };
    if crawler_conf.handle_sigint {
        tokio::select! {
            res = run => { res?; }
            Ok(()) = tokio::signal::ctrl_c() => return Err(anyhow!("Interrupted")),
        }
    } else {
        run.await?;
    }

    let stats = CrawlStats {
        queued: queued.load(Ordering::SeqCst),
        downloaded: downloaded.load(Ordering::SeqCst),
        scrapped: scrapped.load(Ordering::SeqCst),
    };
    log::info!(
        "Crawl done: {} queued, {} downloaded, {} scrapped",
        stats.queued,
        stats.downloaded,
        stats.scrapped
    );

    Ok(stats)
}
