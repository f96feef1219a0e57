use std::path::PathBuf;
use std::{env, io};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use pricewatch_apple::writer::{CsvWriterConfig, FileMode, RecordWriter};
use pricewatch_apple::{AppleScraper, AppleScraperConfig, AppleSettings};
use pricewatch_crawler::{crawl_site, CrawlerConfig, OnError};
use tokio::runtime;

/// Apple store product pages crawler
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "filter")]
    Filter(FilterArgs),
    #[clap(hide = true)]
    Completion,
}

#[derive(Debug, clap::Args)]
pub struct ScraperArgs {
    /// Optional scraper yaml configuration file
    #[clap(env = "PRICEWATCH_SCRAPER_CONFIG", parse(from_os_str), long)]
    pub scraper_config: Option<PathBuf>,
    /// Override the sitemap to start from
    #[clap(long)]
    pub sitemap_url: Option<String>,
    /// Override the URL prefix of product pages
    #[clap(long)]
    pub prefix: Option<String>,
    /// Override the minimum number of `/` separated segments of product pages
    #[clap(long)]
    pub min_segments: Option<usize>,
}

impl TryFrom<&ScraperArgs> for AppleSettings {
    type Error = anyhow::Error;

    fn try_from(args: &ScraperArgs) -> Result<Self, Self::Error> {
        let mut settings = if let Some(path) = &args.scraper_config {
            serde_yaml::from_reader(fs_err::File::open(path)?)?
        } else {
            AppleSettings::default()
        };
        if let Some(sitemap_url) = &args.sitemap_url {
            settings.sitemap_url = sitemap_url.to_string();
        }
        if let Some(prefix) = &args.prefix {
            settings.filter.prefix = prefix.to_string();
        }
        if let Some(min_segments) = args.min_segments {
            settings.filter.min_segments = min_segments;
        }
        Ok(settings)
    }
}

/// Crawl the sitemap and record product pages
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    #[clap(flatten)]
    pub scraper: ScraperArgs,
    /// Path to the csv output file, records go to stdout when missing
    #[clap(parse(from_os_str), long, short)]
    pub output_file: Option<PathBuf>,
    /// How to open an existing output file
    #[clap(arg_enum, long, default_value = "create-new")]
    pub file_mode: FileMode,
    /// Csv field delimiter
    #[clap(long, default_value = ",")]
    pub delimiter: char,
    /// Csv escape character for quotes, quotes are doubled when missing
    #[clap(long)]
    pub escape: Option<char>,
    /// Allow csv records of varying lengths
    #[clap(long)]
    pub flexible: bool,
    /// Optional crawler yaml configuration file
    #[clap(env = "PRICEWATCH_CRAWLER_CONFIG", parse(from_os_str), long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// Override crawler's page buffer size
    #[clap(long)]
    pub page_buffer: Option<usize>,
    /// Override crawler's maximum concurrent page downloads
    #[clap(long)]
    pub concurrent_downloads: Option<usize>,
    /// Override crawler's number of CPU workers used to scrap pages
    #[clap(long)]
    pub num_workers: Option<usize>,
    /// No SIGINT handling
    #[clap(long)]
    pub no_sigint: bool,
    /// Override crawler's download error handling strategy
    #[clap(arg_enum, long)]
    pub on_dl_error: Option<OnError>,
    /// Override crawler's xml error handling strategy
    #[clap(arg_enum, long)]
    pub on_xml_error: Option<OnError>,
    /// Override crawler's scrap error handling strategy
    #[clap(arg_enum, long)]
    pub on_scrap_error: Option<OnError>,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(path) = &args.crawler_config {
            serde_yaml::from_reader(fs_err::File::open(path)?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(page_buffer) = args.page_buffer {
            conf.page_buffer = page_buffer;
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            conf.concurrent_downloads = concurrent_downloads;
        }
        if let Some(num_workers) = args.num_workers {
            conf.num_workers = num_workers;
        }
        if let Some(on_dl_error) = args.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
        if let Some(on_xml_error) = args.on_xml_error {
            conf.on_xml_error = on_xml_error;
        }
        if let Some(on_scrap_error) = args.on_scrap_error {
            conf.on_scrap_error = on_scrap_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

impl From<&CrawlArgs> for CsvWriterConfig {
    fn from(args: &CrawlArgs) -> Self {
        Self {
            delimiter: args.delimiter,
            escape: args.escape,
            flexible: args.flexible,
            ..Default::default()
        }
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_conf = CrawlerConfig::try_from(&args)?;
    let settings = AppleSettings::try_from(&args.scraper)?;
    log::info!(
        "Crawling {} product pages from {}",
        settings.brand,
        settings.sitemap_url
    );

    let csv_conf = CsvWriterConfig::from(&args);
    let (tx_record, writer) =
        RecordWriter::spawn(&csv_conf, args.output_file.as_deref(), args.file_mode)?;
    let scraper_conf = AppleScraperConfig {
        settings,
        tx_record,
    };

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let res = rt.block_on(crawl_site::<AppleScraper>(&crawler_conf, &scraper_conf));
    drop(scraper_conf);

    let written = writer.finish()?;
    log::info!("Wrote {written} records");
    res?;

    Ok(())
}

/// Print the product pages listed in a sitemap
#[derive(Debug, clap::Args)]
pub struct FilterArgs {
    #[clap(flatten)]
    pub scraper: ScraperArgs,
    /// A local sitemap file, the configured sitemap is downloaded when missing
    #[clap(parse(from_os_str), long)]
    pub file: Option<PathBuf>,
}

pub fn filter(args: FilterArgs) -> anyhow::Result<()> {
    let settings = AppleSettings::try_from(&args.scraper)?;

    let xml = if let Some(path) = &args.file {
        fs_err::read_to_string(path)?
    } else {
        reqwest::blocking::ClientBuilder::new()
            .gzip(true)
            .build()?
            .get(&settings.sitemap_url)
            .send()?
            .error_for_status()?
            .text()?
    };

    for url in sitemap_urls(&settings, &xml) {
        println!("{url}");
    }

    Ok(())
}

/// Variant pages of a sitemap, none when it can't be read
fn sitemap_urls(settings: &AppleSettings, xml: &str) -> Vec<String> {
    settings.sitemap_urls(xml).unwrap_or_else(|e| {
        log::error!("Couldn't read sitemap {}: {e}", settings.sitemap_url);
        vec![]
    })
}

fn init_logger() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var(
            "RUST_LOG",
            "pricewatch=info,pricewatch_apple=info,pricewatch_crawler=info",
        );
    }
    env_logger::init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logger();
            }
            crawl(args)
        }
        SubCommand::Filter(args) => {
            init_logger();
            filter(args)
        }
        SubCommand::Completion => {
            generate(
                Shell::Bash,
                &mut Args::command(),
                "pricewatch",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}
