use std::path::Path;
use std::{fs, io, thread};

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::scraper::ProductUrlRecord;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvWriterConfig {
    #[serde(default = "default_csv_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub escape: Option<char>,
    #[serde(default)]
    pub flexible: bool,
    #[serde(default = "default_csv_terminator")]
    pub terminator: CsvTerminator,
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            escape: None,
            flexible: false,
            terminator: CsvTerminator::Any('\n'),
        }
    }
}

fn default_csv_delimiter() -> char {
    CsvWriterConfig::default().delimiter
}

fn default_csv_terminator() -> CsvTerminator {
    CsvWriterConfig::default().terminator
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum CsvTerminator {
    CRLF,
    Any(char),
}

impl From<CsvTerminator> for csv::Terminator {
    fn from(source: CsvTerminator) -> Self {
        match source {
            CsvTerminator::CRLF => Self::CRLF,
            CsvTerminator::Any(c) => Self::Any(c as u8),
        }
    }
}

impl From<&CsvWriterConfig> for csv::WriterBuilder {
    fn from(c: &CsvWriterConfig) -> Self {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(c.delimiter as u8);
        builder.terminator(c.terminator.into());
        builder.flexible(c.flexible);
        if let Some(escape) = c.escape {
            builder.double_quote(false);
            builder.escape(escape as u8);
        } else {
            builder.double_quote(true);
        }
        builder
    }
}

/// How an existing output file is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ArgEnum))]
pub enum FileMode {
    /// Refuse to overwrite an existing file
    #[default]
    CreateNew,
    Append,
    Truncate,
}

impl From<FileMode> for fs::OpenOptions {
    fn from(mode: FileMode) -> Self {
        let mut opts = fs::OpenOptions::new();
        match mode {
            FileMode::CreateNew => opts.write(true).create_new(true),
            FileMode::Append => opts.append(true).create(true),
            FileMode::Truncate => opts.write(true).create(true).truncate(true),
        };
        opts
    }
}

pub enum CsvWriter {
    File(csv::Writer<fs::File>),
    Stdout(csv::Writer<io::Stdout>),
}

impl CsvWriter {
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(wtr) => wtr.flush(),
            Self::Stdout(wtr) => wtr.flush(),
        }
    }

    pub fn serialize<S: Serialize>(&mut self, record: S) -> csv::Result<()> {
        match self {
            Self::File(wtr) => wtr.serialize(record),
            Self::Stdout(wtr) => wtr.serialize(record),
        }
    }
}

/// Background thread writing product records as csv
pub struct RecordWriter {
    handle: thread::JoinHandle<anyhow::Result<usize>>,
}

impl RecordWriter {
    /// Spawns the writer, records go to `output` or to stdout when it is `None`.
    ///
    /// The thread stops once every returned sender is dropped.
    pub fn spawn(
        config: &CsvWriterConfig,
        output: Option<&Path>,
        mode: FileMode,
    ) -> anyhow::Result<(Sender<ProductUrlRecord>, Self)> {
        let mut builder = csv::WriterBuilder::from(config);

        let mut wtr = match output {
            Some(path) => {
                let opts: fs::OpenOptions = mode.into();
                let file = opts
                    .open(path)
                    .map_err(|e| anyhow!("Couldn't open {}: {e}", path.display()))?;
                // no second header row when appending
                let has_data = file.metadata()?.len() > 0;
                builder.has_headers(!(mode == FileMode::Append && has_data));
                CsvWriter::File(builder.from_writer(file))
            }
            None => CsvWriter::Stdout(builder.from_writer(io::stdout())),
        };

        let (tx_record, rx_record) = unbounded::<ProductUrlRecord>();

        let handle = thread::Builder::new()
            .name(String::from("csv-writer"))
            .spawn(move || {
                let mut written = 0usize;
                for record in rx_record {
                    match wtr.serialize(&record) {
                        Ok(()) => written += 1,
                        Err(e) => log::error!("Couldn't write record {record:?}: {e}"),
                    }
                }
                wtr.flush()?;
                Ok::<_, anyhow::Error>(written)
            })?;

        Ok((tx_record, Self { handle }))
    }

    /// Waits for all records to be written, returns how many were
    pub fn finish(self) -> anyhow::Result<usize> {
        self.handle
            .join()
            .map_err(|_| anyhow!("Record writer panicked"))?
    }
}
