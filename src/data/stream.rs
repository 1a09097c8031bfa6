//! Lazy sources: CSV chunk readers and image-directory batches.
//!
//! A `Stream` only records where to read from; nothing is decoded until
//! `iter()` is called, and each call starts again from the beginning.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use ndarray::{Array1, Array4};
use serde::{Deserialize, Serialize};

use super::model::{Frame, Scalar, Source, Value};
use super::output::Output;

/// Items yielded by a stream.
pub type StreamIter = Box<dyn Iterator<Item = Result<Output>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stream {
    /// `chunksize` rows of a CSV source per item, each as a `Single(Frame)`.
    CsvChunks {
        source: Source,
        chunksize: usize,
        delimiter: u8,
        has_headers: bool,
    },
    /// `[images, labels]` per item; images are `[batch, height, width, 3]`.
    ImageBatches {
        classes: Vec<String>,
        files: Vec<(PathBuf, usize)>,
        batch_size: usize,
        target_size: (u32, u32),
    },
}

impl Stream {
    pub fn iter(&self) -> Result<StreamIter> {
        match self {
            Stream::CsvChunks {
                source,
                chunksize,
                delimiter,
                has_headers,
            } => {
                let mut reader = csv::ReaderBuilder::new()
                    .delimiter(*delimiter)
                    .has_headers(*has_headers)
                    .from_reader(open_source(source)?);
                let columns = read_columns(&mut reader)?;
                Ok(Box::new(CsvChunkIter {
                    columns,
                    records: reader.into_records(),
                    chunksize: (*chunksize).max(1),
                    done: false,
                }))
            }
            Stream::ImageBatches {
                files,
                batch_size,
                target_size,
                ..
            } => Ok(Box::new(ImageBatchIter {
                files: files.clone(),
                pos: 0,
                batch_size: (*batch_size).max(1),
                target_size: *target_size,
            })),
        }
    }

    /// Number of items the stream yields, when known without reading.
    pub fn n_batches(&self) -> Option<usize> {
        match self {
            Stream::CsvChunks { .. } => None,
            Stream::ImageBatches {
                files, batch_size, ..
            } => Some(files.len().div_ceil((*batch_size).max(1))),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared source helpers
// ---------------------------------------------------------------------------

/// Open a local file or an HTTP(S) body as a byte stream.
pub fn open_source(source: &Source) -> Result<Box<dyn Read>> {
    match source {
        Source::Path(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening {}", path.display()))?;
            Ok(Box::new(file))
        }
        Source::Url(url) => {
            let response = reqwest::blocking::get(url.as_str())
                .with_context(|| format!("requesting {url}"))?
                .error_for_status()
                .with_context(|| format!("fetching {url}"))?;
            Ok(Box::new(response))
        }
    }
}

/// Header names, or `column_<i>` when the source has no header row.
pub(crate) fn read_columns<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>> {
    let has_headers = reader.has_headers();
    let headers = reader.headers().context("reading CSV headers")?;
    if has_headers {
        Ok(headers.iter().map(|h| h.to_string()).collect())
    } else {
        Ok((0..headers.len()).map(|i| format!("column_{i}")).collect())
    }
}

// ---------------------------------------------------------------------------
// CSV chunks
// ---------------------------------------------------------------------------

struct CsvChunkIter {
    columns: Vec<String>,
    records: csv::StringRecordsIntoIter<Box<dyn Read>>,
    chunksize: usize,
    done: bool,
}

impl Iterator for CsvChunkIter {
    type Item = Result<Output>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut rows = Vec::with_capacity(self.chunksize);
        while rows.len() < self.chunksize {
            match self.records.next() {
                Some(Ok(record)) => rows.push(record.iter().map(Scalar::parse).collect()),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e).context("reading CSV record"));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if rows.is_empty() {
            return None;
        }
        let frame = Frame::new(self.columns.clone(), rows);
        Some(Ok(Output::Single(Value::Frame(frame))))
    }
}

// ---------------------------------------------------------------------------
// Image batches
// ---------------------------------------------------------------------------

struct ImageBatchIter {
    files: Vec<(PathBuf, usize)>,
    pos: usize,
    batch_size: usize,
    target_size: (u32, u32),
}

impl ImageBatchIter {
    fn load_batch(&self, batch: &[(PathBuf, usize)]) -> Result<Output> {
        let (width, height) = self.target_size;
        let mut images = Array4::<f64>::zeros((batch.len(), height as usize, width as usize, 3));
        let mut labels = Array1::<f64>::zeros(batch.len());

        for (i, (path, class)) in batch.iter().enumerate() {
            let img = image::open(path)
                .with_context(|| format!("decoding image {}", path.display()))?
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8();
            for (x, y, pixel) in img.enumerate_pixels() {
                for channel in 0..3 {
                    images[[i, y as usize, x as usize, channel]] = f64::from(pixel[channel]);
                }
            }
            labels[i] = *class as f64;
        }

        Ok(Output::Sequence(vec![
            Value::Array(images.into_dyn()),
            Value::Array(labels.into_dyn()),
        ]))
    }
}

impl Iterator for ImageBatchIter {
    type Item = Result<Output>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.files.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.files.len());
        let batch = self.load_batch(&self.files[self.pos..end]);
        self.pos = end;
        Some(batch)
    }
}
