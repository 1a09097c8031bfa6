use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Fetches a remote file into a local directory.
pub trait Download {
    /// Download `url` into `dest_dir`, returning the local file path.
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Blocking HTTP(S) downloader.
#[derive(Debug, Default, Clone)]
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Download for HttpDownloader {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let name = file_name(url)?;
        std::fs::create_dir_all(dest_dir)
            .with_context(|| format!("creating {}", dest_dir.display()))?;
        let dest = dest_dir.join(name);

        log::info!("downloading {url} to {}", dest.display());
        let mut response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("fetching {url}"))?;

        let mut out = BufWriter::new(
            File::create(&dest).with_context(|| format!("creating {}", dest.display()))?,
        );
        let bytes = response
            .copy_to(&mut out)
            .with_context(|| format!("writing {}", dest.display()))?;
        log::debug!("downloaded {bytes} bytes from {url}");
        Ok(dest)
    }
}

/// Last path segment of a URL, ignoring any query string or fragment.
pub fn file_name(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("invalid URL {url}"))?;
    match parsed.path_segments().and_then(|mut s| s.next_back()) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => bail!("URL {url} does not name a file"),
    }
}
