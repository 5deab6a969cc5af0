//! Streaming zip export of downloaded images
//!
//! The archive is written by an async zip writer into one end of an
//! in-memory pipe while the other end is forwarded to the channel, so the
//! consumer receives bytes while later images are still downloading.

use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::downloader::{Downloader, probe};
use crate::error::ScanError;

/// Zip bytes, in order; an `Err` item ends the stream
pub type ArchiveStream = ReceiverStream<Result<Vec<u8>, ScanError>>;

const CHANNEL_CAPACITY: usize = 8;

/// In-memory pipe between the zip writer and the channel
const PIPE_CAPACITY: usize = 64 * 1024;

/// Start building an archive of `urls` in the background
///
/// URLs that fail to parse, download or probe are skipped.
pub(crate) fn spawn_archive(downloader: Downloader, urls: Vec<String>) -> ArchiveStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        if let Err(e) = write_archive(&downloader, &urls, &tx).await {
            log::warn!("Archive export aborted: {e}");
            let _ = tx.send(Err(e)).await;
        }
    });

    ReceiverStream::new(rx)
}

async fn write_archive(
    downloader: &Downloader,
    urls: &[String],
    tx: &mpsc::Sender<Result<Vec<u8>, ScanError>>,
) -> Result<(), ScanError> {
    let (writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

    let produce = async move {
        let mut zip = ZipFileWriter::with_tokio(writer);
        let mut written = 0usize;

        for (index, raw) in urls.iter().enumerate() {
            let Ok(url) = Url::parse(raw) else {
                log::debug!("Export skipped unparseable URL {raw}");
                continue;
            };
            let bytes = match downloader.fetch(url.as_str(), &url).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("Export skipped {url}: {e}");
                    continue;
                }
            };
            let Some(info) = probe(&bytes) else {
                log::debug!("Export skipped non-image {url}");
                continue;
            };

            let name = format!("image_{}.{}", index + 1, info.format);
            let entry = ZipEntryBuilder::new(name.into(), Compression::Stored);
            zip.write_entry_whole(entry, &bytes)
                .await
                .map_err(zip_error)?;
            written += 1;
        }

        // Dropping the returned pipe end signals EOF to the forwarder
        zip.close().await.map_err(zip_error)?;
        log::info!("Exported {written} of {} images", urls.len());
        Ok(())
    };

    let forward = async move {
        let mut reader = reader;
        let mut chunk = vec![0u8; PIPE_CAPACITY];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(Ok(chunk[..n].to_vec())).await.is_err() {
                        log::debug!("Archive consumer went away");
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("Archive pipe read failed: {e}");
                    break;
                }
            }
        }
    };

    let (produced, ()) = tokio::join!(produce, forward);
    produced
}

fn zip_error(e: async_zip::error::ZipError) -> ScanError {
    ScanError::Internal(format!("Zip write failed: {e}"))
}
