use crate::CsvResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::codec::Utf8Transcoder;

/// Compression wrapped around the CSV bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Decide from content-encoding, then content-type, then file name.
    pub fn detect(content_encoding: &str, content_type: &str, name_hint: &str) -> Self {
        let ce = content_encoding.to_ascii_lowercase();
        let ct = content_type.to_ascii_lowercase();
        let encodings = || ce.split(',').map(str::trim);

        if encodings().any(|s| s == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || name_hint.ends_with(".gz")
        {
            Compression::Gzip
        } else if encodings().any(|s| s == "zstd")
            || ct == "application/zstd"
            || name_hint.ends_with(".zst")
        {
            Compression::Zstd
        } else {
            Compression::None
        }
    }
}

/// How the raw bytes of a source must be decoded before tokenizing.
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub compression: Compression,
    /// Character encoding of the text (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
    /// file name or object key, for diagnostics
    pub name_hint: String,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            charset: encoding_rs::UTF_8,
            name_hint: String::new(),
        }
    }
}

impl SourceMeta {
    /// Compression from the file extension; charset stays UTF-8.
    pub fn from_path(path: &Path) -> Self {
        let name_hint = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            compression: Compression::detect("", "", &name_hint),
            name_hint,
            ..Default::default()
        }
    }
}

/// Wraps `raw` with decompression and UTF-8 transcoding as `meta` asks.
/// The result is not seekable, so readers built on it cannot `reset`.
pub fn decode_source<R>(raw: R, meta: &SourceMeta) -> Box<dyn AsyncRead + Unpin + Send>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    debug!(
        compression = ?meta.compression,
        charset = meta.charset.name(),
        name = %meta.name_hint,
        "decoding csv source"
    );

    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = match meta.compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    // UTF-8 passes straight through
    if meta.charset == encoding_rs::UTF_8 {
        return decompressed;
    }
    let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
    Box::new(StreamReader::new(framed))
}

/// Opens a local file and decodes it according to its extension.
pub async fn open_source(
    path: &Path,
) -> CsvResult<(Box<dyn AsyncRead + Unpin + Send>, SourceMeta)> {
    let file = File::open(path).await?;
    let meta = SourceMeta::from_path(path);
    Ok((decode_source(file, &meta), meta))
}
