//! Compression detection for archive streams.
//!
//! Peeks at the leading bytes of a stream and peels off gzip or zstd layers
//! until plain data remains. Nesting is bounded so that a crafted archive
//! cannot make the differ do unbounded work.

use super::ArchiveError;
use flate2::read::MultiGzDecoder;
use std::io::{self, BufRead, BufReader, Cursor, Read};

/// Maximum number of nested compression layers that will be unwrapped.
pub const MAX_COMPRESSION_LAYERS: usize = 3;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const HEAD_LEN: usize = 4;

/// Compression format detected at the head of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (`.tgz`, `.tar.gz`).
    Gzip,
    /// Zstandard (`.tar.zst`).
    Zstd,
    /// No recognised compression.
    None,
}

/// Classifies a stream by its leading bytes.
///
/// # Examples
///
/// ```
/// use tbv::archive::decode::{Compression, sniff};
///
/// assert_eq!(sniff(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
/// assert_eq!(sniff(b"package/"), Compression::None);
/// ```
#[must_use]
pub fn sniff(head: &[u8]) -> Compression {
    if head.starts_with(GZIP_MAGIC) {
        Compression::Gzip
    } else if head.starts_with(ZSTD_MAGIC) {
        Compression::Zstd
    } else {
        Compression::None
    }
}

/// Returns a reader over the fully decompressed contents of `source`.
///
/// # Errors
///
/// Returns [`ArchiveError::TooManyLayers`] when more than
/// [`MAX_COMPRESSION_LAYERS`] layers are stacked, or an I/O error if the
/// stream cannot be read or a decoder cannot be constructed.
pub fn decompress<'a>(source: Box<dyn Read + 'a>) -> Result<Box<dyn BufRead + 'a>, ArchiveError> {
    let mut reader = source;
    for _ in 0..=MAX_COMPRESSION_LAYERS {
        let head = read_head(&mut reader)?;
        let compression = sniff(&head);
        let rejoined = Cursor::new(head).chain(reader);
        reader = match compression {
            Compression::None => return Ok(Box::new(BufReader::new(rejoined))),
            Compression::Gzip => Box::new(MultiGzDecoder::new(rejoined)),
            Compression::Zstd => Box::new(zstd::Decoder::new(rejoined)?),
        };
    }
    Err(ArchiveError::TooManyLayers {
        limit: MAX_COMPRESSION_LAYERS,
    })
}

/// Reads up to [`HEAD_LEN`] bytes, stopping early only at end of stream.
fn read_head<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut head = [0_u8; HEAD_LEN];
    let mut filled = 0;
    while filled < HEAD_LEN {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(head[..filled].to_vec())
}
