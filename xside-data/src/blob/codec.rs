//! Block compression applied to blobs before upload and after download.
//!
//! The codec is bzip2 at its best level: blobs are written rarely and read
//! by every sync, so ratio wins over speed.

use std::io::{self, Read, Write};

use bzip2::{Compression, read::BzDecoder, write::BzEncoder};

/// Compress `data` into a bzip2 stream.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a bzip2 stream produced by [`compress`].
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}
