//! Facade over the Oodle chunk decompressor.
//!
//! The codec never inspects compressed payloads itself; everything that is
//! not a plain copy goes through [`decompress`]. Backed by the pure-Rust
//! `oozextract` decoders when the `oodle` feature is enabled (the default).

use super::Error;

/// Decompress `compressed` into exactly `expected_size` bytes.
#[cfg(feature = "oodle")]
pub fn decompress(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>, Error> {
    let mut raw = vec![0; expected_size];
    oozextract::Extractor::new()
        .read_from_slice(compressed, &mut raw)
        .map_err(|e| Error::CompressorFailed(format!("{e:?}")))?;
    Ok(raw)
}

#[cfg(not(feature = "oodle"))]
pub fn decompress(_compressed: &[u8], _expected_size: usize) -> Result<Vec<u8>, Error> {
    Err(Error::CompressorUnavailable)
}
