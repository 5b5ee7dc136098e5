use bytes::Bytes;
use futures::FutureExt;
use tessera_core::{Decompressor, LoadError, LoadResult, ServiceFuture};
use tracing::trace;

/// LZ4 block decompressor running inline on the calling tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4Decompressor;

impl Decompressor for Lz4Decompressor {
    fn decompress(&self, input: Bytes, expected_len: usize) -> ServiceFuture<LoadResult<Bytes>> {
        trace!(input = input.len(), expected_len, "lz4 block decompress");
        let result = lz4_flex::block::decompress(&input, expected_len)
            .map_err(|e| LoadError::Decompress(e.to_string()))
            .and_then(|out| {
                if out.len() == expected_len {
                    Ok(Bytes::from(out))
                } else {
                    Err(LoadError::Decompress(format!(
                        "block inflated to {} bytes, expected {expected_len}",
                        out.len()
                    )))
                }
            });
        futures::future::ready(result).boxed_local()
    }
}
