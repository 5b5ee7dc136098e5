#![forbid(unsafe_code)]

//! # Tessera
//!
//! Facade crate for the tessera content pipeline.
//!
//! ## Quick start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let services = Services::new(registry, surface).with_fetcher(fetcher);
//! let pipeline = Pipeline::new(PipelineConfig::default(), services);
//! let me = pipeline.register_consumer(listener);
//!
//! pipeline.load_source(me, "https://cdn.example/ui.pwck", SourceKind::Chunked, SourceOptions::default());
//! loop {
//!     pipeline.tick(); // once per frame
//! }
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod archive {
    pub use tessera_archive::*;
}

pub mod cache {
    pub use tessera_cache::*;
}

/// Addressing, formats, errors and collaborator traits.
pub mod types {
    pub use tessera_core::*;
}

pub mod load {
    pub use tessera_load::*;
}

pub mod worker {
    pub use tessera_worker::*;
}

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use tessera_core::{
        Channel, ConsumerId, DecodedImage, Decompressor, EntryAddress, ErrorCode, FetchError,
        Fetcher, FrameSampler, ImageDecoder, LoadError, LoadListener, LoadResult, PixelFormat,
        Rect, ServiceFuture, SourceKind, SourceOptions, Surface, TextureDesc, TextureHandle,
        UrlRegistry,
    };
    #[cfg(feature = "image")]
    pub use tessera_load::ImageCrateDecoder;
    pub use tessera_load::{Pipeline, PipelineConfig, Services};
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tessera_test_utils::{
        ChunkedBuilder, MemoryFetcher, MemorySurface, RecordingListener, StaticRegistry, pattern,
    };

    use crate::prelude::*;

    #[test]
    fn prelude_drives_a_chunked_pack() {
        let source = "https://cdn.example/ui.pwck";
        let registry = Rc::new(StaticRegistry::new());
        registry.register(source);
        let fetcher = Rc::new(MemoryFetcher::new());
        fetcher.serve(
            source,
            ChunkedBuilder::new().master("logo", 2, 2, &pattern(2, 2, 4, 1)).build(),
        );
        let services =
            Services::new(registry, Rc::new(MemorySurface::new())).with_fetcher(fetcher);
        let pipeline = Pipeline::new(PipelineConfig::default(), services);
        let listener = Rc::new(RecordingListener::new());
        let me = pipeline.register_consumer(listener.clone());

        assert!(pipeline.load_source(me, source, SourceKind::Chunked, SourceOptions::default()));
        pipeline.run_until_idle(100);
        assert!(pipeline.load_file(me, source, "logo", 0, Some(Channel(1))));
        pipeline.run_until_idle(100);

        assert_eq!(listener.file_successes(), vec![("logo".to_string(), Some(Channel(1)))]);
        assert!(pipeline.cache().has_file(source, "logo"));
    }
}
