#![forbid(unsafe_code)]

//! # tessera-load
//!
//! The load pipeline. A [`Pipeline`] owns the resource cache, the tick
//! scheduler and every waiter table; consumers register a [`LoadListener`]
//! and ask for sources and files.
//!
//! ## Normative
//!
//! - At most one load per source and one decode per chunked entry is in
//!   flight. Later requesters join its waiter list.
//! - Cache hits are reported on a later tick, never from inside the
//!   `load_*` call.
//! - Callbacks run inside [`Pipeline::tick`] and may call back into the
//!   pipeline.
//! - Chunked entries decode one at a time, highest priority first. Bases
//!   are queued above every entry that depends on them.
//!
//! [`LoadListener`]: tessera_core::LoadListener

#[cfg(feature = "image")]
mod adapters;
mod config;
mod consumers;
mod file;
mod leases;
mod loaders;
mod pipeline;
mod queue;
mod services;
mod source;

#[cfg(feature = "image")]
pub use adapters::ImageCrateDecoder;
pub use config::PipelineConfig;
pub use pipeline::Pipeline;
pub use queue::FileQueue;
pub use services::Services;
