use crate::error::LoadError;

/// Identity of a consumer registered with the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub u64);

/// Caller-supplied correlation tag echoed back on file completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Channel(pub u64);

/// Callbacks a consumer implements.
///
/// Callbacks are always delivered from inside a pipeline tick, never from
/// within the `load_*` call that registered interest. A callback may call back
/// into the pipeline.
pub trait LoadListener {
    fn on_source_load_progress(&self, _source: &str, _fraction: f32) {}

    fn on_source_load_success(&self, source: &str, files: &[String]);

    fn on_source_load_error(&self, source: &str, error: &LoadError);

    fn on_file_load_success(&self, source: &str, file: &str, channel: Option<Channel>);

    fn on_file_load_error(
        &self,
        source: &str,
        file: &str,
        channel: Option<Channel>,
        error: &LoadError,
    );
}
