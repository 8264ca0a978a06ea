//! Decoder configuration.

/// Configuration for a [`Dec`](crate::Dec).
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Maximum collection nesting the decoder will descend into.
    ///
    /// A value nested deeper than this is reported through
    /// [`Reader::max_depth_reached`](crate::Reader::max_depth_reached) and
    /// skipped together with the rest of the aborted message.
    pub max_depth: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self { max_depth: 16 }
    }
}
