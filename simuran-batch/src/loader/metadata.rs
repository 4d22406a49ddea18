//! Metadata-only loader
//!
//! For recordings whose data is the index row itself. Parsing advertises
//! every public attribute key as available data; loading materializes an
//! empty payload.

use super::Loader;
use crate::recording::{Payload, Recording};
use simuran_common::Result;

#[derive(Debug, Clone, Default)]
pub struct MetadataLoader;

impl MetadataLoader {
    pub const NAME: &'static str = "metadata";

    pub fn new() -> Self {
        Self
    }
}

impl Loader for MetadataLoader {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parse_metadata(&self, recording: &mut Recording) -> Result<()> {
        recording.available_data = recording
            .attrs
            .keys()
            .filter(|key| !key.starts_with('_'))
            .cloned()
            .collect();
        if recording.source_file.is_none() {
            recording.source_file = recording.attrs.get_str("source_file").map(str::to_string);
        }
        Ok(())
    }

    fn load_recording(&self, _recording: &Recording) -> Result<Payload> {
        Ok(Payload::new())
    }
}
