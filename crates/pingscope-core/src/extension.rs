use std::sync::Arc;

use tokio::runtime::Handle;

use crate::initializer::InitializerRegistry;
use crate::services::ClientService;

/// Identity of a loaded extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionInformation {
    pub id: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
}

/// Host services handed to an extension at start.
#[derive(Clone)]
pub struct ExtensionServices {
    pub client_service: Arc<dyn ClientService>,
    pub initializer_registry: Arc<dyn InitializerRegistry>,
    /// Runtime that owns asynchronous work started by the extension.
    pub runtime: Handle,
}

impl std::fmt::Debug for ExtensionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionServices").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct ExtensionStartInput {
    pub extension_information: ExtensionInformation,
    pub services: ExtensionServices,
}

#[derive(Clone, Debug, Default)]
pub struct ExtensionStartOutput {
    prevent_reason: Option<String>,
}

impl ExtensionStartOutput {
    /// Ask the host to treat the extension as not started.
    pub fn prevent_startup(&mut self, reason: impl Into<String>) {
        self.prevent_reason = Some(reason.into());
    }

    pub fn prevent_reason(&self) -> Option<&str> {
        self.prevent_reason.as_deref()
    }
}

#[derive(Clone, Debug)]
pub struct ExtensionStopInput {
    pub extension_information: ExtensionInformation,
}

#[derive(Clone, Debug, Default)]
pub struct ExtensionStopOutput;

/// Lifecycle entry points of an extension.
pub trait ExtensionMain: Send + Sync {
    fn extension_start(&self, input: &ExtensionStartInput, output: &mut ExtensionStartOutput);

    fn extension_stop(&self, input: &ExtensionStopInput, output: &mut ExtensionStopOutput);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_output_records_prevent_reason() {
        let mut output = ExtensionStartOutput::default();
        assert!(output.prevent_reason().is_none());
        output.prevent_startup("missing license");
        assert_eq!(output.prevent_reason(), Some("missing license"));
    }
}
