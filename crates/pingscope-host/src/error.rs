use pingscope_core::ClientId;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("extension '{0}' is already loaded")]
    ExtensionAlreadyLoaded(String),

    #[error("unknown extension '{0}'")]
    UnknownExtension(String),

    #[error("connection of client '{0}' is closed")]
    ConnectionClosed(ClientId),

    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),
}
