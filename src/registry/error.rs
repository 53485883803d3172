//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The registry has been shut down and accepts no new clients
    #[error("client registry is closed")]
    Closed,
}
