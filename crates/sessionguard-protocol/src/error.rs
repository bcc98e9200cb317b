//! Error types for the protocol layer.

/// Errors that can occur when turning host-provided data into protocol types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The identity string is not a valid 128-bit UUID.
    ///
    /// Hosts usually hand identities over as hyphenated strings; anything
    /// that does not parse is rejected before it reaches the engine.
    #[error("invalid identity {input:?}: {source}")]
    InvalidIdentity {
        input: String,
        #[source]
        source: uuid::Error,
    },

    /// The display label is empty or whitespace only.
    #[error("display label must not be empty")]
    EmptyLabel,
}
