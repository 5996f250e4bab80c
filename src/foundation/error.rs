/// Result alias used across the crate.
pub type RiterResult<T> = Result<T, RiterError>;

/// Error taxonomy for rendering a show.
///
/// `Configuration` and `Compile` are raised before any frame is attempted. `RuntimeFault` and
/// `Trap` end a session after whatever frames preceded them. `Cancelled` is consumer-initiated and
/// is never reported to the consumer as a failure.
#[derive(thiserror::Error, Debug)]
pub enum RiterError {
    /// Unknown show kind or invalid render configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The program could not be parsed, compiled or instantiated.
    #[error("compile error: {0}")]
    Compile(String),

    /// The program faulted while producing a frame.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),

    /// A byte-program touched memory outside its frame window.
    #[error("trap: {0}")]
    Trap(String),

    /// The consumer stopped listening.
    #[error("cancelled")]
    Cancelled,

    /// The built-in glyph atlas is malformed.
    #[error("glyph set error: {0}")]
    GlyphSet(String),

    /// I/O failure outside the sandbox (sinks, files).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiterError {
    /// Build a [`RiterError::Configuration`].
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build a [`RiterError::Compile`].
    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    /// Build a [`RiterError::RuntimeFault`].
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::RuntimeFault(msg.into())
    }

    /// Build a [`RiterError::Trap`].
    pub fn trap(msg: impl Into<String>) -> Self {
        Self::Trap(msg.into())
    }

    /// Build a [`RiterError::GlyphSet`].
    pub fn glyph_set(msg: impl Into<String>) -> Self {
        Self::GlyphSet(msg.into())
    }

    /// `true` for errors that end a running session with an `event: error` on the wire.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, Self::RuntimeFault(_) | Self::Trap(_))
    }

    /// Copy of a session fault for forwarding to another consumer. Variants that carry
    /// non-cloneable sources degrade to [`RiterError::RuntimeFault`] with the same message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(m.clone()),
            Self::Compile(m) => Self::Compile(m.clone()),
            Self::RuntimeFault(m) => Self::RuntimeFault(m.clone()),
            Self::Trap(m) => Self::Trap(m.clone()),
            Self::Cancelled => Self::Cancelled,
            Self::GlyphSet(m) => Self::GlyphSet(m.clone()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Other(e) => Self::RuntimeFault(format!("{e:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            RiterError::configuration("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(RiterError::compile("x").to_string().contains("compile error:"));
        assert!(RiterError::runtime("x").to_string().contains("runtime fault:"));
        assert!(RiterError::trap("x").to_string().contains("trap:"));
        assert!(
            RiterError::glyph_set("x")
                .to_string()
                .contains("glyph set error:")
        );
    }

    #[test]
    fn only_runtime_faults_and_traps_are_session_faults() {
        assert!(RiterError::runtime("x").is_session_fault());
        assert!(RiterError::trap("x").is_session_fault());
        assert!(!RiterError::compile("x").is_session_fault());
        assert!(!RiterError::Cancelled.is_session_fault());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = RiterError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
