use thiserror::Error;

use crate::shader::Diagnostic;

#[derive(Debug, Error)]
pub enum GlError {
    /// The driver refused to hand out a new object name.
    #[error("could not create {object}: {reason}")]
    ObjectCreation { object: &'static str, reason: String },

    /// A diagnostic promoted to a hard failure by a strict build.
    #[error("{0}")]
    Build(Diagnostic),
}

impl From<Diagnostic> for GlError {
    fn from(diagnostic: Diagnostic) -> Self {
        GlError::Build(diagnostic)
    }
}
