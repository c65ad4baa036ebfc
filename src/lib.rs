pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod quad;
pub mod shader;

pub use config::Config;
pub use context::GlContext;
pub use error::GlError;
pub use quad::Quad;
pub use shader::{BuildReport, Diagnostic, DiagnosticKind, ProgramBuild, ShaderProgram, Stage};
