use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error};

use crate::context::GlContext;
use crate::error::GlError;

/// Upper bound for a driver info log, terminator included.
pub const INFO_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
    /// Tag for link diagnostics.
    Program,
}

impl Stage {
    fn object_name(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex shader",
            Stage::Fragment => "fragment shader",
            Stage::Program => "shader program",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Vertex => "VERTEX",
            Stage::Fragment => "FRAGMENT",
            Stage::Program => "PROGRAM",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    FileRead,
    Compile,
    Link,
}

/// One problem found while building a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::FileRead => {
                write!(f, "[{}] failed to read shader source: {}", self.stage, self.message)
            }
            DiagnosticKind::Compile => {
                write!(f, "[{}] shader compilation failed:\n{}", self.stage, self.message)
            }
            DiagnosticKind::Link => {
                write!(f, "[{}] program linking failed:\n{}", self.stage, self.message)
            }
        }
    }
}

/// Diagnostics collected while building one program, in the order they
/// were produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.stage == stage)
    }

    fn record(&mut self, kind: DiagnosticKind, stage: Stage, message: String) {
        let diagnostic = Diagnostic {
            kind,
            stage,
            message,
        };
        error!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }
}

/// A program paired with everything that went wrong while building it.
pub struct ProgramBuild<C: GlContext> {
    pub program: ShaderProgram<C>,
    pub report: BuildReport,
}

impl<C: GlContext> ProgramBuild<C> {
    /// Fails with the first diagnostic, releasing the program.
    pub fn into_strict(self) -> Result<ShaderProgram<C>, GlError> {
        match self.report.diagnostics.into_iter().next() {
            Some(diagnostic) => Err(diagnostic.into()),
            None => Ok(self.program),
        }
    }
}

/// A linked vertex + fragment program.
///
/// Compile and link problems are logged rather than returned, so a program
/// whose sources were broken still exists and simply renders nothing. Use
/// [`ShaderProgram::build_from_files`] to look at the diagnostics, or
/// [`ShaderProgram::from_files_strict`] to fail on them.
///
/// The GL program is deleted when this value is dropped.
pub struct ShaderProgram<C: GlContext> {
    gl: Arc<C>,
    handle: C::Program,
}

impl<C: GlContext> fmt::Debug for ShaderProgram<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram").field("handle", &self.handle).finish()
    }
}

impl<C: GlContext> ShaderProgram<C> {
    pub fn from_files(
        gl: Arc<C>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, GlError> {
        Ok(Self::build_from_files(gl, vertex_path, fragment_path)?.program)
    }

    pub fn from_files_strict(
        gl: Arc<C>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, GlError> {
        Self::build_from_files(gl, vertex_path, fragment_path)?.into_strict()
    }

    pub fn from_sources(gl: Arc<C>, vertex_source: &str, fragment_source: &str) -> Result<Self, GlError> {
        Ok(Self::build_from_sources(gl, vertex_source, fragment_source)?.program)
    }

    /// Reads both files and builds the program. A missing or unreadable file
    /// is recorded and compiled as empty source.
    pub fn build_from_files(
        gl: Arc<C>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<ProgramBuild<C>, GlError> {
        let mut report = BuildReport::default();
        let vertex_source = read_source(Stage::Vertex, vertex_path.as_ref(), &mut report);
        let fragment_source = read_source(Stage::Fragment, fragment_path.as_ref(), &mut report);

        build(gl, &vertex_source, &fragment_source, report)
    }

    pub fn build_from_sources(
        gl: Arc<C>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramBuild<C>, GlError> {
        build(gl, vertex_source, fragment_source, BuildReport::default())
    }

    pub fn handle(&self) -> C::Program {
        self.handle
    }

    /// Makes this the program used by subsequent draw calls on the context.
    pub fn activate(&self) {
        self.gl.use_program(Some(self.handle));
    }

    // The setters write to whichever program is active. Names the linker did
    // not keep resolve to no location, and the upload is dropped.

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set_int(name, i32::from(value));
    }

    pub fn set_int(&self, name: &str, value: i32) {
        let location = self.gl.uniform_location(self.handle, name);
        self.gl.uniform_1_i32(location.as_ref(), value);
    }

    pub fn set_float(&self, name: &str, value: f32) {
        let location = self.gl.uniform_location(self.handle, name);
        self.gl.uniform_1_f32(location.as_ref(), value);
    }
}

impl<C: GlContext> Drop for ShaderProgram<C> {
    fn drop(&mut self) {
        debug!("deleting shader program {:?}", self.handle);
        self.gl.delete_program(self.handle);
    }
}

// Bytes that are not UTF-8 are replaced rather than failing the read; the
// compiler reports whatever that does to the source.
fn read_source(stage: Stage, path: &Path, report: &mut BuildReport) -> String {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            report.record(
                DiagnosticKind::FileRead,
                stage,
                format!("{}: {}", path.display(), e),
            );
            String::new()
        }
    }
}

fn build<C: GlContext>(
    gl: Arc<C>,
    vertex_source: &str,
    fragment_source: &str,
    mut report: BuildReport,
) -> Result<ProgramBuild<C>, GlError> {
    let vertex = compile_stage(
        &*gl,
        Stage::Vertex,
        glow::VERTEX_SHADER,
        vertex_source,
        &mut report,
    )?;
    let fragment = match compile_stage(
        &*gl,
        Stage::Fragment,
        glow::FRAGMENT_SHADER,
        fragment_source,
        &mut report,
    ) {
        Ok(fragment) => fragment,
        Err(e) => {
            gl.delete_shader(vertex);
            return Err(e);
        }
    };

    let handle = match gl.create_program() {
        Ok(handle) => handle,
        Err(reason) => {
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            return Err(GlError::ObjectCreation {
                object: Stage::Program.object_name(),
                reason,
            });
        }
    };

    gl.attach_shader(handle, vertex);
    gl.attach_shader(handle, fragment);
    gl.link_program(handle);

    if !gl.program_link_status(handle) {
        let log = bounded_info_log(gl.program_info_log(handle));
        report.record(DiagnosticKind::Link, Stage::Program, log);
    }

    // Stages are only needed until link time.
    gl.delete_shader(vertex);
    gl.delete_shader(fragment);

    if report.is_clean() {
        debug!("linked shader program {:?}", handle);
    }

    Ok(ProgramBuild {
        program: ShaderProgram { gl, handle },
        report,
    })
}

fn compile_stage<C: GlContext>(
    gl: &C,
    stage: Stage,
    shader_type: u32,
    source: &str,
    report: &mut BuildReport,
) -> Result<C::Shader, GlError> {
    let shader = gl
        .create_shader(shader_type)
        .map_err(|reason| GlError::ObjectCreation {
            object: stage.object_name(),
            reason,
        })?;

    gl.shader_source(shader, source);
    gl.compile_shader(shader);

    if !gl.shader_compile_status(shader) {
        let log = bounded_info_log(gl.shader_info_log(shader));
        report.record(DiagnosticKind::Compile, stage, log);
    }

    Ok(shader)
}

/// Cuts a driver log down to what a fixed `INFO_LOG_CAPACITY` buffer holds.
fn bounded_info_log(mut log: String) -> String {
    let limit = INFO_LOG_CAPACITY - 1;
    if log.len() > limit {
        let mut end = limit;
        while !log.is_char_boundary(end) {
            end -= 1;
        }
        log.truncate(end);
    }

    let trimmed = log.trim_end_matches(['\0', '\n', '\r', ' ']).len();
    log.truncate(trimmed);
    log
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::mock::{MockContext, UniformValue};

    const VERTEX: &str = "#version 330 core
layout (location = 0) in vec3 aPos;

void main()
{
    gl_Position = vec4(aPos, 1.0);
}
";

    const FRAGMENT: &str = "#version 330 core
out vec4 FragColor;
uniform bool u_enabled;
uniform int u_mode;
uniform float u_time;
uniform float u_unused;

void main()
{
    float scale = u_enabled ? float(u_mode) : u_time;
    FragColor = vec4(0.2, 0.3, 0.3, 1.0) * scale;
}
";

    fn context() -> Arc<MockContext> {
        Arc::new(MockContext::default())
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("quad_bringup_{}_{}", std::process::id(), name));
        fs::write(&path, contents).expect("write temp shader");
        path
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn valid_sources_build_cleanly() {
        let gl = context();
        let build = ShaderProgram::build_from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();

        assert!(build.report.is_clean());
        assert!(gl.is_program_linked(build.program.handle()));
    }

    #[test]
    fn stages_are_released_after_linking() {
        let gl = context();
        let _program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();

        assert_eq!(gl.live_shader_count(), 0);
        assert_eq!(gl.live_program_count(), 1);
    }

    #[test]
    fn vertex_syntax_error_is_reported_once_for_vertex() {
        let gl = context();
        let broken = "#version 330 core\nvoid main() {\n    gl_Position = vec4(0.0);\n";
        let build = ShaderProgram::build_from_sources(gl.clone(), broken, FRAGMENT).unwrap();

        let compile: Vec<_> = build
            .report
            .diagnostics()
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Compile)
            .collect();
        assert_eq!(compile.len(), 1);
        assert_eq!(compile[0].stage, Stage::Vertex);
        assert!(!compile[0].message.is_empty());
        assert_eq!(build.report.for_stage(Stage::Fragment).count(), 0);
        assert_eq!(gl.live_program_count(), 1);
    }

    #[test]
    fn fragment_syntax_error_is_reported_once_for_fragment() {
        let gl = context();
        let broken = "#version 330 core\nout vec4 FragColor;\nvoid main( {\n}\n";
        let build = ShaderProgram::build_from_sources(gl, VERTEX, broken).unwrap();

        assert_eq!(build.report.for_stage(Stage::Fragment).count(), 1);
        assert_eq!(build.report.for_stage(Stage::Vertex).count(), 0);
    }

    #[test]
    fn mismatched_stages_fail_to_link() {
        let gl = context();
        let fragment = "#version 330 core
in vec4 vertexColor;
out vec4 FragColor;

void main()
{
    FragColor = vertexColor;
}
";
        let build = ShaderProgram::build_from_sources(gl.clone(), VERTEX, fragment).unwrap();

        let diagnostics = build.report.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Link);
        assert_eq!(diagnostics[0].stage, Stage::Program);
        assert!(diagnostics[0].to_string().starts_with("[PROGRAM]"));
        assert!(!gl.is_program_linked(build.program.handle()));
        assert_eq!(gl.live_program_count(), 1);
    }

    #[test]
    fn missing_file_degrades_to_empty_source() {
        let gl = context();
        let fragment = temp_file("missing_file.frag", FRAGMENT);
        let vertex = std::env::temp_dir().join("quad_bringup_does_not_exist.vert");

        let build = ShaderProgram::build_from_files(gl.clone(), &vertex, &fragment).unwrap();
        fs::remove_file(&fragment).ok();

        let first = &build.report.diagnostics()[0];
        assert_eq!(first.kind, DiagnosticKind::FileRead);
        assert_eq!(first.stage, Stage::Vertex);
        assert!(first.message.contains("quad_bringup_does_not_exist.vert"));
        assert_eq!(gl.live_program_count(), 1);
    }

    #[test]
    fn files_build_like_sources() {
        let gl = context();
        let vertex = temp_file("files.vert", VERTEX);
        let fragment = temp_file("files.frag", FRAGMENT);

        let build = ShaderProgram::build_from_files(gl, &vertex, &fragment).unwrap();
        fs::remove_file(&vertex).ok();
        fs::remove_file(&fragment).ok();

        assert!(build.report.is_clean());
    }

    #[test]
    fn strict_build_fails_and_releases_program() {
        let gl = context();
        let vertex = std::env::temp_dir().join("quad_bringup_strict_missing.vert");
        let fragment = std::env::temp_dir().join("quad_bringup_strict_missing.frag");

        let err = ShaderProgram::from_files_strict(gl.clone(), &vertex, &fragment).unwrap_err();

        match err {
            GlError::Build(diagnostic) => {
                assert_eq!(diagnostic.kind, DiagnosticKind::FileRead);
                assert_eq!(diagnostic.stage, Stage::Vertex);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(gl.live_program_count(), 0);
    }

    #[test]
    fn object_creation_failure_is_an_error() {
        let gl = context();
        gl.fail_object_creation(true);

        let err = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap_err();

        assert!(matches!(
            err,
            GlError::ObjectCreation {
                object: "vertex shader",
                ..
            }
        ));
        assert_eq!(gl.live_shader_count(), 0);
    }

    #[test]
    fn fragment_creation_failure_releases_vertex_stage() {
        let gl = context();
        gl.fail_object_creation_after(1);

        let err = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap_err();

        assert!(matches!(
            err,
            GlError::ObjectCreation {
                object: "fragment shader",
                ..
            }
        ));
        assert_eq!(gl.live_shader_count(), 0);
        assert_eq!(gl.live_program_count(), 0);
    }

    #[test]
    fn program_creation_failure_releases_both_stages() {
        let gl = context();
        gl.fail_object_creation_after(2);

        let err = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap_err();

        assert!(matches!(
            err,
            GlError::ObjectCreation {
                object: "shader program",
                ..
            }
        ));
        assert_eq!(gl.live_shader_count(), 0);
        assert_eq!(gl.live_program_count(), 0);
    }

    #[test]
    fn invalid_utf8_is_read_lossily() {
        let gl = context();
        let mut bytes = VERTEX.as_bytes().to_vec();
        bytes.extend_from_slice(b"// \xff\xfe stray bytes\n");
        let vertex = std::env::temp_dir()
            .join(format!("quad_bringup_{}_lossy.vert", std::process::id()));
        fs::write(&vertex, &bytes).expect("write temp shader");
        let fragment = temp_file("lossy.frag", FRAGMENT);

        let build = ShaderProgram::build_from_files(gl, &vertex, &fragment).unwrap();
        fs::remove_file(&vertex).ok();
        fs::remove_file(&fragment).ok();

        assert!(build.report.is_clean(), "{:?}", build.report);
    }

    // ── ownership ─────────────────────────────────────────────────────────

    #[test]
    fn live_programs_have_unique_handles() {
        let gl = context();
        let programs: Vec<_> = (0..4)
            .map(|_| ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap())
            .collect();

        let handles: HashSet<_> = programs.iter().map(|p| p.handle()).collect();
        assert_eq!(handles.len(), programs.len());
    }

    #[test]
    fn drop_releases_the_program() {
        let gl = context();
        let program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        let handle = program.handle();

        drop(program);

        assert!(gl.is_program_deleted(handle));
        assert_eq!(gl.live_program_count(), 0);

        let next = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        assert_ne!(next.handle(), handle);
    }

    // ── activation and uniforms ───────────────────────────────────────────

    #[test]
    fn activate_binds_the_program() {
        let gl = context();
        let first = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        let second = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();

        first.activate();
        assert_eq!(gl.active_program(), Some(first.handle()));

        second.activate();
        assert_eq!(gl.active_program(), Some(second.handle()));
    }

    #[test]
    fn set_bool_uploads_integers() {
        let gl = context();
        let program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        program.activate();

        program.set_bool("u_enabled", true);
        assert_eq!(
            gl.uniform_value(program.handle(), "u_enabled"),
            Some(UniformValue::Int(1))
        );

        program.set_bool("u_enabled", false);
        assert_eq!(
            gl.uniform_value(program.handle(), "u_enabled"),
            Some(UniformValue::Int(0))
        );
    }

    #[test]
    fn set_int_and_float_round_trip() {
        let gl = context();
        let program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        program.activate();

        program.set_int("u_mode", 3);
        program.set_float("u_time", 1.5);

        assert_eq!(gl.uniform_value(program.handle(), "u_mode"), Some(UniformValue::Int(3)));
        assert_eq!(
            gl.uniform_value(program.handle(), "u_time"),
            Some(UniformValue::Float(1.5))
        );
    }

    #[test]
    fn unknown_uniform_is_ignored() {
        let gl = context();
        let program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        program.activate();

        program.set_bool("u_missing", true);
        program.set_int("u_missing", 7);
        program.set_float("u_missing", 2.0);

        assert_eq!(gl.uniform_upload_count(), 0);
        assert_eq!(gl.uniform_value(program.handle(), "u_missing"), None);
    }

    #[test]
    fn declared_but_unread_uniform_is_ignored() {
        let gl = context();
        let program = ShaderProgram::from_sources(gl.clone(), VERTEX, FRAGMENT).unwrap();
        program.activate();

        program.set_float("u_unused", 2.0);

        assert_eq!(gl.uniform_upload_count(), 0);
        assert_eq!(gl.uniform_value(program.handle(), "u_unused"), None);
    }

    // ── info logs ─────────────────────────────────────────────────────────

    #[test]
    fn info_log_is_bounded() {
        let log = "x".repeat(4 * INFO_LOG_CAPACITY);
        assert_eq!(bounded_info_log(log).len(), INFO_LOG_CAPACITY - 1);
    }

    #[test]
    fn info_log_truncation_respects_char_boundaries() {
        let log = "é".repeat(INFO_LOG_CAPACITY);
        let bounded = bounded_info_log(log);
        assert!(bounded.len() < INFO_LOG_CAPACITY);
        assert!(bounded.chars().all(|c| c == 'é'));
    }

    #[test]
    fn info_log_drops_trailing_terminators() {
        assert_eq!(bounded_info_log("0:1(1): error\n\0".to_string()), "0:1(1): error");
    }
}
