//! The per-frame GL sequence, kept apart from the window so it runs against
//! any [`GlContext`].

use std::num::NonZeroU32;

use crate::context::GlContext;
use crate::quad::Quad;
use crate::shader::ShaderProgram;

/// Clears the color buffer, activates `program` and draws `quad` with it.
pub fn draw_frame<C: GlContext>(
    gl: &C,
    program: &ShaderProgram<C>,
    quad: &Quad<C>,
    clear_color: [f32; 4],
) {
    gl.clear_color(clear_color);
    gl.clear(glow::COLOR_BUFFER_BIT);

    program.activate();
    quad.draw();
}

/// Points the viewport at the whole framebuffer.
pub fn resize_viewport<C: GlContext>(gl: &C, width: NonZeroU32, height: NonZeroU32) {
    let clamp = |side: NonZeroU32| i32::try_from(side.get()).unwrap_or(i32::MAX);
    gl.viewport(0, 0, clamp(width), clamp(height));
}
