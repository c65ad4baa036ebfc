use std::sync::Arc;

use log::debug;

use crate::context::GlContext;
use crate::error::GlError;

#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; 12] = [
    //  Position
     0.5,  0.5, 0.0, // top right
     0.5, -0.5, 0.0, // bottom right
    -0.5, -0.5, 0.0, // bottom left
    -0.5,  0.5, 0.0, // top left
];

pub const QUAD_INDICES: [u32; 6] = [
    0, 1, 3, // first triangle
    1, 2, 3, // second triangle
];

/// The static quad drawn every frame: one vertex array with a position-only
/// vertex buffer and an index buffer, uploaded once.
pub struct Quad<C: GlContext> {
    gl: Arc<C>,
    vao: C::VertexArray,
    vbo: C::Buffer,
    ebo: C::Buffer,
    index_count: i32,
}

impl<C: GlContext> Quad<C> {
    pub fn new(gl: Arc<C>) -> Result<Self, GlError> {
        let vao = gl
            .create_vertex_array()
            .map_err(|reason| GlError::ObjectCreation {
                object: "vertex array",
                reason,
            })?;
        let vbo = match gl.create_buffer() {
            Ok(vbo) => vbo,
            Err(reason) => {
                gl.delete_vertex_array(vao);
                return Err(GlError::ObjectCreation {
                    object: "vertex buffer",
                    reason,
                });
            }
        };
        let ebo = match gl.create_buffer() {
            Ok(ebo) => ebo,
            Err(reason) => {
                gl.delete_buffer(vbo);
                gl.delete_vertex_array(vao);
                return Err(GlError::ObjectCreation {
                    object: "index buffer",
                    reason,
                });
            }
        };

        gl.bind_vertex_array(Some(vao));

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
            glow::STATIC_DRAW,
        );

        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
        gl.buffer_data(
            glow::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(&QUAD_INDICES),
            glow::STATIC_DRAW,
        );

        let stride = (3 * std::mem::size_of::<f32>()) as i32;
        gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(0);

        // The element buffer binding is part of the vertex array state, so
        // only the array buffer is unbound before the vertex array.
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        gl.bind_vertex_array(None);

        debug!("uploaded quad: {} vertices, {} indices", QUAD_VERTICES.len() / 3, QUAD_INDICES.len());

        Ok(Self {
            gl,
            vao,
            vbo,
            ebo,
            index_count: QUAD_INDICES.len() as i32,
        })
    }

    /// Draws with whichever program is active.
    pub fn draw(&self) {
        self.gl.bind_vertex_array(Some(self.vao));
        self.gl
            .draw_elements(glow::TRIANGLES, self.index_count, glow::UNSIGNED_INT, 0);
    }
}

impl<C: GlContext> Drop for Quad<C> {
    fn drop(&mut self) {
        self.gl.delete_vertex_array(self.vao);
        self.gl.delete_buffer(self.vbo);
        self.gl.delete_buffer(self.ebo);
    }
}
