use std::ffi::CString;
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use glutin::config::ConfigTemplate;
use glutin::context::{
    ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version,
};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use winit::window::{Window, WindowId};

use quad_bringup::frame::{draw_frame, resize_viewport};
use quad_bringup::{Config, Quad, ShaderProgram};

/// Everything that only exists while a window and a current GL context do.
///
/// Field order is drop order: the GL objects go first, while the context they
/// belong to is still current.
struct RenderState {
    quad: Quad<glow::Context>,
    program: ShaderProgram<glow::Context>,
    gl: Arc<glow::Context>,
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    window: Window,
}

impl RenderState {
    fn new(event_loop: &ActiveEventLoop, config: &Config) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(LogicalSize::new(config.width, config.height));
        let window = event_loop
            .create_window(attributes)
            .context("failed to create window")?;

        let display_handle = window
            .display_handle()
            .context("window has no display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("window has no window handle")?
            .as_raw();

        let display = unsafe { Display::new(display_handle, api_preference(window_handle)) }
            .context("failed to create GL display")?;

        let gl_config = unsafe { display.find_configs(ConfigTemplate::default()) }
            .context("failed to query GL configs")?
            .next()
            .context("no GL config available for this display")?;

        let physical_size = window.inner_size();
        let width = NonZeroU32::new(physical_size.width).context("window has zero width")?;
        let height = NonZeroU32::new(physical_size.height).context("window has zero height")?;

        let surface_attributes =
            SurfaceAttributesBuilder::<WindowSurface>::new().build(window_handle, width, height);
        let surface = unsafe { display.create_window_surface(&gl_config, &surface_attributes) }
            .context("failed to create window surface")?;

        // 3.3 core: the oldest profile that accepts `#version 330 core`.
        let context_attributes = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(window_handle));
        let context = unsafe { display.create_context(&gl_config, &context_attributes) }
            .context("failed to create GL 3.3 core context")?
            .make_current(&surface)
            .context("failed to make GL context current")?;

        if let Err(e) = surface.set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::MIN)) {
            warn!("vsync unavailable: {e}");
        }

        let gl = unsafe {
            Arc::new(glow::Context::from_loader_function(|symbol| {
                CString::new(symbol)
                    .map(|name| display.get_proc_address(&name))
                    .unwrap_or(std::ptr::null())
            }))
        };
        let version = unsafe { glow::HasContext::get_parameter_string(&*gl, glow::VERSION) };
        info!("OpenGL {version}");

        resize_viewport(&*gl, width, height);

        let program = if config.strict {
            ShaderProgram::from_files_strict(gl.clone(), &config.vertex_path, &config.fragment_path)?
        } else {
            ShaderProgram::from_files(gl.clone(), &config.vertex_path, &config.fragment_path)?
        };
        let quad = Quad::new(gl.clone())?;

        Ok(Self {
            quad,
            program,
            gl,
            surface,
            context,
            window,
        })
    }

    fn resize(&self, size: PhysicalSize<u32>) {
        // Minimized windows report a zero size.
        let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) else {
            return;
        };
        self.surface.resize(&self.context, width, height);
        resize_viewport(&*self.gl, width, height);
    }

    fn render(&self, clear_color: [f32; 4]) -> Result<()> {
        draw_frame(&*self.gl, &self.program, &self.quad, clear_color);

        self.surface
            .swap_buffers(&self.context)
            .context("failed to swap buffers")?;
        self.window.request_redraw();
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn api_preference(window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Wgl(Some(window))
}

#[cfg(target_os = "macos")]
fn api_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Cgl
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn api_preference(_window: RawWindowHandle) -> DisplayApiPreference {
    DisplayApiPreference::Egl
}

pub struct App {
    config: Config,
    state: Option<RenderState>,
    failure: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
            failure: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.failure = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match RenderState::new(event_loop, &self.config) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_ref() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested; stopping");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                info!("escape pressed; stopping");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => state.resize(size),
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render(self.config.clear_color) {
                    self.fail(event_loop, e);
                }
            }
            _ => (),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Release GL objects before the context goes away.
        self.state = None;
    }
}
