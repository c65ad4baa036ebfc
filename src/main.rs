use anyhow::{Context, Result};
use log::info;
use winit::event_loop::{ControlFlow, EventLoop};

use quad_bringup::logging::{init_logging, LoggingConfig};
use quad_bringup::Config;

mod app;
use app::App;

fn main() -> Result<()> {
    let config = Config::from_args();

    init_logging(LoggingConfig {
        env_filter: config.log_filter.clone(),
        ..LoggingConfig::default()
    });
    info!("starting {}", config.title);

    let event_loop = EventLoop::new().context("failed to create event loop")?;

    // Wait between events; each frame requests the next redraw itself.
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("event loop exited with an error")?;

    app.finish()
}
