//! Triangle demo application
//!
//! Opens a window and renders a single triangle every frame, exercising the
//! whole frame lifecycle: acquire, record, submit, present and resize.
//!
//! Usage: `ember [config.toml|config.ron]` (defaults to `ember.toml` if present)

use std::path::Path;

use ember_engine::prelude::*;
use glfw::{Action, Key, WindowEvent};

const DEFAULT_CONFIG: &str = "ember.toml";

struct TriangleApp {
    // Declared before the window and platform so the device goes first
    renderer: Renderer<VulkanDevice>,
    window: Window,
    _platform: PlatformGuard,
}

impl TriangleApp {
    fn new(config: &ApplicationConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let platform = PlatformGuard::init()?;
        let mut window = Window::new(&platform, &config.window)?;

        let context = match GpuContext::with_window(&platform, &mut window, &config.renderer) {
            Ok(context) => context,
            Err(err) => ember_engine::foundation::fatal("Unable to create GPU context", &err),
        };
        let mut renderer = Renderer::new(context);

        match load_pipeline_shaders(&config.renderer.shaders) {
            Ok((vertex, fragment)) => {
                renderer.install_pipeline(&RenderPipelineDesc::new(vertex.words(), fragment.words()))?;
                log::info!("Triangle pipeline installed");
            }
            Err(err) => {
                log::warn!("Shaders unavailable, rendering clear color only: {}", err);
            }
        }

        Ok(Self {
            renderer,
            window,
            _platform: platform,
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut frames: u64 = 0;

        while !self.window.should_close() {
            self.window.poll_events();

            let mut resized = None;
            let mut close_requested = false;
            for (_, event) in self.window.flush_events() {
                match event {
                    WindowEvent::FramebufferSize(width, height) => {
                        resized = Some((width.max(0) as u32, height.max(0) as u32));
                    }
                    WindowEvent::Key(Key::Escape, _, Action::Press, _) => close_requested = true,
                    _ => {}
                }
            }
            if close_requested {
                self.window.set_should_close(true);
            }
            if let Some((width, height)) = resized {
                log::debug!("Framebuffer resized to {}x{}", width, height);
                self.renderer.resize(width, height);
            }

            match self.renderer.render(&self.window) {
                Ok(FrameOutcome::Presented) => frames += 1,
                Ok(FrameOutcome::Skipped) => {}
                Err(err) if err.is_timeout() => log::warn!("Frame skipped: {}", err),
                Err(err) => {
                    log::error!("Frame failed: {}", err);
                    return Err(err.into());
                }
            }
        }

        log::info!("Presented {} frames", frames);
        Ok(())
    }
}

fn load_pipeline_shaders(shaders: &ShaderConfig) -> Result<(ShaderBytecode, ShaderBytecode), ShaderError> {
    let vertex = ShaderBytecode::from_file(shaders.vertex_path())?;
    let fragment = ShaderBytecode::from_file(shaders.fragment_path())?;
    Ok((vertex, fragment))
}

fn load_config() -> Result<ApplicationConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => ApplicationConfig::load_from_file(DEFAULT_CONFIG)?,
        None => ApplicationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {}", panic_info);
    }));

    let config = load_config()?;
    logging::init(&config.engine.log_level);

    log::info!("Starting Ember triangle demo");

    let mut app = TriangleApp::new(&config)?;
    let result = app.run();

    match result {
        Ok(()) => {
            log::info!("Triangle demo finished");
            Ok(())
        }
        Err(e) => {
            log::error!("Triangle demo failed: {:?}", e);
            Err(e)
        }
    }
}
