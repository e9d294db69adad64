use std::sync::Arc;

use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowAttributes,
};

use crate::{gpu::GpuSimRenderer, sim::SimConfig};

pub mod gpu;
pub mod sim;

/// Message type for GPU renderer events
pub enum GpuMessage {
    Initialized(GpuSimRenderer),
    Error(String),
}

struct Application {
    proxy: Option<EventLoopProxy<GpuMessage>>,
    gpu_renderer: Option<GpuSimRenderer>,
    config: SimConfig,
    paused: bool,
}

impl Application {
    fn new(event_loop: &EventLoop<GpuMessage>, config: SimConfig) -> Self {
        Self {
            proxy: Some(event_loop.create_proxy()),
            gpu_renderer: None,
            config,
            paused: false,
        }
    }
}

impl winit::application::ApplicationHandler<GpuMessage> for Application {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.gpu_renderer.is_some() {
            return;
        }

        let window_attrs = WindowAttributes::default().with_title("gridlife");
        match event_loop.create_window(window_attrs) {
            Ok(window) => {
                if let Some(proxy) = self.proxy.take() {
                    let window = Arc::new(window);
                    let renderer_result =
                        pollster::block_on(GpuSimRenderer::new(window, &self.config));
                    match renderer_result {
                        Ok(renderer) => {
                            let _ = proxy.send_event(GpuMessage::Initialized(renderer));
                        }
                        Err(e) => {
                            log::error!("Failed to create GPU renderer: {e}");
                            let _ = proxy.send_event(GpuMessage::Error(e.to_string()));
                        }
                    }
                }
            }
            Err(e) => log::error!("failed to create window: {e}"),
        };
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: winit::event::WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.gpu_renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut renderer) = self.gpu_renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Space),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.paused = !self.paused;
                log::info!(
                    "Simulation {}",
                    if self.paused { "paused" } else { "resumed" }
                );
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.gpu_renderer {
                    let result = if self.paused {
                        // Paused: render current state but keep the loop going
                        renderer.render()
                    } else {
                        renderer.step_and_render()
                    };

                    match result {
                        Ok(()) => renderer.request_redraw(),
                        Err(wgpu::SurfaceError::Lost) => {
                            // Reconfigure the surface
                            let side = renderer.dimensions().side();
                            renderer.resize(side, side);
                            renderer.request_redraw();
                        }
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            log::error!("Out of memory!");
                            event_loop.exit();
                        }
                        Err(e) => {
                            log::warn!("Surface error: {e:?}");
                            renderer.request_redraw();
                        }
                    }
                }
            }
            _ => (),
        };
    }

    fn user_event(&mut self, event_loop: &winit::event_loop::ActiveEventLoop, event: GpuMessage) {
        match event {
            GpuMessage::Initialized(renderer) => {
                log::info!(
                    "GPU renderer initialized: {0}x{0} grid",
                    renderer.dimensions().side()
                );
                // Request first redraw to kick off the animation loop
                renderer.request_redraw();
                self.gpu_renderer = Some(renderer);
            }
            GpuMessage::Error(e) => {
                log::error!("GPU initialization error: {e}");
                event_loop.exit();
            }
        }
    }
}

/// Run the simulation with the given configuration until the window closes.
pub fn run(config: SimConfig) -> anyhow::Result<()> {
    log::info!("Starting Game of Life simulation with GPU rendering");

    let event_loop = EventLoop::<GpuMessage>::with_user_event().build()?;
    let mut app = Application::new(&event_loop, config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
