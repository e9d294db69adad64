//! Integrated GPU context for simulation and rendering.
//!
//! `GpuSimRenderer` owns the device and queue, the ping-pong cell state
//! buffers, the Life compute pipeline, and the render pipeline. Compute and
//! render share the same two storage buffers: each generation reads the
//! active buffer and writes the standby one, and rendering always binds
//! whichever buffer the iteration counter says is active.

use std::sync::Arc;
use std::time::{Duration, Instant};

use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, Buffer, BufferUsages, CommandEncoderDescriptor, ComputePipeline, Device,
    FragmentState, Instance, LoadOp, MultisampleState, Operations, PipelineLayoutDescriptor,
    PrimitiveState, Queue, RenderPassColorAttachment, RenderPassDescriptor, RenderPipeline,
    RenderPipelineDescriptor, ShaderStages, StoreOp, Surface, SurfaceConfiguration, TextureUsages,
    TextureViewDescriptor, VertexState,
    util::{BufferInitDescriptor, DeviceExt},
};
use winit::window::Window;

use crate::sim::{GridDims, PingPong, SeedPolicy, SimConfig, SimError, Slot, SlotPair};

/// Upper bound on generations advanced in a single frame, so a long stall
/// does not turn into a catch-up spiral.
const MAX_STEPS_PER_FRAME: u32 = 100;

/// The two cell state buffers and the iteration clock that assigns their
/// roles.
///
/// Both buffers are allocated once, with identical size, and never resized.
/// The primary buffer is uploaded from the seed policy; the secondary starts
/// zeroed and is only ever read after the first compute step has written it.
pub struct CellStateBuffers {
    bufs: SlotPair<Buffer>,
    clock: PingPong,
}

impl CellStateBuffers {
    /// Allocate and seed both buffers.
    ///
    /// Fails if the seed policy parameters are out of range or if the grid
    /// needs more storage than the device can bind.
    pub fn new(
        device: &Device,
        dims: GridDims,
        policy: &SeedPolicy,
        force_primary: bool,
    ) -> Result<Self, SimError> {
        let seed = seed_cells(dims, policy, device.limits().max_buffer_size)?;

        let primary = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("cell state primary"),
            contents: bytemuck::cast_slice(&seed),
            usage: BufferUsages::STORAGE,
        });
        let secondary = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cell state secondary"),
            size: primary.size(),
            usage: BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Ok(Self {
            bufs: SlotPair::new(primary, secondary),
            clock: PingPong::new(force_primary),
        })
    }

    /// The buffer holding the current, renderable generation.
    pub fn active_buffer(&self) -> &Buffer {
        &self.bufs[self.clock.active()]
    }

    /// The write target of the next compute step.
    pub fn standby_buffer(&self) -> &Buffer {
        &self.bufs[self.clock.standby()]
    }

    pub fn active(&self) -> Slot {
        self.clock.active()
    }

    /// Swap roles after a completed compute step.
    pub fn iterate(&mut self) {
        self.clock.iterate();
    }

    pub fn iteration_step(&self) -> u64 {
        self.clock.iteration_step()
    }

    fn buffer(&self, slot: Slot) -> &Buffer {
        &self.bufs[slot]
    }
}

/// Build the seed array for a grid that the device can actually hold.
///
/// The storage budget is checked before the seed policy runs, so a grid that
/// exceeds `max_buffer_size` fails with [`SimError::AllocationFailure`] without
/// first materializing a host-side copy it can never upload.
fn seed_cells(dims: GridDims, policy: &SeedPolicy, limit: u64) -> Result<Vec<u32>, SimError> {
    let cells = dims.cell_count();
    let bytes = cells * size_of::<u32>() as u64;
    if bytes > limit {
        return Err(SimError::AllocationFailure {
            cells,
            bytes,
            limit,
        });
    }
    policy.populate(dims)
}

/// Whole generations the elapsed time pays for, capped per frame.
///
/// Intervals beyond the cap are dropped from the accumulator rather than
/// carried, so a long stall costs one capped frame instead of a run of them.
fn steps_for_elapsed(accumulated: &mut Duration, interval: Duration, elapsed: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    *accumulated += elapsed;
    let steps = (accumulated.as_secs_f64() / interval.as_secs_f64()) as u32;
    *accumulated = accumulated.saturating_sub(interval * steps);
    steps.min(MAX_STEPS_PER_FRAME)
}

/// Compute half of the context.
struct ComputeContext {
    cells: CellStateBuffers,
    /// Dispatch bind groups keyed by the *active* slot: the entry for
    /// `Primary` reads primary and writes secondary, and vice versa.
    cells_bind_groups: SlotPair<BindGroup>,
    size_bind_group: BindGroup,
    pipeline: ComputePipeline,
}

/// Render half of the context.
struct RenderContext {
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    render_pipeline: RenderPipeline,
    /// Read-only bind groups keyed by the slot being displayed.
    cells_bind_groups: SlotPair<BindGroup>,
    size_bind_group: BindGroup,
}

pub struct GpuSimRenderer {
    #[allow(dead_code)]
    instance: Instance, // Keep instance alive for the lifetime of the renderer
    device: Arc<Device>,
    queue: Arc<Queue>,
    compute: ComputeContext,
    render: RenderContext,
    dims: GridDims,
    window: Arc<Window>,
    /// Wall-clock time between generations; zero means one per frame.
    step_interval: Duration,
    /// Time carried over toward the next generation.
    accumulated: Duration,
    last_frame: Option<Instant>,
}

impl GpuSimRenderer {
    /// Acquire a compute-capable device for the window's surface and build
    /// both pipelines.
    pub async fn new(window: Arc<Window>, config: &SimConfig) -> Result<Self, anyhow::Error> {
        let dims = config.dims()?;

        let instance = Instance::new(&wgpu::InstanceDescriptor::default());

        // Create surface first to find a compatible adapter
        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let downlevel_caps = adapter.get_downlevel_capabilities();
        if !downlevel_caps
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(anyhow::anyhow!("adapter does not support compute shaders"));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gridlife device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let compute = Self::create_compute_context(&device, dims, config)?;
        let render = Self::create_render_context(
            &device,
            surface,
            surface_config,
            surface_format,
            &compute.cells,
            dims,
        );

        Ok(Self {
            instance,
            device,
            queue,
            compute,
            render,
            dims,
            window,
            step_interval: config.step_interval,
            accumulated: Duration::ZERO,
            last_frame: None,
        })
    }

    /// Request a redraw of the window.
    /// Call this after rendering to keep the animation loop going.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    fn create_compute_context(
        device: &Device,
        dims: GridDims,
        config: &SimConfig,
    ) -> Result<ComputeContext, SimError> {
        let cells = CellStateBuffers::new(device, dims, &config.seed_policy, config.force_primary)?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("life compute shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("./sim/shader.wgsl").into()),
        });

        let cells_bg_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("cells bind group layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        // One bind group per direction; the active slot picks which one a
        // dispatch uses, so both are fixed for the process lifetime.
        let direction = |active: Slot| {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("cells bind group"),
                layout: &cells_bg_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: cells.buffer(active).as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: cells.buffer(active.complement()).as_entire_binding(),
                    },
                ],
            })
        };
        let cells_bind_groups = SlotPair::new(direction(Slot::Primary), direction(Slot::Secondary));

        let size_bg_layout = Self::size_layout(device, ShaderStages::COMPUTE);
        let size_bind_group = Self::size_bind_group(device, &size_bg_layout, dims);

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("life pipeline layout"),
            bind_group_layouts: &[&cells_bg_layout, &size_bg_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("life compute pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: None,
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(ComputeContext {
            cells,
            cells_bind_groups,
            size_bind_group,
            pipeline,
        })
    }

    fn create_render_context(
        device: &Device,
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        surface_format: wgpu::TextureFormat,
        cells: &CellStateBuffers,
        dims: GridDims,
    ) -> RenderContext {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("render shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("./rendering/render.wgsl").into()),
        });

        // Read-only view of one cell buffer for the fragment stage.
        let cells_bg_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("render cells bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let read_group = |slot: Slot| {
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("render cells bind group"),
                layout: &cells_bg_layout,
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: cells.buffer(slot).as_entire_binding(),
                }],
            })
        };
        let cells_bind_groups =
            SlotPair::new(read_group(Slot::Primary), read_group(Slot::Secondary));

        let size_bg_layout = Self::size_layout(device, ShaderStages::FRAGMENT);
        let size_bind_group = Self::size_bind_group(device, &size_bg_layout, dims);

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("render pipeline layout"),
            bind_group_layouts: &[&cells_bg_layout, &size_bg_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("render pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        RenderContext {
            surface,
            surface_config,
            render_pipeline,
            cells_bind_groups,
            size_bind_group,
        }
    }

    fn size_layout(device: &Device, visibility: ShaderStages) -> BindGroupLayout {
        device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("grid size bind group layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    fn size_bind_group(device: &Device, layout: &BindGroupLayout, dims: GridDims) -> BindGroup {
        let size_buf = device.create_buffer_init(&BufferInitDescriptor {
            label: Some("grid size buffer"),
            contents: bytemuck::cast_slice(&[dims.side(), dims.side()]),
            usage: BufferUsages::UNIFORM,
        });
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("grid size bind group"),
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: size_buf.as_entire_binding(),
            }],
        })
    }

    /// Advance the simulation by exactly one generation.
    ///
    /// The dispatch reads the active buffer and writes the standby buffer;
    /// the submit sequences that write before anything recorded afterwards,
    /// so swapping the roles immediately after is safe.
    pub fn compute_step(&mut self) {
        let num_dispatches = self.dims.cell_count().div_ceil(64) as u32;

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("compute encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("life step compute pass"),
                ..Default::default()
            });
            pass.set_pipeline(&self.compute.pipeline);
            // Re-queried every dispatch; never cached across an iterate().
            pass.set_bind_group(
                0,
                &self.compute.cells_bind_groups[self.compute.cells.active()],
                &[],
            );
            pass.set_bind_group(1, &self.compute.size_bind_group, &[]);
            pass.dispatch_workgroups(num_dispatches, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        self.compute.cells.iterate();
    }

    /// Advance as many generations as the elapsed time calls for, then render.
    ///
    /// The render cadence is the caller's redraw loop; the simulation cadence
    /// is `step_interval`. The two are decoupled here through a time
    /// accumulator, so a fast display does not speed up the automaton.
    pub fn step_and_render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let elapsed = match self.last_frame.replace(now) {
            Some(last) => now - last,
            // First frame: run a single step.
            None => self.step_interval,
        };

        let steps = steps_for_elapsed(&mut self.accumulated, self.step_interval, elapsed);
        for _ in 0..steps {
            self.compute_step();
        }

        self.render()
    }

    /// Render the active buffer without advancing the simulation.
    pub fn render(&self) -> Result<(), wgpu::SurfaceError> {
        let output = self.render.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("render encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.0,
                            b: 0.15,
                            a: 1.0,
                        }),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.render.render_pipeline);
            render_pass.set_bind_group(
                0,
                &self.render.cells_bind_groups[self.compute.cells.active()],
                &[],
            );
            render_pass.set_bind_group(1, &self.render.size_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    /// Resize the render surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.render.surface_config.width = width;
            self.render.surface_config.height = height;
            self.render
                .surface
                .configure(&self.device, &self.render.surface_config);
        }
    }

    /// Grid dimensions the cell buffers were allocated for.
    pub fn dimensions(&self) -> GridDims {
        self.dims
    }

    /// Completed generations since initialization.
    pub fn iteration_step(&self) -> u64 {
        self.compute.cells.iteration_step()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_budget_grid_fails_before_seeding() {
        // 50_000^2 cells need ~10 GB; a limit check that ran after seeding
        // would try to build that array on the host first.
        let dims = GridDims::new(50_000).unwrap();
        let limit = 1 << 28;
        let err = seed_cells(dims, &SeedPolicy::Checkerboard, limit).unwrap_err();
        assert_eq!(
            err,
            SimError::AllocationFailure {
                cells: dims.cell_count(),
                bytes: dims.cell_count() * 4,
                limit,
            }
        );
    }

    #[test]
    fn in_budget_grid_is_seeded() {
        let dims = GridDims::new(8).unwrap();
        let cells = seed_cells(dims, &SeedPolicy::Striped { period: 2 }, 1 << 20).unwrap();
        assert_eq!(cells.len() as u64, dims.cell_count());
    }

    #[test]
    fn invalid_policy_still_rejected_within_budget() {
        let dims = GridDims::new(8).unwrap();
        let policy = SeedPolicy::Striped { period: 0 };
        let err = seed_cells(dims, &policy, 1 << 20).unwrap_err();
        assert_eq!(err, SimError::ZeroStripePeriod);
    }

    #[test]
    fn zero_interval_runs_one_step_per_frame() {
        let mut accumulated = Duration::ZERO;
        let steps = steps_for_elapsed(&mut accumulated, Duration::ZERO, Duration::from_secs(5));
        assert_eq!(steps, 1);
        assert_eq!(accumulated, Duration::ZERO);
    }

    #[test]
    fn partial_intervals_carry_over() {
        let interval = Duration::from_secs(1);
        let mut accumulated = Duration::ZERO;
        assert_eq!(
            steps_for_elapsed(&mut accumulated, interval, Duration::from_millis(1500)),
            1
        );
        assert_eq!(accumulated, Duration::from_millis(500));
        assert_eq!(
            steps_for_elapsed(&mut accumulated, interval, Duration::from_millis(500)),
            1
        );
        assert_eq!(accumulated, Duration::ZERO);
    }

    #[test]
    fn stall_backlog_is_discarded() {
        let interval = Duration::from_secs(1);
        let mut accumulated = Duration::ZERO;
        // A long stall is worth 1000 generations but only the capped number
        // runs, and the rest does not linger in the accumulator.
        let steps = steps_for_elapsed(&mut accumulated, interval, Duration::from_secs(1000));
        assert_eq!(steps, MAX_STEPS_PER_FRAME);
        assert_eq!(accumulated, Duration::ZERO);
        // The very next ordinary frame is back to a single step.
        let steps = steps_for_elapsed(&mut accumulated, interval, Duration::from_secs(1));
        assert_eq!(steps, 1);
    }
}
