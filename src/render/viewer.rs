use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel as xchan;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use wgpu::util::DeviceExt;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, Ime, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, ModifiersState, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

use crate::config::Configuration;
use crate::events::{DecodeFrame, DecodedFrame, LoaderReply};
use crate::geometry::{Vertex, indicator_position, quad_vertices, viewport_rect};
use crate::input::{InputController, Mode, Outcome};
use crate::playback::{ClipPlayer, Playback, dispatch, format_clock};
use crate::render::frames::FramePump;
use crate::render::indicator::IndicatorRenderer;
use crate::render::loader::{LoaderMsg, spawn_loader};
use crate::settings::SettingsStore;

const WINDOW_TITLE: &str = "corner-pin-player";

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

struct FrameTex {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    w: u32,
    h: u32,
}

struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    vbuf: wgpu::Buffer,
    // [mirrored, 0, 0, 0]
    params: wgpu::Buffer,
    sampler: wgpu::Sampler,
    frame: FrameTex,

    indicator: IndicatorRenderer,
}

/// Lets the input controller's playback commands reach the clip clock and
/// the window.
struct PlaybackControls<'a> {
    player: &'a mut ClipPlayer,
    window: Option<&'a Window>,
}

impl Playback for PlaybackControls<'_> {
    fn toggle_play(&mut self) {
        let playing = !self.player.is_playing();
        self.player.set_playing(playing);
        info!(playing, "playback toggled");
    }

    fn seek_start(&mut self) {
        self.player.rewind();
        info!("playback rewound to start");
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window else { return };
        if window.fullscreen().is_some() {
            window.set_fullscreen(None);
            info!("leaving fullscreen");
        } else {
            window.set_fullscreen(Some(Fullscreen::Borderless(window.current_monitor())));
            info!("entering fullscreen");
        }
    }

    fn exit_fullscreen(&mut self) {
        let Some(window) = self.window else { return };
        if window.fullscreen().is_some() {
            window.set_fullscreen(None);
            info!("leaving fullscreen");
        } else {
            debug!("exit-fullscreen requested while windowed");
        }
    }
}

struct ViewerApp {
    cfg: Configuration,
    cancel: CancellationToken,
    frames: Vec<PathBuf>,

    controller: InputController,
    store: SettingsStore,
    player: ClipPlayer,
    modifiers: ModifiersState,

    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    title: String,

    // decode pipeline, started once the texture limit is known
    tx_req: Option<xchan::Sender<LoaderMsg>>,
    rx_res: Option<xchan::Receiver<LoaderReply>>,
    loader: Option<JoinHandle<()>>,
    pump: FramePump,
    clip_size: (u32, u32),
}

impl ViewerApp {
    fn new(
        cfg: Configuration,
        frames: Vec<PathBuf>,
        controller: InputController,
        store: SettingsStore,
        cancel: CancellationToken,
    ) -> Self {
        let pump = FramePump::new(frames.len());
        let player = ClipPlayer::new(frames.len(), cfg.frame_rate);

        Self {
            cfg,
            cancel,
            frames,
            controller,
            store,
            player,
            modifiers: ModifiersState::empty(),
            window: None,
            gpu: None,
            title: String::new(),
            tx_req: None,
            rx_res: None,
            loader: None,
            pump,
            clip_size: (0, 0),
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let mut attrs = WindowAttributes::default().with_title(WINDOW_TITLE);
        if self.cfg.start_fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let PhysicalSize { width, height } = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        // black until the first decoded frame arrives
        let frame = upload_texture(&device, &queue, &[0, 0, 0, 255], 1, 1);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("corner-pin-params"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("corner-pin-quad"),
            contents: bytemuck::cast_slice(&[Vertex {
                pos: [0.0; 2],
                uv: [0.0; 2],
            }; 6]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("corner-pin-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/corner_pin.wgsl").into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("corner-pin-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = create_bind_group(&device, &bind_layout, &frame, &sampler, &params);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("corner-pin-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("corner-pin-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let indicator = IndicatorRenderer::new(&device, format, &self.cfg.indicator);
        self.start_loader(device.limits().max_texture_dimension_2d);

        self.gpu = Some(Gpu {
            surface,
            device,
            queue,
            config,
            pipeline,
            bind_layout,
            bind_group,
            vbuf,
            params,
            sampler,
            frame,
            indicator,
        });
        Ok(())
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        let Some(gpu) = self.gpu.as_mut() else { return };
        gpu.config.width = new_size.width.max(1);
        gpu.config.height = new_size.height.max(1);
        gpu.surface.configure(&gpu.device, &gpu.config);
        debug!(
            width = gpu.config.width,
            height = gpu.config.height,
            "viewer surface resized",
        );
        self.request_redraw();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        let outcome = self
            .controller
            .handle_key(code, self.modifiers.shift_key(), self.clip_size);
        match outcome {
            Outcome::Mutated => {
                self.store.save(&self.controller.snapshot());
            }
            Outcome::Delegate(cmd) => {
                let mut controls = PlaybackControls {
                    player: &mut self.player,
                    window: self.window.as_deref(),
                };
                dispatch(&mut controls, cmd);
            }
            Outcome::Handled => {
                if let Mode::CornerSelected(corner) = self.controller.mode() {
                    debug!(?corner, "corner selected");
                }
            }
            Outcome::Quit => {
                info!("quit requested");
                event_loop.exit();
            }
            Outcome::Ignored => {}
        }
        if outcome.is_consumed() {
            self.request_redraw();
        }
    }

    fn start_loader(&mut self, max_dim: u32) {
        if self.loader.is_some() {
            return;
        }
        let (tx_req, rx_req) = xchan::unbounded::<LoaderMsg>();
        let (tx_res, rx_res) = xchan::unbounded::<LoaderReply>();
        self.loader = Some(spawn_loader(rx_req, tx_res, max_dim));
        self.tx_req = Some(tx_req);
        self.rx_res = Some(rx_res);
        debug!(max_dim, "frame loader started");
    }

    /// Upload the frame the clock wants, if it has arrived, and queue the
    /// frames playback needs next.
    fn pump_frames(&mut self) {
        let due = self.player.tick(Instant::now());

        let mut upload = None;
        if let Some(rx_res) = self.rx_res.as_ref() {
            while let Ok(reply) = rx_res.try_recv() {
                if let Some(frame) = self.pump.accept(reply, due) {
                    upload = Some(frame);
                }
            }
        }
        if let Some(frame) = upload.or_else(|| self.pump.take_due(due)) {
            self.show_frame(frame);
        }

        let Some(tx_req) = self.tx_req.as_ref() else {
            return;
        };
        for index in self.pump.wanted(due) {
            let job = DecodeFrame {
                index,
                path: self.frames[index].clone(),
            };
            if tx_req.send(LoaderMsg::Decode(job)).is_err() {
                warn!("frame loader channel closed");
                break;
            }
            self.pump.mark_requested(index);
        }
    }

    fn show_frame(&mut self, frame: DecodedFrame) {
        let Some(gpu) = self.gpu.as_mut() else { return };
        let (w, h) = frame.size;
        if w == 0 || h == 0 || frame.pixels.len() != (w as usize) * (h as usize) * 4 {
            warn!(index = frame.index, w, h, "discarding malformed frame");
            self.pump.mark_invalid(frame.index);
            return;
        }
        if gpu.frame.w == w && gpu.frame.h == h {
            write_frame(&gpu.queue, &gpu.frame.texture, &frame.pixels, w, h);
        } else {
            gpu.frame = upload_texture(&gpu.device, &gpu.queue, &frame.pixels, w, h);
            gpu.bind_group = create_bind_group(
                &gpu.device,
                &gpu.bind_layout,
                &gpu.frame,
                &gpu.sampler,
                &gpu.params,
            );
            if self.clip_size != (w, h) {
                info!(width = w, height = h, "clip size known");
            }
        }
        self.clip_size = (w, h);
        self.pump.mark_shown(frame.index);
    }

    fn update_title(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let mut title = format!(
            "{WINDOW_TITLE} {} / {}",
            format_clock(self.player.position()),
            format_clock(self.player.duration())
        );
        if !self.player.is_playing() {
            title.push_str(" (paused)");
        }
        if title != self.title {
            window.set_title(&title);
            self.title = title;
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else { return };

        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                if let Some(window) = self.window.clone() {
                    self.handle_resize(window.inner_size());
                }
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                if let Some(window) = self.window.clone() {
                    self.handle_resize(window.inner_size());
                }
                return;
            }
        };

        let state = self.controller.state();
        let surface_size = (gpu.config.width, gpu.config.height);
        let rect = viewport_rect(surface_size, self.clip_size, &state.view);
        let vertices = quad_vertices(&state.offsets, &rect, surface_size);
        gpu.queue
            .write_buffer(&gpu.vbuf, 0, bytemuck::cast_slice(&vertices));
        let mirrored = if state.view.mirrored { 1.0f32 } else { 0.0 };
        gpu.queue.write_buffer(
            &gpu.params,
            0,
            bytemuck::bytes_of(&[mirrored, 0.0, 0.0, 0.0]),
        );

        let center = match state.mode {
            Mode::CornerSelected(corner) => {
                Some(indicator_position(&rect, &state.offsets, corner))
            }
            Mode::NoSelection => None,
        };
        #[allow(clippy::cast_precision_loss)]
        let viewport = [surface_size.0 as f32, surface_size.1 as f32];
        gpu.indicator.update(&gpu.queue, center, viewport);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("viewer-encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("viewer-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_pipeline(&gpu.pipeline);
            rpass.set_bind_group(0, &gpu.bind_group, &[]);
            rpass.set_vertex_buffer(0, gpu.vbuf.slice(..));
            rpass.draw(0..6, 0..1);
            gpu.indicator.draw(&mut rpass);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.gpu.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        self.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => self.handle_resize(new_size),
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::Ime(Ime::Enabled) => self.controller.set_text_entry_active(true),
            WindowEvent::Ime(Ime::Disabled) => self.controller.set_text_entry_active(false),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && let PhysicalKey::Code(code) = event.physical_key
                {
                    self.handle_key(event_loop, code);
                }
            }
            WindowEvent::RedrawRequested => self.draw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.pump_frames();
        self.update_title();
        // redraw every display refresh for as long as the window lives
        self.request_redraw();
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.store.flush_now(&self.controller.snapshot());
        if let Some(tx_req) = self.tx_req.take() {
            let _ = tx_req.send(LoaderMsg::Quit);
        }
        if let Some(loader) = self.loader.take()
            && loader.join().is_err()
        {
            warn!("frame loader thread panicked");
        }
        info!("viewer shut down; settings flushed");
    }
}

/// Run the viewer on the calling thread until the window closes or `cancel`
/// fires. Settings are flushed synchronously on the way out.
pub fn run_windowed(
    cfg: Configuration,
    frames: Vec<PathBuf>,
    controller: InputController,
    store: SettingsStore,
    cancel: CancellationToken,
) -> Result<()> {
    info!(frames = frames.len(), fps = cfg.frame_rate, "starting viewer");
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cfg, frames, controller, store, cancel);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    pixels: &[u8],
    w: u32,
    h: u32,
) -> FrameTex {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("clip-frame"),
        size: wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    write_frame(queue, &texture, pixels, w, h);
    FrameTex {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        texture,
        w,
        h,
    }
}

fn write_frame(queue: &wgpu::Queue, texture: &wgpu::Texture, pixels: &[u8], w: u32, h: u32) {
    queue.write_texture(
        texture.as_image_copy(),
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * w),
            rows_per_image: Some(h),
        },
        wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        },
    );
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    frame: &FrameTex,
    sampler: &wgpu::Sampler,
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("corner-pin-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&frame.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params.as_entire_binding(),
            },
        ],
    })
}
