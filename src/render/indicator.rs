use crate::config::IndicatorConfig;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    center_viewport: [f32; 4],
    shape: [f32; 4],
    color: [f32; 4],
}

/// Draws the ring marking the selected corner.
pub struct IndicatorRenderer {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    params: wgpu::Buffer,
    radius_px: f32,
    stroke_px: f32,
    color: [f32; 4],
    visible: bool,
}

impl IndicatorRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, cfg: &IndicatorConfig) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("indicator-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("indicator-params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("indicator-bind-group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("indicator-shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "shaders/indicator.wgsl"
            ))),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("indicator-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("indicator-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group,
            params,
            radius_px: cfg.radius_px,
            stroke_px: cfg.stroke_px,
            color: cfg.color_rgba(),
            visible: false,
        }
    }

    /// Position the ring for this frame; `None` hides it.
    pub fn update(&mut self, queue: &wgpu::Queue, center_px: Option<[f32; 2]>, viewport: [f32; 2]) {
        let Some([cx, cy]) = center_px else {
            self.visible = false;
            return;
        };
        let params = Params {
            center_viewport: [cx, cy, viewport[0], viewport[1]],
            shape: [self.radius_px, self.stroke_px, 0.0, 0.0],
            color: self.color,
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
        self.visible = true;
    }

    pub fn draw(&self, rpass: &mut wgpu::RenderPass<'_>) {
        if !self.visible {
            return;
        }
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}
