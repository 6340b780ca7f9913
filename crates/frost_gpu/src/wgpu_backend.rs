//! wgpu implementation of [`GpuBackend`]
//!
//! Draws are recorded into a single pending command encoder and flushed on
//! [`submit`](GpuBackend::submit). Completion of each submission is reported through
//! `Queue::on_submitted_work_done` into an atomic watermark read by `poll`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use frost_core::{Color, IntSize};
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::backend::{
    texture_bytes, DrawPass, GpuBackend, GpuStats, Program, SubTexture, SubmissionIndex,
    TextureId, TextureOrigin,
};
use crate::error::{GpuError, Result};
use crate::primitives::PassUniforms;
use crate::shaders::PASS_SHADER;

/// Format of every texture the backend allocates
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Adapter and device request options
#[derive(Clone, Debug)]
pub struct WgpuBackendConfig {
    /// GPU power preference
    pub power_preference: wgpu::PowerPreference,
    /// Backends to probe (None = primary backend of the current platform)
    pub backends: Option<wgpu::Backends>,
    /// Use the software adapter (useful on CI machines)
    pub force_fallback_adapter: bool,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            backends: None,
            force_fallback_adapter: false,
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: IntSize,
}

/// Render pipelines, one per [`Program`]
struct Pipelines {
    copy: wgpu::RenderPipeline,
    blur: wgpu::RenderPipeline,
    composite: wgpu::RenderPipeline,
    noise: wgpu::RenderPipeline,
}

/// GPU backend on a wgpu device
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
    sampler: wgpu::Sampler,
    /// Bound in place of an absent source or mask
    placeholder: GpuTexture,
    max_texture_dimension: u32,
    textures: SlotMap<TextureId, GpuTexture>,
    encoder: Option<wgpu::CommandEncoder>,
    submitted: u64,
    completed: Arc<AtomicU64>,
    stats: GpuStats,
}

impl WgpuBackend {
    /// Get the preferred backend for the current platform
    fn preferred_backends() -> wgpu::Backends {
        #[cfg(target_os = "macos")]
        {
            wgpu::Backends::METAL
        }
        #[cfg(target_os = "windows")]
        {
            wgpu::Backends::DX12
        }
        #[cfg(target_os = "linux")]
        {
            wgpu::Backends::VULKAN
        }
        #[cfg(target_arch = "wasm32")]
        {
            wgpu::Backends::BROWSER_WEBGPU | wgpu::Backends::GL
        }
        #[cfg(not(any(
            target_os = "macos",
            target_os = "windows",
            target_os = "linux",
            target_arch = "wasm32"
        )))]
        {
            wgpu::Backends::PRIMARY
        }
    }

    /// Request an adapter and device and build the pass pipelines
    pub async fn new(config: WgpuBackendConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends.unwrap_or_else(Self::preferred_backends),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::AdapterNotFound)?;

        let info = adapter.get_info();
        tracing::info!("frost using {:?} adapter '{}'", info.backend, info.name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Frost GPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        Ok(Self::from_device(Arc::new(device), Arc::new(queue)))
    }

    /// Blocking variant of [`new`](Self::new)
    pub fn new_blocking(config: WgpuBackendConfig) -> Result<Self> {
        pollster::block_on(Self::new(config))
    }

    /// Build on a device owned by the host application
    pub fn from_device(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let bind_group_layout = Self::create_bind_group_layout(&device);
        let pipelines = Self::create_pipelines(&device, &bind_group_layout);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frost Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let placeholder_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frost Placeholder Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let placeholder = GpuTexture {
            view: placeholder_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            texture: placeholder_texture,
            size: IntSize::new(1, 1),
        };

        let max_texture_dimension = device.limits().max_texture_dimension_2d;

        Self {
            device,
            queue,
            bind_group_layout,
            pipelines,
            sampler,
            placeholder,
            max_texture_dimension,
            textures: SlotMap::with_key(),
            encoder: None,
            submitted: 0,
            completed: Arc::new(AtomicU64::new(0)),
            stats: GpuStats::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Underlying wgpu texture, for presentation targets that copy into a surface
    pub fn wgpu_texture(&self, texture: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(texture).map(|t| &t.texture)
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frost Pass Bind Group Layout"),
            entries: &[
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // Source texture
                texture_entry(1),
                // Shared sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Mask texture
                texture_entry(3),
            ],
        })
    }

    fn create_pipelines(device: &wgpu::Device, layout: &wgpu::BindGroupLayout) -> Pipelines {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Frost Pass Shader"),
            source: wgpu::ShaderSource::Wgsl(PASS_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Frost Pass Pipeline Layout"),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        // Noise only moves RGB toward the grain; target alpha is kept as is
        let noise_blend = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Zero,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };

        let create = |label: &str, entry_point: &str, blend: Option<wgpu::BlendState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TEXTURE_FORMAT,
                        blend,
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
            })
        };

        Pipelines {
            copy: create("Frost Copy Pipeline", "fs_copy", None),
            blur: create("Frost Blur Pipeline", "fs_blur", None),
            composite: create("Frost Composite Pipeline", "fs_composite", None),
            noise: create("Frost Noise Pipeline", "fs_noise", Some(noise_blend)),
        }
    }

    /// Submit recorded commands without advancing the submission index
    fn flush_encoder(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Record one full-target pass into the pending encoder
    fn encode_pass(&mut self, pass: &DrawPass) -> Result<()> {
        let target_view = texture_view(&self.textures, pass.target)?;
        let source_view = match pass.source {
            Some(source) => texture_view(&self.textures, source.texture)?,
            None => &self.placeholder.view,
        };
        let mask_view = match pass.mask {
            Some(mask) => texture_view(&self.textures, mask.texture)?,
            None => &self.placeholder.view,
        };
        let source_size = pass
            .source
            .and_then(|s| self.textures.get(s.texture))
            .map(|t| (t.size.width, t.size.height))
            .unwrap_or((1, 1));

        let uniforms = PassUniforms::for_pass(pass, source_size);
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Frost Pass Uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frost Pass Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
            ],
        });

        let pipeline = match pass.program {
            Program::Copy => &self.pipelines.copy,
            Program::Blur { .. } => &self.pipelines.blur,
            Program::Composite { .. } => &self.pipelines.composite,
            Program::Noise { .. } => &self.pipelines.noise,
        };
        let load = if pass.program.blends_onto_target() {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        };

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frost Pass Encoder"),
            })
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        Ok(())
    }
}

fn texture_view(
    textures: &SlotMap<TextureId, GpuTexture>,
    texture: TextureId,
) -> Result<&wgpu::TextureView> {
    textures
        .get(texture)
        .map(|t| &t.view)
        .ok_or(GpuError::UnknownTexture)
}

/// Padded bytes per row for wgpu buffer alignment
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn texture_origin(&self) -> TextureOrigin {
        TextureOrigin::TopLeft
    }

    fn create_texture(&mut self, label: &str, size: IntSize) -> Result<TextureId> {
        if size.is_empty()
            || size.width > self.max_texture_dimension
            || size.height > self.max_texture_dimension
        {
            return Err(GpuError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            tracing::warn!("texture '{}' allocation failed: {}", label, error);
            texture.destroy();
            return Err(GpuError::OutOfMemory {
                width: size.width,
                height: size.height,
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.stats.textures_created += 1;
        self.stats.live_textures += 1;
        self.stats.live_bytes += texture_bytes(size);
        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            size,
        }))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(texture) {
            // Pending passes may still reference it
            self.flush_encoder();
            tex.texture.destroy();
            self.stats.textures_destroyed += 1;
            self.stats.live_textures -= 1;
            self.stats.live_bytes -= texture_bytes(tex.size);
        }
    }

    fn texture_size(&self, texture: TextureId) -> Option<IntSize> {
        self.textures.get(texture).map(|t| t.size)
    }

    fn write_texture(&mut self, texture: TextureId, pixels: &[u8]) -> Result<()> {
        // Earlier recorded passes must observe the old contents
        self.flush_encoder();

        let tex = self.textures.get(texture).ok_or(GpuError::UnknownTexture)?;
        let size = tex.size;
        if pixels.len() as u64 != texture_bytes(size) {
            return Err(GpuError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.stats.uploads += 1;
        Ok(())
    }

    fn clear(&mut self, texture: TextureId, color: Color) -> Result<()> {
        let view = texture_view(&self.textures, texture)?;
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frost Pass Encoder"),
            })
        });

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Frost Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color.r as f64,
                        g: color.g as f64,
                        b: color.b as f64,
                        a: color.a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        self.stats.clears += 1;
        Ok(())
    }

    fn blit(&mut self, source: SubTexture, target: TextureId) -> Result<()> {
        self.encode_pass(&DrawPass {
            label: "Frost Blit",
            program: Program::Copy,
            source: Some(source),
            mask: None,
            target,
        })?;
        self.stats.blits += 1;
        Ok(())
    }

    fn draw(&mut self, pass: &DrawPass) -> Result<()> {
        self.encode_pass(pass)?;
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn submit(&mut self) -> SubmissionIndex {
        match self.encoder.take() {
            Some(encoder) => {
                self.queue.submit(std::iter::once(encoder.finish()));
            }
            None => {
                self.queue.submit(std::iter::empty());
            }
        }

        self.submitted += 1;
        self.stats.submissions += 1;
        let index = self.submitted;
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(index, Ordering::AcqRel);
        });
        SubmissionIndex(index)
    }

    fn poll(&mut self) -> Option<SubmissionIndex> {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        match self.completed.load(Ordering::Acquire) {
            0 => None,
            index => Some(SubmissionIndex(index)),
        }
    }

    fn read_pixels(&mut self, texture: TextureId) -> Result<Vec<u8>> {
        self.flush_encoder();

        let tex = self.textures.get(texture).ok_or(GpuError::UnknownTexture)?;
        let (width, height) = (tex.size.width, tex.size.height);
        let bytes_per_row = padded_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frost Readback Buffer"),
            size: (bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frost Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in 0..height {
                let start = (row * bytes_per_row) as usize;
                pixels.extend_from_slice(&data[start..start + (width * 4) as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }

    fn stats(&self) -> GpuStats {
        self.stats
    }
}
