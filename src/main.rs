use dear_imgui_rs::*;
use dear_imgui_wgpu::WgpuRenderer;
use dear_imgui_winit::WinitPlatform;
use pollster::block_on;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{sync::Arc, time::Instant};
use tracing_subscriber::EnvFilter;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use rasterview::cli::{self, CliAction, Launch};
use rasterview::interrupt;
use rasterview::settings::{AppSettings, load_settings};
use rasterview::ui::{ControlPanel, ViewStatus};
use rasterview::{
    ByteSource, CancelFlag, Controller, FileSource, RasterMapper, RenderSink, RenderTarget,
    ScrollState,
};

type Viewer = Controller<Box<dyn ByteSource>>;

struct ImguiState {
    context: Context,
    platform: WinitPlatform,
    renderer: WgpuRenderer,
    clear_color: wgpu::Color,
    last_frame: Instant,
}

/// Presents the raster by writing it straight into the frame texture.
struct SurfaceSink<'a> {
    queue: &'a wgpu::Queue,
    texture: &'a wgpu::Texture,
    enabled: bool,
    /// Set for BGRA8 surfaces; the grid is swizzled through `staging`.
    bgra: bool,
    staging: &'a mut Vec<u8>,
}

impl RenderSink for SurfaceSink<'_> {
    fn viewport(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    fn present(&mut self, target: RenderTarget<'_>) {
        if !self.enabled {
            return;
        }
        // The grid keeps its old size while the window is minimized
        if (target.width, target.height) != self.viewport() {
            return;
        }

        let data = if self.bgra {
            target.bgra_into(self.staging);
            &self.staging[..]
        } else {
            target.as_bytes()
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.width * 4),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Formats the RGBA8 grid can be copied into, directly or swizzled.
fn accepts_raster(format: wgpu::TextureFormat) -> bool {
    is_bgra(format)
        || matches!(
            format,
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
        )
}

fn is_bgra(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    )
}

struct AppWindow {
    device: wgpu::Device,
    queue: wgpu::Queue,
    window: Arc<Window>,
    surface_desc: wgpu::SurfaceConfiguration,
    surface: wgpu::Surface<'static>,
    imgui: ImguiState,
    raster_enabled: bool,
    raster_bgra: bool,
    raster_staging: Vec<u8>,
    viewer: Viewer,
    scroll: ScrollState,
    panel: ControlPanel,
}

struct App {
    pending: Option<Viewer>,
    title: String,
    settings: AppSettings,
    cancel: CancelFlag,
    window: Option<AppWindow>,
    failed: bool,
}

impl AppWindow {
    fn new(
        event_loop: &ActiveEventLoop,
        viewer: Viewer,
        title: &str,
        settings: &AppSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_title(title)
                    .with_inner_size(LogicalSize::new(
                        f64::from(settings.window_width),
                        f64::from(settings.window_height),
                    )),
            )?,
        );

        let surface = instance.create_surface(window.clone())?;

        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) =
            block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))?;

        let physical_size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let preferred_srgb = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        let format = preferred_srgb
            .iter()
            .cloned()
            .find(|f| caps.formats.contains(f))
            .or_else(|| caps.formats.first().copied())
            .ok_or("surface reports no supported formats")?;

        let raster_enabled =
            caps.usages.contains(wgpu::TextureUsages::COPY_DST) && accepts_raster(format);
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if raster_enabled {
            usage |= wgpu::TextureUsages::COPY_DST;
        } else {
            tracing::warn!(?format, "surface does not accept raster uploads; raster disabled");
        }

        let surface_desc = wgpu::SurfaceConfiguration {
            usage,
            format,
            width: physical_size.width,
            height: physical_size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &surface_desc);

        let mut context = Context::create();
        context
            .set_ini_filename(None::<String>)
            .map_err(|e| format!("imgui ini setup failed: {e:?}"))?;

        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(&window, dear_imgui_winit::HiDpiMode::Default, &mut context);

        let init_info =
            dear_imgui_wgpu::WgpuInitInfo::new(device.clone(), queue.clone(), surface_desc.format);
        let mut renderer = WgpuRenderer::new(init_info, &mut context)
            .map_err(|e| format!("failed to initialize WGPU renderer: {e:?}"))?;
        renderer.set_gamma_mode(dear_imgui_wgpu::GammaMode::Auto);

        let [r, g, b] = settings.background.map(|c| f64::from(c) / 255.0);
        let imgui = ImguiState {
            context,
            platform,
            renderer,
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            last_frame: Instant::now(),
        };

        tracing::info!("initialized program and display");

        Ok(Self {
            device,
            queue,
            window,
            surface_desc,
            surface,
            imgui,
            raster_enabled,
            raster_bgra: is_bgra(format),
            raster_staging: Vec::new(),
            viewer,
            scroll: ScrollState::new(),
            panel: ControlPanel::new(settings.wheel_rows),
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.surface_desc.width = new_size.width;
            self.surface_desc.height = new_size.height;
            self.surface.configure(&self.device, &self.surface_desc);
        }
    }

    fn render(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();
        let delta_time = now - self.imgui.last_frame;
        self.imgui.context.io_mut().set_delta_time(delta_time.as_secs_f32());
        self.imgui.last_frame = now;

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.surface_desc);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(e) => return Err(Box::new(e)),
        };

        self.imgui
            .platform
            .prepare_frame(&self.window, &mut self.imgui.context);
        let ui = self.imgui.context.frame();

        // Panel input decides this frame's offset
        let status = ViewStatus::of(&self.viewer);
        if let Some(palette) = self.panel.render(ui, &status, &mut self.scroll) {
            self.viewer.mapper_mut().set_policy(palette);
        }

        let mut sink = SurfaceSink {
            queue: &self.queue,
            texture: &frame.texture,
            enabled: self.raster_enabled,
            bgra: self.raster_bgra,
            staging: &mut self.raster_staging,
        };
        self.viewer.frame(&mut self.scroll, &mut sink);

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let draw_data = self.imgui.context.render();

        // The raster upload already covers the whole frame
        let load = if self.raster_enabled {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(self.imgui.clear_color)
        };

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ImGui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            self.imgui
                .renderer
                .new_frame()
                .map_err(|e| format!("failed to prepare new frame: {e:?}"))?;

            self.imgui
                .renderer
                .render_draw_data(draw_data, &mut rpass)?;
        }

        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

impl App {
    fn new(viewer: Viewer, title: String, settings: AppSettings, cancel: CancelFlag) -> Self {
        Self {
            pending: Some(viewer),
            title,
            settings,
            cancel,
            window: None,
            failed: false,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(w) = self.window.as_mut() {
            w.viewer.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let Some(viewer) = self.pending.take() else {
            return;
        };
        match AppWindow::new(event_loop, viewer, &self.title, &self.settings) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                tracing::error!("failed to create window: {e}");
                self.failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let window = match self.window.as_mut() {
            Some(w) => w,
            None => return,
        };

        window.imgui.platform.handle_window_event(
            &mut window.imgui.context,
            &window.window,
            &event,
        );

        match event {
            WindowEvent::Resized(size) => {
                window.resize(size);
                window.window.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = window.window.inner_size();
                window.resize(new_size);
                window.window.request_redraw();
            }
            WindowEvent::CloseRequested => {
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = window.render() {
                    tracing::error!("render error: {e}");
                }
                window.window.request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.load(Ordering::Relaxed) {
            tracing::info!("CTRL-C detected");
            self.shutdown(event_loop);
            return;
        }
        if let Some(window) = &self.window {
            window.window.request_redraw();
        }
    }
}

fn run(launch: Launch, settings: AppSettings) -> Result<(), Box<dyn std::error::Error>> {
    let buffer_size = launch.buffer_size.unwrap_or(settings.buffer_size);
    let source = FileSource::open_with(launch.path.as_path(), buffer_size, settings.backend)?;
    tracing::info!("initially read {} bytes into the buffer", source.valid_length());

    let palette = launch.palette.unwrap_or(settings.palette);
    let mapper = RasterMapper::new(settings.window_width, settings.window_height, palette)?
        .with_background(settings.background_color());
    let viewer = Controller::new(source, mapper);

    let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
    if let Err(e) = interrupt::install(&cancel) {
        tracing::warn!("cannot install Ctrl-C handler: {e}");
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::new(viewer, launch.path.window_title(), settings, cancel);
    event_loop.run_app(&mut app)?;

    if app.failed {
        return Err("could not initialize the display".into());
    }
    tracing::info!("closed the program successfully");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let launch = match cli::parse_args(std::env::args_os()) {
        CliAction::Run(launch) => launch,
        CliAction::Exit(code) => return ExitCode::from(code),
    };

    match run(launch, load_settings()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_formats() {
        assert!(accepts_raster(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert!(accepts_raster(wgpu::TextureFormat::Bgra8Unorm));
        assert!(!accepts_raster(wgpu::TextureFormat::Rgba16Float));

        assert!(is_bgra(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert!(!is_bgra(wgpu::TextureFormat::Rgba8Unorm));
    }
}
