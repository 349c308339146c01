#[macro_use]
mod logging;
mod cli;
mod hotreload;
mod host;

use std::ffi::{c_void, CString};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;

use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, NotCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;

use raw_window_handle::HasRawWindowHandle;

use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};

use shadervst_engine::{load_patch, AudioBridge, EventSink, ParameterBank, Patch, Renderer, Surface};

use crate::cli::Cli;
use crate::hotreload::{HotEvent, HotReload};

fn proc_address(display: &glutin::display::Display, name: &str) -> *const c_void {
    match CString::new(name) {
        Ok(c) => display.get_proc_address(&c),
        Err(_) => std::ptr::null(),
    }
}

fn watch_shader_dirs(hot: &mut HotReload, patch: &Patch) {
    for slot in patch.slots() {
        if let Err(e) = hot.watch_parent(&slot.path) {
            logw!("HOT", "cannot watch {}: {e}", slot.path.display());
        }
    }
}

/// Re-read the patch and every shader; the renderer rebuilds on its next frame.
fn reload_patch(path: &Path, renderer: &mut Renderer, hot: Option<&mut HotReload>) {
    match load_patch(path) {
        Ok(patch) => {
            if let Some(hot) = hot {
                watch_shader_dirs(hot, &patch);
            }
            logi!("PATCH", "reloaded {} ({} slots)", path.display(), patch.slots().len());
            renderer.set_patch(patch);
        }
        Err(e) => loge!("PATCH", "reload failed: {e}"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;
    logging::init(cli.log_file.as_deref());

    let patch = load_patch(&cli.patch).with_context(|| format!("loading patch {}", cli.patch.display()))?;
    logi!(
        "PATCH",
        "loaded {} ({} slots, visualization {}x{})",
        cli.patch.display(),
        patch.slots().len(),
        patch.visualization().width,
        patch.visualization().height
    );

    let params = Arc::new(ParameterBank::new());
    let bridge = AudioBridge::new();
    let (event_tx, event_rx) = crossbeam_channel::unbounded();

    let mut hot = match HotReload::new(&cli.patch) {
        Ok(mut h) => {
            watch_shader_dirs(&mut h, &patch);
            Some(h)
        }
        Err(e) => {
            logw!("HOT", "hot reload disabled: {e}");
            None
        }
    };

    let visualization = patch.visualization();
    let mut renderer = Renderer::new(patch, params.clone(), bridge.clone(), EventSink::new(event_tx));

    let (midi_tx, midi_rx) = crossbeam_channel::unbounded();
    let _midi_conn = if cli.no_midi {
        logi!("MIDI", "MIDI input disabled");
        None
    } else {
        host::connect_midi(cli.midi_port.as_deref(), midi_tx, params.clone())
    };
    let _audio = host::AudioThread::spawn(bridge, midi_rx, cli.sample_rate, cli.block_size)
        .context("spawning audio thread")?;

    let event_loop = EventLoop::new().map_err(|e| anyhow!("creating event loop: {e}"))?;
    let window_builder = winit::window::WindowBuilder::new()
        .with_title(format!("shadervst – {}", cli.patch.display()))
        .with_inner_size(LogicalSize::new(visualization.width, visualization.height));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));

    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("at least one GL config")
        })
        .map_err(|e| anyhow!("failed to build display: {e}"))?;
    let window = window.context("no window created")?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    let context_attributes = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
        .build(Some(raw_window_handle));

    let not_current_gl_context: NotCurrentContext = unsafe {
        gl_display
            .create_context(&gl_config, &context_attributes)
            .context("create_context failed")?
    };

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(size.width.max(1)).context("zero window width")?,
        NonZeroU32::new(size.height.max(1)).context("zero window height")?,
    );

    let gl_surface = unsafe {
        gl_display
            .create_window_surface(&gl_config, &attrs)
            .context("create_window_surface failed")?
    };

    let gl_context = not_current_gl_context
        .make_current(&gl_surface)
        .context("make_current failed")?;

    if let Err(e) = gl_surface.set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::MIN)) {
        logw!("GL", "vsync unavailable: {e}");
    }

    let gl = unsafe { glow::Context::from_loader_function(|s| proc_address(&gl_display, s)) };
    renderer.context_created(&gl, |name| proc_address(&gl_display, name));
    for ev in event_rx.try_iter() {
        logging::log_engine_event(&ev);
    }

    let patch_path = cli.patch.clone();
    let mut closed = false;

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        if !closed {
                            renderer.context_closing(&gl);
                            closed = true;
                        }
                        for ev in event_rx.try_iter() {
                            logging::log_engine_event(&ev);
                        }
                        target.exit();
                    }

                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::KeyR) {
                            logi!("HOT", "manual reload");
                            reload_patch(&patch_path, &mut renderer, hot.as_mut());
                        }
                    }

                    WindowEvent::Resized(new_size) => {
                        if let (Some(w), Some(h)) = (NonZeroU32::new(new_size.width), NonZeroU32::new(new_size.height)) {
                            gl_surface.resize(&gl_context, w, h);
                        }
                    }

                    WindowEvent::RedrawRequested => {
                        if closed {
                            return;
                        }

                        // Editors emit bursts of events per save; reload once per frame at most.
                        let mut changed = None;
                        if let Some(h) = hot.as_ref() {
                            for ev in h.rx().try_iter() {
                                changed = Some(match ev {
                                    HotEvent::PatchChanged(p) | HotEvent::SourceChanged(p) => p,
                                });
                            }
                        }
                        if let Some(p) = changed {
                            logi!("HOT", "change detected: {}", p.display());
                            reload_patch(&patch_path, &mut renderer, hot.as_mut());
                        }

                        let scale = window.scale_factor();
                        let logical = window.inner_size().to_logical::<f64>(scale);
                        let surface = Surface::new(logical.width.round() as u32, logical.height.round() as u32, scale);
                        renderer.render(&gl, surface);

                        for ev in event_rx.try_iter() {
                            logging::log_engine_event(&ev);
                        }

                        if let Err(e) = gl_surface.swap_buffers(&gl_context) {
                            loge!("GL", "swap_buffers failed: {e}");
                        }
                    }

                    _ => {}
                },

                Event::AboutToWait => {
                    window.request_redraw();
                }

                _ => {}
            }
        })
        .map_err(|e| anyhow!("event loop failed: {e}"))?;

    Ok(())
}
