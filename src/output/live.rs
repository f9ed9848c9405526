use minifb::{Key, Window, WindowOptions};

use crate::error::{SimError, SimResult};
use crate::renderer::{render_panels, rgba_to_argb, RenderConfig};
use crate::solver::Snapshot;

use super::OutputSink;

/// Interactive four-panel view. Escape or closing the window ends the run.
pub struct LiveView {
    window: Window,
    cfg: RenderConfig,
    framebuf: Vec<u32>,
}

impl LiveView {
    pub fn new(title: &str, width: usize, height: usize, skip: usize) -> SimResult<Self> {
        let cfg = RenderConfig::fit(width, height, skip);
        let window = Window::new(
            title,
            cfg.frame_width,
            cfg.frame_height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| SimError::Display(format!("failed to create window: {}", e)))?;
        Ok(Self { window, cfg, framebuf: Vec::new() })
    }
}

impl OutputSink for LiveView {
    fn emit(&mut self, snap: &Snapshot) -> SimResult<()> {
        let rgba = render_panels(snap, &self.cfg);
        rgba_to_argb(&rgba, &mut self.framebuf);
        self.window
            .update_with_buffer(&self.framebuf, self.cfg.frame_width, self.cfg.frame_height)
            .map_err(|e| SimError::Display(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}
