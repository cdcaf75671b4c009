//! Scripted browser sessions for pipeline tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use mailproof::{BrowserSession, Error, Locator, Result, SessionLauncher};

/// Which steps fail, keyed by viewport width.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub fail_open: bool,
    pub fail_navigate: bool,
    pub fail_resize_at: Vec<u32>,
    pub fail_capture_at: Vec<u32>,
    pub corrupt_capture_at: Vec<u32>,
    pub panic_capture_at: Vec<u32>,
    pub fail_close: bool,
}

#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub plan: Plan,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub struct FakeSession {
    plan: Plan,
    calls: Arc<Mutex<Vec<String>>>,
    size: (u32, u32),
    navigated: Option<Locator>,
}

impl FakeSession {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SessionLauncher for FakeLauncher {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession> {
        self.calls.lock().unwrap().push("open".to_string());
        if self.plan.fail_open {
            return Err(Error::EngineUnavailable("no browser in test".into()));
        }
        Ok(FakeSession {
            plan: self.plan.clone(),
            calls: Arc::clone(&self.calls),
            size: (0, 0),
            navigated: None,
        })
    }
}

impl BrowserSession for FakeSession {
    fn navigate(&mut self, locator: &Locator) -> Result<()> {
        self.record(format!("navigate {}", locator));
        if self.plan.fail_navigate {
            return Err(Error::NavigationError("net::ERR_FILE_NOT_FOUND".into()));
        }
        let path = locator
            .url()
            .to_file_path()
            .map_err(|_| Error::NavigationError("not a file url".into()))?;
        if !path.exists() {
            return Err(Error::NavigationError("document missing".into()));
        }
        self.navigated = Some(locator.clone());
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.record(format!("resize {}x{}", width, height));
        if self.plan.fail_resize_at.contains(&width) {
            return Err(Error::ViewportError(format!("cannot resize to {}", width)));
        }
        self.size = (width, height);
        Ok(())
    }

    fn await_stable_render(&mut self) -> Result<()> {
        self.record("await".to_string());
        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        let (width, height) = self.size;
        self.record(format!("capture {}x{}", width, height));
        if self.plan.panic_capture_at.contains(&width) {
            panic!("renderer crashed at {}", width);
        }
        if self.plan.fail_capture_at.contains(&width) {
            return Err(Error::CaptureError(format!("timed out at {}", width)));
        }
        if self.plan.corrupt_capture_at.contains(&width) {
            return Ok(b"definitely not a png".to_vec());
        }
        Ok(transparent_png((width / 10).max(1), (height / 10).max(1)))
    }

    fn close(&mut self) -> Result<()> {
        self.record("close".to_string());
        if self.plan.fail_close {
            return Err(Error::Other("close failed".into()));
        }
        Ok(())
    }
}

/// A mostly transparent RGBA PNG with one opaque red pixel.
pub fn transparent_png(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub const SAMPLE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
@media only screen and (max-width: 600px) { .wrapper { width: 100% !important; } }
</style>
</head>
<body style="margin:0">
<table class="wrapper" style="width:600px">
<tr><td><img src="logo.png" alt="Logo"></td></tr>
<tr><td><img src="hero.png"></td></tr>
</table>
</body>
</html>"#;
