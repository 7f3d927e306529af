use anyhow::{anyhow, Result};

/// Restricted view of one decoded RGB8 frame, row-major.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> FrameView<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Mean RGB over `[x0, x1) x [y0, y1)`; `None` when the region is empty.
    pub(crate) fn region_mean(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Option<[f64; 3]> {
        let (x1, y1) = (x1.min(self.width), y1.min(self.height));
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        let mut sums = [0u64; 3];
        for y in y0..y1 {
            let row = y as usize * self.width as usize * 3;
            for x in x0..x1 {
                let at = row + x as usize * 3;
                sums[0] += self.pixels[at] as u64;
                sums[1] += self.pixels[at + 1] as u64;
                sums[2] += self.pixels[at + 2] as u64;
            }
        }
        let count = ((x1 - x0) as u64 * (y1 - y0) as u64) as f64;
        Some(sums.map(|s| s as f64 / count))
    }
}

/// One raw model output, boxes in absolute pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: i64,
    pub class_name: String,
    pub confidence: f64,
    /// `[x_min, y_min, x_max, y_max]`.
    pub bbox: [f64; 4],
}

/// Object detector seam.
///
/// Implementations wrap a pretrained model. They must treat the frame as
/// read-only and must not retain it past the `detect` call.
pub trait DetectorBackend {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &FrameView<'_>) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Scripted backend for tests and the demo: replays per-frame detections,
/// cycling when the script runs out.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    script: Vec<Vec<RawDetection>>,
    calls: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Vec<RawDetection>>) -> Self {
        Self { script, calls: 0 }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &FrameView<'_>) -> Result<Vec<RawDetection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.script[self.calls % self.script.len()].clone();
        self.calls += 1;
        Ok(out)
    }
}
