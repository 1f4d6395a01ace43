//! Image synthesis seam and the built-in star-field renderer.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use alpaca_sim_core::PixelGrid;

use super::pointing::Pointing;

/// Sky background in electrons per pixel per second at night.
pub const NIGHT_SKY_BACKGROUND: f64 = 150.0;
/// Sky background when the site is in daylight.
pub const DAYLIGHT_SKY_BACKGROUND: f64 = 20_000.0;

/// Sensor readout configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorGeometry {
    pub width: u32,
    pub height: u32,
    pub bin_x: u32,
    pub bin_y: u32,
    /// Micrometres.
    pub pixel_size: f64,
    /// Electrons per ADU.
    pub gain: f64,
    /// Electrons.
    pub full_well: f64,
    /// Electrons per pixel per second.
    pub dark_current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Optics {
    /// Metres.
    pub focal_length: f64,
    /// Metres.
    pub aperture: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    pub sky_background: f64,
    /// Arcseconds FWHM.
    pub seeing: f64,
}

/// Everything that determines a synthesized frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisRequest {
    pub geometry: SensorGeometry,
    pub optics: Optics,
    pub site: Site,
    pub pointing: Pointing,
    /// Seconds.
    pub duration: f64,
    /// False for dark frames: no sky or stars, only dark current and noise.
    pub light: bool,
}

/// Turns exposure parameters into a pixel grid.
///
/// Implementations may be slow or fail; the caller bounds every call with a
/// timeout and treats errors as a failed exposure.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> anyhow::Result<PixelGrid>;
}

/// Renders a deterministic pseudo-random star field on the blocking pool.
///
/// The star positions are seeded from the pointing, so the same sky always
/// shows the same stars.
#[derive(Debug, Default, Clone, Copy)]
pub struct StarFieldSynthesizer;

#[async_trait]
impl ImageSynthesizer for StarFieldSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> anyhow::Result<PixelGrid> {
        tokio::task::spawn_blocking(move || render(&request))
            .await
            .map_err(|e| anyhow::anyhow!("synthesis task failed: {e}"))?
    }
}

fn seed(request: &SynthesisRequest) -> u64 {
    let ra = request.pointing.right_ascension.to_bits();
    let dec = request.pointing.declination.to_bits();
    ra.rotate_left(17) ^ dec ^ 0x9E37_79B9_7F4A_7C15
}

fn gaussian(rng: &mut StdRng) -> f64 {
    // Box-Muller; the lower bound keeps ln() finite.
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Renders one frame synchronously.
///
/// # Errors
///
/// Fails if the geometry is empty or the optics are non-physical.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn render(request: &SynthesisRequest) -> anyhow::Result<PixelGrid> {
    let g = request.geometry;
    anyhow::ensure!(g.width > 0 && g.height > 0, "empty sensor geometry");
    anyhow::ensure!(
        request.optics.focal_length.is_finite() && request.optics.focal_length > 0.0,
        "focal length must be positive"
    );
    anyhow::ensure!(
        g.pixel_size.is_finite() && g.pixel_size > 0.0,
        "pixel size must be positive"
    );

    let width = g.width as usize;
    let height = g.height as usize;
    let duration = request.duration.max(0.0);
    let bin_area = f64::from(g.bin_x.max(1)) * f64::from(g.bin_y.max(1));
    let gain = g.gain.max(1e-3);

    let mut electrons = vec![0.0f64; width * height];

    let base = g.dark_current * duration * bin_area
        + if request.light {
            request.site.sky_background * duration * bin_area
        } else {
            0.0
        };
    electrons.fill(base);

    let mut rng = StdRng::seed_from_u64(seed(request));

    if request.light {
        // Plate scale in arcseconds per binned pixel.
        let scale = 206_265.0 * g.pixel_size * 1e-6 * f64::from(g.bin_x.max(1))
            / request.optics.focal_length;
        let sigma = (request.site.seeing / scale / 2.355).max(0.5);
        // A star never needs to spread past the frame.
        let radius = (4.0 * sigma).ceil().min(width.max(height) as f64) as i64;
        let collecting_area = request.optics.aperture.powi(2);

        let stars = 40 + (width * height / 20_000).min(400);
        for _ in 0..stars {
            let cx: f64 = rng.random_range(0.0..width as f64);
            let cy: f64 = rng.random_range(0.0..height as f64);
            let magnitude: f64 = rng.random_range(2.0..6.0);
            let flux = 10f64.powf(magnitude) * collecting_area * duration;
            let peak = flux / (std::f64::consts::TAU * sigma * sigma);

            let (x0, y0) = (cx as i64, cy as i64);
            for y in (y0 - radius).max(0)..=(y0 + radius).min(height as i64 - 1) {
                for x in (x0 - radius).max(0)..=(x0 + radius).min(width as i64 - 1) {
                    let dx = x as f64 + 0.5 - cx;
                    let dy = y as f64 + 0.5 - cy;
                    let r2 = (dx * dx + dy * dy) / (2.0 * sigma * sigma);
                    electrons[y as usize * width + x as usize] += peak * (-r2).exp();
                }
            }
        }
    }

    let pixels = electrons
        .into_iter()
        .map(|e| {
            let noisy = e + e.max(0.0).sqrt() * gaussian(&mut rng);
            let clipped = noisy.clamp(0.0, g.full_well.max(0.0));
            (clipped / gain).round().min(f64::from(u16::MAX)) as u16
        })
        .collect();

    Ok(PixelGrid::new(g.width, g.height, pixels)?)
}
