use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{ItemId, MagnitudeScale, PcmBuffer, Result, SpectrumError};

pub mod worker;

pub use worker::{SpectrumWorker, WorkerHandle, WorkerStats};

/// Size of one analysis pass, fixed when the engine is built.
///
/// Serialized as its bare sample count; deserializing goes through
/// [`AnalysisWindow::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct AnalysisWindow {
    sample_count: usize,
    transform_size: usize,
}

impl AnalysisWindow {
    /// Fails for an empty window; the transform size is the smallest power
    /// of two that holds `sample_count` frames.
    pub fn new(sample_count: usize) -> Result<Self> {
        if sample_count == 0 {
            return Err(SpectrumError::InvalidConfig(
                "analysis window requires at least one sample",
            ));
        }

        Ok(Self {
            sample_count,
            transform_size: sample_count.next_power_of_two(),
        })
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Number of magnitudes produced per pass.
    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }
}

impl TryFrom<usize> for AnalysisWindow {
    type Error = SpectrumError;

    fn try_from(sample_count: usize) -> Result<Self> {
        Self::new(sample_count)
    }
}

impl From<AnalysisWindow> for usize {
    fn from(window: AnalysisWindow) -> Self {
        window.sample_count
    }
}

/// Positive-frequency magnitudes of one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    sample_rate: u32,
    transform_size: usize,
}

impl Spectrum {
    fn silent(window: &AnalysisWindow, sample_rate: u32) -> Self {
        Self {
            magnitudes: vec![0.0; window.bin_count()],
            sample_rate,
            transform_size: window.transform_size(),
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn into_magnitudes(self) -> Vec<f32> {
        self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Centre frequency of `bin` in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.transform_size as f32
    }

    /// Index of the loudest bin, `None` for an empty or silent spectrum.
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
    }
}

/// A spectrum together with the item whose audio produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub item: ItemId,
    pub spectrum: Spectrum,
}

/// Windowed real FFT sized once for a fixed [`AnalysisWindow`].
///
/// The plan, scratch space and Hann coefficients are built in the
/// constructor and reused by every [`SpectrumEngine::compute_spectrum`] call.
pub struct SpectrumEngine {
    window: AnalysisWindow,
    scale: MagnitudeScale,
    coefficients: Vec<f32>,
    normalization: f32,
    fft: FftResources,
}

impl SpectrumEngine {
    pub fn new(window: AnalysisWindow, scale: MagnitudeScale) -> Self {
        let coefficients: Vec<f32> = (0..window.sample_count())
            .map(|index| hann_value(index, window.sample_count()))
            .collect();
        let window_sum: f32 = coefficients.iter().sum();
        let normalization = if window_sum > f32::EPSILON {
            2.0 / window_sum
        } else {
            1.0
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(window.transform_size());
        let fft = FftResources {
            size: window.transform_size(),
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Self {
            window,
            scale,
            coefficients,
            normalization,
            fft,
        }
    }

    /// Shorthand for building the window and the engine in one go.
    pub fn with_sample_count(sample_count: usize, scale: MagnitudeScale) -> Result<Self> {
        Ok(Self::new(AnalysisWindow::new(sample_count)?, scale))
    }

    pub fn window(&self) -> &AnalysisWindow {
        &self.window
    }

    pub fn transform_size(&self) -> usize {
        self.fft.size
    }

    /// Downmixes, windows and transforms one buffer.
    ///
    /// Buffers shorter than the window are zero-padded, longer ones are
    /// truncated to the first `sample_count` frames. A buffer with no
    /// readable frames produces a silent spectrum instead of an error.
    pub fn compute_spectrum(&mut self, buffer: &PcmBuffer<'_>) -> Spectrum {
        if buffer.is_malformed() {
            return Spectrum::silent(&self.window, buffer.sample_rate());
        }

        match self.transform(buffer) {
            Ok(()) => {
                let magnitudes = self
                    .fft
                    .spectrum
                    .iter()
                    .take(self.window.bin_count())
                    .map(|bin| scale_magnitude(self.scale, bin.norm() * self.normalization))
                    .collect();

                Spectrum {
                    magnitudes,
                    sample_rate: buffer.sample_rate(),
                    transform_size: self.window.transform_size(),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "spectrum transform failed, publishing silence");
                Spectrum::silent(&self.window, buffer.sample_rate())
            }
        }
    }

    fn transform(&mut self, buffer: &PcmBuffer<'_>) -> Result<()> {
        let channels = buffer.channels() as usize;
        let input = &mut self.fft.input;
        input.fill(0.0);

        for ((slot, frame), coefficient) in input
            .iter_mut()
            .zip(buffer.samples().chunks_exact(channels))
            .zip(&self.coefficients)
        {
            let sum: f32 = frame
                .iter()
                .map(|sample| if sample.is_finite() { *sample } else { 0.0 })
                .sum();
            *slot = sum / channels as f32 * coefficient;
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;
        Ok(())
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumEngine")
            .field("window", &self.window)
            .field("scale", &self.scale)
            .field("normalization", &self.normalization)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn scale_magnitude(scale: MagnitudeScale, magnitude: f32) -> f32 {
    match scale {
        MagnitudeScale::Linear => magnitude,
        MagnitudeScale::Decibel { floor_db } => {
            if magnitude <= 0.0 {
                0.0
            } else {
                (20.0 * magnitude.log10() - floor_db).max(0.0)
            }
        }
    }
}

// Periodic Hann: sums to len / 2, which keeps the normalization exact.
fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / len as f32).cos()
}
