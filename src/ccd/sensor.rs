use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::{Deserialize, Serialize};

use super::SensorGeometry;
use crate::error::{AnalysisError, Result};

/// Serde helpers for float planes. Non-finite pixels are written as `null`
/// and read back as NaN, so a plane with dead pixels survives JSON.
mod nan_plane {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Plane {
        dim: (usize, usize),
        data: Vec<Option<f32>>,
    }

    impl Plane {
        fn from_array(values: &Array2<f32>) -> Self {
            Self {
                dim: values.dim(),
                data: values.iter().map(|v| v.is_finite().then_some(*v)).collect(),
            }
        }

        fn into_array<E: serde::de::Error>(self) -> Result<Array2<f32>, E> {
            let data = self.data.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect();
            Array2::from_shape_vec(self.dim, data).map_err(E::custom)
        }
    }

    pub fn serialize<S: Serializer>(
        values: &Array2<f32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        Plane::from_array(values).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Array2<f32>, D::Error> {
        Plane::deserialize(deserializer)?.into_array()
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            values: &Option<Array2<f32>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            values.as_ref().map(Plane::from_array).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Array2<f32>>, D::Error> {
            Option::<Plane>::deserialize(deserializer)?
                .map(Plane::into_array)
                .transpose()
        }
    }
}

/// One sensor's pixels for one visit: image, per-pixel flags, optional variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    #[serde(with = "nan_plane")]
    image: Array2<f32>,
    mask: Array2<u32>,
    #[serde(with = "nan_plane::option", default)]
    variance: Option<Array2<f32>>,
}

impl Exposure {
    pub fn new(
        image: Array2<f32>,
        mask: Array2<u32>,
        variance: Option<Array2<f32>>,
    ) -> Result<Self> {
        if image.dim() != mask.dim() {
            return Err(AnalysisError::Shape(format!(
                "image {:?} vs mask {:?}",
                image.dim(),
                mask.dim()
            )));
        }
        if let Some(v) = &variance {
            if v.dim() != image.dim() {
                return Err(AnalysisError::Shape(format!(
                    "image {:?} vs variance {:?}",
                    image.dim(),
                    v.dim()
                )));
            }
        }
        Ok(Self {
            image,
            mask,
            variance,
        })
    }

    /// An exposure with no flagged pixels and no variance plane.
    pub fn from_image(image: Array2<f32>) -> Self {
        let mask = Array2::zeros(image.dim());
        Self {
            image,
            mask,
            variance: None,
        }
    }

    pub fn image(&self) -> ArrayView2<'_, f32> {
        self.image.view()
    }

    pub fn mask(&self) -> ArrayView2<'_, u32> {
        self.mask.view()
    }

    pub fn variance(&self) -> Option<ArrayView2<'_, f32>> {
        self.variance.as_ref().map(|v| v.view())
    }

    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }

    /// Re-check plane shapes, e.g. after deserializing from disk.
    pub fn validated(self) -> Result<Self> {
        Self::new(self.image, self.mask, self.variance)
    }

    /// Mutable pixels. Views keep the plane shapes fixed.
    pub fn image_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        self.image.view_mut()
    }

    pub fn mask_mut(&mut self) -> ArrayViewMut2<'_, u32> {
        self.mask.view_mut()
    }
}

/// Parameters for a synthetic four-amp readout.
#[derive(Debug, Clone)]
pub struct SyntheticReadout {
    /// Mean processed level of each amplifier (ADU).
    pub amp_levels: [f64; 4],
    /// Raw bias level added to every raw pixel, including pre/overscan.
    pub bias: f64,
    /// Gaussian read noise (ADU).
    pub read_noise: f64,
    /// Electrons per ADU. Shot noise is only simulated when positive.
    pub gain: f64,
}

impl Default for SyntheticReadout {
    fn default() -> Self {
        Self {
            amp_levels: [100.0, 105.0, 103.0, 108.0],
            bias: 1000.0,
            read_noise: 0.0,
            gain: 0.0,
        }
    }
}

impl SyntheticReadout {
    /// Build matching raw and processed exposures for `geometry`.
    pub fn generate(
        &self,
        geometry: &SensorGeometry,
        rng: &mut impl Rng,
    ) -> Result<(Exposure, Exposure)> {
        let mut raw = Array2::<f64>::from_elem(geometry.raw_shape(), self.bias);
        let mut processed = Array2::<f64>::zeros(geometry.shape());

        for (amp, level) in geometry.amps.iter().zip(self.amp_levels) {
            processed
                .slice_mut(ndarray::s![
                    amp.bbox.begin_y..amp.bbox.end_y(),
                    amp.bbox.begin_x..amp.bbox.end_x()
                ])
                .fill(level);
        }

        let variance = if self.gain > 0.0 {
            let mut electrons = processed.mapv(|v| (v * self.gain).max(0.0));
            if let Some(slice) = electrons.as_slice_mut() {
                add_shot_noise(slice, rng);
            }
            processed = electrons.mapv(|e| e / self.gain);
            // estimated from the measured counts, as calibration does
            let read_var = self.read_noise * self.read_noise;
            Some(electrons.mapv(|e| (e / (self.gain * self.gain) + read_var) as f32))
        } else {
            None
        };

        if let Some(raw_slice) = raw.as_slice_mut() {
            add_read_noise(raw_slice, self.read_noise, rng);
        }
        if let Some(processed_slice) = processed.as_slice_mut() {
            add_read_noise(processed_slice, self.read_noise, rng);
        }

        // raw imaging area carries the same signal on top of the bias
        for amp in &geometry.amps {
            let signal = processed.slice(ndarray::s![
                amp.bbox.begin_y..amp.bbox.end_y(),
                amp.bbox.begin_x..amp.bbox.end_x()
            ]);
            let mut target = raw.slice_mut(ndarray::s![
                amp.raw_data.begin_y..amp.raw_data.end_y(),
                amp.raw_data.begin_x..amp.raw_data.end_x()
            ]);
            target += &signal;
        }

        let raw = Exposure::from_image(raw.mapv(|v| v as f32));
        let processed = Exposure::new(
            processed.mapv(|v| v as f32),
            Array2::zeros(geometry.shape()),
            variance,
        )?;
        Ok((raw, processed))
    }
}

/// Add Gaussian read noise in place.
pub fn add_read_noise(grid: &mut [f64], sigma: f64, rng: &mut impl Rng) {
    if sigma <= 0.0 {
        return;
    }
    let Ok(dist) = Normal::new(0.0, sigma) else {
        return;
    };
    for pixel in grid.iter_mut() {
        *pixel += dist.sample(rng);
    }
}

/// Replace each electron count with a Poisson sample of itself.
pub fn add_shot_noise(grid: &mut [f64], rng: &mut impl Rng) {
    for pixel in grid.iter_mut() {
        if *pixel > 0.0 {
            let lambda = (*pixel).min(1e8);
            if lambda < 1e6 {
                if let Ok(dist) = Poisson::new(lambda) {
                    *pixel = dist.sample(rng);
                }
            } else if let Ok(normal) = Normal::new(lambda, lambda.sqrt()) {
                // Gaussian approximation for very large counts
                *pixel = normal.sample(rng).max(0.0);
            }
        }
    }
}
