//! # Time-indexed properties
//!
//! A [`SampledProperty`] is a continuous curve built from `(epoch, value)` samples. Lookups
//! between two samples interpolate (linearly for scalars and vectors, spherically for
//! orientations); lookups outside the sampled range return `None`.
//!
//! Position curves carry a [`ReferenceFrame`] tag so the consumer knows whether the values are
//! planet-fixed or inertial.
use hifitime::Epoch;
use nalgebra::{UnitQuaternion, Vector3};

/// Frame in which a position curve is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceFrame {
    #[default]
    Fixed,
    Inertial,
}

/// Values that can be interpolated between two samples.
pub trait Interpolate: Clone {
    /// Value at fraction `t` ∈ [0, 1] between `self` and `other`.
    fn interpolate(&self, other: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for Vector3<f64> {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self.lerp(other, t)
    }
}

impl Interpolate for UnitQuaternion<f64> {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        // antipodal quaternions have no unique slerp; keep the left value
        self.try_slerp(other, t, 1e-12).unwrap_or(*self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampledProperty<T> {
    times: Vec<Epoch>,
    values: Vec<T>,
}

impl<T> Default for SampledProperty<T> {
    fn default() -> Self {
        SampledProperty {
            times: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T: Interpolate> SampledProperty<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample. Samples normally arrive in time order; out-of-order samples are
    /// inserted at their sorted position, and a sample at an existing epoch replaces it.
    pub fn add_sample(&mut self, epoch: Epoch, value: T) {
        match self.times.last() {
            None => {}
            Some(last) if *last < epoch => {}
            Some(_) => match self.times.binary_search(&epoch) {
                Ok(index) => {
                    self.values[index] = value;
                    return;
                }
                Err(index) => {
                    self.times.insert(index, epoch);
                    self.values.insert(index, value);
                    return;
                }
            },
        }
        self.times.push(epoch);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn start(&self) -> Option<Epoch> {
        self.times.first().copied()
    }

    pub fn stop(&self) -> Option<Epoch> {
        self.times.last().copied()
    }

    pub fn samples(&self) -> impl Iterator<Item = (&Epoch, &T)> {
        self.times.iter().zip(self.values.iter())
    }

    /// Interpolated value at `epoch`, `None` outside `[start, stop]`.
    pub fn value_at(&self, epoch: &Epoch) -> Option<T> {
        match self.times.binary_search(epoch) {
            Ok(index) => Some(self.values[index].clone()),
            Err(0) => None,
            Err(index) if index >= self.times.len() => None,
            Err(index) => {
                let (t0, t1) = (self.times[index - 1], self.times[index]);
                let span = (t1 - t0).to_seconds();
                let fraction = (*epoch - t0).to_seconds() / span;
                Some(self.values[index - 1].interpolate(&self.values[index], fraction))
            }
        }
    }
}
