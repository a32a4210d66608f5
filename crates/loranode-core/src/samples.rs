//! Sample buffer and summary statistics
//!
//! A [`SampleRingBuffer`] holds up to N scalar readings, where N is usually
//! `transmit_interval / sample_interval`. Two fill policies exist:
//!
//! - [`BufferMode::FixedWindow`]: append until full, then refuse further
//!   samples until the buffer is cleared after a transmission.
//! - [`BufferMode::MovingAverage`]: once full, every push evicts the oldest
//!   sample by shifting the buffer left.
//!
//! Statistics are only defined on a full buffer and return `None` otherwise.
//! All arithmetic is done on widened integers so results are exact before
//! the final truncation.

use alloc::vec::Vec;

/// Integer sample type the buffer can summarise.
pub trait Scalar: Copy + PartialOrd {
    /// Smallest representable value, used as the max-scan sentinel
    const MIN: Self;
    /// Largest representable value, used as the min-scan sentinel
    const MAX: Self;

    fn to_i64(self) -> i64;

    /// Narrow a widened value back, saturating at the type bounds.
    fn from_i64_saturating(value: i64) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const MIN: Self = <$ty>::MIN;
                const MAX: Self = <$ty>::MAX;

                #[inline]
                fn to_i64(self) -> i64 {
                    i64::from(self)
                }

                #[inline]
                fn from_i64_saturating(value: i64) -> Self {
                    value.clamp(i64::from(<$ty>::MIN), i64::from(<$ty>::MAX)) as $ty
                }
            }
        )*
    };
}

impl_scalar!(i8, i16, i32, u8, u16, u32);

/// Fill policy of a [`SampleRingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    FixedWindow,
    MovingAverage,
}

/// Bounded sample buffer, oldest sample first.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer<T> {
    samples: Vec<T>,
    capacity: usize,
    mode: BufferMode,
}

impl<T: Scalar> SampleRingBuffer<T> {
    /// Create an empty buffer. A capacity of zero is bumped to one so the
    /// buffer can always become full.
    pub fn new(capacity: usize, mode: BufferMode) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            mode,
        }
    }

    /// Append a sample.
    ///
    /// In fixed-window mode a full buffer hands the sample back as `Err`.
    /// In moving-average mode a full buffer drops its oldest sample.
    pub fn push(&mut self, sample: T) -> Result<(), T> {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
            return Ok(());
        }

        match self.mode {
            BufferMode::FixedWindow => Err(sample),
            BufferMode::MovingAverage => {
                self.samples.copy_within(1.., 0);
                let last = self.capacity - 1;
                self.samples[last] = sample;
                Ok(())
            }
        }
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn as_slice(&self) -> &[T] {
        &self.samples
    }

    /// Arithmetic mean, truncated toward zero.
    pub fn mean(&self) -> Option<T> {
        if !self.is_full() {
            return None;
        }
        let sum: i64 = self.samples.iter().map(|s| s.to_i64()).sum();
        Some(T::from_i64_saturating(sum / self.capacity as i64))
    }

    pub fn min(&self) -> Option<T> {
        if !self.is_full() {
            return None;
        }
        let mut min = T::MAX;
        for &s in &self.samples {
            if s < min {
                min = s;
            }
        }
        Some(min)
    }

    pub fn max(&self) -> Option<T> {
        if !self.is_full() {
            return None;
        }
        let mut max = T::MIN;
        for &s in &self.samples {
            if s > max {
                max = s;
            }
        }
        Some(max)
    }

    /// Population standard deviation multiplied by `factor`, truncated
    /// toward zero.
    ///
    /// Computed as `isqrt(factor² · (N·Σx² − (Σx)²) / N²)`, which equals
    /// `floor(σ · factor)` exactly.
    pub fn stddev_scaled(&self, factor: u32) -> Option<u32> {
        if !self.is_full() {
            return None;
        }
        let n = self.capacity as i128;
        let (sum, sum_sq) = self.samples.iter().fold((0i128, 0i128), |(s, sq), x| {
            let x = i128::from(x.to_i64());
            (s + x, sq + x * x)
        });
        let spread = (n * sum_sq - sum * sum).max(0) as u128;
        let factor = u128::from(factor);
        let scaled_variance = spread * factor * factor / (n as u128 * n as u128);
        Some(u32::try_from(scaled_variance.isqrt()).unwrap_or(u32::MAX))
    }
}
