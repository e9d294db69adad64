//! Simulation state core: grid addressing, ping-pong buffer selection, and
//! the seed policies that populate the first generation.
//!
//! Nothing in this module touches the GPU. The [`gpu`](crate::gpu) module owns
//! the actual cell buffers and drives the compute kernel; this module decides
//! what the initial contents are and which buffer is active at any iteration.

use std::time::Duration;

use thiserror::Error;

pub mod grid;
pub mod noise;
pub mod state;

pub use grid::{DIMENSION_COUNT, GridDims, MAX_SIDE_LENGTH};
pub use noise::{NoiseSource2D, SimplexNoise};
pub use state::{PingPong, Slot, SlotPair};

/// Failures surfaced at initialization time.
///
/// Invalid configuration is rejected outright, never clamped. Allocation
/// failure is fatal to initialization; nothing here retries.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("grid side length must be nonzero")]
    ZeroSideLength,
    #[error("grid side length {side} exceeds the supported maximum {max}")]
    SideLengthTooLarge { side: u32, max: u32 },
    #[error("alive probability {0} is outside [0, 1]")]
    ProbabilityOutOfRange(f32),
    #[error("stripe period must be nonzero")]
    ZeroStripePeriod,
    #[error("cannot allocate cell state: {cells} cells need {bytes} bytes, device limit is {limit}")]
    AllocationFailure { cells: u64, bytes: u64, limit: u64 },
}

/// How buffer A is populated before the first simulation step.
///
/// The upstream experiments treated these as interchangeable, so all of them
/// are exposed as configuration rather than picking one canonical policy.
#[derive(Clone, Debug, PartialEq)]
pub enum SeedPolicy {
    /// Each cell is independently alive with the given probability.
    UniformRandom { alive_probability: f32, rng_seed: u64 },
    /// A cell is alive iff seeded simplex noise, sampled at the cell's
    /// normalized position and scaled, exceeds the threshold.
    ProceduralNoise {
        frequency: f64,
        amplitude: f64,
        threshold: f64,
        noise_seed: u64,
    },
    /// A cell is alive iff its linear index is a multiple of the period.
    Striped { period: u32 },
    /// Alternating cells, offset every row.
    Checkerboard,
}

impl SeedPolicy {
    /// Reject out-of-range parameters before anything is allocated.
    pub fn validate(&self) -> Result<(), SimError> {
        match *self {
            SeedPolicy::UniformRandom {
                alive_probability, ..
            } => {
                if !(0.0..=1.0).contains(&alive_probability) {
                    return Err(SimError::ProbabilityOutOfRange(alive_probability));
                }
            }
            SeedPolicy::Striped { period } => {
                if period == 0 {
                    return Err(SimError::ZeroStripePeriod);
                }
            }
            SeedPolicy::ProceduralNoise { .. } | SeedPolicy::Checkerboard => {}
        }
        Ok(())
    }

    /// Build the initial cell array, row-major, 0 = dead and 1 = alive.
    pub fn populate(&self, dims: GridDims) -> Result<Vec<u32>, SimError> {
        self.validate()?;
        let cells = match *self {
            SeedPolicy::UniformRandom {
                alive_probability,
                rng_seed,
            } => {
                let mut rng = fastrand::Rng::with_seed(rng_seed);
                (0..dims.cell_count())
                    .map(|_| u32::from(rng.f32() < alive_probability))
                    .collect()
            }
            SeedPolicy::ProceduralNoise {
                frequency,
                amplitude,
                threshold,
                noise_seed,
            } => noise_fill(
                dims,
                &SimplexNoise::new(noise_seed),
                frequency,
                amplitude,
                threshold,
            ),
            SeedPolicy::Striped { period } => (0..dims.cell_count())
                .map(|i| u32::from(i % u64::from(period) == 0))
                .collect(),
            // GridDims bounds the side length, so every linear index fits u32.
            SeedPolicy::Checkerboard => (0..dims.cell_count())
                .map(|i| {
                    let (row, column) = dims.coordinates_of(i as u32);
                    u32::from((row + column) % 2 == 1)
                })
                .collect(),
        };
        Ok(cells)
    }
}

/// Threshold a noise field into cell occupancy.
///
/// Takes the noise source as a capability so tests (or a different generator)
/// can drive seeding without involving [`SimplexNoise`].
pub fn noise_fill(
    dims: GridDims,
    source: &dyn NoiseSource2D,
    frequency: f64,
    amplitude: f64,
    threshold: f64,
) -> Vec<u32> {
    // GridDims bounds the side length, so every linear index fits u32.
    (0..dims.cell_count())
        .map(|i| {
            let (row, column) = dims.coordinates_of(i as u32);
            let (x, y) = dims.normalized(row, column);
            let value = source.sample(x * frequency, y * frequency) * amplitude;
            u32::from(value > threshold)
        })
        .collect()
}

/// Static simulation configuration, fixed for the process lifetime.
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub side_length: u32,
    pub seed_policy: SeedPolicy,
    /// Minimum wall-clock time between generations. Zero advances one
    /// generation per rendered frame.
    pub step_interval: Duration,
    /// Debug override: always treat the primary buffer as active so the
    /// seeded state stays on screen.
    pub force_primary: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            side_length: 1028,
            seed_policy: SeedPolicy::ProceduralNoise {
                frequency: 60.0,
                amplitude: 0.18,
                threshold: 0.07,
                noise_seed: 0,
            },
            step_interval: Duration::ZERO,
            force_primary: false,
        }
    }
}

impl SimConfig {
    pub fn dims(&self) -> Result<GridDims, SimError> {
        GridDims::new(self.side_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(side: u32) -> GridDims {
        GridDims::new(side).unwrap()
    }

    #[test]
    fn uniform_random_extremes() {
        let dead = SeedPolicy::UniformRandom {
            alive_probability: 0.0,
            rng_seed: 7,
        };
        assert!(dead.populate(dims(16)).unwrap().iter().all(|&c| c == 0));

        let alive = SeedPolicy::UniformRandom {
            alive_probability: 1.0,
            rng_seed: 7,
        };
        assert!(alive.populate(dims(16)).unwrap().iter().all(|&c| c == 1));
    }

    #[test]
    fn uniform_random_is_reproducible() {
        let policy = SeedPolicy::UniformRandom {
            alive_probability: 0.5,
            rng_seed: 99,
        };
        assert_eq!(
            policy.populate(dims(32)).unwrap(),
            policy.populate(dims(32)).unwrap()
        );
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let policy = SeedPolicy::UniformRandom {
            alive_probability: 1.5,
            rng_seed: 0,
        };
        assert_eq!(
            policy.populate(dims(4)),
            Err(SimError::ProbabilityOutOfRange(1.5))
        );
    }

    #[test]
    fn striped_marks_multiples_of_period() {
        let policy = SeedPolicy::Striped { period: 3 };
        let cells = policy.populate(dims(5)).unwrap();
        for (i, &cell) in cells.iter().enumerate() {
            assert_eq!(cell, u32::from(i % 3 == 0), "cell {i}");
        }
    }

    #[test]
    fn zero_period_is_rejected() {
        let policy = SeedPolicy::Striped { period: 0 };
        assert_eq!(policy.populate(dims(4)), Err(SimError::ZeroStripePeriod));
    }

    #[test]
    fn noise_seeding_is_deterministic() {
        let policy = SeedPolicy::ProceduralNoise {
            frequency: 60.0,
            amplitude: 0.18,
            threshold: 0.07,
            noise_seed: 1234,
        };
        let first = policy.populate(dims(64)).unwrap();
        let second = policy.populate(dims(64)).unwrap();
        assert_eq!(first, second);
        // A thresholded field should not be trivially uniform at these settings.
        assert!(first.iter().any(|&c| c == 0));
        assert!(first.iter().any(|&c| c == 1));
    }

    #[test]
    fn noise_fill_uses_the_provided_source() {
        struct Constant(f64);
        impl NoiseSource2D for Constant {
            fn sample(&self, _x: f64, _y: f64) -> f64 {
                self.0
            }
        }
        let above = noise_fill(dims(4), &Constant(1.0), 60.0, 0.18, 0.07);
        assert!(above.iter().all(|&c| c == 1));
        let below = noise_fill(dims(4), &Constant(-1.0), 60.0, 0.18, 0.07);
        assert!(below.iter().all(|&c| c == 0));
    }

    #[test]
    fn checkerboard_end_to_end() {
        // The full scenario from the state contract: a 4x4 checkerboard seed,
        // then one iteration flipping the active buffer.
        let dims = dims(4);
        let cells = SeedPolicy::Checkerboard.populate(dims).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0, 1, 0, 1,
            1, 0, 1, 0,
            0, 1, 0, 1,
            1, 0, 1, 0,
        ];
        assert_eq!(cells, expected);

        let mut clock = PingPong::new(false);
        assert_eq!(clock.iteration_step(), 0);
        assert_eq!(clock.active(), Slot::Primary);
        clock.iterate();
        assert_eq!(clock.iteration_step(), 1);
        assert_eq!(clock.active(), Slot::Secondary);
        assert_eq!(clock.standby(), Slot::Primary);
    }

    #[test]
    fn every_policy_fills_the_whole_grid() {
        let policies = [
            SeedPolicy::UniformRandom {
                alive_probability: 0.5,
                rng_seed: 1,
            },
            SeedPolicy::ProceduralNoise {
                frequency: 60.0,
                amplitude: 0.18,
                threshold: 0.07,
                noise_seed: 1,
            },
            SeedPolicy::Striped { period: 4 },
            SeedPolicy::Checkerboard,
        ];
        for side in [1u32, 33, 257] {
            let dims = dims(side);
            for policy in &policies {
                let cells = policy.populate(dims).unwrap();
                assert_eq!(cells.len() as u64, dims.cell_count(), "{policy:?} at side {side}");
            }
        }
        // Sides whose cell count would not fit a u32 index are rejected
        // outright instead of being seeded short.
        assert!(matches!(
            GridDims::new(65536),
            Err(SimError::SideLengthTooLarge { .. })
        ));
    }

    #[test]
    fn invalid_grid_fails_before_seeding() {
        let config = SimConfig {
            side_length: 0,
            ..SimConfig::default()
        };
        assert_eq!(config.dims(), Err(SimError::ZeroSideLength));
    }
}
