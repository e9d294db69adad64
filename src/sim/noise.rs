//! Seedable 2D noise for procedural seeding.
//!
//! Seeding only needs a smooth, reproducible scalar field; the generator is
//! kept behind [`NoiseSource2D`] so an alternative implementation can be
//! swapped in without touching the seeding logic.

/// A deterministic 2D noise field with values in `[-1, 1]`.
pub trait NoiseSource2D {
    fn sample(&self, x: f64, y: f64) -> f64;
}

/// Classic 2D simplex noise with a seeded permutation table.
///
/// The same seed produces bit-identical output on every platform and run,
/// which is what makes noise-based seeding testable.
pub struct SimplexNoise {
    // 256-entry permutation, doubled so hashed lookups never wrap.
    perm: [u8; 512],
}

/// Skew/unskew factors for the 2D simplex grid.
const F2: f64 = 0.366025403784439; // (sqrt(3) - 1) / 2
const G2: f64 = 0.211324865405187; // (3 - sqrt(3)) / 6

const GRADIENTS: [[f64; 2]; 8] = [
    [1.0, 0.0],
    [1.0, 1.0],
    [0.0, 1.0],
    [-1.0, 1.0],
    [-1.0, 0.0],
    [-1.0, -1.0],
    [0.0, -1.0],
    [1.0, -1.0],
];

impl SimplexNoise {
    pub fn new(seed: u64) -> Self {
        let mut perm = [0u8; 512];
        for (i, p) in perm.iter_mut().take(256).enumerate() {
            *p = i as u8;
        }

        // Fisher-Yates with an xorshift64 stream derived from the seed. The
        // zero state would be a fixed point, so nudge it.
        let mut state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        for i in (1..256).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let j = (state as usize) % (i + 1);
            perm.swap(i, j);
        }
        for i in 0..256 {
            perm[256 + i] = perm[i];
        }

        Self { perm }
    }

    fn hash(&self, i: usize) -> u8 {
        self.perm[i & 511]
    }

    fn corner(&self, x: f64, y: f64, hash: u8) -> f64 {
        let t = 0.5 - x * x - y * y;
        if t < 0.0 {
            return 0.0;
        }
        let g = GRADIENTS[(hash & 7) as usize];
        let t2 = t * t;
        t2 * t2 * (g[0] * x + g[1] * y)
    }
}

impl NoiseSource2D for SimplexNoise {
    fn sample(&self, x: f64, y: f64) -> f64 {
        // Skew onto the simplex grid and find the containing cell.
        let skew = (x + y) * F2;
        let i = (x + skew).floor() as i64;
        let j = (y + skew).floor() as i64;

        let unskew = (i + j) as f64 * G2;
        let x0 = x - (i as f64 - unskew);
        let y0 = y - (j as f64 - unskew);

        // Which triangle of the cell are we in?
        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + G2;
        let y1 = y0 - j1 as f64 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;

        let ii = (i & 255) as usize;
        let jj = (j & 255) as usize;
        let g0 = self.hash(ii + self.hash(jj) as usize);
        let g1 = self.hash(ii + i1 + self.hash(jj + j1) as usize);
        let g2 = self.hash(ii + 1 + self.hash(jj + 1) as usize);

        let n = self.corner(x0, y0, g0) + self.corner(x1, y1, g1) + self.corner(x2, y2, g2);

        // 70.0 scales the summed contributions into [-1, 1].
        70.0 * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_deterministic() {
        let a = SimplexNoise::new(12345);
        let b = SimplexNoise::new(12345);
        for i in 0..200 {
            let x = i as f64 * 0.13;
            let y = i as f64 * 0.31;
            assert_eq!(a.sample(x, y), b.sample(x, y));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let a = SimplexNoise::new(1);
        let b = SimplexNoise::new(2);
        let differs = (0..50).any(|i| {
            let x = 0.7 + i as f64 * 0.41;
            a.sample(x, x * 1.3) != b.sample(x, x * 1.3)
        });
        assert!(differs);
    }

    #[test]
    fn samples_stay_in_range() {
        let noise = SimplexNoise::new(42);
        for i in 0..5000 {
            let x = i as f64 * 0.17 - 400.0;
            let y = i as f64 * 0.29 - 250.0;
            let v = noise.sample(x, y);
            assert!((-1.0..=1.0).contains(&v), "sample {v} out of range");
        }
    }

    #[test]
    fn field_is_continuous() {
        let noise = SimplexNoise::new(42);
        let v0 = noise.sample(10.0, 20.0);
        let v1 = noise.sample(10.001, 20.0);
        assert!((v0 - v1).abs() < 0.01);
    }
}
