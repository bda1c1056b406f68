//! Dense building blocks for the attention scorer. Row-major `f32` storage, no SIMD.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Row-major matrix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Xavier-uniform initialization
    pub fn xavier<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (rows + cols) as f32).sqrt();
        let data = (0..rows * cols)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self { rows, cols, data }
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn row_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.rows * self.cols
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `y = W x + b` with `W` stored as `(out, in)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Linear {
    pub weight: Matrix,
    pub bias: Vec<f32>,
}

impl Linear {
    pub fn xavier<R: Rng>(input: usize, output: usize, rng: &mut R) -> Self {
        Self {
            weight: Matrix::xavier(output, input, rng),
            bias: vec![0.0; output],
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.cols
    }

    pub fn output_dim(&self) -> usize {
        self.weight.rows
    }

    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        (0..self.weight.rows)
            .map(|o| self.bias[o] + dot(self.weight.row(o), x))
            .collect()
    }

    pub fn is_consistent(&self) -> bool {
        self.weight.is_consistent() && self.bias.len() == self.weight.rows
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerNorm {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
    #[serde(default = "default_eps")]
    pub eps: f32,
}

fn default_eps() -> f32 {
    1e-5
}

impl LayerNorm {
    pub fn identity(dim: usize) -> Self {
        Self {
            gamma: vec![1.0; dim],
            beta: vec![0.0; dim],
            eps: default_eps(),
        }
    }

    pub fn forward(&self, x: &mut [f32]) {
        let n = x.len() as f32;
        let mean = x.iter().sum::<f32>() / n;
        let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let inv_std = 1.0 / (var + self.eps).sqrt();

        for (i, v) in x.iter_mut().enumerate() {
            *v = (*v - mean) * inv_std * self.gamma[i] + self.beta[i];
        }
    }
}

/// Tanh approximation of GELU
pub fn gelu(x: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)).tanh())
}

/// In-place softmax; entries equal to `-inf` get zero weight
pub fn softmax(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        scores.iter_mut().for_each(|s| *s = 0.0);
        return;
    }

    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_forward() {
        let layer = Linear {
            weight: Matrix {
                rows: 2,
                cols: 3,
                data: vec![1.0, 0.0, 2.0, 0.0, 1.0, -1.0],
            },
            bias: vec![0.5, 0.0],
        };
        assert_eq!(layer.forward(&[1.0, 2.0, 3.0]), vec![7.5, -1.0]);
    }

    #[test]
    fn test_layer_norm_zero_mean_unit_variance() {
        let mut x = vec![1.0, 2.0, 3.0, 4.0];
        LayerNorm::identity(4).forward(&mut x);

        let mean: f32 = x.iter().sum::<f32>() / 4.0;
        let var: f32 = x.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_softmax_masks_negative_infinity() {
        let mut scores = vec![1.0, f32::NEG_INFINITY, 1.0];
        softmax(&mut scores);
        assert_eq!(scores[1], 0.0);
        assert!((scores[0] - 0.5).abs() < 1e-6);
        assert!((scores[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_all_masked() {
        let mut scores = vec![f32::NEG_INFINITY; 3];
        softmax(&mut scores);
        assert_eq!(scores, vec![0.0; 3]);
    }

    #[test]
    fn test_gelu_reference_points() {
        assert_eq!(gelu(0.0), 0.0);
        assert!((gelu(1.0) - 0.8412).abs() < 1e-3);
        assert!(gelu(-6.0).abs() < 1e-3);
    }

    #[test]
    fn test_xavier_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let m = Matrix::xavier(4, 8, &mut rng);
        let limit = (6.0f32 / 12.0).sqrt();
        assert!(m.data.iter().all(|v| v.abs() <= limit));
        assert!(m.is_consistent());
    }
}
