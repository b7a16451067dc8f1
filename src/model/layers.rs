//! Dense building blocks over `ndarray` matrices laid out as `[batch, features]`.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, expect_width, Result};

/// Fully connected layer `y = x W^T + b`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Linear {
    /// `[out_features, in_features]`
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    /// Uniform initialisation in `(-1/sqrt(in), 1/sqrt(in))` for both weight and bias.
    pub fn initialize(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let bound = 1. / (in_features as f32).sqrt();
        Linear {
            weight: Array2::from_shape_fn((out_features, in_features), |_| rng.gen_range(-bound..bound)),
            bias: Array1::from_shape_fn(out_features, |_| rng.gen_range(-bound..bound)),
        }
    }

    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        let linear = Linear { weight, bias };
        linear.validate()?;
        Ok(linear)
    }

    /// Check parameter shapes, e.g. after deserialization.
    pub fn validate(&self) -> Result<()> {
        expect_width("linear bias", self.weight.nrows(), self.bias.len())
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        expect_width("linear input", self.in_features(), input.ncols())?;
        Ok(input.dot(&self.weight.t()) + &self.bias)
    }

    /// Single sample version of `forward`.
    pub fn forward_one(&self, input: &Array1<f32>) -> Array1<f32> {
        self.weight.dot(input) + &self.bias
    }
}

/// Batch normalization over the feature axis.
///
/// Inference uses the running estimates. Training normalizes with the batch statistics
/// (biased variance) and folds them into the running estimates (unbiased variance).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchNorm1d {
    weight: Array1<f32>,
    bias: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    eps: f32,
    momentum: f32,
}

impl BatchNorm1d {
    pub fn new(num_features: usize) -> Self {
        BatchNorm1d {
            weight: Array1::ones(num_features),
            bias: Array1::zeros(num_features),
            running_mean: Array1::zeros(num_features),
            running_var: Array1::ones(num_features),
            eps: 1e-5,
            momentum: 0.1,
        }
    }

    /// Layer with given affine parameters and running statistics.
    pub fn from_parts(weight: Array1<f32>, bias: Array1<f32>, running_mean: Array1<f32>, running_var: Array1<f32>) -> Result<Self> {
        let n = weight.len();
        let norm = BatchNorm1d { weight, bias, running_mean, running_var, ..BatchNorm1d::new(n) };
        norm.validate()?;
        Ok(norm)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.num_features();
        expect_width("batch norm bias", n, self.bias.len())?;
        expect_width("batch norm running mean", n, self.running_mean.len())?;
        expect_width("batch norm running variance", n, self.running_var.len())?;
        if self.running_var.iter().any(|&var| !(var >= 0.)) {
            return Err(ClassifierError::InvalidConfig("batch norm running variance must be non-negative".to_string()));
        }
        if !(self.eps > 0.) {
            return Err(ClassifierError::InvalidConfig(format!("batch norm epsilon must be positive, got {}", self.eps)));
        }
        Ok(())
    }

    pub fn num_features(&self) -> usize {
        self.weight.len()
    }

    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array1<f32> {
        &self.running_var
    }

    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        expect_width("batch norm input", self.num_features(), input.ncols())?;
        Ok(self.scale_shift(input, &self.running_mean, &self.running_var))
    }

    pub fn forward_train(&mut self, input: &Array2<f32>) -> Result<Array2<f32>> {
        expect_width("batch norm input", self.num_features(), input.ncols())?;

        let n = input.nrows();
        if n < 2 {
            return Err(ClassifierError::InvalidBatch(format!("training mode needs more than one sample, got {}", n)));
        }

        let (mean, var) = match input.mean_axis(Axis(0)) {
            Some(mean) => (mean, input.var_axis(Axis(0), 0.)),
            None => return Err(ClassifierError::InvalidBatch("empty batch".to_string())),
        };

        let unbiased = &var * (n as f32 / (n - 1) as f32);
        self.running_mean = &self.running_mean * (1. - self.momentum) + &mean * self.momentum;
        self.running_var = &self.running_var * (1. - self.momentum) + unbiased * self.momentum;

        Ok(self.scale_shift(input, &mean, &var))
    }

    fn scale_shift(&self, input: &Array2<f32>, mean: &Array1<f32>, var: &Array1<f32>) -> Array2<f32> {
        let inv_std = var.mapv(|v| 1. / (v + self.eps).sqrt());
        (input - mean) * &(inv_std * &self.weight) + &self.bias
    }
}

/// Clamp negative values to zero.
pub fn relu(input: Array2<f32>) -> Array2<f32> {
    input.mapv_into(|v| v.max(0.))
}

/// Row-wise softmax, shifted by the row maximum for stability.
pub fn softmax_rows(input: Array2<f32>) -> Array2<f32> {
    let mut output = input;
    for mut row in output.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    output
}

/// `BatchNorm1d -> ReLU -> Linear`, the repeating unit of the classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NormBlock {
    norm: BatchNorm1d,
    linear: Linear,
}

impl NormBlock {
    pub fn initialize(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        NormBlock { norm: BatchNorm1d::new(in_features), linear: Linear::initialize(in_features, out_features, rng) }
    }

    pub fn from_parts(norm: BatchNorm1d, linear: Linear) -> Result<Self> {
        let block = NormBlock { norm, linear };
        block.validate()?;
        Ok(block)
    }

    pub fn validate(&self) -> Result<()> {
        self.norm.validate()?;
        self.linear.validate()?;
        expect_width("block linear input", self.norm.num_features(), self.linear.in_features())
    }

    pub fn in_features(&self) -> usize {
        self.norm.num_features()
    }

    pub fn out_features(&self) -> usize {
        self.linear.out_features()
    }

    pub fn norm(&self) -> &BatchNorm1d {
        &self.norm
    }

    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.linear.forward(&relu(self.norm.forward(input)?))
    }

    pub fn forward_train(&mut self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.linear.forward(&relu(self.norm.forward_train(input)?))
    }
}
