use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, expect_width, Result};
use crate::feature_extraction::FeatureSet;

// Column order: avg gap, followers, friends
const BASE_MEANS: [f32; 3] = [5.6675e+04, 3.2708e+03, 6.6564e+02];
const BASE_STDS: [f32; 3] = [2.2061e+04, 2.1951e+04, 1.3241e+03];

// Column order: avg gap, topic similarity, followers, friends
const TOPICAL_MEANS: [f32; 4] = [5.6675e+04, 6.6008e-01, 3.2708e+03, 6.6564e+02];
const TOPICAL_STDS: [f32; 4] = [2.2061e+04, 2.8933e+00, 2.1951e+04, 1.3241e+03];

/// Fixed affine standardization of handcrafted feature rows: `(x - means) / stds`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Normalizer {
    means: Array1<f32>,
    stds: Array1<f32>,
}

impl Normalizer {
    pub fn new(means: Vec<f32>, stds: Vec<f32>) -> Result<Self> {
        let normalizer = Normalizer { means: Array1::from(means), stds: Array1::from(stds) };
        normalizer.validate()?;
        Ok(normalizer)
    }

    pub fn validate(&self) -> Result<()> {
        expect_width("normalization constants", self.means.len(), self.stds.len())?;
        if self.means.is_empty() {
            return Err(ClassifierError::InvalidConfig("normalization constants are empty".to_string()));
        }
        if self.stds.iter().any(|&std| !(std.is_finite() && std > 0.)) {
            return Err(ClassifierError::InvalidConfig("standard deviations must be finite and positive".to_string()));
        }
        Ok(())
    }

    /// Constants matching the column layout of `feature_set`.
    pub fn for_feature_set(feature_set: FeatureSet) -> Self {
        let (means, stds): (&[f32], &[f32]) = match feature_set {
            FeatureSet::Base => (&BASE_MEANS, &BASE_STDS),
            FeatureSet::Topical => (&TOPICAL_MEANS, &TOPICAL_STDS),
        };
        Normalizer { means: Array1::from(means.to_vec()), stds: Array1::from(stds.to_vec()) }
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }

    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    pub fn means(&self) -> &Array1<f32> {
        &self.means
    }

    pub fn stds(&self) -> &Array1<f32> {
        &self.stds
    }

    /// Standardize every row of `features`, which must have exactly `len()` columns.
    pub fn normalize(&self, features: &Array2<f32>) -> Result<Array2<f32>> {
        expect_width("handcrafted feature normalization", self.len(), features.ncols())?;
        Ok((features - &self.means) / &self.stds)
    }
}
