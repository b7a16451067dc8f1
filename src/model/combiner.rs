use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, expect_width, Result};
use crate::model::config::NUM_TWEET_SLOTS;
use crate::model::layers::NormBlock;

/// Compresses the flattened tweet slots of a user to one `tweet_features_dim` vector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TweetCombiner {
    block: NormBlock,
}

impl TweetCombiner {
    pub fn initialize(tweet_features_dim: usize, rng: &mut StdRng) -> Self {
        TweetCombiner { block: NormBlock::initialize(NUM_TWEET_SLOTS * tweet_features_dim, tweet_features_dim, rng) }
    }

    pub fn from_block(block: NormBlock) -> Result<Self> {
        let combiner = TweetCombiner { block };
        combiner.validate()?;
        Ok(combiner)
    }

    pub fn validate(&self) -> Result<()> {
        self.block.validate()?;
        expect_width("combiner input", NUM_TWEET_SLOTS * self.output_dim(), self.block.in_features())
    }

    pub fn output_dim(&self) -> usize {
        self.block.out_features()
    }

    pub fn forward(&self, slots: &Array3<f32>) -> Result<Array2<f32>> {
        self.block.forward(&self.flatten(slots)?)
    }

    pub fn forward_train(&mut self, slots: &Array3<f32>) -> Result<Array2<f32>> {
        let flat = self.flatten(slots)?;
        self.block.forward_train(&flat)
    }

    // [batch, slots, dim] -> [batch, slots * dim], slot-major
    fn flatten(&self, slots: &Array3<f32>) -> Result<Array2<f32>> {
        let (batch, n_slots, dim) = slots.dim();
        expect_width("tweet feature slots", NUM_TWEET_SLOTS, n_slots)?;
        expect_width("tweet feature width", self.output_dim(), dim)?;

        slots.as_standard_layout()
            .into_owned()
            .into_shape((batch, n_slots * dim))
            .map_err(|_| ClassifierError::ShapeMismatch { stage: "tweet slot flattening", expected: n_slots * dim, actual: slots.len() })
    }
}
