use ndarray::{Array2, Axis, concatenate};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, expect_width, Result};
use crate::model::layers::{NormBlock, softmax_rows};

/// Class column of the probability matrix.
pub const HUMAN: usize = 0;
pub const BOT: usize = 1;
pub const NUM_CLASSES: usize = 2;

/// Fuses combined tweet features with normalized handcrafted features and classifies.
///
/// `features`: `BatchNorm -> ReLU -> Linear(fused, hidden)`, then
/// `classifier`: `BatchNorm -> ReLU -> Linear(hidden, 2) -> softmax`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FusionHead {
    features: NormBlock,
    classifier: NormBlock,
}

impl FusionHead {
    pub fn initialize(fused_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        FusionHead {
            features: NormBlock::initialize(fused_dim, hidden_dim, rng),
            classifier: NormBlock::initialize(hidden_dim, NUM_CLASSES, rng),
        }
    }

    pub fn from_blocks(features: NormBlock, classifier: NormBlock) -> Result<Self> {
        let head = FusionHead { features, classifier };
        head.validate()?;
        Ok(head)
    }

    /// Both blocks line up and the classifier emits exactly `NUM_CLASSES` logits.
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.classifier.validate()?;
        expect_width("classifier input", self.features.out_features(), self.classifier.in_features())?;
        expect_width("classifier output", NUM_CLASSES, self.classifier.out_features())
    }

    pub fn fused_dim(&self) -> usize {
        self.features.in_features()
    }

    pub fn hidden_dim(&self) -> usize {
        self.features.out_features()
    }

    /// `[batch, 2]` class probabilities, columns `HUMAN` and `BOT`.
    pub fn forward(&self, tweet_features: &Array2<f32>, handcrafted: &Array2<f32>) -> Result<Array2<f32>> {
        let fused = self.fuse(tweet_features, handcrafted)?;
        let hidden = self.features.forward(&fused)?;
        Ok(softmax_rows(self.classifier.forward(&hidden)?))
    }

    pub fn forward_train(&mut self, tweet_features: &Array2<f32>, handcrafted: &Array2<f32>) -> Result<Array2<f32>> {
        let fused = self.fuse(tweet_features, handcrafted)?;
        let hidden = self.features.forward_train(&fused)?;
        Ok(softmax_rows(self.classifier.forward_train(&hidden)?))
    }

    fn fuse(&self, tweet_features: &Array2<f32>, handcrafted: &Array2<f32>) -> Result<Array2<f32>> {
        expect_width("fusion batch", tweet_features.nrows(), handcrafted.nrows())?;
        expect_width("fused features", self.fused_dim(), tweet_features.ncols() + handcrafted.ncols())?;

        concatenate(Axis(1), &[tweet_features.view(), handcrafted.view()])
            .map_err(|_| ClassifierError::ShapeMismatch { stage: "feature fusion", expected: self.fused_dim(), actual: tweet_features.ncols() + handcrafted.ncols() })
    }
}


#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2, Array1, Array2};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::model::head::{BOT, FusionHead, HUMAN};
    use crate::model::layers::{BatchNorm1d, Linear, NormBlock};

    fn identity_norm(n: usize) -> BatchNorm1d {
        BatchNorm1d::from_parts(Array1::ones(n), Array1::zeros(n), Array1::zeros(n), Array1::ones(n)).unwrap()
    }

    #[test]
    fn probabilities_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(9);
        let head = FusionHead::initialize(7, 5, &mut rng);

        let tweet_features = Array2::from_shape_fn((4, 4), |(i, j)| (i * j) as f32 - 3.);
        let handcrafted = Array2::from_shape_fn((4, 3), |(i, j)| (i + j) as f32 / 2.);
        let probs = head.forward(&tweet_features, &handcrafted).unwrap();

        assert_eq!((4, 2), probs.dim());
        for row in probs.rows() {
            assert!((row.sum() - 1.).abs() < 1e-6);
            assert!(row.iter().all(|&p| (0. ..=1.).contains(&p)));
        }
    }

    #[test]
    fn handcrafted_features_reach_the_classifier() {
        // Hidden unit = the single handcrafted feature, bot logit follows it
        let features = NormBlock::from_parts(identity_norm(2), Linear::from_parts(arr2(&[[0., 1.]]), arr1(&[0.])).unwrap()).unwrap();
        let classifier = NormBlock::from_parts(identity_norm(1), Linear::from_parts(arr2(&[[0.], [1.]]), arr1(&[0., 0.])).unwrap()).unwrap();
        let head = FusionHead::from_blocks(features, classifier).unwrap();

        let probs = head.forward(&arr2(&[[1.], [1.]]), &arr2(&[[0.], [4.]])).unwrap();

        assert!((probs[[0, HUMAN]] - 0.5).abs() < 1e-6);
        assert!(probs[[1, BOT]] > 0.95);
    }

    #[test]
    fn reject_mismatched_widths() {
        let mut rng = StdRng::seed_from_u64(9);
        let head = FusionHead::initialize(7, 5, &mut rng);

        assert!(head.forward(&Array2::zeros((2, 4)), &Array2::zeros((2, 4))).is_err());
        assert!(head.forward(&Array2::zeros((2, 4)), &Array2::zeros((3, 3))).is_err());
    }

    #[test]
    fn reject_wrong_class_count() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(FusionHead::from_blocks(NormBlock::initialize(4, 3, &mut rng), NormBlock::initialize(3, 3, &mut rng)).is_err());
        assert!(FusionHead::from_blocks(NormBlock::initialize(4, 3, &mut rng), NormBlock::initialize(2, 2, &mut rng)).is_err());
    }
}
