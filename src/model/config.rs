use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};
use crate::feature_extraction::FeatureSet;

/// Number of tweet feature slots per user.
pub const NUM_TWEET_SLOTS: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackboneKind {
    Recurrent,
    TemporalConv,
}

/// Hyper-parameters of a `BotClassifier`, fixed at construction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub embedding_dim: usize,
    pub rec_hidden_dim: usize,
    pub tweet_features_dim: usize,
    pub hidden_dim: usize,
    pub num_rec_layers: usize,
    pub rec_dropout: f32,
    pub feature_set: FeatureSet,
    pub backbone: BackboneKind,
    /// Upper bound on how many past tweets reach one temporal-convolution output.
    pub effective_history: usize,
}

impl ClassifierConfig {
    pub fn new(embedding_dim: usize, rec_hidden_dim: usize, tweet_features_dim: usize, hidden_dim: usize) -> Self {
        ClassifierConfig {
            embedding_dim,
            rec_hidden_dim,
            tweet_features_dim,
            hidden_dim,
            num_rec_layers: 1,
            rec_dropout: 0.,
            feature_set: FeatureSet::Base,
            backbone: BackboneKind::Recurrent,
            effective_history: 91,
        }
    }

    /// Width of the fused vector: combined tweet features plus handcrafted features.
    pub fn fused_dim(&self) -> usize {
        self.tweet_features_dim + self.feature_set.width()
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("embedding_dim", self.embedding_dim),
            ("rec_hidden_dim", self.rec_hidden_dim),
            ("tweet_features_dim", self.tweet_features_dim),
            ("hidden_dim", self.hidden_dim),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, dim)| *dim == 0) {
            return Err(invalid(format!("{} must be positive", name)));
        }

        if !(0. ..1.).contains(&self.rec_dropout) {
            return Err(invalid(format!("rec_dropout must be in [0, 1), got {}", self.rec_dropout)));
        }

        match self.backbone {
            BackboneKind::Recurrent if self.num_rec_layers == 0 => Err(invalid("num_rec_layers must be positive".to_string())),
            BackboneKind::TemporalConv if self.effective_history < 2 => {
                Err(invalid(format!("effective_history must be at least 2, got {}", self.effective_history)))
            }
            _ => Ok(()),
        }
    }
}

fn invalid(reason: String) -> ClassifierError {
    ClassifierError::InvalidConfig(reason)
}
