use std::io::{Read, Write};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClassifierError, expect_width, Result};
use crate::feature_extraction::Normalizer;
use crate::model::combiner::TweetCombiner;
use crate::model::config::ClassifierConfig;
use crate::model::extractor::SequenceExtractorWeights;
use crate::model::head::FusionHead;

/// Everything needed to rebuild a `BotClassifier`, except the word embeddings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub config: ClassifierConfig,
    pub extractor: SequenceExtractorWeights,
    pub combiner: TweetCombiner,
    pub head: FusionHead,
    pub normalizer: Normalizer,
}

impl Checkpoint {
    /// Fresh parameters drawn from a seeded generator, with the default normalization constants.
    pub fn initialize(config: ClassifierConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        Ok(Checkpoint {
            extractor: SequenceExtractorWeights::initialize(&config, &mut rng),
            combiner: TweetCombiner::initialize(config.tweet_features_dim, &mut rng),
            head: FusionHead::initialize(config.fused_dim(), config.hidden_dim, &mut rng),
            normalizer: Normalizer::for_feature_set(config.feature_set),
            config,
        })
    }

    /// Every part is well formed and agrees with `config`.
    pub fn validate(&self) -> Result<()> {
        let config = &self.config;
        config.validate()?;
        self.extractor.validate()?;
        self.combiner.validate()?;
        self.head.validate()?;
        self.normalizer.validate()?;

        if self.extractor.backbone.kind() != config.backbone {
            return Err(ClassifierError::InvalidConfig(format!(
                "checkpoint holds a {:?} backbone, configuration asks for {:?}", self.extractor.backbone.kind(), config.backbone)));
        }

        expect_width("backbone input", config.embedding_dim, self.extractor.input_dim())?;
        expect_width("tweet feature extractor output", config.tweet_features_dim, self.extractor.output_dim())?;
        expect_width("combiner output", config.tweet_features_dim, self.combiner.output_dim())?;
        expect_width("fusion input", config.fused_dim(), self.head.fused_dim())?;
        expect_width("fusion hidden layer", config.hidden_dim, self.head.hidden_dim())?;
        expect_width("normalization constants", config.feature_set.width(), self.normalizer.len())
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let checkpoint: Checkpoint = bincode::deserialize_from(reader)?;
        checkpoint.validate()?;

        info!(feature_set = ?checkpoint.config.feature_set, backbone = ?checkpoint.config.backbone, "Loaded checkpoint");
        Ok(checkpoint)
    }
}
