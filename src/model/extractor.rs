use ndarray::{Array1, Array2, Array3, Axis, concatenate, s};
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, expect_width, Result};
use crate::model::config::{BackboneKind, ClassifierConfig, NUM_TWEET_SLOTS};
use crate::model::layers::{Linear, relu};
use crate::shared_interface::Tweet;
use crate::text::WordEmbeddings;

/// Turns per-user tweet histories into per-tweet feature slots.
pub trait TweetFeatureExtractor: Send + Sync {
    /// Width of one tweet feature vector.
    fn output_dim(&self) -> usize;

    /// Returns a `[batch, NUM_TWEET_SLOTS, output_dim]` tensor. Histories are truncated to the
    /// most recent `NUM_TWEET_SLOTS` tweets and shorter ones are zero padded.
    fn extract(&self, tweet_lists: &[&[Tweet]], tweet_counts: &[usize]) -> Result<Array3<f32>>;
}

/// One Elman layer: `h_t = tanh(W_ih x_t + b_ih + W_hh h_{t-1} + b_hh)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecurrentLayer {
    input: Linear,
    hidden: Linear,
}

impl RecurrentLayer {
    pub fn initialize(in_dim: usize, hidden_dim: usize, rng: &mut StdRng) -> Self {
        RecurrentLayer {
            input: Linear::initialize(in_dim, hidden_dim, rng),
            hidden: Linear::initialize(hidden_dim, hidden_dim, rng),
        }
    }

    fn validate(&self) -> Result<()> {
        self.input.validate()?;
        self.hidden.validate()?;
        expect_width("recurrent state", self.hidden.out_features(), self.hidden.in_features())?;
        expect_width("recurrent input projection", self.hidden.out_features(), self.input.out_features())
    }

    fn forward(&self, sequence: &Array2<f32>) -> Array2<f32> {
        let hidden_dim = self.hidden.out_features();
        let mut output = Array2::<f32>::zeros((sequence.nrows(), hidden_dim));
        let mut state = Array1::<f32>::zeros(hidden_dim);

        for (t, x) in sequence.rows().into_iter().enumerate() {
            state = (self.input.forward_one(&x.to_owned()) + self.hidden.forward_one(&state)).mapv_into(f32::tanh);
            output.row_mut(t).assign(&state);
        }
        output
    }
}

/// One causal convolution level with kernel size 2: `y_t = relu(K [x_t, x_{t-d}] + b)`,
/// plus `x_t` when input and output widths agree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemporalLevel {
    dilation: usize,
    kernel: Linear,
}

impl TemporalLevel {
    pub fn initialize(in_dim: usize, out_dim: usize, dilation: usize, rng: &mut StdRng) -> Self {
        TemporalLevel { dilation, kernel: Linear::initialize(2 * in_dim, out_dim, rng) }
    }

    fn in_dim(&self) -> usize {
        self.kernel.in_features() / 2
    }

    fn validate(&self) -> Result<()> {
        self.kernel.validate()?;
        expect_width("temporal kernel input", 2 * self.in_dim(), self.kernel.in_features())?;
        if self.dilation == 0 {
            return Err(ClassifierError::InvalidConfig("temporal level dilation must be positive".to_string()));
        }
        Ok(())
    }

    fn forward(&self, sequence: &Array2<f32>) -> Result<Array2<f32>> {
        let steps = sequence.nrows();

        // Shift the sequence by `dilation` steps, zeros before the first tweet
        let mut shifted = Array2::<f32>::zeros(sequence.dim());
        if steps > self.dilation {
            shifted.slice_mut(s![self.dilation.., ..]).assign(&sequence.slice(s![..steps - self.dilation, ..]));
        }

        let window = concatenate(Axis(1), &[sequence.view(), shifted.view()])
            .map_err(|_| ClassifierError::ShapeMismatch { stage: "temporal window", expected: 2 * self.in_dim(), actual: sequence.ncols() })?;
        let mut output = relu(self.kernel.forward(&window)?);

        if self.in_dim() == self.kernel.out_features() {
            output += sequence;
        }
        Ok(output)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Backbone {
    Recurrent(Vec<RecurrentLayer>),
    TemporalConv(Vec<TemporalLevel>),
}

impl Backbone {
    pub fn kind(&self) -> BackboneKind {
        match self {
            Backbone::Recurrent(_) => BackboneKind::Recurrent,
            Backbone::TemporalConv(_) => BackboneKind::TemporalConv,
        }
    }

    fn input_dim(&self) -> Option<usize> {
        match self {
            Backbone::Recurrent(layers) => layers.first().map(|layer| layer.input.in_features()),
            Backbone::TemporalConv(levels) => levels.first().map(|level| level.in_dim()),
        }
    }

    fn output_dim(&self) -> Option<usize> {
        match self {
            Backbone::Recurrent(layers) => layers.last().map(|layer| layer.hidden.out_features()),
            Backbone::TemporalConv(levels) => levels.last().map(|level| level.kernel.out_features()),
        }
    }

    /// Every layer is well formed and feeds the next one.
    fn validate(&self) -> Result<()> {
        match self {
            Backbone::Recurrent(layers) => {
                for layer in layers {
                    layer.validate()?;
                }
                for pair in layers.windows(2) {
                    expect_width("recurrent layer input", pair[0].hidden.out_features(), pair[1].input.in_features())?;
                }
            }
            Backbone::TemporalConv(levels) => {
                for level in levels {
                    level.validate()?;
                }
                for pair in levels.windows(2) {
                    expect_width("temporal level input", pair[0].kernel.out_features(), pair[1].in_dim())?;
                }
            }
        }

        match (self.input_dim(), self.output_dim()) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(ClassifierError::InvalidConfig("backbone has no layers".to_string())),
        }
    }

    fn forward(&self, mut sequence: Array2<f32>) -> Result<Array2<f32>> {
        match self {
            Backbone::Recurrent(layers) => {
                // No dropout at inference
                for layer in layers {
                    sequence = layer.forward(&sequence);
                }
            }
            Backbone::TemporalConv(levels) => {
                for level in levels {
                    sequence = level.forward(&sequence)?;
                }
            }
        }
        Ok(sequence)
    }
}

/// Number of kernel-2 levels whose receptive field `2^levels` fits in `effective_history` tweets.
pub fn temporal_levels(effective_history: usize) -> usize {
    let mut levels = 0;
    while (2usize << levels) <= effective_history {
        levels += 1;
    }
    levels
}

/// Learned parameters of `SequenceExtractor`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SequenceExtractorWeights {
    pub backbone: Backbone,
    pub projection: Linear,
}

impl SequenceExtractorWeights {
    pub fn initialize(config: &ClassifierConfig, rng: &mut StdRng) -> Self {
        let backbone = match config.backbone {
            BackboneKind::Recurrent => Backbone::Recurrent((0..config.num_rec_layers)
                .map(|layer| {
                    let in_dim = if layer == 0 { config.embedding_dim } else { config.rec_hidden_dim };
                    RecurrentLayer::initialize(in_dim, config.rec_hidden_dim, rng)
                })
                .collect()),
            BackboneKind::TemporalConv => Backbone::TemporalConv((0..temporal_levels(config.effective_history))
                .map(|level| {
                    let in_dim = if level == 0 { config.embedding_dim } else { config.rec_hidden_dim };
                    TemporalLevel::initialize(in_dim, config.rec_hidden_dim, 1 << level, rng)
                })
                .collect()),
        };

        SequenceExtractorWeights {
            backbone,
            projection: Linear::initialize(config.rec_hidden_dim, config.tweet_features_dim, rng),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.backbone.validate()?;
        self.projection.validate()?;
        expect_width("tweet feature projection", self.backbone.output_dim().unwrap_or(0), self.projection.in_features())
    }

    /// Word embedding width the backbone expects, zero for an empty backbone.
    pub fn input_dim(&self) -> usize {
        self.backbone.input_dim().unwrap_or(0)
    }

    pub fn output_dim(&self) -> usize {
        self.projection.out_features()
    }
}

/// Embeds each tweet as its mean word vector, runs the tweet sequence through the backbone
/// and projects every step to the tweet feature width.
pub struct SequenceExtractor {
    embeddings: WordEmbeddings,
    weights: SequenceExtractorWeights,
}

impl SequenceExtractor {
    pub fn new(embeddings: WordEmbeddings, weights: SequenceExtractorWeights) -> Result<Self> {
        weights.validate()?;
        expect_width("backbone input", weights.input_dim(), embeddings.dim())?;

        Ok(SequenceExtractor { embeddings, weights })
    }

    pub fn backbone_kind(&self) -> BackboneKind {
        self.weights.backbone.kind()
    }

    fn user_features(&self, tweets: &[Tweet]) -> Result<Array2<f32>> {
        let recent = &tweets[tweets.len().saturating_sub(NUM_TWEET_SLOTS)..];

        let mut sequence = Array2::<f32>::zeros((recent.len(), self.embeddings.dim()));
        for (mut row, tweet) in sequence.rows_mut().into_iter().zip(recent.iter()) {
            row.assign(&self.embeddings.embed_tweet(tweet));
        }

        let hidden = self.weights.backbone.forward(sequence)?;
        self.weights.projection.forward(&hidden)
    }
}

impl TweetFeatureExtractor for SequenceExtractor {
    fn output_dim(&self) -> usize {
        self.weights.output_dim()
    }

    fn extract(&self, tweet_lists: &[&[Tweet]], tweet_counts: &[usize]) -> Result<Array3<f32>> {
        expect_width("tweet counts", tweet_lists.len(), tweet_counts.len())?;

        let per_user = tweet_lists.par_iter()
            .zip(tweet_counts.par_iter())
            .map(|(tweets, &count)| self.user_features(&tweets[..count.min(tweets.len())]))
            .collect::<Result<Vec<Array2<f32>>>>()?;

        let mut slots = Array3::<f32>::zeros((tweet_lists.len(), NUM_TWEET_SLOTS, self.output_dim()));
        for (user, features) in per_user.iter().enumerate() {
            slots.slice_mut(s![user, ..features.nrows(), ..]).assign(features);
        }
        Ok(slots)
    }
}


#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2, s};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::model::config::{BackboneKind, ClassifierConfig, NUM_TWEET_SLOTS};
    use crate::model::extractor::{Backbone, RecurrentLayer, SequenceExtractor, SequenceExtractorWeights, temporal_levels, TemporalLevel, TweetFeatureExtractor};
    use crate::model::layers::Linear;
    use crate::shared_interface::Tweet;
    use crate::text::WordEmbeddings;

    fn config(backbone: BackboneKind) -> ClassifierConfig {
        ClassifierConfig { backbone, ..ClassifierConfig::new(2, 3, 4, 5) }
    }

    fn embeddings() -> WordEmbeddings {
        let mut embeddings = WordEmbeddings::new(2);
        embeddings.insert("bot", vec![1., 0.]).unwrap();
        embeddings.insert("human", vec![0., 1.]).unwrap();
        embeddings
    }

    fn history(n: usize) -> Vec<Tweet> {
        (0..n).map(|i| Tweet::new(if i % 2 == 0 { "bot" } else { "human" }, i as f64)).collect()
    }

    #[test]
    fn level_counts() {
        assert_eq!(1, temporal_levels(2));
        assert_eq!(1, temporal_levels(3));
        assert_eq!(2, temporal_levels(4));
        assert_eq!(6, temporal_levels(91));
        assert_eq!(7, temporal_levels(128));
    }

    #[test]
    fn slots_are_padded_and_truncated() {
        for &backbone in &[BackboneKind::Recurrent, BackboneKind::TemporalConv] {
            let mut rng = StdRng::seed_from_u64(3);
            let weights = SequenceExtractorWeights::initialize(&config(backbone), &mut rng);
            let extractor = SequenceExtractor::new(embeddings(), weights).unwrap();
            assert_eq!(backbone, extractor.backbone_kind());

            let short = history(3);
            let long = history(150);
            let lists = vec![short.as_slice(), long.as_slice()];

            let slots = extractor.extract(&lists, &[3, 150]).unwrap();

            assert_eq!((2, NUM_TWEET_SLOTS, 4), slots.dim());
            assert!(slots.slice(s![0, 3.., ..]).iter().all(|&v| v == 0.));
            assert!(slots.slice(s![1, NUM_TWEET_SLOTS - 1, ..]).iter().any(|&v| v != 0.));
        }
    }

    #[test]
    fn truncation_keeps_most_recent() {
        let mut rng = StdRng::seed_from_u64(5);
        let weights = SequenceExtractorWeights::initialize(&config(BackboneKind::Recurrent), &mut rng);
        let extractor = SequenceExtractor::new(embeddings(), weights).unwrap();

        let long = history(101);
        let recent = long[1..].to_vec();

        let a = extractor.extract(&[long.as_slice()], &[101]).unwrap();
        let b = extractor.extract(&[recent.as_slice()], &[100]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn counts_limit_the_history() {
        let mut rng = StdRng::seed_from_u64(5);
        let weights = SequenceExtractorWeights::initialize(&config(BackboneKind::TemporalConv), &mut rng);
        let extractor = SequenceExtractor::new(embeddings(), weights).unwrap();

        let tweets = history(5);
        let slots = extractor.extract(&[tweets.as_slice()], &[2]).unwrap();
        assert!(slots.slice(s![0, 2.., ..]).iter().all(|&v| v == 0.));

        assert!(extractor.extract(&[tweets.as_slice()], &[]).is_err());
    }

    #[test]
    fn recurrent_layer_known_weights() {
        let layer = RecurrentLayer {
            input: Linear::from_parts(arr2(&[[1.]]), arr1(&[0.])).unwrap(),
            hidden: Linear::from_parts(arr2(&[[1.]]), arr1(&[0.])).unwrap(),
        };
        let out = layer.forward(&arr2(&[[0.5], [0.]]));

        let h0 = 0.5_f32.tanh();
        assert!((out[[0, 0]] - h0).abs() < 1e-6);
        assert!((out[[1, 0]] - h0.tanh()).abs() < 1e-6);
    }

    #[test]
    fn temporal_level_is_causal() {
        let level = TemporalLevel {
            dilation: 2,
            kernel: Linear::from_parts(arr2(&[[1., 10.]]), arr1(&[0.])).unwrap(),
        };
        let out = level.forward(&arr2(&[[1.], [2.], [3.]])).unwrap();

        // relu(x_t + 10 x_{t-2}) + x_t
        assert_eq!(arr2(&[[2.], [4.], [16.]]), out);
    }

    #[test]
    fn temporal_level_without_residual() {
        let level = TemporalLevel {
            dilation: 1,
            kernel: Linear::from_parts(arr2(&[[1., -1., 0., 0.]]), arr1(&[0.5])).unwrap(),
        };
        let out = level.forward(&arr2(&[[3., 1.], [0., 2.]])).unwrap();

        assert_eq!(arr2(&[[2.5], [0.]]), out);
    }

    #[test]
    fn reject_embedding_width_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let weights = SequenceExtractorWeights::initialize(&ClassifierConfig::new(3, 3, 4, 5), &mut rng);
        assert!(SequenceExtractor::new(embeddings(), weights).is_err());

        let empty = SequenceExtractorWeights { backbone: Backbone::Recurrent(vec![]), projection: Linear::initialize(3, 4, &mut rng) };
        assert!(SequenceExtractor::new(embeddings(), empty).is_err());
    }

    #[test]
    fn reject_layers_that_do_not_chain() {
        let mut rng = StdRng::seed_from_u64(0);
        let layers = vec![RecurrentLayer::initialize(2, 3, &mut rng), RecurrentLayer::initialize(4, 3, &mut rng)];
        let weights = SequenceExtractorWeights { backbone: Backbone::Recurrent(layers), projection: Linear::initialize(3, 4, &mut rng) };
        assert!(weights.validate().is_err());

        let levels = vec![TemporalLevel::initialize(2, 3, 0, &mut rng)];
        let weights = SequenceExtractorWeights { backbone: Backbone::TemporalConv(levels), projection: Linear::initialize(3, 4, &mut rng) };
        assert!(SequenceExtractor::new(embeddings(), weights).is_err());
    }
}
