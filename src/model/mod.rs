use ndarray::{Array2, Array3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

pub use crate::model::checkpoint::Checkpoint;
pub use crate::model::combiner::TweetCombiner;
pub use crate::model::config::{BackboneKind, ClassifierConfig, NUM_TWEET_SLOTS};
pub use crate::model::extractor::{Backbone, SequenceExtractor, SequenceExtractorWeights, TweetFeatureExtractor};
pub use crate::model::head::{BOT, FusionHead, HUMAN, NUM_CLASSES};
use crate::error::{ClassifierError, expect_width, Result};
use crate::feature_extraction::{assemble, FeatureSet, IntensityIndex, KeywordTopicSimilarity, Normalizer, RecencyIntensity, Signals, TopicSet, TopicSimilarity};
use crate::shared_interface::{tweet_counts, tweet_lists, User};
use crate::text::WordEmbeddings;

mod checkpoint;
mod combiner;
mod config;
mod extractor;
mod head;
pub mod layers;

/// Services behind the optional topical similarity feature.
pub struct TopicalSignal {
    pub similarity: Box<dyn TopicSimilarity>,
    pub intensity: Box<dyn IntensityIndex>,
}

impl TopicalSignal {
    pub fn new(similarity: Box<dyn TopicSimilarity>, intensity: Box<dyn IntensityIndex>) -> Self {
        TopicalSignal { similarity, intensity }
    }

    /// Keyword matching weighted by tweet recency.
    pub fn keyword() -> Self {
        TopicalSignal::new(Box::new(KeywordTopicSimilarity), Box::new(RecencyIntensity))
    }
}

/// Bot or human classifier over tweet histories and account statistics.
///
/// Output rows are `[P(human), P(bot)]` (see `HUMAN` and `BOT`).
pub struct BotClassifier {
    config: ClassifierConfig,
    extractor: Box<dyn TweetFeatureExtractor>,
    combiner: TweetCombiner,
    normalizer: Normalizer,
    head: FusionHead,
    topical: Option<TopicalSignal>,
}

impl BotClassifier {
    /// Assemble a classifier from its parts, checking that every width lines up.
    pub fn new(config: ClassifierConfig, extractor: Box<dyn TweetFeatureExtractor>, combiner: TweetCombiner,
               head: FusionHead, normalizer: Normalizer, topical: Option<TopicalSignal>) -> Result<Self> {
        config.validate()?;
        combiner.validate()?;
        head.validate()?;
        normalizer.validate()?;

        expect_width("tweet feature extractor output", config.tweet_features_dim, extractor.output_dim())?;
        expect_width("combiner output", config.tweet_features_dim, combiner.output_dim())?;
        expect_width("normalization constants", config.feature_set.width(), normalizer.len())?;
        expect_width("fusion input", config.fused_dim(), head.fused_dim())?;
        expect_width("fusion hidden layer", config.hidden_dim, head.hidden_dim())?;

        match (config.feature_set, &topical) {
            (FeatureSet::Topical, None) => return Err(ClassifierError::MissingAuxiliaryInput("topical similarity service")),
            (FeatureSet::Base, Some(_)) => {
                return Err(ClassifierError::InvalidConfig("topical similarity service given without the topical feature set".to_string()));
            }
            _ => {}
        }

        Ok(BotClassifier { config, extractor, combiner, normalizer, head, topical })
    }

    /// Classifier with seeded random parameters around the given extractor.
    pub fn initialize(config: ClassifierConfig, extractor: Box<dyn TweetFeatureExtractor>,
                      topical: Option<TopicalSignal>, seed: u64) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let combiner = TweetCombiner::initialize(config.tweet_features_dim, &mut rng);
        let head = FusionHead::initialize(config.fused_dim(), config.hidden_dim, &mut rng);
        let normalizer = Normalizer::for_feature_set(config.feature_set);

        BotClassifier::new(config, extractor, combiner, head, normalizer, topical)
    }

    pub fn from_checkpoint(checkpoint: Checkpoint, embeddings: WordEmbeddings, topical: Option<TopicalSignal>) -> Result<Self> {
        checkpoint.validate()?;
        let Checkpoint { config, extractor, combiner, head, normalizer } = checkpoint;

        let extractor = SequenceExtractor::new(embeddings, extractor)?;

        BotClassifier::new(config, Box::new(extractor), combiner, head, normalizer, topical)
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// `[batch, 2]` probabilities using the batch norm running statistics.
    ///
    /// `topics` is required when the classifier uses the topical feature set.
    /// Every user needs at least one tweet.
    pub fn classify(&self, users: &[User], topics: Option<&TopicSet>) -> Result<Array2<f32>> {
        let (slots, handcrafted) = self.prepare(users, topics)?;

        let tweet_features = self.combiner.forward(&slots)?;
        self.head.forward(&tweet_features, &handcrafted)
    }

    /// Training-mode forward pass: batch norm layers normalize with batch statistics and
    /// update their running estimates. Needs at least two users.
    pub fn classify_train(&mut self, users: &[User], topics: Option<&TopicSet>) -> Result<Array2<f32>> {
        let (slots, handcrafted) = self.prepare(users, topics)?;

        let tweet_features = self.combiner.forward_train(&slots)?;
        self.head.forward_train(&tweet_features, &handcrafted)
    }

    /// Checks preconditions, then returns the tweet slots and the normalized handcrafted features.
    fn prepare(&self, users: &[User], topics: Option<&TopicSet>) -> Result<(Array3<f32>, Array2<f32>)> {
        if users.is_empty() {
            return Err(ClassifierError::InvalidBatch("no users to classify".to_string()));
        }

        let signals = match (&self.topical, topics) {
            (None, topics) => {
                if topics.is_some() { debug!("Ignoring topic set, topical feature set is disabled"); }
                Signals::Base
            }
            (Some(_), None) => return Err(ClassifierError::MissingAuxiliaryInput("topic set")),
            (Some(topical), Some(topics)) => Signals::Topical {
                topics,
                similarity: topical.similarity.as_ref(),
                intensity: topical.intensity.as_ref(),
            },
        };

        let handcrafted = self.normalizer.normalize(&assemble(users, &signals)?)?;

        let slots = self.extractor.extract(&tweet_lists(users), &tweet_counts(users))?;
        let (batch, n_slots, dim) = slots.dim();
        expect_width("extracted batch", users.len(), batch)?;
        expect_width("extracted tweet slots", NUM_TWEET_SLOTS, n_slots)?;
        expect_width("extracted tweet features", self.config.tweet_features_dim, dim)?;

        debug!(users = users.len(), "Prepared classification batch");
        Ok((slots, handcrafted))
    }
}


#[cfg(test)]
mod tests {
    use ndarray::{Array3, arr2};

    use crate::error::{ClassifierError, Result};
    use crate::feature_extraction::{assemble, FeatureSet, Normalizer, Signals, TopicSet};
    use crate::model::{BOT, BotClassifier, Checkpoint, ClassifierConfig, HUMAN, NUM_TWEET_SLOTS, TopicalSignal, TweetFeatureExtractor};
    use crate::shared_interface::{Tweet, User};
    use crate::text::WordEmbeddings;

    /// Fills every slot of a user with its tweet count divided by ten.
    struct CountingExtractor {
        dim: usize,
    }

    impl TweetFeatureExtractor for CountingExtractor {
        fn output_dim(&self) -> usize {
            self.dim
        }

        fn extract(&self, tweet_lists: &[&[Tweet]], tweet_counts: &[usize]) -> Result<Array3<f32>> {
            Ok(Array3::from_shape_fn((tweet_lists.len(), NUM_TWEET_SLOTS, self.dim), |(u, _, _)| tweet_counts[u] as f32 / 10.))
        }
    }

    /// Returns a tensor with one slot too few.
    struct BrokenExtractor;

    impl TweetFeatureExtractor for BrokenExtractor {
        fn output_dim(&self) -> usize {
            4
        }

        fn extract(&self, tweet_lists: &[&[Tweet]], _: &[usize]) -> Result<Array3<f32>> {
            Ok(Array3::zeros((tweet_lists.len(), NUM_TWEET_SLOTS - 1, 4)))
        }
    }

    fn user(id: u64, timestamps: &[f64], followers_count: u64, friends_count: u64) -> User {
        User {
            id,
            tweets: timestamps.iter().map(|&ts| Tweet::new("vote for me", ts)).collect(),
            followers_count,
            friends_count,
        }
    }

    fn config(feature_set: FeatureSet) -> ClassifierConfig {
        ClassifierConfig { feature_set, ..ClassifierConfig::new(2, 3, 4, 6) }
    }

    fn base_classifier() -> BotClassifier {
        BotClassifier::initialize(config(FeatureSet::Base), Box::new(CountingExtractor { dim: 4 }), None, 21).unwrap()
    }

    fn assert_probabilities(probs: &ndarray::Array2<f32>, batch: usize) {
        assert_eq!((batch, 2), probs.dim());
        for row in probs.rows() {
            assert!((row[HUMAN] + row[BOT] - 1.).abs() < 1e-6);
            assert!(row.iter().all(|&p| (0. ..=1.).contains(&p)));
        }
    }

    #[test]
    fn end_to_end_two_users() {
        // A: 3 tweets 10 minutes apart, B: a single tweet
        let users = vec![user(1, &[0., 600., 1200.], 100, 50), user(2, &[0.], 0, 0)];

        let handcrafted = assemble(&users, &Signals::Base).unwrap();
        assert_eq!(arr2(&[[600., 100., 50.], [0., 0., 0.]]), handcrafted);

        let classifier = base_classifier();
        let expected = (&handcrafted - classifier.normalizer().means()) / classifier.normalizer().stds();
        assert_eq!(expected, classifier.normalizer().normalize(&handcrafted).unwrap());

        let probs = classifier.classify(&users, None).unwrap();
        assert_probabilities(&probs, 2);
    }

    #[test]
    fn classify_is_deterministic_and_batch_independent() {
        let classifier = base_classifier();
        let a = user(1, &[0., 60., 90.], 10, 20);
        let b = user(2, &[0., 5.], 1000, 2);

        let pair = classifier.classify(&[a.clone(), b], None).unwrap();
        let single = classifier.classify(&[a], None).unwrap();

        assert_eq!(pair, classifier.classify(&[user(1, &[0., 60., 90.], 10, 20), user(2, &[0., 5.], 1000, 2)], None).unwrap());
        assert!((pair[[0, HUMAN]] - single[[0, HUMAN]]).abs() < 1e-6);
    }

    #[test]
    fn topical_classifier_needs_topics() {
        let classifier = BotClassifier::initialize(config(FeatureSet::Topical), Box::new(CountingExtractor { dim: 4 }),
                                                   Some(TopicalSignal::keyword()), 3).unwrap();
        let users = vec![user(1, &[0., 10.], 1, 1), user(2, &[0.], 2, 2)];

        match classifier.classify(&users, None) {
            Err(ClassifierError::MissingAuxiliaryInput(_)) => {}
            other => panic!("unexpected result {:?}", other.map(|p| p.dim())),
        }

        let topics = TopicSet::new(&["vote"]);
        assert_probabilities(&classifier.classify(&users, Some(&topics)).unwrap(), 2);
    }

    #[test]
    fn base_classifier_ignores_topics() {
        let classifier = base_classifier();
        let users = vec![user(1, &[0., 10.], 1, 1)];
        let topics = TopicSet::new(&["vote"]);

        assert_eq!(classifier.classify(&users, None).unwrap(), classifier.classify(&users, Some(&topics)).unwrap());
    }

    #[test]
    fn construction_rejects_mismatched_constants() {
        let checkpoint = Checkpoint::initialize(config(FeatureSet::Base), 0).unwrap();
        let topical_normalizer = Normalizer::for_feature_set(FeatureSet::Topical);

        let result = BotClassifier::new(config(FeatureSet::Base), Box::new(CountingExtractor { dim: 4 }),
                                        checkpoint.combiner, checkpoint.head, topical_normalizer, None);
        match result {
            Err(ClassifierError::ShapeMismatch { expected, actual, .. }) => assert_eq!((3, 4), (expected, actual)),
            other => panic!("unexpected result {:?}", other.map(|c| c.config().clone())),
        }
    }

    #[test]
    fn construction_checks_topical_services() {
        let missing = BotClassifier::initialize(config(FeatureSet::Topical), Box::new(CountingExtractor { dim: 4 }), None, 0);
        assert!(matches!(missing, Err(ClassifierError::MissingAuxiliaryInput(_))));

        let extra = BotClassifier::initialize(config(FeatureSet::Base), Box::new(CountingExtractor { dim: 4 }), Some(TopicalSignal::keyword()), 0);
        assert!(matches!(extra, Err(ClassifierError::InvalidConfig(_))));
    }

    #[test]
    fn construction_checks_extractor_width() {
        let result = BotClassifier::initialize(config(FeatureSet::Base), Box::new(CountingExtractor { dim: 5 }), None, 0);
        assert!(matches!(result, Err(ClassifierError::ShapeMismatch { .. })));
    }

    #[test]
    fn extractor_output_shape_is_checked() {
        let classifier = BotClassifier::initialize(config(FeatureSet::Base), Box::new(BrokenExtractor), None, 0).unwrap();
        assert!(matches!(classifier.classify(&[user(1, &[0.], 0, 0)], None), Err(ClassifierError::ShapeMismatch { .. })));
    }

    #[test]
    fn empty_history_fails_whole_batch() {
        let classifier = base_classifier();
        let users = vec![user(1, &[0., 10.], 1, 1), user(2, &[], 1, 1)];

        assert!(matches!(classifier.classify(&users, None), Err(ClassifierError::EmptyHistory { user: 1 })));
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(base_classifier().classify(&[], None), Err(ClassifierError::InvalidBatch(_))));
    }

    #[test]
    fn training_mode_needs_two_users() {
        let mut classifier = base_classifier();
        assert!(classifier.classify_train(&[user(1, &[0., 10.], 1, 1)], None).is_err());

        let users = vec![user(1, &[0., 10.], 1, 1), user(2, &[0., 20., 25.], 5, 3), user(3, &[0.], 0, 0)];
        let before = classifier.classify(&users, None).unwrap();
        assert_probabilities(&classifier.classify_train(&users, None).unwrap(), 3);
        assert_ne!(before, classifier.classify(&users, None).unwrap());
    }

    #[test]
    fn classifier_from_checkpoint() {
        let mut embeddings = WordEmbeddings::new(2);
        embeddings.insert("vote", vec![1., -1.]).unwrap();
        embeddings.insert("me", vec![0.5, 0.5]).unwrap();

        let checkpoint = Checkpoint::initialize(config(FeatureSet::Topical), 8).unwrap();
        let mut buffer = Vec::new();
        checkpoint.save(&mut buffer).unwrap();

        let classifier = BotClassifier::from_checkpoint(Checkpoint::load(&buffer[..]).unwrap(), embeddings.clone(), Some(TopicalSignal::keyword())).unwrap();
        let users = vec![user(1, &[0., 600., 1200.], 100, 50), user(2, &[0.], 0, 0)];
        let topics = TopicSet::new(&["vote"]);

        let probs = classifier.classify(&users, Some(&topics)).unwrap();
        assert_probabilities(&probs, 2);

        let reloaded = BotClassifier::from_checkpoint(checkpoint, embeddings, Some(TopicalSignal::keyword())).unwrap();
        assert_eq!(probs, reloaded.classify(&users, Some(&topics)).unwrap());
    }

    #[test]
    fn checkpoint_backbone_must_match_config() {
        let mut checkpoint = Checkpoint::initialize(config(FeatureSet::Base), 8).unwrap();
        checkpoint.config.backbone = crate::model::BackboneKind::TemporalConv;

        let result = BotClassifier::from_checkpoint(checkpoint, WordEmbeddings::new(2), None);
        assert!(matches!(result, Err(ClassifierError::InvalidConfig(_))));
    }
}
