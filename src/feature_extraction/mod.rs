use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use crate::feature_extraction::feature_vector::HandcraftedFeatureVector;
pub use crate::feature_extraction::normalize::Normalizer;
pub use crate::feature_extraction::similarity::{KeywordTopicSimilarity, TopicSet, TopicSimilarity};
pub use crate::feature_extraction::timing::{avg_tweet_diff, IntensityIndex, RecencyIntensity, tweet_diffs};
use crate::error::{ClassifierError, expect_width, Result};
use crate::shared_interface::{tweet_counts, tweet_lists, User};

mod feature_vector;
mod normalize;
mod similarity;
mod timing;

/// Which handcrafted signals make up a feature row, fixed at model construction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    /// `[avg gap, followers, friends]`
    Base,
    /// `[avg gap, topic similarity, followers, friends]`
    Topical,
}

impl FeatureSet {
    pub fn width(self) -> usize {
        self.column_names().len()
    }

    pub fn column_names(self) -> &'static [&'static str] {
        match self {
            FeatureSet::Base => &["avg_tweet_gap", "followers_count", "friends_count"],
            FeatureSet::Topical => &["avg_tweet_gap", "topic_similarity", "followers_count", "friends_count"],
        }
    }
}

/// Inputs of the optional topical signal, borrowed for one assembly call.
pub enum Signals<'a> {
    Base,
    Topical {
        topics: &'a TopicSet,
        similarity: &'a dyn TopicSimilarity,
        intensity: &'a dyn IntensityIndex,
    },
}

impl Signals<'_> {
    pub fn feature_set(&self) -> FeatureSet {
        match self {
            Signals::Base => FeatureSet::Base,
            Signals::Topical { .. } => FeatureSet::Topical,
        }
    }
}

/// Compute the raw handcrafted features of every user, in batch order.
/// Fails with `EmptyHistory` for the first user without tweets.
pub fn extract_feature_vectors(users: &[User], signals: &Signals) -> Result<Vec<HandcraftedFeatureVector>> {
    let gaps = users.par_iter()
        .enumerate()
        .map(|(idx, user)| match avg_tweet_diff(&user.tweets) {
            Some(gap) => Ok(gap as f32),
            None => Err(ClassifierError::EmptyHistory { user: idx }),
        })
        .collect::<Result<Vec<f32>>>()?;

    let similarities = match signals {
        Signals::Base => None,
        Signals::Topical { topics, similarity, intensity } => {
            let lists = tweet_lists(users);
            let diffs = lists.iter().map(|tweets| tweet_diffs(tweets)).collect::<Vec<_>>();
            let weights = intensity.intensity(&diffs, &tweet_counts(users))?;

            let scores = similarity.similarity(&lists, topics, &weights)?;
            expect_width("topic similarity scores", users.len(), scores.len())?;
            Some(scores)
        }
    };

    Ok(users.iter()
        .enumerate()
        .map(|(idx, user)| HandcraftedFeatureVector {
            user_id: user.id,
            avg_tweet_gap: gaps[idx],
            topic_similarity: similarities.as_ref().map(|scores| scores[idx]),
            followers_count: user.followers_count as f32,
            friends_count: user.friends_count as f32,
        })
        .collect())
}

/// Handcrafted feature matrix: one row per user, columns as given by `signals.feature_set()`.
pub fn assemble(users: &[User], signals: &Signals) -> Result<Array2<f32>> {
    let feature_set = signals.feature_set();
    let vectors = extract_feature_vectors(users, signals)?;

    let mut features = Array2::<f32>::zeros((vectors.len(), feature_set.width()));
    for (mut row, vector) in features.rows_mut().into_iter().zip(vectors.iter()) {
        for (cell, value) in row.iter_mut().zip(vector.to_row(feature_set)?) {
            *cell = value;
        }
    }

    debug!(users = users.len(), width = feature_set.width(), "Assembled handcrafted features");
    Ok(features)
}
