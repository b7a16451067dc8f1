use serde::Serialize;

use crate::error::{ClassifierError, Result};
use crate::feature_extraction::FeatureSet;

/// Raw (not yet normalized) handcrafted features of one user.
#[prefix_all("hc_")]
#[derive(Default, Debug, Serialize, PartialEq)]
pub struct HandcraftedFeatureVector {
    pub user_id: u64,
    pub avg_tweet_gap: f32,
    pub topic_similarity: Option<f32>,
    pub followers_count: f32,
    pub friends_count: f32,
}

impl HandcraftedFeatureVector {
    /// Values in model column order: gap, (similarity), followers, friends.
    /// The topical layout needs a similarity score.
    pub fn to_row(&self, feature_set: FeatureSet) -> Result<Vec<f32>> {
        match (feature_set, self.topic_similarity) {
            (FeatureSet::Base, _) => Ok(vec![self.avg_tweet_gap, self.followers_count, self.friends_count]),
            (FeatureSet::Topical, Some(similarity)) => {
                Ok(vec![self.avg_tweet_gap, similarity, self.followers_count, self.friends_count])
            }
            (FeatureSet::Topical, None) => Err(ClassifierError::MissingAuxiliaryInput("topic similarity score")),
        }
    }
}
