use crate::error::{ClassifierError, Result};
use crate::shared_interface::Tweet;

/// Absolute time gaps (seconds) between consecutive tweets, in posting order.
pub fn tweet_diffs(tweets: &[Tweet]) -> Vec<f64> {
    tweets.windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).abs())
        .collect()
}

/// Average gap between consecutive tweets.
///
/// A single tweet has no gap and yields `0.0`. Without any tweet there is nothing to
/// average and `None` is returned, callers turn this into `ClassifierError::EmptyHistory`.
pub fn avg_tweet_diff(tweets: &[Tweet]) -> Option<f64> {
    match tweets.len() {
        0 => None,
        1 => Some(0.),
        n => Some(tweet_diffs(tweets).iter().sum::<f64>() / (n - 1) as f64),
    }
}

/// Per-tweet weighting that biases the topical signal toward recent activity.
pub trait IntensityIndex: Send + Sync {
    /// `tweet_diffs[u]` holds the consecutive gaps of user `u`, who has `tweet_counts[u]` tweets.
    /// Returns one weight per tweet, aligned with the user's tweet list.
    fn intensity(&self, tweet_diffs: &[Vec<f64>], tweet_counts: &[usize]) -> Result<Vec<Vec<f32>>>;
}

/// Weight of tweet `i` is `1 / (1 + e_i / g)`, with `e_i` the time from that tweet to the user's
/// latest tweet and `g` the user's mean gap. Weights are scaled to sum to one per user.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecencyIntensity;

impl IntensityIndex for RecencyIntensity {
    fn intensity(&self, tweet_diffs: &[Vec<f64>], tweet_counts: &[usize]) -> Result<Vec<Vec<f32>>> {
        if tweet_diffs.len() != tweet_counts.len() {
            return Err(ClassifierError::ShapeMismatch {
                stage: "intensity index batch",
                expected: tweet_counts.len(),
                actual: tweet_diffs.len(),
            });
        }

        tweet_diffs.iter()
            .zip(tweet_counts.iter())
            .map(|(diffs, &count)| {
                if diffs.len() != count.saturating_sub(1) {
                    return Err(ClassifierError::ShapeMismatch {
                        stage: "intensity index gaps",
                        expected: count.saturating_sub(1),
                        actual: diffs.len(),
                    });
                }
                Ok(recency_weights(diffs, count))
            })
            .collect()
    }
}

fn recency_weights(diffs: &[f64], count: usize) -> Vec<f32> {
    if count == 0 { return Vec::new(); }

    let mean_gap = if diffs.is_empty() { 0. } else { diffs.iter().sum::<f64>() / diffs.len() as f64 };

    // Walk back from the latest tweet, accumulating elapsed time
    let mut raw = vec![1.; count];
    if mean_gap > 0. {
        let mut elapsed = 0.;
        for i in (0..count - 1).rev() {
            elapsed += diffs[i];
            raw[i] = 1. / (1. + elapsed / mean_gap);
        }
    }

    let total: f64 = raw.iter().sum();
    raw.iter().map(|w| (w / total) as f32).collect()
}
