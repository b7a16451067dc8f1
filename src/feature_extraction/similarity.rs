use std::collections::HashSet;
use std::io::BufRead;

use counter::Counter;

use crate::error::{ClassifierError, Result};
use crate::shared_interface::Tweet;
use crate::text::{tokenize, tweet_tokens};

/// Topics of interest for the topical similarity signal, stored as lower-cased tokens.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TopicSet {
    terms: HashSet<String>,
}

impl TopicSet {
    pub fn new<I, S>(topics: I) -> Self
        where I: IntoIterator<Item=S>, S: AsRef<str>
    {
        let terms = topics.into_iter()
            .flat_map(|topic| tokenize(topic.as_ref(), &[], &[]))
            .map(|token| token.to_lowercase())
            .collect();
        TopicSet { terms }
    }

    /// One topic per line, blank lines are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
        Ok(TopicSet::new(lines.iter().map(|line| line.trim()).filter(|line| !line.is_empty())))
    }

    pub fn contains(&self, token: &str) -> bool {
        self.terms.contains(token)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// External topical similarity scoring: one score per user.
pub trait TopicSimilarity: Send + Sync {
    /// `weights[u]` holds one intensity weight per tweet of `tweet_lists[u]`.
    fn similarity(&self, tweet_lists: &[&[Tweet]], topics: &TopicSet, weights: &[Vec<f32>]) -> Result<Vec<f32>>;
}

/// Intensity-weighted share of tweet tokens that match a topic term.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordTopicSimilarity;

impl KeywordTopicSimilarity {
    pub fn tweet_score(tweet: &Tweet, topics: &TopicSet) -> f32 {
        let counts = tweet_tokens(tweet)
            .into_iter()
            .map(|token| token.to_lowercase())
            .collect::<Counter<String>>();

        let n_total: usize = counts.values().sum();
        if n_total == 0 { return 0.; }

        let n_matching: usize = counts.iter()
            .filter(|(token, _)| topics.contains(token))
            .map(|(_, &count)| count)
            .sum();

        n_matching as f32 / n_total as f32
    }
}

impl TopicSimilarity for KeywordTopicSimilarity {
    fn similarity(&self, tweet_lists: &[&[Tweet]], topics: &TopicSet, weights: &[Vec<f32>]) -> Result<Vec<f32>> {
        if weights.len() != tweet_lists.len() {
            return Err(ClassifierError::ShapeMismatch {
                stage: "topic similarity batch",
                expected: tweet_lists.len(),
                actual: weights.len(),
            });
        }

        tweet_lists.iter()
            .zip(weights.iter())
            .map(|(tweets, user_weights)| {
                if user_weights.len() != tweets.len() {
                    return Err(ClassifierError::ShapeMismatch {
                        stage: "topic similarity weights",
                        expected: tweets.len(),
                        actual: user_weights.len(),
                    });
                }
                if topics.is_empty() { return Ok(0.); }

                Ok(tweets.iter()
                    .zip(user_weights.iter())
                    .map(|(tweet, weight)| weight * Self::tweet_score(tweet, topics))
                    .sum::<f32>())
            })
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use crate::feature_extraction::similarity::{KeywordTopicSimilarity, TopicSet, TopicSimilarity};
    use crate::shared_interface::Tweet;

    #[test]
    fn topics_are_tokenized_and_lowercased() {
        let topics = TopicSet::from_reader(&b"Climate Change\n\nElections\n"[..]).unwrap();

        assert_eq!(3, topics.len());
        assert!(topics.contains("climate"));
        assert!(topics.contains("change"));
        assert!(topics.contains("elections"));
    }

    #[test]
    fn tweet_score_is_matching_share() {
        let topics = TopicSet::new(&["climate"]);
        let tweet = Tweet::new("Climate talks about the CLIMATE", 0.);

        assert!((KeywordTopicSimilarity::tweet_score(&tweet, &topics) - 0.4).abs() < 1e-6);
        assert_eq!(0., KeywordTopicSimilarity::tweet_score(&Tweet::new("!!!", 0.), &topics));
    }

    #[test]
    fn weighted_user_scores() {
        let topics = TopicSet::new(&["vote"]);
        let user_a = vec![Tweet::new("vote", 0.), Tweet::new("lunch", 10.)];
        let user_b: Vec<Tweet> = vec![];
        let lists = vec![user_a.as_slice(), user_b.as_slice()];

        let scores = KeywordTopicSimilarity.similarity(&lists, &topics, &[vec![0.25, 0.75], vec![]]).unwrap();

        assert_eq!(2, scores.len());
        assert!((scores[0] - 0.25).abs() < 1e-6);
        assert_eq!(0., scores[1]);
    }

    #[test]
    fn misaligned_weights() {
        let topics = TopicSet::new(&["vote"]);
        let tweets = vec![Tweet::new("vote", 0.)];

        assert!(KeywordTopicSimilarity.similarity(&[tweets.as_slice()], &topics, &[vec![]]).is_err());
        assert!(KeywordTopicSimilarity.similarity(&[tweets.as_slice()], &topics, &[]).is_err());
    }

    #[test]
    fn empty_topic_set_scores_zero() {
        let tweets = vec![Tweet::new("vote vote", 0.), Tweet::new("vote", 10.)];
        let lists = vec![tweets.as_slice()];
        let topics = TopicSet::new(Vec::<String>::new());

        assert!(topics.is_empty());
        assert_eq!(vec![0f32], KeywordTopicSimilarity.similarity(&lists, &topics, &[vec![0.5, 0.5]]).unwrap());
        assert!(KeywordTopicSimilarity.similarity(&lists, &topics, &[vec![1.]]).is_err());
    }
}
