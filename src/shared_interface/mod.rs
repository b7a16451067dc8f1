use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mention {
    pub screen_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UrlEntity {
    pub url: String,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Entities {
    #[serde(default)]
    pub user_mentions: Vec<Mention>,
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
    #[serde(default)]
    pub media: Vec<UrlEntity>,
}

/// One post. `timestamp` is in seconds since the epoch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tweet {
    pub text: String,
    pub timestamp: f64,
    #[serde(default)]
    pub entities: Entities,
}

impl Tweet {
    pub fn new(text: &str, timestamp: f64) -> Self {
        Tweet { text: text.to_owned(), timestamp, entities: Entities::default() }
    }

    /// Url and media entities, in that order.
    pub fn url_entities(&self) -> impl Iterator<Item=&UrlEntity> {
        self.entities.urls.iter().chain(self.entities.media.iter())
    }
}

/// One account under evaluation. Tweets are kept in posting order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    pub tweets: Vec<Tweet>,
    pub followers_count: u64,
    pub friends_count: u64,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "User<id={}, tweets={}, followers={}, friends={}>",
               self.id, self.tweets.len(), self.followers_count, self.friends_count)
    }
}

/// Borrow the tweet history of every user in the batch.
pub fn tweet_lists(users: &[User]) -> Vec<&[Tweet]> {
    users.iter().map(|user| user.tweets.as_slice()).collect()
}

pub fn tweet_counts(users: &[User]) -> Vec<usize> {
    users.iter().map(|user| user.tweets.len()).collect()
}
