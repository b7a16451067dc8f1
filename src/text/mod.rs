use regex::Regex;

use crate::shared_interface::{Mention, Tweet, UrlEntity};

pub mod embedding;

pub use embedding::WordEmbeddings;

lazy_static! {
    // A lone '@' surrounded by whitespace (or the literal '^' / '$' markers)
    static ref LONE_AT: Regex = Regex::new(r"([\s^])@([\s$])").unwrap();
    static ref SPECIAL_CHARS: Regex = Regex::new(r"[^\w@$]").unwrap();
}

const MENTION_TOKEN: &str = "@";
const URL_TOKEN: &str = "$";

/// Split tweet text into word tokens.
/// Mentions are replaced by `@`, urls by `$` and any other special character is dropped.
pub fn tokenize<'a, U>(text: &str, mentions: &[Mention], urls: U) -> Vec<String>
    where U: IntoIterator<Item=&'a UrlEntity>
{
    let mut string = text.to_owned();
    // Neighbouring lone '@'s share their whitespace, so rewrite until stable
    loop {
        let replaced = LONE_AT.replace_all(&string, "${1}at${2}").into_owned();
        if replaced == string { break; }
        string = replaced;
    }

    for mention in mentions {
        string = string.replace(&format!("@{}", mention.screen_name), MENTION_TOKEN);
    }

    // '$' is reserved for urls
    string = string.replace('$', " ");

    for url in urls {
        if !url.url.is_empty() {
            string = string.replace(&url.url, URL_TOKEN);
        }
    }

    let string = SPECIAL_CHARS.replace_all(&string, " ");

    let mut tokens = Vec::new();
    for word in string.split_whitespace() {
        split_markers(word, &mut tokens);
    }
    tokens
}

/// Tokens of a tweet, using its own mention and url entities.
pub fn tweet_tokens(tweet: &Tweet) -> Vec<String> {
    tokenize(&tweet.text, &tweet.entities.user_mentions, tweet.url_entities())
}

// '@' and '$' always stand alone
fn split_markers(word: &str, tokens: &mut Vec<String>) {
    let mut start = 0;
    for (idx, ch) in word.char_indices() {
        if ch == '@' || ch == '$' {
            if idx > start { tokens.push(word[start..idx].to_owned()); }
            tokens.push(ch.to_string());
            start = idx + ch.len_utf8();
        }
    }
    if start < word.len() { tokens.push(word[start..].to_owned()); }
}
