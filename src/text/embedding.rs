use std::collections::HashMap;
use std::io::Read;

use linereader::LineReader;
use ndarray::Array1;
use tracing::info;

use crate::error::{ClassifierError, Result};
use crate::shared_interface::Tweet;
use crate::text::tweet_tokens;

const SPACE: u8 = b' ';

/// Word vector lookup table, as produced by word2vec training.
#[derive(Debug, Clone)]
pub struct WordEmbeddings {
    dim: usize,
    vectors: HashMap<String, Array1<f32>>,
}

impl WordEmbeddings {
    pub fn new(dim: usize) -> Self {
        WordEmbeddings { dim, vectors: HashMap::new() }
    }

    /// Read the word2vec text format: a `<count> <dim>` header followed by one `<word> <values..>` line per word.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = LineReader::new(reader);

        let header = match reader.next_line() {
            Some(line) => trim_line(line?).to_owned(),
            None => return Err(embedding_error(1, "missing header")),
        };
        let (count, dim) = parse_header(&header)?;

        let mut embeddings = WordEmbeddings::new(dim);
        embeddings.vectors.reserve(count);

        let mut line_no: usize = 1;
        while let Some(line) = reader.next_line() {
            line_no += 1;
            let line = trim_line(line?);
            if line.is_empty() { continue; }

            let mut fields = line.split(|&c| c == SPACE).filter(|field| !field.is_empty());
            let word = match fields.next().map(std::str::from_utf8) {
                Some(Ok(word)) => word.to_owned(),
                _ => return Err(embedding_error(line_no, "invalid word")),
            };

            let mut values = Vec::with_capacity(dim);
            for field in fields {
                match fast_float::parse::<f32, _>(field) {
                    Ok(value) if value.is_finite() => values.push(value),
                    _ => return Err(embedding_error(line_no, "invalid vector component")),
                }
            }
            if values.len() != dim {
                return Err(embedding_error(line_no, &format!("expected {} components, found {}", dim, values.len())));
            }

            embeddings.vectors.insert(word, Array1::from(values));
        }

        if embeddings.len() != count {
            return Err(embedding_error(1, &format!("header announces {} words, found {}", count, embeddings.len())));
        }

        info!(words = count, dim, "Loaded word embeddings");
        Ok(embeddings)
    }

    pub fn insert(&mut self, word: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dim {
            return Err(ClassifierError::ShapeMismatch { stage: "word vector", expected: self.dim, actual: vector.len() });
        }
        self.vectors.insert(word.to_owned(), Array1::from(vector));
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&Array1<f32>> {
        self.vectors.get(word)
    }

    /// Mean of the known token vectors; unknown tokens are skipped and no known token gives the zero vector.
    pub fn mean_vector(&self, tokens: &[String]) -> Array1<f32> {
        let mut sum = Array1::<f32>::zeros(self.dim);
        let mut n_known: usize = 0;

        for vector in tokens.iter().filter_map(|token| self.vectors.get(token)) {
            sum += vector;
            n_known += 1;
        }

        if n_known > 0 { sum /= n_known as f32; }
        sum
    }

    pub fn embed_tweet(&self, tweet: &Tweet) -> Array1<f32> {
        self.mean_vector(&tweet_tokens(tweet))
    }
}

fn parse_header(header: &[u8]) -> Result<(usize, usize)> {
    let fields = header
        .split(|&c| c == SPACE)
        .filter(|field| !field.is_empty())
        .map(|field| std::str::from_utf8(field).ok().and_then(|s| s.parse::<usize>().ok()))
        .collect::<Vec<Option<usize>>>();

    match fields.as_slice() {
        [Some(count), Some(dim)] if *dim > 0 => Ok((*count, *dim)),
        _ => Err(embedding_error(1, "expected header \"<count> <dim>\"")),
    }
}

// Trim \n or \r\n
fn trim_line(line: &[u8]) -> &[u8] {
    let mut line = line;
    if line.last() == Some(&b'\n') { line = &line[..line.len() - 1]; }
    if line.last() == Some(&b'\r') { line = &line[..line.len() - 1]; }
    line
}

fn embedding_error(line: usize, reason: &str) -> ClassifierError {
    ClassifierError::Embedding { line, reason: reason.to_string() }
}
