//! BM25+ lexical ranking over a store's corpus.
//!
//! ```text
//! idf(t)      = ln((N + 1) / df(t))
//! score(d, q) = Σ_{t ∈ q} idf(t) · (δ + tf·(k1 + 1) / (tf + k1·(1 − b + b·|d|/avgdl)))
//! ```
//!
//! Terms absent from the corpus contribute nothing. The index is built once,
//! when the ranker is constructed; it does not see later store mutations.
//! Equal scores keep corpus order.

use std::collections::HashMap;

use crate::models::Chunk;
use crate::store::{tokenize, ReferenceStore};

#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub delta: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            delta: 1.0,
        }
    }
}

/// A ranked position in the corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub index: usize,
    pub score: f64,
}

pub struct Bm25Ranker {
    params: Bm25Params,
    chunks: Vec<Chunk>,
    reference_ids: Vec<String>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    avgdl: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Ranker {
    pub fn new(store: &ReferenceStore) -> Self {
        Self::with_params(store, Bm25Params::default())
    }

    pub fn with_params(store: &ReferenceStore, params: Bm25Params) -> Self {
        let corpus = store.corpus();

        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_lens = Vec::with_capacity(corpus.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for tokens in &corpus.tokenized {
            let mut tf: HashMap<String, usize> = HashMap::new();
            for t in tokens {
                *tf.entry(t.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len());
            term_freqs.push(tf);
        }

        let n = corpus.len() as f64;
        let total: usize = doc_lens.iter().sum();
        let avgdl = if total == 0 {
            1.0
        } else {
            total as f64 / n
        };
        let idf = doc_freq
            .into_iter()
            .map(|(term, df)| (term, ((n + 1.0) / df as f64).ln()))
            .collect();

        Self {
            params,
            chunks: corpus.chunks.clone(),
            reference_ids: corpus.reference_ids.clone(),
            term_freqs,
            doc_lens,
            avgdl,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Score of every chunk for `query`, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let Bm25Params { k1, b, delta } = self.params;
        let terms = tokenize(query);
        let mut scores = vec![0.0; self.chunks.len()];

        for term in &terms {
            let Some(&idf) = self.idf.get(term) else {
                continue;
            };
            for (i, score) in scores.iter_mut().enumerate() {
                let tf = self.term_freqs[i].get(term).copied().unwrap_or(0) as f64;
                let norm = k1 * (1.0 - b + b * self.doc_lens[i] as f64 / self.avgdl);
                *score += idf * (delta + tf * (k1 + 1.0) / (tf + norm));
            }
        }
        scores
    }

    /// Up to `limit` best hits, highest score first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .map(|(index, score)| Hit { index, score })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
        hits.truncate(limit);
        hits
    }

    pub fn top_n(&self, query: &str, limit: usize) -> Vec<Chunk> {
        self.search(query, limit)
            .into_iter()
            .map(|h| self.chunks[h.index].clone())
            .collect()
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn reference_id(&self, index: usize) -> Option<&str> {
        self.reference_ids.get(index).map(String::as_str)
    }
}
