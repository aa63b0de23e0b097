//! Unigram + bigram TF-IDF with smoothed idf and l2-normalised rows.

use std::collections::HashMap;

use super::text::tokens;

/// Sparse row: (feature index, weight), sorted by index.
pub type SparseVec = Vec<(usize, f64)>;

#[derive(Debug, Clone, Default)]
pub struct TfIdf {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

fn ngrams(text: &str) -> Vec<String> {
    let toks = tokens(text);
    let mut out: Vec<String> = toks.clone();
    out.extend(toks.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    out
}

impl TfIdf {
    /// Learns vocabulary and `idf = ln((1 + n) / (1 + df)) + 1`.
    pub fn fit(docs: &[String]) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut df: Vec<usize> = Vec::new();
        for doc in docs {
            let mut terms = ngrams(doc);
            terms.sort();
            terms.dedup();
            for term in terms {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(term).or_insert(next);
                if idx == df.len() {
                    df.push(0);
                }
                df[idx] += 1;
            }
        }
        let n = docs.len() as f64;
        let idf = df.iter().map(|d| ((1.0 + n) / (1.0 + *d as f64)).ln() + 1.0).collect();
        Self { vocabulary, idf }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Raw term counts times idf, l2-normalised. Unknown terms are ignored.
    pub fn transform(&self, doc: &str) -> SparseVec {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in ngrams(doc) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut row: SparseVec = counts.into_iter().map(|(i, c)| (i, c * self.idf[i])).collect();
        row.sort_by_key(|(i, _)| *i);
        let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in row.iter_mut() {
                *w /= norm;
            }
        }
        row
    }

    pub fn fit_transform(docs: &[String]) -> (Self, Vec<SparseVec>) {
        let model = Self::fit(docs);
        let rows = docs.iter().map(|d| model.transform(d)).collect();
        (model, rows)
    }
}

/// Dot product of two sorted sparse rows; cosine when both are l2-normalised.
pub fn cosine(a: &SparseVec, b: &SparseVec) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}
