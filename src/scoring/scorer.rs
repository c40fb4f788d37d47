use crate::core::config::Bm25Params;

/// Scorer trait
pub trait Scorer: Send + Sync {
    /// Inverse document frequency of a term matching `doc_freq` of `total_docs` live documents
    fn idf(&self, total_docs: u64, doc_freq: u64) -> f32;

    fn score(&self, term_freq: f32, idf: f32, doc_stats: &DocStats) -> f32;

    fn name(&self) -> &str;
}

/// Per-document inputs for scoring one field
#[derive(Debug, Clone, Copy)]
pub struct DocStats {
    pub doc_length: u32,      // Number of indexed tokens in the field
    pub avg_doc_length: f32,  // Average field length over live documents
}

/// BM25 Scorer
#[derive(Debug, Clone, Copy)]
pub struct BM25Scorer {
    pub k1: f32,  // Term frequency saturation (default: 1.2)
    pub b: f32,   // Length normalization strength (default: 0.75)
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer::from_params(&Bm25Params::default())
    }
}

impl BM25Scorer {
    pub fn from_params(params: &Bm25Params) -> Self {
        BM25Scorer { k1: params.k1, b: params.b }
    }
}

impl Scorer for BM25Scorer {
    fn idf(&self, total_docs: u64, doc_freq: u64) -> f32 {
        let n = total_docs as f64;
        let df = doc_freq.min(total_docs) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln() as f32
    }

    fn score(&self, term_freq: f32, idf: f32, doc_stats: &DocStats) -> f32 {
        if term_freq <= 0.0 {
            return 0.0;
        }

        // An empty collection average would divide by zero; treat the doc as average length
        let length_ratio = if doc_stats.avg_doc_length > 0.0 {
            doc_stats.doc_length as f32 / doc_stats.avg_doc_length
        } else {
            1.0
        };

        let numerator = idf * term_freq * (self.k1 + 1.0);
        let denominator = term_freq + self.k1 * (1.0 - self.b + self.b * length_ratio);

        numerator / denominator
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rarer_terms_weigh_more() {
        let scorer = BM25Scorer::default();
        assert!(scorer.idf(100, 1) > scorer.idf(100, 50));
        assert!(scorer.idf(100, 100) > 0.0);
    }

    #[test]
    fn shorter_fields_score_higher() {
        let scorer = BM25Scorer::default();
        let idf = scorer.idf(10, 2);
        let short = scorer.score(1.0, idf, &DocStats { doc_length: 3, avg_doc_length: 6.0 });
        let long = scorer.score(1.0, idf, &DocStats { doc_length: 12, avg_doc_length: 6.0 });
        assert!(short > long);
    }

    #[test]
    fn matches_reference_formula() {
        let scorer = BM25Scorer { k1: 1.2, b: 0.75 };
        let idf = scorer.idf(3, 1);
        assert!((idf - (1.0f32 + 2.5 / 1.5).ln()).abs() < 1e-6);

        let score = scorer.score(2.0, idf, &DocStats { doc_length: 4, avg_doc_length: 4.0 });
        let expected = idf * 2.0 * 2.2 / (2.0 + 1.2);
        assert!((score - expected).abs() < 1e-5);
    }

    #[test]
    fn zero_average_length_is_neutral() {
        let scorer = BM25Scorer::default();
        let a = scorer.score(1.0, 1.0, &DocStats { doc_length: 0, avg_doc_length: 0.0 });
        let b = scorer.score(1.0, 1.0, &DocStats { doc_length: 5, avg_doc_length: 5.0 });
        assert_eq!(a, b);
    }
}
