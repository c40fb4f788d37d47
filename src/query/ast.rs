use serde::{Serialize, Deserialize};

/// Main query enum representing all query types
/// `field: None` means the clause was written without a field prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Term(TermQuery),         // Single term search
    Phrase(PhraseQuery),     // Ordered adjacent positions, optionally sloppy
    Bool(BoolQuery),         // Boolean combinations
    Range(RangeQuery),       // Numeric range
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery), // Pattern matching with * and ?
    Fuzzy(FuzzyQuery),       // Typo tolerance
    MatchAll,                // Match all documents
}

/// Single term query; the value is analyzed with the field's analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseQuery {
    pub field: Option<String>,
    pub text: String,
    pub slop: u32,  // Max positional displacement per term
}

/// Boolean query with must/should/must_not clauses
/// With no `must` clause at least one `should` clause has to match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<Query>,      // All must match (AND)
    pub should: Vec<Query>,    // OR; optional, adds score, when `must` is present
    pub must_not: Vec<Query>,  // None must match (NOT)
}

/// Numeric range; `None` bounds are open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl RangeQuery {
    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower {
            Some(lower) if self.include_lower => value >= lower,
            Some(lower) => value > lower,
            None => true,
        };
        let below = match self.upper {
            Some(upper) if self.include_upper => value <= upper,
            Some(upper) => value < upper,
            None => true,
        };
        above && below
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixQuery {
    pub field: Option<String>,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardQuery {
    pub field: Option<String>,
    pub pattern: String, // Pattern with wildcards (* and ?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyQuery {
    pub field: Option<String>,
    pub term: String,
    pub max_edits: u8,
}

impl BoolQuery {
    pub fn new() -> Self {
        BoolQuery::default()
    }

    pub fn with_must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn with_should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn with_must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }
}

impl Query {
    pub fn term(field: &str, value: &str) -> Self {
        Query::Term(TermQuery { field: Some(field.to_string()), value: value.to_string() })
    }

    pub fn phrase(field: &str, text: &str, slop: u32) -> Self {
        Query::Phrase(PhraseQuery { field: Some(field.to_string()), text: text.to_string(), slop })
    }
}
