use std::collections::BTreeSet;
use regex::Regex;
use crate::analysis::analyzer::Analyzer;
use crate::core::config::QueryConfig;
use crate::core::error::{Error, Result};
use crate::index::inverted::FieldAnalyzers;
use crate::mvcc::controller::Snapshot;
use crate::query::ast::{BoolQuery, FuzzyQuery, PhraseQuery, PrefixQuery, Query, RangeQuery, TermQuery, WildcardQuery};
use crate::schema::schema::{FieldDefinition, FieldType, Schema};
use crate::search::fuzzy::FuzzyAutomaton;

/// Logical execution plan over analyzed tokens
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Term { field: String, token: String },
    /// Tokens with their positions relative to the first one
    Phrase { field: String, terms: Vec<(String, u32)>, slop: u32 },
    Bool { must: Vec<LogicalPlan>, should: Vec<LogicalPlan>, must_not: Vec<LogicalPlan> },
    Range(RangeQuery),
    MatchAll,
    /// Matches nothing
    Empty,
}

/// Query planner creates execution plans
/// Term text goes through the target field's analyzer; multi-term queries are
/// expanded against the term dictionaries of the snapshot's segments
pub struct QueryPlanner<'a> {
    pub schema: &'a Schema,
    pub analyzers: &'a FieldAnalyzers,
    pub config: &'a QueryConfig,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(schema: &'a Schema, analyzers: &'a FieldAnalyzers, config: &'a QueryConfig) -> Self {
        QueryPlanner { schema, analyzers, config }
    }

    /// Create execution plan from query
    pub fn plan(&self, query: &Query, snapshot: &Snapshot) -> Result<LogicalPlan> {
        Ok(self.lower(query, snapshot)?.unwrap_or(LogicalPlan::Empty))
    }

    /// `None` when the clause analyzed away entirely (stopwords only)
    fn lower(&self, query: &Query, snapshot: &Snapshot) -> Result<Option<LogicalPlan>> {
        match query {
            Query::MatchAll => Ok(Some(LogicalPlan::MatchAll)),
            Query::Term(q) => self.lower_term(q),
            Query::Phrase(q) => self.lower_phrase(q),
            Query::Bool(q) => self.lower_bool(q, snapshot),
            Query::Range(q) => {
                self.numeric_field(&q.field)?;
                Ok(Some(LogicalPlan::Range(q.clone())))
            }
            Query::Prefix(q) => self.lower_prefix(q, snapshot),
            Query::Wildcard(q) => self.lower_wildcard(q, snapshot),
            Query::Fuzzy(q) => self.lower_fuzzy(q, snapshot),
        }
    }

    fn lower_bool(&self, query: &BoolQuery, snapshot: &Snapshot) -> Result<Option<LogicalPlan>> {
        let mut must = Vec::new();
        for clause in &query.must {
            match self.lower(clause, snapshot)? {
                None => {}
                Some(LogicalPlan::Empty) => return Ok(Some(LogicalPlan::Empty)),
                Some(plan) => must.push(plan),
            }
        }

        let mut should = Vec::new();
        let mut had_should = false;
        for clause in &query.should {
            if let Some(plan) = self.lower(clause, snapshot)? {
                had_should = true;
                if plan != LogicalPlan::Empty {
                    should.push(plan);
                }
            }
        }

        let mut must_not = Vec::new();
        for clause in &query.must_not {
            match self.lower(clause, snapshot)? {
                None | Some(LogicalPlan::Empty) => {}
                Some(plan) => must_not.push(plan),
            }
        }

        if must.is_empty() && should.is_empty() {
            if had_should {
                return Ok(Some(LogicalPlan::Empty));
            }
            if must_not.is_empty() {
                return Ok(None);
            }
            must.push(LogicalPlan::MatchAll);
        }

        if must_not.is_empty() {
            if must.len() == 1 && should.is_empty() {
                return Ok(must.pop());
            }
            if must.is_empty() && should.len() == 1 {
                return Ok(should.pop());
            }
        }

        Ok(Some(LogicalPlan::Bool { must, should, must_not }))
    }

    fn lower_term(&self, query: &TermQuery) -> Result<Option<LogicalPlan>> {
        if let Some(name) = &query.field {
            let field = self.field(name)?;
            if field.field_type == FieldType::Numeric {
                let value: f64 = query.value.trim().parse()
                    .map_err(|_| Error::invalid_argument(format!("'{}' is not a number for field {}", query.value, name)))?;
                return Ok(Some(LogicalPlan::Range(RangeQuery {
                    field: name.clone(),
                    lower: Some(value),
                    upper: Some(value),
                    include_lower: true,
                    include_upper: true,
                })));
            }
            return Ok(self.analyze_into(field, &query.value, 0));
        }

        let per_field = self.schema.indexed_fields()
            .filter_map(|field| self.analyze_into(field, &query.value, 0))
            .collect();
        Ok(disjunction(per_field))
    }

    fn lower_phrase(&self, query: &PhraseQuery) -> Result<Option<LogicalPlan>> {
        if let Some(name) = &query.field {
            let field = self.field(name)?;
            if field.field_type == FieldType::Numeric {
                return Err(Error::invalid_argument(format!("phrase query on numeric field {}", name)));
            }
            return Ok(self.analyze_into(field, &query.text, query.slop));
        }

        let per_field = self.schema.indexed_fields()
            .filter_map(|field| self.analyze_into(field, &query.text, query.slop))
            .collect();
        Ok(disjunction(per_field))
    }

    /// Term for one token, phrase for several, nothing for none
    fn analyze_into(&self, field: &FieldDefinition, text: &str, slop: u32) -> Option<LogicalPlan> {
        let analyzer = self.analyzer(field)?;
        let tokens: Vec<_> = analyzer.analyze(text).collect();

        match tokens.len() {
            0 => None,
            1 => Some(LogicalPlan::Term { field: field.name.clone(), token: tokens[0].text.clone() }),
            _ => {
                let base = tokens[0].position;
                Some(LogicalPlan::Phrase {
                    field: field.name.clone(),
                    terms: tokens.into_iter().map(|t| (t.text, t.position - base)).collect(),
                    slop,
                })
            }
        }
    }

    fn lower_prefix(&self, query: &PrefixQuery, snapshot: &Snapshot) -> Result<Option<LogicalPlan>> {
        let limit = self.config.max_expansions;
        self.expand(query.field.as_deref(), snapshot, |field, snapshot| {
            let prefix = self.normalize(field, &query.prefix);
            let mut terms = BTreeSet::new();
            for view in &snapshot.segments {
                for (token, _) in view.reader.dictionary().prefix(&field.name, &prefix, limit) {
                    terms.insert(token);
                }
            }
            Ok(terms)
        })
    }

    fn lower_wildcard(&self, query: &WildcardQuery, snapshot: &Snapshot) -> Result<Option<LogicalPlan>> {
        let limit = self.config.max_expansions;
        self.expand(query.field.as_deref(), snapshot, |field, snapshot| {
            let pattern = self.normalize(field, &query.pattern);
            let (regex, literal_prefix) = wildcard_regex(&pattern)?;
            let mut terms = BTreeSet::new();
            for view in &snapshot.segments {
                for (token, _) in view.reader.dictionary().regex(&field.name, &regex, &literal_prefix, limit) {
                    terms.insert(token);
                }
            }
            Ok(terms)
        })
    }

    fn lower_fuzzy(&self, query: &FuzzyQuery, snapshot: &Snapshot) -> Result<Option<LogicalPlan>> {
        let limit = self.config.max_expansions;
        let max_edits = query.max_edits.min(2);
        self.expand(query.field.as_deref(), snapshot, |field, snapshot| {
            let automaton = FuzzyAutomaton::new(&self.normalize(field, &query.term), max_edits);
            let mut terms = BTreeSet::new();
            for view in &snapshot.segments {
                for (token, _) in view.reader.dictionary().fuzzy(&field.name, &automaton, limit) {
                    terms.insert(token);
                }
            }
            Ok(terms)
        })
    }

    /// Disjunction of the dictionary terms `collect` finds per field, capped at `max_expansions`
    fn expand<F>(&self, field: Option<&str>, snapshot: &Snapshot, collect: F) -> Result<Option<LogicalPlan>>
    where
        F: Fn(&FieldDefinition, &Snapshot) -> Result<BTreeSet<String>>,
    {
        let fields: Vec<&FieldDefinition> = match field {
            Some(name) => {
                let field = self.field(name)?;
                if field.field_type == FieldType::Numeric {
                    return Err(Error::invalid_argument(format!("term expansion on numeric field {}", name)));
                }
                vec![field]
            }
            None => self.schema.indexed_fields().collect(),
        };

        let mut per_field = Vec::new();
        for field in fields {
            let terms = collect(field, snapshot)?;
            let expanded: Vec<LogicalPlan> = terms.into_iter()
                .take(self.config.max_expansions)
                .map(|token| LogicalPlan::Term { field: field.name.clone(), token })
                .collect();
            per_field.extend(expanded);
        }

        Ok(Some(disjunction(per_field).unwrap_or(LogicalPlan::Empty)))
    }

    /// Lowercase the raw pattern when the field's analyzer would
    fn normalize(&self, field: &FieldDefinition, text: &str) -> String {
        if field.field_type == FieldType::Text && field.analyzer.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        }
    }

    fn analyzer(&self, field: &FieldDefinition) -> Option<&Analyzer> {
        self.analyzers.get(&field.name)
    }

    fn field(&self, name: &str) -> Result<&'a FieldDefinition> {
        let field = self.schema.field(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown field {}", name)))?;
        if field.field_type == FieldType::StoredOnly {
            return Err(Error::invalid_argument(format!("field {} is not searchable", name)));
        }
        Ok(field)
    }

    fn numeric_field(&self, name: &str) -> Result<&'a FieldDefinition> {
        let field = self.field(name)?;
        if field.field_type != FieldType::Numeric {
            return Err(Error::invalid_argument(format!("range query on non-numeric field {}", name)));
        }
        Ok(field)
    }
}

fn disjunction(mut plans: Vec<LogicalPlan>) -> Option<LogicalPlan> {
    match plans.len() {
        0 => None,
        1 => plans.pop(),
        _ => Some(LogicalPlan::Bool { must: Vec::new(), should: plans, must_not: Vec::new() }),
    }
}

/// Anchored regex for a `*`/`?` pattern plus the literal text before the first wildcard
fn wildcard_regex(pattern: &str) -> Result<(Regex, String)> {
    let mut expression = String::from("^");
    let mut literal_prefix = String::new();
    let mut in_prefix = true;

    for c in pattern.chars() {
        match c {
            '*' => {
                expression.push_str(".*");
                in_prefix = false;
            }
            '?' => {
                expression.push('.');
                in_prefix = false;
            }
            c => {
                if in_prefix {
                    literal_prefix.push(c);
                }
                let mut buf = [0u8; 4];
                expression.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
    }
    expression.push('$');

    let regex = Regex::new(&expression)
        .map_err(|e| Error::invalid_argument(format!("invalid wildcard pattern {}: {}", pattern, e)))?;
    Ok((regex, literal_prefix))
}
