use serde::{Serialize, Deserialize};
use crate::core::config::QueryConfig;
use crate::core::error::{Error, Result};
use crate::query::ast::{BoolQuery, FuzzyQuery, PhraseQuery, PrefixQuery, Query, RangeQuery, TermQuery, WildcardQuery};
use crate::query::lexer::{tokenize, LexToken, TokenKind};
use crate::schema::schema::{FieldType, Schema};

/// Operator implied between juxtaposed clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanOperator {
    And,
    Or,
}

/// Query parser for converting string queries to AST
/// Examples:
/// - "rust programming" -> both terms (default operator AND)
/// - "rust OR go" -> either term
/// - "title:rust" -> field query
/// - "\"exact phrase\"~1" -> phrase query with slop
/// - "size:[10 TO 100]" -> numeric range query
/// - "rust~2" -> fuzzy query
/// - "rus*" / "r?st" -> prefix / wildcard query
#[derive(Debug, Clone)]
pub struct QueryParser {
    pub schema: Schema,
    pub default_operator: BooleanOperator,
    pub default_fuzzy_distance: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Default,
    Must,
    MustNot,
}

impl QueryParser {
    pub fn new(schema: Schema, config: &QueryConfig) -> Self {
        QueryParser {
            schema,
            default_operator: config.default_operator,
            default_fuzzy_distance: config.default_fuzzy_distance,
        }
    }

    /// Parse a query string into Query AST; an empty string matches everything
    pub fn parse(&self, input: &str) -> Result<Query> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(Query::MatchAll);
        }

        let mut state = ParseState { tokens: &tokens, pos: 0, input, parser: self };
        let query = state.or_expr(None)?;

        if let Some(token) = state.peek() {
            let message = if token.kind == TokenKind::RParen {
                "unbalanced parenthesis"
            } else {
                "unexpected token"
            };
            return Err(state.error_at(message, token));
        }
        Ok(query)
    }
}

struct ParseState<'a> {
    tokens: &'a [LexToken],
    pos: usize,
    input: &'a str,
    parser: &'a QueryParser,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> Option<&'a LexToken> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<&'a LexToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, message: &str, token: &LexToken) -> Error {
        Error::query_syntax(message, token.fragment.clone(), token.position)
    }

    /// Error pointing at the end of input (after a dangling operator)
    fn error_at_end(&self, message: &str) -> Error {
        let fragment = self.tokens.last().map(|t| t.fragment.clone()).unwrap_or_default();
        Error::query_syntax(message, fragment, self.input.len())
    }

    fn error_here(&self, message: &str) -> Error {
        match self.peek() {
            Some(token) => self.error_at(message, token),
            None => self.error_at_end(message),
        }
    }

    /// Whether the next token can begin a clause
    fn starts_clause(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Word(_) | TokenKind::Phrase(_) | TokenKind::LParen | TokenKind::Not
                | TokenKind::Minus | TokenKind::Plus | TokenKind::LBracket | TokenKind::LBrace)
        )
    }

    fn or_expr(&mut self, field: Option<&str>) -> Result<Query> {
        let mut groups = vec![self.and_expr(field)?];

        loop {
            match self.peek_kind() {
                Some(TokenKind::Or) => {
                    let op = self.next();
                    if !self.starts_clause() {
                        return Err(match self.peek() {
                            Some(t) => self.error_at("dangling operator", t),
                            None => match op {
                                Some(op) => self.error_at("dangling operator", op),
                                None => self.error_at_end("dangling operator"),
                            },
                        });
                    }
                    groups.push(self.and_expr(field)?);
                }
                _ if self.parser.default_operator == BooleanOperator::Or && self.starts_clause() => {
                    groups.push(self.and_expr(field)?);
                }
                _ => break,
            }
        }

        if groups.len() == 1 {
            return Ok(build_group(groups.remove(0)));
        }

        let mut top = BoolQuery::new();
        for mut group in groups {
            if group.len() == 1 {
                let (occur, query) = group.remove(0);
                match occur {
                    Occur::Default => top.should.push(query),
                    Occur::Must => top.must.push(query),
                    Occur::MustNot => top.must_not.push(query),
                }
            } else {
                top.should.push(build_group(group));
            }
        }
        if top.must.is_empty() && top.should.is_empty() {
            top.must.push(Query::MatchAll);
        }
        Ok(Query::Bool(top))
    }

    fn and_expr(&mut self, field: Option<&str>) -> Result<Vec<(Occur, Query)>> {
        let mut items = vec![self.unary(field)?];

        loop {
            match self.peek_kind() {
                Some(TokenKind::And) => {
                    let op = self.next();
                    if !self.starts_clause() {
                        return Err(match (self.peek(), op) {
                            (Some(t), _) => self.error_at("dangling operator", t),
                            (None, Some(op)) => self.error_at("dangling operator", op),
                            (None, None) => self.error_at_end("dangling operator"),
                        });
                    }
                    let (occur, query) = self.unary(field)?;
                    let occur = if occur == Occur::Default { Occur::Must } else { occur };
                    items.push((occur, query));
                }
                _ if self.parser.default_operator == BooleanOperator::And && self.starts_clause() => {
                    let (occur, query) = self.unary(field)?;
                    let occur = if occur == Occur::Default { Occur::Must } else { occur };
                    items.push((occur, query));
                }
                _ => break,
            }
        }

        if items.len() > 1 && items[0].0 == Occur::Default {
            items[0].0 = Occur::Must;
        }
        Ok(items)
    }

    fn unary(&mut self, field: Option<&str>) -> Result<(Occur, Query)> {
        match self.peek_kind() {
            Some(TokenKind::Not) | Some(TokenKind::Minus) => {
                let op = self.next();
                if !self.starts_clause() {
                    return Err(match (self.peek(), op) {
                        (Some(t), _) => self.error_at("dangling operator", t),
                        (None, Some(op)) => self.error_at("dangling operator", op),
                        (None, None) => self.error_at_end("dangling operator"),
                    });
                }
                let (_, query) = self.unary(field)?;
                Ok((Occur::MustNot, query))
            }
            Some(TokenKind::Plus) => {
                let op = self.next();
                if !self.starts_clause() {
                    return Err(match (self.peek(), op) {
                        (Some(t), _) => self.error_at("dangling operator", t),
                        (None, Some(op)) => self.error_at("dangling operator", op),
                        (None, None) => self.error_at_end("dangling operator"),
                    });
                }
                let (occur, query) = self.unary(field)?;
                let occur = if occur == Occur::MustNot { Occur::MustNot } else { Occur::Must };
                Ok((occur, query))
            }
            _ => Ok((Occur::Default, self.primary(field)?)),
        }
    }

    fn primary(&mut self, field: Option<&str>) -> Result<Query> {
        let Some(token) = self.peek() else {
            return Err(self.error_at_end("expected a term"));
        };

        match &token.kind {
            TokenKind::LParen => {
                self.next();
                if self.peek_kind() == Some(&TokenKind::RParen) {
                    return Err(self.error_here("empty group"));
                }
                let inner = self.or_expr(field)?;
                match self.next() {
                    Some(t) if t.kind == TokenKind::RParen => Ok(inner),
                    _ => Err(self.error_at("unbalanced parenthesis", token)),
                }
            }
            TokenKind::Word(name) if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::Colon) => {
                if field.is_some() {
                    return Err(self.error_at("nested field prefix", token));
                }
                let definition = self.parser.schema.field(name)
                    .ok_or_else(|| self.error_at("unknown field", token))?;
                if definition.field_type == FieldType::StoredOnly {
                    return Err(self.error_at("field is not searchable", token));
                }
                self.next();
                self.next();

                if !self.starts_clause() || matches!(self.peek_kind(), Some(TokenKind::Not | TokenKind::Minus | TokenKind::Plus)) {
                    return Err(self.error_here("empty field value"));
                }
                let field_name = definition.name.as_str();
                if self.peek_kind() == Some(&TokenKind::LParen) {
                    return self.primary(Some(field_name));
                }
                self.atom(Some(field_name), definition.field_type)
            }
            _ => {
                let field_type = match field {
                    Some(name) => self.parser.schema.field(name).map(|f| f.field_type).unwrap_or(FieldType::Text),
                    None => FieldType::Text,
                };
                self.atom(field, field_type)
            }
        }
    }

    fn atom(&mut self, field: Option<&str>, field_type: FieldType) -> Result<Query> {
        let Some(token) = self.next() else {
            return Err(self.error_at_end("expected a term"));
        };
        let owned_field = field.map(str::to_string);

        match &token.kind {
            TokenKind::LBracket | TokenKind::LBrace => {
                let Some(field) = field else {
                    return Err(self.error_at("range query needs a field", token));
                };
                if field_type != FieldType::Numeric {
                    return Err(self.error_at("range query on a non-numeric field", token));
                }
                self.range(field, token)
            }
            _ if field_type == FieldType::Numeric => {
                Err(self.error_at("numeric fields only support range queries", token))
            }
            TokenKind::Phrase(text) => {
                let slop = self.optional_slop()?;
                Ok(Query::Phrase(PhraseQuery { field: owned_field, text: text.clone(), slop }))
            }
            TokenKind::Word(word) => {
                if self.peek_kind() == Some(&TokenKind::Tilde) {
                    let tilde = self.next();
                    let max_edits = match self.peek_kind() {
                        Some(TokenKind::Word(n)) if n.chars().all(|c| c.is_ascii_digit()) => {
                            let t = self.next();
                            match n.parse::<u8>() {
                                Ok(d) if d <= 2 => d,
                                _ => return Err(match t {
                                    Some(t) => self.error_at("fuzzy distance must be 0, 1 or 2", t),
                                    None => self.error_at_end("fuzzy distance must be 0, 1 or 2"),
                                }),
                            }
                        }
                        _ => self.parser.default_fuzzy_distance.min(2),
                    };
                    if word.contains('*') || word.contains('?') {
                        return Err(match tilde {
                            Some(t) => self.error_at("fuzzy query on a wildcard term", t),
                            None => self.error_at_end("fuzzy query on a wildcard term"),
                        });
                    }
                    return Ok(Query::Fuzzy(FuzzyQuery { field: owned_field, term: word.clone(), max_edits }));
                }

                if word == "*" {
                    return Ok(Query::MatchAll);
                }
                let star = word.find('*');
                let question = word.find('?');
                match (star, question) {
                    (None, None) => Ok(Query::Term(TermQuery { field: owned_field, value: word.clone() })),
                    (Some(i), None) if i == word.len() - 1 && word.matches('*').count() == 1 => {
                        Ok(Query::Prefix(PrefixQuery { field: owned_field, prefix: word[..i].to_string() }))
                    }
                    _ => Ok(Query::Wildcard(WildcardQuery { field: owned_field, pattern: word.clone() })),
                }
            }
            TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::To => {
                Err(self.error_at("dangling operator", token))
            }
            TokenKind::RParen => Err(self.error_at("unbalanced parenthesis", token)),
            _ => Err(self.error_at("expected a term", token)),
        }
    }

    fn optional_slop(&mut self) -> Result<u32> {
        if self.peek_kind() != Some(&TokenKind::Tilde) {
            return Ok(0);
        }
        let tilde = self.next();
        match self.next() {
            Some(t) => match &t.kind {
                TokenKind::Word(n) => n.parse::<u32>().map_err(|_| self.error_at("invalid slop", t)),
                _ => Err(self.error_at("invalid slop", t)),
            },
            None => Err(match tilde {
                Some(t) => self.error_at("missing slop", t),
                None => self.error_at_end("missing slop"),
            }),
        }
    }

    fn range(&mut self, field: &str, open: &LexToken) -> Result<Query> {
        let include_lower = open.kind == TokenKind::LBracket;
        let lower = self.range_bound()?;
        match self.next() {
            Some(t) if t.kind == TokenKind::To => {}
            Some(t) => return Err(self.error_at("expected TO in range", t)),
            None => return Err(self.error_at("unterminated range", open)),
        }
        let upper = self.range_bound()?;
        let include_upper = match self.next() {
            Some(t) if t.kind == TokenKind::RBracket => true,
            Some(t) if t.kind == TokenKind::RBrace => false,
            Some(t) => return Err(self.error_at("expected ] or } to close range", t)),
            None => return Err(self.error_at("unterminated range", open)),
        };

        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Err(self.error_at("range lower bound exceeds upper bound", open));
            }
        }

        Ok(Query::Range(RangeQuery {
            field: field.to_string(),
            lower,
            upper,
            include_lower,
            include_upper,
        }))
    }

    /// A number, optionally negated, or `*` for an open bound
    fn range_bound(&mut self) -> Result<Option<f64>> {
        let negative = if self.peek_kind() == Some(&TokenKind::Minus) {
            self.next();
            true
        } else {
            false
        };

        let Some(token) = self.next() else {
            return Err(self.error_at_end("unterminated range"));
        };
        match &token.kind {
            TokenKind::Word(w) if w == "*" && !negative => Ok(None),
            TokenKind::Word(w) => match w.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(if negative { -v } else { v })),
                _ => Err(self.error_at("invalid range bound", token)),
            },
            _ => Err(self.error_at("invalid range bound", token)),
        }
    }
}

fn build_group(mut items: Vec<(Occur, Query)>) -> Query {
    if items.len() == 1 && items[0].0 == Occur::Default {
        return items.remove(0).1;
    }

    let mut group = BoolQuery::new();
    for (occur, query) in items {
        match occur {
            Occur::MustNot => group.must_not.push(query),
            _ => group.must.push(query),
        }
    }
    if group.must.is_empty() {
        group.must.push(Query::MatchAll);
    }
    Query::Bool(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::AnalyzerConfig;
    use crate::core::error::ErrorKind;

    fn parser(op: BooleanOperator) -> QueryParser {
        let schema = Schema::new()
            .add_text_field("title", AnalyzerConfig::default())
            .add_text_field("content", AnalyzerConfig::default())
            .add_keyword_field("path")
            .add_numeric_field("size")
            .add_stored_field("note");
        let config = QueryConfig { default_operator: op, ..QueryConfig::default() };
        QueryParser::new(schema, &config)
    }

    fn parse(input: &str) -> Query {
        parser(BooleanOperator::And).parse(input).unwrap()
    }

    fn syntax_error(input: &str) -> (String, usize) {
        match parser(BooleanOperator::And).parse(input).unwrap_err().kind {
            ErrorKind::QuerySyntax { fragment, position } => (fragment, position),
            other => panic!("expected syntax error for {:?}, got {:?}", input, other),
        }
    }

    fn term(value: &str) -> Query {
        Query::Term(TermQuery { field: None, value: value.into() })
    }

    #[test]
    fn empty_query_matches_all() {
        assert_eq!(parse("   "), Query::MatchAll);
    }

    #[test]
    fn juxtaposition_uses_default_operator() {
        assert_eq!(parse("quick fox"), Query::Bool(BoolQuery::new().with_must(term("quick")).with_must(term("fox"))));

        let or = parser(BooleanOperator::Or).parse("quick fox").unwrap();
        assert_eq!(or, Query::Bool(BoolQuery::new().with_should(term("quick")).with_should(term("fox"))));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let q = parse("a AND b OR c");
        let expected = BoolQuery::new()
            .with_should(Query::Bool(BoolQuery::new().with_must(term("a")).with_must(term("b"))))
            .with_should(term("c"));
        assert_eq!(q, Query::Bool(expected));
    }

    #[test]
    fn negation_and_required_clauses() {
        let q = parse("fox -dog");
        assert_eq!(q, Query::Bool(BoolQuery::new().with_must(term("fox")).with_must_not(term("dog"))));

        let q = parse("NOT dog");
        assert_eq!(q, Query::Bool(BoolQuery::new().with_must(Query::MatchAll).with_must_not(term("dog"))));

        let q = parser(BooleanOperator::Or).parse("fox +cat -dog").unwrap();
        let expected = BoolQuery::new()
            .with_must(term("cat"))
            .with_should(term("fox"))
            .with_must_not(term("dog"));
        assert_eq!(q, Query::Bool(expected));
    }

    #[test]
    fn field_scoped_atoms() {
        assert_eq!(parse("title:fox"), Query::term("title", "fox"));
        assert_eq!(parse("title:\"quick brown\"~2"), Query::phrase("title", "quick brown", 2));
        assert_eq!(
            parse("title:qui*"),
            Query::Prefix(PrefixQuery { field: Some("title".into()), prefix: "qui".into() })
        );
        assert_eq!(
            parse("content:q?i*k"),
            Query::Wildcard(WildcardQuery { field: Some("content".into()), pattern: "q?i*k".into() })
        );
        assert_eq!(
            parse("fox~"),
            Query::Fuzzy(FuzzyQuery { field: None, term: "fox".into(), max_edits: 1 })
        );
        assert_eq!(
            parse("title:(quick OR fast)"),
            Query::Bool(BoolQuery::new().with_should(Query::term("title", "quick")).with_should(Query::term("title", "fast")))
        );
    }

    #[test]
    fn numeric_ranges() {
        assert_eq!(
            parse("size:[10 TO *}"),
            Query::Range(RangeQuery { field: "size".into(), lower: Some(10.0), upper: None, include_lower: true, include_upper: false })
        );
        assert_eq!(
            parse("size:{-5 TO 5]"),
            Query::Range(RangeQuery { field: "size".into(), lower: Some(-5.0), upper: Some(5.0), include_lower: false, include_upper: true })
        );
    }

    #[test]
    fn malformed_input_reports_fragment_and_position() {
        assert_eq!(syntax_error("(fox AND dog"), ("(".to_string(), 0));
        assert_eq!(syntax_error("fox dog)"), (")".to_string(), 7));
        assert_eq!(syntax_error("fox AND"), ("AND".to_string(), 4));
        assert_eq!(syntax_error("fox AND OR dog"), ("OR".to_string(), 8));
        assert_eq!(syntax_error("title:"), (":".to_string(), 6));
        assert_eq!(syntax_error("colour:red"), ("colour".to_string(), 0));
        assert_eq!(syntax_error("note:x"), ("note".to_string(), 0));
        assert_eq!(syntax_error("size:[a TO 3]"), ("a".to_string(), 6));
        assert_eq!(syntax_error("size:[9 TO 3]"), ("[".to_string(), 5));
        assert_eq!(syntax_error("title:[1 TO 3]"), ("[".to_string(), 6));
        assert_eq!(syntax_error("\"quick brown\"~x"), ("x".to_string(), 14));
        assert_eq!(syntax_error("()"), (")".to_string(), 1));
    }
}
