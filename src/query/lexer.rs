use nom::branch::alt;
use nom::bytes::complete::{take_till, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, value};
use nom::sequence::delimited;
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Colon,
    Tilde,
    Plus,
    Minus,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    And,
    Or,
    Not,
    To,
    Phrase(String),
    Word(String),
}

/// Lexed token with its byte position in the query string
#[derive(Debug, Clone, PartialEq)]
pub struct LexToken {
    pub kind: TokenKind,
    pub position: usize,
    pub fragment: String,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | ':' | '"' | '~')
}

fn punct(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Colon, char(':')),
        value(TokenKind::Tilde, char('~')),
        value(TokenKind::Plus, char('+')),
        value(TokenKind::Minus, char('-')),
        value(TokenKind::LBracket, char('[')),
        value(TokenKind::RBracket, char(']')),
        value(TokenKind::LBrace, char('{')),
        value(TokenKind::RBrace, char('}')),
    ))
    .parse(input)
}

fn phrase(input: &str) -> IResult<&str, TokenKind> {
    map(
        delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
        |text: &str| TokenKind::Phrase(text.to_string()),
    )
    .parse(input)
}

/// Operators are only recognized in upper case; `and` is an ordinary word
fn word(input: &str) -> IResult<&str, TokenKind> {
    map(take_while1(is_word_char), |w: &str| match w {
        "AND" | "&&" => TokenKind::And,
        "OR" | "||" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        "TO" => TokenKind::To,
        _ => TokenKind::Word(w.to_string()),
    })
    .parse(input)
}

fn snippet(text: &str) -> String {
    text.chars().take(24).collect()
}

/// Split a query string into tokens
pub fn tokenize(input: &str) -> Result<Vec<LexToken>> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0::<&str, nom::error::Error<&str>>(remaining)
            .map_err(|_| Error::query_syntax("invalid whitespace", "", input.len() - remaining.len()))?;
        if rest.is_empty() {
            break;
        }
        let position = input.len() - rest.len();

        match alt((punct, phrase, word)).parse(rest) {
            Ok((after, kind)) => {
                let fragment = rest[..rest.len() - after.len()].to_string();
                tokens.push(LexToken { kind, position, fragment });
                remaining = after;
            }
            Err(_) if rest.starts_with('"') => {
                return Err(Error::query_syntax("unterminated phrase", snippet(rest), position));
            }
            Err(_) => {
                return Err(Error::query_syntax("unexpected character", snippet(rest), position));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_operators_fields_and_phrases() {
        assert_eq!(
            kinds(r#"title:"quick brown"~2 AND -fox*"#),
            vec![
                TokenKind::Word("title".into()),
                TokenKind::Colon,
                TokenKind::Phrase("quick brown".into()),
                TokenKind::Tilde,
                TokenKind::Word("2".into()),
                TokenKind::And,
                TokenKind::Minus,
                TokenKind::Word("fox*".into()),
            ]
        );
    }

    #[test]
    fn hyphen_inside_word_is_kept() {
        assert_eq!(kinds("e-mail and"), vec![TokenKind::Word("e-mail".into()), TokenKind::Word("and".into())]);
    }

    #[test]
    fn positions_are_byte_offsets() {
        let tokens = tokenize("  size:[1 TO 5]").unwrap();
        assert_eq!(tokens[0].position, 2);
        assert_eq!(tokens[2].kind, TokenKind::LBracket);
        assert_eq!(tokens[2].position, 7);
    }

    #[test]
    fn unterminated_phrase_reports_position() {
        let err = tokenize(r#"fox "quick brown"#).unwrap_err();
        match err.kind {
            ErrorKind::QuerySyntax { position, fragment } => {
                assert_eq!(position, 4);
                assert!(fragment.starts_with('"'));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
