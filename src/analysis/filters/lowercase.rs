use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn apply(&self, mut token: Token) -> Option<Token> {
        if token.text.chars().any(char::is_uppercase) {
            token.text = token.text.to_lowercase();
        }
        Some(token)
    }

    fn name(&self) -> &str {
        "lowercase"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(LowercaseFilter)
    }
}
