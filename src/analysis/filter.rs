use crate::analysis::token::Token;

pub trait TokenFilter: Send + Sync {
    /// Transform one token; `None` removes it from the stream (positions are kept)
    fn apply(&self, token: Token) -> Option<Token>;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn TokenFilter>;
}
