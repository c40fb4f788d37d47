pub mod ast;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod matcher;
pub mod cache;
