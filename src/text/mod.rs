//! Text processing: tokenize, clean, and parse documents into sequences.
pub mod token;
pub mod stem;
pub mod parse;

pub use parse::{Parse, Parser};
pub use stem::{clean, Clean, Stemmer};
pub use token::{RegexTokenizer, Token, Tokenizer, WhitespaceTokenizer};
