use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    config::DEFAULT_MAX_GRAM_LENGTH,
    entity::{Seq, SeqKind, Span},
    text::{
        stem::{Clean, Stemmer},
        token::{RegexTokenizer, Tokenizer},
    },
};

/// Result of parsing one document.
/// Every unique sequence with the spans of all its occurrences, in order of
/// first appearance.
#[derive(Debug, Clone, Default)]
pub struct Parse {
    /// name of the tokenizer the spans refer to
    pub tokenizer: Box<str>,
    /// number of tokens in the document
    pub token_count: usize,
    pub seqs: IndexMap<Seq, Vec<Span>>,
}

impl Parse {
    /// Number of unique sequences
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn get(&self, seq: &Seq) -> Option<&[Span]> {
        self.seqs.get(seq).map(Vec::as_slice)
    }

    pub fn contains(&self, seq: &Seq) -> bool {
        self.seqs.contains_key(seq)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Seq, &[Span])> {
        self.seqs.iter().map(|(s, spans)| (s, spans.as_slice()))
    }

    /// Sequences of one kind
    pub fn of_kind(&self, kind: SeqKind) -> impl Iterator<Item = (&Seq, &[Span])> {
        self.iter().filter(move |(s, _)| s.kind() == kind)
    }

    /// Total number of occurrences (index rows this parse would create)
    pub fn occurrence_count(&self) -> usize {
        self.seqs.values().map(Vec::len).sum()
    }
}

/// Parser
/// Turns a document into its set of sequences.
///
/// A window of `max_gram_length` tokens slides over the cleaned token
/// stream. At each position only the sub-grams anchored at the window start
/// are emitted (`[a]`, `[a b]`, `[a b c]`); the later positions cover the
/// rest, so every contiguous n-gram up to the maximum appears exactly once
/// per occurrence and no skip-grams appear at all.
///
/// Parsing has no side effects and is safe to run in parallel.
#[derive(Debug, Clone)]
pub struct Parser {
    tokenizer: Arc<dyn Tokenizer>,
    stemmer: Arc<dyn Stemmer>,
    max_gram_length: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GRAM_LENGTH)
    }
}

impl Parser {
    pub fn new(max_gram_length: usize) -> Self {
        Self {
            tokenizer: Arc::new(RegexTokenizer::default()),
            stemmer: Arc::new(Clean),
            max_gram_length,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_stemmer(mut self, stemmer: Arc<dyn Stemmer>) -> Self {
        self.stemmer = stemmer;
        self
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    pub fn stemmer(&self) -> &Arc<dyn Stemmer> {
        &self.stemmer
    }

    pub fn max_gram_length(&self) -> usize {
        self.max_gram_length
    }

    /// Cleaned tokens with their raw positions; tokens that clean to nothing are dropped
    fn clean_tokens(&self, text: &str) -> Vec<(String, Span)> {
        self.tokenizer
            .tokenize(text)
            .filter_map(|token| {
                let cleaned = self.stemmer.clean(token.text);
                (!cleaned.is_empty()).then(|| {
                    let span = Span {
                        first_token: token.index,
                        last_token: token.index,
                        start: token.start,
                        end: token.end,
                    };
                    (cleaned, span)
                })
            })
            .collect()
    }

    pub fn parse(&self, text: &str) -> Parse {
        let tokens = self.clean_tokens(text);
        let mut parse = Parse {
            tokenizer: self.tokenizer.name().into(),
            token_count: tokens.len(),
            seqs: IndexMap::new(),
        };
        if self.max_gram_length == 0 {
            return parse;
        }
        for first in 0..tokens.len() {
            let last = (first + self.max_gram_length).min(tokens.len());
            let mut gram = String::new();
            for (n, (token, span)) in tokens[first..last].iter().enumerate() {
                if n > 0 {
                    gram.push(' ');
                }
                gram.push_str(token);
                let head = &tokens[first].1;
                let occurrence = Span {
                    first_token: head.first_token,
                    last_token: span.last_token,
                    start: head.start,
                    end: span.end,
                };
                parse
                    .seqs
                    .entry(Seq::from_clean(SeqKind::of_len(n + 1), gram.as_str()))
                    .or_default()
                    .push(occurrence);
            }
        }
        parse
    }

    /// The sequence a query string stands for, tokenized and cleaned the same
    /// way documents are. `None` when the text has no tokens.
    pub fn seq(&self, text: &str) -> Option<Seq> {
        let tokens: Vec<String> = self.clean_tokens(text).into_iter().map(|(t, _)| t).collect();
        match tokens.len() {
            0 => None,
            n => Some(Seq::from_clean(SeqKind::of_len(n), tokens.join(" "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::token::WhitespaceTokenizer;

    fn texts(parse: &Parse) -> Vec<(SeqKind, &str)> {
        let mut out: Vec<_> = parse.seqs.keys().map(|s| (s.kind(), s.text())).collect();
        out.sort();
        out
    }

    #[test]
    fn window_emits_contiguous_grams_only() {
        let parse = Parser::new(3).parse("a b c");
        assert_eq!(
            texts(&parse),
            vec![
                (SeqKind::Word, "a"),
                (SeqKind::Word, "b"),
                (SeqKind::Word, "c"),
                (SeqKind::Gram, "a b"),
                (SeqKind::Gram, "a b c"),
                (SeqKind::Gram, "b c"),
            ]
        );
        assert!(!parse.contains(&Seq::gram(&["a", "c"])));
    }

    #[test]
    fn recurring_sequences_share_one_entry() {
        let text = "The cat saw the CAT";
        let parse = Parser::new(2).parse(text);
        let spans = parse.get(&Seq::word("the")).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(&text[spans[1].start..spans[1].end], "the");
        let cat = parse.get(&Seq::gram(&["the", "cat"])).unwrap();
        assert_eq!(cat.len(), 2);
        assert_eq!(&text[cat[1].start..cat[1].end], "the CAT");
        assert_eq!((cat[1].first_token, cat[1].last_token), (3, 4));
        assert_eq!(parse.token_count, 5);
    }

    #[test]
    fn whitespace_differences_collapse() {
        let parse = Parser::new(2).parse("New  York\nnew york");
        assert_eq!(parse.get(&Seq::gram(&["new", "york"])).map(<[Span]>::len), Some(2));
    }

    #[test]
    fn occurrence_count_matches_formula() {
        // n tokens, max m: sum over lengths 1..=m of (n - len + 1)
        let parse = Parser::new(3).parse("one two three four five");
        assert_eq!(parse.occurrence_count(), 5 + 4 + 3);
    }

    #[test]
    fn empty_inputs() {
        assert!(Parser::new(3).parse("").is_empty());
        assert!(Parser::new(3).parse(" ,;; ").is_empty());
        assert!(Parser::new(0).parse("a b").is_empty());
    }

    #[test]
    fn records_tokenizer_name() {
        let parser = Parser::new(1).with_tokenizer(Arc::new(WhitespaceTokenizer));
        let parse = parser.parse("hi there");
        assert_eq!(&*parse.tokenizer, "whitespace");
    }

    #[test]
    fn query_seq_uses_document_rules() {
        let parser = Parser::default();
        assert_eq!(parser.seq("The U.S."), Some(Seq::gram(&["the", "u.s"])));
        assert_eq!(parser.seq("  Cat "), Some(Seq::word("cat")));
        assert_eq!(parser.seq("..."), None);
    }
}
