use std::{fmt, ops::Range, sync::Arc};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    config::DEFAULT_WINDOW,
    entity::{Document, DocumentId, Index, SeqId, SeqRecord},
    error::IndexError,
    evaluate::{Rank, Ranker},
    store::Store,
    text::{token, Parser, Token, Tokenizer},
    utils::Memo,
};

/// Number of tokens shown on each side of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub before: usize,
    pub after: usize,
}

impl Default for Window {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_WINDOW)
    }
}

impl Window {
    pub fn new(before: usize, after: usize) -> Self {
        Self { before, after }
    }

    /// Token range around `token`, clipped at 0 but not at the end
    pub fn slice(&self, token: usize) -> Range<usize> {
        token.saturating_sub(self.before)..token.saturating_add(self.after).saturating_add(1)
    }

    /// Token range around `token` inside a document of `len` tokens
    pub fn slice_within(&self, token: usize, len: usize) -> Range<usize> {
        self.around(token, token, len)
    }

    /// Token range around the hit `first..=last`
    pub fn around(&self, first: usize, last: usize, len: usize) -> Range<usize> {
        let start = first.saturating_sub(self.before).min(len);
        let end = last.saturating_add(self.after).saturating_add(1).min(len);
        start..end.max(start)
    }
}

/// Keyword in context: raw text left of the hit, the hit, and right of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kwic {
    pub document: DocumentId,
    pub left: String,
    pub hit: String,
    pub right: String,
}

impl fmt::Display for Kwic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.left, self.hit, self.right)
    }
}

/// Concordance
/// Read side of the index: where a sequence occurs, and the text around it.
///
/// Index rows only store token positions and byte offsets. Context is
/// rebuilt by re-tokenizing the document with the tokenizer named on the
/// row, so rows written by another tokenizer are still sliced correctly
/// when that tokenizer can be resolved from its name.
///
/// `frequencies` is memoized on the store generation and recomputed after
/// any committed write.
pub struct Concordance<'s, S: Store> {
    store: &'s S,
    parser: Parser,
    frequencies: Mutex<Memo<u64, Arc<[SeqRecord]>>>,
}

impl<'s, S: Store> Concordance<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self::with_parser(store, Parser::default())
    }

    /// Queries are cleaned and tokenized by `parser`; it should match the indexer's
    pub fn with_parser(store: &'s S, parser: Parser) -> Self {
        Self {
            store,
            parser,
            frequencies: Mutex::new(Memo::new()),
        }
    }

    /// Stored Word or Gram for a query string
    pub fn lookup(&self, text: &str) -> Option<SeqRecord> {
        let seq = self.parser.seq(text)?;
        self.store.read(|r| r.find(&seq))
    }

    /// Index rows of `seq` grouped by document. Documents keep the order
    /// they were first indexed in; rows within a document are in token order.
    pub fn occurrences(&self, seq: SeqId) -> IndexMap<DocumentId, Vec<Index>> {
        let rows = self.store.read(|r| r.occurrences(seq));
        let mut grouped: IndexMap<DocumentId, Vec<Index>> = IndexMap::new();
        for row in rows {
            grouped.entry(row.document).or_default().push(row);
        }
        for rows in grouped.values_mut() {
            rows.sort_by_key(|row| (row.span.first_token, row.span.last_token));
        }
        grouped
    }

    /// Token-window context of one index row. `None` when the row no longer
    /// fits the document text.
    pub fn kwic(&self, index: &Index, window: Window) -> Result<Option<Kwic>, IndexError> {
        let document = self.document(index.document)?;
        let tokenizer = self.tokenizer_for(index)?;
        let tokens: Vec<Token<'_>> = tokenizer.tokenize(&document.text).collect();
        let line = kwic_in(&document, &tokens, index, window);
        Ok(line)
    }

    /// Every occurrence of `seq` with its context, grouped like `occurrences`
    pub fn concordance(&self, seq: SeqId, window: Window) -> Result<Vec<Kwic>, IndexError> {
        let mut lines = Vec::new();
        for (id, rows) in self.occurrences(seq) {
            let document = self.document(id)?;
            // one tokenization per tokenizer; rows of a document normally share one
            let mut groups: IndexMap<&str, Vec<&Index>> = IndexMap::new();
            for row in &rows {
                groups.entry(&*row.tokenizer).or_default().push(row);
            }
            for group in groups.into_values() {
                let tokenizer = self.tokenizer_for(group[0])?;
                let tokens: Vec<Token<'_>> = tokenizer.tokenize(&document.text).collect();
                lines.extend(group.into_iter().filter_map(|row| kwic_in(&document, &tokens, row, window)));
            }
        }
        debug!(%seq, lines = lines.len(), "built concordance");
        Ok(lines)
    }

    /// Character-window context: up to `before` chars left of the hit and
    /// `after` chars right of it, clipped to the document.
    pub fn char_context(&self, index: &Index, before: usize, after: usize) -> Result<Option<String>, IndexError> {
        let document = self.document(index.document)?;
        let text = document.text.as_str();
        let (Some(head), Some(tail)) = (text.get(..index.span.start), text.get(index.span.end..)) else {
            return Ok(None);
        };
        let start = head.char_indices().rev().take(before).last().map_or(index.span.start, |(i, _)| i);
        let end = tail.char_indices().nth(after).map_or(text.len(), |(i, _)| index.span.end + i);
        Ok(Some(text[start..end].to_string()))
    }

    /// Most frequent sequences, highest count first, ties alphabetical
    pub fn frequencies(&self, limit: usize) -> Vec<SeqRecord> {
        let sorted = self.store.read(|r| {
            let mut memo = self.frequencies.lock();
            Arc::clone(memo.get_or_update(r.generation(), || {
                debug!(generation = r.generation(), "recomputing frequencies");
                let mut seqs = r.seqs();
                seqs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.seq.cmp(&b.seq)));
                seqs.into()
            }))
        });
        sorted.iter().take(limit).cloned().collect()
    }

    /// Documents containing `seq`, ranked by number of occurrences and by
    /// occurrences per token.
    pub fn rank_documents(&self, seq: SeqId) -> Rank<DocumentId> {
        let grouped = self.occurrences(seq);
        let candidates: Vec<(DocumentId, (f64, f64))> = self.store.read(|r| {
            grouped
                .into_iter()
                .map(|(id, rows)| {
                    let hits = rows.len() as f64;
                    let tokens = r.document(id).and_then(|d| d.meta.word_count).unwrap_or(0) as f64;
                    let density = if tokens > 0.0 { hits / tokens } else { 0.0 };
                    (id, (hits, density))
                })
                .collect()
        });
        Ranker::new()
            .compare(2.0, |c: &(f64, f64)| c.0)
            .compare(1.0, |c: &(f64, f64)| c.1)
            .rank(candidates)
    }

    fn document(&self, id: DocumentId) -> Result<Document, IndexError> {
        self.store.read(|r| r.document(id)).ok_or(IndexError::DocumentNotFound(id))
    }

    fn tokenizer_for(&self, index: &Index) -> Result<Arc<dyn Tokenizer>, IndexError> {
        let current = self.parser.tokenizer();
        if current.name() == &*index.tokenizer {
            return Ok(Arc::clone(current));
        }
        token::resolve(&index.tokenizer).ok_or_else(|| IndexError::TokenizerMismatch {
            indexed: index.tokenizer.to_string(),
            current: current.name().to_string(),
        })
    }
}

fn kwic_in(document: &Document, tokens: &[Token<'_>], index: &Index, window: Window) -> Option<Kwic> {
    let span = index.span;
    let hit = tokens.get(span.first_token..=span.last_token)?;
    let (first, last) = (hit.first()?, hit.last()?);
    if (first.start, last.end) != (span.start, span.end) {
        return None;
    }
    let range = window.around(span.first_token, span.last_token, tokens.len());
    let text = document.text.as_str();
    let left_start = tokens[range.start].start;
    let right_end = tokens[range.end - 1].end;
    Some(Kwic {
        document: document.id,
        left: text[left_start..span.start].trim_end().to_string(),
        hit: text[span.start..span.end].to_string(),
        right: text[span.end..right_end].trim_start().to_string(),
    })
}
