//! # Chunker (C2)
//!
//! Token-count-based chunking with sentence-boundary extension and table
//! preservation. Generalized from a `chunk_text` pass that walked
//! paragraphs/sentences by character count, to a fixed whitespace-plus-
//! punctuation tokenizer, documented here as the chunker's canonical
//! tokenizer: a chunk's token count is always measured by [`tokenize`].

use once_cell_token_re as token_re;
use regex::Regex;

use crate::config::Config;
use crate::error::ChunkError;
use crate::extract::Page;
use crate::model::{chunk_id, Chunk, ChunkType};

/// Last-K-tokens window checked for a sentence terminator before extending
/// a chunk boundary forward.
const BOUNDARY_LOOKBACK: usize = 30;

mod once_cell_token_re {
    use regex::Regex;
    use std::sync::OnceLock;

    /// `\w+` runs, or single punctuation characters, matching spec.md's
    /// "whitespace-plus-punctuation heuristic" tokenizer.
    pub fn token_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"[[:alnum:]]+|[^\s[:alnum:]]").unwrap())
    }
}

/// A single token with its byte-offset span in the source text, so chunk
/// boundaries can be mapped back onto substrings.
#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

/// Split `text` into tokens per the canonical tokenizer. A token is either
/// a maximal run of alphanumeric characters or a single punctuation
/// character; whitespace is a separator and produces no tokens.
fn tokenize(text: &str) -> Vec<Token> {
    token_re::token_regex()
        .find_iter(text)
        .map(|m| Token {
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

fn sentence_terminator_in_window(text: &str, tokens: &[Token], window_end: usize) -> bool {
    let start = window_end.saturating_sub(BOUNDARY_LOOKBACK);
    tokens[start..window_end].iter().any(|t| {
        let s = &text[t.start..t.end];
        matches!(s, "." | "!" | "?")
    })
}

/// Heuristic table detector: ≥3 consecutive lines each containing ≥2 pipe
/// characters, or ≥3 aligned whitespace columns.
fn looks_like_table(lines: &[&str]) -> bool {
    if lines.len() < 3 {
        return false;
    }
    lines.windows(3).any(|w| w.iter().all(|line| line_is_tabular(line)))
}

fn line_is_tabular(line: &str) -> bool {
    let pipes = line.matches('|').count();
    let multi_space_columns = line.split("  ").filter(|s| !s.trim().is_empty()).count();
    pipes >= 2 || multi_space_columns >= 3
}

/// Byte spans for each line of `text`, using the same line-splitting rule as
/// `str::lines` (split on `\n`, strip a trailing `\r`), so a span can be
/// sliced back out of `text` unchanged.
fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        if c == '\n' {
            let mut end = i;
            if end > start && text.as_bytes()[end - 1] == b'\r' {
                end -= 1;
            }
            spans.push((start, end));
            start = i + 1;
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Maximal contiguous line-index ranges `[start, end)` covered by at least
/// one qualifying 3-line table window, found by OR-ing every qualifying
/// window's span together rather than taking the whole page as soon as one
/// window matches. A page with one 5-line table in the middle of prose
/// yields one range spanning just those 5 lines.
fn table_line_ranges(lines: &[&str]) -> Vec<(usize, usize)> {
    let n = lines.len();
    if n < 3 {
        return Vec::new();
    }
    let tabular: Vec<bool> = lines.iter().map(|l| line_is_tabular(l)).collect();
    let mut in_table = vec![false; n];
    for w in 0..=(n - 3) {
        if tabular[w] && tabular[w + 1] && tabular[w + 2] {
            in_table[w] = true;
            in_table[w + 1] = true;
            in_table[w + 2] = true;
        }
    }
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < n {
        if in_table[i] {
            let start = i;
            while i < n && in_table[i] {
                i += 1;
            }
            ranges.push((start, i));
        } else {
            i += 1;
        }
    }
    ranges
}

fn definition_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bis (defined as|a|an)\b|^\s*[A-Z][\w \-/]{1,40}:\s").unwrap())
}

fn example_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(for example|e\.g\.|such as)\b").unwrap())
}

fn classify(text: &str, is_table: bool) -> (ChunkType, bool, bool) {
    let has_definitions = definition_regex().is_match(text);
    let has_examples = example_regex().is_match(text);
    let chunk_type = if is_table {
        ChunkType::Table
    } else if has_definitions {
        ChunkType::Definition
    } else if has_examples {
        ChunkType::Example
    } else {
        ChunkType::Content
    };
    (chunk_type, has_definitions, has_examples)
}

/// Unique-content-token ratio: distinct alphanumeric tokens (casefolded)
/// over total tokens, a proxy for information richness.
fn semantic_density(tokens: &[Token], text: &str) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut seen = std::collections::HashSet::new();
    let mut content_tokens = 0usize;
    for t in tokens {
        let s = &text[t.start..t.end];
        if s.chars().next().map(|c| c.is_alphanumeric()).unwrap_or(false) {
            content_tokens += 1;
            seen.insert(s.to_lowercase());
        }
    }
    if content_tokens == 0 {
        return 0.0;
    }
    seen.len() as f32 / content_tokens as f32
}

/// Raw chunk prior to embedding: text, page, and derived metadata.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub chunk_index: usize,
    pub page_num: usize,
    pub text: String,
    pub semantic_density: f32,
    pub chunk_type: ChunkType,
    pub has_definitions: bool,
    pub has_examples: bool,
}

pub struct Chunker {
    target_tokens: usize,
    overlap_tokens: usize,
    max_tokens: usize,
}

impl Chunker {
    pub fn new(config: &Config) -> Self {
        Self {
            target_tokens: config.chunk_target_tokens,
            overlap_tokens: config.chunk_overlap_tokens,
            max_tokens: config.chunk_max_tokens,
        }
    }

    /// Walk every page and emit a finite, ordered sequence of chunks
    /// covering all of them. A chunk never crosses a page boundary: the
    /// window resets per page, matching spec.md's "walk tokens within a
    /// page" wording and keeping `page_num` well defined per chunk.
    pub fn chunk_pages(&self, pages: &[Page]) -> Result<Vec<RawChunk>, ChunkError> {
        let mut out = Vec::new();
        for page in pages {
            self.chunk_page(page, &mut out)?;
        }
        if out.is_empty() && !pages.is_empty() {
            return Err(ChunkError::InvariantViolation(
                "non-empty pages produced zero chunks".into(),
            ));
        }
        Ok(out)
    }

    /// Split a page into table spans and surrounding prose: a contiguous
    /// run of table-like lines becomes one `chunk_type=Table` chunk, and the
    /// prose before/between/after those runs is chunked normally by
    /// [`Chunker::chunk_prose_span`]. A page with no table-like lines at all
    /// is just one prose run.
    fn chunk_page(&self, page: &Page, out: &mut Vec<RawChunk>) -> Result<(), ChunkError> {
        let text = &page.text;
        if tokenize(text).is_empty() {
            return Ok(());
        }

        let lines: Vec<&str> = text.lines().collect();
        let spans = line_spans(text);
        let table_ranges = table_line_ranges(&lines);

        if table_ranges.is_empty() {
            self.chunk_prose_span(text, page.page_num, out);
            return Ok(());
        }

        let mut line_cursor = 0usize;
        for (range_start, range_end) in table_ranges {
            if range_start > line_cursor {
                let prose_start = spans[line_cursor].0;
                let prose_end = spans[range_start - 1].1;
                if prose_end > prose_start {
                    self.chunk_prose_span(&text[prose_start..prose_end], page.page_num, out);
                }
            }

            let table_start = spans[range_start].0;
            let table_end = spans[range_end - 1].1;
            let table_text = &text[table_start..table_end];
            let table_tokens = tokenize(table_text);
            if !table_tokens.is_empty() {
                push_chunk(out, page.page_num, table_text.to_string(), &table_tokens, table_text);
            }
            line_cursor = range_end;
        }
        if line_cursor < lines.len() {
            let prose_start = spans[line_cursor].0;
            if text.len() > prose_start {
                self.chunk_prose_span(&text[prose_start..], page.page_num, out);
            }
        }
        Ok(())
    }

    /// Sliding-window chunking (target/overlap/max tokens, extended to a
    /// sentence boundary) over a single contiguous span of prose text.
    fn chunk_prose_span(&self, text: &str, page_num: usize, out: &mut Vec<RawChunk>) {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        let mut window_start = 0usize;
        while window_start < tokens.len() {
            let mut window_end = std::cmp::min(window_start + self.target_tokens, tokens.len());

            // Boundary rule: extend forward until a sentence terminator is
            // found within the last K tokens, up to the hard maximum.
            while window_end < tokens.len()
                && window_end - window_start < self.max_tokens
                && !sentence_terminator_in_window(text, &tokens, window_end)
            {
                window_end += 1;
            }

            let start_byte = tokens[window_start].start;
            let end_byte = tokens[window_end - 1].end;
            let chunk_text = text[start_byte..end_byte].to_string();
            let chunk_tokens = &tokens[window_start..window_end];
            push_chunk(out, page_num, chunk_text, chunk_tokens, text);

            if window_end >= tokens.len() {
                break;
            }
            // Next window starts `overlap_tokens` back from the emitted boundary.
            let next_start = window_end.saturating_sub(self.overlap_tokens);
            // Guard against overlap >= window size, which would stall progress.
            window_start = if next_start > window_start { next_start } else { window_end };
        }
    }
}

fn push_chunk(out: &mut Vec<RawChunk>, page_num: usize, chunk_text: String, tokens: &[Token], _full_text: &str) {
    let is_table = {
        let lines: Vec<&str> = chunk_text.lines().collect();
        looks_like_table(&lines)
    };
    let (chunk_type, has_definitions, has_examples) = classify(&chunk_text, is_table);
    let density = semantic_density_for(tokens, &chunk_text);
    out.push(RawChunk {
        chunk_index: out.len(),
        page_num,
        text: chunk_text,
        semantic_density: density,
        chunk_type,
        has_definitions,
        has_examples,
    });
}

fn semantic_density_for(_page_tokens: &[Token], chunk_text: &str) -> f32 {
    // Recompute token spans relative to `chunk_text` since `_page_tokens`
    // are offsets into the page, not the extracted chunk substring.
    let local_tokens = tokenize(chunk_text);
    semantic_density(&local_tokens, chunk_text)
}

/// Assign `doc_id`-qualified ids to a sequence of [`RawChunk`]s.
pub fn qualify(doc_id: &str, raw: Vec<RawChunk>) -> Vec<(String, RawChunk)> {
    raw.into_iter()
        .map(|c| (chunk_id(doc_id, c.chunk_index), c))
        .collect()
}
