//! Token storage and order-insensitive line comparison for `judge-shuffle`.
//!
//! Both inputs are slurped into a [`TokenBuf`] first, then materialized into
//! parallel token and line tables whose order can be normalized (words
//! within a line, lines within the file) before a positional comparison.

use std::cmp::Ordering;

use crate::token::Tokenizer;
use crate::verdict::Result;

/// Tokens are appended NUL-delimited to fixed-capacity pages; a page never
/// splits a token.
const PAGE_SIZE: usize = 64 * 1024;

#[derive(Default)]
pub struct TokenBuf {
    pages: Vec<Vec<u8>>,
    num_tokens: usize,
    num_lines: usize,
}

impl TokenBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a token. The empty token is the line sentinel.
    pub fn push(&mut self, token: &[u8]) {
        let need = token.len() + 1;
        match self.pages.last_mut() {
            Some(page) if page.capacity() - page.len() >= need => {
                page.extend_from_slice(token);
                page.push(0);
            }
            _ => {
                // Oversized tokens get a page of their own instead of
                // bloating the common page size.
                let cap = if need > PAGE_SIZE / 5 { need } else { PAGE_SIZE };
                let mut page = Vec::with_capacity(cap);
                page.extend_from_slice(token);
                page.push(0);
                self.pages.push(page);
            }
        }
        self.num_tokens += 1;
        if token.is_empty() {
            self.num_lines += 1;
        }
    }

    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    /// Number of terminated lines, i.e. line sentinels stored.
    pub fn num_lines(&self) -> usize {
        self.num_lines
    }

    /// Tokens in insertion order.
    pub fn tokens(&self) -> Tokens<'_> {
        Tokens {
            pages: &self.pages,
            page: 0,
            off: 0,
        }
    }
}

pub struct Tokens<'a> {
    pages: &'a [Vec<u8>],
    page: usize,
    off: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let page = self.pages.get(self.page)?;
            if self.off >= page.len() {
                self.page += 1;
                self.off = 0;
                continue;
            }
            let rest = &page[self.off..];
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            self.off += end + 1;
            return Some(&rest[..end]);
        }
    }
}

/// The multiplicative fold used for both token and line hashes.
fn hash_step(h: u32, unit: u32) -> u32 {
    h.wrapping_mul(0x6011).wrapping_add(unit)
}

pub fn token_hash(token: &[u8]) -> u32 {
    token.iter().fold(1, |h, &b| hash_step(h, u32::from(b)))
}

#[derive(Clone, Copy)]
pub struct Tok<'a> {
    pub bytes: &'a [u8],
    pub hash: u32,
}

impl<'a> Tok<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Tok {
            bytes,
            hash: token_hash(bytes),
        }
    }

    fn cmp(&self, other: &Tok<'_>) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.bytes.cmp(other.bytes))
    }
}

/// A line is a slice of the token table plus its hash and the 1-based line
/// number it had in the input, kept for error reporting after sorting.
pub struct Line {
    start: usize,
    len: usize,
    hash: u32,
    pub orig_line: u32,
}

pub struct Shuffler<'a> {
    toks: Vec<Tok<'a>>,
    lines: Vec<Line>,
}

impl<'a> Shuffler<'a> {
    /// Build the token and line tables. With `shuffle_words` the tokens of
    /// each line are brought into hash order before the line hash is
    /// computed; with `shuffle_lines` the lines themselves are.
    pub fn build(buf: &'a TokenBuf, shuffle_words: bool, shuffle_lines: bool) -> Self {
        let mut toks: Vec<Tok<'a>> = Vec::with_capacity(buf.num_tokens() - buf.num_lines());
        let mut lines: Vec<Line> = Vec::with_capacity(buf.num_lines());
        let mut start = 0;

        for token in buf.tokens() {
            if !token.is_empty() {
                toks.push(Tok::new(token));
                continue;
            }
            let len = toks.len() - start;
            if shuffle_words {
                toks[start..].sort_by(|a, b| a.cmp(b));
            }
            let hash = toks[start..]
                .iter()
                .fold(1, |h, t| hash_step(h, t.hash));
            lines.push(Line {
                start,
                len,
                hash,
                orig_line: lines.len() as u32 + 1,
            });
            start = toks.len();
        }

        if shuffle_lines {
            lines.sort_by(|a, b| cmp_lines(&toks, a, &toks, b));
        }

        Shuffler { toks, lines }
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, i: usize) -> &Line {
        &self.lines[i]
    }

    pub fn lines_equal(&self, i: usize, other: &Shuffler<'_>, j: usize) -> bool {
        cmp_lines(&self.toks, &self.lines[i], &other.toks, &other.lines[j]) == Ordering::Equal
    }
}

fn cmp_lines(atoks: &[Tok<'_>], a: &Line, btoks: &[Tok<'_>], b: &Line) -> Ordering {
    a.hash
        .cmp(&b.hash)
        .then_with(|| a.len.cmp(&b.len))
        .then_with(|| {
            let lhs = &atoks[a.start..a.start + a.len];
            let rhs = &btoks[b.start..b.start + b.len];
            for (x, y) in lhs.iter().zip(rhs) {
                let c = x.cmp(y);
                if c != Ordering::Equal {
                    return c;
                }
            }
            Ordering::Equal
        })
}

/// Read a whole input into a token buffer, folding case and filtering
/// blank lines as requested, and terminate the final line if the input
/// did not.
pub fn slurp(
    t: &mut Tokenizer,
    fold_case: bool,
    ignore_nl: bool,
    ignore_empty: bool,
) -> Result<TokenBuf> {
    let mut buf = TokenBuf::new();
    let mut at_line_start = true;
    let mut folded = Vec::new();

    while t.next_token()? {
        let token = t.token();
        if !token.is_empty() {
            at_line_start = false;
            if fold_case {
                folded.clear();
                folded.extend(token.iter().map(|b| b.to_ascii_uppercase()));
                buf.push(&folded);
                continue;
            }
        } else if !ignore_nl {
            if at_line_start && ignore_empty {
                continue;
            }
            at_line_start = true;
        }
        buf.push(token);
    }

    if !at_line_start {
        buf.push(b"");
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_of(tokens: &[&[u8]]) -> TokenBuf {
        let mut buf = TokenBuf::new();
        for t in tokens {
            buf.push(t);
        }
        buf
    }

    #[test]
    fn token_buf_keeps_insertion_order() {
        let buf = buf_of(&[b"alpha", b"", b"beta", b"gamma", b""]);
        let got: Vec<&[u8]> = buf.tokens().collect();
        assert_eq!(got, vec![&b"alpha"[..], b"", b"beta", b"gamma", b""]);
        assert_eq!(buf.num_tokens(), 5);
        assert_eq!(buf.num_lines(), 2);
    }

    #[test]
    fn token_buf_spills_across_pages() {
        let mut buf = TokenBuf::new();
        let long = vec![b'x'; PAGE_SIZE / 3];
        for _ in 0..8 {
            buf.push(&long);
            buf.push(b"");
        }
        let got: Vec<usize> = buf.tokens().map(|t| t.len()).collect();
        assert_eq!(got.len(), 16);
        assert_eq!(got[0], PAGE_SIZE / 3);
        assert_eq!(buf.num_lines(), 8);
    }

    #[test]
    fn oversized_token_survives() {
        let mut buf = TokenBuf::new();
        let huge = vec![b'y'; PAGE_SIZE * 2];
        buf.push(&huge);
        buf.push(b"");
        assert_eq!(buf.tokens().next().unwrap(), &huge[..]);
    }

    #[test]
    fn hash_matches_reference_fold() {
        // h = ((1 * 0x6011 + 'a') * 0x6011) + 'b'
        let expected = 0x6011u32
            .wrapping_add(u32::from(b'a'))
            .wrapping_mul(0x6011)
            .wrapping_add(u32::from(b'b'));
        assert_eq!(token_hash(b"ab"), expected);
        assert_eq!(token_hash(b""), 1);
    }

    #[test]
    fn line_order_is_normalized_only_when_asked() {
        let buf1 = buf_of(&[b"2", b"", b"1", b""]);
        let buf2 = buf_of(&[b"1", b"", b"2", b""]);

        let plain1 = Shuffler::build(&buf1, false, false);
        let plain2 = Shuffler::build(&buf2, false, false);
        assert!(!plain1.lines_equal(0, &plain2, 0));

        let sorted1 = Shuffler::build(&buf1, false, true);
        let sorted2 = Shuffler::build(&buf2, false, true);
        for i in 0..2 {
            assert!(sorted1.lines_equal(i, &sorted2, i));
        }
    }

    #[test]
    fn word_order_is_normalized_only_when_asked() {
        let buf1 = buf_of(&[b"b", b"a", b""]);
        let buf2 = buf_of(&[b"a", b"b", b""]);

        let plain1 = Shuffler::build(&buf1, false, false);
        let plain2 = Shuffler::build(&buf2, false, false);
        assert!(!plain1.lines_equal(0, &plain2, 0));

        let words1 = Shuffler::build(&buf1, true, false);
        let words2 = Shuffler::build(&buf2, true, false);
        assert!(words1.lines_equal(0, &words2, 0));
    }

    #[test]
    fn original_line_numbers_survive_sorting() {
        let buf = buf_of(&[b"zz", b"", b"aa", b""]);
        let s = Shuffler::build(&buf, false, true);
        let mut origs: Vec<u32> = (0..2).map(|i| s.line(i).orig_line).collect();
        origs.sort_unstable();
        assert_eq!(origs, vec![1, 2]);
    }

    #[test]
    fn lines_differing_only_in_length_compare_unequal() {
        let buf1 = buf_of(&[b"a", b"a", b""]);
        let buf2 = buf_of(&[b"a", b""]);
        let s1 = Shuffler::build(&buf1, false, false);
        let s2 = Shuffler::build(&buf2, false, false);
        assert!(!s1.lines_equal(0, &s2, 0));
    }
}
