//! Core of the `text-preproc` normalizer: strips a leading BOM, decodes
//! UTF-16 when one announced it, and lets only printable ASCII plus LF and
//! TAB through. CR is dropped silently; everything else is rejected with
//! the offending code and its absolute byte position.

use crate::io::Stream;
use crate::verdict::Result;

pub enum Outcome {
    Clean,
    /// The input is not acceptable; the message names the first offense.
    Rejected(String),
}

/// Byte source with absolute positions and pushback for BOM detection.
struct Source<'a> {
    inp: &'a mut Stream,
    back: Vec<u8>,
    pos: u64,
}

impl<'a> Source<'a> {
    fn next(&mut self) -> Result<Option<u8>> {
        let b = match self.back.pop() {
            Some(b) => Some(b),
            None => self.inp.getc()?,
        };
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    fn push_back(&mut self, b: u8) {
        self.back.push(b);
        self.pos -= 1;
    }
}

struct Writer<'a> {
    out: &'a mut Stream,
    last: Option<u8>,
}

impl<'a> Writer<'a> {
    fn put(&mut self, c: u8) -> Result<()> {
        self.last = Some(c);
        self.out.putc(c)
    }

    /// Emit one decoded codepoint, or report why it cannot appear in a
    /// normalized file.
    fn codepoint(&mut self, c: u32, pos: u64) -> Result<Option<String>> {
        if c == u32::from(b'\r') {
            return Ok(None);
        }
        if c == u32::from(b'\n') || c == u32::from(b'\t') {
            self.put(c as u8)?;
            return Ok(None);
        }
        if c < 0x20 || c >= 0x7f {
            return Ok(Some(format!(
                "File contains non-printable character (code {c} at position {pos})"
            )));
        }
        self.put(c as u8)?;
        Ok(None)
    }
}

enum Encoding {
    Ascii,
    Utf16 { big_endian: bool },
}

fn detect_bom(src: &mut Source<'_>) -> Result<Encoding> {
    let mut head = Vec::new();
    for _ in 0..3 {
        match src.next()? {
            Some(b) => head.push(b),
            None => break,
        }
    }

    let (encoding, bom_len) = match head.as_slice() {
        [0xef, 0xbb, 0xbf, ..] => (Encoding::Ascii, 3),
        [0xff, 0xfe, ..] => (Encoding::Utf16 { big_endian: false }, 2),
        [0xfe, 0xff, ..] => (Encoding::Utf16 { big_endian: true }, 2),
        _ => (Encoding::Ascii, 0),
    };
    for &b in head[bom_len..].iter().rev() {
        src.push_back(b);
    }
    Ok(encoding)
}

pub fn normalize(inp: &mut Stream, out: &mut Stream) -> Result<Outcome> {
    let mut src = Source {
        inp,
        back: Vec::new(),
        pos: 0,
    };
    let mut w = Writer { out, last: None };

    let encoding = detect_bom(&mut src)?;
    let rejected = match encoding {
        Encoding::Ascii => loop {
            let pos = src.pos;
            match src.next()? {
                None => break None,
                Some(c) => {
                    if let Some(msg) = w.codepoint(u32::from(c), pos)? {
                        break Some(msg);
                    }
                }
            }
        },
        Encoding::Utf16 { big_endian } => loop {
            let pos = src.pos;
            let Some(c1) = src.next()? else { break None };
            let Some(c2) = src.next()? else {
                break Some(format!(
                    "File in UTF-16 contains incomplete character (at position {pos})"
                ));
            };
            let (hi, lo) = if big_endian { (c1, c2) } else { (c2, c1) };
            let c = (u32::from(hi) << 8) | u32::from(lo);
            if let Some(msg) = w.codepoint(c, pos)? {
                break Some(msg);
            }
        },
    };

    if let Some(msg) = rejected {
        return Ok(Outcome::Rejected(msg));
    }

    if w.last.is_some() && w.last != Some(b'\n') {
        w.put(b'\n')?;
    }
    w.out.flush()?;
    Ok(Outcome::Clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn run(input: &[u8]) -> (Option<String>, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in");
        let out_path = dir.path().join("out");
        std::fs::File::create(&in_path)
            .unwrap()
            .write_all(input)
            .unwrap();
        let mut inp = Stream::open_read(&in_path).unwrap();
        let mut out = Stream::open_write(&out_path).unwrap();
        let outcome = normalize(&mut inp, &mut out).unwrap();
        drop(out);
        let written = std::fs::read(&out_path).unwrap();
        match outcome {
            Outcome::Clean => (None, written),
            Outcome::Rejected(msg) => (Some(msg), written),
        }
    }

    #[test]
    fn plain_ascii_passes_through() {
        let (err, out) = run(b"hello world\n");
        assert_eq!(err, None);
        assert_eq!(out, b"hello world\n");
    }

    #[test]
    fn empty_input_stays_empty() {
        let (err, out) = run(b"");
        assert_eq!(err, None);
        assert_eq!(out, b"");
    }

    #[test]
    fn missing_final_newline_is_added() {
        let (err, out) = run(b"abc");
        assert_eq!(err, None);
        assert_eq!(out, b"abc\n");
    }

    #[test]
    fn carriage_returns_are_dropped() {
        let (err, out) = run(b"a\r\nb\r\n");
        assert_eq!(err, None);
        assert_eq!(out, b"a\nb\n");
    }

    #[test]
    fn tabs_are_preserved() {
        let (err, out) = run(b"a\tb\n");
        assert_eq!(err, None);
        assert_eq!(out, b"a\tb\n");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let (err, out) = run(b"\xef\xbb\xbfok\n");
        assert_eq!(err, None);
        assert_eq!(out, b"ok\n");
    }

    #[test]
    fn utf16_le_is_decoded() {
        let (err, out) = run(b"\xff\xfeh\x00i\x00\n\x00");
        assert_eq!(err, None);
        assert_eq!(out, b"hi\n");
    }

    #[test]
    fn utf16_be_is_decoded() {
        let (err, out) = run(b"\xfe\xff\x00h\x00i\x00\n");
        assert_eq!(err, None);
        assert_eq!(out, b"hi\n");
    }

    #[test]
    fn control_bytes_are_rejected_with_position() {
        let (err, _) = run(b"ab\x01c");
        let msg = err.unwrap();
        assert!(msg.contains("code 1"));
        assert!(msg.contains("position 2"));
    }

    #[test]
    fn non_ascii_bytes_are_rejected() {
        let (err, _) = run(b"caf\xc3\xa9\n");
        let msg = err.unwrap();
        assert!(msg.contains("code 195"));
        assert!(msg.contains("position 3"));
    }

    #[test]
    fn delete_character_is_rejected() {
        let (err, _) = run(b"x\x7f");
        assert!(err.unwrap().contains("code 127"));
    }

    #[test]
    fn non_ascii_utf16_codepoint_is_rejected() {
        // 0x00e9 (e-acute) after the LE BOM, at byte position 2.
        let (err, _) = run(b"\xff\xfe\xe9\x00");
        let msg = err.unwrap();
        assert!(msg.contains("code 233"));
        assert!(msg.contains("position 2"));
    }

    #[test]
    fn truncated_utf16_pair_is_rejected() {
        let (err, _) = run(b"\xff\xfea\x00b");
        assert!(err
            .unwrap()
            .contains("incomplete character (at position 4)"));
    }

    #[test]
    fn bom_lookalike_prefix_is_data() {
        // 0xef alone is not a BOM; it must be rejected as a stray byte.
        let (err, _) = run(b"\xefxy");
        let msg = err.unwrap();
        assert!(msg.contains("code 239"));
        assert!(msg.contains("position 0"));
    }
}
