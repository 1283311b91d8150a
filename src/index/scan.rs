//! Pull-based decoder over the `features` array of a GeoJSON FeatureCollection.
//!
//! The scanner walks the byte stream with a small JSON state machine and
//! hands out one record at a time, together with the absolute byte offset of
//! its opening brace. Nothing but the current record is ever buffered, so
//! memory stays bounded by the largest single feature regardless of file size.

use std::{fs::File, io::{BufRead, BufReader, Seek, SeekFrom}, path::Path};

use anyhow::{bail, Context, Result};

/// One undecoded record of the `features` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeature {
    /// Byte offset of the record's first byte in the source file.
    pub offset: u64,
    /// The record's JSON text.
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State { Start, InFeatures, Done }

/// Lazily yields the records of a FeatureCollection.
///
/// Finite and not restartable: after the closing `]` of the `features` array
/// (or after the first error) the iterator is exhausted.
pub struct FeatureScanner<R> {
    reader: R,
    pos: u64,
    state: State,
}

impl FeatureScanner<BufReader<File>> {
    /// Open a geometry file for a full scan.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open geometry file: {}", path.display()))?;
        Ok(Self::new(BufReader::with_capacity(1 << 20, file)))
    }
}

impl<R: BufRead> FeatureScanner<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, pos: 0, state: State::Start }
    }

    /// Bytes consumed so far.
    #[inline] pub fn position(&self) -> u64 { self.pos }

    fn peek(&mut self) -> Result<Option<u8>> {
        let buf = self.reader.fill_buf()
            .with_context(|| format!("read failed at byte {}", self.pos))?;
        Ok(buf.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
        self.pos += 1;
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        match self.peek()? {
            Some(b) if b == want => { self.bump(); Ok(()) }
            Some(b) => bail!("expected '{}' at byte {}, found '{}'", want as char, self.pos, b as char),
            None => bail!("expected '{}' at byte {}, found end of file", want as char, self.pos),
        }
    }

    fn skip_ws(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf()
                .with_context(|| format!("read failed at byte {}", self.pos))?;
            if buf.is_empty() { return Ok(()) }
            let n = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let exhausted = n == buf.len();
            self.reader.consume(n);
            self.pos += n as u64;
            if !exhausted { return Ok(()) }
        }
    }

    fn skip_bom(&mut self) -> Result<()> {
        let buf = self.reader.fill_buf()?;
        if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.reader.consume(3);
            self.pos += 3;
        }
        Ok(())
    }

    /// Consume one complete JSON value, copying its bytes into `sink` if given.
    fn walk_value(&mut self, mut sink: Option<&mut Vec<u8>>) -> Result<()> {
        let start = self.pos;
        let mut walker = ValueWalker::default();
        loop {
            let buf = self.reader.fill_buf()
                .with_context(|| format!("read failed at byte {}", self.pos))?;
            if buf.is_empty() {
                if walker.is_scalar() { return Ok(()) }
                bail!("unexpected end of file inside value starting at byte {}", start);
            }

            let mut consumed = buf.len();
            let mut done = false;
            for (i, &b) in buf.iter().enumerate() {
                match walker.step(b) {
                    Step::Continue => {}
                    Step::DoneInclusive => { consumed = i + 1; done = true; break }
                    Step::DoneExclusive => { consumed = i; done = true; break }
                    Step::Invalid => bail!("unexpected '{}' at byte {}", b as char, self.pos + i as u64),
                }
            }

            if let Some(sink) = sink.as_deref_mut() {
                sink.extend_from_slice(&buf[..consumed]);
            }
            self.reader.consume(consumed);
            self.pos += consumed as u64;
            if done { return Ok(()) }
        }
    }

    fn read_key(&mut self) -> Result<String> {
        let at = self.pos;
        let mut raw = Vec::new();
        self.walk_value(Some(&mut raw))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("invalid object key at byte {}", at))
    }

    /// Walk the root object up to the opening `[` of `features`.
    /// Returns false if the root object has no `features` member.
    fn enter_features(&mut self) -> Result<bool> {
        self.skip_bom()?;
        self.skip_ws()?;
        match self.peek()? {
            Some(b'{') => self.bump(),
            Some(b) => bail!("expected a FeatureCollection object, found '{}'", b as char),
            None => bail!("geometry file is empty"),
        }
        loop {
            self.skip_ws()?;
            match self.peek()? {
                Some(b'}') => { self.bump(); return Ok(false) }
                Some(b',') => { self.bump(); continue }
                Some(b'"') => {}
                Some(b) => bail!("expected an object key at byte {}, found '{}'", self.pos, b as char),
                None => bail!("unterminated FeatureCollection object"),
            }
            let key = self.read_key()?;
            self.skip_ws()?;
            self.expect(b':')?;
            self.skip_ws()?;
            if key == "features" {
                self.expect(b'[')?;
                return Ok(true);
            }
            self.walk_value(None)?;
        }
    }

    fn next_feature(&mut self) -> Result<Option<RawFeature>> {
        loop {
            self.skip_ws()?;
            match self.peek()? {
                Some(b']') => { self.bump(); return Ok(None) }
                Some(b',') => self.bump(),
                Some(_) => {
                    let offset = self.pos;
                    let mut bytes = Vec::new();
                    self.walk_value(Some(&mut bytes))?;
                    return Ok(Some(RawFeature { offset, bytes }));
                }
                None => bail!("unterminated features array at byte {}", self.pos),
            }
        }
    }

    fn advance(&mut self) -> Result<Option<RawFeature>> {
        if self.state == State::Start {
            self.state = if self.enter_features()? { State::InFeatures } else { State::Done };
        }
        match self.state {
            State::InFeatures => self.next_feature(),
            _ => Ok(None),
        }
    }
}

impl<R: BufRead> Iterator for FeatureScanner<R> {
    type Item = Result<RawFeature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done { return None }
        match self.advance() {
            Ok(Some(feature)) => Some(Ok(feature)),
            Ok(None) => { self.state = State::Done; None }
            Err(e) => { self.state = State::Done; Some(Err(e)) }
        }
    }
}

/// Decode exactly one record starting at `offset`, which must be the
/// opening brace of a feature object (as stored in the plot index).
pub fn read_feature_at<R: BufRead + Seek>(reader: &mut R, offset: u64) -> Result<RawFeature> {
    reader.seek(SeekFrom::Start(offset))
        .with_context(|| format!("Failed to seek to byte {}", offset))?;
    let mut scanner = FeatureScanner { reader, pos: offset, state: State::InFeatures };
    match scanner.peek()? {
        Some(b'{') => {}
        Some(b) => bail!("no record starts at byte {} (found '{}')", offset, b as char),
        None => bail!("byte {} is past the end of the geometry file", offset),
    }
    let mut bytes = Vec::new();
    scanner.walk_value(Some(&mut bytes))?;
    Ok(RawFeature { offset, bytes })
}

enum Step { Continue, DoneInclusive, DoneExclusive, Invalid }

/// Tracks nesting and string state while skipping over one JSON value.
#[derive(Default)]
struct ValueWalker {
    started: bool,
    depth: u32,
    in_string: bool,
    escaped: bool,
    scalar: bool,
}

impl ValueWalker {
    fn is_scalar(&self) -> bool { self.scalar }

    fn step(&mut self, b: u8) -> Step {
        if !self.started {
            self.started = true;
            match b {
                b'{' | b'[' => self.depth = 1,
                b'"' => self.in_string = true,
                b'}' | b']' | b',' | b':' => return Step::Invalid,
                _ => self.scalar = true,
            }
            return Step::Continue;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
                if self.depth == 0 { return Step::DoneInclusive }
            }
            return Step::Continue;
        }

        if self.scalar {
            return match b {
                b',' | b']' | b'}' => Step::DoneExclusive,
                _ if b.is_ascii_whitespace() => Step::DoneExclusive,
                _ => Step::Continue,
            };
        }

        match b {
            b'"' => self.in_string = true,
            b'{' | b'[' => self.depth += 1,
            b'}' | b']' => {
                self.depth -= 1;
                if self.depth == 0 { return Step::DoneInclusive }
            }
            _ => {}
        }
        Step::Continue
    }
}
