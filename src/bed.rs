//! BED record I/O for the command-line tools.
//!
//! A thin byte-oriented scanner (tab split via `memchr`) and a writer that
//! formats coordinates without allocation. Only the first six columns are
//! interpreted; anything beyond is carried through verbatim.

use std::io::{BufRead, BufReader, Read, Write};

use memchr::memchr;

use crate::error::{Result, StrataError};

/// One parsed BED line.
#[derive(Debug, Clone, PartialEq)]
pub struct BedLine {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub name: Option<String>,
    pub score: Option<String>,
    pub strand: char,
    /// Columns past the sixth, verbatim.
    pub extra: Vec<String>,
}

impl BedLine {
    pub fn new(chrom: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            name: None,
            score: None,
            strand: '.',
            extra: Vec::new(),
        }
    }
}

/// Streaming reader over BED input.
pub struct BedScanner<R: Read> {
    reader: BufReader<R>,
    line: Vec<u8>,
    line_number: usize,
}

impl<R: Read> BedScanner<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: BufReader::new(input),
            line: Vec::with_capacity(256),
            line_number: 0,
        }
    }

    /// Next data line, or `None` at end of input. Blank lines, comments and
    /// track/browser headers are skipped.
    pub fn next_line(&mut self) -> Result<Option<BedLine>> {
        loop {
            self.line.clear();
            let n = self.reader.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            while matches!(self.line.last(), Some(b'\n') | Some(b'\r')) {
                self.line.pop();
            }
            if self.line.is_empty()
                || self.line[0] == b'#'
                || self.line.starts_with(b"track")
                || self.line.starts_with(b"browser")
            {
                continue;
            }
            return self.parse().map(Some);
        }
    }

    fn parse(&self) -> Result<BedLine> {
        let mut fields: Vec<&[u8]> = Vec::with_capacity(8);
        let mut rest: &[u8] = &self.line;
        while let Some(tab) = memchr(b'\t', rest) {
            fields.push(&rest[..tab]);
            rest = &rest[tab + 1..];
        }
        fields.push(rest);
        if fields.len() < 3 {
            return Err(StrataError::InvalidArgument(format!(
                "BED line {}: expected at least 3 columns, got {}",
                self.line_number,
                fields.len()
            )));
        }
        let start = self.parse_coord(fields[1], "start")?;
        let end = self.parse_coord(fields[2], "end")?;
        if start > end {
            return Err(StrataError::InvalidArgument(format!(
                "BED line {}: start {} past end {}",
                self.line_number, start, end
            )));
        }
        let mut line = BedLine::new(String::from_utf8_lossy(fields[0]).into_owned(), start, end);
        if fields.len() > 3 {
            line.name = Some(String::from_utf8_lossy(fields[3]).into_owned());
        }
        if fields.len() > 4 {
            line.score = Some(String::from_utf8_lossy(fields[4]).into_owned());
        }
        if fields.len() > 5 {
            line.strand = match fields[5].first() {
                Some(b'+') => '+',
                Some(b'-') => '-',
                _ => '.',
            };
        }
        if fields.len() > 6 {
            line.extra = fields[6..]
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
        }
        Ok(line)
    }

    fn parse_coord(&self, field: &[u8], what: &str) -> Result<i64> {
        std::str::from_utf8(field)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|&v| v >= 0)
            .ok_or_else(|| {
                StrataError::InvalidArgument(format!(
                    "BED line {}: bad {} coordinate '{}'",
                    self.line_number,
                    what,
                    String::from_utf8_lossy(field)
                ))
            })
    }
}

/// Buffered BED writer with allocation-free coordinate formatting.
pub struct BedWriter<W: Write> {
    writer: W,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> BedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            itoa_buf: itoa::Buffer::new(),
        }
    }

    pub fn write_line(&mut self, line: &BedLine) -> Result<()> {
        self.writer.write_all(line.chrom.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(line.start).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(line.end).as_bytes())?;
        if let Some(name) = &line.name {
            self.writer.write_all(b"\t")?;
            self.writer.write_all(name.as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.writer
                .write_all(line.score.as_deref().unwrap_or("0").as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.writer.write_all(&[line.strand as u8])?;
            for extra in &line.extra {
                self.writer.write_all(b"\t")?;
                self.writer.write_all(extra.as_bytes())?;
            }
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Bare three-column record.
    pub fn write_bed3(&mut self, chrom: &str, start: i64, end: i64) -> Result<()> {
        self.writer.write_all(chrom.as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer
            .write_all(self.itoa_buf.format(start).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(self.itoa_buf.format(end).as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Preformatted output sharing this writer's buffer.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
