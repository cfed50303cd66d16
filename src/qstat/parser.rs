// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incremental parser for scheduler status reports.
//!
//! A report starts with a framing preamble (blank lines, the server name,
//! column headings and a dashed separator) followed by one data line per job:
//!
//! ```text
//!
//! hazelhen-batch.hww.hlrs.de:
//!                                                          Req'd    Req'd       Elap
//! Job ID          Username Queue  Jobname  SessID NDS TSK  Memory   Time     S  Time
//! --------------- -------- ------ -------- ------ --- ---- ------ --------- - ------
//! 2483314.hazelhen xeuspimi single euxduwkde4 8006  1  --     --  01:00:00 C     --
//! ```
//!
//! [`TableParser`] reads from any [`AsyncBufRead`], so it can consume a
//! session's stdout while the remote command is still producing it.

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::record::{Column, FieldRecord, FIELD_COUNT};

/// Number of preamble lines `qstat -u` prints before the first job
pub const QSTAT_PREAMBLE_LINES: usize = 5;

/// Silence on the stream after which a pass gives up
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Fewest tokens a record can have and still carry a status
pub const MIN_RECORD_FIELDS: usize = Column::Status.index() + 1;

/// How the end of the preamble is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderDetection {
    /// Data starts after the first line made only of dash runs
    #[default]
    Separator,
    /// Data starts after exactly this many lines
    FixedLines(usize),
}

/// Parser settings for one report dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    pub header: HeaderDetection,
    /// Lines with fewer tokens are reported and skipped. Values below
    /// [`MIN_RECORD_FIELDS`] are raised to it.
    pub min_fields: usize,
    /// Give up when the producer stays silent this long. Defaults to
    /// [`DEFAULT_IDLE_TIMEOUT`]; `null` or `0` waits forever.
    #[serde(with = "optional_secs")]
    pub idle_timeout: Option<Duration>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            header: HeaderDetection::default(),
            min_fields: FIELD_COUNT,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

/// A data line that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWarning {
    #[error("line {line_number} ({line:?}): {expected} fields expected, {actual} parsed")]
    TooFewFields {
        line_number: usize,
        line: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// Recoverable: the offending line is skipped
    #[error(transparent)]
    Malformed(#[from] ParseWarning),

    #[error("no output for {}s; giving up on the stream", .0.as_secs())]
    Stalled(Duration),

    #[error("failed to read command output: {0}")]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Whether parsing stops after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParseError::Malformed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    SeekingHeader { skipped: usize },
    InData,
    Done,
}

/// Pulls [`FieldRecord`]s out of a report stream one line at a time.
pub struct TableParser<R> {
    reader: R,
    options: ParserOptions,
    state: ParserState,
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> TableParser<R> {
    pub fn new(reader: R, mut options: ParserOptions) -> Self {
        if options.min_fields < MIN_RECORD_FIELDS {
            tracing::warn!(
                "min_fields {} leaves no status column, using {}",
                options.min_fields,
                MIN_RECORD_FIELDS
            );
            options.min_fields = MIN_RECORD_FIELDS;
        }
        let state = match options.header {
            HeaderDetection::FixedLines(0) => ParserState::InData,
            _ => ParserState::SeekingHeader { skipped: 0 },
        };
        Self {
            reader,
            options,
            state,
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Lines consumed so far, preamble included.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Next record, or `None` once the stream is exhausted.
    ///
    /// [`ParseError::Malformed`] items can be skipped; after any other error
    /// the parser returns `None`.
    pub async fn next_record(&mut self) -> Option<Result<FieldRecord, ParseError>> {
        loop {
            if self.state == ParserState::Done {
                return None;
            }

            let line = match self.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    if let ParserState::SeekingHeader { skipped } = self.state {
                        tracing::debug!("Output ended inside the preamble after {skipped} lines");
                    }
                    self.state = ParserState::Done;
                    return None;
                }
                Err(e) => {
                    self.state = ParserState::Done;
                    return Some(Err(e));
                }
            };

            match self.state {
                ParserState::SeekingHeader { skipped } => {
                    let skipped = skipped + 1;
                    let done = match self.options.header {
                        HeaderDetection::Separator => is_separator(&line),
                        HeaderDetection::FixedLines(n) => skipped >= n,
                    };
                    self.state = if done {
                        tracing::trace!("Preamble ends at line {}", self.line_number);
                        ParserState::InData
                    } else {
                        ParserState::SeekingHeader { skipped }
                    };
                }
                ParserState::InData => {
                    if line.trim().is_empty() || is_separator(&line) {
                        continue;
                    }
                    // Reports from several servers repeat the banner and headings
                    if self.options.header == HeaderDetection::Separator && is_banner(&line) {
                        tracing::trace!("New report block at line {}", self.line_number);
                        self.state = ParserState::SeekingHeader { skipped: 1 };
                        continue;
                    }
                    let record = FieldRecord::from_line(&line);
                    if record.len() < self.options.min_fields {
                        return Some(Err(ParseError::Malformed(ParseWarning::TooFewFields {
                            line_number: self.line_number,
                            actual: record.len(),
                            expected: self.options.min_fields,
                            line,
                        })));
                    }
                    return Some(Ok(record));
                }
                ParserState::Done => return None,
            }
        }
    }

    /// Drain the stream, splitting records from errors.
    pub async fn parse_all(mut self) -> (Vec<FieldRecord>, Vec<ParseError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        while let Some(item) = self.next_record().await {
            match item {
                Ok(record) => records.push(record),
                Err(e) => errors.push(e),
            }
        }
        (records, errors)
    }

    /// Read one line without its terminator. `Ok(None)` at end of stream.
    async fn read_line(&mut self) -> Result<Option<String>, ParseError> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf);
        let n = match self.options.idle_timeout {
            Some(idle) => tokio::time::timeout(idle, read)
                .await
                .map_err(|_| ParseError::Stalled(idle))??,
            None => read.await?,
        };
        if n == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let mut line = self.buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest;
        }
        if let Some(rest) = line.strip_suffix(b"\r") {
            line = rest;
        }
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

/// A separator line holds at least one token and only runs of `-`.
fn is_separator(line: &str) -> bool {
    let mut tokens = line.split_whitespace().peekable();
    tokens.peek().is_some() && tokens.all(|t| t.bytes().all(|b| b == b'-'))
}

/// A server banner is a single token ending in `:`, as in `host.example.org:`.
fn is_banner(line: &str) -> bool {
    let mut tokens = line.split_whitespace();
    matches!((tokens.next(), tokens.next()), (Some(t), None) if t.len() > 1 && t.ends_with(':'))
}
