/// Log aggregation: one pass over a structured log, classifying each record
/// and folding it into cache counters and the fetch latency series.
use crate::buckets::WindowTracker;
use crate::config::{Classifier, IngestConfig, MalformedPolicy};
use crate::record::{self, CacheEvent, Record};
use std::io::BufRead;
use std::path::Path;

/// Options controlling one ingestion pass.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub on_malformed: MalformedPolicy,
    pub classify_by: Classifier,
    pub max_span_secs: Option<f64>,
    pub track_windows: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            on_malformed: MalformedPolicy::Abort,
            classify_by: Classifier::Line,
            max_span_secs: None,
            track_windows: false,
        }
    }
}

impl From<&IngestConfig> for IngestOptions {
    fn from(c: &IngestConfig) -> Self {
        Self {
            on_malformed: c.on_malformed,
            classify_by: c.classify_by,
            max_span_secs: c.max_span_secs,
            track_windows: c.track_windows,
        }
    }
}

/// Whether the caller should keep feeding lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The configured time span has been exceeded.
    Stop,
}

/// Totals over "fetch response" records.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResponseTotals {
    pub count: u64,
    pub length: u64,
    pub time: f64,
}

/// Running aggregates for one log.
#[derive(Debug, Default)]
pub struct LogAggregator {
    pub cache_miss: u64,
    pub cache_hit: u64,
    pub cached_bytes: u64,
    pub read_bytes: u64,
    pub cached_samples: u64,
    pub read_samples: u64,
    /// Fetch response latencies in seconds, in input order.
    pub times: Vec<f64>,
    pub responses: ResponseTotals,
    /// Lines dropped under the skip policy.
    pub skipped: u64,
    pub lines: u64,
    windows: Option<WindowTracker>,
    options: IngestOptions,
    start_ts: Option<f64>,
}

/// Everything one record contributes, read out before any mutation so a
/// failing record leaves the aggregates untouched. Sums hold the new totals.
#[derive(Debug, Default)]
struct Update {
    start_ts: Option<f64>,
    cache: Option<(CacheEvent, u64, u64)>,
    response: Option<(f64, u64)>,
    query: Option<(String, f64)>,
}

impl LogAggregator {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            windows: options.track_windows.then(WindowTracker::new),
            options,
            ..Default::default()
        }
    }

    /// Window tracker, present only when tracking was enabled.
    pub fn windows(&self) -> Option<&WindowTracker> {
        self.windows.as_ref()
    }

    /// Fold one raw line into the aggregates.
    ///
    /// Lines not starting with `{` are ignored. Decode and field errors are
    /// returned under the abort policy, and counted in `skipped` otherwise.
    pub fn ingest(&mut self, line: &str) -> Result<Flow, IngestError> {
        self.ingest_bytes(line.as_bytes())
    }

    /// Like `ingest`, for a line not yet known to be UTF-8. Only `{` lines
    /// are decoded, so binary banners are ignored like any other.
    pub fn ingest_bytes(&mut self, raw: &[u8]) -> Result<Flow, IngestError> {
        self.lines += 1;
        if raw.first() != Some(&b'{') {
            return Ok(Flow::Continue);
        }
        let line_no = self.lines;
        let result = std::str::from_utf8(raw)
            .map_err(|source| IngestError::InvalidUtf8 {
                line: line_no,
                source,
            })
            .and_then(|line| self.ingest_record(line));
        match result {
            Ok(flow) => Ok(flow),
            Err(e) if self.options.on_malformed == MalformedPolicy::Skip => {
                tracing::warn!("skipping line: {e}");
                self.skipped += 1;
                Ok(Flow::Continue)
            }
            Err(e) => Err(e),
        }
    }

    fn ingest_record(&mut self, line: &str) -> Result<Flow, IngestError> {
        let record = Record::parse(line).map_err(|source| IngestError::MalformedRecord {
            line: self.lines,
            source,
        })?;

        let mut update = Update::default();
        if let Some(limit) = self.options.max_span_secs {
            if let Some(ts) = record.ts() {
                let start = self.start_ts.unwrap_or(ts);
                if ts - start >= limit {
                    tracing::debug!(line = self.lines, ts, start, "time span reached, stopping");
                    return Ok(Flow::Stop);
                }
                update.start_ts = Some(start);
            }
        }

        let kinds = record::classify(self.options.classify_by, line, &record);
        if let Some(event) = kinds.cache {
            let bytes = self.required_u64(&record, "bytes")?;
            let samples = self.optional_u64(&record, "num_samples")?;
            let (bytes_total, samples_total) = match event {
                CacheEvent::Miss => (self.read_bytes, self.read_samples),
                CacheEvent::Hit => (self.cached_bytes, self.cached_samples),
            };
            update.cache = Some((
                event,
                self.add(bytes_total, bytes, "bytes")?,
                self.add(samples_total, samples, "num_samples")?,
            ));
        }
        if kinds.response {
            let elapsed = self.required_f64(&record, "elapsed")?;
            let length = self.optional_u64(&record, "prom_result_len")?;
            update.response = Some((
                elapsed,
                self.add(self.responses.length, length, "prom_result_len")?,
            ));
        }
        if kinds.query && self.windows.is_some() {
            let range = self.required_f64(&record, "range")?;
            let key = self.required_str(&record, "key")?;
            update.query = Some((key.to_string(), range));
        }

        self.apply(update);
        Ok(Flow::Continue)
    }

    fn apply(&mut self, update: Update) {
        if update.start_ts.is_some() {
            self.start_ts = update.start_ts;
        }
        match update.cache {
            Some((CacheEvent::Miss, bytes, samples)) => {
                self.cache_miss += 1;
                self.read_bytes = bytes;
                self.read_samples = samples;
            }
            Some((CacheEvent::Hit, bytes, samples)) => {
                self.cache_hit += 1;
                self.cached_bytes = bytes;
                self.cached_samples = samples;
            }
            None => {}
        }
        if let Some((elapsed, length)) = update.response {
            self.times.push(elapsed);
            self.responses.count += 1;
            self.responses.length = length;
            self.responses.time += elapsed;
        }
        if let (Some((key, range)), Some(windows)) = (update.query, self.windows.as_mut()) {
            windows.record(&key, range);
        }
    }

    fn add(&self, total: u64, value: u64, field: &'static str) -> Result<u64, IngestError> {
        total.checked_add(value).ok_or(IngestError::Overflow {
            line: self.lines,
            field,
        })
    }

    fn required_u64(&self, record: &Record, field: &'static str) -> Result<u64, IngestError> {
        let value = record.get(field).ok_or(IngestError::MissingField {
            line: self.lines,
            field,
        })?;
        value.as_u64().ok_or(IngestError::InvalidField {
            line: self.lines,
            field,
            expected: "non-negative integer",
        })
    }

    fn optional_u64(&self, record: &Record, field: &'static str) -> Result<u64, IngestError> {
        match record.get(field) {
            None => Ok(0),
            Some(_) => self.required_u64(record, field),
        }
    }

    fn required_f64(&self, record: &Record, field: &'static str) -> Result<f64, IngestError> {
        let value = record.get(field).ok_or(IngestError::MissingField {
            line: self.lines,
            field,
        })?;
        value.as_f64().ok_or(IngestError::InvalidField {
            line: self.lines,
            field,
            expected: "number",
        })
    }

    fn required_str<'r>(
        &self,
        record: &'r Record,
        field: &'static str,
    ) -> Result<&'r str, IngestError> {
        let value = record.get(field).ok_or(IngestError::MissingField {
            line: self.lines,
            field,
        })?;
        value.as_str().ok_or(IngestError::InvalidField {
            line: self.lines,
            field,
            expected: "string",
        })
    }

    /// cache_hit / (cache_hit + cache_miss), or None with no cache lookups.
    pub fn hit_rate(&self) -> Option<f64> {
        ratio(self.cache_hit, self.cache_miss)
    }

    /// cached_bytes / (cached_bytes + read_bytes).
    pub fn byte_ratio(&self) -> Option<f64> {
        ratio(self.cached_bytes, self.read_bytes)
    }

    /// cached_samples / (cached_samples + read_samples).
    pub fn sample_ratio(&self) -> Option<f64> {
        ratio(self.cached_samples, self.read_samples)
    }
}

/// part / (part + rest), summed in f64 so near-max totals don't overflow.
fn ratio(part: u64, rest: u64) -> Option<f64> {
    if part == 0 && rest == 0 {
        None
    } else {
        Some(part as f64 / (part as f64 + rest as f64))
    }
}

/// Feed every line of `reader` through a fresh aggregator.
pub fn aggregate_reader<R: BufRead>(
    mut reader: R,
    options: IngestOptions,
) -> Result<LogAggregator, IngestError> {
    let mut agg = LogAggregator::new(options);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(IngestError::Io)? == 0 {
            break;
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        if agg.ingest_bytes(&buf)? == Flow::Stop {
            break;
        }
    }
    tracing::debug!(
        lines = agg.lines,
        cache_miss = agg.cache_miss,
        cache_hit = agg.cache_hit,
        responses = agg.times.len(),
        skipped = agg.skipped,
        "ingestion finished"
    );
    Ok(agg)
}

/// Open `path` and aggregate it.
pub fn aggregate_file(path: &Path, options: IngestOptions) -> Result<LogAggregator, IngestError> {
    let file = std::fs::File::open(path).map_err(IngestError::Io)?;
    aggregate_reader(std::io::BufReader::new(file), options)
}

#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    /// A `{` line that is not a valid JSON object.
    MalformedRecord {
        line: u64,
        source: serde_json::Error,
    },
    /// A `{` line that is not valid UTF-8.
    InvalidUtf8 {
        line: u64,
        source: std::str::Utf8Error,
    },
    MissingField {
        line: u64,
        field: &'static str,
    },
    InvalidField {
        line: u64,
        field: &'static str,
        expected: &'static str,
    },
    /// Adding this record's value would overflow a running total.
    Overflow {
        line: u64,
        field: &'static str,
    },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "I/O error reading log: {e}"),
            IngestError::MalformedRecord { line, source } => {
                write!(f, "line {line}: malformed record: {source}")
            }
            IngestError::InvalidUtf8 { line, source } => {
                write!(f, "line {line}: record is not valid UTF-8: {source}")
            }
            IngestError::Overflow { line, field } => {
                write!(f, "line {line}: total of `{field}` overflows")
            }
            IngestError::MissingField { line, field } => {
                write!(f, "line {line}: missing required field `{field}`")
            }
            IngestError::InvalidField {
                line,
                field,
                expected,
            } => write!(f, "line {line}: field `{field}` is not a {expected}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io(e) => Some(e),
            IngestError::MalformedRecord { source, .. } => Some(source),
            IngestError::InvalidUtf8 { source, .. } => Some(source),
            IngestError::MissingField { .. }
            | IngestError::InvalidField { .. }
            | IngestError::Overflow { .. } => None,
        }
    }
}
