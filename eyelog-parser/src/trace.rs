//! Trace post-processing
//!
//! A trace is one channel of a closed phase, with `None` marking samples
//! without data. Every trace passes through a [`TracePipeline`] before it is
//! stored: first the installed [`TraceProcessor`] (blink reconstruction and
//! downsampling for the built-in one), then truncation to the configured
//! maximum length.

use std::fmt;
use std::sync::Arc;

/// One channel of samples; `None` is a missing value
pub type Trace = Vec<Option<f64>>;

/// Which signal a trace carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceLabel {
    Pupil,
    XCoor,
    YCoor,
    Time,
}

impl TraceLabel {
    /// Labels in column order
    pub const ALL: [TraceLabel; 4] = [
        TraceLabel::Pupil,
        TraceLabel::XCoor,
        TraceLabel::YCoor,
        TraceLabel::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLabel::Pupil => "pupil",
            TraceLabel::XCoor => "xcoor",
            TraceLabel::YCoor => "ycoor",
            TraceLabel::Time => "time",
        }
    }

    /// Column name prefix, e.g. `ptrace_`
    pub fn column_prefix(&self) -> &'static str {
        match self {
            TraceLabel::Pupil => "ptrace_",
            TraceLabel::XCoor => "xtrace_",
            TraceLabel::YCoor => "ytrace_",
            TraceLabel::Time => "ttrace_",
        }
    }

    /// Full column name for a phase
    pub fn column_name(&self, phase: &str) -> String {
        format!("{}{}", self.column_prefix(), phase)
    }
}

impl fmt::Display for TraceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transform applied to every trace of a closed phase
///
/// Implementations must preserve index alignment across labels: whatever is
/// done to the length of one label must be done to all of them.
pub trait TraceProcessor: Send + Sync {
    fn process(&self, label: TraceLabel, trace: Trace) -> Trace;
}

impl<F> TraceProcessor for F
where
    F: Fn(TraceLabel, Trace) -> Trace + Send + Sync,
{
    fn process(&self, label: TraceLabel, trace: Trace) -> Trace {
        self(label, trace)
    }
}

/// Leaves traces untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl TraceProcessor for IdentityProcessor {
    fn process(&self, _label: TraceLabel, trace: Trace) -> Trace {
        trace
    }
}

/// Built-in processor: blink reconstruction, then downsampling
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTraceProcessor {
    pub blink_reconstruct: bool,
    pub blink_max_gap: Option<usize>,
    pub downsample: Option<usize>,
}

impl TraceProcessor for DefaultTraceProcessor {
    fn process(&self, label: TraceLabel, trace: Trace) -> Trace {
        let trace = if self.blink_reconstruct && label != TraceLabel::Time {
            blink_reconstruct(&trace, self.blink_max_gap)
        } else {
            trace
        };
        match self.downsample {
            Some(factor) if factor > 1 => downsample(&trace, factor),
            _ => trace,
        }
    }
}

/// Fill missing runs by linear interpolation between the valid samples on
/// either side.
///
/// Runs touching the start or end of the trace stay missing. With `max_gap`,
/// runs longer than that many samples also stay missing.
pub fn blink_reconstruct(trace: &[Option<f64>], max_gap: Option<usize>) -> Trace {
    let mut out = trace.to_vec();
    let mut i = 0;
    while i < out.len() {
        if out[i].is_some() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < out.len() && out[i].is_none() {
            i += 1;
        }
        let run_len = i - run_start;
        if run_start == 0 || i == out.len() {
            continue;
        }
        if max_gap.is_some_and(|gap| run_len > gap) {
            continue;
        }
        if let (Some(before), Some(after)) = (out[run_start - 1], out[i]) {
            let step = (after - before) / (run_len + 1) as f64;
            for (k, slot) in out[run_start..i].iter_mut().enumerate() {
                *slot = Some(before + step * (k + 1) as f64);
            }
        }
    }
    out
}

/// Block-average by an integer factor.
///
/// Each block of `factor` samples becomes the mean of its valid samples, or
/// missing if it has none. A trailing partial block is dropped so every trace
/// of equal input length gives `len / factor` samples.
pub fn downsample(trace: &[Option<f64>], factor: usize) -> Trace {
    if factor <= 1 {
        return trace.to_vec();
    }
    trace
        .chunks_exact(factor)
        .map(|block| {
            let (sum, count) = block
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            if count == 0 {
                None
            } else {
                Some(sum / count as f64)
            }
        })
        .collect()
}

/// Record of a truncated trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    pub original_len: usize,
    pub max_len: usize,
}

/// Processor plus length limit, applied in that order
#[derive(Clone)]
pub struct TracePipeline {
    processor: Arc<dyn TraceProcessor>,
    max_len: Option<usize>,
}

impl TracePipeline {
    pub fn new(processor: Arc<dyn TraceProcessor>, max_len: Option<usize>) -> Self {
        Self { processor, max_len }
    }

    /// Pipeline that stores traces unchanged
    pub fn identity() -> Self {
        Self::new(Arc::new(IdentityProcessor), None)
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    /// Replace the processor, keeping the length limit
    pub fn with_processor(mut self, processor: Arc<dyn TraceProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Process one trace; reports a truncation if the limit was hit
    pub fn run(&self, label: TraceLabel, trace: Trace) -> (Trace, Option<Truncation>) {
        let mut trace = self.processor.process(label, trace);
        match self.max_len {
            Some(max_len) if trace.len() > max_len => {
                let original_len = trace.len();
                trace.truncate(max_len);
                (
                    trace,
                    Some(Truncation {
                        original_len,
                        max_len,
                    }),
                )
            }
            _ => (trace, None),
        }
    }
}

impl fmt::Debug for TracePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePipeline")
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}
