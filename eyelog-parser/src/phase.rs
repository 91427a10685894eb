//! Phase accumulator
//!
//! Buffers the samples of one open phase and turns them into finished trace
//! columns when the phase closes.

use crate::config::Channels;
use crate::trace::{Trace, TraceLabel, TracePipeline, Truncation};
use crate::types::{BlinkEvent, FixationEvent, RawSample};

/// Column-name prefixes of the fixation and blink lists, in column order
pub const EVENT_LIST_PREFIXES: [&str; 6] = [
    "fixxlist_",
    "fixylist_",
    "fixstlist_",
    "fixetlist_",
    "blinkstlist_",
    "blinketlist_",
];

/// True for columns holding tracker timestamps (shifted with the time origin)
pub fn is_time_column(column: &str) -> bool {
    [
        TraceLabel::Time.column_prefix(),
        "fixstlist_",
        "fixetlist_",
        "blinkstlist_",
        "blinketlist_",
    ]
    .iter()
    .any(|prefix| column.starts_with(prefix))
}

/// Sample buffers for the currently open phase
#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    /// Name used for the output columns (after renaming)
    name: String,
    /// Name as written in the log
    source_name: String,
    /// False if the phase filter rejected this phase
    retained: bool,
    /// Timestamp of the start message, if it carried one
    onset: Option<i64>,
    pupil: Trace,
    xcoor: Trace,
    ycoor: Trace,
    time: Vec<i64>,
    fixations: Vec<FixationEvent>,
    blinks: Vec<BlinkEvent>,
}

/// Finished columns of a closed phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseColumns {
    /// Storage name of the phase
    pub name: String,
    /// `(column name, values)` in column order
    pub columns: Vec<(String, Trace)>,
    /// Timestamp subtracted from the time columns (0 for absolute time)
    pub origin: i64,
    /// Longest truncation applied to any of the traces
    pub truncation: Option<Truncation>,
}

impl PhaseAccumulator {
    pub fn new(
        name: impl Into<String>,
        source_name: impl Into<String>,
        retained: bool,
        onset: Option<i64>,
    ) -> Self {
        Self {
            name: name.into(),
            source_name: source_name.into(),
            retained,
            onset,
            pupil: Vec::new(),
            xcoor: Vec::new(),
            ycoor: Vec::new(),
            time: Vec::new(),
            fixations: Vec::new(),
            blinks: Vec::new(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// True if the log names this phase either way
    pub fn matches(&self, name: &str) -> bool {
        self.source_name == name || self.name == name
    }

    /// Push one sample into all four buffers. Discarded if not retained.
    pub fn append(&mut self, sample: RawSample) {
        if !self.retained {
            return;
        }
        self.pupil.push(sample.pupil);
        self.xcoor.push(sample.x);
        self.ycoor.push(sample.y);
        self.time.push(sample.time);
    }

    pub fn push_fixation(&mut self, fixation: FixationEvent) {
        if self.retained {
            self.fixations.push(fixation);
        }
    }

    pub fn push_blink(&mut self, blink: BlinkEvent) {
        if self.retained {
            self.blinks.push(blink);
        }
    }

    /// Close the phase and build its columns.
    ///
    /// Returns `None` for a phase rejected by the filter. A phase without
    /// samples still yields (empty) columns.
    pub fn close(
        self,
        pipeline: &TracePipeline,
        channels: Channels,
        relative_time: bool,
        event_lists: bool,
    ) -> Option<PhaseColumns> {
        if !self.retained {
            return None;
        }

        let origin = if relative_time {
            self.onset.or_else(|| self.time.first().copied()).unwrap_or(0)
        } else {
            0
        };
        let sample_count = self.time.len();
        let time: Trace = self
            .time
            .iter()
            .map(|t| Some((t - origin) as f64))
            .collect();

        let mut raw = Vec::with_capacity(4);
        if channels.pupil {
            raw.push((TraceLabel::Pupil, self.pupil));
        }
        if channels.gaze {
            raw.push((TraceLabel::XCoor, self.xcoor));
            raw.push((TraceLabel::YCoor, self.ycoor));
        }
        if channels.emits_time() {
            raw.push((TraceLabel::Time, time));
        }

        let mut columns = Vec::with_capacity(raw.len() + EVENT_LIST_PREFIXES.len());
        let mut truncation: Option<Truncation> = None;
        for (label, trace) in raw {
            let (trace, truncated) = pipeline.run(label, trace);
            if let Some(t) = truncated {
                if truncation.map_or(true, |prev| t.original_len > prev.original_len) {
                    truncation = Some(t);
                }
            }
            columns.push((label.column_name(&self.name), trace));
        }

        if event_lists {
            let offset = |t: i64| Some((t - origin) as f64);
            let lists: [Trace; 6] = [
                self.fixations.iter().map(|f| f.x).collect(),
                self.fixations.iter().map(|f| f.y).collect(),
                self.fixations.iter().map(|f| offset(f.start)).collect(),
                self.fixations.iter().map(|f| offset(f.end)).collect(),
                self.blinks.iter().map(|b| offset(b.start)).collect(),
                self.blinks.iter().map(|b| offset(b.end)).collect(),
            ];
            for (prefix, list) in EVENT_LIST_PREFIXES.iter().zip(lists) {
                columns.push((format!("{}{}", prefix, self.name), list));
            }
        }

        log::trace!(
            "Closed phase '{}' with {} samples into {} columns",
            self.name,
            sample_count,
            columns.len()
        );

        Some(PhaseColumns {
            name: self.name,
            columns,
            origin,
            truncation,
        })
    }
}
