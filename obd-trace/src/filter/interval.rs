//! Closed time intervals and disjoint interval sets

use serde::Serialize;

/// Closed interval `[start, end]` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn shifted(&self, delta: f64) -> Self {
        Self::new(self.start + delta, self.end + delta)
    }
}

/// Sorted, pairwise-disjoint intervals
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered intervals around every run of hits
    ///
    /// `times` must be sorted. Each maximal run of `true` becomes
    /// `[t_first - buffer, t_last + buffer]`. Runs come out in time order, so
    /// overlapping neighbours are merged in the same pass.
    pub fn from_hits(times: &[f64], hits: &[bool], buffer: f64) -> Self {
        let buffer = buffer.max(0.0);
        let mut intervals = Vec::new();
        let mut run: Option<(f64, f64)> = None;

        for (&t, &hit) in times.iter().zip(hits) {
            if hit {
                run = Some(match run {
                    Some((first, _)) => (first, t),
                    None => (t, t),
                });
            } else if let Some((first, last)) = run.take() {
                push_merged(&mut intervals, Interval::new(first - buffer, last + buffer));
            }
        }
        if let Some((first, last)) = run {
            push_merged(&mut intervals, Interval::new(first - buffer, last + buffer));
        }

        Self { intervals }
    }

    /// Sort by start, then merge overlapping or touching intervals
    pub fn from_unsorted(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut raw: Vec<Interval> = intervals
            .into_iter()
            .filter(|iv| !iv.start.is_nan() && !iv.end.is_nan() && iv.start <= iv.end)
            .collect();
        raw.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged = Vec::with_capacity(raw.len());
        for iv in raw {
            push_merged(&mut merged, iv);
        }
        Self { intervals: merged }
    }

    /// Union of several sets
    pub fn union<'a>(sets: impl IntoIterator<Item = &'a IntervalSet>) -> Self {
        Self::from_unsorted(sets.into_iter().flat_map(|set| set.intervals.iter().copied()))
    }

    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            intervals: self.intervals.iter().map(|iv| iv.shifted(delta)).collect(),
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Binary search for the interval covering `t`
    pub fn contains(&self, t: f64) -> bool {
        let k = self.intervals.partition_point(|iv| iv.start <= t);
        k > 0 && self.intervals[k - 1].end >= t
    }

    /// Membership of each sorted timestamp, in one sweep
    pub fn mask(&self, times: &[f64]) -> Vec<bool> {
        let mut k = 0usize;
        times
            .iter()
            .map(|&t| {
                while k < self.intervals.len() && self.intervals[k].end < t {
                    k += 1;
                }
                k < self.intervals.len() && self.intervals[k].start <= t
            })
            .collect()
    }
}

fn push_merged(out: &mut Vec<Interval>, iv: Interval) {
    match out.last_mut() {
        Some(last) if iv.start <= last.end => last.end = last.end.max(iv.end),
        _ => out.push(iv),
    }
}
