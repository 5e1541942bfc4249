/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Thread-local instrumentation for taskgraph's preprocessor, scheduler and backends: RAII
//! scoped timers for hot-path operations, plus a tally of how many tasks landed in each terminal
//! status, since a timing table alone doesn't say whether a run actually got anything done.
//!
//! Both are disabled by default; call [`enable`] once (typically from a test harness or a host
//! application) to start aggregating. [`scoped_metric!`] and [`record_outcome`] are a no-op
//! beyond a single atomic load when disabled.

use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread_local,
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct Metric {
    name: &'static str,
    count: usize,
    sum_micros: u128,
}

impl Metric {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.sum_micros += elapsed.as_micros();
    }
}

/// A running timer started by [`scoped_metric!`]; records its elapsed time on drop.
pub struct ScopedMetric {
    metric_index: usize,
    start: Instant,
}

impl ScopedMetric {
    pub fn new(metric_index: usize) -> Self {
        ScopedMetric {
            metric_index,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedMetric {
    fn drop(&mut self) {
        METRICS.with(|m| {
            m.borrow_mut()
                .record(self.metric_index, self.start.elapsed())
        });
    }
}

/// A tally of how many tasks this thread has reported under each terminal status name
/// (`"success"`, `"failure"`, `"aborted"`, `"skipped"`). Kept as plain name-keyed counters, not
/// an enum, so this crate stays independent of `taskgraph-core`'s `TaskStatus`.
#[derive(Debug, Default)]
struct OutcomeTally {
    outcomes: Vec<(&'static str, usize)>,
}

impl OutcomeTally {
    fn record(&mut self, outcome: &'static str) {
        match self.outcomes.iter_mut().find(|(name, _)| *name == outcome) {
            Some((_, count)) => *count += 1,
            None => self.outcomes.push((outcome, 1)),
        }
    }
}

impl fmt::Display for OutcomeTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.outcomes.is_empty() {
            return Ok(());
        }
        let mut name_width = 7; // To fit "outcome".
        for (name, _) in &self.outcomes {
            name_width = std::cmp::max(name_width, name.len());
        }
        writeln!(f, "{:name_width$} {:>6}", "outcome", "count", name_width = name_width)?;
        writeln!(f, "{:-<name_width$} {:-^6}", "", "", name_width = name_width)?;
        for (name, count) in &self.outcomes {
            writeln!(f, "{:name_width$} {: >6}", name, count, name_width = name_width)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Metrics {
    metrics: Vec<Metric>,
    outcomes: OutcomeTally,
}

impl Metrics {
    fn new_metric(&mut self, name: &'static str) -> usize {
        let len = self.metrics.len();
        self.metrics.push(Metric {
            name,
            ..Default::default()
        });
        len
    }

    fn record(&mut self, i: usize, elapsed: Duration) {
        self.metrics[i].record(elapsed);
    }

    fn record_outcome(&mut self, outcome: &'static str) {
        self.outcomes.record(outcome);
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics = &self.metrics;

        let mut name_width = 7; // To fit "metric ".
        for metric in metrics {
            name_width = std::cmp::max(name_width, metric.name.len());
        }
        writeln!(
            f,
            "{:name_width$} {:>6} {:>9} {:>11}",
            "metric ",
            "count",
            "avg (us)",
            "total (us)",
            name_width = name_width
        )?;
        writeln!(
            f,
            "{:-<name_width$} {:-^6} {:-^9} {:-^11}",
            "",
            "",
            "",
            "",
            name_width = name_width
        )?;
        for metric in metrics {
            writeln!(
                f,
                "{:name_width$} {: >6} {:>9.3} {:>11}",
                metric.name,
                metric.count,
                metric.sum_micros as f64 / metric.count as f64,
                metric.sum_micros,
                name_width = name_width
            )?;
        }
        if !self.outcomes.outcomes.is_empty() {
            writeln!(f)?;
            write!(f, "{}", self.outcomes)?;
        }
        Ok(())
    }
}

/// Times the enclosing scope under `$name` when metrics are [`enable`]d.
///
/// Used at the granularity of one invocation of a hot-path operation, e.g.
/// `scoped_metric!("dispatch")` around a single dispatch call, or
/// `scoped_metric!("cycle_detection")` around one `cycle_detection` call.
#[macro_export]
macro_rules! scoped_metric {
    ($name:literal) => {
        let _scoped_metric = if $crate::is_enabled() {
            thread_local! {
                static METRIC_INDEX: usize = $crate::new_metric($name);
            }
            ::core::option::Option::Some($crate::ScopedMetric::new(
                METRIC_INDEX.with(|m| *m),
            ))
        } else {
            ::core::option::Option::None
        };
    };
}

thread_local! {
    static METRICS: RefCell<Metrics> = RefCell::new(Metrics::default());
}
static ENABLED: AtomicBool = AtomicBool::new(false);

/// Turns scoped-metric recording on for the calling thread's entire process lifetime.
pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Writes the accumulated scope-timer table, followed by the outcome tally, for the *current
/// thread* to stderr.
///
/// Both are thread-local, matching the fact that each backend worker thread runs its own slice
/// of task bodies; callers that want a global picture must dump from every worker.
pub fn dump() {
    METRICS.with(|m| {
        eprintln!("{}", m.borrow());
    })
}

pub fn new_metric(name: &'static str) -> usize {
    METRICS.with(|m| m.borrow_mut().new_metric(name))
}

/// Tallies one task's terminal status under a fixed name (`"success"`, `"failure"`, `"aborted"`,
/// `"skipped"`), when metrics are [`enable`]d. Called once per completion from the scheduler's
/// dispatch loop.
pub fn record_outcome(outcome: &'static str) {
    if is_enabled() {
        METRICS.with(|m| m.borrow_mut().record_outcome(outcome));
    }
}
