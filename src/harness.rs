//! Scripted conformance runs against a live server.
//!
//! A scenario is an ordered list of steps, each pairing a command with the
//! reply shape it must produce. Steps run strictly in sequence on a single
//! connection. A mismatched reply is recorded and the run continues, so one
//! regression does not mask later ones; a transport failure aborts the
//! remaining steps and fails the run as a whole.

use crate::cmd::{Command, Del, Expire, Get, Metrics, Persist, Set, Ttl};
use crate::{Client, Frame};

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// The reply shape a step must produce.
#[derive(Debug)]
pub enum Expect {
    /// A simple-string reply with exactly this text.
    Simple(&'static str),
    /// A bulk reply with exactly these bytes.
    Bulk(&'static [u8]),
    /// The nil bulk string.
    Nil,
    /// An integer reply with exactly this value.
    Int(i64),
    /// An integer reply within this inclusive range.
    IntRange(i64, i64),
    /// An integer reply equal to one of the listed values.
    IntIn(&'static [i64]),
    /// A metrics payload: any array or bulk reply. Content is opaque,
    /// except that counters must not decrease between snapshots.
    Metrics,
}

impl Expect {
    /// Whether `reply` satisfies this expectation's shape.
    pub fn matches(&self, reply: &Frame) -> bool {
        match (self, reply) {
            (Expect::Simple(want), Frame::Simple(got)) => got == want,
            (Expect::Bulk(want), Frame::Bulk(got)) => got.as_ref() == *want,
            (Expect::Nil, Frame::Null) => true,
            (Expect::Int(want), Frame::Integer(got)) => got == want,
            (Expect::IntRange(lo, hi), Frame::Integer(got)) => lo <= got && got <= hi,
            (Expect::IntIn(values), Frame::Integer(got)) => values.contains(got),
            (Expect::Metrics, Frame::Bulk(_)) | (Expect::Metrics, Frame::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Simple(want) => write!(fmt, "simple string \"{}\"", want),
            Expect::Bulk(want) => write!(fmt, "bulk string \"{}\"", want.escape_ascii()),
            Expect::Nil => "nil bulk string".fmt(fmt),
            Expect::Int(want) => write!(fmt, "integer {}", want),
            Expect::IntRange(lo, hi) => write!(fmt, "integer in {}..={}", lo, hi),
            Expect::IntIn(values) => {
                write!(fmt, "integer in {{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{}", value)?;
                }
                write!(fmt, "}}")
            }
            Expect::Metrics => "metrics payload (bulk string or array)".fmt(fmt),
        }
    }
}

/// One scenario step: a command and the reply it must produce.
#[derive(Debug)]
pub struct Step {
    command: Command,
    expect: Expect,
}

impl Step {
    /// Pair `command` with the reply shape it must produce.
    pub fn new(command: Command, expect: Expect) -> Step {
        Step { command, expect }
    }
}

/// How a single step ended.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// The reply satisfied the step's expectation.
    Passed,
    /// The reply decoded but did not satisfy the expectation, or the
    /// command could not be encoded.
    Failed,
    /// A transport failure struck while this step was in flight.
    Aborted,
    /// Never attempted; an earlier step aborted the run.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => "pass".fmt(fmt),
            Outcome::Failed => "FAIL".fmt(fmt),
            Outcome::Aborted => "abort".fmt(fmt),
            Outcome::Skipped => "skip".fmt(fmt),
        }
    }
}

/// The record of one executed (or skipped) step.
#[derive(Debug)]
pub struct StepReport {
    /// The command as a user would type it.
    pub command: String,
    /// Exact bytes sent on the wire. `None` when encoding failed or the
    /// step was skipped.
    pub sent: Option<Vec<u8>>,
    /// Description of the expected reply shape.
    pub expected: String,
    /// The decoded reply, when one arrived.
    pub reply: Option<Frame>,
    pub outcome: Outcome,
    /// Failure or abort diagnostics, when there are any.
    pub detail: Option<String>,
}

/// Aggregated result of a scenario run. Each step appears exactly once.
#[derive(Debug)]
pub struct Report {
    pub steps: Vec<StepReport>,
    /// The transport error that ended the run early, if any.
    pub fatal: Option<String>,
}

impl Report {
    /// Count of steps whose reply satisfied the expectation.
    pub fn passed(&self) -> usize {
        self.count(Outcome::Passed)
    }

    /// Count of steps whose reply decoded but missed the expectation.
    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    /// Count of steps lost to a transport failure, including the ones
    /// never attempted.
    pub fn aborted(&self) -> usize {
        self.count(Outcome::Aborted) + self.count(Outcome::Skipped)
    }

    /// Whether every step passed and the run finished.
    pub fn all_passed(&self) -> bool {
        self.fatal.is_none() && self.steps.iter().all(|step| step.outcome == Outcome::Passed)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome == outcome)
            .count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match &step.reply {
                Some(reply) => writeln!(
                    fmt,
                    "{:>2}. {:<5} {} -> {} (expected {})",
                    i + 1,
                    step.outcome,
                    step.command,
                    reply,
                    step.expected
                )?,
                None => writeln!(
                    fmt,
                    "{:>2}. {:<5} {} (expected {})",
                    i + 1,
                    step.outcome,
                    step.command,
                    step.expected
                )?,
            }

            if step.outcome != Outcome::Passed {
                if let Some(sent) = &step.sent {
                    writeln!(fmt, "       sent: {}", sent.escape_ascii())?;
                }
                if let Some(detail) = &step.detail {
                    writeln!(fmt, "       {}", detail)?;
                }
            }
        }

        writeln!(
            fmt,
            "{} passed, {} failed, {} aborted",
            self.passed(),
            self.failed(),
            self.aborted()
        )?;

        if let Some(fatal) = &self.fatal {
            writeln!(fmt, "run aborted: {}", fatal)?;
        }

        Ok(())
    }
}

/// Drives scenario steps over one connection and accumulates the report.
pub struct Harness {
    client: Client,
    /// Counter snapshot from the previous metrics step, if one ran.
    baseline: Option<BTreeMap<String, f64>>,
}

impl Harness {
    /// Wrap an already-connected client. Connecting is the caller's
    /// responsibility; a refused connection means there is no run at all.
    pub fn new(client: Client) -> Harness {
        Harness {
            client,
            baseline: None,
        }
    }

    /// Execute `steps` in order and return the aggregated report.
    ///
    /// The harness is consumed: when the run returns, the connection has
    /// been dropped, on the abort path as well as the happy one.
    pub async fn run(mut self, steps: Vec<Step>) -> Report {
        let mut report = Report {
            steps: Vec::with_capacity(steps.len()),
            fatal: None,
        };

        for step in steps {
            if report.fatal.is_some() {
                report.steps.push(StepReport {
                    command: step.command.to_string(),
                    sent: None,
                    expected: step.expect.to_string(),
                    reply: None,
                    outcome: Outcome::Skipped,
                    detail: None,
                });
                continue;
            }

            let executed = self.execute(step).await;

            if executed.outcome == Outcome::Aborted {
                report.fatal = executed.detail.clone();
            }

            report.steps.push(executed);
        }

        report
    }

    async fn execute(&mut self, step: Step) -> StepReport {
        let Step { command, expect } = step;

        let rendered = command.to_string();
        let expected = expect.to_string();

        // A command that cannot be framed fails its step before any I/O.
        let sent = match command.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                return StepReport {
                    command: rendered,
                    sent: None,
                    expected,
                    reply: None,
                    outcome: Outcome::Failed,
                    detail: Some(err.to_string()),
                }
            }
        };

        match self.client.request(command).await {
            Ok(reply) => {
                let (outcome, detail) = self.judge(&expect, &reply);

                debug!(step = %rendered, outcome = %outcome);

                StepReport {
                    command: rendered,
                    sent: Some(sent),
                    expected,
                    reply: Some(reply),
                    outcome,
                    detail,
                }
            }
            Err(err) => StepReport {
                command: rendered,
                sent: Some(sent),
                expected,
                reply: None,
                outcome: Outcome::Aborted,
                detail: Some(err.to_string()),
            },
        }
    }

    /// Shape check, plus the counter monotonicity check between metrics
    /// snapshots.
    fn judge(&mut self, expect: &Expect, reply: &Frame) -> (Outcome, Option<String>) {
        if !expect.matches(reply) {
            return (Outcome::Failed, None);
        }

        if let Expect::Metrics = expect {
            let snapshot = counters(reply);
            let regressed = self
                .baseline
                .take()
                .and_then(|baseline| regression(&baseline, &snapshot));

            self.baseline = Some(snapshot);

            if let Some((name, before, now)) = regressed {
                return (
                    Outcome::Failed,
                    Some(format!(
                        "counter {} went backwards: {} -> {}",
                        name, before, now
                    )),
                );
            }
        }

        (Outcome::Passed, None)
    }
}

/// The canonical ten-step scenario: mutation, expiration, introspection.
pub fn canonical_scenario() -> Vec<Step> {
    vec![
        Step::new(
            Set::new("key", Bytes::from_static(b"value")).into_command(),
            Expect::Simple("OK"),
        ),
        Step::new(Get::new("key").into_command(), Expect::Bulk(b"value")),
        Step::new(Expire::new("key", 10).into_command(), Expect::Int(1)),
        // Time-dependent, so a range rather than an exact value. `-1` and
        // `-2` are out of range: the key exists and has a timeout.
        Step::new(Ttl::new("key").into_command(), Expect::IntRange(0, 10)),
        Step::new(Persist::new("key").into_command(), Expect::IntIn(&[0, 1])),
        // The value must survive timeout removal.
        Step::new(Get::new("key").into_command(), Expect::Bulk(b"value")),
        Step::new(Metrics::new().into_command(), Expect::Metrics),
        Step::new(Del::new(&["key"]).into_command(), Expect::IntIn(&[0, 1])),
        Step::new(Get::new("key").into_command(), Expect::Nil),
        // Second snapshot; counters are compared against the first.
        Step::new(Metrics::new().into_command(), Expect::Metrics),
    ]
}

/// Extracts comparable counters from a metrics payload.
///
/// Samples are Prometheus-style `name{labels} value` lines. Only samples
/// whose base name is declared `# TYPE <name> counter` participate; when
/// the payload carries no type metadata at all, the `*_total` naming
/// convention is used instead. Gauges may legitimately decrease and are
/// never compared.
fn counters(frame: &Frame) -> BTreeMap<String, f64> {
    let mut declared = BTreeSet::new();
    let mut values = BTreeMap::new();

    collect(frame, &mut declared, &mut values);

    values.retain(|name, _| {
        let base = name.split('{').next().unwrap_or("");
        if declared.is_empty() {
            base.ends_with("_total")
        } else {
            declared.contains(base)
        }
    });

    values
}

fn collect(frame: &Frame, declared: &mut BTreeSet<String>, values: &mut BTreeMap<String, f64>) {
    match frame {
        Frame::Bulk(data) => scan(&String::from_utf8_lossy(data), declared, values),
        Frame::Simple(text) => scan(text, declared, values),
        Frame::Array(items) => {
            for item in items {
                collect(item, declared, values);
            }
        }
        _ => {}
    }
}

fn scan(text: &str, declared: &mut BTreeSet<String>, values: &mut BTreeMap<String, f64>) {
    for line in text.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("# TYPE ") {
            let mut fields = rest.split_whitespace();
            if let (Some(name), Some("counter")) = (fields.next(), fields.next()) {
                declared.insert(name.to_string());
            }
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((name, value)) = line.rsplit_once(' ') {
            if let Ok(value) = value.trim().parse::<f64>() {
                values.insert(name.trim().to_string(), value);
            }
        }
    }
}

/// The first counter that decreased between snapshots, if any.
fn regression(
    before: &BTreeMap<String, f64>,
    after: &BTreeMap<String, f64>,
) -> Option<(String, f64, f64)> {
    for (name, prev) in before {
        if let Some(now) = after.get(name) {
            if now < prev {
                return Some((name.clone(), *prev, *now));
            }
        }
    }

    None
}
