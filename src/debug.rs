use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use serde_derive::Serialize;
use tracing::{debug, info};
use crate::core::{Error, Role};
use crate::engine::{FailureKind, SearchEvent, StepObserver};
use crate::geometry::Cell;
use crate::ledger::Ledger;
use crate::placement::Placement;

pub struct NullObserver;

impl StepObserver for NullObserver {
    fn after_step(&mut self, _event: &SearchEvent, _ledger: &Ledger) {}
}

enum TimerState {
    Init,
    // With the time it was started
    Running(Instant),
    // With the duration from start to end
    Ended(Duration),
}

impl TimerState {
    fn new() -> Self { Self::Init }

    fn start(&mut self) {
        if let TimerState::Init = self {
            *self = TimerState::Running(Instant::now());
        }
    }

    fn end(&mut self) {
        if let TimerState::Running(s) = self {
            *self = TimerState::Ended(s.elapsed());
        }
    }

    fn to_duration(&self) -> Duration {
        match self {
            TimerState::Init => Duration::ZERO,
            TimerState::Running(s) => s.elapsed(),
            TimerState::Ended(d) => *d,
        }
    }
}

#[derive(PartialEq, Clone, Debug, Serialize)]
pub struct Histogram {
    pub value_counts: HashMap<usize, usize>,
    pub total: i32,
    pub count: i32,
    pub max: i32,
    pub max_count: i32,
    pub mean: f32,
    pub median: f32,
}

impl Histogram {
    pub fn from_value_counts(value_to_count: &HashMap<usize, usize>) -> Histogram {
        let mut val_counts = value_to_count.iter().map(|(v, c)| (*v as i32, *c as i32)).collect::<Vec<_>>();
        val_counts.sort();
        let total = val_counts.iter().fold(0, |n, (v, c)| n + v*c);
        let count = val_counts.iter().fold(0, |n, (_, c)| n + c);
        let max = val_counts.iter().fold(0, |n, (v, _)| std::cmp::max(*v, n));
        let max_count = val_counts.iter().fold(0, |n, (_, c)| std::cmp::max(*c, n));
        let mean = if count > 0 { (total as f32)/(count as f32) } else { 0.0 };
        let median_lo_index = (count - 1) / 2;
        let median_hi_index = count / 2;
        let mut median_lo = None;
        let mut median_hi = None;
        let mut n = 0;
        for (v, c) in val_counts {
            let next_n = n + c;
            if median_lo.is_none() && median_lo_index < next_n {
                median_lo = Some(v);
            }
            if median_hi.is_none() && median_hi_index < next_n {
                median_hi = Some(v);
            }
            n = next_n;
            if median_lo.is_some() && median_hi.is_some() {
                break;
            }
        }
        let median = (median_lo.unwrap_or(0) as f32 + median_hi.unwrap_or(0) as f32)/2.0;
        Histogram { value_counts: value_to_count.clone(), total, count, max, max_count, mean, median }
    }
}

enum SampleState {
    Never,
    AtEnd,
    EveryN(usize, usize),
    Time(Duration, Instant),
}

/// Decides which search events are worth reporting.
pub struct Sample {
    state: SampleState,
}

impl Sample {
    pub fn never() -> Self {
        Self { state: SampleState::Never }
    }

    pub fn at_end() -> Self {
        Self { state: SampleState::AtEnd }
    }

    pub fn every_n(n: usize) -> Self {
        Self { state: SampleState::EveryN(n, 0) }
    }

    pub fn time(every: Duration) -> Self {
        Self { state: SampleState::Time(every, Instant::now()) }
    }

    pub fn sample(&mut self, event: &SearchEvent) -> bool {
        let done = matches!(event, SearchEvent::Finished { .. });
        match &mut self.state {
            SampleState::Never => false,
            SampleState::AtEnd => done,
            SampleState::EveryN(n, count) => {
                *count += 1;
                if count >= n || done {
                    *count = 0;
                    true
                } else {
                    false
                }
            },
            SampleState::Time(every, last) => {
                if last.elapsed() >= *every || done {
                    *last = Instant::now();
                    true
                } else {
                    false
                }
            },
        }
    }
}

#[derive(Serialize)]
struct StatsDump<'a> {
    steps: usize,
    seconds: f64,
    rejections: &'a BTreeMap<String, usize>,
    histograms: BTreeMap<&'static str, Histogram>,
}

/// Observer that logs sampled events and keeps histograms of how the search
/// moves: streaks of commits, streaks of rollbacks, how much each rollback
/// undoes and how deep the stack is at each step.
pub struct DbgObserver {
    timer: TimerState,
    print_sample: Sample,
    stat: Option<(String, Sample)>,
    advance_hist: HashMap<usize, usize>,
    backtrack_hist: HashMap<usize, usize>,
    undone_hist: HashMap<usize, usize>,
    depth_hist: HashMap<usize, usize>,
    rejections: BTreeMap<String, usize>,
    prev: Option<SearchEvent>,
    streak: usize,
    steps: usize,
}

impl DbgObserver {
    pub fn new() -> Self {
        DbgObserver {
            timer: TimerState::new(),
            print_sample: Sample::every_n(1),
            stat: None,
            advance_hist: HashMap::new(),
            backtrack_hist: HashMap::new(),
            undone_hist: HashMap::new(),
            depth_hist: HashMap::new(),
            rejections: BTreeMap::new(),
            prev: None,
            streak: 0,
            steps: 0,
        }
    }

    pub fn sample_print(&mut self, sample: Sample) -> &mut Self {
        self.print_sample = sample;
        self
    }

    pub fn sample_stats<Str: Into<String>>(&mut self, filename: Str, sample: Sample) -> &mut Self {
        self.stat = Some((filename.into(), sample));
        self
    }

    pub fn steps(&self) -> usize { self.steps }

    pub fn rejections(&self, kind: FailureKind) -> usize {
        self.rejections.get(&kind.to_string()).copied().unwrap_or(0)
    }

    pub fn backtrack_histogram(&self) -> Histogram {
        Histogram::from_value_counts(&self.backtrack_hist)
    }

    fn is_advance(event: &SearchEvent) -> bool {
        matches!(event, SearchEvent::Seeded { .. } | SearchEvent::Committed { .. } | SearchEvent::Linked { .. })
    }

    fn update_stats(&mut self, event: &SearchEvent, ledger: &Ledger) {
        match event {
            e if Self::is_advance(e) => {
                if self.prev.as_ref().map_or(false, Self::is_advance) {
                    self.streak += 1;
                } else {
                    self.streak = 1;
                }
                *self.advance_hist.entry(self.streak).or_default() += 1;
            },
            SearchEvent::RolledBack { undone, .. } => {
                if let Some(SearchEvent::RolledBack { .. }) = self.prev {
                    self.streak += 1;
                } else {
                    self.streak = 1;
                }
                *self.backtrack_hist.entry(self.streak).or_default() += 1;
                *self.undone_hist.entry(*undone).or_default() += 1;
            },
            SearchEvent::Rejected { kind, .. } => {
                *self.rejections.entry(kind.to_string()).or_default() += 1;
            },
            _ => {},
        }
        self.prev = Some(*event);
        *self.depth_hist.entry(ledger.depth()).or_default() += 1;
        self.steps += 1;
    }

    pub fn dump_stats(&self, filename: &str) -> Result<(), Error> {
        let mut histograms = BTreeMap::new();
        for (name, counts) in [
            ("advance_streaks", &self.advance_hist),
            ("backtrack_streaks", &self.backtrack_hist),
            ("entries_undone", &self.undone_hist),
            ("stack_depth", &self.depth_hist),
        ] {
            histograms.insert(name, Histogram::from_value_counts(counts));
        }
        let dump = StatsDump {
            steps: self.steps,
            seconds: self.timer.to_duration().as_secs_f64(),
            rejections: &self.rejections,
            histograms,
        };
        std::fs::write(filename, serde_json::to_string_pretty(&dump)?)?;
        Ok(())
    }

    pub fn print(&self, event: &SearchEvent, ledger: &Ledger) {
        let elapsed = self.timer.to_duration().as_secs_f64();
        match event {
            SearchEvent::Finished { solved, progress } => {
                info!(solved, %progress, steps = self.steps, elapsed, "search finished");
            },
            _ => debug!(depth = ledger.depth(), elapsed, "{:?}", event),
        }
    }
}

impl StepObserver for DbgObserver {
    fn after_step(&mut self, event: &SearchEvent, ledger: &Ledger) {
        self.timer.start();
        if let SearchEvent::Finished { .. } = event {
            self.timer.end();
        }
        self.update_stats(event, ledger);
        if self.print_sample.sample(event) {
            self.print(event, ledger);
        }
        if let Some((f, s)) = &mut self.stat {
            let filename = f.clone();
            if s.sample(event) {
                if let Err(e) = self.dump_stats(&filename) {
                    tracing::warn!("failed to dump stats: {}", e);
                }
            }
        }
    }
}

/// Draws placements as text: `#` wall, `.` room floor, `+` connector floor.
/// Floor wins over wall where they meet.
pub fn render_ascii(placements: &[Placement]) -> String {
    let mut room_floor = HashSet::new();
    let mut conn_floor = HashSet::new();
    let mut walls = HashSet::new();
    for p in placements {
        match p.role {
            Role::Room => room_floor.extend(p.floor.iter().copied()),
            Role::Connector => conn_floor.extend(p.floor.iter().copied()),
        }
        walls.extend(p.walls.iter().copied());
    }
    let all: Vec<Cell> = room_floor.iter().chain(conn_floor.iter()).chain(walls.iter()).copied().collect();
    if all.is_empty() {
        return String::new();
    }
    let min_x = all.iter().map(|c| c.x).min().unwrap_or(0);
    let max_x = all.iter().map(|c| c.x).max().unwrap_or(0);
    let min_y = all.iter().map(|c| c.y).min().unwrap_or(0);
    let max_y = all.iter().map(|c| c.y).max().unwrap_or(0);
    let mut result = String::new();
    for y in min_y..=max_y {
        let mut line = String::new();
        for x in min_x..=max_x {
            let c = Cell::new(x, y);
            line.push(if room_floor.contains(&c) {
                '.'
            } else if conn_floor.contains(&c) {
                '+'
            } else if walls.contains(&c) {
                '#'
            } else {
                ' '
            });
        }
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}
