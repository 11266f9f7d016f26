//! The workload-sensing decision/adaptation engine.
//!
//! Grounded on `eqos::scheduler::Scheduler::tick`'s periodic call to
//! `evaluate_game()` for the sampling cadence; the classification and
//! decision-matrix logic itself reduces CPU and IPC activity to a 5x5
//! breakpoint grid and from there to one of eight workload classes, with
//! hysteresis so a single noisy sample cannot flip the recommendation.
//! The per-plugin weighted scoring below stands in for `eqos::game`'s
//! payoff/strategy evaluation, adapted to five fixed axes instead of a
//! general game matrix since the candidate set (the six built-in plugins)
//! is closed and known at compile time.

use dsrtos_core::ids::PluginId;

use crate::config::KernelConfig;

/// One of eight workload classes the CPU/IPC breakpoint grid reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadClass {
    Idle,
    LightCompute,
    HeavyCompute,
    IoBound,
    IpcHeavy,
    Bursty,
    Balanced,
    Realtime,
}

/// How confident the engine is in its current classification. Per
/// DESIGN.md's Open Question decision, the engine never reports less
/// than `Low` purely because variance inputs are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A single workload observation. `ipc_variance`/`interval_variance` are
/// optional: when absent, classification falls back to mean-only
/// breakpoints (Open Question 3) and confidence is capped at `Low`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadSample {
    pub cpu_utilization_pct: u8,
    pub ipc_rate_per_tick: u32,
    pub ipc_variance: Option<f32>,
    pub interval_variance: Option<f32>,
}

/// A level on the 5-point CPU or IPC axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Level(u8);

const CPU_BREAKPOINTS: [u8; 4] = [20, 40, 60, 80];
const IPC_BREAKPOINTS: [u32; 4] = [0, 100, 500, 1000];

fn level_of(value: u32, breakpoints: [u32; 4]) -> Level {
    let mut level = 0u8;
    for bp in breakpoints {
        if value >= bp {
            level += 1;
        }
    }
    Level(level)
}

fn cpu_level(sample: &WorkloadSample) -> Level {
    level_of(sample.cpu_utilization_pct as u32, CPU_BREAKPOINTS.map(|b| b as u32))
}

fn ipc_level(sample: &WorkloadSample) -> Level {
    level_of(sample.ipc_rate_per_tick, IPC_BREAKPOINTS)
}

/// The 5x5 CPU-level x IPC-level decision matrix, reduced to one of the
/// eight workload classes.
const CLASS_MATRIX: [[WorkloadClass; 5]; 5] = {
    use WorkloadClass::*;
    [
        [Idle, Idle, IoBound, IoBound, IpcHeavy],
        [Idle, LightCompute, Balanced, IoBound, IpcHeavy],
        [LightCompute, LightCompute, Balanced, Bursty, IpcHeavy],
        [HeavyCompute, Balanced, Bursty, Bursty, Realtime],
        [HeavyCompute, HeavyCompute, Realtime, Realtime, Realtime],
    ]
};

/// Maps a workload class to a recommended fairness bias (0-100, fed to
/// `scheduler::adaptive::Adaptive::set_fairness_bias`) and, for the
/// classes where a different algorithm fits better, a suggested hot-swap
/// target. `candidate_scores`/`decide` can still override this with a
/// better-scoring plugin; this is only the matrix's first guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
    pub fairness_bias: u8,
    pub suggest_switch_to: Option<&'static str>,
}

fn recommendation_for(class: WorkloadClass) -> Recommendation {
    use WorkloadClass::*;
    match class {
        Idle => Recommendation {
            fairness_bias: 0,
            suggest_switch_to: None,
        },
        LightCompute => Recommendation {
            fairness_bias: 20,
            suggest_switch_to: None,
        },
        HeavyCompute => Recommendation {
            fairness_bias: 10,
            suggest_switch_to: Some("static-priority"),
        },
        IoBound => Recommendation {
            fairness_bias: 60,
            suggest_switch_to: Some("fair-share"),
        },
        IpcHeavy => Recommendation {
            fairness_bias: 40,
            suggest_switch_to: Some("fair-share"),
        },
        Bursty => Recommendation {
            fairness_bias: 50,
            suggest_switch_to: None,
        },
        Balanced => Recommendation {
            fairness_bias: 50,
            suggest_switch_to: None,
        },
        Realtime => Recommendation {
            fairness_bias: 0,
            suggest_switch_to: Some("edf"),
        },
    }
}

/// Per-axis weights used to score each candidate plugin against the
/// current workload. All five default to equal weight; `set_weights`
/// lets a host tune the balance (e.g. an energy-constrained board
/// weighting `energy` higher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringWeights {
    pub cpu: u8,
    pub ipc: u8,
    pub deadline: u8,
    pub contention: u8,
    pub energy: u8,
}

impl ScoringWeights {
    pub const fn balanced() -> Self {
        Self {
            cpu: 20,
            ipc: 20,
            deadline: 20,
            contention: 20,
            energy: 20,
        }
    }

    fn as_array(self) -> [u32; 5] {
        [
            self.cpu as u32,
            self.ipc as u32,
            self.deadline as u32,
            self.contention as u32,
            self.energy as u32,
        ]
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

/// How well-suited a plugin is to a workload high on each axis, 0-100.
struct PluginProfile {
    name: &'static str,
    cpu: u8,
    ipc: u8,
    deadline: u8,
    contention: u8,
    energy: u8,
}

impl PluginProfile {
    fn as_array(&self) -> [u32; 5] {
        [
            self.cpu as u32,
            self.ipc as u32,
            self.deadline as u32,
            self.contention as u32,
            self.energy as u32,
        ]
    }
}

const PLUGIN_PROFILES: [PluginProfile; 6] = [
    PluginProfile { name: "round-robin", cpu: 40, ipc: 30, deadline: 10, contention: 20, energy: 70 },
    PluginProfile { name: "static-priority", cpu: 80, ipc: 30, deadline: 40, contention: 30, energy: 50 },
    PluginProfile { name: "edf", cpu: 50, ipc: 40, deadline: 95, contention: 30, energy: 30 },
    PluginProfile { name: "rate-monotonic", cpu: 60, ipc: 30, deadline: 80, contention: 30, energy: 40 },
    PluginProfile { name: "fair-share", cpu: 50, ipc: 60, deadline: 20, contention: 70, energy: 50 },
    PluginProfile { name: "adaptive", cpu: 60, ipc: 60, deadline: 50, contention: 50, energy: 50 },
];

/// A sample's position on the five scoring axes, 0-100 each. CPU and IPC
/// come straight from the sample; `deadline` and `contention` are derived
/// from the matrix classification and variance inputs since
/// `WorkloadSample` carries no deadline-miss or lock-contention counters
/// of its own; `energy` is the complement of CPU utilization, favoring
/// low-power plugins when the system is mostly idle.
fn axis_signals(sample: &WorkloadSample, class: WorkloadClass) -> [u32; 5] {
    let cpu = sample.cpu_utilization_pct as u32;
    let ipc = ipc_level(sample).0 as u32 * 25;
    let deadline = match class {
        WorkloadClass::Realtime => 100,
        WorkloadClass::Bursty => 60,
        WorkloadClass::HeavyCompute => 40,
        _ => 15,
    };
    let contention = match (sample.ipc_variance, sample.interval_variance) {
        (Some(a), Some(b)) => (((a + b) / 2.0).clamp(0.0, 1.0) * 100.0) as u32,
        (Some(a), None) | (None, Some(a)) => (a.clamp(0.0, 1.0) * 100.0) as u32,
        (None, None) => 30,
    };
    let energy = 100u32.saturating_sub(cpu);
    [cpu, ipc, deadline, contention, energy]
}

fn score_profile(profile: &PluginProfile, signals: [u32; 5], weights: ScoringWeights) -> u32 {
    let axes = profile.as_array();
    let w = weights.as_array();
    let total_w: u64 = w.iter().map(|&x| x as u64).sum::<u64>().max(1);
    let mut acc = 0u64;
    for i in 0..5 {
        acc += axes[i] as u64 * signals[i] as u64 * w[i] as u64;
    }
    (acc / (100 * total_w)) as u32
}

/// One plugin's name and weighted score for a sample, as produced by
/// `candidate_scores`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub name: &'static str,
    pub score: u32,
}

/// Scores every built-in plugin against `sample`/`class` under `weights`.
pub fn candidate_scores(sample: &WorkloadSample, class: WorkloadClass, weights: ScoringWeights) -> [Candidate; 6] {
    let signals = axis_signals(sample, class);
    let mut out = [Candidate { name: "", score: 0 }; 6];
    for (i, profile) in PLUGIN_PROFILES.iter().enumerate() {
        out[i] = Candidate {
            name: profile.name,
            score: score_profile(profile, signals, weights),
        };
    }
    out
}

fn best_candidate(candidates: &[Candidate; 6]) -> Candidate {
    let mut best = candidates[0];
    for &c in candidates.iter().skip(1) {
        if c.score > best.score {
            best = c;
        }
    }
    best
}

fn candidate_score(candidates: &[Candidate; 6], name: &str) -> Option<u32> {
    candidates.iter().find(|c| c.name == name).map(|c| c.score)
}

/// Accepts the matrix's recommendation if its plugin scores within 10% of
/// the best-scoring candidate; otherwise overrides `suggest_switch_to`
/// with the best-scoring plugin's name. A recommendation with no suggested
/// switch is left as-is: the matrix is only opining on fairness bias in
/// that case, not on which plugin should be active.
fn apply_scoring(mut rec: Recommendation, sample: &WorkloadSample, class: WorkloadClass, weights: ScoringWeights) -> Recommendation {
    let candidates = candidate_scores(sample, class, weights);
    let best = best_candidate(&candidates);
    if best.score == 0 {
        return rec;
    }
    match rec.suggest_switch_to {
        Some(name) => {
            let matrix_score = candidate_score(&candidates, name).unwrap_or(0);
            let threshold = best.score - best.score / 10;
            if matrix_score < threshold {
                rec.suggest_switch_to = Some(best.name);
            }
        }
        None => {}
    }
    rec
}

/// The adaptation/decision engine. Holds just enough state to apply
/// hysteresis across samples; does not itself own the ready queue or
/// registry.
pub struct DecisionEngine {
    last_class: Option<WorkloadClass>,
    candidate_class: Option<WorkloadClass>,
    stability_count: u8,
    stability_threshold: u8,
    ticks_since_change: u32,
    hysteresis_ticks: u32,
    weights: ScoringWeights,
    learning_enabled: bool,
    callback: Option<fn(Recommendation)>,
    /// Recorded so a future switch-engine call can target it; not looked
    /// up here since `DecisionEngine` has no registry access.
    pub last_recommended_plugin: Option<PluginId>,
}

impl DecisionEngine {
    pub fn new(cfg: &KernelConfig) -> Self {
        Self {
            last_class: None,
            candidate_class: None,
            stability_count: 0,
            stability_threshold: cfg.adaptation_stability_threshold,
            ticks_since_change: 0,
            hysteresis_ticks: cfg.adaptation_hysteresis_ticks,
            weights: ScoringWeights::balanced(),
            learning_enabled: false,
            callback: None,
            last_recommended_plugin: None,
        }
    }

    fn classify(sample: &WorkloadSample) -> (WorkloadClass, Confidence) {
        let cpu = cpu_level(sample);
        let ipc = ipc_level(sample);
        let class = CLASS_MATRIX[cpu.0 as usize][ipc.0 as usize];
        let confidence = match (sample.ipc_variance, sample.interval_variance) {
            (Some(iv), Some(intv)) if iv < 1.0 && intv < 1.0 => Confidence::High,
            (Some(_), Some(_)) | (Some(_), None) | (None, Some(_)) => Confidence::Medium,
            (None, None) => Confidence::Low,
        };
        (class, confidence)
    }

    /// Replaces the scoring weights used by every subsequent evaluation.
    pub fn set_weights(&mut self, weights: ScoringWeights) {
        self.weights = weights;
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Enables or disables the reinforcement step applied after each
    /// accepted recommendation (see `reinforce`).
    pub fn enable_learning(&mut self, enabled: bool) {
        self.learning_enabled = enabled;
    }

    pub fn learning_enabled(&self) -> bool {
        self.learning_enabled
    }

    /// Registers a callback invoked every time a recommendation is
    /// produced, by `observe` or `force_evaluation` alike.
    pub fn set_callback(&mut self, callback: fn(Recommendation)) {
        self.callback = Some(callback);
    }

    fn build_recommendation(&mut self, class: WorkloadClass, sample: &WorkloadSample) -> Recommendation {
        let rec = apply_scoring(recommendation_for(class), sample, class, self.weights);
        if self.learning_enabled {
            self.reinforce(sample, class);
        }
        if let Some(cb) = self.callback {
            cb(rec);
        }
        rec
    }

    /// Nudges the scoring weights toward whichever axis the best-scoring
    /// plugin for this sample is strongest on, by one point, capped at
    /// 100. A crude single-step reinforcement: repeated stable workloads
    /// of the same shape gradually bias future scoring toward the axis
    /// that keeps winning.
    fn reinforce(&mut self, sample: &WorkloadSample, class: WorkloadClass) {
        let candidates = candidate_scores(sample, class, self.weights);
        let best = best_candidate(&candidates);
        let profile = match PLUGIN_PROFILES.iter().find(|p| p.name == best.name) {
            Some(p) => p,
            None => return,
        };
        let axes = profile.as_array();
        let mut max_axis = 0usize;
        for i in 1..5 {
            if axes[i] > axes[max_axis] {
                max_axis = i;
            }
        }
        match max_axis {
            0 => self.weights.cpu = self.weights.cpu.saturating_add(1).min(100),
            1 => self.weights.ipc = self.weights.ipc.saturating_add(1).min(100),
            2 => self.weights.deadline = self.weights.deadline.saturating_add(1).min(100),
            3 => self.weights.contention = self.weights.contention.saturating_add(1).min(100),
            _ => self.weights.energy = self.weights.energy.saturating_add(1).min(100),
        }
    }

    /// Feeds one sample into the engine, applying hysteresis. Returns
    /// `Some(Recommendation)` only on ticks where the stabilized class
    /// actually changes; callers should otherwise keep whatever bias is
    /// already applied.
    pub fn observe(&mut self, sample: &WorkloadSample, ticks_elapsed: u32) -> Option<Recommendation> {
        self.ticks_since_change = self.ticks_since_change.saturating_add(ticks_elapsed);
        let (class, _confidence) = Self::classify(sample);

        if self.candidate_class == Some(class) {
            self.stability_count = self.stability_count.saturating_add(1);
        } else {
            self.candidate_class = Some(class);
            self.stability_count = 1;
        }

        let stable_enough = self.stability_count >= self.stability_threshold;
        let settled_enough = self.ticks_since_change >= self.hysteresis_ticks;
        if stable_enough && settled_enough && self.last_class != Some(class) {
            self.last_class = Some(class);
            self.ticks_since_change = 0;
            Some(self.build_recommendation(class, sample))
        } else {
            None
        }
    }

    /// Bypasses hysteresis entirely and produces a recommendation for
    /// `sample` immediately, still invoking the scoring override and any
    /// registered callback. Intended for a host that wants an on-demand
    /// evaluation (e.g. right after boot) rather than waiting out the
    /// stability window.
    pub fn force_evaluation(&mut self, sample: &WorkloadSample) -> Recommendation {
        let (class, _confidence) = Self::classify(sample);
        self.last_class = Some(class);
        self.candidate_class = Some(class);
        self.stability_count = self.stability_threshold;
        self.ticks_since_change = 0;
        self.build_recommendation(class, sample)
    }

    pub fn current_class(&self) -> Option<WorkloadClass> {
        self.last_class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn cfg_with(threshold: u8, hysteresis: u32) -> KernelConfig {
        let mut cfg = KernelConfig::default_small();
        cfg.adaptation_stability_threshold = threshold;
        cfg.adaptation_hysteresis_ticks = hysteresis;
        cfg
    }

    #[test]
    fn single_sample_does_not_trigger_recommendation() {
        let cfg = cfg_with(3, 100);
        let mut engine = DecisionEngine::new(&cfg);
        let sample = WorkloadSample {
            cpu_utilization_pct: 95,
            ipc_rate_per_tick: 500,
            ..Default::default()
        };
        assert_eq!(engine.observe(&sample, 10), None);
    }

    #[test]
    fn stable_high_load_triggers_realtime_recommendation() {
        let cfg = cfg_with(2, 5);
        let mut engine = DecisionEngine::new(&cfg);
        let sample = WorkloadSample {
            cpu_utilization_pct: 95,
            ipc_rate_per_tick: 500,
            ipc_variance: Some(0.1),
            interval_variance: Some(0.1),
            ..Default::default()
        };
        engine.observe(&sample, 3);
        let rec = engine.observe(&sample, 3).unwrap();
        assert_eq!(rec.suggest_switch_to, Some("edf"));
        assert_eq!(engine.current_class(), Some(WorkloadClass::Realtime));
    }

    #[test]
    fn missing_variance_still_classifies_at_low_confidence() {
        let sample = WorkloadSample {
            cpu_utilization_pct: 0,
            ipc_rate_per_tick: 0,
            ipc_variance: None,
            interval_variance: None,
        };
        let (class, confidence) = DecisionEngine::classify(&sample);
        assert_eq!(class, WorkloadClass::Idle);
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn idle_then_stable_idle_does_not_re_recommend() {
        let cfg = cfg_with(1, 1);
        let mut engine = DecisionEngine::new(&cfg);
        let sample = WorkloadSample::default();
        let first = engine.observe(&sample, 5);
        assert!(first.is_some());
        let second = engine.observe(&sample, 5);
        assert_eq!(second, None);
    }

    #[test]
    fn ipc_heavy_workload_recommends_fair_share() {
        let cfg = cfg_with(1, 1);
        let mut engine = DecisionEngine::new(&cfg);
        let sample = WorkloadSample {
            cpu_utilization_pct: 15,
            ipc_rate_per_tick: 1200,
            ipc_variance: Some(0.2),
            interval_variance: Some(0.2),
        };
        let rec = engine.force_evaluation(&sample);
        assert_eq!(rec.suggest_switch_to, Some("fair-share"));
    }

    #[test]
    fn best_candidate_has_the_highest_score() {
        let sample = WorkloadSample {
            cpu_utilization_pct: 90,
            ipc_rate_per_tick: 10,
            ipc_variance: Some(0.05),
            interval_variance: Some(0.05),
        };
        let candidates = candidate_scores(&sample, WorkloadClass::Realtime, ScoringWeights::balanced());
        let best = best_candidate(&candidates);
        assert_eq!(best.name, "edf");
    }

    #[test]
    fn set_weights_changes_scoring() {
        let sample = WorkloadSample {
            cpu_utilization_pct: 10,
            ipc_rate_per_tick: 5,
            ..Default::default()
        };
        let energy_heavy = ScoringWeights { cpu: 0, ipc: 0, deadline: 0, contention: 0, energy: 100 };
        let candidates = candidate_scores(&sample, WorkloadClass::Idle, energy_heavy);
        let best = best_candidate(&candidates);
        assert_eq!(best.name, "round-robin");
    }

    #[test]
    fn force_evaluation_bypasses_hysteresis() {
        let cfg = cfg_with(10, 10_000);
        let mut engine = DecisionEngine::new(&cfg);
        let sample = WorkloadSample {
            cpu_utilization_pct: 95,
            ipc_rate_per_tick: 500,
            ipc_variance: Some(0.1),
            interval_variance: Some(0.1),
        };
        let rec = engine.force_evaluation(&sample);
        assert_eq!(rec.suggest_switch_to, Some("edf"));
    }

    #[test]
    fn callback_is_invoked_on_recommendation() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        fn record(_rec: Recommendation) {
            CALLS.fetch_add(1, Ordering::Relaxed);
        }
        let cfg = cfg_with(1, 1);
        let mut engine = DecisionEngine::new(&cfg);
        engine.set_callback(record);
        let sample = WorkloadSample::default();
        engine.observe(&sample, 5);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn learning_nudges_weights_toward_winning_axis() {
        let cfg = cfg_with(1, 1);
        let mut engine = DecisionEngine::new(&cfg);
        engine.enable_learning(true);
        let before = engine.weights();
        let sample = WorkloadSample {
            cpu_utilization_pct: 95,
            ipc_rate_per_tick: 500,
            ipc_variance: Some(0.1),
            interval_variance: Some(0.1),
        };
        engine.force_evaluation(&sample);
        assert_ne!(engine.weights(), before);
    }
}
