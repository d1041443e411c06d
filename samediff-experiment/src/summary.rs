use crate::timeline::SaveRequest;
use samediff_core::TrialOutcome;
use serde::Serialize;
use tracing::info;

/// Accuracy and latency over one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub trials: usize,
    pub correct: usize,
    pub accuracy_pct: f64,
    pub mean_rt_ms: Option<f64>,
    pub min_rt_ms: Option<f64>,
    pub max_rt_ms: Option<f64>,
}

impl BlockSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TrialOutcome>) -> Self {
        let rts: Vec<(f64, bool)> = outcomes
            .into_iter()
            .map(|o| (o.rt_ms, o.correct))
            .collect();
        let trials = rts.len();
        let correct = rts.iter().filter(|(_, c)| *c).count();
        if trials == 0 {
            return Self {
                trials,
                correct,
                accuracy_pct: 0.0,
                mean_rt_ms: None,
                min_rt_ms: None,
                max_rt_ms: None,
            };
        }
        let times = rts.iter().map(|(rt, _)| *rt);
        Self {
            trials,
            correct,
            accuracy_pct: correct as f64 / trials as f64 * 100.0,
            mean_rt_ms: Some(times.clone().sum::<f64>() / trials as f64),
            min_rt_ms: Some(times.clone().fold(f64::INFINITY, f64::min)),
            max_rt_ms: Some(times.fold(f64::NEG_INFINITY, f64::max)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub participant: String,
    pub condition: u8,
    pub practice: BlockSummary,
    pub main: BlockSummary,
}

impl RunSummary {
    pub fn new(request: &SaveRequest, outcomes: &[TrialOutcome]) -> Self {
        Self {
            participant: request.participant.clone(),
            condition: request.condition.number(),
            practice: BlockSummary::from_outcomes(outcomes.iter().filter(|o| o.is_practice)),
            main: BlockSummary::from_outcomes(outcomes.iter().filter(|o| !o.is_practice)),
        }
    }

    pub fn log(&self) {
        for (block, s) in [("practice", &self.practice), ("main", &self.main)] {
            info!(
                participant = %self.participant,
                condition = self.condition,
                block,
                trials = s.trials,
                accuracy = %format!("{:.1}%", s.accuracy_pct),
                mean_rt_ms = ?s.mean_rt_ms.map(|m| (m * 1000.0).round() / 1000.0),
                min_rt_ms = ?s.min_rt_ms,
                max_rt_ms = ?s.max_rt_ms,
                "block summary"
            );
        }
    }
}
