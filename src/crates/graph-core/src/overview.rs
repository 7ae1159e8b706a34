//! The execution [`Overview`]: a per-execution aggregate of LLM usage, tool
//! cost, and timing, plus the pluggable pricing model that turns those raw
//! counts into a [`CostSummary`] (spec.md §3 "Overview", §4.6).
//!
//! Rather than attaching this to an ambient per-request context the way the
//! Go design note (spec.md §9) describes, every [`crate::node::NodeInput`]
//! carries an explicit `Arc<Overview>` — the idiomatic Rust analogue of
//! "look it up from context": a deeply nested call contributes by cloning
//! the `Arc` it was handed, never by re-deriving it from ambient state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Accumulated token counts across every LLM call in one execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub reasoning: u64,
    pub cached: u64,
}

impl TokenUsage {
    fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
        self.total += other.total;
        self.reasoning += other.reasoning;
        self.cached += other.cached;
    }
}

/// Counts of non-text output units (images, video seconds, audio seconds)
/// produced across an execution, for the multiplicative per-unit pricing
/// fields in [`ModelPricing`]. Spec.md §4.6 names the per-unit costs but is
/// silent on where the unit counts come from; modeling them as their own
/// accumulator (mirroring [`TokenUsage`]) is the natural extension.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaUsage {
    pub images: u64,
    pub video_seconds: u64,
    pub audio_seconds: u64,
}

impl MediaUsage {
    fn accumulate(&mut self, other: &MediaUsage) {
        self.images += other.images;
        self.video_seconds += other.video_seconds;
        self.audio_seconds += other.audio_seconds;
    }
}

/// A threshold-based pricing override. The highest-threshold tier whose
/// `threshold_tokens` is exceeded by the relevant token count applies; input
/// and output tiers are selected independently using the prompt and
/// completion token counts respectively (spec.md §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContextTier {
    pub threshold_tokens: u64,
    pub input_cost_per_million: Option<f64>,
    pub output_cost_per_million: Option<f64>,
}

/// Per-token (and per-unit) pricing for one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub cached_cost_per_million: Option<f64>,
    pub reasoning_cost_per_million: Option<f64>,
    pub context_tiers: Vec<ContextTier>,
    pub image_cost_per_unit: Option<f64>,
    pub video_cost_per_second: Option<f64>,
    pub audio_cost_per_second: Option<f64>,
}

impl ModelPricing {
    fn effective_input_rate(&self, prompt_tokens: u64) -> f64 {
        self.tiered_rate(prompt_tokens, self.input_cost_per_million, |t| t.input_cost_per_million)
    }

    fn effective_output_rate(&self, completion_tokens: u64) -> f64 {
        self.tiered_rate(completion_tokens, self.output_cost_per_million, |t| t.output_cost_per_million)
    }

    fn tiered_rate(
        &self,
        tokens: u64,
        base_rate: f64,
        rate_of: impl Fn(&ContextTier) -> Option<f64>,
    ) -> f64 {
        self.context_tiers
            .iter()
            .filter(|tier| tier.threshold_tokens < tokens)
            .filter_map(|tier| rate_of(tier).map(|rate| (tier.threshold_tokens, rate)))
            .max_by_key(|(threshold, _)| *threshold)
            .map(|(_, rate)| rate)
            .unwrap_or(base_rate)
    }

    /// Cost of the accumulated token and media usage under this pricing.
    pub fn cost(&self, usage: &TokenUsage, media: &MediaUsage) -> f64 {
        let mut total = 0.0;
        total += (usage.prompt as f64 / 1_000_000.0) * self.effective_input_rate(usage.prompt);
        total += (usage.completion as f64 / 1_000_000.0) * self.effective_output_rate(usage.completion);
        if let Some(rate) = self.cached_cost_per_million {
            if rate > 0.0 && usage.cached > 0 {
                total += (usage.cached as f64 / 1_000_000.0) * rate;
            }
        }
        if let Some(rate) = self.reasoning_cost_per_million {
            if rate > 0.0 && usage.reasoning > 0 {
                total += (usage.reasoning as f64 / 1_000_000.0) * rate;
            }
        }
        if let Some(rate) = self.image_cost_per_unit {
            total += rate * media.images as f64;
        }
        if let Some(rate) = self.video_cost_per_second {
            total += rate * media.video_seconds as f64;
        }
        if let Some(rate) = self.audio_cost_per_second {
            total += rate * media.audio_seconds as f64;
        }
        total
    }
}

/// Compute pricing: a flat rate per second of execution wall-clock time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComputePricing {
    pub cost_per_second: f64,
}

impl ComputePricing {
    pub fn cost(&self, duration: Duration) -> f64 {
        self.cost_per_second * duration.as_secs_f64()
    }
}

/// A node's monetary contribution for one tool invocation (spec.md §4.6
/// `AddToolExecutionCost`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub amount: f64,
}

/// A pure aggregate over the Overview's running totals and its attached
/// pricing descriptors (spec invariant I5: idempotent, a pure function of
/// its inputs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub currency: String,
    pub tool_cost: f64,
    pub model_cost: f64,
    pub compute_cost: f64,
    pub total_cost: f64,
}

impl CostSummary {
    /// `accuracy / total_cost` when both are positive, else zero (spec.md §4.6).
    pub fn cost_effectiveness(&self, accuracy: f64) -> f64 {
        if accuracy > 0.0 && self.total_cost > 0.0 {
            accuracy / self.total_cost
        } else {
            0.0
        }
    }
}

struct OverviewState {
    id: String,
    requests: Vec<Value>,
    responses: Vec<Value>,
    last_response: Option<Value>,
    usage: TokenUsage,
    media: MediaUsage,
    tool_calls: HashMap<String, u64>,
    tool_cost: HashMap<String, f64>,
    model_pricing: Option<ModelPricing>,
    compute_pricing: Option<ComputePricing>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// Per-execution aggregate of LLM usage, tool cost, and timing.
///
/// Mutated from concurrently-running nodes; every contribution method takes
/// `&self` and serializes through an internal `Mutex`, never held across an
/// `.await` point (spec.md §5 "Shared-resource policy").
pub struct Overview(Mutex<OverviewState>);

impl Overview {
    /// A fresh aggregate, tagged with a random per-execution id (matching the
    /// teacher's `Uuid::new_v4()` checkpoint-id convention).
    pub fn new() -> Self {
        Self(Mutex::new(OverviewState {
            id: Uuid::new_v4().to_string(),
            requests: Vec::new(),
            responses: Vec::new(),
            last_response: None,
            usage: TokenUsage::default(),
            media: MediaUsage::default(),
            tool_calls: HashMap::new(),
            tool_cost: HashMap::new(),
            model_pricing: None,
            compute_pricing: None,
            start: None,
            end: None,
        }))
    }

    /// The random id generated for this execution at construction time.
    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OverviewState> {
        self.0.lock().expect("Overview mutex poisoned")
    }

    /// Add `usage` into the running token total. A `None` usage is a no-op.
    pub fn include_usage(&self, usage: Option<&TokenUsage>) {
        if let Some(usage) = usage {
            self.lock().usage.accumulate(usage);
        }
    }

    pub fn include_media(&self, media: Option<&MediaUsage>) {
        if let Some(media) = media {
            self.lock().media.accumulate(media);
        }
    }

    /// Increment per-tool-name invocation counters.
    pub fn add_tool_calls(&self, tool_names: &[String]) {
        let mut state = self.lock();
        for name in tool_names {
            *state.tool_calls.entry(name.clone()).or_insert(0) += 1;
        }
    }

    pub fn add_request(&self, request: Value) {
        self.lock().requests.push(request);
    }

    pub fn add_response(&self, response: Value) {
        let mut state = self.lock();
        state.last_response = Some(response.clone());
        state.responses.push(response);
    }

    /// Accumulate `metrics.amount` under `tool_name`. A `None` metrics is a no-op.
    pub fn add_tool_execution_cost(&self, tool_name: &str, metrics: Option<&ToolMetrics>) {
        if let Some(metrics) = metrics {
            let mut state = self.lock();
            *state.tool_cost.entry(tool_name.to_string()).or_insert(0.0) += metrics.amount;
        }
    }

    pub fn set_model_cost(&self, pricing: ModelPricing) {
        self.lock().model_pricing = Some(pricing);
    }

    pub fn set_compute_cost(&self, pricing: ComputePricing) {
        self.lock().compute_pricing = Some(pricing);
    }

    pub fn start_execution(&self) {
        let mut state = self.lock();
        if state.start.is_none() {
            state.start = Some(Utc::now());
        }
    }

    pub fn end_execution(&self) {
        self.lock().end = Some(Utc::now());
    }

    /// Zero until both `start_execution` and `end_execution` have been called.
    pub fn execution_duration(&self) -> Duration {
        let state = self.lock();
        match (state.start, state.end) {
            (Some(start), Some(end)) if end >= start => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.lock().usage
    }

    pub fn last_response(&self) -> Option<Value> {
        self.lock().last_response.clone()
    }

    pub fn requests(&self) -> Vec<Value> {
        self.lock().requests.clone()
    }

    pub fn responses(&self) -> Vec<Value> {
        self.lock().responses.clone()
    }

    pub fn tool_call_counts(&self) -> HashMap<String, u64> {
        self.lock().tool_calls.clone()
    }

    /// Currency is always `"USD"`. Grand total is tool + model + compute
    /// (spec.md §4.6). Pure function of the current state, so calling it
    /// twice without intervening contributions yields identical results
    /// (spec invariant I5).
    pub fn cost_summary(&self) -> CostSummary {
        let state = self.lock();
        let tool_cost: f64 = state.tool_cost.values().sum();
        let model_cost = state
            .model_pricing
            .as_ref()
            .map(|pricing| pricing.cost(&state.usage, &state.media))
            .unwrap_or(0.0);
        let compute_cost = state
            .compute_pricing
            .as_ref()
            .map(|pricing| pricing.cost(duration_from(state.start, state.end)))
            .unwrap_or(0.0);
        CostSummary {
            currency: "USD".to_string(),
            tool_cost,
            model_cost,
            compute_cost,
            total_cost: tool_cost + model_cost + compute_cost,
        }
    }
}

fn duration_from(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) if end >= start => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiered_input_and_output_rates_are_selected_independently() {
        let pricing = ModelPricing {
            input_cost_per_million: 1.0,
            output_cost_per_million: 2.0,
            context_tiers: vec![ContextTier {
                threshold_tokens: 200_000,
                input_cost_per_million: Some(2.0),
                output_cost_per_million: None,
            }],
            ..Default::default()
        };
        let usage = TokenUsage { prompt: 250_000, completion: 100_000, total: 350_000, ..Default::default() };
        let cost = pricing.cost(&usage, &MediaUsage::default());
        // input: 250k tokens over the 200k tier -> 2.0/M ; output stays at base 2.0/M (tier has no output rate)
        assert!((cost - (0.25 * 2.0 + 0.1 * 2.0)).abs() < 1e-9);
    }

    #[test]
    fn compute_cost_scales_with_duration() {
        let pricing = ComputePricing { cost_per_second: 0.5 };
        assert!((pricing.cost(Duration::from_secs(2)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cost_summary_is_idempotent_and_sums_components() {
        let overview = Overview::new();
        overview.add_tool_execution_cost("search", Some(&ToolMetrics { amount: 0.1 }));
        overview.include_usage(Some(&TokenUsage { prompt: 250_000, completion: 100_000, total: 350_000, ..Default::default() }));
        overview.set_model_cost(ModelPricing {
            input_cost_per_million: 2.0,
            output_cost_per_million: 2.0,
            context_tiers: vec![ContextTier {
                threshold_tokens: 200_000,
                input_cost_per_million: Some(2.0),
                output_cost_per_million: None,
            }],
            ..Default::default()
        });
        overview.start_execution();
        overview.end_execution();
        overview.set_compute_cost(ComputePricing { cost_per_second: 0.5 });

        let first = overview.cost_summary();
        let second = overview.cost_summary();
        assert_eq!(first.total_cost, second.total_cost);
        assert_eq!(first.total_cost, first.tool_cost + first.model_cost + first.compute_cost);
    }

    #[test]
    fn nil_usage_and_metrics_are_no_ops() {
        let overview = Overview::new();
        overview.include_usage(None);
        overview.add_tool_execution_cost("noop", None);
        assert_eq!(overview.token_usage(), TokenUsage::default());
        assert_eq!(overview.cost_summary().tool_cost, 0.0);
    }

    #[test]
    fn cost_effectiveness_requires_both_positive() {
        let summary = CostSummary {
            currency: "USD".into(),
            tool_cost: 0.0,
            model_cost: 1.0,
            compute_cost: 0.0,
            total_cost: 1.0,
        };
        assert_eq!(summary.cost_effectiveness(0.0), 0.0);
        assert_eq!(summary.cost_effectiveness(-1.0), 0.0);
        assert!((summary.cost_effectiveness(0.8) - 0.8).abs() < 1e-9);
    }
}
