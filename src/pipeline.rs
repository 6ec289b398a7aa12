//! Request orchestration: one user query in, an ordered event stream out.
//!
//! Each request walks the same phases in order: stream the plan text
//! from the function-calling model, compile it, preview each step,
//! execute the calls one at a time, project the relevant places, then
//! stream a natural-language summary of the accumulated results. A
//! failure before execution collapses the whole request into a single
//! `Failed` event; a failure of one call only empties that call's
//! results.
//!
//! Cancellation is the receiver's: dropping the event receiver makes
//! every subsequent send fail, and the request task returns at the next
//! step boundary without calling further tools.

use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::executor::{describe_plan, Executor};
use crate::llm::{GenerationError, GenerationParams, TextGenerator};
use crate::plan::compile_plan;
use crate::prompt::{
    build_plan_prompt, build_summary_prompt, current_time_string, ERROR_MESSAGE,
    PLAN_STOP_MARKER, SUMMARY_END_MARKER,
};
use crate::tools::current_location::FALLBACK_LOCATION;
use crate::tools::{CallArgs, ToolRegistry};
use crate::types::{
    PipelineEvent, RelevantPlace, RequestContext, RequestOutcome, ToolOutput,
};

const EVENT_BUFFER: usize = 64;
const MAX_TYPEWRITER_DOTS: u32 = 5;

/// Strips a marker from streamed text, including markers that arrive
/// split across fragment boundaries: a trailing partial match is held
/// back until the next fragment decides it.
struct MarkerStripper {
    marker: &'static str,
    raw: String,
    emitted: usize,
}

impl MarkerStripper {
    fn new(marker: &'static str) -> Self {
        Self {
            marker,
            raw: String::new(),
            emitted: 0,
        }
    }

    fn visible(&self) -> String {
        let mut cleaned = self.raw.replace(self.marker, "");
        for len in (1..self.marker.len()).rev() {
            if cleaned.ends_with(&self.marker[..len]) {
                cleaned.truncate(cleaned.len() - len);
                break;
            }
        }
        cleaned
    }

    /// Absorb a fragment; returns the newly visible text, if any.
    fn push(&mut self, fragment: &str) -> Option<String> {
        self.raw.push_str(fragment);
        let visible = self.visible();
        if visible.len() > self.emitted {
            let delta = visible[self.emitted..].to_string();
            self.emitted = visible.len();
            Some(delta)
        } else {
            None
        }
    }
}

/// Project the deduplicated (address, name) pairs callers use to render
/// map embeds, preserving first-seen order.
fn relevant_places(results: &[Value]) -> Vec<RelevantPlace> {
    let mut places: Vec<RelevantPlace> = Vec::new();
    for result in results {
        let Some(map) = result.as_object() else {
            continue;
        };
        let field = |key: &str| map.get(key).and_then(Value::as_str);
        let pair = field("formatted_address")
            .zip(field("name"))
            .or_else(|| field("formatted_address").zip(field("for_location")))
            .or_else(|| field("vicinity").zip(field("name")));
        let Some((address, name)) = pair else {
            continue;
        };
        let place = RelevantPlace {
            address: address.to_string(),
            name: name.to_string(),
        };
        if !places.contains(&place) {
            places.push(place);
        }
    }
    places
}

pub struct Pipeline {
    registry: Arc<ToolRegistry>,
    plan_model: Arc<dyn TextGenerator>,
    summary_model: Arc<dyn TextGenerator>,
    config: PipelineConfig,
    admission: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ToolRegistry>,
        plan_model: Arc<dyn TextGenerator>,
        summary_model: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_requests));
        Self {
            registry,
            plan_model,
            summary_model,
            config,
            admission,
        }
    }

    /// Start handling one query. Events arrive on the returned channel;
    /// dropping it cancels the request at the next step boundary.
    pub fn handle(&self, query: String, ctx: RequestContext) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let request = Request {
            registry: self.registry.clone(),
            plan_model: self.plan_model.clone(),
            summary_model: self.summary_model.clone(),
            config: self.config.clone(),
            admission: self.admission.clone(),
            query,
            ctx,
            tx,
        };
        tokio::spawn(request.run());
        rx
    }
}

struct Request {
    registry: Arc<ToolRegistry>,
    plan_model: Arc<dyn TextGenerator>,
    summary_model: Arc<dyn TextGenerator>,
    config: PipelineConfig,
    admission: Arc<Semaphore>,
    query: String,
    ctx: RequestContext,
    tx: mpsc::Sender<PipelineEvent>,
}

impl Request {
    async fn send(&self, event: PipelineEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn run(self) {
        let Ok(_permit) = self.admission.clone().acquire_owned().await else {
            return;
        };

        // Phase 1: stream the plan text.
        let plan_text = match self.stream_plan().await {
            Ok(Some(text)) => text,
            Ok(None) => return, // cancelled
            Err(error) => {
                warn!(%error, "plan generation failed");
                let _ = self.send(PipelineEvent::Failed(ERROR_MESSAGE.to_string())).await;
                return;
            }
        };

        // Phase 2: compile. Any compile error fails the whole request;
        // nothing has executed yet.
        let plan = match compile_plan(&plan_text, &self.registry) {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                warn!("model produced an empty plan");
                let _ = self.send(PipelineEvent::Failed(ERROR_MESSAGE.to_string())).await;
                return;
            }
            Err(error) => {
                warn!(%error, text = %plan_text, "plan compilation failed");
                let _ = self.send(PipelineEvent::Failed(ERROR_MESSAGE.to_string())).await;
                return;
            }
        };
        info!(plan = %plan, "plan compiled");
        if !self.send(PipelineEvent::PlanReady(plan.to_string())).await {
            return;
        }

        // Phase 3: dry-run preview, one line per call.
        let previews = describe_plan(&plan, &self.registry);
        for (index, text) in previews.iter().enumerate() {
            let event = PipelineEvent::PlanStep {
                index,
                text: text.clone(),
            };
            if !self.send(event).await {
                return;
            }
            self.pause(self.config.step_delay_ms).await;
        }

        // Phase 4: execute, one outcome per call.
        let plan_string = plan.to_string();
        let mut executor = Executor::new(
            plan,
            self.registry.clone(),
            self.ctx.clone(),
            previews,
        );
        let mut descriptions = Vec::new();
        let mut results: Vec<Value> = Vec::new();
        loop {
            // A dropped receiver cancels the request; checked here so a
            // cancelled request makes no further tool calls.
            if self.tx.is_closed() {
                return;
            }
            let Some(outcome) = executor.step().await else {
                break;
            };
            let index = executor.position() - 1;
            if !self.typewrite_step(index, &outcome.description, &outcome.explanation).await {
                return;
            }
            descriptions.push(outcome.description);
            results.extend(outcome.results);
        }

        let places = self.project_places(&results).await;
        if !self.send(PipelineEvent::Results(results.clone())).await {
            return;
        }
        if !self.send(PipelineEvent::RelevantPlaces(places)).await {
            return;
        }

        // Phase 5: summarize, shrinking the result window until the
        // model accepts the prompt.
        let summary = match self.stream_summary(&results).await {
            Some(summary) => summary,
            None => return, // cancelled
        };

        let _ = self
            .send(PipelineEvent::Done(RequestOutcome {
                plan: plan_string,
                descriptions,
                results,
                summary,
            }))
            .await;
    }

    /// Stream plan tokens, forwarding marker-stripped deltas. Returns
    /// `Ok(None)` when the receiver went away mid-stream.
    async fn stream_plan(&self) -> Result<Option<String>, GenerationError> {
        let prompt = build_plan_prompt(&self.registry, &self.query);
        let (token_tx, mut token_rx) = mpsc::unbounded_channel();
        let model = self.plan_model.clone();
        let generation = tokio::spawn(async move {
            model
                .generate_stream(&prompt, &GenerationParams::plan(), token_tx)
                .await
        });

        let mut stripper = MarkerStripper::new(PLAN_STOP_MARKER);
        let mut cancelled = false;
        while let Some(fragment) = token_rx.recv().await {
            if cancelled {
                continue; // drain; the generator holds the sender
            }
            if let Some(delta) = stripper.push(&fragment) {
                if !self.send(PipelineEvent::PlanDelta(delta)).await {
                    cancelled = true;
                }
            }
        }

        let raw = match generation.await {
            Ok(result) => result?,
            Err(join_error) => {
                return Err(GenerationError::Stream(join_error.to_string()));
            }
        };
        if cancelled {
            return Ok(None);
        }
        Ok(Some(raw.replace(PLAN_STOP_MARKER, "").trim().to_string()))
    }

    /// Animate one executing step: the numbered description, a few
    /// trailing dots, then the explanation.
    async fn typewrite_step(&self, index: usize, description: &str, explanation: &str) -> bool {
        let mut line = format!("{}. {} ", index + 1, description);
        if !self
            .send(PipelineEvent::StepText {
                index,
                text: line.clone(),
            })
            .await
        {
            return false;
        }
        let dots = rand::thread_rng().gen_range(0..=MAX_TYPEWRITER_DOTS);
        for _ in 0..dots {
            self.pause(self.config.typewriter_delay_ms).await;
            line.push('.');
            if !self
                .send(PipelineEvent::StepText {
                    index,
                    text: line.clone(),
                })
                .await
            {
                return false;
            }
        }
        line.push(' ');
        line.push_str(explanation);
        self.send(PipelineEvent::StepText { index, text: line }).await
    }

    /// The deduplicated place pairs, or the caller's current location
    /// when the results name no places at all.
    async fn project_places(&self, results: &[Value]) -> Vec<RelevantPlace> {
        let places = relevant_places(results);
        if !places.is_empty() {
            return places;
        }
        let here = self.current_location().await;
        vec![RelevantPlace {
            address: here.clone(),
            name: here,
        }]
    }

    /// Resolve the caller's location the same way the plan would: via
    /// the registered current-location tool, falling back to a fixed
    /// city when it is unavailable.
    async fn current_location(&self) -> String {
        if let Some(tool) = self.registry.lookup("get_current_location") {
            if let Ok(ToolOutput::Text(city)) =
                tool.invoke(&CallArgs::default(), &self.ctx).await
            {
                return city;
            }
        }
        FALLBACK_LOCATION.to_string()
    }

    /// Stream the summary, retrying with a ¾-truncated result window
    /// whenever the model rejects the prompt as too long. Returns `None`
    /// on cancellation; a summary failure degrades to empty text.
    async fn stream_summary(&self, results: &[Value]) -> Option<String> {
        let location = self.current_location().await;
        let time = current_time_string();
        let mut window = results.to_vec();
        let mut attempts = 0u32;

        loop {
            let prompt = build_summary_prompt(&self.query, &window, &location, &time);
            let (token_tx, mut token_rx) = mpsc::unbounded_channel();
            let model = self.summary_model.clone();
            let generation = tokio::spawn(async move {
                model
                    .generate_stream(&prompt, &GenerationParams::summary(), token_tx)
                    .await
            });

            let mut stripper = MarkerStripper::new(SUMMARY_END_MARKER);
            let mut started = false;
            let mut cancelled = false;
            while let Some(fragment) = token_rx.recv().await {
                if cancelled {
                    continue;
                }
                let Some(mut delta) = stripper.push(&fragment) else {
                    continue;
                };
                if !started {
                    delta = delta.trim_start().to_string();
                    if delta.is_empty() {
                        continue;
                    }
                    started = true;
                }
                if !self.send(PipelineEvent::SummaryDelta(delta)).await {
                    cancelled = true;
                }
            }

            let result = match generation.await {
                Ok(result) => result,
                Err(join_error) => Err(GenerationError::Stream(join_error.to_string())),
            };
            if cancelled {
                return None;
            }

            match result {
                Ok(raw) => {
                    return Some(
                        raw.replace(SUMMARY_END_MARKER, "").trim_start().to_string(),
                    );
                }
                Err(GenerationError::InputTooLong(_)) => {
                    attempts += 1;
                    if window.len() <= 1 || attempts >= self.config.summary_retry_limit {
                        warn!(
                            attempts,
                            remaining = window.len(),
                            "summary prompt never fit; giving up"
                        );
                        return Some(String::new());
                    }
                    let new_len = window.len() * 3 / 4;
                    info!(from = window.len(), to = new_len, "summary prompt too long; truncating results");
                    window.truncate(new_len.max(1));
                }
                Err(error) => {
                    warn!(%error, "summary generation failed");
                    return Some(String::new());
                }
            }
        }
    }
}
