use crate::domain::analysis::{
    AnalysisBundle, AnalysisText, CompiledAnalysis, PromptName, RiskScore,
};
use crate::error::SimsError;
use crate::llm::{CompletionClient, CompletionSettings};
use crate::prompt::templates::{render, TemplateSet};
use crate::prompt::ComposedPrompts;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnalysisStage {
    Init,
    Round1Dispatched,
    Round2Dispatched,
    Done,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStage::Init => "init",
            AnalysisStage::Round1Dispatched => "round1_dispatched",
            AnalysisStage::Round2Dispatched => "round2_dispatched",
            AnalysisStage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub bundle: AnalysisBundle,
    pub compiled: CompiledAnalysis,
    pub synthesis_prompt: String,
    pub stage: AnalysisStage,
}

/// Drives the two completion rounds for one date. Stages only move forward; every
/// completion failure is replaced by the failure marker and the run carries on.
pub struct AnalysisOrchestrator<'a> {
    client: &'a dyn CompletionClient,
    settings: CompletionSettings,
    templates: &'a TemplateSet,
    stage: AnalysisStage,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        settings: CompletionSettings,
        templates: &'a TemplateSet,
    ) -> Self {
        Self {
            client,
            settings,
            templates,
            stage: AnalysisStage::Init,
        }
    }

    pub fn stage(&self) -> AnalysisStage {
        self.stage
    }

    fn advance(&mut self, next: AnalysisStage) {
        debug_assert!(next > self.stage, "analysis stage cannot move backwards");
        tracing::debug!(from = %self.stage, to = %next, "analysis stage");
        self.stage = next;
    }

    async fn complete(&self, name: &str, prompt: &str) -> AnalysisText {
        let request = self.settings.request(prompt);
        match self.client.complete(&request).await {
            Ok(text) => AnalysisText::Generated(text),
            Err(err) => {
                let failure = SimsError::CompletionFailure {
                    name: name.to_string(),
                    detail: format!("{err:#}"),
                };
                tracing::warn!(
                    provider = ?self.client.provider(),
                    model = %self.settings.model,
                    error = %failure,
                    "completion failed; using failure marker"
                );
                AnalysisText::Failed
            }
        }
    }

    /// Round 1: the three prompts, dispatched concurrently.
    pub async fn round_one(&mut self, prompts: &ComposedPrompts) -> AnalysisBundle {
        self.advance(AnalysisStage::Round1Dispatched);

        let this = &*self;
        let results = join_all(prompts.iter().map(|(name, prompt)| async move {
            (name, this.complete(name.as_str(), prompt).await)
        }))
        .await;

        let mut by_name: HashMap<PromptName, AnalysisText> = results.into_iter().collect();
        let mut take = |name: PromptName| by_name.remove(&name).unwrap_or(AnalysisText::Failed);
        AnalysisBundle {
            summary: take(PromptName::Summary),
            insight: take(PromptName::Insight),
            watchlist: take(PromptName::Watchlist),
        }
    }

    /// Round 2: one synthesis completion over the round-1 outputs and the score.
    pub async fn round_two(
        &mut self,
        prompts: &ComposedPrompts,
        bundle: &AnalysisBundle,
        risk_score: RiskScore,
    ) -> (CompiledAnalysis, String) {
        self.advance(AnalysisStage::Round2Dispatched);

        let (text, prompt) = match synthesis_prompt(self.templates, prompts, bundle, risk_score) {
            Ok(prompt) => (self.complete("Compiled", &prompt).await, prompt),
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::error!(error = %detail, "synthesis prompt not rendered");
                (AnalysisText::Failed, String::new())
            }
        };
        self.advance(AnalysisStage::Done);

        let compiled = CompiledAnalysis {
            text,
            risk_score,
            watchlist: bundle.watchlist.as_str().to_string(),
        };
        (compiled, prompt)
    }

    pub async fn run(mut self, prompts: &ComposedPrompts, risk_score: RiskScore) -> AnalysisOutcome {
        let bundle = self.round_one(prompts).await;
        tracing::info!(
            date = %prompts.date,
            failed = bundle.failed_count(),
            "round 1 analysis collected"
        );

        let (compiled, synthesis_prompt) = self.round_two(prompts, &bundle, risk_score).await;
        tracing::info!(
            date = %prompts.date,
            risk_score = risk_score.value,
            sentiment = %risk_score.sentiment,
            compiled_failed = compiled.text.is_failed(),
            "round 2 analysis collected"
        );

        AnalysisOutcome {
            bundle,
            compiled,
            synthesis_prompt,
            stage: self.stage,
        }
    }
}

/// Summary prompt (with its context block), the three round-1 texts, the score, and
/// the persona instruction from the synthesis template.
pub fn synthesis_prompt(
    templates: &TemplateSet,
    prompts: &ComposedPrompts,
    bundle: &AnalysisBundle,
    risk_score: RiskScore,
) -> anyhow::Result<String> {
    let vars = json!({
        "context": prompts.get(PromptName::Summary),
        "summary": bundle.summary.as_str(),
        "insight": bundle.insight.as_str(),
        "watchlist": bundle.watchlist.as_str(),
        "risk_score": risk_score.value,
    });
    render("synthesis", &templates.synthesis, &vars)
}
