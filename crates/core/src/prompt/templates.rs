use crate::domain::analysis::PromptName;
use anyhow::Context;
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{json, Value};
use std::path::Path;

pub const SUMMARY: &str = "\
For the data from {{ date }}, provide a one-sentence summary identifying the most significant \
movements without repeating the data. Compile a bullet point list of the Daily Sojourn Insight \
Metrics (SIMs) price and change [price (%change)] using $ and % signs, except for yields and \
currencies which use only % signs, with no commentary, segmented into \"bullish\", \"neutral\" \
and \"bearish\" based on the percent change.
- Sort bullets from the most positive % change at the top of bullish to the most negative % \
change at the bottom of bearish.

Also, summarize into a haiku.

Summary:
";

pub const INSIGHT: &str = "\
Analyze the Daily Sojourn Insight Metrics (SIMs) for {{ date }} with emphasis on their economic \
implications and market sentiment shift or continuation indicators. Detail 1 critical insight \
one-liner for each of the following:

- Risk On/Risk Off
- Economic Implications
- Trends or Shifts

Insight:
";

pub const WATCHLIST: &str = "\
From the {{ date }} Daily Sojourn Insight Metrics (SIMs), identify the top 3 tickers to watch and \
list only the tickers separated by \", \"

Watchlist:
";

pub const SYNTHESIS: &str = "\
Using the following Daily Sojourn Insight Metrics (SIMs) and analysis:

SIMs Context:
{{ context }}

First Analysis:
{{ summary }}
{{ insight }}
{{ watchlist }}

Provide a succinct summary integrating all the inputs, clear and objective but without \
unnecessary embellishments, inspired by the style of Charlie Munger. Additionally, comment on \
the risk-on score of {{ risk_score }} out of 10 and the overall market sentiment.
";

/// Prompt name → template body, plus the round-2 synthesis body.
///
/// Bodies are Jinja templates. Round-1 bodies may reference `{{ date }}`; the synthesis
/// body may reference `{{ context }}`, `{{ summary }}`, `{{ insight }}`, `{{ watchlist }}`
/// and `{{ risk_score }}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub summary: String,
    pub insight: String,
    pub watchlist: String,
    pub synthesis: String,
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            summary: SUMMARY.to_string(),
            insight: INSIGHT.to_string(),
            watchlist: WATCHLIST.to_string(),
            synthesis: SYNTHESIS.to_string(),
        }
    }
}

impl TemplateSet {
    pub fn body(&self, name: PromptName) -> &str {
        match name {
            PromptName::Summary => &self.summary,
            PromptName::Insight => &self.insight,
            PromptName::Watchlist => &self.watchlist,
        }
    }

    /// Built-in bodies, overridden by `summary.txt`, `insight.txt`, `watchlist.txt` and
    /// `synthesis.txt` when present in `dir`. Every body must render with its variables.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut set = Self::default();
        let slots: [(&str, &mut String); 4] = [
            ("summary.txt", &mut set.summary),
            ("insight.txt", &mut set.insight),
            ("watchlist.txt", &mut set.watchlist),
            ("synthesis.txt", &mut set.synthesis),
        ];
        for (file, slot) in slots {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read template {}", path.display()))?;
            anyhow::ensure!(
                !body.trim().is_empty(),
                "template {} is empty",
                path.display()
            );
            tracing::info!(template = %path.display(), "loaded prompt template override");
            *slot = body;
        }
        set.validate()?;
        Ok(set)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var("SIMS_TEMPLATES_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::from_dir(Path::new(dir.trim())),
            _ => Ok(Self::default()),
        }
    }

    /// Renders each body once against placeholder values.
    pub fn validate(&self) -> anyhow::Result<()> {
        let date = json!({"date": "1970-01-01"});
        for name in PromptName::ALL {
            render(name.as_str(), self.body(name), &date)?;
        }
        render(
            "synthesis",
            &self.synthesis,
            &json!({
                "context": "",
                "summary": "",
                "insight": "",
                "watchlist": "",
                "risk_score": 0,
            }),
        )?;
        Ok(())
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Renders one template body. Every variable the body references must be present in
/// `vars`; substituted values are inserted verbatim and never rendered again.
pub fn render(name: &str, template: &str, vars: &Value) -> anyhow::Result<String> {
    environment()
        .render_str(template, minijinja::Value::from_serialize(vars))
        .with_context(|| format!("failed to render prompt template {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_inserted_verbatim() {
        let vars = json!({"date": "2026-10-16", "summary": "{{ date }} stays literal"});
        let out = render("t", "On {{ date }}: {{ summary }}", &vars).unwrap();
        assert_eq!(out, "On 2026-10-16: {{ date }} stays literal");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let err = render("summary", "For {{ day }}", &json!({"date": "2026-10-16"})).unwrap_err();
        assert!(err.to_string().contains("summary"));
    }

    #[test]
    fn trailing_newline_is_kept() {
        assert_eq!(render("t", "Watchlist:\n", &json!({})).unwrap(), "Watchlist:\n");
    }

    #[test]
    fn default_bodies_reference_the_date_and_validate() {
        let set = TemplateSet::default();
        for name in PromptName::ALL {
            assert!(set.body(name).contains("{{ date }}"), "{name}");
        }
        assert!(set.synthesis.contains("{{ risk_score }}"));
        set.validate().unwrap();
    }

    #[test]
    fn directory_overrides_only_present_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("watchlist.txt"), "Three tickers for {{ date }}:\n").unwrap();

        let set = TemplateSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.watchlist, "Three tickers for {{ date }}:\n");
        assert_eq!(set.summary, SUMMARY);
    }

    #[test]
    fn broken_override_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("insight.txt"), "Insight for {{ date").unwrap();
        assert!(TemplateSet::from_dir(dir.path()).is_err());
    }
}
