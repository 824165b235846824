pub mod templates;

use crate::domain::analysis::PromptName;
use crate::domain::metric::{MetricSnapshot, Window};
use chrono::NaiveDate;
use serde_json::json;
use std::fmt::Write as _;
use templates::{render, TemplateSet};

/// The three round-1 prompts for one date, plus the shared context block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompts {
    pub date: NaiveDate,
    pub context: String,
    prompts: Vec<(PromptName, String)>,
}

impl ComposedPrompts {
    pub fn get(&self, name: PromptName) -> &str {
        self.prompts
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| p.as_str())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PromptName, &str)> {
        self.prompts.iter().map(|(n, p)| (*n, p.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptComposer {
    templates: TemplateSet,
}

impl PromptComposer {
    pub fn new(templates: TemplateSet) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn compose(
        &self,
        date: NaiveDate,
        snapshots: &[MetricSnapshot],
    ) -> anyhow::Result<ComposedPrompts> {
        let context = context_block(date, snapshots);
        let vars = json!({"date": date.format("%Y-%m-%d").to_string()});

        let prompts = PromptName::ALL
            .into_iter()
            .map(|name| {
                let body = render(name.as_str(), self.templates.body(name), &vars)?;
                Ok((name, format!("{context}\n{body}")))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ComposedPrompts {
            date,
            context,
            prompts,
        })
    }
}

/// `Date: <date>` followed by one line per present numeric field, in snapshot order.
pub fn context_block(date: NaiveDate, snapshots: &[MetricSnapshot]) -> String {
    let mut out = format!("Date: {}\n", date.format("%Y-%m-%d"));
    for snap in snapshots {
        let _ = writeln!(out, "{}: {:.2}", snap.name(), snap.current.value);
        for window in Window::REFERENCES {
            let (Some(label), Some(change)) = (window.change_label(), snap.change(window)) else {
                continue;
            };
            let _ = writeln!(out, "{} {label} % Change: {change:.2}", snap.name());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::{MetricDefinition, PriceObservation};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn snapshots() -> Vec<MetricSnapshot> {
        vec![
            MetricSnapshot {
                definition: MetricDefinition::new("S&P 500 ETF", "SPY", true),
                current: PriceObservation::new(dec!(500), Window::Current),
                references: BTreeMap::new(),
                changes: BTreeMap::from([
                    (Window::PriorDay, dec!(1.01)),
                    (Window::PriorMonth, dec!(4.17)),
                    (Window::PriorYear, dec!(25)),
                ]),
            },
            MetricSnapshot {
                definition: MetricDefinition::new("VIX", "^VIX", false),
                current: PriceObservation::new(dec!(14.2), Window::Current),
                references: BTreeMap::new(),
                changes: BTreeMap::from([(Window::PriorDay, dec!(-3.4))]),
            },
        ]
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn context_lists_present_fields_in_order() {
        let ctx = context_block(date(), &snapshots());
        assert_eq!(
            ctx,
            "Date: 2026-10-16\n\
             S&P 500 ETF: 500.00\n\
             S&P 500 ETF 1D % Change: 1.01\n\
             S&P 500 ETF 1M % Change: 4.17\n\
             S&P 500 ETF 1Y % Change: 25.00\n\
             VIX: 14.20\n\
             VIX 1D % Change: -3.40\n"
        );
    }

    #[test]
    fn composes_three_named_prompts() {
        let composed = PromptComposer::default().compose(date(), &snapshots()).unwrap();
        let names: Vec<_> = composed.iter().map(|(n, _)| n).collect();
        assert_eq!(names, PromptName::ALL);
        for (name, prompt) in composed.iter() {
            assert!(prompt.starts_with(&composed.context), "{name}");
            assert!(prompt.contains("2026-10-16"), "{name}");
            assert!(!prompt.contains("{{ date }}"), "{name}");
        }
        assert!(composed.get(PromptName::Watchlist).ends_with("Watchlist:\n"));
    }

    #[test]
    fn composition_is_deterministic() {
        let composer = PromptComposer::default();
        let a = composer.compose(date(), &snapshots()).unwrap();
        let b = composer.compose(date(), &snapshots()).unwrap();
        assert_eq!(a, b);
        for name in PromptName::ALL {
            assert_eq!(a.get(name).as_bytes(), b.get(name).as_bytes());
        }
    }

    #[test]
    fn custom_templates_are_used() {
        let templates = TemplateSet {
            summary: "S {{ date }}".into(),
            insight: "I".into(),
            watchlist: "W".into(),
            ..TemplateSet::default()
        };
        let composed = PromptComposer::new(templates).compose(date(), &[]).unwrap();
        assert_eq!(composed.get(PromptName::Summary), "Date: 2026-10-16\n\nS 2026-10-16");
        assert_eq!(composed.get(PromptName::Insight), "Date: 2026-10-16\n\nI");
    }
}
