//! Conversion of raw model output into a well-formed [`Analysis`].
//!
//! Model replies are loosely typed: fields go missing, ids are absent or
//! repeated, confidences drift outside [0, 1]. Everything is normalized here
//! so the rest of the system only ever sees valid analyses.

use serde::Deserialize;
use std::collections::HashSet;

use crate::model::{clamp_confidence, Analysis, Assumption, Priority, Question};

const DEFAULT_CONFIDENCE: f64 = 0.5;

/// How ids are assigned to questions and assumptions that arrive without one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdScheme {
    /// First analysis of a requirement: `q1`, `a1`
    Initial,
    /// Refinement producing iteration `n`: `iter3_q1`, `iter3_a1`
    Iteration(usize),
    /// Follow-up questions generated at a point in time: `new_q{millis}_0`
    Additional(i64),
}

impl IdScheme {
    fn question_id(&self, index: usize) -> String {
        match self {
            IdScheme::Initial => format!("q{}", index + 1),
            IdScheme::Iteration(n) => format!("iter{}_q{}", n, index + 1),
            IdScheme::Additional(millis) => format!("new_q{}_{}", millis, index),
        }
    }

    fn assumption_id(&self, index: usize) -> String {
        match self {
            IdScheme::Initial => format!("a{}", index + 1),
            IdScheme::Iteration(n) => format!("iter{}_a{}", n, index + 1),
            IdScheme::Additional(millis) => format!("new_a{}_{}", millis, index),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawAnalysis {
    pub goals: Vec<String>,
    pub constraints: Vec<String>,
    pub dependencies: Vec<String>,
    pub edge_cases: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub questions: Vec<RawQuestion>,
    pub assumptions: Vec<RawAssumption>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawQuestion {
    pub id: Option<String>,
    pub text: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAssumption {
    pub id: Option<String>,
    pub text: Option<String>,
    /// Models occasionally send numbers as strings
    pub confidence: Option<serde_json::Value>,
    pub accepted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawQuestions {
    pub questions: Vec<RawQuestion>,
}

impl RawAnalysis {
    pub fn into_analysis(self, scheme: IdScheme) -> Analysis {
        Analysis {
            goals: clean_list(self.goals),
            constraints: clean_list(self.constraints),
            dependencies: clean_list(self.dependencies),
            edge_cases: clean_list(self.edge_cases),
            acceptance_criteria: clean_list(self.acceptance_criteria),
            questions: ingest_questions(self.questions, scheme),
            assumptions: ingest_assumptions(self.assumptions, scheme),
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn ingest_questions(raw: Vec<RawQuestion>, scheme: IdScheme) -> Vec<Question> {
    let mut ids = UniqueIds::default();
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, q)| {
            let text = q.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            let id = ids.claim(non_empty(q.id).unwrap_or_else(|| scheme.question_id(index)));
            Some(Question {
                id,
                text,
                priority: q
                    .priority
                    .as_deref()
                    .map(Priority::parse_lenient)
                    .unwrap_or_default(),
                answer: None,
            })
        })
        .collect()
}

pub fn ingest_assumptions(raw: Vec<RawAssumption>, scheme: IdScheme) -> Vec<Assumption> {
    let mut ids = UniqueIds::default();
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, a)| {
            let text = a.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
            let id = ids.claim(non_empty(a.id).unwrap_or_else(|| scheme.assumption_id(index)));
            let confidence = a
                .confidence
                .as_ref()
                .and_then(confidence_from_value)
                .unwrap_or(DEFAULT_CONFIDENCE);
            Some(Assumption {
                id,
                text,
                confidence: clamp_confidence(confidence),
                accepted: a.accepted.unwrap_or(true),
            })
        })
        .collect()
}

fn confidence_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    }
}

fn non_empty(id: Option<String>) -> Option<String> {
    id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Hands out ids, suffixing repeats so each id is unique within its collection
#[derive(Default)]
struct UniqueIds {
    seen: HashSet<String>,
}

impl UniqueIds {
    fn claim(&mut self, id: String) -> String {
        if self.seen.insert(id.clone()) {
            return id;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", id, n);
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}
