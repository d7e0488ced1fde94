use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage key of the single persisted record.
pub const STORE_KEY: &str = "feedbackSystemData";

/// A raw answer as it sits in a summary's response list.
///
/// New rating submissions are recorded as numbers. Older records (and the
/// bundled seed) carry rating labels such as `"4 - Very Good"`, which the
/// aggregator still understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Number(f64),
    Text(String),
}

impl ResponseValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseValue::Text(s) => Some(s.as_str()),
            ResponseValue::Number(_) => None,
        }
    }
}

impl From<&str> for ResponseValue {
    fn from(v: &str) -> Self {
        ResponseValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "rating")]
    Rating,
    #[serde(rename = "yesno")]
    YesNo,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "multiple-choice", alias = "multipleChoice")]
    MultipleChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    #[serde(default)]
    pub id: i64,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDefinition {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Course code, e.g. `MATH101`.
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub instructor: String,
    /// Display date, `"Due: ..."` while pending and `"Completed: ..."` after.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub questions: Vec<QuestionDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FormStatus>,
}

/// One student's answers for a form, keyed by question id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub form_id: i64,
    #[serde(default)]
    pub answers: BTreeMap<i64, ResponseValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub question: String,
    #[serde(default)]
    pub average: f64,
    #[serde(default)]
    pub responses: Vec<ResponseValue>,
}

impl QuestionSummary {
    pub fn empty(question: &str) -> Self {
        Self {
            question: question.to_string(),
            average: 0.0,
            responses: Vec::new(),
        }
    }
}

/// The whole persisted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackData {
    #[serde(default)]
    pub courses: BTreeMap<String, Vec<QuestionSummary>>,
    #[serde(default)]
    pub pending_forms: Vec<FormDefinition>,
    #[serde(default)]
    pub completed_forms: Vec<FormDefinition>,
}

impl FeedbackData {
    pub fn pending_form(&self, id: i64) -> Option<&FormDefinition> {
        self.pending_forms.iter().find(|f| f.id == id)
    }

    pub fn completed_form(&self, id: i64) -> Option<&FormDefinition> {
        self.completed_forms.iter().find(|f| f.id == id)
    }

    pub fn max_form_id(&self) -> i64 {
        self.pending_forms
            .iter()
            .chain(self.completed_forms.iter())
            .map(|f| f.id)
            .max()
            .unwrap_or(0)
    }
}
