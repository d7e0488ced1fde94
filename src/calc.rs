use crate::model::{FeedbackData, FormDefinition, QuestionKind, QuestionSummary, ResponseValue};
use serde::Serialize;
use std::collections::BTreeSet;

/// Averages live on a 0-5 scale for every question kind.
pub const SCALE_MAX: f64 = 5.0;

const COURSE_SEPARATOR: &str = " - ";

/// Course bucket a form's answers aggregate into: the title segment before
/// the first `" - "`, trimmed. A title without the separator is its own bucket.
/// Trimming puts `"Math  - X"` and `"Math - X"` in the same bucket.
pub fn course_bucket_name(title: &str) -> &str {
    title
        .split_once(COURSE_SEPARATOR)
        .map(|(head, _)| head)
        .unwrap_or(title)
        .trim()
}

pub fn rating_label(rating: i64) -> &'static str {
    match rating {
        1 => "Poor",
        2 => "Fair",
        3 => "Good",
        4 => "Very Good",
        5 => "Excellent",
        _ => "Unknown",
    }
}

/// Numeric reading of a rating response.
///
/// Strings are parsed leniently: the leading integer wins, so `"4 - Very Good"`
/// reads as 4. Anything without a leading integer is not a rating.
pub fn rating_value(v: &ResponseValue) -> Option<f64> {
    match v {
        ResponseValue::Number(n) if n.is_finite() => Some(*n),
        ResponseValue::Number(_) => None,
        ResponseValue::Text(s) => leading_int(s).map(|n| n as f64),
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| sign * n)
}

pub fn rating_average(responses: &[ResponseValue]) -> f64 {
    let mut sum = 0.0;
    let mut n: usize = 0;
    for v in responses.iter().filter_map(rating_value) {
        sum += v;
        n += 1;
    }
    if n > 0 {
        sum / (n as f64)
    } else {
        0.0
    }
}

pub fn yes_share_average(responses: &[ResponseValue]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let yes = responses
        .iter()
        .filter(|r| r.as_text() == Some("Yes"))
        .count();
    (yes as f64 / responses.len() as f64) * SCALE_MAX
}

/// Average of a response list under a question kind. Free-text and choice
/// questions have no numeric scale and always average 0.
pub fn average_for(kind: QuestionKind, responses: &[ResponseValue]) -> f64 {
    match kind {
        QuestionKind::Rating => rating_average(responses),
        QuestionKind::YesNo => yes_share_average(responses),
        // Free-form answers have no 0-5 scale, so they never go through the
        // yes-share formula.
        QuestionKind::Text | QuestionKind::MultipleChoice => 0.0,
    }
}

/// Appends `value` to `responses` and returns the new list with its average.
pub fn aggregate(
    kind: QuestionKind,
    responses: &[ResponseValue],
    value: ResponseValue,
) -> (Vec<ResponseValue>, f64) {
    let mut next = Vec::with_capacity(responses.len() + 1);
    next.extend_from_slice(responses);
    next.push(normalize_answer(kind, value));
    let avg = average_for(kind, &next);
    (next, avg)
}

/// Ratings submitted as labels are stored as their number when one can be read.
fn normalize_answer(kind: QuestionKind, value: ResponseValue) -> ResponseValue {
    match (kind, &value) {
        (QuestionKind::Rating, ResponseValue::Text(_)) => match rating_value(&value) {
            Some(n) => ResponseValue::Number(n),
            None => value,
        },
        _ => value,
    }
}

pub fn record_response(summary: &mut QuestionSummary, kind: QuestionKind, value: ResponseValue) {
    let (responses, average) = aggregate(kind, &summary.responses, value);
    summary.responses = responses;
    summary.average = average;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingBucket {
    pub rating: i64,
    pub label: &'static str,
    pub count: usize,
}

/// Count of responses per whole rating 1..=5. Values that do not read as a
/// rating in that range are skipped.
pub fn rating_distribution(responses: &[ResponseValue]) -> Vec<RatingBucket> {
    let mut counts = [0usize; 5];
    for v in responses.iter().filter_map(rating_value) {
        let r = v.round() as i64;
        if (1..=5).contains(&r) {
            counts[(r - 1) as usize] += 1;
        }
    }
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let rating = i as i64 + 1;
            RatingBucket {
                rating,
                label: rating_label(rating),
                count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub name: String,
    pub questions: usize,
    pub responses: usize,
    pub average: f64,
    /// Longest response list; the best available estimate of how many
    /// students answered.
    pub respondents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub overall_average: f64,
    pub total_responses: usize,
    pub course_count: usize,
    pub courses: Vec<CourseSummary>,
}

pub fn course_summary(name: &str, questions: &[QuestionSummary]) -> CourseSummary {
    let responses = questions.iter().map(|q| q.responses.len()).sum();
    let average = if questions.is_empty() {
        0.0
    } else {
        questions.iter().map(|q| q.average).sum::<f64>() / questions.len() as f64
    };
    CourseSummary {
        name: name.to_string(),
        questions: questions.len(),
        responses,
        average,
        respondents: questions
            .iter()
            .map(|q| q.responses.len())
            .max()
            .unwrap_or(0),
    }
}

/// Dashboard overview. With `instructor`, only courses whose forms name a
/// matching instructor are included.
pub fn overview(data: &FeedbackData, instructor: Option<&str>) -> Overview {
    let taught = instructor.map(|name| courses_taught_by(data, name));
    let courses: Vec<CourseSummary> = data
        .courses
        .iter()
        .filter(|(name, _)| taught.as_ref().map_or(true, |set| set.contains(*name)))
        .map(|(name, qs)| course_summary(name, qs))
        .collect();

    let overall_average = if courses.is_empty() {
        0.0
    } else {
        courses.iter().map(|c| c.average).sum::<f64>() / courses.len() as f64
    };
    Overview {
        overall_average,
        total_responses: courses.iter().map(|c| c.responses).sum(),
        course_count: courses.len(),
        courses,
    }
}

/// Course bucket names of every pending or completed form whose instructor
/// matches `faculty_name`.
pub fn courses_taught_by(data: &FeedbackData, faculty_name: &str) -> BTreeSet<String> {
    let who = normalize_person_name(faculty_name);
    let mut out = BTreeSet::new();
    if who.is_empty() {
        return out;
    }
    for form in data.pending_forms.iter().chain(data.completed_forms.iter()) {
        let instr = normalize_person_name(&form.instructor);
        if instr.is_empty() || !names_match(&who, &instr) {
            continue;
        }
        let base = form_bucket_name(form);
        if !base.is_empty() {
            out.insert(base.to_string());
        }
    }
    out
}

fn form_bucket_name(form: &FormDefinition) -> &str {
    if form.title.is_empty() {
        course_bucket_name(&form.course)
    } else {
        course_bucket_name(&form.title)
    }
}

/// Lowercased name without academic titles or punctuation.
pub fn normalize_person_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect::<String>()
        .to_lowercase();
    cleaned
        .split_whitespace()
        .filter(|t| !matches!(*t, "dr" | "prof" | "professor"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn names_match(user: &str, instructor: &str) -> bool {
    if instructor.contains(user) || user.contains(instructor) {
        return true;
    }
    let instr_tokens: Vec<&str> = instructor.split_whitespace().collect();
    user.split_whitespace().filter(|t| t.len() > 1).any(|ut| {
        instr_tokens
            .iter()
            .any(|it| *it == ut || it.contains(ut) || ut.contains(it))
    })
}
