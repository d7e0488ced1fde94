use crate::calc;
use crate::db::KvBackend;
use crate::model::{
    FeedbackData, FormDefinition, FormResponse, FormStatus, QuestionSummary, ResponseValue, STORE_KEY,
};
use chrono::{Days, Local, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

const DATE_FORMAT: &str = "%b %-d, %Y";
const DUE_AFTER_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("form not found: {0}")]
    FormNotFound(i64),
    #[error("invalid form: {0}")]
    InvalidForm(String),
    #[error("failed to persist feedback data: {0:#}")]
    Persist(anyhow::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::FormNotFound(_) => "not_found",
            StoreError::InvalidForm(_) => "invalid_form",
            StoreError::Persist(_) => "db_update_failed",
        }
    }
}

/// Owner of the feedback record: courses, pending forms and completed forms.
///
/// Every mutation writes the whole record back under [`STORE_KEY`]. If the
/// write fails the in-memory record is restored to what it was before the call.
pub struct FeedbackStore {
    backend: Box<dyn KvBackend>,
    data: FeedbackData,
}

impl FeedbackStore {
    /// Loads the persisted record, or seeds one when there is none.
    ///
    /// A record that no longer parses is treated like a missing one: the seed
    /// replaces it.
    pub fn open(
        backend: Box<dyn KvBackend>,
        seed: impl FnOnce() -> FeedbackData,
    ) -> anyhow::Result<Self> {
        let persisted = match backend.get(STORE_KEY)? {
            Some(text) => match serde_json::from_str::<FeedbackData>(&text) {
                Ok(v) => Some(v),
                Err(e) => {
                    log::warn!("persisted feedback data is malformed ({e}); reseeding");
                    None
                }
            },
            None => None,
        };

        let (data, seeded) = match persisted {
            Some(v) => (v, false),
            None => (seed(), true),
        };
        let mut store = Self { backend, data };
        let dropped = store.drop_pending_duplicates();
        if seeded || dropped > 0 {
            store.persist()?;
        }
        if seeded {
            log::info!(
                "seeded feedback data: {} courses, {} pending forms",
                store.data.courses.len(),
                store.data.pending_forms.len()
            );
        }
        Ok(store)
    }

    pub fn data(&self) -> &FeedbackData {
        &self.data
    }

    pub fn submit(&mut self, response: &FormResponse) -> Result<&FeedbackData, StoreError> {
        self.submit_feedback(response.form_id, &response.answers)
    }

    /// Applies one student's answers to `form_id`, stamping today's date.
    pub fn submit_feedback(
        &mut self,
        form_id: i64,
        responses: &BTreeMap<i64, ResponseValue>,
    ) -> Result<&FeedbackData, StoreError> {
        self.submit_feedback_on(form_id, responses, Local::now().date_naive())
    }

    pub fn submit_feedback_on(
        &mut self,
        form_id: i64,
        responses: &BTreeMap<i64, ResponseValue>,
        completed_on: NaiveDate,
    ) -> Result<&FeedbackData, StoreError> {
        let Some(pos) = self.data.pending_forms.iter().position(|f| f.id == form_id) else {
            return Err(StoreError::FormNotFound(form_id));
        };
        let before = self.data.clone();

        let mut form = self.data.pending_forms.remove(pos);
        let bucket_name = calc::course_bucket_name(&form.title).to_string();
        let bucket = self
            .data
            .courses
            .entry(bucket_name.clone())
            .or_insert_with(|| {
                form.questions
                    .iter()
                    .map(|q| QuestionSummary::empty(&q.text))
                    .collect()
            });

        let mut answered = 0usize;
        for (idx, q) in form.questions.iter().enumerate() {
            let Some(value) = responses.get(&q.id) else {
                continue;
            };
            // Buckets built from an older, shorter form grow to fit.
            while bucket.len() <= idx {
                let text = &form.questions[bucket.len()].text;
                bucket.push(QuestionSummary::empty(text));
            }
            calc::record_response(&mut bucket[idx], q.kind, value.clone());
            answered += 1;
        }

        form.status = Some(FormStatus::Completed);
        form.date = format!("Completed: {}", completed_on.format(DATE_FORMAT));
        self.data.completed_forms.push(form);

        self.commit(before)?;
        log::info!("form {form_id} completed; {answered} answers added to {bucket_name:?}");
        Ok(&self.data)
    }

    /// Adds a new pending form and returns its id.
    pub fn add_form(&mut self, form: FormDefinition) -> Result<i64, StoreError> {
        self.add_form_on(form, Local::now().date_naive())
    }

    pub fn add_form_on(
        &mut self,
        mut form: FormDefinition,
        today: NaiveDate,
    ) -> Result<i64, StoreError> {
        prepare_form(&mut form)?;
        let before = self.data.clone();

        form.id = self
            .data
            .max_form_id()
            .checked_add(1)
            .ok_or_else(|| StoreError::InvalidForm("no form id left to assign".into()))?;
        if form.date.trim().is_empty() {
            let due = today
                .checked_add_days(Days::new(DUE_AFTER_DAYS))
                .unwrap_or(today);
            form.date = format!("Due: {}", due.format(DATE_FORMAT));
        }
        let id = form.id;
        self.data.pending_forms.push(form);

        self.commit(before)?;
        log::info!("form {id} added");
        Ok(id)
    }

    pub fn update_form(
        &mut self,
        form_id: i64,
        mut form: FormDefinition,
    ) -> Result<&FeedbackData, StoreError> {
        let Some(pos) = self.data.pending_forms.iter().position(|f| f.id == form_id) else {
            return Err(StoreError::FormNotFound(form_id));
        };
        prepare_form(&mut form)?;
        let before = self.data.clone();

        form.id = form_id;
        if form.date.trim().is_empty() {
            form.date = self.data.pending_forms[pos].date.clone();
        }
        self.data.pending_forms[pos] = form;

        self.commit(before)?;
        log::info!("form {form_id} updated");
        Ok(&self.data)
    }

    /// Removes a pending form. Completed forms are never touched.
    pub fn delete_form(&mut self, form_id: i64) -> Result<&FeedbackData, StoreError> {
        let Some(pos) = self.data.pending_forms.iter().position(|f| f.id == form_id) else {
            return Err(StoreError::FormNotFound(form_id));
        };
        let before = self.data.clone();
        self.data.pending_forms.remove(pos);

        self.commit(before)?;
        log::info!("form {form_id} deleted");
        Ok(&self.data)
    }

    fn persist(&self) -> anyhow::Result<()> {
        let text = serde_json::to_string(&self.data)?;
        self.backend.put(STORE_KEY, &text)
    }

    fn commit(&mut self, before: FeedbackData) -> Result<(), StoreError> {
        if let Err(e) = self.persist() {
            log::error!("persist failed, rolling back: {e:#}");
            self.data = before;
            return Err(StoreError::Persist(e));
        }
        Ok(())
    }

    /// A form id present in both sets counts as completed.
    fn drop_pending_duplicates(&mut self) -> usize {
        let completed: HashSet<i64> = self.data.completed_forms.iter().map(|f| f.id).collect();
        let n = self.data.pending_forms.len();
        self.data
            .pending_forms
            .retain(|f| !completed.contains(&f.id));
        let dropped = n - self.data.pending_forms.len();
        if dropped > 0 {
            log::warn!("dropped {dropped} pending forms that were already completed");
        }
        dropped
    }
}

/// Checks a form from the builder and gives id-less questions fresh ids.
fn prepare_form(form: &mut FormDefinition) -> Result<(), StoreError> {
    if form.title.trim().is_empty() {
        return Err(StoreError::InvalidForm("title must not be empty".into()));
    }
    if form.course.trim().is_empty() {
        return Err(StoreError::InvalidForm("course must not be empty".into()));
    }
    if form.questions.is_empty() {
        return Err(StoreError::InvalidForm(
            "form needs at least one question".into(),
        ));
    }
    let mut seen = HashSet::new();
    for q in &form.questions {
        if q.text.trim().is_empty() {
            return Err(StoreError::InvalidForm(
                "question text must not be empty".into(),
            ));
        }
        if q.id != 0 && !seen.insert(q.id) {
            return Err(StoreError::InvalidForm(format!(
                "duplicate question id {}",
                q.id
            )));
        }
    }

    let mut next = form.questions.iter().map(|q| q.id).max().unwrap_or(0);
    for q in form.questions.iter_mut().filter(|q| q.id == 0) {
        next = next
            .checked_add(1)
            .ok_or_else(|| StoreError::InvalidForm("no question id left to assign".into()))?;
        q.id = next;
    }
    form.status = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionDefinition, QuestionKind};
    use crate::seed;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryKv {
        map: Rc<RefCell<HashMap<String, String>>>,
        fail_writes: Rc<Cell<bool>>,
    }

    impl KvBackend for MemoryKv {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.map.borrow().get(key).cloned())
        }

        fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if self.fail_writes.get() {
                anyhow::bail!("disk full");
            }
            self.map.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn question(id: i64, text: &str, kind: QuestionKind) -> QuestionDefinition {
        QuestionDefinition {
            id,
            text: text.into(),
            kind,
            options: None,
        }
    }

    fn form(title: &str, questions: Vec<QuestionDefinition>) -> FormDefinition {
        FormDefinition {
            id: 0,
            title: title.into(),
            description: "desc".into(),
            course: "CODE1".into(),
            instructor: "Dr. Who".into(),
            date: String::new(),
            questions,
            status: None,
        }
    }

    fn empty_store(kv: &MemoryKv) -> FeedbackStore {
        FeedbackStore::open(Box::new(kv.clone()), FeedbackData::default).expect("open store")
    }

    fn answers(pairs: &[(i64, ResponseValue)]) -> BTreeMap<i64, ResponseValue> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn open_seeds_and_persists_when_empty() {
        let kv = MemoryKv::default();
        let store = FeedbackStore::open(Box::new(kv.clone()), seed::bundled).expect("open");
        assert_eq!(store.data().pending_forms.len(), 3);
        let saved = kv.map.borrow().get(STORE_KEY).cloned().expect("persisted");
        let back: FeedbackData = serde_json::from_str(&saved).expect("parse persisted");
        assert_eq!(&back, store.data());
    }

    #[test]
    fn malformed_record_falls_back_to_seed() {
        let kv = MemoryKv::default();
        kv.map
            .borrow_mut()
            .insert(STORE_KEY.to_string(), "{\"courses\": [1, 2".to_string());
        let store = FeedbackStore::open(Box::new(kv.clone()), seed::bundled).expect("open");
        assert_eq!(store.data(), &seed::bundled());
        let saved = kv.map.borrow().get(STORE_KEY).cloned().expect("rewritten");
        assert!(serde_json::from_str::<FeedbackData>(&saved).is_ok());
    }

    #[test]
    fn existing_record_is_not_reseeded() {
        let kv = MemoryKv::default();
        {
            let mut store = empty_store(&kv);
            store
                .add_form_on(
                    form("Art - Drawing", vec![question(1, "Fun?", QuestionKind::YesNo)]),
                    date(2025, 1, 1),
                )
                .expect("add");
        }
        let store = FeedbackStore::open(Box::new(kv.clone()), seed::bundled).expect("reopen");
        assert_eq!(store.data().pending_forms.len(), 1);
        assert_eq!(store.data().pending_forms[0].title, "Art - Drawing");
    }

    #[test]
    fn submit_moves_form_and_builds_bucket() {
        let kv = MemoryKv::default();
        let mut store = empty_store(&kv);
        let id = store
            .add_form_on(
                form(
                    "Chemistry - Organic",
                    vec![
                        question(1, "Teaching quality", QuestionKind::Rating),
                        question(2, "Labs useful?", QuestionKind::YesNo),
                        question(3, "Comments", QuestionKind::Text),
                    ],
                ),
                date(2025, 12, 1),
            )
            .expect("add");

        let data = store
            .submit_feedback_on(
                id,
                &answers(&[
                    (1, ResponseValue::Number(4.0)),
                    (2, "Yes".into()),
                ]),
                date(2025, 12, 3),
            )
            .expect("submit");

        assert!(data.pending_form(id).is_none());
        let done = data.completed_form(id).expect("completed");
        assert_eq!(done.status, Some(FormStatus::Completed));
        assert_eq!(done.date, "Completed: Dec 3, 2025");
        assert_eq!(data.completed_forms.iter().filter(|f| f.id == id).count(), 1);

        let bucket = data.courses.get("Chemistry").expect("bucket");
        assert_eq!(bucket.len(), 3);
        assert_eq!(bucket[0].question, "Teaching quality");
        assert_eq!(bucket[0].responses, vec![ResponseValue::Number(4.0)]);
        assert!((bucket[0].average - 4.0).abs() < 1e-9);
        assert!((bucket[1].average - 5.0).abs() < 1e-9);
        // Unanswered questions keep an empty summary.
        assert!(bucket[2].responses.is_empty());
        assert_eq!(bucket[2].average, 0.0);
    }

    #[test]
    fn second_submit_of_same_form_changes_nothing() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv.clone()), seed::bundled).expect("open");
        let a = answers(&[(1, ResponseValue::Number(5.0)), (4, "No".into())]);
        store
            .submit_feedback_on(1, &a, date(2025, 12, 10))
            .expect("first submit");
        let snapshot = store.data().clone();
        let persisted = kv.map.borrow().get(STORE_KEY).cloned();

        let err = store
            .submit_feedback_on(1, &a, date(2025, 12, 11))
            .expect_err("second submit");
        assert!(matches!(err, StoreError::FormNotFound(1)));
        assert_eq!(err.code(), "not_found");
        assert_eq!(store.data(), &snapshot);
        assert_eq!(kv.map.borrow().get(STORE_KEY).cloned(), persisted);
    }

    #[test]
    fn seeded_bucket_is_updated_in_place() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv), seed::bundled).expect("open");
        // Mathematics already has five summaries with five labelled responses each.
        store
            .submit_feedback_on(
                1,
                &answers(&[(1, ResponseValue::Number(1.0)), (4, "Yes".into())]),
                date(2025, 12, 10),
            )
            .expect("submit");
        let math = &store.data().courses["Mathematics"];
        assert_eq!(math.len(), 5);
        assert_eq!(math[0].responses.len(), 6);
        // 5+4+5+3+4+1 = 22
        assert!((math[0].average - 22.0 / 6.0).abs() < 1e-9);
        // Yes,No,Yes,Yes,No,Yes
        assert!((math[3].average - 4.0 / 6.0 * 5.0).abs() < 1e-9);
        assert_eq!(math[1].responses.len(), 5);
    }

    #[test]
    fn shorter_existing_bucket_grows() {
        let kv = MemoryKv::default();
        let mut store = empty_store(&kv);
        let first = store
            .add_form_on(
                form("Music - Theory", vec![question(1, "Q1", QuestionKind::Rating)]),
                date(2025, 1, 1),
            )
            .expect("add first");
        store
            .submit_feedback_on(first, &answers(&[(1, ResponseValue::Number(3.0))]), date(2025, 1, 2))
            .expect("submit first");

        let second = store
            .add_form_on(
                form(
                    "Music - Practice",
                    vec![
                        question(1, "Q1", QuestionKind::Rating),
                        question(2, "Q2", QuestionKind::YesNo),
                    ],
                ),
                date(2025, 1, 1),
            )
            .expect("add second");
        let data = store
            .submit_feedback_on(
                second,
                &answers(&[(1, ResponseValue::Number(5.0)), (2, "No".into())]),
                date(2025, 1, 3),
            )
            .expect("submit second");
        let music = &data.courses["Music"];
        assert_eq!(music.len(), 2);
        assert!((music[0].average - 4.0).abs() < 1e-9);
        assert_eq!(music[1].question, "Q2");
        assert_eq!(music[1].average, 0.0);
        assert_eq!(music[1].responses.len(), 1);
    }

    #[test]
    fn add_form_assigns_ids_and_due_date() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv), seed::bundled).expect("open");
        let id = store
            .add_form_on(
                form(
                    "History - Modern",
                    vec![
                        question(0, "Q1", QuestionKind::Rating),
                        question(7, "Q2", QuestionKind::YesNo),
                        question(0, "Q3", QuestionKind::Text),
                    ],
                ),
                date(2025, 12, 28),
            )
            .expect("add");
        // Seed ids run up to 4.
        assert_eq!(id, 5);
        let f = store.data().pending_form(id).expect("pending");
        assert_eq!(f.date, "Due: Jan 4, 2026");
        let ids: Vec<i64> = f.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![8, 7, 9]);
    }

    #[test]
    fn add_form_rejects_incomplete_forms() {
        let kv = MemoryKv::default();
        let mut store = empty_store(&kv);
        let no_questions = form("X - Y", Vec::new());
        assert!(matches!(
            store.add_form(no_questions),
            Err(StoreError::InvalidForm(_))
        ));
        let mut no_course = form("X - Y", vec![question(1, "Q", QuestionKind::Rating)]);
        no_course.course = "  ".into();
        assert!(matches!(store.add_form(no_course), Err(StoreError::InvalidForm(_))));
        let dup = form(
            "X - Y",
            vec![
                question(1, "Q", QuestionKind::Rating),
                question(1, "R", QuestionKind::Rating),
            ],
        );
        assert!(matches!(store.add_form(dup), Err(StoreError::InvalidForm(_))));
        assert!(store.data().pending_forms.is_empty());
    }

    #[test]
    fn update_keeps_id_and_rejects_unknown() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv), seed::bundled).expect("open");
        let mut edited = form("Physics - Optics Lab", vec![question(1, "Clear?", QuestionKind::YesNo)]);
        edited.id = 99;
        let data = store.update_form(3, edited.clone()).expect("update");
        let f = data.pending_form(3).expect("still pending");
        assert_eq!(f.title, "Physics - Optics Lab");
        assert_eq!(f.date, "Due: Dec 20, 2025");
        assert!(data.pending_form(99).is_none());

        assert!(matches!(
            store.update_form(4, edited),
            Err(StoreError::FormNotFound(4))
        ));
    }

    #[test]
    fn delete_only_touches_pending() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv), seed::bundled).expect("open");
        let completed_before = store.data().completed_forms.clone();
        let data = store.delete_form(2).expect("delete");
        assert!(data.pending_form(2).is_none());
        assert_eq!(data.pending_forms.len(), 2);
        assert_eq!(data.completed_forms, completed_before);

        // Completed forms cannot be deleted through the pending set.
        assert!(matches!(store.delete_form(4), Err(StoreError::FormNotFound(4))));
        assert_eq!(store.data().completed_forms, completed_before);
    }

    #[test]
    fn failed_write_rolls_back() {
        let kv = MemoryKv::default();
        let mut store = FeedbackStore::open(Box::new(kv.clone()), seed::bundled).expect("open");
        let before = store.data().clone();
        kv.fail_writes.set(true);
        let err = store
            .submit_feedback_on(1, &answers(&[(1, ResponseValue::Number(5.0))]), date(2025, 12, 1))
            .expect_err("write fails");
        assert_eq!(err.code(), "db_update_failed");
        assert_eq!(store.data(), &before);
    }

    #[test]
    fn form_in_both_sets_is_treated_as_completed() {
        let kv = MemoryKv::default();
        let mut data = seed::bundled();
        let mut dup = data.pending_forms[0].clone();
        dup.status = Some(FormStatus::Completed);
        data.completed_forms.push(dup);
        let store = FeedbackStore::open(Box::new(kv), move || data).expect("open");
        assert!(store.data().pending_form(1).is_none());
        assert!(store.data().completed_form(1).is_some());
    }

    #[test]
    fn question_id_overflow_is_rejected() {
        let kv = MemoryKv::default();
        let mut store = empty_store(&kv);
        let f = form(
            "Art - Drawing",
            vec![
                question(i64::MAX, "Fun?", QuestionKind::YesNo),
                question(0, "Hard?", QuestionKind::Rating),
            ],
        );
        let err = store.add_form_on(f, date(2025, 1, 1)).expect_err("no id left");
        assert_eq!(err.code(), "invalid_form");
        assert!(store.data().pending_forms.is_empty());
    }

    #[test]
    fn form_id_overflow_is_rejected() {
        let kv = MemoryKv::default();
        let mut data = FeedbackData::default();
        let mut done = form("Art - Drawing", vec![question(1, "Fun?", QuestionKind::YesNo)]);
        done.id = i64::MAX;
        done.status = Some(FormStatus::Completed);
        data.completed_forms.push(done);
        let mut store = FeedbackStore::open(Box::new(kv), move || data).expect("open");
        let before = store.data().clone();

        let err = store
            .add_form_on(
                form("Art - Painting", vec![question(1, "Fun?", QuestionKind::YesNo)]),
                date(2025, 1, 1),
            )
            .expect_err("no id left");
        assert!(matches!(err, StoreError::InvalidForm(_)));
        assert_eq!(store.data(), &before);
    }
}
