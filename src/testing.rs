//! In-memory stand-ins for the browser, answer backend and document renderer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::answerer::{AnswerBackend, BackendError};
use crate::browser::{Browser, BrowserError, KeyPress};
use crate::documents::DocumentRenderer;
use crate::models::{JobRecord, UploadKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Goto(String),
    Refresh,
    Click(String, usize),
    Scroll(String, usize),
    Type(String, String),
    Key(String, KeyPress),
    Select(String, String),
    Upload(String, PathBuf),
}

#[derive(Default)]
struct FakeState {
    screens: Vec<String>,
    current: usize,
    url: String,
    routes: Vec<(String, usize, Option<String>)>,
    transitions: Vec<(String, Option<usize>, usize)>,
    refresh_target: Option<usize>,
    values: HashMap<String, String>,
    toggled: HashSet<String>,
    dropdowns: HashMap<String, String>,
    stale: HashMap<(String, usize), u32>,
    actions: Vec<Action>,
}

/// A browser whose DOM is a list of scripted HTML screens.
///
/// Clicking an element whose selector has a registered transition switches
/// to the target screen; navigation can switch screens by URL fragment.
#[derive(Default)]
pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

fn select_nth<'a>(doc: &'a Html, css: &str, index: usize) -> Result<ElementRef<'a>, BrowserError> {
    let selector = Selector::parse(css).map_err(|e| BrowserError::Driver(format!("bad selector {}: {:?}", css, e)))?;
    doc.select(&selector)
        .nth(index)
        .ok_or_else(|| BrowserError::NotFound(css.to_string()))
}

fn element_key(element: &ElementRef<'_>, css: &str) -> String {
    element
        .value()
        .attr("id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| css.to_string())
}

fn visible_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl FakeBrowser {
    pub fn new(screens: Vec<&str>) -> Self {
        let state = FakeState {
            screens: screens.into_iter().map(str::to_string).collect(),
            url: "about:blank".to_string(),
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Clicking anything matched by `css` moves to screen `target`.
    pub fn on_click(self, css: &str, target: usize) -> Self {
        self.lock().transitions.push((css.to_string(), None, target));
        self
    }

    /// Like `on_click`, but only while screen `from` is showing.
    pub fn on_click_at(self, from: usize, css: &str, target: usize) -> Self {
        self.lock().transitions.push((css.to_string(), Some(from), target));
        self
    }

    /// Navigating to a URL containing `fragment` shows screen `target`.
    pub fn on_goto(self, fragment: &str, target: usize) -> Self {
        self.lock().routes.push((fragment.to_string(), target, None));
        self
    }

    /// Like `on_goto`, but the browser ends up at `landing` instead.
    pub fn redirect(self, fragment: &str, target: usize, landing: &str) -> Self {
        self.lock()
            .routes
            .push((fragment.to_string(), target, Some(landing.to_string())));
        self
    }

    pub fn on_refresh(self, target: usize) -> Self {
        self.lock().refresh_target = Some(target);
        self
    }

    /// The next `times` scrolls to match `index` of `css` fail as stale.
    pub fn stale_on_scroll(self, css: &str, index: usize, times: u32) -> Self {
        self.lock().stale.insert((css.to_string(), index), times);
        self
    }

    pub fn show(&self, screen: usize) {
        self.lock().current = screen;
    }

    pub fn current_screen(&self) -> usize {
        self.lock().current
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Click(css, _) => Some(css),
                _ => None,
            })
            .collect()
    }

    pub fn typed(&self, css: &str) -> Option<String> {
        self.actions().into_iter().rev().find_map(|a| match a {
            Action::Type(target, text) if target == css => Some(text),
            _ => None,
        })
    }

    pub fn uploads(&self) -> Vec<(String, PathBuf)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Upload(css, path) => Some((css, path)),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn with_element<T>(
        &self,
        css: &str,
        index: usize,
        f: impl FnOnce(&mut FakeState, ElementRef<'_>) -> T,
    ) -> Result<T, BrowserError> {
        let mut state = self.lock();
        let html = state.screens.get(state.current).cloned().unwrap_or_default();
        let doc = Html::parse_document(&html);
        let element = select_nth(&doc, css, index)?;
        Ok(f(&mut state, element))
    }

    fn checked(state: &FakeState, doc: &Html, id: &str) -> bool {
        let initially = select_nth(doc, &crate::browser::by_id(id), 0)
            .map(|e| e.value().attr("checked").is_some())
            .unwrap_or(false);
        initially ^ state.toggled.contains(id)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.actions.push(Action::Goto(url.to_string()));
        state.url = url.to_string();
        let route = state
            .routes
            .iter()
            .find(|(fragment, _, _)| url.contains(fragment.as_str()))
            .cloned();
        if let Some((_, target, landing)) = route {
            state.current = target;
            if let Some(landing) = landing {
                state.url = landing;
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.lock().url.clone())
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        state.actions.push(Action::Refresh);
        if let Some(target) = state.refresh_target {
            state.current = target;
        }
        Ok(())
    }

    async fn count(&self, css: &str) -> Result<usize, BrowserError> {
        let state = self.lock();
        let html = state.screens.get(state.current).cloned().unwrap_or_default();
        let doc = Html::parse_document(&html);
        let selector = Selector::parse(css).map_err(|e| BrowserError::Driver(format!("{:?}", e)))?;
        Ok(doc.select(&selector).count())
    }

    async fn outer_html(&self, css: &str, index: usize) -> Result<String, BrowserError> {
        self.with_element(css, index, |_, e| e.html())
    }

    async fn text(&self, css: &str, index: usize) -> Result<String, BrowserError> {
        self.with_element(css, index, |_, e| visible_text(&e))
    }

    async fn is_displayed(&self, css: &str, index: usize) -> Result<bool, BrowserError> {
        self.with_element(css, index, |_, e| {
            let style = e.value().attr("style").unwrap_or("").replace(' ', "");
            !style.contains("display:none") && e.value().attr("hidden").is_none()
        })
    }

    async fn click(&self, css: &str, index: usize) -> Result<(), BrowserError> {
        let mut state = self.lock();
        let html = state.screens.get(state.current).cloned().unwrap_or_default();
        let doc = Html::parse_document(&html);
        let element = select_nth(&doc, css, index)?;

        let target_id = match element.value().name() {
            "label" => element.value().attr("for").map(str::to_string),
            "input" => element.value().attr("id").map(str::to_string),
            _ => None,
        };
        if let Some(id) = target_id {
            let kind = select_nth(&doc, &crate::browser::by_id(&id), 0)
                .ok()
                .and_then(|e| e.value().attr("type").map(str::to_lowercase));
            match kind.as_deref() {
                Some("checkbox") => {
                    if !state.toggled.remove(&id) {
                        state.toggled.insert(id);
                    }
                }
                Some("radio") => {
                    if !Self::checked(&state, &doc, &id) {
                        state.toggled.insert(id);
                    }
                }
                _ => {}
            }
        }

        state.actions.push(Action::Click(css.to_string(), index));
        let current = state.current;
        let transition = state
            .transitions
            .iter()
            .filter(|(rule, from, _)| rule == css && from.is_none_or(|f| f == current))
            .max_by_key(|(_, from, _)| from.is_some())
            .map(|(_, _, target)| *target);
        if let Some(target) = transition {
            state.current = target;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, css: &str, index: usize) -> Result<(), BrowserError> {
        {
            let mut state = self.lock();
            if let Some(remaining) = state.stale.get_mut(&(css.to_string(), index)) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BrowserError::Stale(css.to_string()));
                }
            }
        }
        self.with_element(css, index, |state, _| {
            state.actions.push(Action::Scroll(css.to_string(), index));
        })
    }

    async fn type_text(&self, css: &str, text: &str) -> Result<(), BrowserError> {
        self.with_element(css, 0, |state, e| {
            let key = element_key(&e, css);
            state.values.insert(key, text.to_string());
            state.actions.push(Action::Type(css.to_string(), text.to_string()));
        })
    }

    async fn press_key(&self, css: &str, key: KeyPress) -> Result<(), BrowserError> {
        self.with_element(css, 0, |state, _| {
            state.actions.push(Action::Key(css.to_string(), key));
        })
    }

    async fn value(&self, css: &str) -> Result<String, BrowserError> {
        self.with_element(css, 0, |state, e| {
            state
                .values
                .get(&element_key(&e, css))
                .cloned()
                .or_else(|| e.value().attr("value").map(str::to_string))
                .unwrap_or_default()
        })
    }

    async fn is_selected(&self, css: &str) -> Result<bool, BrowserError> {
        let state = self.lock();
        let html = state.screens.get(state.current).cloned().unwrap_or_default();
        let doc = Html::parse_document(&html);
        let element = select_nth(&doc, css, 0)?;
        let id = element_key(&element, css);
        Ok(element.value().attr("checked").is_some() ^ state.toggled.contains(&id))
    }

    async fn select_by_text(&self, css: &str, text: &str) -> Result<(), BrowserError> {
        let outcome = self.with_element(css, 0, |state, e| {
            let option = Selector::parse("option").ok()?;
            let found = e.select(&option).any(|o| visible_text(&o) == text);
            if found {
                state.dropdowns.insert(element_key(&e, css), text.to_string());
                state.actions.push(Action::Select(css.to_string(), text.to_string()));
            }
            Some(found)
        })?;
        match outcome {
            Some(true) => Ok(()),
            _ => Err(BrowserError::NotFound(format!("{} option '{}'", css, text))),
        }
    }

    async fn selected_text(&self, css: &str) -> Result<String, BrowserError> {
        self.with_element(css, 0, |state, e| {
            if let Some(chosen) = state.dropdowns.get(&element_key(&e, css)) {
                return chosen.clone();
            }
            let Ok(option) = Selector::parse("option") else {
                return String::new();
            };
            let options: Vec<_> = e.select(&option).collect();
            options
                .iter()
                .find(|o| o.value().attr("selected").is_some())
                .or(options.first())
                .map(visible_text)
                .unwrap_or_default()
        })
    }

    async fn upload(&self, css: &str, path: &Path) -> Result<(), BrowserError> {
        self.with_element(css, 0, |state, _| {
            state.actions.push(Action::Upload(css.to_string(), path.to_path_buf()));
        })
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BrowserError::Driver(e.to_string()))?;
        }
        std::fs::write(path, b"").map_err(|e| BrowserError::Driver(e.to_string()))
    }
}

/// Answer backend with canned replies that records every question it is asked.
pub struct ScriptedBackend {
    pub replies: HashMap<String, String>,
    pub option_reply: Option<String>,
    pub numeric: i64,
    pub score: f64,
    pub salary: f64,
    pub asked: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            replies: HashMap::new(),
            option_reply: None,
            numeric: 3,
            score: 8.0,
            salary: 150000.0,
            asked: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    pub fn reply(mut self, question_fragment: &str, answer: &str) -> Self {
        self.replies
            .insert(question_fragment.to_lowercase(), answer.to_string());
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn note(&self, call: &str, question: &str) {
        self.asked.lock().unwrap().push(format!("{}:{}", call, question));
    }

    fn canned(&self, question: &str) -> Option<String> {
        let q = question.to_lowercase();
        self.replies
            .iter()
            .find(|(fragment, _)| q.contains(fragment.as_str()))
            .map(|(_, answer)| answer.clone())
    }
}

#[async_trait]
impl AnswerBackend for ScriptedBackend {
    async fn answer(&self, question: &str, _job: &JobRecord) -> Result<String, BackendError> {
        self.note("answer", question);
        Ok(self.canned(question).unwrap_or_else(|| "Sample answer".to_string()))
    }

    async fn answer_from_options(&self, question: &str, options: &[String]) -> Result<String, BackendError> {
        self.note("options", question);
        Ok(self
            .canned(question)
            .or_else(|| self.option_reply.clone())
            .or_else(|| options.first().cloned())
            .unwrap_or_default())
    }

    async fn answer_numeric(&self, question: &str) -> Result<i64, BackendError> {
        self.note("numeric", question);
        Ok(self
            .canned(question)
            .and_then(|a| a.parse().ok())
            .unwrap_or(self.numeric))
    }

    async fn answer_date(&self, question: &str) -> Result<NaiveDate, BackendError> {
        self.note("date", question);
        Ok(NaiveDate::from_ymd_opt(2026, 11, 2).unwrap())
    }

    async fn classify_upload_kind(&self, label: &str) -> Result<UploadKind, BackendError> {
        self.note("upload", label);
        Ok(crate::answerer::parse_upload_kind(label))
    }

    async fn score_job(&self, job: &JobRecord) -> Result<f64, BackendError> {
        self.note("score", &job.link);
        Ok(self.score)
    }

    async fn estimate_salary(&self, job: &JobRecord) -> Result<f64, BackendError> {
        self.note("salary", &job.link);
        Ok(self.salary)
    }
}

/// Renderer returning fixed paths without touching the filesystem.
pub struct StubDocuments;

#[async_trait]
impl DocumentRenderer for StubDocuments {
    async fn resume(&self, _job: &JobRecord) -> Result<PathBuf> {
        Ok(PathBuf::from("/tmp/resume.pdf"))
    }

    async fn cover_letter(&self, _job: &JobRecord) -> Result<PathBuf> {
        Ok(PathBuf::from("/tmp/cover.pdf"))
    }
}
