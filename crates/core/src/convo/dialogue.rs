use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::convo::context::{BeforeHook, ResponseCallback, StepCallback};
use crate::convo::pattern::Pattern;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogueError {
    #[error("thread `{0}` is already registered")]
    DuplicateThread(String),
    #[error("thread `{0}` already has a before-hook")]
    DuplicateHook(String),
    #[error("question in thread `{thread}` declares more than one default handler")]
    DuplicateDefaultHandler { thread: String },
    #[error("invalid pattern in thread `{thread}`: {message}")]
    InvalidPattern { thread: String, message: String },
}

impl DialogueError {
    pub fn invalid_pattern(thread: &str, error: &regex::Error) -> Self {
        Self::InvalidPattern { thread: thread.to_owned(), message: error.to_string() }
    }
}

#[derive(Clone)]
pub struct Handler {
    pub pattern: Pattern,
    pub callback: Arc<dyn ResponseCallback>,
}

impl Handler {
    pub fn new<C>(pattern: Pattern, callback: C) -> Self
    where
        C: ResponseCallback + 'static,
    {
        Self { pattern, callback: Arc::new(callback) }
    }

    pub fn fallback<C>(callback: C) -> Self
    where
        C: ResponseCallback + 'static,
    {
        Self::new(Pattern::Default, callback)
    }

    pub fn yes<C>(callback: C) -> Self
    where
        C: ResponseCallback + 'static,
    {
        Self::new(Pattern::Affirmative, callback)
    }

    pub fn no<C>(callback: C) -> Self
    where
        C: ResponseCallback + 'static,
    {
        Self::new(Pattern::Negative, callback)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("pattern", &self.pattern).finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionOptions {
    pub key: Option<String>,
}

impl QuestionOptions {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()) }
    }
}

#[derive(Clone)]
pub struct MessageStep {
    pub template: String,
    pub callback: Option<Arc<dyn StepCallback>>,
}

#[derive(Clone, Debug)]
pub struct QuestionStep {
    pub prompt: String,
    pub handlers: Vec<Handler>,
    pub options: QuestionOptions,
}

impl QuestionStep {
    /// First matching non-default handler in registration order, then the
    /// default handler if there is one.
    pub fn select_handler(&self, text: &str) -> Option<&Handler> {
        self.handlers
            .iter()
            .find(|handler| !handler.pattern.is_default() && handler.pattern.matches(text))
            .or_else(|| self.handlers.iter().find(|handler| handler.pattern.is_default()))
    }
}

#[derive(Clone, Debug)]
pub enum Step {
    Message(MessageStep),
    Question(QuestionStep),
}

impl Step {
    pub fn message(template: impl Into<String>) -> Self {
        Self::Message(MessageStep { template: template.into(), callback: None })
    }

    pub fn message_with<C>(template: impl Into<String>, callback: C) -> Self
    where
        C: StepCallback + 'static,
    {
        Self::Message(MessageStep { template: template.into(), callback: Some(Arc::new(callback)) })
    }

    pub fn question(
        prompt: impl Into<String>,
        handlers: Vec<Handler>,
        options: QuestionOptions,
    ) -> Self {
        Self::Question(QuestionStep { prompt: prompt.into(), handlers, options })
    }
}

impl fmt::Debug for MessageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStep")
            .field("template", &self.template)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Thread {
    pub name: String,
    pub steps: Vec<Step>,
}

/// Mutable thread registry. Frozen into a [`Dialogue`] by [`DialogueBuilder::build`].
#[derive(Default)]
pub struct DialogueBuilder {
    threads: HashMap<String, Thread>,
    hooks: HashMap<String, Arc<dyn BeforeHook>>,
}

impl DialogueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_thread(
        &mut self,
        name: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<(), DialogueError> {
        let name = name.into();
        if self.threads.contains_key(&name) {
            return Err(DialogueError::DuplicateThread(name));
        }
        for step in &steps {
            validate_step(&name, step)?;
        }
        self.threads.insert(name.clone(), Thread { name, steps });
        Ok(())
    }

    pub fn register_before_hook<H>(
        &mut self,
        thread: impl Into<String>,
        hook: H,
    ) -> Result<(), DialogueError>
    where
        H: BeforeHook + 'static,
    {
        let thread = thread.into();
        if self.hooks.contains_key(&thread) {
            return Err(DialogueError::DuplicateHook(thread));
        }
        self.hooks.insert(thread, Arc::new(hook));
        Ok(())
    }

    pub fn add_question(
        &mut self,
        prompt: impl Into<String>,
        handlers: Vec<Handler>,
        options: QuestionOptions,
        thread: impl Into<String>,
    ) -> Result<(), DialogueError> {
        let thread = thread.into();
        let step = Step::question(prompt, handlers, options);
        validate_step(&thread, &step)?;
        self.thread_mut(thread).steps.push(step);
        Ok(())
    }

    pub fn add_message(&mut self, text: impl Into<String>, thread: impl Into<String>) {
        self.thread_mut(thread.into()).steps.push(Step::message(text));
    }

    pub fn add_step(&mut self, step: Step, thread: impl Into<String>) -> Result<(), DialogueError> {
        let thread = thread.into();
        validate_step(&thread, &step)?;
        self.thread_mut(thread).steps.push(step);
        Ok(())
    }

    pub fn build(self) -> Dialogue {
        Dialogue { threads: self.threads, hooks: self.hooks }
    }

    fn thread_mut(&mut self, name: String) -> &mut Thread {
        self.threads.entry(name.clone()).or_insert_with(|| Thread { name, steps: Vec::new() })
    }
}

fn validate_step(thread: &str, step: &Step) -> Result<(), DialogueError> {
    if let Step::Question(question) = step {
        let defaults = question.handlers.iter().filter(|handler| handler.pattern.is_default());
        if defaults.count() > 1 {
            return Err(DialogueError::DuplicateDefaultHandler { thread: thread.to_owned() });
        }
    }
    Ok(())
}

/// Frozen thread registry shared by every session that runs it.
pub struct Dialogue {
    threads: HashMap<String, Thread>,
    hooks: HashMap<String, Arc<dyn BeforeHook>>,
}

impl Dialogue {
    pub fn thread(&self, name: &str) -> Option<&Thread> {
        self.threads.get(name)
    }

    pub fn has_thread(&self, name: &str) -> bool {
        self.threads.contains_key(name)
    }

    pub fn before_hook(&self, thread: &str) -> Option<Arc<dyn BeforeHook>> {
        self.hooks.get(thread).cloned()
    }

    pub fn thread_names(&self) -> Vec<&str> {
        let mut names = self.threads.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Dialogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialogue")
            .field("threads", &self.thread_names())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{DialogueBuilder, DialogueError, Handler, QuestionOptions, Step};
    use crate::convo::context::{hook_fn, response_fn, Command};
    use crate::convo::pattern::Pattern;

    fn continue_handler(pattern: Pattern) -> Handler {
        Handler::new(pattern, response_fn(|_, _| Ok(Command::Continue)))
    }

    #[test]
    fn duplicate_thread_is_rejected() {
        let mut builder = DialogueBuilder::new();
        builder.register_thread("askName", vec![Step::message("hi")]).expect("first");

        let error = builder
            .register_thread("askName", vec![Step::message("again")])
            .expect_err("second registration must fail");
        assert_eq!(error, DialogueError::DuplicateThread("askName".to_owned()));
    }

    #[test]
    fn duplicate_hook_is_rejected() {
        let mut builder = DialogueBuilder::new();
        builder.register_before_hook("confirmName", hook_fn(|_| Ok(()))).expect("first");

        let error = builder
            .register_before_hook("confirmName", hook_fn(|_| Ok(())))
            .expect_err("second hook must fail");
        assert_eq!(error, DialogueError::DuplicateHook("confirmName".to_owned()));
    }

    #[test]
    fn more_than_one_default_handler_is_rejected() {
        let mut builder = DialogueBuilder::new();
        let error = builder
            .add_question(
                "This text?",
                vec![continue_handler(Pattern::Default), continue_handler(Pattern::Default)],
                QuestionOptions::default(),
                "confirmText",
            )
            .expect_err("two defaults must fail");

        assert!(matches!(error, DialogueError::DuplicateDefaultHandler { .. }));
        assert!(!builder.build().has_thread("confirmText"));
    }

    #[test]
    fn add_question_creates_and_appends_to_thread() {
        let mut builder = DialogueBuilder::new();
        builder
            .add_question("one?", vec![continue_handler(Pattern::Default)], QuestionOptions::default(), "t")
            .expect("first question");
        builder.add_message("between", "t");
        builder
            .add_question("two?", vec![continue_handler(Pattern::Affirmative)], QuestionOptions::default(), "t")
            .expect("second question");

        let dialogue = builder.build();
        assert_eq!(dialogue.thread("t").map(|thread| thread.steps.len()), Some(3));
    }

    #[test]
    fn handler_selection_prefers_first_match_then_default() {
        let step = match Step::question(
            "This text?",
            vec![
                continue_handler(Pattern::Default),
                continue_handler(Pattern::Affirmative),
                continue_handler(Pattern::keyword("yes")),
            ],
            QuestionOptions::default(),
        ) {
            Step::Question(question) => question,
            Step::Message(_) => unreachable!(),
        };

        let selected = step.select_handler("yes please").expect("handler");
        assert!(matches!(selected.pattern, Pattern::Affirmative));

        let fallback = step.select_handler("what?").expect("default");
        assert!(fallback.pattern.is_default());
    }

    #[test]
    fn no_handler_selected_without_default() {
        let step = match Step::question(
            "Sure?",
            vec![continue_handler(Pattern::Affirmative)],
            QuestionOptions::default(),
        ) {
            Step::Question(question) => question,
            Step::Message(_) => unreachable!(),
        };

        assert!(step.select_handler("maybe").is_none());
    }
}
