//! Generate trait - constrained generation on top of requests.

use std::future::Future;
use std::sync::Arc;

use anyhow::ensure;
use tracing::debug;

use crate::constraint::{
    self, ByteConstraint, ChooseRecognizer, Constraint, ConstraintFactory, GrammarProgram, GrammarRecognizer, Options,
    Recognizer, RegexProgram, RegexRecognizer, SubstringRecognizer, SubstringTemplate,
};
use crate::controller::Controller;
use crate::error::{ControllerError, Result};
use crate::request::ConstrainedToken;
use crate::tokenizer::{buffer_to_string, TokEnv};
use crate::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Free,
    Options(Vec<String>),
    Regex(String),
    Grammar(String),
    Substring { template: String, end: String },
}

/// Options for [`Generate::gen`], validated when built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
    shape: Shape,
    store_var: Option<String>,
    stop_at: Option<String>,
    max_tokens: Option<usize>,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            shape: Shape::Free,
            store_var: None,
            stop_at: None,
            max_tokens: None,
        }
    }
}

impl GenOptions {
    pub fn builder() -> GenOptionsBuilder {
        GenOptionsBuilder::default()
    }

    pub fn options(&self) -> Option<&[String]> {
        match &self.shape {
            Shape::Options(o) => Some(o),
            _ => None,
        }
    }

    pub fn regex(&self) -> Option<&str> {
        match &self.shape {
            Shape::Regex(r) => Some(r),
            _ => None,
        }
    }

    pub fn grammar(&self) -> Option<&str> {
        match &self.shape {
            Shape::Grammar(g) => Some(g),
            _ => None,
        }
    }

    pub fn substring(&self) -> Option<&str> {
        match &self.shape {
            Shape::Substring { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn substring_end(&self) -> Option<&str> {
        match &self.shape {
            Shape::Substring { end, .. } => Some(end),
            _ => None,
        }
    }

    pub fn store_var(&self) -> Option<&str> {
        self.store_var.as_deref()
    }

    pub fn stop_at(&self) -> Option<&str> {
        self.stop_at.as_deref()
    }

    /// Explicit token limit; `None` uses the configured default.
    pub fn max_tokens(&self) -> Option<usize> {
        self.max_tokens
    }

    /// A constraint factory for these options. Compiled programs are built
    /// on first use and shared by every later rebuild.
    pub fn constraint_factory(&self, env: &TokEnv) -> ConstraintFactory {
        match &self.shape {
            Shape::Free => Box::new(|| Ok(constraint::unconstrained())),
            Shape::Options(options) => {
                let options = options.clone();
                cached(
                    env,
                    move || {
                        let refs: Vec<&str> = options.iter().map(String::as_str).collect();
                        Options::new(&refs)
                    },
                    ChooseRecognizer::new,
                )
            }
            Shape::Regex(pattern) => {
                let pattern = pattern.clone();
                cached(env, move || RegexProgram::new(&pattern), RegexRecognizer::new)
            }
            Shape::Grammar(source) => {
                let source = source.clone();
                cached(env, move || GrammarProgram::from_ebnf(&source), GrammarRecognizer::new)
            }
            Shape::Substring { template, end } => {
                let (template, end) = (template.clone(), end.clone());
                cached(
                    env,
                    move || Ok(SubstringTemplate::new(&template, &end)),
                    SubstringRecognizer::new,
                )
            }
        }
    }
}

fn cached<P, R>(
    env: &TokEnv,
    build: impl Fn() -> Result<P> + 'static,
    recognizer: impl Fn(Arc<P>) -> R + 'static,
) -> ConstraintFactory
where
    P: 'static,
    R: Recognizer + 'static,
{
    let env = env.clone();
    let mut program: Option<Arc<P>> = None;
    Box::new(move || -> Result<Box<dyn Constraint>> {
        let p = match &program {
            Some(p) => Arc::clone(p),
            None => {
                let p = Arc::new(build()?);
                program = Some(Arc::clone(&p));
                p
            }
        };
        Ok(Box::new(ByteConstraint::new(env.clone(), recognizer(p))))
    })
}

/// Builder for [`GenOptions`].
#[derive(Debug, Default, Clone)]
pub struct GenOptionsBuilder {
    options: Option<Vec<String>>,
    regex: Option<String>,
    grammar: Option<String>,
    substring: Option<String>,
    substring_end: Option<String>,
    store_var: Option<String>,
    stop_at: Option<String>,
    max_tokens: Option<usize>,
}

impl GenOptionsBuilder {
    /// Output must be exactly one of `options`.
    pub fn options<S: AsRef<str>>(mut self, options: &[S]) -> Self {
        self.options = Some(options.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Output must match `pattern` in full.
    pub fn regex(mut self, pattern: &str) -> Self {
        self.regex = Some(pattern.to_string());
        self
    }

    /// Output must match an EBNF grammar.
    pub fn grammar(mut self, source: &str) -> Self {
        self.grammar = Some(source.to_string());
        self
    }

    /// Output must be whole words of `template`, then the substring end.
    pub fn substring(mut self, template: &str) -> Self {
        self.substring = Some(template.to_string());
        self
    }

    /// Terminator after a substring. Defaults to `"`.
    pub fn substring_end(mut self, end: &str) -> Self {
        self.substring_end = Some(end.to_string());
        self
    }

    /// Store the generated bytes in this variable.
    pub fn store_var(mut self, name: &str) -> Self {
        self.store_var = Some(name.to_string());
        self
    }

    /// Stop once the text contains `stop`.
    pub fn stop_at(mut self, stop: &str) -> Self {
        self.stop_at = Some(stop.to_string());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn build(self) -> Result<GenOptions> {
        let invalid = |msg: String| -> Result<GenOptions> { Err(ControllerError::InvalidOptions(msg)) };

        let given: Vec<&str> = [
            ("options", self.options.is_some()),
            ("regex", self.regex.is_some()),
            ("grammar", self.grammar.is_some()),
            ("substring", self.substring.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        if given.len() > 1 {
            return invalid(format!("at most one of options/regex/grammar/substring, got {}", given.join(", ")));
        }
        if self.substring_end.is_some() && self.substring.is_none() {
            return invalid("substring_end requires substring".into());
        }
        if self.max_tokens == Some(0) {
            return invalid("max_tokens must be > 0".into());
        }
        if self.options.as_ref().is_some_and(|o| o.is_empty()) {
            return invalid("options must not be empty".into());
        }
        if self.stop_at.as_deref() == Some("") {
            return invalid("stop_at must not be empty".into());
        }

        let shape = if let Some(options) = self.options {
            Shape::Options(options)
        } else if let Some(pattern) = self.regex {
            Shape::Regex(pattern)
        } else if let Some(source) = self.grammar {
            Shape::Grammar(source)
        } else if let Some(template) = self.substring {
            Shape::Substring {
                template,
                end: self.substring_end.unwrap_or_else(|| "\"".to_string()),
            }
        } else {
            Shape::Free
        };

        Ok(GenOptions {
            shape,
            store_var: self.store_var,
            stop_at: self.stop_at,
            max_tokens: self.max_tokens,
        })
    }
}

/// Extension trait for constrained generation.
pub trait Generate {
    /// Generate tokens until the constraint finishes, `stop_at` appears,
    /// or the token limit is reached.
    fn gen_tokens(&self, options: &GenOptions) -> impl Future<Output = Result<Vec<Token>>>;

    /// Like [`Generate::gen_tokens`], decoded to text.
    fn gen(&self, options: &GenOptions) -> impl Future<Output = Result<String>>;
}

impl Generate for Controller {
    async fn gen_tokens(&self, options: &GenOptions) -> Result<Vec<Token>> {
        let max_tokens = options.max_tokens.unwrap_or(self.config().max_gen_tokens);
        let eos = self.eos_token();
        let mut request = ConstrainedToken::new(options.constraint_factory(self.tok_env()));
        let mut generated: Vec<Token> = Vec::new();

        loop {
            let done = self.run(request).await?;
            request = done.request;
            generated.extend(done.tokens.iter().copied().filter(|&t| t != eos));

            if let Some(stop) = options.stop_at() {
                let text = buffer_to_string(&self.tokenizer().detokenize(&generated));
                if text.contains(stop) {
                    break;
                }
            }
            if done.finished || generated.len() >= max_tokens {
                break;
            }
        }

        debug!(seq = %self.seq_id(), tokens = generated.len(), "generation finished");
        if let Some(name) = options.store_var() {
            self.set_var(name, self.tokenizer().detokenize(&generated));
        }
        Ok(generated)
    }

    async fn gen(&self, options: &GenOptions) -> Result<String> {
        let tokens = self.gen_tokens(options).await?;
        Ok(buffer_to_string(&self.tokenizer().detokenize(&tokens)))
    }
}

impl Controller {
    /// Fail unless variable `name` holds `value`.
    pub fn check_var(&self, name: &str, value: &str) -> anyhow::Result<()> {
        let actual = self.get_var(name);
        ensure!(
            actual.as_deref() == Some(value.as_bytes()),
            "variable {name:?}: expected {value:?}, got {:?}",
            actual.as_deref().map(buffer_to_string)
        );
        Ok(())
    }

    pub fn check_vars(&self, expected: &[(&str, &str)]) -> anyhow::Result<()> {
        for (name, value) in expected {
            self.check_var(name, value)?;
        }
        Ok(())
    }
}
