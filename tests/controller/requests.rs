//! Built-in and user-defined requests.

use steerlet::prelude::*;
use steerlet::{ControllerError, StepEnv};

use crate::common::{create_env, MockHost, SeqOutcome};

#[test]
fn test_stop_ends_the_sequence() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = host
        .spawn(
            "",
            program(|ctrl| async move {
                ctrl.fixed("Hello").await?;
                ctrl.stop().await?;
                Ok(())
            }),
        )
        .unwrap();
    host.run().unwrap();

    let seq = host.seq(id);
    assert_eq!(host.outcome(id), SeqOutcome::Stopped);
    assert!(seq.driver.is_finished());
    assert_eq!(seq.history.last(), Some(&env.tok.eos_token()));
}

#[test]
fn test_request_after_stop_is_an_invariant_violation() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    host.spawn(
        "",
        program(|ctrl| async move {
            ctrl.stop().await?;
            ctrl.fixed("too late").await?;
            Ok(())
        }),
    )
    .unwrap();
    let err = host.run().unwrap_err();
    assert!(matches!(err, ControllerError::Invariant(_)));
}

#[test]
fn test_label_fixed_after_rewrites_history() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = host
        .spawn(
            "Ultimate",
            program(|ctrl| async move {
                ctrl.fixed("Hello").await?;
                let label = ctrl.label();
                ctrl.fixed(" world").await?;
                anyhow::ensure!(label.text_since() == " world", "got {:?}", label.text_since());
                label.fixed_after(" answer").await?;
                anyhow::ensure!(label.text_since() == " answer");
                anyhow::ensure!(label.tokens_since().len() == 1);
                Ok(())
            }),
        )
        .unwrap();
    host.run().unwrap();

    assert_eq!(host.text(id), "UltimateHello answer");
    assert_eq!(host.seq(id).driver.tokens(), host.seq(id).history);
}

#[test]
fn test_label_rewrite_across_sampled_tokens() {
    let env = create_env();
    let mut host = MockHost::new(&env).prefer(&["dog"]);
    let id = host
        .spawn(
            "",
            program(|ctrl| async move {
                let label = ctrl.label();
                ctrl.gen(&GenOptions::builder().max_tokens(2).build()?).await?;
                anyhow::ensure!(label.text_since() == "dogdog");
                label.fixed_after("cat").await?;
                Ok(())
            }),
        )
        .unwrap();
    host.run().unwrap();
    assert_eq!(host.text(id), "cat");
}

/// Samples one of a fixed set of words and remembers what the host chose.
#[derive(Default)]
struct PickWord {
    words: Vec<&'static str>,
    seen: Vec<Token>,
}

impl NextToken for PickWord {
    fn compile(&mut self, env: &StepEnv) -> steerlet::Result<StepResult> {
        let ids = self.words.iter().flat_map(|w| env.tokenizer().tokenize(w));
        Ok(StepResult::sample(TokenSet::from_tokens(env.vocab_size(), ids)))
    }

    fn commit(&mut self, _env: &StepEnv, _backtrack: u32, tokens: &[Token]) -> steerlet::Result<()> {
        self.seen.extend_from_slice(tokens);
        Ok(())
    }
}

#[test]
fn test_user_defined_request() {
    let env = create_env();
    let mut host = MockHost::new(&env).prefer(&["dog"]);
    let id = host
        .spawn(
            "",
            program(|ctrl| async move {
                let request = PickWord {
                    words: vec!["cat", "dog"],
                    ..PickWord::default()
                };
                let done = ctrl.run(request).await?;
                anyhow::ensure!(done.request.seen == done.tokens);
                anyhow::ensure!(!done.finished);
                ctrl.set_var("picked", ctrl.tokenizer().detokenize(&done.tokens));
                Ok(())
            }),
        )
        .unwrap();
    host.run().unwrap();
    assert_eq!(host.text(id), "dog");
    assert_eq!(env.vars.get("picked").as_deref(), Some(&b"dog"[..]));
}

#[test]
fn test_concurrent_requests_are_rejected() {
    let env = create_env();
    let mut driver = env.driver(
        0,
        program(|ctrl| async move {
            let first = ctrl.fixed("cat");
            let second = ctrl.fixed("dog");
            futures::future::try_join(first, second).await?;
            Ok(())
        }),
    );
    let err = driver.init_prompt(&[]).unwrap_err();
    assert!(err.to_string().contains("already pending"));
}
