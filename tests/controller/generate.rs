//! Constrained generation through a full host loop.

use steerlet::prelude::*;
use steerlet::{Config, ControllerError, Status};

use crate::common::{create_env, create_env_with, MockHost};

async fn ultimate_answer(ctrl: Controller) -> anyhow::Result<()> {
    ctrl.fixed("Ultimate answer is ").await?;
    let opts = GenOptions::builder().regex(r"\d\d").store_var("answer").build()?;
    let answer = ctrl.gen(&opts).await?;
    anyhow::ensure!(answer.len() == 2, "answer {answer:?}");
    Ok(())
}

async fn choose_pet(ctrl: Controller) -> anyhow::Result<()> {
    let opts = GenOptions::builder().options(&["cat", "dog"]).store_var("pet").build()?;
    ctrl.gen(&opts).await?;
    Ok(())
}

fn run_one(host: &mut MockHost, program: Program) -> SeqId {
    let id = host.spawn("", program).unwrap();
    host.run().unwrap();
    id
}

#[test]
fn test_regex_answer_prefers_single_token() {
    let env = create_env();
    let mut host = MockHost::new(&env).prefer(&["42"]);
    let id = run_one(&mut host, program(ultimate_answer));
    assert_eq!(host.text(id), "Ultimate answer is 42");
    assert_eq!(env.vars.get("answer").as_deref(), Some(&b"42"[..]));
}

#[test]
fn test_regex_answer_byte_by_byte() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = run_one(&mut host, program(ultimate_answer));
    assert_eq!(host.text(id), "Ultimate answer is 00");
    assert_eq!(env.vars.get("answer").as_deref(), Some(&b"00"[..]));
}

fn mask_of(result: &StepResult) -> Vec<Token> {
    assert!(!result.skip_me);
    assert_eq!(result.branches.len(), 1);
    let branch = &result.branches[0];
    assert!(branch.splices.is_empty());
    branch.sample_mask.as_ref().expect("sampling branch").iter().collect()
}

#[test]
fn test_regex_answer_step_by_step() {
    let env = create_env();
    let me = [SeqId(0)];
    let digit = |d: u32| env.token(&d.to_string());
    let digits: Vec<Token> = (0..10).map(digit).collect();

    let mut driver = env.driver(0, program(ultimate_answer));
    driver.init_prompt(&[]).unwrap();

    // The fixed prefix comes back as one pure splice the host must not sample for.
    let res = driver.step(0, &[], &me).unwrap();
    assert!(res.skip_me);
    let prefix = env.tok.tokenizer().tokenize("Ultimate answer is ");
    assert_eq!(res.unconditional_splice(), Some(&Splice::new(0, prefix.clone())));

    // First digit: any single digit or the whole "42", never EOS.
    let res = driver.step(0, &prefix, &me).unwrap();
    let mut expected = digits.clone();
    expected.push(env.token("42"));
    expected.sort();
    assert_eq!(mask_of(&res), expected);

    // Second digit: single digits only, "42" would make three.
    let res = driver.step(0, &[digit(4)], &me).unwrap();
    assert_eq!(mask_of(&res), digits);

    // Two digits complete the match and end generation.
    let res = driver.step(0, &[digit(2)], &me).unwrap();
    assert!(res.is_stop());
    assert_eq!(driver.status(), Status::Done);
    assert_eq!(env.text(&driver.tokens()), "Ultimate answer is 42");
    assert_eq!(env.vars.get("answer").as_deref(), Some(&b"42"[..]));
}

#[test]
fn test_regex_constraint_forces_eos_after_two_digits() {
    let env = create_env();
    let eos = env.tok.eos_token();
    let mut c = constraint::regex(&env.tok, r"\d\d").unwrap();
    c.append_token(env.token("4")).unwrap();
    assert!(!c.eos_allowed());
    c.append_token(env.token("2")).unwrap();
    assert!(c.eos_allowed());
    assert!(c.eos_forced());

    let mut mask = TokenSet::new(env.tok.vocab_size());
    c.allow_tokens(&mut mask);
    assert_eq!(mask.num_set(), 0);
    assert!(c.token_allowed(eos));
    assert!(!c.token_allowed(env.token("x")));
    assert!(matches!(c.append_token(env.token("7")), Err(ControllerError::ConstraintViolation { .. })));

    let mut c = constraint::regex(&env.tok, r"\d\d").unwrap();
    c.append_token(env.token("4")).unwrap();
    assert!(!c.token_allowed(env.token("42")));
}

#[test]
fn test_choose_options() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    run_one(&mut host, program(choose_pet));
    assert_eq!(env.vars.get("pet").as_deref(), Some(&b"cat"[..]));

    let mut host = MockHost::new(&env).prefer(&["dog"]);
    run_one(&mut host, program(choose_pet));
    assert_eq!(env.vars.get("pet").as_deref(), Some(&b"dog"[..]));
}

#[test]
fn test_grammar_generation() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = run_one(
        &mut host,
        program(|ctrl| async move {
            let opts = GenOptions::builder().grammar(r#"root ::= "yes" | "no""#).build()?;
            let reply = ctrl.gen(&opts).await?;
            anyhow::ensure!(reply == "no", "reply {reply:?}");
            Ok(())
        }),
    );
    assert_eq!(host.text(id), "no");
}

#[test]
fn test_max_tokens_limits_free_generation() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = run_one(
        &mut host,
        program(|ctrl| async move {
            let opts = GenOptions::builder().max_tokens(3).build()?;
            let tokens = ctrl.gen_tokens(&opts).await?;
            anyhow::ensure!(tokens.len() == 3, "got {} tokens", tokens.len());
            Ok(())
        }),
    );
    assert_eq!(host.text(id), "   ");
}

#[test]
fn test_default_token_limit_comes_from_config() {
    let env = create_env_with(Config {
        max_gen_tokens: 5,
        ..Config::default()
    });
    let mut host = MockHost::new(&env).prefer(&["cat"]);
    let id = run_one(
        &mut host,
        program(|ctrl| async move {
            ctrl.gen(&GenOptions::builder().store_var("out").build()?).await?;
            Ok(())
        }),
    );
    assert_eq!(host.text(id), "catcatcatcatcat");
    assert_eq!(env.vars.get("out").map(|v| v.len()), Some(15));
}

#[test]
fn test_stop_at_ends_generation() {
    let env = create_env();
    let mut host = MockHost::new(&env).prefer(&["cat"]);
    let id = run_one(
        &mut host,
        program(|ctrl| async move {
            let opts = GenOptions::builder().stop_at("at").max_tokens(10).build()?;
            let text = ctrl.gen(&opts).await?;
            anyhow::ensure!(text == "cat", "text {text:?}");
            ctrl.fixed(" world").await?;
            Ok(())
        }),
    );
    assert_eq!(host.text(id), "cat world");
}

#[test]
fn test_bad_regex_fails_at_compile() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    host.spawn(
        "",
        program(|ctrl| async move {
            ctrl.gen(&GenOptions::builder().regex("(open").build()?).await?;
            Ok(())
        }),
    )
    .unwrap();
    let err = host.run().unwrap_err();
    assert!(matches!(err, ControllerError::Constraint(_)));
}

#[test]
fn test_host_violating_the_mask_is_caught() {
    let env = create_env();
    let mut driver = env.driver(
        0,
        program(|ctrl| async move {
            ctrl.gen(&GenOptions::builder().options(&["cat"]).build()?).await?;
            Ok(())
        }),
    );
    driver.init_prompt(&[]).unwrap();
    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    let dog = env.token("dog");
    assert!(!res.branches[0].sample_mask.as_ref().unwrap().has(dog));
    let err = driver.step(0, &[dog], &[SeqId(0)]).unwrap_err();
    assert!(matches!(err, ControllerError::ConstraintViolation { token } if token == dog));
}
