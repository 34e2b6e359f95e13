//! Host-facing protocol: call ordering, fast-forward, desync, failure.

use steerlet::prelude::*;
use steerlet::{Config, ControllerError, Status};

use crate::common::{create_env, create_env_with, MockHost};

async fn hello_world_stop(ctrl: Controller) -> anyhow::Result<()> {
    ctrl.fixed("Hello").await?;
    ctrl.fixed(" world").await?;
    ctrl.stop().await?;
    Ok(())
}

async fn hello_then_gen(ctrl: Controller) -> anyhow::Result<()> {
    ctrl.fixed("Hello").await?;
    ctrl.gen(&GenOptions::default()).await?;
    Ok(())
}

#[test]
fn test_step_before_init_is_rejected() {
    let env = create_env();
    let mut driver = env.driver(0, program(hello_world_stop));
    let err = driver.step(0, &[], &[SeqId(0)]).unwrap_err();
    assert!(matches!(err, ControllerError::Invariant(_)));
    assert_eq!(driver.status(), Status::Created);
}

#[test]
fn test_init_twice_is_rejected() {
    let env = create_env();
    let mut driver = env.driver(0, program(hello_world_stop));
    driver.init_prompt(&[]).unwrap();
    assert_eq!(driver.status(), Status::Running);
    let err = driver.init_prompt(&[]).unwrap_err();
    assert!(matches!(err, ControllerError::Invariant(_)));
}

#[test]
fn test_fixed_requests_merge_into_one_step() {
    let env = create_env();
    let mut driver = env.driver(0, program(hello_world_stop));
    driver.init_prompt(&[]).unwrap();

    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    assert!(res.skip_me);
    let hello = env.token("Hello");
    let world = env.token(" world");
    assert_eq!(res.unconditional_splice(), Some(&Splice::new(0, vec![hello, world])));
    assert_eq!(driver.tokens(), vec![hello, world]);

    // Host confirms; the stop request compiles to an EOS-only mask.
    let res = driver.step(0, &[hello, world], &[SeqId(0)]).unwrap();
    assert!(!res.skip_me);
    let mask = res.branches[0].sample_mask.as_ref().unwrap();
    assert_eq!(mask.iter().collect::<Vec<_>>(), vec![env.tok.eos_token()]);

    let res = driver.step(0, &[env.tok.eos_token()], &[SeqId(0)]).unwrap();
    assert!(res.is_stop());
    assert!(driver.is_finished());
    assert_eq!(driver.status(), Status::Done);

    // Further steps keep answering stop.
    assert!(driver.step(0, &[], &[SeqId(0)]).unwrap().is_stop());
}

#[test]
fn test_max_fast_forward_splits_fixed_runs() {
    let env = create_env_with(Config {
        max_fast_forward: 1,
        ..Config::default()
    });
    let mut driver = env.driver(0, program(hello_world_stop));
    driver.init_prompt(&[]).unwrap();

    let hello = env.token("Hello");
    let world = env.token(" world");
    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    assert_eq!(res.unconditional_splice(), Some(&Splice::new(0, vec![hello])));
    let res = driver.step(0, &[hello], &[SeqId(0)]).unwrap();
    assert_eq!(res.unconditional_splice(), Some(&Splice::new(0, vec![world])));
    assert!(res.skip_me);
}

#[test]
fn test_without_fast_forward_fixed_text_goes_through_the_host() {
    let env = create_env_with(Config {
        max_fast_forward: 0,
        ..Config::default()
    });
    let mut driver = env.driver(0, program(hello_world_stop));
    driver.init_prompt(&[]).unwrap();

    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    assert!(!res.skip_me);
    assert!(res.is_splice());
    // Nothing applied locally until the host reports it.
    assert!(driver.tokens().is_empty());

    let mut host = MockHost::new(&env);
    let id = host.spawn("", program(hello_world_stop)).unwrap();
    host.run().unwrap();
    assert_eq!(host.text(id), "Hello world");
    assert_eq!(host.seq(id).driver.tokens(), host.seq(id).history);
}

#[test]
fn test_desync_fails_the_sequence() {
    let env = create_env();
    let mut driver = env.driver(0, program(hello_then_gen));
    driver.init_prompt(&[]).unwrap();
    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    assert!(res.skip_me);

    let err = driver.step(0, &[env.token("cat")], &[SeqId(0)]).unwrap_err();
    match err {
        ControllerError::Desync {
            expected_tokens, tokens, ..
        } => {
            assert_eq!(expected_tokens, vec![env.token("Hello")]);
            assert_eq!(tokens, vec![env.token("cat")]);
        }
        other => panic!("expected desync, got {other}"),
    }
    assert_eq!(driver.status(), Status::Failed);
    assert!(matches!(driver.step(0, &[], &[SeqId(0)]), Err(ControllerError::Failed)));
    assert!(matches!(driver.fork(SeqId(1)), Err(ControllerError::Failed)));
}

#[test]
fn test_program_error_at_start() {
    let env = create_env();
    let mut driver = env.driver(
        0,
        program(|_ctrl| async move {
            anyhow::bail!("no prompt for me");
        }),
    );
    let err = driver.init_prompt(&[]).unwrap_err();
    assert!(matches!(err, ControllerError::Program(_)));
    assert!(err.to_string().contains("no prompt for me"));
    assert_eq!(driver.status(), Status::Failed);
}

#[test]
fn test_program_error_mid_run() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    host.spawn(
        "",
        program(|ctrl| async move {
            ctrl.fixed("Hello").await?;
            anyhow::ensure!(ctrl.tokens().is_empty(), "history is not empty");
            Ok(())
        }),
    )
    .unwrap();
    let err = host.run().unwrap_err();
    assert!(err.to_string().contains("history is not empty"));
}

#[test]
fn test_overlong_host_backtrack() {
    let env = create_env();
    let mut driver = env.driver(0, program(hello_then_gen));
    driver.init_prompt(&[1, 2]).unwrap();
    let hello = env.token("Hello");
    driver.step(0, &[], &[SeqId(0)]).unwrap();
    driver.step(0, &[hello], &[SeqId(0)]).unwrap();
    let err = driver.step(9, &[], &[SeqId(0)]).unwrap_err();
    assert!(matches!(err, ControllerError::Backtrack { requested: 9, .. }));
}

#[test]
fn test_prompt_is_visible_to_the_program() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let id = host
        .spawn(
            "Hello world",
            program(|ctrl| async move {
                anyhow::ensure!(ctrl.prompt_len() == 2, "prompt_len {}", ctrl.prompt_len());
                anyhow::ensure!(ctrl.prompt() == ctrl.tokens());
                ctrl.fixed("!").await?;
                anyhow::ensure!(ctrl.tokens().len() == 3);
                Ok(())
            }),
        )
        .unwrap();
    host.run().unwrap();
    assert_eq!(host.text(id), "Hello world!");
}
