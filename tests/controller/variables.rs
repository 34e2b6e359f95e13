//! Shared variables between sequences.

use steerlet::prelude::*;

use crate::common::{create_env, MockHost};

async fn waiter(ctrl: Controller) -> anyhow::Result<()> {
    let values = ctrl.wait_vars(&["pet", "color"]).await?;
    let text = format!("{} {}", String::from_utf8(values[0].clone())?, String::from_utf8(values[1].clone())?);
    ctrl.fixed(&text).await?;
    ctrl.check_vars(&[("pet", "dog"), ("color", "red")])?;
    Ok(())
}

async fn writer(ctrl: Controller) -> anyhow::Result<()> {
    ctrl.fixed("dog").await?;
    ctrl.set_var("pet", "dog");
    ctrl.fixed("!").await?;
    ctrl.append_var("color", b"re");
    ctrl.append_var("color", b"d");
    Ok(())
}

#[test]
fn test_wait_vars_across_sequences() {
    let env = create_env();
    let mut host = MockHost::new(&env);
    let a = host.spawn("", program(waiter)).unwrap();
    let b = host.spawn("", program(writer)).unwrap();
    host.run().unwrap();

    assert_eq!(host.text(a), "dog red");
    assert_eq!(host.text(b), "dog!");
    assert_eq!(env.vars.names(), vec!["color".to_string(), "pet".to_string()]);
}

#[test]
fn test_wait_vars_yields_without_sampling() {
    let env = create_env();
    let mut driver = env.driver(0, program(waiter));
    driver.init_prompt(&[]).unwrap();

    for _ in 0..3 {
        let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
        assert!(res.skip_me);
        assert!(res.branches.is_empty());
    }
    env.vars.set("pet", "dog");
    env.vars.set("color", "red");
    let res = driver.step(0, &[], &[SeqId(0)]).unwrap();
    assert!(res.skip_me);
    assert_eq!(res.unconditional_splice().map(|s| s.ff_tokens.len()), Some(5));
}

#[test]
fn test_check_var_mismatch_fails_program() {
    let env = create_env();
    env.vars.set("pet", "cat");
    let mut host = MockHost::new(&env);
    let err = host
        .spawn(
            "",
            program(|ctrl| async move {
                ctrl.check_var("pet", "dog")?;
                Ok(())
            }),
        )
        .unwrap_err();
    assert!(err.to_string().contains("expected \"dog\""));
}
