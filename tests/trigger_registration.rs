// tests/trigger_registration.rs

mod common;
use crate::common::builders::{keepalive_trigger, monthly_trigger, three_stage_chain};
use crate::common::init_tracing;

use chrono::NaiveTime;
use flowchain::register_triggers;
use flowchain::trigger::{
    CronScheduler, FireCondition, MemoryCrontab, MemoryScheduler, TriggerContext,
    TriggerRegistrar, triggers_from_config,
};

fn ctx() -> TriggerContext {
    TriggerContext::new(
        "/usr/local/bin/flowchain",
        "/work/Flowchain.toml",
        "/work",
    )
}

#[test]
fn reregistering_pipeline_keeps_one_trigger_with_the_new_time() {
    init_tracing();
    let first = three_stage_chain()
        .with_trigger("Pipeline", monthly_trigger(17, "17:10"))
        .build();
    let second = three_stage_chain()
        .with_trigger("Pipeline", monthly_trigger(17, "09:00"))
        .build();

    let mut registrar = TriggerRegistrar::new(MemoryScheduler::new());
    assert_eq!(register_triggers(&mut registrar, &first, &ctx(), &[]).unwrap(), 0);
    assert_eq!(register_triggers(&mut registrar, &second, &ctx(), &[]).unwrap(), 0);

    let backend = registrar.backend();
    assert_eq!(backend.triggers().len(), 1);
    let pipeline = backend.get("Pipeline").unwrap();
    assert_eq!(
        pipeline.conditions,
        vec![FireCondition::Monthly {
            day: 17,
            at: NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        }]
    );
    assert_eq!(
        backend.calls(),
        ["delete:Pipeline", "create:Pipeline", "delete:Pipeline", "create:Pipeline"]
    );
}

#[test]
fn one_rejected_trigger_does_not_block_the_others() {
    let cfg = three_stage_chain()
        .with_trigger("Pipeline", monthly_trigger(17, "09:00"))
        .with_trigger("Worker", keepalive_trigger("prefect worker start --pool default", Some("08:00")))
        .build();

    let mut backend = MemoryScheduler::new();
    backend.reject("Pipeline");
    let mut registrar = TriggerRegistrar::new(backend);

    let code = register_triggers(&mut registrar, &cfg, &ctx(), &[]).unwrap();

    assert_eq!(code, 1);
    assert!(registrar.backend().get("Pipeline").is_none());
    assert!(registrar.backend().get("Worker").is_some());
}

#[test]
fn naming_an_unknown_trigger_fails_before_touching_the_scheduler() {
    let cfg = three_stage_chain()
        .with_trigger("Pipeline", monthly_trigger(17, "09:00"))
        .build();
    let mut registrar = TriggerRegistrar::new(MemoryScheduler::new());

    let result = register_triggers(&mut registrar, &cfg, &ctx(), &["Nightly".to_string()]);

    assert!(result.is_err());
    assert!(registrar.backend().calls().is_empty());
}

#[test]
fn cron_backend_round_trip_through_the_registrar() {
    let cfg = three_stage_chain()
        .with_trigger("Pipeline", monthly_trigger(17, "09:00"))
        .with_trigger("Worker", keepalive_trigger("prefect worker start", Some("08:00")))
        .build();
    let triggers = triggers_from_config(&cfg, &ctx()).unwrap();

    let crontab = MemoryCrontab::new("MAILTO=ops@example.com\n");
    let mut registrar = TriggerRegistrar::new(CronScheduler::new(crontab));
    for (_, result) in registrar.register_all(&triggers) {
        result.unwrap();
    }
    // Registering again changes nothing.
    for (_, result) in registrar.register_all(&triggers) {
        result.unwrap();
    }

    let table = registrar.backend().store().contents.clone();
    assert!(table.starts_with("MAILTO=ops@example.com\n"));
    assert_eq!(table.matches("# flowchain:Pipeline").count(), 1);
    assert_eq!(table.matches("# flowchain:Worker").count(), 2);
    assert!(table.contains(
        "0 9 17 * * cd '/work' && flock -n '/tmp/flowchain-Pipeline.lock' \
         '/usr/local/bin/flowchain' '--config' '/work/Flowchain.toml' 'chain'"
    ));
    assert!(table.contains("@reboot cd '/work' && flock -n '/tmp/flowchain-Worker.lock' "));

    registrar.unregister("Worker").unwrap();
    let table = &registrar.backend().store().contents;
    assert!(!table.contains("Worker"));
    assert!(!table.contains("prefect"));
    assert!(table.contains("# flowchain:Pipeline"));
}
