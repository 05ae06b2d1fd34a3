// tests/chain_properties.rs

mod common;
use crate::common::builders::linear_chain;
use crate::common::{ScriptedExecutor, controller, log_entries, mock_fs};

use flowchain::chain::{ChainCore, ChainPlan, ChainStep, StageState};
use flowchain::types::StageOutcome;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Whatever stage fails first, nothing after it is invoked or logged,
    /// and everything before it ran exactly once, in order.
    #[test]
    fn failure_at_k_halts_everything_after(
        n in 1usize..8,
        fail_at in proptest::option::of(0usize..8),
        code in prop_oneof![1i32..=255, Just(-1)],
    ) {
        let cfg = linear_chain(n).build();
        let fs = mock_fs(&cfg);
        let fail_at = fail_at.filter(|k| *k < n);

        let mut executor = ScriptedExecutor::new();
        if let Some(k) = fail_at {
            executor = executor.exit_with(&format!("s{k}"), code);
        }
        let mut ctl = controller(&cfg, &fs, executor.clone());
        let report = runtime().block_on(ctl.run(ChainPlan::from_config(&cfg))).unwrap();

        let ran = fail_at.map_or(n, |k| k + 1);
        let expected: Vec<String> = (0..ran).map(|i| format!("s{i}")).collect();
        prop_assert_eq!(executor.executed(), expected.clone());

        let logged = log_entries(&cfg, &fs);
        prop_assert_eq!(logged.len(), ran);
        for (i, line) in logged.iter().enumerate() {
            let name = &expected[i];
            if Some(i) == fail_at {
                prop_assert_eq!(line, &format!("[{name}] FAILED (Error {code})"));
            } else {
                prop_assert_eq!(line, &format!("[{name}] SUCCESS"));
            }
        }

        for i in ran..n {
            prop_assert_eq!(report.state_of(&format!("s{i}")), Some(StageState::Pending));
        }
        match fail_at {
            Some(_) => prop_assert_eq!(report.exit_code(), code),
            None => prop_assert_eq!(report.exit_code(), 0),
        }
    }

    /// The pure core never has more than one stage running and never
    /// dispatches a stage twice.
    #[test]
    fn core_dispatches_each_stage_at_most_once(
        n in 1usize..10,
        outcomes in proptest::collection::vec(prop_oneof![Just(0i32), 1i32..4], 10),
    ) {
        let cfg = linear_chain(n).build();
        let mut core = ChainCore::new(ChainPlan::from_config(&cfg));
        let mut dispatched = Vec::new();

        let mut step = core.start();
        while let ChainStep::Dispatch(stage) = step {
            prop_assert!(!dispatched.contains(&stage.name));
            let idx = dispatched.len();
            dispatched.push(stage.name.clone());

            let running = (0..n)
                .filter(|i| core.state_of(&format!("s{i}")) == Some(StageState::Running))
                .count();
            prop_assert_eq!(running, 1);

            step = core.on_stage_finished(StageOutcome::from_exit_code(outcomes[idx]));
        }

        prop_assert!(core.is_finished());
        let expected: Vec<String> = (0..dispatched.len()).map(|i| format!("s{i}")).collect();
        prop_assert_eq!(dispatched, expected);
    }
}
