//! Unit tests for the orchestration API module.

use rstest::rstest;

use super::{CommandOutcome, experiment_request, run_experiment};
use crate::config::ExperimentArgs;
use crate::executor::tests::fake_daemon::{FakeDaemon, RuntimeFixture, TestEngine, runtime};
use crate::executor::{ErrorCode, ExecutionOutcome, Phase};

fn args(target: &str, action: &str, flags: &[(&str, &str)]) -> ExperimentArgs {
    ExperimentArgs {
        target: String::from(target),
        action: String::from(action),
        uid: Some(String::from("7c1f2a")),
        flags: flags
            .iter()
            .map(|(name, value)| (String::from(*name), String::from(*value)))
            .collect(),
    }
}

#[rstest]
#[case(ExecutionOutcome::success(None), CommandOutcome::Success, 0)]
#[case(
    ExecutionOutcome::failure(ErrorCode::DOCKER_EXEC_FAILED, "boom"),
    CommandOutcome::Failed,
    1
)]
#[case(
    ExecutionOutcome::failure(ErrorCode::ALREADY_DESTROYED, "already destroyed"),
    CommandOutcome::Recoverable,
    2
)]
#[case(
    ExecutionOutcome::failure(ErrorCode::SIDECAR_CONFLICT, "retry"),
    CommandOutcome::Recoverable,
    2
)]
fn outcomes_map_to_exit_codes(
    #[case] outcome: ExecutionOutcome,
    #[case] expected: CommandOutcome,
    #[case] code: u8,
) {
    let command = CommandOutcome::from_execution(&outcome);
    assert_eq!(command, expected);
    assert_eq!(command.exit_code(), code);
}

#[rstest]
fn request_carries_arguments() {
    let request = experiment_request(
        Phase::Destroy,
        &args(" network ", "delay", &[("container-id", "abc"), ("time", "3000")]),
    );

    assert_eq!(request.target(), "network");
    assert_eq!(request.action(), "delay");
    assert_eq!(request.phase(), Phase::Destroy);
    assert_eq!(request.experiment_id(), Some("7c1f2a"));
    assert_eq!(request.flag("container-id"), Some("abc"));
    assert_eq!(request.flag("time"), Some("3000"));
}

#[rstest]
fn later_repeated_flag_wins() {
    let request = experiment_request(
        Phase::Create,
        &args("cpu", "fullload", &[("cpu-percent", "50"), ("cpu-percent", "80")]),
    );
    assert_eq!(request.flag("cpu-percent"), Some("80"));
}

#[rstest]
fn run_experiment_drives_the_engine(runtime: RuntimeFixture) {
    let rt = runtime.expect("runtime should build");
    let daemon = FakeDaemon::with_target();
    let harness = TestEngine::new(&daemon, |_| {});

    let outcome = rt.block_on(run_experiment(
        &harness.engine,
        Phase::Destroy,
        &args("cpu", "fullload", &[("container-name", "web")]),
    ));

    assert!(outcome.success, "destroy failed: {outcome:?}");
    assert_eq!(
        CommandOutcome::from_execution(&outcome),
        CommandOutcome::Success
    );
    assert_eq!(daemon.state().tool_commands().len(), 1);
}
