use super::*;

#[test]
fn new_job_starts_in_init() {
    let job = Job::new();
    assert_eq!(job.state, JobState::Init);
    assert!(job.result.is_none());
}

#[test]
fn legal_happy_path_transitions() {
    assert!(JobState::Init.can_transition_to(JobState::Queued));
    assert!(JobState::Queued.can_transition_to(JobState::Running));
    assert!(JobState::Running.can_transition_to(JobState::Done));
}

#[test]
fn terminal_states_never_transition_again() {
    assert!(!JobState::Done.can_transition_to(JobState::Running));
    assert!(!JobState::Error.can_transition_to(JobState::Queued));
    assert!(!JobState::Interrupted.can_transition_to(JobState::Done));
}

#[test]
fn cannot_skip_queued() {
    assert!(!JobState::Init.can_transition_to(JobState::Running));
    assert!(!JobState::Init.can_transition_to(JobState::Done));
}

#[test]
fn job_id_round_trips_through_string() {
    let id = JobId::new();
    let parsed = JobId::from_string(id.as_str());
    assert_eq!(id, parsed);
    assert!(id.as_str().starts_with("job-"));
}

#[test]
fn job_error_from_daemon_error_preserves_status_code() {
    let err = DaemonError::NoSuchJob("job-xyz".into());
    let job_err = JobError::from(&err);
    assert_eq!(job_err.status_code, 400);
    assert_eq!(job_err.error, "No such job");
}
