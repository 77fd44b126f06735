use link_service::ServiceLifecycle;

/// Connection state presented to the user. Exactly one value is current at
/// any instant; the reconciler is its only writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Failed(String),
}

/// Inputs to the reconciler: the poller produces `Polled`/`PollFailed`,
/// the dispatcher produces `CommandStarted`/`CommandFinished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Polled(ServiceLifecycle),
    PollFailed(String),
    CommandStarted(LinkCommand),
    CommandFinished(LinkCommand, CommandOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub state: ConnectionState,
    pub last_error: Option<String>,
}

/// State machine merging poll results and command outcomes into one
/// displayable state plus a last-error slot. Events must be applied one at
/// a time; the caller provides that serialization.
#[derive(Debug)]
pub struct Reconciler {
    state: ConnectionState,
    last_error: Option<String>,
    in_flight: Option<LinkCommand>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            last_error: None,
            in_flight: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn in_flight(&self) -> Option<LinkCommand> {
        self.in_flight
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            state: self.state,
            last_error: self.last_error.clone(),
        }
    }

    /// Forgets the in-flight command without applying an outcome. Used when
    /// the engine deactivates while a command is still running; the stale
    /// completion is then ignored by `apply`.
    pub fn abandon_in_flight(&mut self) {
        self.in_flight = None;
    }

    /// Applies one event. Total over all event/state pairs: unexpected
    /// completions are ignored, so any ordered event log replays to the
    /// same result.
    pub fn apply(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Polled(lifecycle) => {
                // An in-flight command outranks polls; its resolution is
                // authoritative, and the next tick re-reads the service.
                if self.in_flight.is_some() {
                    return;
                }
                match lifecycle {
                    ServiceLifecycle::Running => {
                        self.state = ConnectionState::Connected;
                        self.last_error = None;
                    }
                    ServiceLifecycle::Pending => {
                        self.state = ConnectionState::Connecting;
                    }
                    ServiceLifecycle::Stopped => {
                        self.state = ConnectionState::Disconnected;
                        self.last_error = None;
                    }
                }
            }
            LinkEvent::PollFailed(message) => {
                // Transient query failures never flap the displayed state.
                self.last_error = Some(message);
            }
            LinkEvent::CommandStarted(command) => {
                self.in_flight = Some(command);
                // Start is optimistic; stop resolves near-instantly and
                // shows no intermediate state.
                if command == LinkCommand::Start && self.state == ConnectionState::Disconnected {
                    self.state = ConnectionState::Connecting;
                }
            }
            LinkEvent::CommandFinished(command, outcome) => {
                if self.in_flight != Some(command) {
                    return; // stale completion
                }
                self.in_flight = None;
                match (command, outcome) {
                    (LinkCommand::Start, CommandOutcome::Succeeded) => {
                        self.state = ConnectionState::Connected;
                        self.last_error = None;
                    }
                    (LinkCommand::Start, CommandOutcome::Failed(message)) => {
                        self.state = ConnectionState::Disconnected;
                        self.last_error = Some(message);
                    }
                    (LinkCommand::Stop, CommandOutcome::Succeeded) => {
                        self.state = ConnectionState::Disconnected;
                        self.last_error = None;
                    }
                    (LinkCommand::Stop, CommandOutcome::Failed(message)) => {
                        self.last_error = Some(message);
                    }
                }
            }
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(events: &[LinkEvent]) -> Reconciler {
        let mut reconciler = Reconciler::new();
        for event in events {
            reconciler.apply(event.clone());
        }
        reconciler
    }

    #[test]
    fn starts_disconnected_without_error() {
        let reconciler = Reconciler::new();
        assert_eq!(reconciler.state(), ConnectionState::Disconnected);
        assert_eq!(reconciler.last_error(), None);
        assert_eq!(reconciler.in_flight(), None);
    }

    #[test]
    fn idle_polls_follow_the_lifecycle_mapping() {
        let reconciler = replay(&[LinkEvent::Polled(ServiceLifecycle::Running)]);
        assert_eq!(reconciler.state(), ConnectionState::Connected);

        let reconciler = replay(&[LinkEvent::Polled(ServiceLifecycle::Pending)]);
        assert_eq!(reconciler.state(), ConnectionState::Connecting);

        let reconciler = replay(&[
            LinkEvent::Polled(ServiceLifecycle::Running),
            LinkEvent::Polled(ServiceLifecycle::Stopped),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn idle_polls_clear_error_on_running_and_stopped_but_not_pending() {
        let mut reconciler = replay(&[LinkEvent::PollFailed("timeout".into())]);
        assert_eq!(reconciler.last_error(), Some("timeout"));

        reconciler.apply(LinkEvent::Polled(ServiceLifecycle::Pending));
        assert_eq!(reconciler.last_error(), Some("timeout"));

        reconciler.apply(LinkEvent::Polled(ServiceLifecycle::Running));
        assert_eq!(reconciler.last_error(), None);

        reconciler.apply(LinkEvent::PollFailed("timeout".into()));
        reconciler.apply(LinkEvent::Polled(ServiceLifecycle::Stopped));
        assert_eq!(reconciler.last_error(), None);
    }

    #[test]
    fn poll_failure_records_error_without_moving_state() {
        let reconciler = replay(&[
            LinkEvent::Polled(ServiceLifecycle::Running),
            LinkEvent::PollFailed("connection refused".into()),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Connected);
        assert_eq!(reconciler.last_error(), Some("connection refused"));
    }

    #[test]
    fn start_is_optimistic_and_confirmed_by_its_outcome() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(LinkEvent::CommandStarted(LinkCommand::Start));
        assert_eq!(reconciler.state(), ConnectionState::Connecting);
        assert_eq!(reconciler.in_flight(), Some(LinkCommand::Start));

        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Start,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Connected);
        assert_eq!(reconciler.last_error(), None);
        assert_eq!(reconciler.in_flight(), None);
    }

    #[test]
    fn failed_start_reverts_to_disconnected_with_message() {
        let reconciler = replay(&[
            LinkEvent::CommandStarted(LinkCommand::Start),
            LinkEvent::CommandFinished(
                LinkCommand::Start,
                CommandOutcome::Failed("auth rejected".into()),
            ),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Disconnected);
        assert_eq!(reconciler.last_error(), Some("auth rejected"));
    }

    #[test]
    fn start_does_not_clear_a_previous_error_until_it_succeeds() {
        let mut reconciler = replay(&[
            LinkEvent::CommandStarted(LinkCommand::Start),
            LinkEvent::CommandFinished(
                LinkCommand::Start,
                CommandOutcome::Failed("auth rejected".into()),
            ),
            LinkEvent::CommandStarted(LinkCommand::Start),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Connecting);
        assert_eq!(reconciler.last_error(), Some("auth rejected"));

        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Start,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.last_error(), None);
    }

    #[test]
    fn stop_shows_no_intermediate_state() {
        let mut reconciler = replay(&[
            LinkEvent::Polled(ServiceLifecycle::Running),
            LinkEvent::CommandStarted(LinkCommand::Stop),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Connected);

        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Stop,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Disconnected);
        assert_eq!(reconciler.last_error(), None);
    }

    #[test]
    fn failed_stop_keeps_state_and_records_message() {
        let reconciler = replay(&[
            LinkEvent::Polled(ServiceLifecycle::Running),
            LinkEvent::CommandStarted(LinkCommand::Stop),
            LinkEvent::CommandFinished(
                LinkCommand::Stop,
                CommandOutcome::Failed("service unreachable".into()),
            ),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Connected);
        assert_eq!(reconciler.last_error(), Some("service unreachable"));
    }

    #[test]
    fn polls_are_ignored_while_a_command_is_in_flight() {
        let mut reconciler = replay(&[LinkEvent::CommandStarted(LinkCommand::Start)]);

        // A stale Stopped poll must not yank the state back while the
        // start is still completing.
        reconciler.apply(LinkEvent::Polled(ServiceLifecycle::Stopped));
        assert_eq!(reconciler.state(), ConnectionState::Connecting);

        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Start,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Connected);
    }

    #[test]
    fn poll_failure_during_start_records_error_but_keeps_connecting() {
        let reconciler = replay(&[
            LinkEvent::CommandStarted(LinkCommand::Start),
            LinkEvent::PollFailed("timeout".into()),
        ]);
        assert_eq!(reconciler.state(), ConnectionState::Connecting);
        assert_eq!(reconciler.last_error(), Some("timeout"));
    }

    #[test]
    fn mismatched_or_unexpected_completions_are_ignored() {
        let mut reconciler = Reconciler::new();
        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Start,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Disconnected);

        reconciler.apply(LinkEvent::CommandStarted(LinkCommand::Start));
        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Stop,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Connecting);
        assert_eq!(reconciler.in_flight(), Some(LinkCommand::Start));
    }

    #[test]
    fn abandoning_an_in_flight_command_discards_its_completion() {
        let mut reconciler = replay(&[LinkEvent::CommandStarted(LinkCommand::Start)]);
        reconciler.abandon_in_flight();
        assert_eq!(reconciler.in_flight(), None);

        reconciler.apply(LinkEvent::CommandFinished(
            LinkCommand::Start,
            CommandOutcome::Succeeded,
        ));
        assert_eq!(reconciler.state(), ConnectionState::Connecting);
    }

    #[test]
    fn replaying_the_same_log_gives_the_same_result() {
        let log = vec![
            LinkEvent::Polled(ServiceLifecycle::Stopped),
            LinkEvent::CommandStarted(LinkCommand::Start),
            LinkEvent::Polled(ServiceLifecycle::Stopped),
            LinkEvent::PollFailed("timeout".into()),
            LinkEvent::CommandFinished(LinkCommand::Start, CommandOutcome::Succeeded),
            LinkEvent::Polled(ServiceLifecycle::Running),
            LinkEvent::CommandStarted(LinkCommand::Stop),
            LinkEvent::CommandFinished(LinkCommand::Stop, CommandOutcome::Succeeded),
        ];

        let first = replay(&log).snapshot();
        let second = replay(&log).snapshot();
        assert_eq!(first, second);
        assert_eq!(first.state, ConnectionState::Disconnected);
        assert_eq!(first.last_error, None);
    }
}
