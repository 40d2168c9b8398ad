//! Circuit and channel state machines.
//!
//! Every circuit and every channel tracks TWO machines: the CLIENT's view
//! and the SERVER's view, advanced in lockstep whether a command is being
//! sent or processed. The transition tables are total functions returning
//! `None` for illegal `(viewed role, state, command)` triples; the circuit
//! turns a `None` into a local or remote protocol error depending on who
//! produced the command.

use calcium_codec::Command;
use calcium_wire::Role;

/// Per-role view of a virtual circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    // Client-side views
    SendVersionRequest,
    AwaitingVersionResponse,
    // Server-side views
    Idle,
    SendVersionResponse,
    // Shared
    Connected,
    Disconnected,
}

/// Per-role view of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    // Client-side views
    SendCreateChanRequest,
    AwaitCreateChanResponse,
    // Server-side views
    Idle,
    SendCreateChanResponse,
    // Shared
    Connected,
    MustClose,
    Closed,
    Failed,
}

/// Both views of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStates {
    pub client: CircuitState,
    pub server: CircuitState,
}

impl CircuitStates {
    pub fn initial() -> CircuitStates {
        CircuitStates {
            client: CircuitState::SendVersionRequest,
            server: CircuitState::Idle,
        }
    }

    pub fn get(&self, role: Role) -> CircuitState {
        match role {
            Role::Client => self.client,
            Role::Server => self.server,
        }
    }
}

/// Both views of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStates {
    pub client: ChannelState,
    pub server: ChannelState,
}

impl ChannelStates {
    pub fn initial() -> ChannelStates {
        ChannelStates {
            client: ChannelState::SendCreateChanRequest,
            server: ChannelState::Idle,
        }
    }

    pub fn get(&self, role: Role) -> ChannelState {
        match role {
            Role::Client => self.client,
            Role::Server => self.server,
        }
    }
}

/// Commands that advance channel machines rather than circuit machines.
pub(crate) fn is_channel_command(command: &Command) -> bool {
    use Command::*;
    matches!(
        command,
        CreateChanRequest(_)
            | CreateChanResponse(_)
            | CreateChFailResponse(_)
            | AccessRightsResponse(_)
            | ServerDisconnResponse(_)
            | ClearChannelRequest(_)
            | ClearChannelResponse(_)
            | ReadRequest(_)
            | ReadResponse(_)
            | WriteRequest(_)
            | ReadNotifyRequest(_)
            | ReadNotifyResponse(_)
            | WriteNotifyRequest(_)
            | WriteNotifyResponse(_)
            | EventAddRequest(_)
            | EventAddResponse(_)
            | EventCancelRequest(_)
            | EventCancelResponse(_)
    )
}

/// Advance one circuit view. `None` means the triple is not in the table.
pub(crate) fn circuit_transition(
    viewed: Role,
    state: CircuitState,
    command: &Command,
) -> Option<CircuitState> {
    use CircuitState::*;
    match (viewed, state, command) {
        (Role::Client, SendVersionRequest, Command::VersionRequest(_)) => {
            Some(AwaitingVersionResponse)
        }
        (Role::Client, AwaitingVersionResponse, Command::VersionResponse(_)) => Some(Connected),
        // Clients pipeline their identity before the version answer lands.
        (
            Role::Client,
            AwaitingVersionResponse,
            Command::HostNameRequest(_) | Command::ClientNameRequest(_),
        ) => Some(AwaitingVersionResponse),
        (Role::Server, Idle, Command::VersionRequest(_)) => Some(SendVersionResponse),
        (Role::Server, SendVersionResponse, Command::VersionResponse(_)) => Some(Connected),
        (
            Role::Server,
            SendVersionResponse,
            Command::HostNameRequest(_) | Command::ClientNameRequest(_),
        ) => Some(SendVersionResponse),
        // Once connected, every command is legal at the circuit level
        // (channel machines take over the per-channel rules).
        (_, Connected, Command::Disconnected) => None,
        (_, Connected, _) => Some(Connected),
        _ => None,
    }
}

/// Advance one channel view. `None` means the triple is not in the table.
pub(crate) fn channel_transition(
    viewed: Role,
    state: ChannelState,
    command: &Command,
) -> Option<ChannelState> {
    use ChannelState::*;

    // Operations legal on a connected channel that leave it connected.
    let steady = matches!(
        command,
        Command::AccessRightsResponse(_)
            | Command::ReadRequest(_)
            | Command::ReadResponse(_)
            | Command::WriteRequest(_)
            | Command::ReadNotifyRequest(_)
            | Command::ReadNotifyResponse(_)
            | Command::WriteNotifyRequest(_)
            | Command::WriteNotifyResponse(_)
            | Command::EventAddRequest(_)
            | Command::EventAddResponse(_)
            | Command::EventCancelRequest(_)
            | Command::EventCancelResponse(_)
    );

    match (viewed, state, command) {
        (Role::Client, SendCreateChanRequest, Command::CreateChanRequest(_)) => {
            Some(AwaitCreateChanResponse)
        }
        (Role::Client, AwaitCreateChanResponse, Command::CreateChanResponse(_)) => Some(Connected),
        (Role::Client, AwaitCreateChanResponse, Command::CreateChFailResponse(_)) => Some(Failed),
        // Access rights arrive before the create answer.
        (Role::Client, AwaitCreateChanResponse, Command::AccessRightsResponse(_)) => {
            Some(AwaitCreateChanResponse)
        }
        (Role::Server, Idle, Command::CreateChanRequest(_)) => Some(SendCreateChanResponse),
        (Role::Server, SendCreateChanResponse, Command::CreateChanResponse(_)) => Some(Connected),
        (Role::Server, SendCreateChanResponse, Command::CreateChFailResponse(_)) => Some(Failed),
        (Role::Server, SendCreateChanResponse, Command::AccessRightsResponse(_)) => {
            Some(SendCreateChanResponse)
        }
        (_, Connected, _) if steady => Some(Connected),
        (_, Connected, Command::ClearChannelRequest(_)) => Some(MustClose),
        (_, MustClose, Command::ClearChannelResponse(_)) => Some(Closed),
        // The server can drop a channel from any live state.
        (
            _,
            AwaitCreateChanResponse | SendCreateChanResponse | Connected | MustClose,
            Command::ServerDisconnResponse(_),
        ) => Some(Closed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcium_codec::{ClearChannelRequest, EchoRequest, VersionRequest, VersionResponse};

    fn version_request() -> Command {
        Command::from(VersionRequest::new(0, 13).unwrap())
    }

    #[test]
    fn circuit_happy_path() {
        let mut states = CircuitStates::initial();
        for command in [
            version_request(),
            Command::from(VersionResponse::new(13)),
        ] {
            states.client = circuit_transition(Role::Client, states.client, &command).unwrap();
            states.server = circuit_transition(Role::Server, states.server, &command).unwrap();
        }
        assert_eq!(states.client, CircuitState::Connected);
        assert_eq!(states.server, CircuitState::Connected);
    }

    #[test]
    fn echo_illegal_before_connected() {
        let echo = Command::from(EchoRequest);
        assert!(circuit_transition(Role::Client, CircuitState::SendVersionRequest, &echo).is_none());
        assert!(circuit_transition(Role::Client, CircuitState::Connected, &echo).is_some());
    }

    #[test]
    fn disconnected_is_terminal() {
        let command = version_request();
        assert!(circuit_transition(Role::Client, CircuitState::Disconnected, &command).is_none());
        assert!(circuit_transition(Role::Server, CircuitState::Disconnected, &command).is_none());
    }

    #[test]
    fn channel_cannot_clear_before_connected() {
        let clear = Command::from(ClearChannelRequest { sid: 0, cid: 0 });
        assert!(
            channel_transition(Role::Client, ChannelState::SendCreateChanRequest, &clear).is_none()
        );
        assert_eq!(
            channel_transition(Role::Client, ChannelState::Connected, &clear),
            Some(ChannelState::MustClose)
        );
    }
}
