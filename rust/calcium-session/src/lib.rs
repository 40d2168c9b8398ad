//! Channel Access session engines: the TCP-side virtual circuit with its
//! channels, and the UDP-side broadcaster with the repeater.
//!
//! Everything here is sans-I/O: each engine is a pure state machine driven
//! by `send`/`recv`/`process_command` calls, returning buffers to transmit
//! and commands to act on. The embedding host owns sockets, timers,
//! retries, and task orchestration, and must drive each engine from a
//! single logical owner at a time.

pub mod broadcaster;
pub mod channel;
pub mod circuit;
pub mod env;
pub mod error;
pub mod records;
pub mod repeater;
pub mod state;

pub use broadcaster::{BeaconBackoff, BeaconState, BroadcastEvent, Broadcaster};
pub use channel::{ClientChannel, ServerChannel};
pub use circuit::{ChannelInfo, VirtualCircuit};
pub use env::{DEFAULT_MAX_ARRAY_BYTES, EpicsEnv, parse_address_list};
pub use error::{Error, IdKind, ProtocolViolation, StatePair};
pub use records::{ParsedRecord, RecordModifiers, parse_channel_filter, parse_record_field};
pub use repeater::Repeater;
pub use state::{ChannelState, ChannelStates, CircuitState, CircuitStates};
