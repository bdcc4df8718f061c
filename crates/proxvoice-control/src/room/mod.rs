//! Room state store.
//!
//! `RoomRegistry` exclusively owns every `RoomState`; the policy engine and
//! scheduler mutate rooms in place through short critical sections, the
//! socket hub only reads them to build outbound messages.

mod registry;
mod state;

pub use registry::{RoomHandle, RoomRegistry};
pub use state::{CanHearMap, ParticipantState, RoomState, SessionRecord, SweepOutcome};
