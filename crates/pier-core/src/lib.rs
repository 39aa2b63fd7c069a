//! Session coordination core for Pier: who is connected, who is matched
//! with whom, and how negotiation messages move between them.

pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod relay;

pub use error::SignalError;
pub use lifecycle::{Coordinator, CoordinatorStats, Outbox, Outcome};
pub use matcher::{build_matcher, Matcher, Notice, PairwiseMatcher, RoomMatcher};
pub use negotiation::{
    CandidateDisposition, LinkState, LinkTable, MediaError, MediaSession, NegotiationError,
    NegotiationLink,
};
pub use protocol::{ClientMessage, MatchPolicy, MemberInfo, MessageKind, PeerId, Role, ServerMessage};
pub use registry::{MembershipState, Participant, Registry};
