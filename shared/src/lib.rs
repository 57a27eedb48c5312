//! Types shared between the race server and its clients: geographic
//! primitives, the course model and the binary wire protocol.

pub mod course;
pub mod geo;
pub mod protocol;

pub use course::{CompoundMark, CourseDefinition, CourseError, Mark, MarkOrder, RoundingSide};
pub use geo::{GeoPoint, LineCrossing};
pub use protocol::{Frame, FrameError, FrameReader, Message, ProtocolError};

pub const DEFAULT_PORT: u16 = 4942;
pub const STATE_UPDATES_PER_SECOND: u32 = 60;
