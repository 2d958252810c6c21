pub mod actor;
pub mod registry;

pub use actor::{PlayerCommand, RoomActor, RoomInput, MAILBOX_CAPACITY};
pub use registry::RoomRegistry;
