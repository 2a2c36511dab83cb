pub mod events;
pub mod session;
pub mod tools;

pub use events::client::{ContentPart, Item, MessageRole};
pub use events::{ClientEvent, ServerEvent};
pub use session::{EphemeralCredential, RealtimeSessionResponse, SessionCreateRequest};
pub use tools::{FunctionTool, Tool};
