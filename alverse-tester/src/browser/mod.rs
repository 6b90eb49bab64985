pub mod bridge;
pub mod session;

pub use bridge::UnityBridge;
pub use session::{BrowserConfig, BrowserKind, new_session};
