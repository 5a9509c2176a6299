pub mod backend;
pub mod command;
pub mod dispatcher;
pub mod noop;
pub mod router;
pub mod slack;

pub use backend::{DesktopNotice, NotifyBackend, SoundCue};
pub use dispatcher::{DispatchStats, Dispatcher};
