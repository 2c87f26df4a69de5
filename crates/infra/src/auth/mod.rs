//! Interactive OAuth login: browser hand-off, loopback callback, and the
//! flow state machine tying them to the shared token store.

pub mod browser;
pub mod callback;
pub mod flow;

pub use browser::{BrowserOpener, ManualBrowser, SystemBrowser};
pub use callback::{CallbackListener, CallbackParams};
pub use flow::{AuthState, BeginOutcome, OAuth2Flow};
