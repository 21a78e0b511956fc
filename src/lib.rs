//! connectflow
//!
//! OAuth connection lifecycle for linking a user's account with an external
//! professional-network identity provider: authorize, exchange the code for
//! tokens, persist, classify, and disconnect — plus the popup transport that
//! coordinates the main window and a transient authorization popup without a
//! cross-window message channel.

pub mod callback;
pub mod clock;
pub mod config;
pub mod error;
pub mod oauth;
pub mod popup;
pub mod store;

pub use callback::{CallbackServer, CallbackServerHandle, CALLBACK_PATH};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ProviderConfig;
pub use error::{ConnectError, Result};
pub use oauth::{AuthorizationRequest, ConnectionService, ConnectionStatus};
pub use popup::{CallbackParams, FlowOutcome, PopupCoordinator, PopupDriver, PopupHandle, PopupProbe};
pub use store::{ConnectionProfile, ConnectionRecord, MemoryRecordStore, RecordStore};
