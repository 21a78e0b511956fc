//! Browser-window abstraction for the popup transport.
//!
//! The coordinator never touches a real window; embedders supply a driver
//! that opens the authorization URL in a secondary window and a handle that
//! answers the two questions a browser allows: "is it closed?" (always
//! inspectable) and "what is its location?" (only while same-origin).

use serde::Deserialize;
use url::Url;

use crate::error::Result;

/// Query parameters the provider appends when redirecting back to the
/// callback path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract callback parameters from a same-origin location.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

/// Result of one location probe of the popup window.
#[derive(Debug, Clone)]
pub enum PopupProbe {
    /// Still on the provider's origin; the location is unreadable. Expected
    /// for most of the popup's lifetime, never an error.
    CrossOrigin,
    /// Same-origin but not yet on the callback path.
    SameOriginOther,
    /// Reached the callback path; parameters extracted from its query string.
    Callback(CallbackParams),
}

/// A live popup window.
pub trait PopupHandle: Send {
    /// Whether the window has been closed, by the user or by the flow.
    fn is_closed(&self) -> bool;

    /// Best-effort read of the window's location.
    fn probe(&self) -> PopupProbe;

    /// Close the window. Must be safe to call on an already-closed window.
    fn close(&mut self);
}

/// Opens secondary browser windows. `open` fails with
/// [`crate::ConnectError::PopupBlocked`] when window creation is refused.
pub trait PopupDriver: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn PopupHandle>>;
}
