//! User-visible problems. How they're shown (toasts, banners, ...) is up to the UI, which plugs in
//! an [`ErrorSurface`].

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Couldn't reach the server. `context` says what we were doing at the time.
    NetworkError { context: String },
    /// The server closed the session, so the user needs to log in again.
    NotAuthenticated,
    /// The server rejected an action.
    ServerError { title: String, description: String },
}

impl Notice {
    pub(crate) fn network(context: impl Into<String>) -> Self {
        Notice::NetworkError {
            context: context.into(),
        }
    }

    pub(crate) fn message_rejected(description: impl Into<String>) -> Self {
        Notice::ServerError {
            title: "Error sending message".to_string(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NetworkError { context } => write!(f, "Network error ({context})"),
            Notice::NotAuthenticated => write!(f, "You're not logged in"),
            Notice::ServerError { title, description } => write!(f, "{title}: {description}"),
        }
    }
}

pub trait ErrorSurface: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log. Handy when there's no UI attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSurface;

impl ErrorSurface for LogSurface {
    fn notify(&self, notice: Notice) {
        log::error!("{notice}");
    }
}

impl<F: Fn(Notice) + Send + Sync> ErrorSurface for F {
    fn notify(&self, notice: Notice) {
        self(notice)
    }
}
