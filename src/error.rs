//! Error types and handling for Fringesync

/// Result type alias for Fringesync operations
pub type Result<T> = std::result::Result<T, FringeError>;

/// Error types for the synchronization and acquisition core
#[derive(Debug, thiserror::Error)]
pub enum FringeError {
    /// Creation of an OS-level signal primitive failed (eventfd, timerfd)
    #[error("Event creation failed for {group}: {message}")]
    EventCreation { group: String, message: String },

    /// A (code, instance) lookup did not resolve to a live event
    #[error("Invalid event: {code} on instance {instance}")]
    InvalidEvent { code: String, instance: usize },

    /// The requested group instance does not exist or was removed
    #[error("Instance not found: {group} instance {instance}")]
    InstanceNotFound { group: String, instance: usize },

    /// A blocking multi-wait returned a hard failure (not a timeout)
    #[error("Wait failed: {message}")]
    WaitFailed { message: String },

    /// Signaling an event failed at the OS level
    #[error("Signal error: {message}")]
    Signal { message: String },

    /// Watchdog or spin-timer failure
    #[error("Timer error: {message}")]
    Timer { message: String },

    /// Thread spawn/join failures
    #[error("Thread error: {message}")]
    Thread { message: String },

    /// ID-change rendezvous could not complete
    #[error("Rendezvous failed: {message}")]
    Rendezvous { message: String },

    /// Replay-file access errors
    #[error("Replay error: {message}")]
    Replay {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },
}

impl FringeError {
    /// Create an event-creation error tagged with the owning group
    pub fn event_creation(group: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EventCreation {
            group: group.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-event lookup error
    pub fn invalid_event(code: impl Into<String>, instance: usize) -> Self {
        Self::InvalidEvent {
            code: code.into(),
            instance,
        }
    }

    /// Create an instance-not-found error
    pub fn instance_not_found(group: impl Into<String>, instance: usize) -> Self {
        Self::InstanceNotFound {
            group: group.into(),
            instance,
        }
    }

    /// Create a wait-failure error
    pub fn wait_failed(message: impl Into<String>) -> Self {
        Self::WaitFailed {
            message: message.into(),
        }
    }

    /// Create a signaling error
    pub fn signal(message: impl Into<String>) -> Self {
        Self::Signal {
            message: message.into(),
        }
    }

    /// Create a timer error
    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer {
            message: message.into(),
        }
    }

    /// Create a thread lifecycle error
    pub fn thread(message: impl Into<String>) -> Self {
        Self::Thread {
            message: message.into(),
        }
    }

    /// Create a rendezvous error
    pub fn rendezvous(message: impl Into<String>) -> Self {
        Self::Rendezvous {
            message: message.into(),
        }
    }

    /// Create a replay-file error from a standard I/O error
    pub fn from_replay_io(source: std::io::Error, context: &str) -> Self {
        Self::Replay {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a replay-file error without an underlying I/O cause
    pub fn replay(message: impl Into<String>) -> Self {
        Self::Replay {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid-parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}
