use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    #[error("No wireless interface found")]
    NoInterfaceFound,

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Backend unreachable: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Radio toggle failed: {0}")]
    Toggle(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    #[error("Forget failed: {0}")]
    Forget(String),

    #[error("Failed to parse backend output: {0}")]
    Parse(String),

    #[error("Backend command failed: {0}")]
    Command(String),
}

pub type WifiResult<T> = Result<T, WifiError>;

impl WifiError {
    /// Stable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoInterfaceFound => "no_interface_found",
            Self::InterfaceNotFound(_) => "interface_not_found",
            Self::Connection(_) => "connection_error",
            Self::Timeout(_) => "timeout_error",
            Self::Scan(_) => "scan_error",
            Self::Toggle(_) => "toggle_error",
            Self::Connect(_) => "connect_error",
            Self::Disconnect(_) => "disconnect_error",
            Self::Forget(_) => "forget_error",
            Self::Parse(_) => "parse_error",
            Self::Command(_) => "command_error",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True when the control channel itself is gone (socket closed, exec failure).
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Re-tag an operation failure with the error kind of the calling operation.
    /// Timeouts and channel failures keep their own kind.
    pub fn into_operation(self, wrap: fn(String) -> WifiError) -> WifiError {
        match self {
            Self::Timeout(_) | Self::Connection(_) => self,
            Self::Scan(msg)
            | Self::Toggle(msg)
            | Self::Connect(msg)
            | Self::Disconnect(msg)
            | Self::Forget(msg)
            | Self::Parse(msg)
            | Self::Command(msg)
            | Self::InterfaceNotFound(msg) => wrap(msg),
            Self::NoInterfaceFound => wrap(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_wrapping_keeps_timeouts() {
        let err = WifiError::Timeout("SCAN".into()).into_operation(WifiError::Scan);
        assert!(err.is_timeout());

        let err = WifiError::Command("FAIL".into()).into_operation(WifiError::Forget);
        assert_eq!(err, WifiError::Forget("FAIL".into()));
    }

    #[test]
    fn kinds_are_distinct_for_timeout_and_connection() {
        assert_ne!(
            WifiError::Timeout(String::new()).kind(),
            WifiError::Connection(String::new()).kind()
        );
        assert!(WifiError::Connection("socket closed".into()).is_channel_failure());
    }
}
