/// Failure of an asynchronous session lookup.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("internal session store error: {0}")]
    Internal(String),
    #[error("session lookup panicked: {0}")]
    Panicked(String),
    #[error("session lookup cancelled")]
    Cancelled,
}

impl LookupError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
            Self::Panicked(_) => "panicked",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Failure while attaching an extension to the host's initializer registry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("a client initializer is already registered by extension '{owner}'")]
    InitializerAlreadySet { owner: String },
    #[error("initializer registry is closed")]
    RegistryClosed,
    #[error("registration failed: {0}")]
    Internal(String),
}

/// Render a caught panic payload as text.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_error_kinds() {
        assert_eq!(LookupError::Unavailable("down".into()).error_kind(), "unavailable");
        assert_eq!(LookupError::Internal("bug".into()).error_kind(), "internal");
        assert_eq!(LookupError::Panicked("boom".into()).error_kind(), "panicked");
        assert_eq!(LookupError::Cancelled.error_kind(), "cancelled");
    }

    #[test]
    fn lookup_error_display_carries_detail() {
        let err = LookupError::Unavailable("replica offline".into());
        assert_eq!(err.to_string(), "session store unavailable: replica offline");
    }

    #[test]
    fn registration_error_names_owner() {
        let err = RegistrationError::InitializerAlreadySet {
            owner: "other-extension".into(),
        };
        assert!(err.to_string().contains("other-extension"));
    }

    #[test]
    fn panic_message_from_str_and_string() {
        let static_payload: Box<dyn std::any::Any + Send> = Box::new("static boom");
        assert_eq!(panic_message(static_payload.as_ref()), "static boom");

        let owned_payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned_payload.as_ref()), "owned boom");

        let other: Box<dyn std::any::Any + Send> = Box::new(17_u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
