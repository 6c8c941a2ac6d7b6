/// Error taxonomy for the engine's public boundaries. Internal component
/// code propagates with `anyhow`; these variants are what crosses a crate
/// boundary or reaches the CLI.
#[derive(thiserror::Error, Debug)]
pub enum FzError {
    /// Bad path, unreadable file, invalid URI, unknown calculator alias,
    /// missing required variable of an unusual kind. Fails fast before
    /// dispatch.
    #[error("input error: {message}")]
    Input { message: String },

    /// Unparseable formula at compile time. The compiler does not surface
    /// this as a hard error during a run (it substitutes a fallback and
    /// warns); this variant exists for APIs that want to report it directly
    /// (e.g. a `--strict` mode or structural misconfiguration such as an
    /// interpreter that cannot be invoked at all).
    #[error("template error in case '{case_suffix}': {message}")]
    Template {
        case_suffix: String,
        message: String,
    },

    /// Cancellation requested; distinct from a user-code failure.
    #[error("cancelled")]
    Cancelled,

    /// Failed to create a directory we own, disk full, or similar fatal
    /// infrastructure failure. The only kind that propagates out of `run`.
    #[error("structural error: {message}")]
    Structural { message: String },

    /// A calculator URI failed to parse against the grammar in §3.
    #[error("invalid calculator URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_input() {
        let e = FzError::Input {
            message: "missing template path".into(),
        };
        assert_eq!(e.to_string(), "input error: missing template path");
    }

    #[test]
    fn display_template() {
        let e = FzError::Template {
            case_suffix: "x=1".into(),
            message: "unbalanced formula delimiter".into(),
        };
        assert_eq!(
            e.to_string(),
            "template error in case 'x=1': unbalanced formula delimiter"
        );
    }

    #[test]
    fn display_invalid_uri() {
        let e = FzError::InvalidUri {
            uri: "ftp://nope".into(),
            reason: "unknown scheme".into(),
        };
        assert_eq!(
            e.to_string(),
            "invalid calculator URI 'ftp://nope': unknown scheme"
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FzError>();
    }
}
