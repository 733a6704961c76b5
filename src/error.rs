//! Error types for lunahost.

use thiserror::Error;

/// Common error type for lunahost.
#[derive(Error, Debug)]
pub enum LunaError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interpreter error raised while preparing or calling into a script.
    #[error("script error: {0}")]
    Lua(String),

    /// A script with the same name or main path is already registered.
    #[error("duplicate script: {0}")]
    DuplicateScript(String),

    /// Script-only code was called on a thread with no active script context.
    #[error("no script context available on this thread")]
    NoScriptContext,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Connection open/close error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<mlua::Error> for LunaError {
    fn from(e: mlua::Error) -> Self {
        LunaError::Lua(e.to_string())
    }
}

/// Result type alias for lunahost operations.
pub type Result<T> = std::result::Result<T, LunaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_error_display() {
        let err = LunaError::DuplicateScript("hello.lua".to_string());
        assert_eq!(err.to_string(), "duplicate script: hello.lua");
    }

    #[test]
    fn test_no_context_error_display() {
        let err = LunaError::NoScriptContext;
        assert_eq!(
            err.to_string(),
            "no script context available on this thread"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = LunaError::NotFound("script".to_string());
        assert_eq!(err.to_string(), "script not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LunaError = io_err.into();
        assert!(matches!(err, LunaError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_lua_error_conversion() {
        let lua_err = mlua::Error::RuntimeError("boom".to_string());
        let err: LunaError = lua_err.into();
        assert!(matches!(err, LunaError::Lua(_)));
        assert!(err.to_string().contains("boom"));
    }
}
