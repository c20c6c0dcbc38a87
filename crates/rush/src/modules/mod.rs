//! Domain namespaces: JSON, Time, Duration, TimeZone, and the File/
//! Directory/Path value surface.
//!
//! A [`Namespace`] is a value (`JSON`, `Time`, ...) whose properties resolve
//! to builtin methods; it exists purely as dispatch glue between property
//! access and the module functions in this directory.

pub mod fs_mod;
pub mod json;
pub mod time_mod;

pub use fs_mod::FileValue;
pub use time_mod::{TimeValue, TimeZoneValue, format_duration};

use crate::{
    error::RunError,
    value::Value,
};

/// The builtin namespaces bound as globals in every program scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Namespace {
    #[strum(serialize = "JSON")]
    Json,
    Time,
    Duration,
    TimeZone,
}

impl Namespace {
    pub const ALL: [Self; 4] = [Self::Json, Self::Time, Self::Duration, Self::TimeZone];

    /// Whether `name` is a function this namespace exposes.
    #[must_use]
    pub fn has_method(self, name: &str) -> bool {
        match self {
            Self::Json => matches!(name, "parse" | "stringify"),
            Self::Time => matches!(name, "now" | "parse" | "new"),
            Self::Duration => matches!(name, "seconds" | "minutes" | "hours" | "days" | "milliseconds"),
            Self::TimeZone => matches!(name, "utc" | "local" | "new"),
        }
    }

    /// Calls `Namespace.name(args)`.
    pub fn call_method(self, name: &str, args: &[Value]) -> Result<Value, RunError> {
        match self {
            Self::Json => json::call_namespace(name, args),
            Self::Time => time_mod::call_time_namespace(name, args),
            Self::Duration => time_mod::call_duration_namespace(name, args),
            Self::TimeZone => time_mod::call_timezone_namespace(name, args),
        }
    }
}

/// Whether a domain receiver (File/Directory/Path/Time/Duration/TimeZone)
/// has a builtin method called `name`.
#[must_use]
pub fn has_domain_method(receiver: &Value, name: &str) -> bool {
    match receiver {
        Value::File(_) => fs_mod::FILE_METHODS.contains(&name),
        Value::Directory(_) => fs_mod::DIRECTORY_METHODS.contains(&name),
        Value::Path(_) => fs_mod::PATH_METHODS.contains(&name),
        Value::Time(_) => time_mod::TIME_METHODS.contains(&name),
        Value::Duration(_) => time_mod::DURATION_METHODS.contains(&name),
        Value::TimeZone(_) => time_mod::TIMEZONE_METHODS.contains(&name),
        _ => false,
    }
}

/// Dispatches a method call on a domain receiver.
pub fn call_domain_method(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, RunError> {
    match receiver {
        Value::File(file) => fs_mod::call_file_method(file, name, args),
        Value::Directory(path) => fs_mod::call_directory_method(path, name, args),
        Value::Path(path) => fs_mod::call_path_method(path, name, args),
        Value::Time(time) => time_mod::call_time_method(time, name, args),
        Value::Duration(nanos) => time_mod::call_duration_method(*nanos, name, args),
        Value::TimeZone(zone) => time_mod::call_timezone_method(zone, name, args),
        other => Err(RunError::fatal(format!(
            "undefined method {name} for {}",
            other.type_name()
        ))),
    }
}
