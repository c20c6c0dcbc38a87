//! File, Directory and Path values: thin adapters over host filesystem
//! facilities.
//!
//! Construction happens through the `file(path)`, `directory(path)` and
//! `path(p)` builtins, which reject any path containing `..` before a value
//! exists. Files are text-only; the handle is exclusively owned by the File
//! value and released on `close()` or when the value is dropped.

use std::{
    cell::RefCell,
    fs,
    io::Write as _,
    rc::Rc,
};

use crate::{
    error::{RunError, RunResult},
    value::Value,
};

pub const FILE_METHODS: &[&str] = &["open", "read", "write", "close", "delete", "exists?", "size"];
pub const DIRECTORY_METHODS: &[&str] = &["list", "exists?", "create", "delete"];
pub const PATH_METHODS: &[&str] = &["join", "basename", "dirname", "clean", "absolute"];

/// How a file handle was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    Read,
    Write,
    Append,
}

/// A file value: its path plus an optional live handle.
#[derive(Debug)]
pub struct FileValue {
    pub path: String,
    handle: RefCell<Option<(fs::File, FileMode)>>,
}

impl FileValue {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            handle: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.borrow().is_some()
    }

    fn not_open(&self) -> RunError {
        RunError::runtime_error(format!("file is not open: {}", self.path))
    }
}

/// Rejects any path containing a `..` component. This is the only sandboxing
/// the language promises.
pub fn check_path(path: &str) -> RunResult<()> {
    let traverses = path.split(['/', '\\']).any(|segment| segment == "..");
    if traverses {
        Err(RunError::fatal("invalid file path: path traversal not allowed"))
    } else {
        Ok(())
    }
}

fn expect_arity(args: &[Value], want: usize) -> RunResult<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(RunError::wrong_arity(want, args.len()))
    }
}

fn str_arg<'a>(args: &'a [Value], index: usize, message: &str) -> RunResult<&'a str> {
    match &args[index] {
        Value::Str(s) => Ok(s),
        _ => Err(RunError::type_error(message.to_string())),
    }
}

pub fn call_file_method(file: &Rc<FileValue>, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "open" => {
            expect_arity(args, 1)?;
            let mode_str = str_arg(args, 0, "file mode argument must be STRING")?;
            let mode = match mode_str {
                "r" => FileMode::Read,
                "w" => FileMode::Write,
                "a" => FileMode::Append,
                other => {
                    return Err(RunError::validation_error(format!("invalid file mode: {other}")));
                }
            };
            let handle = match mode {
                FileMode::Read => fs::File::open(&file.path).map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        RunError::validation_error(format!("file does not exist: {}", file.path))
                    } else {
                        RunError::runtime_error(format!("could not open file {}: {err}", file.path))
                    }
                })?,
                FileMode::Write => fs::File::create(&file.path)
                    .map_err(|err| RunError::runtime_error(format!("could not open file {}: {err}", file.path)))?,
                FileMode::Append => fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file.path)
                    .map_err(|err| RunError::runtime_error(format!("could not open file {}: {err}", file.path)))?,
            };
            *file.handle.borrow_mut() = Some((handle, mode));
            Ok(Value::File(Rc::clone(file)))
        }
        "read" => {
            expect_arity(args, 0)?;
            if !file.is_open() {
                return Err(file.not_open());
            }
            let content = fs::read_to_string(&file.path)
                .map_err(|err| RunError::runtime_error(format!("could not read file {}: {err}", file.path)))?;
            Ok(Value::string(content))
        }
        "write" => {
            expect_arity(args, 1)?;
            let content = str_arg(args, 0, "file content argument must be STRING")?;
            let mut handle = file.handle.borrow_mut();
            let Some((writer, mode)) = handle.as_mut() else {
                return Err(file.not_open());
            };
            if *mode == FileMode::Read {
                return Err(RunError::runtime_error(format!(
                    "file is not open for writing: {}",
                    file.path
                )));
            }
            writer
                .write_all(content.as_bytes())
                .map_err(|err| RunError::runtime_error(format!("could not write file {}: {err}", file.path)))?;
            Ok(Value::Integer(content.len() as i64))
        }
        "close" => {
            expect_arity(args, 0)?;
            // Idempotent: closing a closed file is a no-op.
            *file.handle.borrow_mut() = None;
            Ok(Value::Null)
        }
        "delete" => {
            expect_arity(args, 0)?;
            *file.handle.borrow_mut() = None;
            fs::remove_file(&file.path).map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    RunError::validation_error(format!("file does not exist: {}", file.path))
                } else {
                    RunError::runtime_error(format!("could not delete file {}: {err}", file.path))
                }
            })?;
            Ok(Value::Null)
        }
        "exists?" => {
            expect_arity(args, 0)?;
            Ok(Value::Boolean(fs::metadata(&file.path).map(|m| m.is_file()).unwrap_or(false)))
        }
        "size" => {
            expect_arity(args, 0)?;
            let metadata = fs::metadata(&file.path)
                .map_err(|_| RunError::validation_error(format!("file does not exist: {}", file.path)))?;
            Ok(Value::Integer(metadata.len() as i64))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for FILE"))),
    }
}

pub fn call_directory_method(path: &Rc<str>, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "list" => {
            expect_arity(args, 0)?;
            let entries = fs::read_dir(&**path)
                .map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        RunError::validation_error(format!("directory does not exist: {path}"))
                    } else {
                        RunError::runtime_error(format!("could not list directory {path}: {err}"))
                    }
                })?
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            let mut names = entries;
            names.sort();
            Ok(Value::array(names.into_iter().map(Value::string).collect()))
        }
        "exists?" => {
            expect_arity(args, 0)?;
            Ok(Value::Boolean(fs::metadata(&**path).map(|m| m.is_dir()).unwrap_or(false)))
        }
        "create" => {
            expect_arity(args, 0)?;
            fs::create_dir_all(&**path)
                .map_err(|err| RunError::runtime_error(format!("could not create directory {path}: {err}")))?;
            Ok(Value::Null)
        }
        "delete" => {
            expect_arity(args, 0)?;
            fs::remove_dir(&**path).map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    RunError::validation_error(format!("directory does not exist: {path}"))
                } else {
                    RunError::runtime_error(format!("could not delete directory {path}: {err}"))
                }
            })?;
            Ok(Value::Null)
        }
        other => Err(RunError::fatal(format!("undefined method {other} for DIRECTORY"))),
    }
}

pub fn call_path_method(path: &Rc<str>, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "join" => {
            expect_arity(args, 1)?;
            let other = str_arg(args, 0, "join argument must be STRING")?;
            check_path(other)?;
            let joined = if path.is_empty() {
                other.to_string()
            } else {
                format!("{}/{}", path.trim_end_matches('/'), other)
            };
            Ok(Value::Path(Rc::from(clean_path(&joined))))
        }
        "basename" => {
            expect_arity(args, 0)?;
            let cleaned = clean_path(path);
            let base = cleaned.rsplit('/').next().unwrap_or("");
            Ok(Value::string(base))
        }
        "dirname" => {
            expect_arity(args, 0)?;
            let cleaned = clean_path(path);
            let dir = match cleaned.rfind('/') {
                Some(0) => "/",
                Some(idx) => &cleaned[..idx],
                None => ".",
            };
            Ok(Value::string(dir))
        }
        "clean" => {
            expect_arity(args, 0)?;
            Ok(Value::Path(Rc::from(clean_path(path))))
        }
        "absolute" => {
            expect_arity(args, 0)?;
            if path.starts_with('/') {
                return Ok(Value::Path(Rc::from(clean_path(path))));
            }
            let cwd = std::env::current_dir()
                .map_err(|err| RunError::runtime_error(format!("could not resolve working directory: {err}")))?;
            let joined = format!("{}/{}", cwd.to_string_lossy(), path);
            Ok(Value::Path(Rc::from(clean_path(&joined))))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for PATH"))),
    }
}

/// Lexical path cleanup: collapses `//` and `.` segments. `..` never appears
/// in a live Path value (rejected at construction).
fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = vec![];
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_traversal_is_rejected() {
        assert!(check_path("data/../etc/passwd").is_err());
        assert!(check_path("..").is_err());
        assert!(check_path("data/notes.txt").is_ok());
        // A filename merely containing dots is fine.
        assert!(check_path("archive..txt").is_ok());
    }

    #[test]
    fn clean_collapses_segments() {
        assert_eq!(clean_path("a//b/./c"), "a/b/c");
        assert_eq!(clean_path("/a/b/"), "/a/b");
        assert_eq!(clean_path("."), ".");
    }

    #[test]
    fn path_methods_are_lexical() {
        let path: Rc<str> = Rc::from("a/b/c.txt");
        let dir = call_path_method(&path, "dirname", &[]).unwrap();
        assert_eq!(dir.inspect(), "a/b");
        let base = call_path_method(&path, "basename", &[]).unwrap();
        assert_eq!(base.inspect(), "c.txt");
        let joined = call_path_method(&path, "join", &[Value::string("d")]).unwrap();
        assert_eq!(joined.inspect(), "#<Path:a/b/c.txt/d>");
    }

    #[test]
    fn unknown_file_mode_is_validation_error() {
        let file = Rc::new(FileValue::new("/tmp/rush-mode-test.txt"));
        let err = call_file_method(&file, "open", &[Value::string("x")]).unwrap_err();
        match err {
            RunError::Exc(e) => {
                assert_eq!(e.message, "invalid file mode: x");
            }
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn closed_file_operations_error() {
        let file = Rc::new(FileValue::new("/tmp/rush-closed-test.txt"));
        let err = call_file_method(&file, "read", &[]).unwrap_err();
        match err {
            RunError::Exc(e) => assert_eq!(e.message, "file is not open: /tmp/rush-closed-test.txt"),
            other => panic!("expected exception, got {other:?}"),
        }
    }
}
