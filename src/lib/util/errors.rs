//! The error taxonomy of §7: each variant is either recovered locally by its
//! caller or surfaced all the way up to the CLI layer.

use failure::{Context, Fail};
use std::fmt;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "manifest not found at {}", _0)]
    MissingManifest(String),

    #[fail(display = "malformed manifest JSON: {}", _0)]
    InvalidManifest(String),

    #[fail(display = "manifest is missing a required field: {}", _0)]
    MissingManifestField(&'static str),

    #[fail(display = "invalid package slug: {}", _0)]
    InvalidSlug(String),

    #[fail(display = "could not fetch manifest for {} after retrying", _0)]
    ManifestFetchFailed(String),

    #[fail(display = "download of {} failed", _0)]
    DownloadFailed(String),

    #[fail(display = "unknown registry/repository host: {}", _0)]
    UnknownHost(String),

    #[fail(display = "no secret configured for {}", _0)]
    MissingSecret(String),

    #[fail(display = "package {} was not found in any configured registry", _0)]
    PackageNotFound(String),

    #[fail(display = "hook `{}` exited with non-zero status", _0)]
    HookFailed(String),

    #[fail(display = "cache I/O error: {}", _0)]
    CacheIo(String),

    #[fail(display = "I/O error: {}", _0)]
    Io(String),

    #[fail(display = "HTTP error: {}", _0)]
    Http(String),
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&failure::Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        ErrorKind::Io(e.to_string()).into()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        ErrorKind::Http(e.to_string()).into()
    }
}

pub type Res<T> = Result<T, Error>;
