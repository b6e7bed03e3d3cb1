use crate::common::Endpoint;
use std::{error, fmt};

pub type Result<T> = std::result::Result<T, Error>;

type Source = Box<dyn error::Error + Send + Sync + 'static>;

pub struct Error {
    kind: ErrorKind,
    source: Option<Source>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// A `start`/`stop` was requested from a state that does not allow it.
    Lifecycle,
    /// The component is not running.
    NotRunning,
    /// `join` was called on a member that already belongs to a group.
    AlreadyJoined,
    InvalidConfig,

    Timeout,
    ConnectionRefused,
    /// The other side of a reply slot went away before completing it.
    BrokenPipe,
    Codec,

    UnexpectedRequestType,
    UnexpectedResponseType,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub(crate) fn new(kind: ErrorKind, source: Option<Source>) -> Self {
        Self { kind, source }
    }

    pub(crate) fn new_lifecycle(source: Option<Source>) -> Self {
        Self::new(ErrorKind::Lifecycle, source)
    }

    pub(crate) fn new_not_running(component: &'static str) -> Self {
        Self::new(ErrorKind::NotRunning, Some(component.into()))
    }

    pub(crate) fn new_already_joined() -> Self {
        Self::new(ErrorKind::AlreadyJoined, None)
    }

    pub(crate) fn new_invalid_config(reason: &'static str) -> Self {
        Self::new(ErrorKind::InvalidConfig, Some(reason.into()))
    }

    pub(crate) fn new_timeout() -> Self {
        Self::new(ErrorKind::Timeout, None)
    }

    pub(crate) fn new_connection_refused(target: &Endpoint) -> Self {
        Self::new(ErrorKind::ConnectionRefused, Some(target.clone().into()))
    }

    pub(crate) fn new_broken_pipe(source: Option<Source>) -> Self {
        Self::new(ErrorKind::BrokenPipe, source)
    }

    pub(crate) fn new_codec(source: Source) -> Self {
        Self::new(ErrorKind::Codec, Some(source))
    }

    pub(crate) fn new_unexpected_request(kind: &'static str) -> Self {
        Self::new(ErrorKind::UnexpectedRequestType, Some(kind.into()))
    }

    pub(crate) fn new_unexpected_response(kind: &'static str) -> Self {
        Self::new(ErrorKind::UnexpectedResponseType, Some(kind.into()))
    }
}

impl From<ErrorKind> for Error {
    fn from(t: ErrorKind) -> Self {
        Error::new(t, None)
    }
}

impl From<(ErrorKind, Source)> for Error {
    fn from(t: (ErrorKind, Source)) -> Self {
        Error::new(t.0, Some(t.1))
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut f = f.debug_tuple("Error");
        f.field(&self.kind);
        if let Some(source) = &self.source {
            f.field(source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}: {}", self.kind, source)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn error::Error + 'static))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
