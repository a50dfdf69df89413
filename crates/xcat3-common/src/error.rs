//! The §7 error taxonomy and the §7a/§9 `Outcome` sum type.
//!
//! `Error` is the batch-level failure channel (propagated with `?`,
//! surfaced as an HTTP response). `Outcome` is the per-node result
//! channel used inside the conductor and dispatcher so a failed node
//! never has to be represented as a stringified exception.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Referent-missing variants, grouped since they share an HTTP mapping
/// but differ in which referent is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundKind {
    Node(String),
    Network(String),
    OsImage(String),
    Nic(String),
    Service(String),
    Passwd(String),
    File(String),
    Plugin(String),
    NoValidHost,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::Node(n) => write!(f, "Node {n} could not be found."),
            NotFoundKind::Network(n) => write!(f, "Network {n} could not be found."),
            NotFoundKind::OsImage(n) => write!(f, "OSImage {n} could not be found."),
            NotFoundKind::Nic(n) => write!(f, "Nic {n} could not be found."),
            NotFoundKind::Service(n) => write!(f, "Service {n} could not be found."),
            NotFoundKind::Passwd(n) => write!(f, "Passwd {n} could not be found."),
            NotFoundKind::File(n) => write!(f, "File {n} could not be found."),
            NotFoundKind::Plugin(n) => write!(f, "Plugin {n} could not be found."),
            NotFoundKind::NoValidHost => write!(f, "No valid host was found."),
        }
    }
}

/// Conflict variants: uniqueness violations and state conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    DuplicateName(String),
    MacAlreadyExists(String),
    NicAlreadyExists(String),
    NetworkAlreadyExists(String),
    OsImageAlreadyExists(String),
    NodeLocked(String),
    InvalidState(String),
    PowerStateFailure(String),
    DeployStateFailure(String),
    ThreadConflict(String),
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::DuplicateName(n) => write!(f, "Duplicate name {n}."),
            ConflictKind::MacAlreadyExists(m) => write!(f, "MAC {m} already exists."),
            ConflictKind::NicAlreadyExists(n) => write!(f, "Nic {n} already exists."),
            ConflictKind::NetworkAlreadyExists(n) => write!(f, "Network {n} already exists."),
            ConflictKind::OsImageAlreadyExists(n) => write!(f, "OSImage {n} already exists."),
            ConflictKind::NodeLocked(n) => write!(f, "Locked temporarily: {n}"),
            ConflictKind::InvalidState(s) => write!(f, "Invalid state: {s}"),
            ConflictKind::PowerStateFailure(s) => write!(f, "Power state failure: {s}"),
            ConflictKind::DeployStateFailure(s) => write!(f, "Deploy state failure: {s}"),
            ConflictKind::ThreadConflict(s) => write!(f, "Thread conflict: {s}"),
        }
    }
}

/// The full §7 taxonomy. One [`thiserror::Error`] enum, `Display`-able
/// and carrying a code, scaled up to ~30 variants — exactly what
/// `thiserror` removes the boilerplate for.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid parameter: {0}")]
    InvalidParameterValue(String),

    #[error("missing parameter: {0}")]
    MissingParameterValue(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid nic attribute: {0}")]
    InvalidNicAttr(String),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    #[error("{0}")]
    NotFound(NotFoundKind),

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("no free API worker")]
    NoFreeApiWorker,

    #[error("no free service worker")]
    NoFreeServiceWorker,

    #[error("service already registered: {0}")]
    ServiceAlreadyRegistered(String),

    #[error("{0}")]
    Unclassified(String),
}

impl Error {
    /// HTTP status this taxonomy row maps onto (§7).
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotAuthorized(_) => 403,
            Error::InvalidParameterValue(_)
            | Error::MissingParameterValue(_)
            | Error::InvalidName(_)
            | Error::InvalidUuid(_)
            | Error::InvalidIdentity(_)
            | Error::InvalidNicAttr(_)
            | Error::InvalidFile(_) => 400,
            Error::NotAcceptable(_) => 406,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::NoFreeApiWorker | Error::NoFreeServiceWorker => 503,
            Error::ServiceAlreadyRegistered(_) => 500,
            Error::Unclassified(_) => 500,
        }
    }

    /// `faultcode` in the `{faultstring, faultcode}` HTTP error shape.
    pub fn faultcode(&self) -> i32 {
        self.http_status() as i32
    }

    pub fn not_found(kind: NotFoundKind) -> Self {
        Error::NotFound(kind)
    }

    pub fn conflict(kind: ConflictKind) -> Self {
        Error::Conflict(kind)
    }
}

/// Per-node outcome channel (§4.5, §7a, §9 "exceptions as outcome
/// channel"). Internal code matches on this instead of parsing
/// stringified exceptions; only the HTTP serializer renders it down to
/// the external `{name: outcome}` string shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Success, carrying either a specific detail string or the
    /// `SUCCESS` sentinel.
    Ok(String),
    /// The owning future did not complete before the join deadline,
    /// carrying the deadline that elapsed (§4.5 `"Timeout after waiting
    /// N seconds"`).
    Timeout(u64),
    /// The node's cluster-wide reservation is held by another tag.
    Locked,
    /// The node (or a referent the operation needed) does not exist.
    NotFound,
    /// Any other per-node failure, with an optional numeric code.
    Error { message: String, code: Option<i32> },
}

pub const SUCCESS: &str = "SUCCESS";

impl Outcome {
    pub fn success() -> Self {
        Outcome::Ok(SUCCESS.to_string())
    }

    pub fn detail(msg: impl Into<String>) -> Self {
        Outcome::Ok(msg.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Outcome::Error {
            message: msg.into(),
            code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Render to the single string the external `{name: outcome}` map
    /// carries over HTTP (§6, §8 invariant 7).
    pub fn as_wire_string(&self) -> String {
        match self {
            Outcome::Ok(detail) => detail.clone(),
            Outcome::Timeout(secs) => format!("Timeout after waiting {secs} seconds"),
            Outcome::Locked => "Locked temporarily".to_string(),
            Outcome::NotFound => "Could not be found.".to_string(),
            Outcome::Error { message, .. } => message.clone(),
        }
    }

    pub fn timeout_after(seconds: u64) -> Self {
        Outcome::Timeout(seconds)
    }
}

impl From<Error> for Outcome {
    fn from(err: Error) -> Self {
        match err {
            Error::Conflict(ConflictKind::NodeLocked(_)) => Outcome::Locked,
            Error::NotFound(_) => Outcome::NotFound,
            other => Outcome::Error {
                code: Some(other.faultcode()),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(Error::NotAuthorized("x".into()).http_status(), 403);
        assert_eq!(Error::InvalidParameterValue("x".into()).http_status(), 400);
        assert_eq!(Error::NotAcceptable("x".into()).http_status(), 406);
        assert_eq!(
            Error::NotFound(NotFoundKind::NoValidHost).http_status(),
            404
        );
        assert_eq!(
            Error::Conflict(ConflictKind::NodeLocked("n1".into())).http_status(),
            409
        );
        assert_eq!(Error::NoFreeServiceWorker.http_status(), 503);
        assert_eq!(Error::ServiceAlreadyRegistered("x".into()).http_status(), 500);
    }

    #[test]
    fn node_locked_converts_to_locked_outcome() {
        let err = Error::Conflict(ConflictKind::NodeLocked("n1".into()));
        assert_eq!(Outcome::from(err), Outcome::Locked);
    }

    #[test]
    fn success_outcome_wire_string_is_success_sentinel() {
        assert_eq!(Outcome::success().as_wire_string(), SUCCESS);
    }
}
