//! Build errors, diagnostic codes, and warning helpers.
//!
//! Error codes `E101`–`E133` cover structural problems found while modules
//! are constructed or while the generated graph is validated. `B201`–`B202`
//! are backend capability rejections, `P301`–`P305` pipeline sequencing and
//! output-location failures. Warnings `W101`–`W102` do not stop the build.

use crate::system::Stage;
use std::path::PathBuf;
use thiserror::Error;
use weft_common::InternalError;
use weft_diagnostics::{Category, Diagnostic, DiagnosticCode};

/// Unknown module referenced by name.
pub const E101: DiagnosticCode = DiagnosticCode::new(Category::Error, 101);
/// Module or service declared twice in one library.
pub const E102: DiagnosticCode = DiagnosticCode::new(Category::Error, 102);
/// A module instantiates itself, directly or through its children.
pub const E103: DiagnosticCode = DiagnosticCode::new(Category::Error, 103);
/// Unknown port name.
pub const E104: DiagnosticCode = DiagnosticCode::new(Category::Error, 104);
/// Port left unconnected or connected twice.
pub const E105: DiagnosticCode = DiagnosticCode::new(Category::Error, 105);
/// Port connected to a value of the wrong type.
pub const E106: DiagnosticCode = DiagnosticCode::new(Category::Error, 106);
/// AppID used twice in one scope.
pub const E107: DiagnosticCode = DiagnosticCode::new(Category::Error, 107);
/// Malformed AppID.
pub const E108: DiagnosticCode = DiagnosticCode::new(Category::Error, 108);
/// A bundle role was not supplied.
pub const E110: DiagnosticCode = DiagnosticCode::new(Category::Error, 110);
/// A supplied role is not part of the bundle, or flows the other way.
pub const E111: DiagnosticCode = DiagnosticCode::new(Category::Error, 111);
/// A role was supplied twice.
pub const E112: DiagnosticCode = DiagnosticCode::new(Category::Error, 112);
/// A channel's payload does not match its role, or a bundle does not match
/// the operation.
pub const E113: DiagnosticCode = DiagnosticCode::new(Category::Error, 113);
/// A channel was given a second consumer.
pub const E114: DiagnosticCode = DiagnosticCode::new(Category::Error, 114);
/// A bundle end was bound twice.
pub const E115: DiagnosticCode = DiagnosticCode::new(Category::Error, 115);
/// A bundle was left without a client or server.
pub const E116: DiagnosticCode = DiagnosticCode::new(Category::Error, 116);
/// A handle was used in a module that did not create it.
pub const E117: DiagnosticCode = DiagnosticCode::new(Category::Error, 117);
/// A constant does not fit its type.
pub const E118: DiagnosticCode = DiagnosticCode::new(Category::Error, 118);
/// A value has the wrong type for where it is used.
pub const E119: DiagnosticCode = DiagnosticCode::new(Category::Error, 119);
/// Struct field unknown, missing, or given twice.
pub const E120: DiagnosticCode = DiagnosticCode::new(Category::Error, 120);
/// Unknown service.
pub const E130: DiagnosticCode = DiagnosticCode::new(Category::Error, 130);
/// Unknown service operation.
pub const E131: DiagnosticCode = DiagnosticCode::new(Category::Error, 131);
/// No builtin instance serves a service instance.
pub const E132: DiagnosticCode = DiagnosticCode::new(Category::Error, 132);
/// A service was used in a way its provider cannot support.
pub const E133: DiagnosticCode = DiagnosticCode::new(Category::Error, 133);

/// Host channels requested on a backend without host-channel support.
pub const B201: DiagnosticCode = DiagnosticCode::new(Category::Backend, 201);
/// Builtin implementation tag the backend cannot realize.
pub const B202: DiagnosticCode = DiagnosticCode::new(Category::Backend, 202);

/// Stage invoked out of order.
pub const P301: DiagnosticCode = DiagnosticCode::new(Category::Pipeline, 301);
/// Output location owned by another system.
pub const P302: DiagnosticCode = DiagnosticCode::new(Category::Pipeline, 302);
/// Filesystem failure while locking or packaging.
pub const P303: DiagnosticCode = DiagnosticCode::new(Category::Pipeline, 303);
/// Stage invoked after an earlier failure.
pub const P304: DiagnosticCode = DiagnosticCode::new(Category::Pipeline, 304);
/// Broken framework invariant.
pub const P305: DiagnosticCode = DiagnosticCode::new(Category::Pipeline, 305);

/// A channel nobody consumes; its ready is tied high.
pub const W101: DiagnosticCode = DiagnosticCode::new(Category::Warning, 101);
/// A builtin instance no service instance resolves to.
pub const W102: DiagnosticCode = DiagnosticCode::new(Category::Warning, 102);

/// The broad class of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed design: bad roles, AppID collisions, unknown names.
    Structural,
    /// The chosen backend cannot realize a construct.
    Capability,
    /// Pipeline stages invoked out of order or after a failure.
    Sequencing,
    /// Lock or packaging I/O failure.
    Io,
    /// Broken framework invariant.
    Internal,
}

/// Errors raised while constructing, generating, compiling, or packaging a
/// system. None of them are retried.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Instantiation of a module the library does not declare.
    #[error("unknown module '{name}'")]
    UnknownModule {
        /// The requested module name.
        name: String,
    },

    /// A module or service name declared twice.
    #[error("{what} '{name}' is declared twice")]
    Duplicate {
        /// `"module"` or `"service"`.
        what: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// A module instantiates itself.
    #[error("recursive instantiation: {}", cycle.join(" -> "))]
    RecursiveInstantiation {
        /// Module names from the first occurrence back to itself.
        cycle: Vec<String>,
    },

    /// A port name that the module does not declare.
    #[error("module '{module}' has no port '{port}'")]
    UnknownPort {
        /// The module looked up.
        module: String,
        /// The port name.
        port: String,
    },

    /// A port left unconnected or connected twice at an instantiation.
    #[error("port '{port}' of '{child}' is {problem}")]
    PortConnection {
        /// The instantiating module.
        module: String,
        /// The instantiated module.
        child: String,
        /// The port name.
        port: String,
        /// `"not connected"` or `"connected twice"`.
        problem: &'static str,
    },

    /// A port connected to a value of the wrong type.
    #[error("port '{port}' of '{child}' expects {expected}, found {found}")]
    PortTypeMismatch {
        /// The instantiating module.
        module: String,
        /// The instantiated module.
        child: String,
        /// The port name.
        port: String,
        /// The declared port type.
        expected: String,
        /// The connected value's type.
        found: String,
    },

    /// An AppID used twice in the same scope.
    #[error("AppID '{appid}' is already used in this scope")]
    DuplicateAppId {
        /// The module whose scope collides.
        module: String,
        /// The colliding AppID.
        appid: String,
    },

    /// An AppID that is empty or contains path syntax.
    #[error("AppID '{appid}' is malformed")]
    InvalidAppId {
        /// The module declaring it.
        module: String,
        /// The offending AppID.
        appid: String,
    },

    /// A role required by the bundle type was not supplied.
    #[error("bundle role '{role}' was not supplied")]
    MissingRole {
        /// The module packing or unpacking.
        module: String,
        /// The missing role.
        role: String,
    },

    /// A supplied role the bundle type does not accept here.
    #[error("unexpected bundle role '{role}': {reason}")]
    UnexpectedRole {
        /// The module packing or unpacking.
        module: String,
        /// The supplied role.
        role: String,
        /// Why it is rejected.
        reason: String,
    },

    /// A role supplied twice.
    #[error("bundle role '{role}' was supplied twice")]
    DuplicateRole {
        /// The module packing or unpacking.
        module: String,
        /// The duplicated role.
        role: String,
    },

    /// A channel or bundle whose type does not match its declaration.
    #[error("{what} expects {expected}, found {found}")]
    RoleTypeMismatch {
        /// The module packing, unpacking, or calling.
        module: String,
        /// What was being matched, e.g. `role 'address'`.
        what: String,
        /// The declared type.
        expected: String,
        /// The supplied type.
        found: String,
    },

    /// A channel given a second consumer.
    #[error("channel is already consumed")]
    ChannelRebound {
        /// The module that tried to rebind.
        module: String,
    },

    /// A bundle end bound twice.
    #[error("bundle already has a {end}")]
    BundleRebound {
        /// The module that tried to rebind.
        module: String,
        /// `"client"` or `"server"`.
        end: &'static str,
    },

    /// A bundle left without a client or server.
    #[error("bundle has no {end}")]
    UnservicedBundle {
        /// The module owning the bundle.
        module: String,
        /// `"client"` or `"server"`.
        end: &'static str,
    },

    /// A handle used in a module that did not create it.
    #[error("{what} handle belongs to another module")]
    ForeignHandle {
        /// The module the handle was used in.
        module: String,
        /// `"channel"` or `"bundle"`.
        what: &'static str,
    },

    /// A constant that does not fit its type.
    #[error("constant {value} does not fit in {ty}")]
    ConstantOutOfRange {
        /// The module declaring it.
        module: String,
        /// The constant.
        value: u64,
        /// The requested type.
        ty: String,
    },

    /// A value used where another type is required.
    #[error("{context} expects {expected}, found {found}")]
    TypeMismatch {
        /// The module using the value.
        module: String,
        /// Where the value was used.
        context: String,
        /// The required type.
        expected: String,
        /// The value's type.
        found: String,
    },

    /// A struct field that is unknown, missing, or given twice.
    #[error("field '{field}' of {ty} is {problem}")]
    FieldMismatch {
        /// The module building or reading the struct.
        module: String,
        /// The struct type.
        ty: String,
        /// The field name.
        field: String,
        /// `"unknown"`, `"missing"` or `"given twice"`.
        problem: &'static str,
    },

    /// A service the library does not declare.
    #[error("unknown service '{name}'")]
    UnknownService {
        /// The service name.
        name: String,
    },

    /// An operation the service does not declare.
    #[error("service '{service}' has no operation '{operation}'")]
    UnknownOperation {
        /// The service name.
        service: String,
        /// The operation name.
        operation: String,
    },

    /// A service instance with no builtin instance above it.
    #[error("no builtin instance of '{service}' encloses '{path}'")]
    UnresolvedService {
        /// The AppID path of the service instance.
        path: String,
        /// The service name.
        service: String,
    },

    /// A service used in a way its provider does not support.
    #[error("service '{service}' cannot be used this way: {reason}")]
    InvalidServiceUse {
        /// The module using the service.
        module: String,
        /// The service name.
        service: String,
        /// What was wrong.
        reason: String,
    },

    /// Host channel requested on a backend without host-channel support.
    #[error("backend '{backend}' does not support host channels (service '{service}')")]
    HostChannelsUnsupported {
        /// The backend preset.
        backend: String,
        /// Where the host channel was requested.
        scope: String,
        /// The host service.
        service: String,
    },

    /// Builtin tag the backend cannot realize.
    #[error("backend '{backend}' cannot realize builtin '{tag}'")]
    UnsupportedBuiltin {
        /// The backend preset.
        backend: String,
        /// Where the builtin was instantiated.
        scope: String,
        /// The implementation tag.
        tag: String,
    },

    /// A stage invoked before the one it depends on.
    #[error("cannot {operation}: system is {stage}, expected {expected}")]
    OutOfSequence {
        /// The stage operation invoked.
        operation: &'static str,
        /// The current stage.
        stage: Stage,
        /// The stage the operation requires.
        expected: Stage,
    },

    /// A stage invoked after an earlier failure.
    #[error("cannot {operation}: an earlier stage failed")]
    PreviouslyFailed {
        /// The stage operation invoked.
        operation: &'static str,
    },

    /// Output location owned by another system.
    #[error("output directory {} is in use by another build", path.display())]
    OutputLocked {
        /// The lock file found.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Broken framework invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl BuildError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the broad class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::HostChannelsUnsupported { .. } | BuildError::UnsupportedBuiltin { .. } => {
                ErrorKind::Capability
            }
            BuildError::OutOfSequence { .. } | BuildError::PreviouslyFailed { .. } => {
                ErrorKind::Sequencing
            }
            BuildError::OutputLocked { .. } | BuildError::Io { .. } => ErrorKind::Io,
            BuildError::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Structural,
        }
    }

    /// Returns the stable diagnostic code for this error.
    pub fn code(&self) -> DiagnosticCode {
        match self {
            BuildError::UnknownModule { .. } => E101,
            BuildError::Duplicate { .. } => E102,
            BuildError::RecursiveInstantiation { .. } => E103,
            BuildError::UnknownPort { .. } => E104,
            BuildError::PortConnection { .. } => E105,
            BuildError::PortTypeMismatch { .. } => E106,
            BuildError::DuplicateAppId { .. } => E107,
            BuildError::InvalidAppId { .. } => E108,
            BuildError::MissingRole { .. } => E110,
            BuildError::UnexpectedRole { .. } => E111,
            BuildError::DuplicateRole { .. } => E112,
            BuildError::RoleTypeMismatch { .. } => E113,
            BuildError::ChannelRebound { .. } => E114,
            BuildError::BundleRebound { .. } => E115,
            BuildError::UnservicedBundle { .. } => E116,
            BuildError::ForeignHandle { .. } => E117,
            BuildError::ConstantOutOfRange { .. } => E118,
            BuildError::TypeMismatch { .. } => E119,
            BuildError::FieldMismatch { .. } => E120,
            BuildError::UnknownService { .. } => E130,
            BuildError::UnknownOperation { .. } => E131,
            BuildError::UnresolvedService { .. } => E132,
            BuildError::InvalidServiceUse { .. } => E133,
            BuildError::HostChannelsUnsupported { .. } => B201,
            BuildError::UnsupportedBuiltin { .. } => B202,
            BuildError::OutOfSequence { .. } => P301,
            BuildError::OutputLocked { .. } => P302,
            BuildError::Io { .. } => P303,
            BuildError::PreviouslyFailed { .. } => P304,
            BuildError::Internal(_) => P305,
        }
    }

    /// Returns the module or instance path the error was found in, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            BuildError::PortConnection { module, .. }
            | BuildError::PortTypeMismatch { module, .. }
            | BuildError::DuplicateAppId { module, .. }
            | BuildError::InvalidAppId { module, .. }
            | BuildError::MissingRole { module, .. }
            | BuildError::UnexpectedRole { module, .. }
            | BuildError::DuplicateRole { module, .. }
            | BuildError::RoleTypeMismatch { module, .. }
            | BuildError::ChannelRebound { module }
            | BuildError::BundleRebound { module, .. }
            | BuildError::UnservicedBundle { module, .. }
            | BuildError::ForeignHandle { module, .. }
            | BuildError::ConstantOutOfRange { module, .. }
            | BuildError::TypeMismatch { module, .. }
            | BuildError::FieldMismatch { module, .. }
            | BuildError::InvalidServiceUse { module, .. }
            | BuildError::UnknownPort { module, .. } => Some(module),
            BuildError::UnresolvedService { path, .. } => Some(path),
            BuildError::HostChannelsUnsupported { scope, .. }
            | BuildError::UnsupportedBuiltin { scope, .. } => Some(scope),
            _ => None,
        }
    }

    /// Converts the error into a diagnostic for the system's sink.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.code(), self.to_string());
        if let Some(scope) = self.scope() {
            diag = diag.in_scope(scope);
        }
        match self {
            BuildError::HostChannelsUnsupported { .. } => diag.with_help(
                "check ModuleBuilder::capabilities().host_channels before requesting host services",
            ),
            BuildError::ChannelRebound { .. } => {
                diag.with_note("a channel is unwrapped or packed exactly once")
            }
            BuildError::OutOfSequence { .. } => {
                diag.with_help("stages run in order: generate, compile, package")
            }
            BuildError::OutputLocked { path } => diag.with_help(format!(
                "remove {} if no other build is running",
                path.display()
            )),
            _ => diag,
        }
    }
}

/// Creates a `W101` warning for a channel nobody consumes.
pub fn warning_dangling_channel(module: &str, payload: &str) -> Diagnostic {
    Diagnostic::warning(W101, format!("channel of {payload} is never consumed"))
        .in_scope(module)
        .with_note("its ready signal is tied high, so every transfer is accepted and dropped")
}

/// Creates a `W102` warning for a builtin no service instance uses.
pub fn warning_idle_builtin(path: &str, tag: &str) -> Diagnostic {
    Diagnostic::warning(W102, format!("builtin '{tag}' has no clients")).in_scope(path)
}
