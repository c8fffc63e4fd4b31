use crate::element::ElementType;
use crate::provision::Capability;
use crate::transport::TransportError;

/// Server error code for a call to an MRPC that is not registered
pub const RPC_NOT_REGISTERED: &str = "INVLDRPC";

/// Errors from element operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host answered a `0` status to INITOBJ, CHECKOBJ or SAVEOBJ
    #[error("{0}")]
    Validation(String),

    #[error("cannot compile {name}: unsupported element kind {kind:?}")]
    UnsupportedElement { kind: ElementType, name: String },

    /// Optional MRPC is disabled on the host; see [`crate::provision`]
    #[error("MRPC {rpc_id} is not registered on the host")]
    NotRegistered { rpc_id: String },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("{} needs to be enabled on the host, provisioning was not confirmed", .0.name())]
    ProvisioningDeclined(Capability),

    /// The helper procedure was saved but did not compile; nothing was registered
    #[error("helper procedure {helper} failed to compile:\n{output}")]
    HelperCompile { helper: String, output: String },

    #[error(transparent)]
    Transport(TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map a transport failure, singling out the not-registered code
    pub(crate) fn from_call(rpc_id: &str, err: TransportError) -> Self {
        match err {
            TransportError::Server { ref code, .. } if code == RPC_NOT_REGISTERED => {
                Error::NotRegistered {
                    rpc_id: rpc_id.to_string(),
                }
            }
            other => Error::Transport(other),
        }
    }

    pub fn is_not_registered(&self) -> bool {
        matches!(self, Error::NotRegistered { .. })
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
