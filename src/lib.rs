use thiserror::Error;

use webhooks::controllerregistration::RegistrationError;
use webhooks::shoot::mutators::kubernetes_version::VersionError;
use webhooks::shoot::mutators::machine_image::MachineImageError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("failed to serialize patch: {0}")]
    PatchError(#[from] kube::core::admission::SerializePatchError),

    #[error("not yet ready to handle request")]
    NotReady,

    #[error("admission request for {operation} carries no object")]
    MissingObject { operation: String },

    #[error("shoot has no cloud profile reference")]
    MissingCloudProfileName,

    #[error("cloudprofile.core.gardener.cloud {0:?} not found")]
    CloudProfileNotFound(String),

    #[error("seed.core.gardener.cloud {0:?} not found")]
    SeedNotFound(String),

    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error(transparent)]
    InvalidMachineImage(#[from] MachineImageError),

    #[error(transparent)]
    InvalidRegistration(#[from] RegistrationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How a rejected admission request is reported to the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    BadRequest,
    Invalid,
    Internal,
    Forbidden,
}

impl Category {
    pub fn code(self) -> u16 {
        match self {
            Category::BadRequest => 400,
            Category::Invalid => 422,
            Category::Internal => 500,
            Category::Forbidden => 403,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Category::BadRequest => "BadRequest",
            Category::Invalid => "Invalid",
            Category::Internal => "InternalError",
            Category::Forbidden => "Forbidden",
        }
    }
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Error::SerializationError(_)
            | Error::MissingObject { .. }
            | Error::MissingCloudProfileName => Category::BadRequest,
            Error::KubeError(_)
            | Error::PatchError(_)
            | Error::CloudProfileNotFound(_)
            | Error::SeedNotFound(_) => Category::Internal,
            Error::InvalidRegistration(RegistrationError::PrimaryImmutable { .. }) => {
                Category::Invalid
            }
            Error::NotReady
            | Error::InvalidVersion(_)
            | Error::InvalidMachineImage(_)
            | Error::InvalidRegistration(_) => Category::Forbidden,
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationError",
            Error::KubeError(_) => "KubeError",
            Error::PatchError(_) => "PatchError",
            Error::NotReady => "NotReady",
            Error::MissingObject { .. } => "MissingObject",
            Error::MissingCloudProfileName => "MissingCloudProfileName",
            Error::CloudProfileNotFound(_) => "CloudProfileNotFound",
            Error::SeedNotFound(_) => "SeedNotFound",
            Error::InvalidVersion(_) => "InvalidVersion",
            Error::InvalidMachineImage(_) => "InvalidMachineImage",
            Error::InvalidRegistration(_) => "InvalidRegistration",
        }
    }
}

/// Injected read caches for CloudProfiles, Seeds and ControllerRegistrations
pub mod catalog;

/// Admission webhooks
pub mod webhooks;

pub use webhooks::State;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;

pub use metrics::Metrics;

/// Shoot, CloudProfile, Seed and ControllerRegistration resources
pub mod resources;
