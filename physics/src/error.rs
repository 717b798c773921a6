//! Error type for contract violations detected by the engine.
//!
//! Ordinary physics states never produce errors; these are returned only
//! when a caller hands the engine something it cannot work with.

use thiserror::Error;

use crate::collision::SkinHandle;
use crate::dynamics::{BodyHandle, ConstraintHandle, ControllerHandle};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum PhysicsError {
    /// `MaterialId::UserDefined` passed where a concrete material is required.
    #[error("material id `UserDefined` is reserved; pass explicit material properties instead")]
    ReservedMaterialId,

    #[error("unknown body handle {0:?}")]
    UnknownBody(BodyHandle),

    #[error("unknown collision skin handle {0:?}")]
    UnknownSkin(SkinHandle),

    #[error("unknown constraint handle {0:?}")]
    UnknownConstraint(ConstraintHandle),

    #[error("unknown controller handle {0:?}")]
    UnknownController(ControllerHandle),

    /// The skin is already owned by a different body.
    #[error("collision skin {skin:?} already belongs to body {owner:?}")]
    SkinAlreadyOwned { skin: SkinHandle, owner: BodyHandle },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: &'static str },
}

pub type Result<T> = std::result::Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_descriptive() {
        let e = PhysicsError::InvalidConfiguration {
            reason: "grid cell size must be positive",
        };
        assert_eq!(
            e.to_string(),
            "invalid configuration: grid cell size must be positive"
        );
        assert!(
            PhysicsError::ReservedMaterialId
                .to_string()
                .contains("UserDefined")
        );
    }
}
