pub mod layout_validator;
pub mod roster_validator;

pub use layout_validator::{DetectedLayout, LayoutValidator, ManifestKind};
pub use roster_validator::RosterValidator;
