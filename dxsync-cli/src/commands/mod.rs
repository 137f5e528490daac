pub mod manifest;
pub mod status;
