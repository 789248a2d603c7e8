pub mod status;
pub mod verify;
