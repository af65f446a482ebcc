pub mod drive;
pub mod google;
pub mod roles;
pub mod sheets;
pub mod taxonomy;
