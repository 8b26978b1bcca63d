pub mod deploy;
pub mod repository;
pub mod subscription;
pub mod tag;
