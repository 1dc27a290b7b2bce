pub mod member_repository;
pub mod space_repository;
