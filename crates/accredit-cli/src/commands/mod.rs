pub mod attainment;
pub mod compare;
pub mod init;
pub mod results;
pub mod scale;
pub mod validate;
