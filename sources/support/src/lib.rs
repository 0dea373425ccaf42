pub mod bytes_ext;
pub mod descriptor;
pub mod encoding;
pub mod types;
