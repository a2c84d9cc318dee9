pub mod dir_exist;
pub mod url;
