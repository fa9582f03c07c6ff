pub mod directory;
pub mod rbac;
pub mod work;
