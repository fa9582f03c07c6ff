pub mod access;
pub mod assignments;
pub mod health;
pub mod rbac;
