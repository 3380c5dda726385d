pub mod activity;
pub mod auth;
pub mod budgets;
pub mod health;
pub mod permissions;
pub mod projects;
pub mod roles;
pub mod tasks;
pub mod users;
