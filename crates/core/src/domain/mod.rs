pub mod catalog;
pub mod dialog;
pub mod order;
pub mod session;
