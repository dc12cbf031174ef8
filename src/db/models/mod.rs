//! Database models split into separate files.
//! This module re-exports individual model modules so imports like
//! `use crate::db::models::*;` keep working.

pub mod coordination;
pub mod event;
pub mod owner;
pub mod todo;

pub use self::coordination::*;
pub use self::event::*;
pub use self::owner::*;
pub use self::todo::*;
