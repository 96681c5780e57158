//! Keyed persistence collaborators.
//!
//! The supervisor does not depend on this module; compute steps and other
//! hosted services do. Every write goes through an explicit [`DbSession`]
//! owned by the caller and only becomes visible on [`DbSession::commit`].
//!
//! ## Module Structure
//!
//! - [`dao`]: `Dto` and `Dao` traits
//! - [`session`]: Session staging writes until commit
//! - [`memory`]: DashMap-backed DAO

pub mod dao;
pub mod memory;
pub mod session;

pub use dao::{Dao, Dto};
pub use memory::MemoryDao;
pub use session::DbSession;
