pub mod dispatcher;
pub mod mappers;
pub mod types;

pub use dispatcher::{Dispatched, Dispatcher};
pub use mappers::ErrorMappers;
pub use types::{CancelFlag, DispatchState, ScopeEvent, ScopeListener};
