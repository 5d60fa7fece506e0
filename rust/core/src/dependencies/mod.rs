pub mod container;
pub mod factory;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod types;

pub use container::{Container, Lazy};
pub use factory::Dependencies;
pub use registry::BindingRegistry;
pub use resolver::{build_plan, DependencyResolver};
pub use scope::{next_request_id, RequestScope, ScopeManager};
pub use types::{
    Binding, BoxError, ConstructionPlan, Dependency, DependencyScope, EdgeKind, Instance, Key,
    Provider,
};
