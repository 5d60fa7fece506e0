pub use crate::application::{Application, ApplicationBuilder};
pub use crate::dependencies::{
    BindingRegistry, Container, Dependencies, DependencyScope, Key, Lazy, Provider, RequestScope,
};
pub use crate::dispatch::{
    CancelFlag, DispatchState, Dispatched, Dispatcher, ErrorMappers, ScopeEvent,
};
pub use crate::errors::{
    ContainerError, DispatchError, HandlerError, InjectionError, RouteError, StartupError,
};
pub use crate::request::{HttpRequest, RequestBody};
pub use crate::resource::{Reply, RequestArgs, Resource};
pub use crate::response::{HttpResponse, ResponseBody};
pub use crate::routing::{HttpMethod, ParamSpec, RouteTable};
pub use crate::serialization::{BodyWriter, BodyWriters, JsonWriter, TextWriter};
