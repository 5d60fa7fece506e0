//! Startup surface: bindings and resources in, a ready [`Dispatcher`] out.

use crate::dependencies::{BindingRegistry, Container, DependencyScope, Key, Provider};
use crate::dispatch::{Dispatcher, ErrorMappers, ScopeEvent};
use crate::response::HttpResponse;
use crate::errors::StartupError;
use crate::resource::Resource;
use crate::routing::{Route, RouteTable};
use crate::serialization::{BodyWriter, BodyWriters};
use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// Entry point for declaring an application.
pub struct Application;

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }
}

#[derive(Default)]
pub struct ApplicationBuilder {
    registry: BindingRegistry,
    routes: Vec<Route>,
    writers: BodyWriters,
    mappers: ErrorMappers,
    listener: Option<Arc<dyn Fn(ScopeEvent) + Send + Sync>>,
}

impl ApplicationBuilder {
    pub fn bind(
        &mut self,
        key: Key,
        provider: Provider,
        scope: DependencyScope,
    ) -> Result<&mut Self, StartupError> {
        self.registry.register(key, provider, scope)?;
        Ok(self)
    }

    pub fn singleton<T: Any + Send + Sync>(
        &mut self,
        provider: Provider,
    ) -> Result<&mut Self, StartupError> {
        self.bind(Key::of::<T>(), provider, DependencyScope::Singleton)
    }

    pub fn request_scoped<T: Any + Send + Sync>(
        &mut self,
        provider: Provider,
    ) -> Result<&mut Self, StartupError> {
        self.bind(Key::of::<T>(), provider, DependencyScope::Request)
    }

    pub fn transient<T: Any + Send + Sync>(
        &mut self,
        provider: Provider,
    ) -> Result<&mut Self, StartupError> {
        self.bind(Key::of::<T>(), provider, DependencyScope::Transient)
    }

    pub fn resource<T: Any + Send + Sync>(
        &mut self,
        resource: Resource<T>,
    ) -> Result<&mut Self, StartupError> {
        self.routes.extend(resource.into_routes()?);
        Ok(self)
    }

    /// Installs an extra body writer, replacing the default for its media type.
    pub fn body_writer(&mut self, writer: impl BodyWriter + 'static) -> &mut Self {
        self.writers.register(writer);
        self
    }

    /// Answers handler failures of type `E` (or caused by one) with `mapper`'s response.
    pub fn error_mapper<E, F>(&mut self, mapper: F) -> &mut Self
    where
        E: Error + 'static,
        F: Fn(&E) -> HttpResponse + Send + Sync + 'static,
    {
        self.mappers.register(mapper);
        self
    }

    pub fn scope_listener(
        &mut self,
        listener: impl Fn(ScopeEvent) + Send + Sync + 'static,
    ) -> &mut Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Seals the bindings, validates the dependency graph and the route table.
    ///
    /// Every error here is fatal: a cycle, an unbound dependency, a scope
    /// mismatch, a route conflict or a route whose resource has no binding.
    pub fn build(self) -> Result<Dispatcher, StartupError> {
        let Self {
            registry,
            routes,
            writers,
            mappers,
            listener,
        } = self;

        for route in &routes {
            if !registry.contains(&route.resource) {
                return Err(StartupError::UnboundResource {
                    route: route.describe(),
                    key: route.resource.clone(),
                });
            }
        }

        let container = Container::build(registry)?;

        let mut table = RouteTable::new();
        for route in routes {
            table.add_route(route)?;
        }
        for route in table.routes() {
            log::info!("mapped {} -> {} [{}]", route.describe(), route.resource, route.produces);
        }

        let dispatcher = Dispatcher::new(container, table, writers).with_error_mappers(mappers);
        Ok(match listener {
            Some(listener) => dispatcher.with_scope_listener(move |event| listener(event)),
            None => dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ContainerError, HandlerError, RouteError};
    use crate::request::HttpRequest;
    use crate::resource::Reply;
    use crate::routing::HttpMethod;

    struct Clock;
    struct Widgets;

    #[test]
    fn test_build_serves_requests() {
        let mut builder = Application::builder();
        builder
            .singleton::<Clock>(Provider::from_fn(|| Clock))
            .unwrap()
            .request_scoped::<Widgets>(Provider::new(|_| Ok(Widgets)).depends_on::<Clock>())
            .unwrap()
            .resource(Resource::<Widgets>::new("/widgets").get("", |_, _| Ok(Reply::text("ok"))))
            .unwrap();
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(&HttpRequest::new(HttpMethod::GET, "/widgets"));
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body_bytes(), br#""ok""#);
    }

    #[test]
    fn test_unbound_resource_is_fatal() {
        let mut builder = Application::builder();
        builder
            .resource(Resource::<Widgets>::new("/widgets").get("", |_, _| Ok(Reply::Empty)))
            .unwrap();

        match builder.build() {
            Err(StartupError::UnboundResource { route, key }) => {
                assert_eq!(route, "GET /widgets");
                assert!(key.is::<Widgets>());
            }
            other => panic!("expected UnboundResource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_binding_is_reported_immediately() {
        let mut builder = Application::builder();
        builder.singleton::<Clock>(Provider::from_fn(|| Clock)).unwrap();
        let err = builder
            .singleton::<Clock>(Provider::from_fn(|| Clock))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            StartupError::Container(ContainerError::DuplicateBinding { .. })
        ));
    }

    #[test]
    fn test_route_conflict_is_fatal() {
        let mut builder = Application::builder();
        builder
            .request_scoped::<Widgets>(Provider::from_fn(|| Widgets))
            .unwrap()
            .resource(
                Resource::<Widgets>::new("/widgets")
                    .get("/{id}", |_, _| Ok(Reply::Empty))
                    .get("/{name}", |_, _| Ok(Reply::Empty)),
            )
            .unwrap();

        let err = builder.build().err().unwrap();
        assert!(matches!(
            err,
            StartupError::Routing(RouteError::RouteConflict { .. })
        ));
    }

    #[test]
    fn test_scope_mismatch_is_fatal() {
        let mut builder = Application::builder();
        builder
            .request_scoped::<Widgets>(Provider::from_fn(|| Widgets))
            .unwrap()
            .singleton::<Clock>(Provider::new(|_| Ok(Clock)).depends_on::<Widgets>())
            .unwrap();

        let err = builder.build().err().unwrap();
        assert!(err.to_string().contains("cannot depend on request-scoped"));
    }

    struct Inbox {
        owner: Arc<Widgets>,
    }

    struct Entry {
        label: String,
    }

    #[test]
    fn test_sub_resources_dispatch_through_parent_routes() {
        let mut builder = Application::builder();
        builder
            .request_scoped::<Widgets>(Provider::from_fn(|| Widgets))
            .unwrap()
            .request_scoped::<Inbox>(
                Provider::new(|deps| Ok(Inbox { owner: deps.get()? })).depends_on::<Widgets>(),
            )
            .unwrap()
            .resource(
                Resource::<Widgets>::new("/widgets")
                    .mount(
                        "/inbox",
                        Resource::<Inbox>::new("").get("", |inbox, _| {
                            // held by the request scope and by the inbox
                            assert!(Arc::strong_count(&inbox.owner) >= 2);
                            Ok(Reply::text("inbox"))
                        }),
                    )
                    .locator(
                        "/{name}",
                        |_, args| {
                            Ok(Entry {
                                label: args.path("name")?.to_uppercase(),
                            })
                        },
                        Resource::<Entry>::new("").get("", |entry, _| {
                            Ok(Reply::text(entry.label.clone()))
                        }),
                    ),
            )
            .unwrap();
        let dispatcher = builder.build().unwrap();

        let entry = dispatcher.dispatch(&HttpRequest::new(HttpMethod::GET, "/widgets/bolt"));
        assert_eq!(entry.status_code, 200);
        assert_eq!(entry.body_bytes(), br#""BOLT""#);

        let inbox = dispatcher.dispatch(&HttpRequest::new(HttpMethod::GET, "/widgets/inbox"));
        assert_eq!(inbox.status_code, 200);
        // the literal mount wins over the locator's parameter
        assert_eq!(inbox.body_bytes(), br#""inbox""#);
    }

    #[test]
    fn test_mounted_resource_must_be_bound() {
        let mut builder = Application::builder();
        builder
            .request_scoped::<Widgets>(Provider::from_fn(|| Widgets))
            .unwrap()
            .resource(
                Resource::<Widgets>::new("/widgets")
                    .mount("/inbox", Resource::<Inbox>::new("").get("", |_, _| Ok(Reply::Empty))),
            )
            .unwrap();

        match builder.build() {
            Err(StartupError::UnboundResource { route, key }) => {
                assert_eq!(route, "GET /widgets/inbox");
                assert!(key.is::<Inbox>());
            }
            other => panic!("expected UnboundResource, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_error_mapper_applies_to_handler_failures() {
        #[derive(Debug, thiserror::Error)]
        #[error("widget quota exceeded")]
        struct Quota;

        let mut builder = Application::builder();
        builder
            .request_scoped::<Widgets>(Provider::from_fn(|| Widgets))
            .unwrap()
            .resource(
                Resource::<Widgets>::new("/widgets")
                    .post("", |_, _| Err(HandlerError::failed(Quota))),
            )
            .unwrap()
            .error_mapper(|err: &Quota| {
                crate::response::error_response(429, err.to_string())
            });
        let dispatcher = builder.build().unwrap();

        let response = dispatcher.dispatch(&HttpRequest::new(HttpMethod::POST, "/widgets"));
        assert_eq!(response.status_code, 429);
        assert_eq!(response.body_bytes(), br#"{"detail":"widget quota exceeded"}"#);
    }
}
