use crate::errors::HandlerError;
use crate::response::HttpResponse;
use std::any::{type_name, TypeId};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

type MapFn = Arc<dyn Fn(&(dyn Error + 'static)) -> Option<HttpResponse> + Send + Sync>;

/// Turns handler failures of registered error types into responses.
///
/// The failure is checked first, then every error down its `source()` chain.
/// The first registered mapper that matches wins.
#[derive(Clone, Default)]
pub struct ErrorMappers {
    mappers: Vec<(TypeId, &'static str, MapFn)>,
}

impl ErrorMappers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `mapper` for `E`, replacing an earlier mapper for the same type.
    pub fn register<E, F>(&mut self, mapper: F)
    where
        E: Error + 'static,
        F: Fn(&E) -> HttpResponse + Send + Sync + 'static,
    {
        let map: MapFn = Arc::new(move |err| err.downcast_ref::<E>().map(|e| mapper(e)));
        let type_id = TypeId::of::<E>();
        match self.mappers.iter_mut().find(|(id, _, _)| *id == type_id) {
            Some(entry) => entry.2 = map,
            None => self.mappers.push((type_id, type_name::<E>(), map)),
        }
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    pub fn map_error(&self, err: &(dyn Error + 'static)) -> Option<HttpResponse> {
        let mut current = Some(err);
        while let Some(cause) = current {
            for (_, name, map) in &self.mappers {
                if let Some(response) = map(cause) {
                    log::debug!("{} mapped to status {}", name, response.status_code);
                    return Some(response);
                }
            }
            current = cause.source();
        }
        None
    }

    /// A `Failed` error with a matching mapper becomes a `Response`.
    pub(crate) fn apply(&self, err: HandlerError) -> HandlerError {
        match err {
            HandlerError::Failed(source) => match self.map_error(&*source) {
                Some(response) => HandlerError::respond(response),
                None => HandlerError::Failed(source),
            },
            other => other,
        }
    }
}

impl fmt::Debug for ErrorMappers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.mappers.iter().map(|(_, name, _)| name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::error_response;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("note {0} is locked")]
    struct Locked(u64);

    #[derive(Debug, Error)]
    #[error("storage failed")]
    struct Storage(#[source] Locked);

    #[test]
    fn test_registered_type_is_mapped() {
        let mut mappers = ErrorMappers::new();
        mappers.register(|err: &Locked| error_response(423, err.to_string()));

        match mappers.apply(HandlerError::failed(Locked(7))) {
            HandlerError::Response(response) => {
                assert_eq!(response.status_code, 423);
                assert_eq!(response.body_bytes(), br#"{"detail":"note 7 is locked"}"#);
            }
            other => panic!("expected mapped response, got {:?}", other),
        }
    }

    #[test]
    fn test_source_chain_is_searched() {
        let mut mappers = ErrorMappers::new();
        mappers.register(|_: &Locked| error_response(423, "locked"));
        let response = mappers.map_error(&Storage(Locked(1))).unwrap();
        assert_eq!(response.status_code, 423);
    }

    #[test]
    fn test_unmapped_failure_is_unchanged() {
        let mut mappers = ErrorMappers::new();
        mappers.register(|_: &Locked| error_response(423, "locked"));
        assert!(matches!(
            mappers.apply(HandlerError::failed("disk full")),
            HandlerError::Failed(_)
        ));
        assert!(matches!(
            mappers.apply(HandlerError::not_found("gone")),
            HandlerError::Status { status: 404, .. }
        ));
    }

    #[test]
    fn test_register_replaces_same_type() {
        let mut mappers = ErrorMappers::new();
        mappers.register(|_: &Locked| error_response(423, "locked"));
        mappers.register(|_: &Locked| error_response(409, "conflict"));
        assert_eq!(mappers.len(), 1);
        assert_eq!(mappers.map_error(&Locked(2)).unwrap().status_code, 409);
    }
}
