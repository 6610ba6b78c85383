//! Route resolution: pick the backend list that carries the traffic split

use crate::error::{Result, RouterError};
use crate::model::{Route, Service};

/// Message payload used when no route declares a service list
const NO_BACKEND_LIST: &str = "the services list";

/// Return the service list of the first route that declares one.
///
/// Routes are scanned in document order. A route declares a list when its
/// `services` key is present, even if the list is empty. Only the first match
/// is ever considered: per-path splits spread over several routes are not
/// supported.
pub fn resolve_backend_list(routes: &mut [Route]) -> Result<&mut Vec<Service>> {
    routes
        .iter_mut()
        .find_map(|route| route.services.as_mut())
        .ok_or_else(|| RouterError::NotFound(NO_BACKEND_LIST.to_string()))
}

/// Read-only variant of [`resolve_backend_list`]
pub fn resolve_backend_list_ref(routes: &[Route]) -> Result<&[Service]> {
    routes
        .iter()
        .find_map(|route| route.services.as_deref())
        .ok_or_else(|| RouterError::NotFound(NO_BACKEND_LIST.to_string()))
}
