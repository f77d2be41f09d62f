//! Static routing table from (router, operation) to a handler pool.
//!
//! The table is assembled once at startup with [`RegistryBuilder`] and then
//! frozen; routers share it through an `Arc`.

use std::collections::HashMap;

use lernia_core::error::CoreError;

use crate::handler::HandlerRef;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub router: String,
    pub operation: String,
}

impl RouteKey {
    pub fn new(router: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            router: router.into(),
            operation: operation.into(),
        }
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    routes: HashMap<RouteKey, HandlerRef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route each of `operations` on `router` to `handler`.
    ///
    /// A key may be registered only once.
    pub fn register(
        &mut self,
        router: &str,
        operations: &[&str],
        handler: &HandlerRef,
    ) -> Result<&mut Self, CoreError> {
        for operation in operations {
            let key = RouteKey::new(router, *operation);
            if let Some(existing) = self.routes.get(&key) {
                return Err(CoreError::Internal(format!(
                    "operation {operation} on {router} is already routed to {}",
                    existing.name()
                )));
            }
            tracing::debug!(router, operation, handler = handler.name(), "Route registered");
            self.routes.insert(key, handler.clone());
        }
        Ok(self)
    }

    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            routes: self.routes,
        }
    }
}

/// Immutable routing table.
pub struct OperationRegistry {
    routes: HashMap<RouteKey, HandlerRef>,
}

impl OperationRegistry {
    pub fn get(&self, router: &str, operation: &str) -> Option<&HandlerRef> {
        self.routes.get(&RouteKey::new(router, operation))
    }

    pub fn operations_for<'a>(&'a self, router: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.routes
            .keys()
            .filter(move |k| k.router == router)
            .map(|k| k.operation.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
