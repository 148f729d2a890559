use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{InspectionContext, InspectionScope, Inspector};
use crate::error::Result;
use crate::metadata::MetaDataType;

/// Dispatches to a vendor inspector by product name.
///
/// Products without a registration use the fallback; when there is none the
/// object kind is skipped for that product.
#[derive(Debug, Clone)]
pub struct InspectorResolver {
    object_type: MetaDataType,
    fallback: Option<Arc<dyn Inspector>>,
    products: Vec<(&'static str, Arc<dyn Inspector>)>,
}

impl InspectorResolver {
    pub fn new(object_type: MetaDataType) -> Self {
        Self {
            object_type,
            fallback: None,
            products: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, inspector: impl Inspector + 'static) -> Self {
        self.fallback = Some(Arc::new(inspector));
        self
    }

    /// Register `inspector` for `product`, replacing an earlier registration.
    pub fn with_product(mut self, product: &'static str, inspector: impl Inspector + 'static) -> Self {
        self.products.retain(|(p, _)| !p.eq_ignore_ascii_case(product));
        self.products.push((product, Arc::new(inspector)));
        self
    }

    pub fn resolve(&self, product_name: &str) -> Option<&Arc<dyn Inspector>> {
        self.products
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(product_name))
            .map(|(_, i)| i)
            .or(self.fallback.as_ref())
    }
}

#[async_trait]
impl Inspector for InspectorResolver {
    fn object_type(&self) -> MetaDataType {
        self.object_type
    }

    async fn inspect(&self, context: &mut InspectionContext<'_>, scope: &InspectionScope) -> Result<()> {
        let product = context.database_info().product_name.clone();
        match self.resolve(&product) {
            Some(inspector) => inspector.inspect(context, scope).await,
            None => {
                debug!("No {} inspector for {}", self.object_type, product);
                Ok(())
            }
        }
    }
}
