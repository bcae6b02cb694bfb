//! Procedural cases: one `run` producing the fingerprint directly.

use std::sync::Arc;

use async_trait::async_trait;

use super::{guarded, CompositeSignature, TestCase};
use crate::context::{CaseContext, TmpScope};
use crate::error::CaseResult;

/// A case authored as a single routine.
#[async_trait]
pub trait Procedure: Send + Sync {
    fn description(&self) -> &str;

    async fn run(&self, ctx: &CaseContext) -> CaseResult<String>;
}

/// Adapter exposing a [`Procedure`] as a [`TestCase`].
pub struct ProceduralCase<P>(pub P);

#[async_trait]
impl<P: Procedure> TestCase for ProceduralCase<P> {
    fn description(&self) -> CaseResult<String> {
        Ok(self.0.description().to_string())
    }

    async fn run_all(&self, ctx: Arc<CaseContext>) -> CaseResult<CompositeSignature> {
        let _scope = TmpScope::new(Arc::clone(&ctx));
        let fingerprint = guarded(self.0.run(&ctx)).await?;
        Ok(CompositeSignature::single(fingerprint))
    }
}
