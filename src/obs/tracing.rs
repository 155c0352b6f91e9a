// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, RemoteId},
	obs::FlowKind,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapper shared by every delegate operation.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the operation and the call site.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("drive_delegate.flow", flow = kind.as_str(), stage) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Reports a remote object that exists without a local record.
///
/// Operators reconcile these by hand, so the event always carries the remote identifier.
pub fn report_orphaned_remote(principal: &PrincipalId, remote_id: &RemoteId, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::error!(
			principal = principal.as_ref(),
			remote_id = remote_id.as_ref(),
			%error,
			"Remote document was created but its local record could not be saved."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (principal, remote_id, error);
	}
}

/// Notes that a forced refresh is about to run because the provider rejected a token.
pub fn report_rejected_token(principal: &PrincipalId) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			principal = principal.as_ref(),
			"Provider rejected the access token; forcing a refresh."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = principal;
	}
}
