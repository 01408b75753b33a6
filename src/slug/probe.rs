// self
use crate::{_prelude::*, auth::SlugNamespace};

/// Boxed future returned by [`SlugProbe::exists`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<bool>> + 'a + Send>>;

/// Point lookup that reports whether a slug is already taken in a namespace.
pub trait SlugProbe
where
	Self: 'static + Send + Sync,
{
	/// Returns `true` when `candidate` is in use.
	fn exists<'a>(&'a self, namespace: &'a SlugNamespace, candidate: &'a str) -> ProbeFuture<'a>;
}

/// Adapts an async closure into a [`SlugProbe`].
#[derive(Clone)]
pub struct FnProbe<F>(F);
impl<F> FnProbe<F> {
	/// Wraps `probe`, which receives owned copies of the namespace and candidate.
	pub fn new(probe: F) -> Self {
		Self(probe)
	}
}
impl<F, Fut> SlugProbe for FnProbe<F>
where
	F: 'static + Send + Sync + Fn(SlugNamespace, String) -> Fut,
	Fut: 'static + Send + Future<Output = Result<bool>>,
{
	fn exists<'a>(&'a self, namespace: &'a SlugNamespace, candidate: &'a str) -> ProbeFuture<'a> {
		Box::pin((self.0)(namespace.clone(), candidate.to_owned()))
	}
}
impl<F> Debug for FnProbe<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FnProbe(..)")
	}
}
